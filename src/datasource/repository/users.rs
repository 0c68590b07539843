use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::users::models::UserEntity;
use crate::models::{Role, User};

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::models::{Role, User};

    #[derive(Debug, sqlx::FromRow)]
    pub struct UserEntity {
        pub id: Uuid,
        pub external_id: Option<String>,
        pub login_id: String,
        pub display_name: Option<String>,
        pub password_hash: Option<String>,
        pub role: Role,
        pub created_at: DateTime<Utc>,
        pub last_login: Option<DateTime<Utc>>,
    }

    impl From<UserEntity> for User {
        fn from(value: UserEntity) -> Self {
            Self {
                id: value.id,
                external_id: value.external_id,
                login_id: value.login_id,
                display_name: value.display_name,
                role: value.role,
                created_at: value.created_at,
                last_login: value.last_login,
            }
        }
    }
}

const COLUMNS: &str =
    "id, external_id, login_id, display_name, password_hash, role, created_at, last_login";

/// A user together with the stored password hash, only used for verification.
#[derive(Debug)]
pub struct Credentials {
    pub user: User,
    pub password_hash: Option<String>,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub external_id: Option<&'a str>,
    pub login_id: &'a str,
    pub display_name: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub role: Role,
}

pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
    let record = sqlx::query_as::<_, UserEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn find_credentials<'e, E>(
    executor: E,
    login_id: &str,
    role: Role,
) -> sqlx::Result<Option<Credentials>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM users WHERE login_id = $1 AND role = $2");
    let record = sqlx::query_as::<_, UserEntity>(&sql)
        .bind(login_id)
        .bind(role)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(|mut entity| Credentials {
        password_hash: entity.password_hash.take(),
        user: entity.into(),
    }))
}

pub async fn find_by_external_id<'e, E>(
    executor: E,
    external_id: &str,
) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM users WHERE external_id = $1");
    let record = sqlx::query_as::<_, UserEntity>(&sql)
        .bind(external_id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn find_by_login<'e, E>(
    executor: E,
    login_id: &str,
    role: Role,
) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM users WHERE login_id = $1 AND role = $2");
    let record = sqlx::query_as::<_, UserEntity>(&sql)
        .bind(login_id)
        .bind(role)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn insert<'e, E>(executor: E, user: &NewUser<'_>) -> sqlx::Result<User>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO users (external_id, login_id, display_name, password_hash, role) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, UserEntity>(&sql)
        .bind(user.external_id)
        .bind(user.login_id)
        .bind(user.display_name)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn touch_last_login<'e, E>(
    executor: E,
    id: Uuid,
    at: &DateTime<Utc>,
) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_password_hash<'e, E>(executor: E, id: Uuid, hash: &str) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(hash)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn has_role<'e, E>(executor: E, role: Role) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = $1)")
        .bind(role)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}
