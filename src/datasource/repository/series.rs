use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::series::models::SeriesEntity;
use crate::models::Series;

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::models::Series;

    #[derive(Debug, sqlx::FromRow)]
    pub struct SeriesEntity {
        pub id: Uuid,
        pub title: String,
        pub description: String,
        pub thumbnail: Option<String>,
        pub created_at: DateTime<Utc>,
    }

    impl From<SeriesEntity> for Series {
        fn from(value: SeriesEntity) -> Self {
            Self {
                id: value.id,
                title: value.title,
                description: value.description,
                thumbnail: value.thumbnail,
                created_at: value.created_at,
            }
        }
    }
}

const COLUMNS: &str = "id, title, description, thumbnail, created_at";

pub async fn list<'e, E>(executor: E) -> sqlx::Result<Vec<Series>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM series ORDER BY title");
    let rows = sqlx::query_as::<_, SeriesEntity>(&sql)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Series>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM series WHERE id = $1");
    let record = sqlx::query_as::<_, SeriesEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn get_many<'e, E>(executor: E, ids: &[Uuid]) -> sqlx::Result<Vec<Series>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM series WHERE id = ANY($1) ORDER BY title");
    let rows = sqlx::query_as::<_, SeriesEntity>(&sql)
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn insert<'e, E>(
    executor: E,
    title: &str,
    description: &str,
    thumbnail: Option<&str>,
) -> sqlx::Result<Series>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO series (title, description, thumbnail) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, SeriesEntity>(&sql)
        .bind(title)
        .bind(description)
        .bind(thumbnail)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn update<'e, E>(
    executor: E,
    id: Uuid,
    title: &str,
    description: &str,
    thumbnail: Option<&str>,
) -> sqlx::Result<Option<Series>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE series SET title = $2, description = $3, thumbnail = $4 WHERE id = $1 \
         RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, SeriesEntity>(&sql)
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(thumbnail)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM series WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count<'e, E>(executor: E) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM series")
        .fetch_one(executor)
        .await
}
