use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

pub async fn insert<'e, E>(
    executor: E,
    token: &str,
    user_id: Uuid,
    expires_at: &DateTime<Utc>,
) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO password_reset_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Deletes the token and returns its owner, if it existed and had not expired at `now`.
pub async fn consume<'e, E>(
    executor: E,
    token: &str,
    now: &DateTime<Utc>,
) -> sqlx::Result<Option<Uuid>>
where
    E: Executor<'e, Database = Postgres>,
{
    let expiry: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
        "DELETE FROM password_reset_tokens WHERE token = $1 RETURNING user_id, expires_at",
    )
    .bind(token)
    .fetch_optional(executor)
    .await?;
    Ok(expiry.and_then(|(user_id, expires_at)| (expires_at >= *now).then_some(user_id)))
}

/// Drops every outstanding token of the user.
pub async fn delete_for_user<'e, E>(executor: E, user_id: Uuid) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
