use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

/// Transaction counts per status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
}

pub async fn status_counts<'e, E>(executor: E) -> sqlx::Result<StatusCounts>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, StatusCounts>(
        "SELECT COUNT(*) AS total, \
         COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
         COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed, \
         COUNT(*) FILTER (WHERE status = 'rejected') AS rejected \
         FROM transactions",
    )
    .fetch_one(executor)
    .await
}

/// Sum of confirmed amounts, optionally only those confirmed at or after `since`.
pub async fn confirmed_revenue<'e, E>(
    executor: E,
    since: Option<&DateTime<Utc>>,
) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transactions \
         WHERE status = 'confirmed' AND ($1::timestamptz IS NULL OR confirmed_at >= $1)",
    )
    .bind(since)
    .fetch_one(executor)
    .await
}

/// Sum of confirmed amounts recorded through a given payment method.
pub async fn revenue_for_method<'e, E>(executor: E, payment_method: &str) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transactions \
         WHERE status = 'confirmed' AND payment_method = $1",
    )
    .bind(payment_method)
    .fetch_one(executor)
    .await
}
