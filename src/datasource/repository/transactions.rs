use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::transactions::models::{OverviewEntity, TransactionEntity};
use crate::models::{ContentUnit, Transaction, TransactionOverview, TransactionStatus};

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::models::{content_summary, Transaction, TransactionOverview, TransactionStatus};

    #[derive(Debug, sqlx::FromRow)]
    pub struct TransactionEntity {
        pub id: Uuid,
        pub user_id: Uuid,
        pub film_id: Option<Uuid>,
        pub series_id: Option<Uuid>,
        pub season_id: Option<Uuid>,
        pub amount: i64,
        pub payment_method: String,
        pub payment_screenshot: Option<String>,
        pub status: TransactionStatus,
        pub description: Option<String>,
        pub access_token_id: Option<Uuid>,
        pub created_at: DateTime<Utc>,
        pub confirmed_at: Option<DateTime<Utc>>,
        pub confirmed_by: Option<Uuid>,
    }

    impl From<TransactionEntity> for Transaction {
        fn from(value: TransactionEntity) -> Self {
            Self {
                id: value.id,
                user_id: value.user_id,
                film_id: value.film_id,
                series_id: value.series_id,
                season_id: value.season_id,
                amount: value.amount,
                payment_method: value.payment_method,
                payment_screenshot: value.payment_screenshot,
                status: value.status,
                description: value.description,
                access_token_id: value.access_token_id,
                created_at: value.created_at,
                confirmed_at: value.confirmed_at,
                confirmed_by: value.confirmed_by,
            }
        }
    }

    #[derive(Debug, sqlx::FromRow)]
    pub struct OverviewEntity {
        #[sqlx(flatten)]
        pub transaction: TransactionEntity,
        pub client_login: String,
        pub confirmed_by_login: Option<String>,
        pub film_title: Option<String>,
        pub series_title: Option<String>,
        pub season_number: Option<i32>,
    }

    impl From<OverviewEntity> for TransactionOverview {
        fn from(value: OverviewEntity) -> Self {
            let content_summary = content_summary(
                value.film_title.as_deref(),
                value.series_title.as_deref(),
                value.season_number,
            );
            Self {
                transaction: value.transaction.into(),
                client_login: value.client_login,
                confirmed_by_login: value.confirmed_by_login,
                content_summary,
            }
        }
    }
}

const COLUMNS: &str = "id, user_id, film_id, series_id, season_id, amount, payment_method, \
    payment_screenshot, status, description, access_token_id, created_at, confirmed_at, \
    confirmed_by";

const OVERVIEW_SELECT: &str = "SELECT t.id, t.user_id, t.film_id, t.series_id, t.season_id, \
    t.amount, t.payment_method, t.payment_screenshot, t.status, t.description, \
    t.access_token_id, t.created_at, t.confirmed_at, t.confirmed_by, \
    u.login_id AS client_login, c.login_id AS confirmed_by_login, \
    f.title AS film_title, s.title AS series_title, se.season_number \
    FROM transactions t \
    JOIN users u ON u.id = t.user_id \
    LEFT JOIN users c ON c.id = t.confirmed_by \
    LEFT JOIN films f ON f.id = t.film_id \
    LEFT JOIN series s ON s.id = t.series_id \
    LEFT JOIN seasons se ON se.id = t.season_id";

#[derive(Debug)]
pub struct NewTransaction<'a> {
    pub user_id: Uuid,
    pub content: Option<ContentUnit>,
    pub amount: i64,
    pub payment_method: &'a str,
    pub payment_screenshot: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Who settled a transaction and when.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub status: TransactionStatus,
    pub confirmed_by: Uuid,
    pub confirmed_at: DateTime<Utc>,
    pub access_token_id: Option<Uuid>,
}

pub async fn insert_pending<'e, E>(
    executor: E,
    transaction: &NewTransaction<'_>,
) -> sqlx::Result<Transaction>
where
    E: Executor<'e, Database = Postgres>,
{
    let (film_id, series_id, season_id) = transaction
        .content
        .map_or((None, None, None), ContentUnit::columns);
    let sql = format!(
        "INSERT INTO transactions (user_id, film_id, series_id, season_id, amount, \
         payment_method, payment_screenshot, description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, TransactionEntity>(&sql)
        .bind(transaction.user_id)
        .bind(film_id)
        .bind(series_id)
        .bind(season_id)
        .bind(transaction.amount)
        .bind(transaction.payment_method)
        .bind(transaction.payment_screenshot)
        .bind(transaction.description)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

/// Inserts a transaction that is already settled, as admin provisioning does.
pub async fn insert_resolved<'e, E>(
    executor: E,
    transaction: &NewTransaction<'_>,
    resolution: &Resolution,
) -> sqlx::Result<Transaction>
where
    E: Executor<'e, Database = Postgres>,
{
    let (film_id, series_id, season_id) = transaction
        .content
        .map_or((None, None, None), ContentUnit::columns);
    let sql = format!(
        "INSERT INTO transactions (user_id, film_id, series_id, season_id, amount, \
         payment_method, payment_screenshot, description, status, confirmed_by, confirmed_at, \
         access_token_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, TransactionEntity>(&sql)
        .bind(transaction.user_id)
        .bind(film_id)
        .bind(series_id)
        .bind(season_id)
        .bind(transaction.amount)
        .bind(transaction.payment_method)
        .bind(transaction.payment_screenshot)
        .bind(transaction.description)
        .bind(resolution.status)
        .bind(resolution.confirmed_by)
        .bind(resolution.confirmed_at)
        .bind(resolution.access_token_id)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Transaction>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE id = $1");
    let record = sqlx::query_as::<_, TransactionEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

/// Loads the row and holds its lock until the surrounding transaction ends.
pub async fn lock<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Transaction>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
    let record = sqlx::query_as::<_, TransactionEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

/// Moves a pending transaction to its final status. Returns `None` if it was no longer pending.
pub async fn resolve<'e, E>(
    executor: E,
    id: Uuid,
    resolution: &Resolution,
) -> sqlx::Result<Option<Transaction>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE transactions SET status = $2, confirmed_by = $3, confirmed_at = $4, \
         access_token_id = $5 WHERE id = $1 AND status = 'pending' RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, TransactionEntity>(&sql)
        .bind(id)
        .bind(resolution.status)
        .bind(resolution.confirmed_by)
        .bind(resolution.confirmed_at)
        .bind(resolution.access_token_id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

/// Newest first, optionally restricted to one status.
pub async fn list<'e, E>(
    executor: E,
    status: Option<TransactionStatus>,
) -> sqlx::Result<Vec<TransactionOverview>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "{OVERVIEW_SELECT} WHERE ($1::transaction_status IS NULL OR t.status = $1) \
         ORDER BY t.created_at DESC"
    );
    let rows = sqlx::query_as::<_, OverviewEntity>(&sql)
        .bind(status)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn recent<'e, E>(executor: E, limit: i64) -> sqlx::Result<Vec<TransactionOverview>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("{OVERVIEW_SELECT} ORDER BY t.created_at DESC LIMIT $1");
    let rows = sqlx::query_as::<_, OverviewEntity>(&sql)
        .bind(limit)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn delete_all<'e, E>(executor: E) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM transactions")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Payment screenshot names still referenced by any transaction.
pub async fn screenshots<'e, E>(executor: E) -> sqlx::Result<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        "SELECT payment_screenshot FROM transactions WHERE payment_screenshot IS NOT NULL",
    )
    .fetch_all(executor)
    .await
}
