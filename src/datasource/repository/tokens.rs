use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};
use tracing::warn;

use crate::datasource::repository::tokens::models::{
    AccessTokenEntity, EntitlementEntity, TokenPurchaseEntity,
};
use crate::models::{AccessToken, ContentUnit, Entitlement, TokenPurchase};

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::models::{AccessToken, ContentUnit, Entitlement, TokenPurchase};

    #[derive(Debug, sqlx::FromRow)]
    pub struct AccessTokenEntity {
        pub id: Uuid,
        pub user_id: Uuid,
        pub token: String,
        pub total_amount: i64,
        pub created_at: DateTime<Utc>,
        pub expires_at: Option<DateTime<Utc>>,
    }

    impl From<AccessTokenEntity> for AccessToken {
        fn from(value: AccessTokenEntity) -> Self {
            Self {
                id: value.id,
                user_id: value.user_id,
                token: value.token,
                total_amount: value.total_amount,
                created_at: value.created_at,
                expires_at: value.expires_at,
            }
        }
    }

    #[derive(Debug, sqlx::FromRow)]
    pub struct TokenPurchaseEntity {
        pub id: Uuid,
        pub token_id: Uuid,
        pub film_id: Option<Uuid>,
        pub series_id: Option<Uuid>,
        pub season_id: Option<Uuid>,
    }

    impl TokenPurchaseEntity {
        pub fn into_purchase(self) -> Option<TokenPurchase> {
            let content = ContentUnit::from_columns(self.film_id, self.series_id, self.season_id)?;
            Some(TokenPurchase {
                id: self.id,
                token_id: self.token_id,
                content,
            })
        }
    }

    #[derive(Debug, sqlx::FromRow)]
    pub struct EntitlementEntity {
        pub token_id: Uuid,
        pub expires_at: Option<DateTime<Utc>>,
        pub film_id: Option<Uuid>,
        pub series_id: Option<Uuid>,
        pub season_id: Option<Uuid>,
    }

    impl EntitlementEntity {
        pub fn into_entitlement(self) -> Option<Entitlement> {
            let content = ContentUnit::from_columns(self.film_id, self.series_id, self.season_id)?;
            Some(Entitlement {
                token_id: self.token_id,
                expires_at: self.expires_at,
                content,
            })
        }
    }
}

const TOKEN_COLUMNS: &str = "id, user_id, token, total_amount, created_at, expires_at";
const PURCHASE_COLUMNS: &str = "id, token_id, film_id, series_id, season_id";

pub async fn insert<'e, E>(
    executor: E,
    user_id: Uuid,
    token: &str,
    total_amount: i64,
    expires_at: Option<&DateTime<Utc>>,
) -> sqlx::Result<AccessToken>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO access_tokens (user_id, token, total_amount, expires_at) \
         VALUES ($1, $2, $3, $4) RETURNING {TOKEN_COLUMNS}"
    );
    let record = sqlx::query_as::<_, AccessTokenEntity>(&sql)
        .bind(user_id)
        .bind(token)
        .bind(total_amount)
        .bind(expires_at)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn insert_purchase<'e, E>(
    executor: E,
    token_id: Uuid,
    content: ContentUnit,
) -> sqlx::Result<TokenPurchase>
where
    E: Executor<'e, Database = Postgres>,
{
    let (film_id, series_id, season_id) = content.columns();
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO token_purchases (token_id, film_id, series_id, season_id) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(token_id)
    .bind(film_id)
    .bind(series_id)
    .bind(season_id)
    .fetch_one(executor)
    .await?;
    Ok(TokenPurchase {
        id,
        token_id,
        content,
    })
}

pub async fn list_for_user<'e, E>(executor: E, user_id: Uuid) -> sqlx::Result<Vec<AccessToken>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE user_id = $1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, AccessTokenEntity>(&sql)
        .bind(user_id)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn purchases_for_token<'e, E>(
    executor: E,
    token_id: Uuid,
) -> sqlx::Result<Vec<TokenPurchase>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM token_purchases WHERE token_id = $1");
    let rows = sqlx::query_as::<_, TokenPurchaseEntity>(&sql)
        .bind(token_id)
        .fetch_all(executor)
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            let purchase = row.into_purchase();
            if purchase.is_none() {
                warn!("token purchase {id} names no content unit");
            }
            purchase
        })
        .collect())
}

/// Every purchase line of every token the user holds, expired or not.
pub async fn entitlements_for_user<'e, E>(
    executor: E,
    user_id: Uuid,
) -> sqlx::Result<Vec<Entitlement>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EntitlementEntity>(
        "SELECT t.id AS token_id, t.expires_at, p.film_id, p.series_id, p.season_id \
         FROM token_purchases p JOIN access_tokens t ON t.id = p.token_id \
         WHERE t.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(EntitlementEntity::into_entitlement)
        .collect())
}
