//! Purchase requests, their review, and the entitlements they mint.

use chrono::{Duration, Utc};
use itertools::Itertools;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{hash_password, random_token};
use crate::config::Config;
use crate::datasource::repository::transactions::{NewTransaction, Resolution};
use crate::datasource::repository::{films, seasons, tokens, transactions, users};
use crate::errors::Error;
use crate::models::{
    AccessToken, ContentUnit, Role, TokenPurchase, Transaction, TransactionStatus, User,
};
use crate::state::DBPool;
use crate::storage::{MediaKind, MediaStorage, StoredFile};

const ALREADY_PROCESSED: &str = "transaction already processed";
pub const ADMIN_CREATION: &str = "admin_creation";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Confirm,
    Reject,
}

impl TransactionStatus {
    /// The status a decision leads to. Only pending transactions can be decided.
    pub fn apply(self, decision: Decision) -> Result<TransactionStatus, Error> {
        match (self, decision) {
            (TransactionStatus::Pending, Decision::Confirm) => Ok(TransactionStatus::Confirmed),
            (TransactionStatus::Pending, Decision::Reject) => Ok(TransactionStatus::Rejected),
            _ => Err(Error::conflict(ALREADY_PROCESSED)),
        }
    }
}

/// Settles a pending transaction. Confirming mints a token with one purchase line for its content.
///
/// The row is locked for the duration so two reviewers cannot both settle it.
#[instrument(skip(pool, config))]
pub async fn decide(
    pool: &DBPool,
    config: &Config,
    transaction_id: Uuid,
    admin_id: Uuid,
    decision: Decision,
) -> Result<Transaction, Error> {
    let mut tx = pool.begin().await?;
    let current = transactions::lock(&mut *tx, transaction_id)
        .await?
        .ok_or(Error::NotFound("transaction"))?;
    let status = current.status.apply(decision)?;
    let now = Utc::now();

    let access_token_id = match decision {
        Decision::Confirm => {
            let content = current
                .content()
                .ok_or_else(|| Error::validation("transaction does not name any content"))?;
            let expires_at = now + config.entitlement_duration();
            let token = tokens::insert(
                &mut *tx,
                current.user_id,
                &random_token(),
                current.amount,
                Some(&expires_at),
            )
            .await?;
            tokens::insert_purchase(&mut *tx, token.id, content).await?;
            Some(token.id)
        }
        Decision::Reject => None,
    };

    let resolution = Resolution {
        status,
        confirmed_by: admin_id,
        confirmed_at: now,
        access_token_id,
    };
    let updated = transactions::resolve(&mut *tx, transaction_id, &resolution)
        .await?
        .ok_or_else(|| Error::conflict(ALREADY_PROCESSED))?;
    tx.commit().await?;
    info!("transaction {transaction_id} {status:?}");
    Ok(updated)
}

pub async fn confirm(
    pool: &DBPool,
    config: &Config,
    transaction_id: Uuid,
    admin_id: Uuid,
) -> Result<Transaction, Error> {
    decide(pool, config, transaction_id, admin_id, Decision::Confirm).await
}

pub async fn reject(
    pool: &DBPool,
    config: &Config,
    transaction_id: Uuid,
    admin_id: Uuid,
) -> Result<Transaction, Error> {
    decide(pool, config, transaction_id, admin_id, Decision::Reject).await
}

/// A purchase request as submitted by an external front end.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    /// The caller's own identifier for the buyer, sent as a string or a number.
    #[serde(deserialize_with = "external_id")]
    pub user_id: String,
    /// Whole currency units. `5000`, `5000.0` and `"5000"` are accepted, `12.5` is not.
    #[serde(deserialize_with = "whole_amount")]
    pub amount: i64,
    pub payment_method: String,
    pub film_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub season_id: Option<Uuid>,
    pub description: Option<String>,
    pub payment_screenshot: Option<String>,
}

fn external_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

// largest magnitude below which every integer is exact in an f64
const MAX_EXACT_AMOUNT: f64 = 9_007_199_254_740_992.0;

fn whole_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Whole(i64),
        Decimal(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Whole(amount) => return Ok(amount),
        Raw::Decimal(amount) => amount,
        Raw::Text(text) => {
            let trimmed = text.trim();
            if let Ok(amount) = trimmed.parse::<i64>() {
                return Ok(amount);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("amount {text:?} is not a number")))?
        }
    };
    if !value.is_finite() || value.abs() > MAX_EXACT_AMOUNT || value.fract().abs() > 0.0 {
        return Err(D::Error::custom(format!(
            "amount {value} is not a whole number of currency units"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(value as i64)
}

impl PurchaseRequest {
    fn content(&self) -> Result<Option<ContentUnit>, Error> {
        match (self.film_id, self.series_id, self.season_id) {
            (None, None, None) => Ok(None),
            (Some(film_id), None, None) => Ok(Some(ContentUnit::Film { film_id })),
            (None, Some(series_id), Some(season_id)) => Ok(Some(ContentUnit::Season {
                series_id,
                season_id,
            })),
            (Some(_), _, _) => Err(Error::validation(
                "a transaction names either a film or a season",
            )),
            _ => Err(Error::validation("series_id and season_id go together")),
        }
    }
}

/// Rejects a `payment_screenshot` that does not name an uploaded screenshot.
pub async fn check_screenshot(storage: &MediaStorage, name: &str) -> Result<(), Error> {
    if storage.contains(MediaKind::Screenshot, name).await {
        Ok(())
    } else {
        Err(Error::validation(
            "payment_screenshot does not name an uploaded screenshot",
        ))
    }
}

/// Records a pending transaction, creating the buyer on first sight of their external id.
#[instrument(skip(pool, request), fields(external_id = %request.user_id))]
pub async fn create_pending(pool: &DBPool, request: &PurchaseRequest) -> Result<Transaction, Error> {
    let external_id = request.user_id.trim();
    if external_id.is_empty() {
        return Err(Error::validation("user_id is required"));
    }
    if request.payment_method.trim().is_empty() {
        return Err(Error::validation("payment_method is required"));
    }
    if request.amount < 0 {
        return Err(Error::validation("amount must not be negative"));
    }
    let content = request.content()?;

    let mut tx = pool.begin().await?;
    match content {
        Some(ContentUnit::Film { film_id }) => {
            films::get(&mut *tx, film_id)
                .await?
                .ok_or(Error::NotFound("film"))?;
        }
        Some(ContentUnit::Season {
            series_id,
            season_id,
        }) => {
            let season = seasons::get(&mut *tx, season_id)
                .await?
                .ok_or(Error::NotFound("season"))?;
            if season.series_id != series_id {
                return Err(Error::validation("season does not belong to series"));
            }
        }
        None => {}
    }

    let user = match users::find_by_external_id(&mut *tx, external_id).await? {
        Some(user) => user,
        None => {
            let login_id = format!("user_{external_id}");
            let user = users::insert(
                &mut *tx,
                &users::NewUser {
                    external_id: Some(external_id),
                    login_id: &login_id,
                    display_name: None,
                    password_hash: None,
                    role: Role::Client,
                },
            )
            .await?;
            info!("created client {login_id} for external id");
            user
        }
    };

    let transaction = transactions::insert_pending(
        &mut *tx,
        &NewTransaction {
            user_id: user.id,
            content,
            amount: request.amount,
            payment_method: request.payment_method.trim(),
            payment_screenshot: request.payment_screenshot.as_deref(),
            description: request.description.as_deref(),
        },
    )
    .await?;
    tx.commit().await?;
    info!("pending transaction {} recorded", transaction.id);
    Ok(transaction)
}

/// Everything an admin picks when provisioning a client by hand.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientBundle {
    pub login_id: String,
    pub password: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub film_ids: Vec<Uuid>,
    #[serde(default)]
    pub season_ids: Vec<Uuid>,
    /// Defaults to the configured entitlement period.
    pub duration_days: Option<u32>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionedAccount {
    pub user: User,
    pub token: AccessToken,
    pub purchases: Vec<TokenPurchase>,
    pub transaction: Transaction,
}

pub fn bundle_total<I: IntoIterator<Item = i64>>(prices: I) -> i64 {
    prices.into_iter().sum()
}

/// Creates the client, one token holding every selected film and season, and a confirmed
/// transaction for the total, all or nothing.
#[instrument(skip(pool, config, bundle), fields(login_id = %bundle.login_id))]
pub async fn create_client_account(
    pool: &DBPool,
    config: &Config,
    admin_id: Uuid,
    bundle: &ClientBundle,
) -> Result<ProvisionedAccount, Error> {
    let login_id = bundle.login_id.trim();
    if login_id.is_empty() {
        return Err(Error::validation("login_id is required"));
    }
    if bundle.password.is_empty() {
        return Err(Error::validation("password is required"));
    }
    let film_ids = bundle.film_ids.iter().copied().unique().collect_vec();
    let season_ids = bundle.season_ids.iter().copied().unique().collect_vec();
    if film_ids.is_empty() && season_ids.is_empty() {
        return Err(Error::validation("select at least one film or season"));
    }
    let duration = bundle
        .duration_days
        .map_or_else(|| config.entitlement_duration(), |days| Duration::days(i64::from(days)));
    let password_hash = hash_password(&bundle.password).await?;

    let mut tx = pool.begin().await?;
    let films = films::get_many(&mut *tx, &film_ids).await?;
    if films.len() != film_ids.len() {
        return Err(Error::NotFound("film"));
    }
    let seasons = seasons::get_many(&mut *tx, &season_ids).await?;
    if seasons.len() != season_ids.len() {
        return Err(Error::NotFound("season"));
    }
    let total = bundle_total(
        films
            .iter()
            .map(|f| f.price)
            .chain(seasons.iter().map(|s| s.price)),
    );

    let user = users::insert(
        &mut *tx,
        &users::NewUser {
            external_id: None,
            login_id,
            display_name: bundle.display_name.as_deref(),
            password_hash: Some(&password_hash),
            role: Role::Client,
        },
    )
    .await?;

    let now = Utc::now();
    let expires_at = now + duration;
    let token = tokens::insert(&mut *tx, user.id, &random_token(), total, Some(&expires_at)).await?;
    let units = films
        .iter()
        .map(|f| ContentUnit::Film { film_id: f.id })
        .chain(seasons.iter().map(|s| ContentUnit::Season {
            series_id: s.series_id,
            season_id: s.id,
        }));
    let mut purchases = Vec::with_capacity(films.len() + seasons.len());
    for unit in units {
        purchases.push(tokens::insert_purchase(&mut *tx, token.id, unit).await?);
    }

    let payment_method = bundle
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(ADMIN_CREATION);
    let transaction = transactions::insert_resolved(
        &mut *tx,
        &NewTransaction {
            user_id: user.id,
            content: None,
            amount: total,
            payment_method,
            payment_screenshot: None,
            description: bundle.description.as_deref(),
        },
        &Resolution {
            status: TransactionStatus::Confirmed,
            confirmed_by: admin_id,
            confirmed_at: now,
            access_token_id: Some(token.id),
        },
    )
    .await?;
    tx.commit().await?;
    info!(
        "provisioned client {} with {} purchases totalling {total}",
        user.login_id,
        purchases.len()
    );

    Ok(ProvisionedAccount {
        user,
        token,
        purchases,
        transaction,
    })
}

/// Deletes every transaction and the payment screenshots they referenced.
#[instrument(skip_all)]
pub async fn reset_transactions(pool: &DBPool, storage: &MediaStorage) -> Result<u64, Error> {
    let mut tx = pool.begin().await?;
    let screenshots = transactions::screenshots(&mut *tx).await?;
    let deleted = transactions::delete_all(&mut *tx).await?;
    tx.commit().await?;

    let files = screenshots
        .into_iter()
        .map(|name| StoredFile {
            kind: MediaKind::Screenshot,
            name,
        })
        .collect_vec();
    storage.remove_all(&files).await;
    info!("deleted {deleted} transactions");
    Ok(deleted)
}
