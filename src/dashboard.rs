use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::datasource::repository::reports::{self, StatusCounts};
use crate::datasource::repository::{episodes, films, seasons, series, transactions};
use crate::errors::Error;
use crate::ledger::ADMIN_CREATION;
use crate::models::TransactionOverview;
use crate::state::DBPool;

#[derive(Debug, Serialize)]
pub struct CatalogCounts {
    pub films: i64,
    pub series: i64,
    pub seasons: i64,
    pub episodes: i64,
}

#[derive(Debug, Serialize)]
pub struct Revenue {
    pub total: i64,
    pub this_month: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub catalog: CatalogCounts,
    pub transactions: TransactionCounts,
    pub revenue: Revenue,
    pub recent_activity: Vec<TransactionOverview>,
}

#[derive(Debug, Serialize)]
pub struct TransactionCounts {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
}

impl From<StatusCounts> for TransactionCounts {
    fn from(value: StatusCounts) -> Self {
        Self {
            total: value.total,
            pending: value.pending,
            confirmed: value.confirmed,
            rejected: value.rejected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionStats {
    #[serde(flatten)]
    pub counts: TransactionCounts,
    pub total_revenue: i64,
    pub admin_created_revenue: i64,
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

pub async fn dashboard(pool: &DBPool, recent_limit: u32) -> Result<DashboardStats, Error> {
    let catalog = CatalogCounts {
        films: films::count(pool).await?,
        series: series::count(pool).await?,
        seasons: seasons::count(pool).await?,
        episodes: episodes::count(pool).await?,
    };
    let counts = reports::status_counts(pool).await?;
    let since = month_start(Utc::now());
    let revenue = Revenue {
        total: reports::confirmed_revenue(pool, None).await?,
        this_month: reports::confirmed_revenue(pool, Some(&since)).await?,
    };
    let recent_activity = transactions::recent(pool, i64::from(recent_limit)).await?;
    Ok(DashboardStats {
        catalog,
        transactions: counts.into(),
        revenue,
        recent_activity,
    })
}

pub async fn transaction_stats(pool: &DBPool) -> Result<TransactionStats, Error> {
    let counts = reports::status_counts(pool).await?;
    Ok(TransactionStats {
        counts: counts.into(),
        total_revenue: reports::confirmed_revenue(pool, None).await?,
        admin_created_revenue: reports::revenue_for_method(pool, ADMIN_CREATION).await?,
    })
}
