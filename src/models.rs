use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub login_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Film {
    pub id: Uuid,
    pub title: String,
    pub year: i32,
    pub description: String,
    pub price: i64,
    pub genre: String,
    pub thumbnail: Option<String>,
    pub media_file: String,
    pub duration: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Film {
    pub fn formatted_duration(&self) -> Option<String> {
        self.duration.map(|d| format_duration(d, true))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Season {
    pub id: Uuid,
    pub series_id: Uuid,
    pub season_number: i32,
    pub year: i32,
    pub description: Option<String>,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub id: Uuid,
    pub season_id: Uuid,
    pub episode_number: i32,
    pub title: String,
    pub media_file: String,
    pub duration: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Episode {
    pub fn formatted_duration(&self) -> Option<String> {
        self.duration.map(|d| format_duration(d, false))
    }
}

/// Formats a duration in seconds the way the catalog displays it.
///
/// With `with_hours`, anything of an hour or longer is shown as `1h 05min`.
/// Everything else is shown as total minutes and seconds, `12min 07s`.
pub fn format_duration(seconds: u32, with_hours: bool) -> String {
    let hours = seconds / 3600;
    if with_hours && hours > 0 {
        let minutes = (seconds % 3600) / 60;
        return format!("{hours}h {minutes:02}min");
    }
    format!("{}min {:02}s", seconds / 60, seconds % 60)
}

/// A single purchasable unit of content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentUnit {
    Film { film_id: Uuid },
    Season { series_id: Uuid, season_id: Uuid },
}

impl ContentUnit {
    /// Reads the nullable `film_id`/`series_id`/`season_id` column triple used by the ledger tables.
    pub fn from_columns(
        film_id: Option<Uuid>,
        series_id: Option<Uuid>,
        season_id: Option<Uuid>,
    ) -> Option<Self> {
        match (film_id, series_id, season_id) {
            (Some(film_id), _, _) => Some(Self::Film { film_id }),
            (None, Some(series_id), Some(season_id)) => Some(Self::Season {
                series_id,
                season_id,
            }),
            _ => None,
        }
    }

    /// The `(film_id, series_id, season_id)` columns for this unit.
    pub fn columns(self) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>) {
        match self {
            Self::Film { film_id } => (Some(film_id), None, None),
            Self::Season {
                series_id,
                season_id,
            } => (None, Some(series_id), Some(season_id)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
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

impl Transaction {
    /// The content this purchase request is for, if it names any.
    pub fn content(&self) -> Option<ContentUnit> {
        ContentUnit::from_columns(self.film_id, self.series_id, self.season_id)
    }
}

/// A transaction as shown in review lists, with the names behind its ids.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOverview {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub client_login: String,
    pub confirmed_by_login: Option<String>,
    pub content_summary: Option<String>,
}

/// `Film: <title>` or `<series> - Season <n>`.
pub fn content_summary(
    film_title: Option<&str>,
    series_title: Option<&str>,
    season_number: Option<i32>,
) -> Option<String> {
    match (film_title, series_title, season_number) {
        (Some(film), _, _) => Some(format!("Film: {film}")),
        (None, Some(series), Some(number)) => Some(format!("{series} - Season {number}")),
        (None, Some(series), None) => Some(series.to_owned()),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        is_active(self.expires_at, now)
    }
}

/// A grant without expiry never lapses; otherwise it holds up to and including `expires_at`.
pub fn is_active(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |expiry| expiry >= now)
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPurchase {
    pub id: Uuid,
    pub token_id: Uuid,
    #[serde(flatten)]
    pub content: ContentUnit,
}

/// One purchase line joined with the expiry of the token that carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub token_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub content: ContentUnit,
}

impl Entitlement {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        is_active(self.expires_at, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn transaction() -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            film_id: None,
            series_id: None,
            season_id: None,
            amount: 10,
            payment_method: "orange_money".into(),
            payment_screenshot: None,
            status: TransactionStatus::Pending,
            description: None,
            access_token_id: None,
            created_at: Utc::now(),
            confirmed_at: None,
            confirmed_by: None,
        }
    }

    #[test]
    fn test_format_duration_film_with_hours() {
        assert_eq!(format_duration(3900, true), "1h 05min");
    }

    #[test]
    fn test_format_duration_film_under_an_hour() {
        assert_eq!(format_duration(727, true), "12min 07s");
    }

    #[test]
    fn test_format_duration_episode_counts_minutes() {
        assert_eq!(format_duration(3900, false), "65min 00s");
    }

    #[test]
    fn test_transaction_content_film() {
        let film_id = Uuid::new_v4();
        let t = Transaction {
            film_id: Some(film_id),
            ..transaction()
        };
        assert_eq!(t.content(), Some(ContentUnit::Film { film_id }));
    }

    #[test]
    fn test_transaction_content_season() {
        let series_id = Uuid::new_v4();
        let season_id = Uuid::new_v4();
        let t = Transaction {
            series_id: Some(series_id),
            season_id: Some(season_id),
            ..transaction()
        };
        assert_eq!(
            t.content(),
            Some(ContentUnit::Season {
                series_id,
                season_id
            })
        );
    }

    #[test]
    fn test_transaction_content_series_without_season() {
        let t = Transaction {
            series_id: Some(Uuid::new_v4()),
            ..transaction()
        };
        assert_eq!(t.content(), None);
    }

    #[test]
    fn test_token_activity() {
        let now = Utc::now();
        assert!(is_active(None, now));
        assert!(is_active(Some(now), now));
        assert!(is_active(Some(now + Duration::days(1)), now));
        assert!(!is_active(Some(now - Duration::seconds(1)), now));
    }

    #[test]
    fn test_content_summary() {
        assert_eq!(
            content_summary(Some("Heat"), None, None).as_deref(),
            Some("Film: Heat")
        );
        assert_eq!(
            content_summary(None, Some("Dark"), Some(2)).as_deref(),
            Some("Dark - Season 2")
        );
        assert_eq!(content_summary(None, None, None), None);
    }

    #[test]
    fn test_content_unit_columns() {
        let series_id = Uuid::new_v4();
        let season_id = Uuid::new_v4();
        let unit = ContentUnit::Season {
            series_id,
            season_id,
        };
        let (film, series, season) = unit.columns();
        assert_eq!(ContentUnit::from_columns(film, series, season), Some(unit));
        assert_eq!(ContentUnit::from_columns(None, None, Some(season_id)), None);
    }

    #[test]
    fn test_content_unit_serializes_tagged() {
        let film_id = Uuid::nil();
        let json = serde_json::to_value(ContentUnit::Film { film_id }).unwrap();
        assert_eq!(json["type"], "film");
        assert_eq!(json["film_id"], film_id.to_string());
    }
}
