use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("access denied")]
    AccessDenied,
    #[error("{0}")]
    Conflict(String),
    #[error("range not satisfiable for {0} bytes")]
    RangeNotSatisfiable(u64),
    #[error("storage failure: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Database(sqlx::Error),
    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Error {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Multipart(e) => e.status(),
            Self::Storage(_) | Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = value {
            return Self::NotFound("record");
        }
        if let Some(db_error) = value.as_database_error() {
            match db_error.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return Self::Conflict(conflict_message(db_error.constraint()).to_owned())
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return Self::validation("referenced content does not exist")
                }
                Some(CHECK_VIOLATION) => {
                    return Self::validation("content reference is inconsistent")
                }
                _ => {}
            }
        }
        Self::Database(value)
    }
}

fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("seasons_series_number_unique") => "this season already exists for the series",
        Some("episodes_season_number_unique") => "this episode already exists for the season",
        Some("users_login_id_unique") => "a user with this login already exists",
        Some("users_external_id_unique") => "a user with this external id already exists",
        _ => "resource already exists",
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status.is_server_error() {
            error!("request failed with {self}");
            "internal server error".to_owned()
        } else {
            debug!("request rejected with {self}");
            self.to_string()
        };
        let body = Json(json!({
            "error": error_message,
        }));
        match self {
            Self::RangeNotSatisfiable(total) => (
                status,
                [(axum::http::header::CONTENT_RANGE, format!("bytes */{total}"))],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

pub type InternalError = anyhow::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::validation("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::AccessDenied.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::NotFound("film").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::conflict("transaction already processed")
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            Error::from(sqlx::Error::RowNotFound),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_range_not_satisfiable_has_content_range() {
        let response = Error::RangeNotSatisfiable(1000).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_RANGE],
            "bytes */1000"
        );
    }

    #[test]
    fn test_conflict_messages() {
        assert_eq!(
            conflict_message(Some("seasons_series_number_unique")),
            "this season already exists for the series"
        );
        assert_eq!(conflict_message(None), "resource already exists");
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = Error::Internal(anyhow::anyhow!("connection string leaked"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
