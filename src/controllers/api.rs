use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::auth::AdminUser;
use crate::catalog::{BotFilm, BotSeries, Catalog, CatalogExport};
use crate::config::Config;
use crate::controllers::form::UploadForm;
use crate::errors::Error;
use crate::ledger::{self, PurchaseRequest};
use crate::models::Transaction;
use crate::state::DBPool;
use crate::storage::{MediaKind, MediaStorage};

const SCREENSHOT_FILES: &[(&str, MediaKind)] = &[("screenshot", MediaKind::Screenshot)];

#[derive(Debug, Serialize)]
pub struct UploadedScreenshot {
    /// The value to send as `payment_screenshot` with the transaction.
    pub payment_screenshot: String,
}

pub async fn upload_screenshot(
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedScreenshot>), Error> {
    let form = UploadForm::read(multipart, &storage, &config, SCREENSHOT_FILES).await?;
    let stored = form.required_file("screenshot").cloned();
    let screenshot = form.discard_on_err(&storage, stored).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadedScreenshot {
            payment_screenshot: screenshot.name,
        }),
    ))
}

pub async fn create_transaction(
    State(pool): State<DBPool>,
    State(storage): State<MediaStorage>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    if let Some(name) = request.payment_screenshot.as_deref() {
        ledger::check_screenshot(&storage, name).await?;
    }
    let transaction = ledger::create_pending(&pool, &request).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn export(
    AdminUser(_): AdminUser,
    State(catalog): State<Catalog>,
) -> Result<Json<CatalogExport>, Error> {
    Ok(Json(catalog.export().await?))
}

pub async fn bot_films(State(catalog): State<Catalog>) -> Result<Json<Vec<BotFilm>>, Error> {
    Ok(Json(catalog.bot_films().await?))
}

pub async fn bot_series(State(catalog): State<Catalog>) -> Result<Json<Vec<BotSeries>>, Error> {
    Ok(Json(catalog.bot_series().await?))
}
