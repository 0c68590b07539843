use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::catalog::{Catalog, EpisodeInput, FilmInput, SeasonInput, SeriesInput, SeriesTree};
use crate::config::Config;
use crate::controllers::form::UploadForm;
use crate::dashboard::{self, DashboardStats, TransactionStats};
use crate::datasource::repository::transactions;
use crate::errors::Error;
use crate::ledger::{self, ClientBundle, ProvisionedAccount};
use crate::models::{Episode, Film, Season, Series, Transaction, TransactionOverview, TransactionStatus};
use crate::state::DBPool;
use crate::storage::{MediaKind, MediaStorage};

const FILM_FILES: &[(&str, MediaKind)] = &[
    ("media_file", MediaKind::Film),
    ("thumbnail", MediaKind::Thumbnail),
];
const SERIES_FILES: &[(&str, MediaKind)] = &[("thumbnail", MediaKind::Thumbnail)];
const EPISODE_FILES: &[(&str, MediaKind)] = &[("media_file", MediaKind::Episode)];

fn film_input(form: &UploadForm) -> Result<FilmInput, Error> {
    Ok(FilmInput {
        title: form.required("title")?.to_owned(),
        year: form.number("year")?,
        description: form.required("description")?.to_owned(),
        price: form.number("price")?,
        genre: form.optional("genre").map(ToOwned::to_owned),
    })
}

fn series_input(form: &UploadForm) -> Result<SeriesInput, Error> {
    Ok(SeriesInput {
        title: form.required("title")?.to_owned(),
        description: form.required("description")?.to_owned(),
    })
}

fn episode_input(form: &UploadForm) -> Result<EpisodeInput, Error> {
    Ok(EpisodeInput {
        episode_number: form.number("episode_number")?,
        title: form.required("title")?.to_owned(),
    })
}

pub async fn dashboard(
    AdminUser(_): AdminUser,
    State(pool): State<DBPool>,
    State(config): State<Arc<Config>>,
) -> Result<Json<DashboardStats>, Error> {
    let stats = dashboard::dashboard(&pool, config.recent_activity_limit).await?;
    Ok(Json(stats))
}

pub async fn list_films(
    AdminUser(_): AdminUser,
    State(catalog): State<Catalog>,
) -> Result<Json<Vec<Film>>, Error> {
    Ok(Json(catalog.list_films().await?))
}

pub async fn get_film(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<Json<Film>, Error> {
    Ok(Json(catalog.film(id).await?))
}

pub async fn create_film(
    AdminUser(_): AdminUser,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Film>), Error> {
    let form = UploadForm::read(multipart, &storage, &config, FILM_FILES).await?;
    let parsed = film_input(&form).and_then(|input| {
        let media = form.required_file("media_file")?.clone();
        Ok((input, media))
    });
    let (input, media) = form.discard_on_err(&storage, parsed).await?;
    let film = catalog
        .create_film(&input, &media, form.file("thumbnail"))
        .await?;
    Ok((StatusCode::CREATED, Json(film)))
}

pub async fn update_film(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<Json<Film>, Error> {
    let form = UploadForm::read(multipart, &storage, &config, FILM_FILES).await?;
    let input = form.discard_on_err(&storage, film_input(&form)).await?;
    let film = catalog
        .update_film(id, &input, form.file("media_file"), form.file("thumbnail"))
        .await?;
    Ok(Json(film))
}

pub async fn delete_film(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<StatusCode, Error> {
    catalog.delete_film(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_series(
    AdminUser(_): AdminUser,
    State(catalog): State<Catalog>,
) -> Result<Json<Vec<Series>>, Error> {
    Ok(Json(catalog.list_series().await?))
}

pub async fn get_series(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<Json<SeriesTree>, Error> {
    Ok(Json(catalog.series_tree(id).await?))
}

pub async fn create_series(
    AdminUser(_): AdminUser,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Series>), Error> {
    let form = UploadForm::read(multipart, &storage, &config, SERIES_FILES).await?;
    let input = form.discard_on_err(&storage, series_input(&form)).await?;
    let series = catalog
        .create_series(&input, form.file("thumbnail"))
        .await?;
    Ok((StatusCode::CREATED, Json(series)))
}

pub async fn update_series(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<Json<Series>, Error> {
    let form = UploadForm::read(multipart, &storage, &config, SERIES_FILES).await?;
    let input = form.discard_on_err(&storage, series_input(&form)).await?;
    let series = catalog
        .update_series(id, &input, form.file("thumbnail"))
        .await?;
    Ok(Json(series))
}

pub async fn delete_series(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<StatusCode, Error> {
    catalog.delete_series(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_seasons(
    AdminUser(_): AdminUser,
    Path(series_id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<Json<Vec<Season>>, Error> {
    Ok(Json(catalog.list_seasons(series_id).await?))
}

pub async fn get_season(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<Json<Season>, Error> {
    Ok(Json(catalog.season(id).await?))
}

pub async fn create_season(
    AdminUser(_): AdminUser,
    Path(series_id): Path<Uuid>,
    State(catalog): State<Catalog>,
    Json(input): Json<SeasonInput>,
) -> Result<(StatusCode, Json<Season>), Error> {
    let season = catalog.create_season(series_id, &input).await?;
    Ok((StatusCode::CREATED, Json(season)))
}

pub async fn update_season(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
    Json(input): Json<SeasonInput>,
) -> Result<Json<Season>, Error> {
    Ok(Json(catalog.update_season(id, &input).await?))
}

pub async fn delete_season(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<StatusCode, Error> {
    catalog.delete_season(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_episodes(
    AdminUser(_): AdminUser,
    Path(season_id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<Json<Vec<Episode>>, Error> {
    Ok(Json(catalog.list_episodes(season_id).await?))
}

pub async fn create_episode(
    AdminUser(_): AdminUser,
    Path(season_id): Path<Uuid>,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Episode>), Error> {
    let form = UploadForm::read(multipart, &storage, &config, EPISODE_FILES).await?;
    let parsed = episode_input(&form).and_then(|input| {
        let media = form.required_file("media_file")?.clone();
        Ok((input, media))
    });
    let (input, media) = form.discard_on_err(&storage, parsed).await?;
    let episode = catalog.create_episode(season_id, &input, &media).await?;
    Ok((StatusCode::CREATED, Json(episode)))
}

pub async fn update_episode(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
    State(storage): State<MediaStorage>,
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<Json<Episode>, Error> {
    let form = UploadForm::read(multipart, &storage, &config, EPISODE_FILES).await?;
    let input = form.discard_on_err(&storage, episode_input(&form)).await?;
    let episode = catalog
        .update_episode(id, &input, form.file("media_file"))
        .await?;
    Ok(Json(episode))
}

pub async fn delete_episode(
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    State(catalog): State<Catalog>,
) -> Result<StatusCode, Error> {
    catalog.delete_episode(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    status: Option<TransactionStatus>,
}

pub async fn list_transactions(
    AdminUser(_): AdminUser,
    Query(params): Query<TransactionQuery>,
    State(pool): State<DBPool>,
) -> Result<Json<Vec<TransactionOverview>>, Error> {
    Ok(Json(transactions::list(&pool, params.status).await?))
}

pub async fn transaction_stats(
    AdminUser(_): AdminUser,
    State(pool): State<DBPool>,
) -> Result<Json<TransactionStats>, Error> {
    Ok(Json(dashboard::transaction_stats(&pool).await?))
}

pub async fn confirm_transaction(
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
    State(config): State<Arc<Config>>,
) -> Result<Json<Transaction>, Error> {
    Ok(Json(ledger::confirm(&pool, &config, id, admin.id).await?))
}

pub async fn reject_transaction(
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
    State(config): State<Arc<Config>>,
) -> Result<Json<Transaction>, Error> {
    Ok(Json(ledger::reject(&pool, &config, id, admin.id).await?))
}

pub async fn reset_transactions(
    AdminUser(admin): AdminUser,
    State(pool): State<DBPool>,
    State(storage): State<MediaStorage>,
) -> Result<Json<Value>, Error> {
    let deleted = ledger::reset_transactions(&pool, &storage).await?;
    tracing::warn!("{} reset all transactions", admin.login_id);
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn create_client(
    AdminUser(admin): AdminUser,
    State(pool): State<DBPool>,
    State(config): State<Arc<Config>>,
    Json(bundle): Json<ClientBundle>,
) -> Result<(StatusCode, Json<ProvisionedAccount>), Error> {
    let account = ledger::create_client_account(&pool, &config, admin.id, &bundle).await?;
    Ok((StatusCode::CREATED, Json(account)))
}
