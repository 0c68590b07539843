use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::access::{self, ContentRef, EpisodePage, FilmPage, Library};
use crate::auth::ClientUser;
use crate::errors::Error;
use crate::state::DBPool;
use crate::storage::MediaStorage;
use crate::streaming;

pub async fn library(
    ClientUser(user): ClientUser,
    State(pool): State<DBPool>,
) -> Result<Json<Library>, Error> {
    Ok(Json(access::library(&pool, user.id).await?))
}

pub async fn watch_film(
    ClientUser(user): ClientUser,
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
) -> Result<Json<FilmPage>, Error> {
    Ok(Json(access::film_page(&pool, user.id, id).await?))
}

pub async fn watch_episode(
    ClientUser(user): ClientUser,
    Path(id): Path<Uuid>,
    State(pool): State<DBPool>,
) -> Result<Json<EpisodePage>, Error> {
    Ok(Json(access::episode_page(&pool, user.id, id).await?))
}

pub async fn download(
    ClientUser(user): ClientUser,
    Path((content_type, id)): Path<(String, Uuid)>,
    State(pool): State<DBPool>,
    State(storage): State<MediaStorage>,
) -> Result<Response, Error> {
    let content = ContentRef::parse(&content_type, id)?;
    let item = access::deliverable(&pool, user.id, content).await?;
    let path = storage.path(item.kind, &item.media_file)?;
    let name = streaming::download_name(&item.title, &item.media_file);
    streaming::download_file(&path, &name).await
}
