use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use uuid::Uuid;

use crate::access::{self, ContentRef};
use crate::auth::{AdminUser, ClientUser};
use crate::errors::Error;
use crate::state::DBPool;
use crate::storage::{MediaKind, MediaStorage};
use crate::streaming;

/// Streams a purchased film or episode, honouring `Range`.
pub async fn stream(
    ClientUser(user): ClientUser,
    Path((content_type, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    State(pool): State<DBPool>,
    State(storage): State<MediaStorage>,
) -> Result<Response, Error> {
    let content = ContentRef::parse(&content_type, id)?;
    let item = access::deliverable(&pool, user.id, content).await?;
    let path = storage.path(item.kind, &item.media_file)?;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    streaming::stream_file(&path, range).await
}

pub async fn thumbnail(
    Path(name): Path<String>,
    State(storage): State<MediaStorage>,
) -> Result<Response, Error> {
    let path = storage.path(MediaKind::Thumbnail, &name)?;
    streaming::stream_file(&path, None).await
}

/// Payment proofs are only shown to admins reviewing transactions.
pub async fn screenshot(
    AdminUser(_): AdminUser,
    Path(name): Path<String>,
    State(storage): State<MediaStorage>,
) -> Result<Response, Error> {
    let path = storage.path(MediaKind::Screenshot, &name)?;
    streaming::stream_file(&path, None).await
}
