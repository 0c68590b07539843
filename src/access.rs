//! Entitlement checks in front of content delivery.

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{group_series, SeriesTree};
use crate::datasource::repository::{episodes, films, seasons, series, tokens};
use crate::errors::Error;
use crate::models::{ContentUnit, Entitlement, Episode, Film, Season, Series};
use crate::state::DBPool;
use crate::storage::MediaKind;

/// Something a client asks to watch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Film(Uuid),
    Episode(Uuid),
}

impl ContentRef {
    /// Parses the `:content_type/:id` pair used by delivery routes.
    pub fn parse(content_type: &str, id: Uuid) -> Result<Self, Error> {
        match content_type {
            "film" => Ok(Self::Film(id)),
            "episode" => Ok(Self::Episode(id)),
            other => Err(Error::validation(format!("unknown content type {other}"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    Grant,
    Deny,
}

/// Grants when any active entitlement names exactly `unit`.
pub fn decide(entitlements: &[Entitlement], unit: ContentUnit, now: DateTime<Utc>) -> Access {
    let granted = entitlements
        .iter()
        .any(|line| line.content == unit && line.is_active_at(now));
    if granted {
        Access::Grant
    } else {
        Access::Deny
    }
}

/// The purchasable unit a piece of content belongs to.
async fn unit_for(pool: &DBPool, content: ContentRef) -> Result<ContentUnit, Error> {
    match content {
        ContentRef::Film(film_id) => {
            if films::get(pool, film_id).await?.is_none() {
                return Err(Error::NotFound("film"));
            }
            Ok(ContentUnit::Film { film_id })
        }
        ContentRef::Episode(episode_id) => {
            let placement = episodes::placement(pool, episode_id)
                .await?
                .ok_or(Error::NotFound("episode"))?;
            Ok(ContentUnit::Season {
                series_id: placement.series_id,
                season_id: placement.season_id,
            })
        }
    }
}

pub async fn authorize(pool: &DBPool, user_id: Uuid, content: ContentRef) -> Result<Access, Error> {
    let unit = unit_for(pool, content).await?;
    let entitlements = tokens::entitlements_for_user(pool, user_id).await?;
    let access = decide(&entitlements, unit, Utc::now());
    debug!("{content:?} for user {user_id}: {access:?}");
    Ok(access)
}

/// A media file the user may receive.
#[derive(Debug, Clone)]
pub struct Deliverable {
    pub title: String,
    pub kind: MediaKind,
    pub media_file: String,
}

/// Authorizes and resolves the file behind `content`. Denial is [`Error::AccessDenied`].
pub async fn deliverable(
    pool: &DBPool,
    user_id: Uuid,
    content: ContentRef,
) -> Result<Deliverable, Error> {
    if authorize(pool, user_id, content).await? == Access::Deny {
        return Err(Error::AccessDenied);
    }
    match content {
        ContentRef::Film(id) => {
            let film = films::get(pool, id).await?.ok_or(Error::NotFound("film"))?;
            Ok(Deliverable {
                title: film.title,
                kind: MediaKind::Film,
                media_file: film.media_file,
            })
        }
        ContentRef::Episode(id) => {
            let episode = episodes::get(pool, id)
                .await?
                .ok_or(Error::NotFound("episode"))?;
            Ok(Deliverable {
                title: episode.title,
                kind: MediaKind::Episode,
                media_file: episode.media_file,
            })
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FilmPage {
    pub film: Film,
    pub formatted_duration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EpisodePage {
    pub episode: Episode,
    pub formatted_duration: Option<String>,
    pub season: Season,
    pub series: Series,
    /// The season's episodes in order, for navigation.
    pub episodes: Vec<Episode>,
}

pub async fn film_page(pool: &DBPool, user_id: Uuid, film_id: Uuid) -> Result<FilmPage, Error> {
    if authorize(pool, user_id, ContentRef::Film(film_id)).await? == Access::Deny {
        return Err(Error::AccessDenied);
    }
    let film = films::get(pool, film_id)
        .await?
        .ok_or(Error::NotFound("film"))?;
    Ok(FilmPage {
        formatted_duration: film.formatted_duration(),
        film,
    })
}

pub async fn episode_page(
    pool: &DBPool,
    user_id: Uuid,
    episode_id: Uuid,
) -> Result<EpisodePage, Error> {
    if authorize(pool, user_id, ContentRef::Episode(episode_id)).await? == Access::Deny {
        return Err(Error::AccessDenied);
    }
    let episode = episodes::get(pool, episode_id)
        .await?
        .ok_or(Error::NotFound("episode"))?;
    let season = seasons::get(pool, episode.season_id)
        .await?
        .ok_or(Error::NotFound("season"))?;
    let series = series::get(pool, season.series_id)
        .await?
        .ok_or(Error::NotFound("series"))?;
    let episodes = episodes::list_for_season(pool, season.id).await?;
    Ok(EpisodePage {
        formatted_duration: episode.formatted_duration(),
        episode,
        season,
        series,
        episodes,
    })
}

/// Everything the client may currently watch.
#[derive(Debug, Serialize)]
pub struct Library {
    pub films: Vec<Film>,
    pub series: Vec<SeriesTree>,
}

/// Film ids and season ids granted by active entitlements.
pub fn active_units(
    entitlements: &[Entitlement],
    now: DateTime<Utc>,
) -> (AHashSet<Uuid>, AHashSet<Uuid>) {
    let mut film_ids = AHashSet::new();
    let mut season_ids = AHashSet::new();
    for line in entitlements.iter().filter(|line| line.is_active_at(now)) {
        match line.content {
            ContentUnit::Film { film_id } => {
                film_ids.insert(film_id);
            }
            ContentUnit::Season { season_id, .. } => {
                season_ids.insert(season_id);
            }
        }
    }
    (film_ids, season_ids)
}

/// Collects the library from every active token. Fails with [`Error::AccessDenied`] without one.
pub async fn library(pool: &DBPool, user_id: Uuid) -> Result<Library, Error> {
    let now = Utc::now();
    let has_active_token = tokens::list_for_user(pool, user_id)
        .await?
        .iter()
        .any(|token| token.is_active_at(now));
    if !has_active_token {
        return Err(Error::AccessDenied);
    }

    let entitlements = tokens::entitlements_for_user(pool, user_id).await?;
    let (film_ids, season_ids) = active_units(&entitlements, now);
    let film_ids: Vec<_> = film_ids.into_iter().collect();
    let season_ids: Vec<_> = season_ids.into_iter().collect();

    let films = films::get_many(pool, &film_ids).await?;
    let seasons = seasons::get_many(pool, &season_ids).await?;
    let series_ids: Vec<_> = seasons
        .iter()
        .map(|s| s.series_id)
        .collect::<AHashSet<_>>()
        .into_iter()
        .collect();
    let series = series::get_many(pool, &series_ids).await?;
    let episodes = episodes::list_for_seasons(pool, &season_ids).await?;

    Ok(Library {
        films,
        series: group_series(series, seasons, episodes),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn line(content: ContentUnit, expires_at: Option<DateTime<Utc>>) -> Entitlement {
        Entitlement {
            token_id: Uuid::new_v4(),
            expires_at,
            content,
        }
    }

    #[test]
    fn test_film_entitlement_grants_film() {
        let now = Utc::now();
        let film_id = Uuid::new_v4();
        let unit = ContentUnit::Film { film_id };
        let lines = vec![line(unit, Some(now + Duration::days(30)))];
        assert_eq!(decide(&lines, unit, now), Access::Grant);
    }

    #[test]
    fn test_nothing_purchased_denies() {
        let unit = ContentUnit::Film {
            film_id: Uuid::new_v4(),
        };
        assert_eq!(decide(&[], unit, Utc::now()), Access::Deny);
    }

    #[test]
    fn test_expired_token_never_grants() {
        let now = Utc::now();
        let unit = ContentUnit::Film {
            film_id: Uuid::new_v4(),
        };
        let lines = vec![line(unit, Some(now - Duration::seconds(1)))];
        assert_eq!(decide(&lines, unit, now), Access::Deny);
    }

    #[test]
    fn test_token_without_expiry_grants() {
        let unit = ContentUnit::Film {
            film_id: Uuid::new_v4(),
        };
        assert_eq!(decide(&[line(unit, None)], unit, Utc::now()), Access::Grant);
    }

    #[test]
    fn test_season_purchase_does_not_cover_other_seasons() {
        let now = Utc::now();
        let series_id = Uuid::new_v4();
        let bought = ContentUnit::Season {
            series_id,
            season_id: Uuid::new_v4(),
        };
        let other = ContentUnit::Season {
            series_id,
            season_id: Uuid::new_v4(),
        };
        let lines = vec![line(bought, None)];
        assert_eq!(decide(&lines, bought, now), Access::Grant);
        assert_eq!(decide(&lines, other, now), Access::Deny);
    }

    #[test]
    fn test_any_active_line_is_enough() {
        let now = Utc::now();
        let unit = ContentUnit::Film {
            film_id: Uuid::new_v4(),
        };
        let lines = vec![
            line(unit, Some(now - Duration::days(1))),
            line(unit, Some(now + Duration::days(1))),
        ];
        assert_eq!(decide(&lines, unit, now), Access::Grant);
    }

    #[test]
    fn test_active_units_skip_expired_lines() {
        let now = Utc::now();
        let live_film = Uuid::new_v4();
        let season_id = Uuid::new_v4();
        let lines = vec![
            line(ContentUnit::Film { film_id: live_film }, None),
            line(
                ContentUnit::Film {
                    film_id: Uuid::new_v4(),
                },
                Some(now - Duration::days(1)),
            ),
            line(
                ContentUnit::Season {
                    series_id: Uuid::new_v4(),
                    season_id,
                },
                Some(now + Duration::days(1)),
            ),
        ];
        let (films, seasons) = active_units(&lines, now);
        assert_eq!(films.len(), 1);
        assert!(films.contains(&live_film));
        assert_eq!(seasons.len(), 1);
        assert!(seasons.contains(&season_id));
    }

    #[test]
    fn test_content_ref_parse() {
        let id = Uuid::new_v4();
        assert_eq!(ContentRef::parse("film", id).unwrap(), ContentRef::Film(id));
        assert_eq!(
            ContentRef::parse("episode", id).unwrap(),
            ContentRef::Episode(id)
        );
        assert!(ContentRef::parse("season", id).is_err());
    }
}
