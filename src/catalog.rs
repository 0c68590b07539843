//! Films, series, seasons and episodes together with the files they own.

use ahash::AHashMap;
use itertools::Itertools;
use probe::Prober;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::datasource::repository::films::FilmRecord;
use crate::datasource::repository::seasons::SeasonRecord;
use crate::datasource::repository::{episodes, films, seasons, series};
use crate::errors::Error;
use crate::models::{Episode, Film, Season, Series};
use crate::state::DBPool;
use crate::storage::{MediaKind, MediaStorage, StoredFile};

const DEFAULT_GENRE: &str = "action";
const EARLIEST_YEAR: i32 = 1888;
const LATEST_YEAR: i32 = 2100;

#[derive(Debug, Clone, Deserialize)]
pub struct FilmInput {
    pub title: String,
    pub year: i32,
    pub description: String,
    pub price: i64,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesInput {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonInput {
    pub season_number: i32,
    pub year: i32,
    pub description: Option<String>,
    pub price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeInput {
    pub episode_number: i32,
    pub title: String,
}

fn require_text(field: &'static str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_price(price: i64) -> Result<(), Error> {
    if price < 0 {
        return Err(Error::validation("price must not be negative"));
    }
    Ok(())
}

fn require_year(year: i32) -> Result<(), Error> {
    if !(EARLIEST_YEAR..=LATEST_YEAR).contains(&year) {
        return Err(Error::validation(format!(
            "year must be between {EARLIEST_YEAR} and {LATEST_YEAR}"
        )));
    }
    Ok(())
}

fn require_number(field: &'static str, number: i32) -> Result<(), Error> {
    if number < 1 {
        return Err(Error::validation(format!("{field} must be at least 1")));
    }
    Ok(())
}

fn require_kind(file: &StoredFile, kind: MediaKind) -> Result<(), Error> {
    if file.kind != kind {
        return Err(Error::validation(format!(
            "expected a {} upload",
            kind.directory()
        )));
    }
    Ok(())
}

impl FilmInput {
    fn validate(&self) -> Result<(), Error> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_year(self.year)?;
        require_price(self.price)
    }

    fn genre(&self) -> &str {
        self.genre
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GENRE)
    }
}

impl SeriesInput {
    fn validate(&self) -> Result<(), Error> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)
    }
}

impl SeasonInput {
    fn validate(&self) -> Result<(), Error> {
        require_number("season_number", self.season_number)?;
        require_year(self.year)?;
        require_price(self.price)
    }

    fn record(&self) -> SeasonRecord<'_> {
        SeasonRecord {
            season_number: self.season_number,
            year: self.year,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty()),
            price: self.price,
        }
    }
}

impl EpisodeInput {
    fn validate(&self) -> Result<(), Error> {
        require_number("episode_number", self.episode_number)?;
        require_text("title", &self.title)
    }
}

#[derive(Debug, Serialize)]
pub struct SeasonTree {
    #[serde(flatten)]
    pub season: Season,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Serialize)]
pub struct SeriesTree {
    #[serde(flatten)]
    pub series: Series,
    pub seasons: Vec<SeasonTree>,
}

/// The whole catalog as one document.
#[derive(Debug, Serialize)]
pub struct CatalogExport {
    pub films: Vec<Film>,
    pub series: Vec<SeriesTree>,
}

/// Nests seasons under their series and episodes under their seasons, keeping input order.
pub fn group_series(
    series: Vec<Series>,
    seasons: Vec<Season>,
    episodes: Vec<Episode>,
) -> Vec<SeriesTree> {
    let mut episodes_by_season: AHashMap<Uuid, Vec<Episode>> = AHashMap::new();
    for episode in episodes {
        episodes_by_season
            .entry(episode.season_id)
            .or_default()
            .push(episode);
    }
    let mut seasons_by_series: AHashMap<Uuid, Vec<SeasonTree>> = AHashMap::new();
    for season in seasons {
        let episodes = episodes_by_season.remove(&season.id).unwrap_or_default();
        seasons_by_series
            .entry(season.series_id)
            .or_default()
            .push(SeasonTree { season, episodes });
    }
    series
        .into_iter()
        .map(|series| SeriesTree {
            seasons: seasons_by_series.remove(&series.id).unwrap_or_default(),
            series,
        })
        .collect()
}

pub fn thumbnail_url(name: &str) -> String {
    format!("/media/{}/{name}", MediaKind::Thumbnail.directory())
}

#[derive(Debug, Serialize)]
pub struct BotFilm {
    pub id: Uuid,
    pub title: String,
    pub year: i32,
    pub description: String,
    pub price: i64,
    pub genre: String,
    pub duration: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl From<Film> for BotFilm {
    fn from(film: Film) -> Self {
        Self {
            duration: film.formatted_duration(),
            thumbnail_url: film.thumbnail.as_deref().map(thumbnail_url),
            id: film.id,
            title: film.title,
            year: film.year,
            description: film.description,
            price: film.price,
            genre: film.genre,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BotEpisode {
    pub id: Uuid,
    pub episode_number: i32,
    pub title: String,
    pub duration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BotSeason {
    pub id: Uuid,
    pub season_number: i32,
    pub year: i32,
    pub description: Option<String>,
    pub price: i64,
    pub episodes: Vec<BotEpisode>,
}

#[derive(Debug, Serialize)]
pub struct BotSeries {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub seasons: Vec<BotSeason>,
}

impl From<SeriesTree> for BotSeries {
    fn from(tree: SeriesTree) -> Self {
        let seasons = tree
            .seasons
            .into_iter()
            .map(|SeasonTree { season, episodes }| BotSeason {
                id: season.id,
                season_number: season.season_number,
                year: season.year,
                description: season.description,
                price: season.price,
                episodes: episodes
                    .into_iter()
                    .map(|episode| BotEpisode {
                        duration: episode.formatted_duration(),
                        id: episode.id,
                        episode_number: episode.episode_number,
                        title: episode.title,
                    })
                    .collect(),
            })
            .collect();
        Self {
            id: tree.series.id,
            thumbnail_url: tree.series.thumbnail.as_deref().map(thumbnail_url),
            title: tree.series.title,
            description: tree.series.description,
            seasons,
        }
    }
}

fn stored(kind: MediaKind, name: String) -> StoredFile {
    StoredFile { kind, name }
}

/// Catalog operations over the database and the media tree.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: DBPool,
    storage: MediaStorage,
    prober: Prober,
}

impl Catalog {
    pub fn new(pool: DBPool, storage: MediaStorage, prober: Prober) -> Self {
        Self {
            pool,
            storage,
            prober,
        }
    }

    /// Drops freshly uploaded files when the operation that received them failed.
    async fn discard_on_error<T>(
        &self,
        result: Result<T, Error>,
        uploads: &[&StoredFile],
    ) -> Result<T, Error> {
        if result.is_err() {
            let uploads = uploads.iter().map(|&file| file.clone()).collect_vec();
            self.storage.remove_all(&uploads).await;
        }
        result
    }

    /// Probes a video. Failures only leave the duration unset.
    async fn probe_duration(&self, file: &StoredFile) -> Option<u32> {
        let path = self.storage.path(file.kind, &file.name).ok()?;
        match self.prober.duration(&path).await {
            Ok(seconds) => Some(seconds),
            Err(err) => {
                warn!("could not determine duration of {}: {err}", file.name);
                None
            }
        }
    }

    pub async fn list_films(&self) -> Result<Vec<Film>, Error> {
        Ok(films::list(&self.pool).await?)
    }

    pub async fn film(&self, id: Uuid) -> Result<Film, Error> {
        films::get(&self.pool, id)
            .await?
            .ok_or(Error::NotFound("film"))
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_film(
        &self,
        input: &FilmInput,
        media: &StoredFile,
        thumbnail: Option<&StoredFile>,
    ) -> Result<Film, Error> {
        let uploads = [Some(media), thumbnail].into_iter().flatten().collect_vec();
        let result: Result<_, Error> = async {
            input.validate()?;
            require_kind(media, MediaKind::Film)?;
            if let Some(thumbnail) = thumbnail {
                require_kind(thumbnail, MediaKind::Thumbnail)?;
            }
            let record = FilmRecord {
                title: input.title.trim(),
                year: input.year,
                description: input.description.trim(),
                price: input.price,
                genre: input.genre(),
                thumbnail: thumbnail.map(|t| t.name.as_str()),
                media_file: &media.name,
            };
            Ok(films::insert(&self.pool, &record).await?)
        }
        .await;
        let mut film = self.discard_on_error(result, &uploads).await?;

        let duration = self.probe_duration(media).await;
        if duration.is_some() {
            films::set_duration(&self.pool, film.id, duration).await?;
            film.duration = duration;
        }
        info!("created film {}", film.id);
        Ok(film)
    }

    /// Updates a film. New files replace the old ones, which are removed once the row points away.
    #[instrument(skip(self, input))]
    pub async fn update_film(
        &self,
        id: Uuid,
        input: &FilmInput,
        media: Option<&StoredFile>,
        thumbnail: Option<&StoredFile>,
    ) -> Result<Film, Error> {
        let uploads = [media, thumbnail].into_iter().flatten().collect_vec();
        let result: Result<_, Error> = async {
            input.validate()?;
            if let Some(media) = media {
                require_kind(media, MediaKind::Film)?;
            }
            if let Some(thumbnail) = thumbnail {
                require_kind(thumbnail, MediaKind::Thumbnail)?;
            }
            let existing = self.film(id).await?;
            let record = FilmRecord {
                title: input.title.trim(),
                year: input.year,
                description: input.description.trim(),
                price: input.price,
                genre: input.genre(),
                thumbnail: thumbnail
                    .map(|t| t.name.as_str())
                    .or(existing.thumbnail.as_deref()),
                media_file: media.map_or(existing.media_file.as_str(), |m| m.name.as_str()),
            };
            let updated = films::update(&self.pool, id, &record)
                .await?
                .ok_or(Error::NotFound("film"))?;
            Ok((existing, updated))
        }
        .await;
        let (existing, mut film) = self.discard_on_error(result, &uploads).await?;

        let mut replaced = Vec::new();
        if media.is_some() {
            replaced.push(stored(MediaKind::Film, existing.media_file));
        }
        if let (Some(_), Some(old)) = (thumbnail, existing.thumbnail) {
            replaced.push(stored(MediaKind::Thumbnail, old));
        }
        self.storage.remove_all(&replaced).await;

        if let Some(media) = media {
            let duration = self.probe_duration(media).await;
            films::set_duration(&self.pool, id, duration).await?;
            film.duration = duration;
        }
        info!("updated film {id}");
        Ok(film)
    }

    #[instrument(skip(self))]
    pub async fn delete_film(&self, id: Uuid) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        let film = films::get(&mut *tx, id)
            .await?
            .ok_or(Error::NotFound("film"))?;
        films::delete(&mut *tx, id).await?;
        tx.commit().await?;

        let mut files = vec![stored(MediaKind::Film, film.media_file)];
        if let Some(thumbnail) = film.thumbnail {
            files.push(stored(MediaKind::Thumbnail, thumbnail));
        }
        self.storage.remove_all(&files).await;
        info!("deleted film {id}");
        Ok(())
    }

    pub async fn list_series(&self) -> Result<Vec<Series>, Error> {
        Ok(series::list(&self.pool).await?)
    }

    pub async fn series(&self, id: Uuid) -> Result<Series, Error> {
        series::get(&self.pool, id)
            .await?
            .ok_or(Error::NotFound("series"))
    }

    /// A series with its seasons and their episodes.
    pub async fn series_tree(&self, id: Uuid) -> Result<SeriesTree, Error> {
        let series = self.series(id).await?;
        let seasons = seasons::list_for_series(&self.pool, id).await?;
        let season_ids = seasons.iter().map(|s| s.id).collect_vec();
        let episodes = episodes::list_for_seasons(&self.pool, &season_ids).await?;
        let mut trees = group_series(vec![series], seasons, episodes);
        trees.pop().ok_or(Error::NotFound("series"))
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_series(
        &self,
        input: &SeriesInput,
        thumbnail: Option<&StoredFile>,
    ) -> Result<Series, Error> {
        let uploads = thumbnail.into_iter().collect_vec();
        let result: Result<_, Error> = async {
            input.validate()?;
            if let Some(thumbnail) = thumbnail {
                require_kind(thumbnail, MediaKind::Thumbnail)?;
            }
            Ok(series::insert(
                &self.pool,
                input.title.trim(),
                input.description.trim(),
                thumbnail.map(|t| t.name.as_str()),
            )
            .await?)
        }
        .await;
        let series = self.discard_on_error(result, &uploads).await?;
        info!("created series {}", series.id);
        Ok(series)
    }

    #[instrument(skip(self, input))]
    pub async fn update_series(
        &self,
        id: Uuid,
        input: &SeriesInput,
        thumbnail: Option<&StoredFile>,
    ) -> Result<Series, Error> {
        let uploads = thumbnail.into_iter().collect_vec();
        let result: Result<_, Error> = async {
            input.validate()?;
            if let Some(thumbnail) = thumbnail {
                require_kind(thumbnail, MediaKind::Thumbnail)?;
            }
            let existing = self.series(id).await?;
            let updated = series::update(
                &self.pool,
                id,
                input.title.trim(),
                input.description.trim(),
                thumbnail
                    .map(|t| t.name.as_str())
                    .or(existing.thumbnail.as_deref()),
            )
            .await?
            .ok_or(Error::NotFound("series"))?;
            Ok((existing, updated))
        }
        .await;
        let (existing, series) = self.discard_on_error(result, &uploads).await?;
        if let (Some(_), Some(old)) = (thumbnail, existing.thumbnail) {
            self.storage
                .remove_all(&[stored(MediaKind::Thumbnail, old)])
                .await;
        }
        info!("updated series {id}");
        Ok(series)
    }

    /// Deletes a series, its seasons and episodes, then every file they owned.
    #[instrument(skip(self))]
    pub async fn delete_series(&self, id: Uuid) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        let series = series::get(&mut *tx, id)
            .await?
            .ok_or(Error::NotFound("series"))?;
        let episode_files = episodes::media_files_for_series(&mut *tx, id).await?;
        let season_ids = seasons::list_for_series(&mut *tx, id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect_vec();
        episodes::delete_for_seasons(&mut *tx, &season_ids).await?;
        seasons::delete_for_series(&mut *tx, id).await?;
        series::delete(&mut *tx, id).await?;
        tx.commit().await?;

        let files = episode_files
            .into_iter()
            .map(|name| stored(MediaKind::Episode, name))
            .chain(
                series
                    .thumbnail
                    .map(|name| stored(MediaKind::Thumbnail, name)),
            )
            .collect_vec();
        self.storage.remove_all(&files).await;
        info!(
            "deleted series {id} with {} seasons and {} files",
            season_ids.len(),
            files.len()
        );
        Ok(())
    }

    pub async fn list_seasons(&self, series_id: Uuid) -> Result<Vec<Season>, Error> {
        self.series(series_id).await?;
        Ok(seasons::list_for_series(&self.pool, series_id).await?)
    }

    pub async fn season(&self, id: Uuid) -> Result<Season, Error> {
        seasons::get(&self.pool, id)
            .await?
            .ok_or(Error::NotFound("season"))
    }

    #[instrument(skip(self, input))]
    pub async fn create_season(&self, series_id: Uuid, input: &SeasonInput) -> Result<Season, Error> {
        input.validate()?;
        self.series(series_id).await?;
        let season = seasons::insert(&self.pool, series_id, &input.record()).await?;
        info!("created season {} of series {series_id}", season.season_number);
        Ok(season)
    }

    #[instrument(skip(self, input))]
    pub async fn update_season(&self, id: Uuid, input: &SeasonInput) -> Result<Season, Error> {
        input.validate()?;
        let season = seasons::update(&self.pool, id, &input.record())
            .await?
            .ok_or(Error::NotFound("season"))?;
        info!("updated season {id}");
        Ok(season)
    }

    #[instrument(skip(self))]
    pub async fn delete_season(&self, id: Uuid) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        seasons::get(&mut *tx, id)
            .await?
            .ok_or(Error::NotFound("season"))?;
        let episode_files = episodes::media_files_for_season(&mut *tx, id).await?;
        episodes::delete_for_seasons(&mut *tx, &[id]).await?;
        seasons::delete(&mut *tx, id).await?;
        tx.commit().await?;

        let files = episode_files
            .into_iter()
            .map(|name| stored(MediaKind::Episode, name))
            .collect_vec();
        self.storage.remove_all(&files).await;
        info!("deleted season {id}");
        Ok(())
    }

    pub async fn list_episodes(&self, season_id: Uuid) -> Result<Vec<Episode>, Error> {
        self.season(season_id).await?;
        Ok(episodes::list_for_season(&self.pool, season_id).await?)
    }

    pub async fn episode(&self, id: Uuid) -> Result<Episode, Error> {
        episodes::get(&self.pool, id)
            .await?
            .ok_or(Error::NotFound("episode"))
    }

    #[instrument(skip(self, input))]
    pub async fn create_episode(
        &self,
        season_id: Uuid,
        input: &EpisodeInput,
        media: &StoredFile,
    ) -> Result<Episode, Error> {
        let result: Result<_, Error> = async {
            input.validate()?;
            require_kind(media, MediaKind::Episode)?;
            self.season(season_id).await?;
            Ok(episodes::insert(
                &self.pool,
                season_id,
                input.episode_number,
                input.title.trim(),
                &media.name,
            )
            .await?)
        }
        .await;
        let mut episode = self.discard_on_error(result, &[media]).await?;

        let duration = self.probe_duration(media).await;
        if duration.is_some() {
            episodes::set_duration(&self.pool, episode.id, duration).await?;
            episode.duration = duration;
        }
        info!("created episode {}", episode.id);
        Ok(episode)
    }

    /// Updates an episode. A new media file is written before the row moves to it and the old one
    /// is removed only afterwards, so a failed update never leaves the episode without a file.
    #[instrument(skip(self, input))]
    pub async fn update_episode(
        &self,
        id: Uuid,
        input: &EpisodeInput,
        media: Option<&StoredFile>,
    ) -> Result<Episode, Error> {
        let uploads = media.into_iter().collect_vec();
        let result: Result<_, Error> = async {
            input.validate()?;
            if let Some(media) = media {
                require_kind(media, MediaKind::Episode)?;
            }
            let existing = self.episode(id).await?;
            let updated = episodes::update(
                &self.pool,
                id,
                input.episode_number,
                input.title.trim(),
                media.map_or(existing.media_file.as_str(), |m| m.name.as_str()),
            )
            .await?
            .ok_or(Error::NotFound("episode"))?;
            Ok((existing, updated))
        }
        .await;
        let (existing, mut episode) = self.discard_on_error(result, &uploads).await?;

        if let Some(media) = media {
            self.storage
                .remove_all(&[stored(MediaKind::Episode, existing.media_file)])
                .await;
            let duration = self.probe_duration(media).await;
            episodes::set_duration(&self.pool, id, duration).await?;
            episode.duration = duration;
        }
        info!("updated episode {id}");
        Ok(episode)
    }

    #[instrument(skip(self))]
    pub async fn delete_episode(&self, id: Uuid) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        let episode = episodes::get(&mut *tx, id)
            .await?
            .ok_or(Error::NotFound("episode"))?;
        episodes::delete(&mut *tx, id).await?;
        tx.commit().await?;

        self.storage
            .remove_all(&[stored(MediaKind::Episode, episode.media_file)])
            .await;
        info!("deleted episode {id}");
        Ok(())
    }

    async fn all_series_trees(&self) -> Result<Vec<SeriesTree>, Error> {
        let series = series::list(&self.pool).await?;
        let series_ids = series.iter().map(|s| s.id).collect_vec();
        let seasons = seasons::list_for_many(&self.pool, &series_ids).await?;
        let season_ids = seasons.iter().map(|s| s.id).collect_vec();
        let episodes = episodes::list_for_seasons(&self.pool, &season_ids).await?;
        Ok(group_series(series, seasons, episodes))
    }

    pub async fn export(&self) -> Result<CatalogExport, Error> {
        Ok(CatalogExport {
            films: films::list(&self.pool).await?,
            series: self.all_series_trees().await?,
        })
    }

    pub async fn bot_films(&self) -> Result<Vec<BotFilm>, Error> {
        let films = films::list(&self.pool).await?;
        Ok(films.into_iter().map(Into::into).collect())
    }

    pub async fn bot_series(&self) -> Result<Vec<BotSeries>, Error> {
        let trees = self.all_series_trees().await?;
        Ok(trees.into_iter().map(Into::into).collect())
    }
}
