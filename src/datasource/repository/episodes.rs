use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::duration_to_column;
use crate::datasource::repository::episodes::models::EpisodeEntity;
use crate::models::Episode;

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::datasource::repository::duration_from_column;
    use crate::models::Episode;

    #[derive(Debug, sqlx::FromRow)]
    pub struct EpisodeEntity {
        pub id: Uuid,
        pub season_id: Uuid,
        pub episode_number: i32,
        pub title: String,
        pub media_file: String,
        pub duration: Option<i32>,
        pub created_at: DateTime<Utc>,
    }

    impl From<EpisodeEntity> for Episode {
        fn from(value: EpisodeEntity) -> Self {
            Self {
                id: value.id,
                season_id: value.season_id,
                episode_number: value.episode_number,
                title: value.title,
                media_file: value.media_file,
                duration: duration_from_column(value.duration),
                created_at: value.created_at,
            }
        }
    }
}

const COLUMNS: &str = "id, season_id, episode_number, title, media_file, duration, created_at";

/// Where an episode sits in the catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Placement {
    pub series_id: Uuid,
    pub season_id: Uuid,
}

pub async fn list_for_season<'e, E>(executor: E, season_id: Uuid) -> sqlx::Result<Vec<Episode>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql =
        format!("SELECT {COLUMNS} FROM episodes WHERE season_id = $1 ORDER BY episode_number");
    let rows = sqlx::query_as::<_, EpisodeEntity>(&sql)
        .bind(season_id)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Every episode of the given seasons, ordered by season then number.
pub async fn list_for_seasons<'e, E>(
    executor: E,
    season_ids: &[Uuid],
) -> sqlx::Result<Vec<Episode>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM episodes WHERE season_id = ANY($1) \
         ORDER BY season_id, episode_number"
    );
    let rows = sqlx::query_as::<_, EpisodeEntity>(&sql)
        .bind(season_ids)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Episode>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM episodes WHERE id = $1");
    let record = sqlx::query_as::<_, EpisodeEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn placement<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Placement>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Placement>(
        "SELECT s.series_id, e.season_id FROM episodes e \
         JOIN seasons s ON s.id = e.season_id WHERE e.id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn insert<'e, E>(
    executor: E,
    season_id: Uuid,
    episode_number: i32,
    title: &str,
    media_file: &str,
) -> sqlx::Result<Episode>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO episodes (season_id, episode_number, title, media_file) \
         VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, EpisodeEntity>(&sql)
        .bind(season_id)
        .bind(episode_number)
        .bind(title)
        .bind(media_file)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn update<'e, E>(
    executor: E,
    id: Uuid,
    episode_number: i32,
    title: &str,
    media_file: &str,
) -> sqlx::Result<Option<Episode>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE episodes SET episode_number = $2, title = $3, media_file = $4 WHERE id = $1 \
         RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, EpisodeEntity>(&sql)
        .bind(id)
        .bind(episode_number)
        .bind(title)
        .bind(media_file)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn set_duration<'e, E>(executor: E, id: Uuid, duration: Option<u32>) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE episodes SET duration = $2 WHERE id = $1")
        .bind(id)
        .bind(duration_to_column(duration))
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM episodes WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_for_seasons<'e, E>(executor: E, season_ids: &[Uuid]) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM episodes WHERE season_id = ANY($1)")
        .bind(season_ids)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Media file names of every episode in the season.
pub async fn media_files_for_season<'e, E>(
    executor: E,
    season_id: Uuid,
) -> sqlx::Result<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT media_file FROM episodes WHERE season_id = $1")
        .bind(season_id)
        .fetch_all(executor)
        .await
}

/// Media file names of every episode in every season of the series.
pub async fn media_files_for_series<'e, E>(
    executor: E,
    series_id: Uuid,
) -> sqlx::Result<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        "SELECT e.media_file FROM episodes e \
         JOIN seasons s ON s.id = e.season_id WHERE s.series_id = $1",
    )
    .bind(series_id)
    .fetch_all(executor)
    .await
}

pub async fn count<'e, E>(executor: E) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM episodes")
        .fetch_one(executor)
        .await
}
