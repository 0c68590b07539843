use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::seasons::models::SeasonEntity;
use crate::models::Season;

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::models::Season;

    #[derive(Debug, sqlx::FromRow)]
    pub struct SeasonEntity {
        pub id: Uuid,
        pub series_id: Uuid,
        pub season_number: i32,
        pub year: i32,
        pub description: Option<String>,
        pub price: i64,
        pub created_at: DateTime<Utc>,
    }

    impl From<SeasonEntity> for Season {
        fn from(value: SeasonEntity) -> Self {
            Self {
                id: value.id,
                series_id: value.series_id,
                season_number: value.season_number,
                year: value.year,
                description: value.description,
                price: value.price,
                created_at: value.created_at,
            }
        }
    }
}

const COLUMNS: &str = "id, series_id, season_number, year, description, price, created_at";

#[derive(Debug, Clone)]
pub struct SeasonRecord<'a> {
    pub season_number: i32,
    pub year: i32,
    pub description: Option<&'a str>,
    pub price: i64,
}

pub async fn list_for_series<'e, E>(executor: E, series_id: Uuid) -> sqlx::Result<Vec<Season>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql =
        format!("SELECT {COLUMNS} FROM seasons WHERE series_id = $1 ORDER BY season_number");
    let rows = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(series_id)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Every season of the given series, ordered by series then number.
pub async fn list_for_many<'e, E>(executor: E, series_ids: &[Uuid]) -> sqlx::Result<Vec<Season>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM seasons WHERE series_id = ANY($1) \
         ORDER BY series_id, season_number"
    );
    let rows = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(series_ids)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_many<'e, E>(executor: E, ids: &[Uuid]) -> sqlx::Result<Vec<Season>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM seasons WHERE id = ANY($1) ORDER BY season_number");
    let rows = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Season>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM seasons WHERE id = $1");
    let record = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn insert<'e, E>(
    executor: E,
    series_id: Uuid,
    season: &SeasonRecord<'_>,
) -> sqlx::Result<Season>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO seasons (series_id, season_number, year, description, price) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(series_id)
        .bind(season.season_number)
        .bind(season.year)
        .bind(season.description)
        .bind(season.price)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn update<'e, E>(
    executor: E,
    id: Uuid,
    season: &SeasonRecord<'_>,
) -> sqlx::Result<Option<Season>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE seasons SET season_number = $2, year = $3, description = $4, price = $5 \
         WHERE id = $1 RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, SeasonEntity>(&sql)
        .bind(id)
        .bind(season.season_number)
        .bind(season.year)
        .bind(season.description)
        .bind(season.price)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM seasons WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_for_series<'e, E>(executor: E, series_id: Uuid) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM seasons WHERE series_id = $1")
        .bind(series_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count<'e, E>(executor: E) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM seasons")
        .fetch_one(executor)
        .await
}
