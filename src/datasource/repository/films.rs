use sqlx::types::Uuid;
use sqlx::{Executor, Postgres};

use crate::datasource::repository::duration_to_column;
use crate::datasource::repository::films::models::FilmEntity;
use crate::models::Film;

pub(super) mod models {
    use chrono::{DateTime, Utc};
    use sqlx::types::Uuid;

    use crate::datasource::repository::duration_from_column;
    use crate::models::Film;

    #[derive(Debug, sqlx::FromRow)]
    pub struct FilmEntity {
        pub id: Uuid,
        pub title: String,
        pub year: i32,
        pub description: String,
        pub price: i64,
        pub genre: String,
        pub thumbnail: Option<String>,
        pub media_file: String,
        pub duration: Option<i32>,
        pub created_at: DateTime<Utc>,
    }

    impl From<FilmEntity> for Film {
        fn from(value: FilmEntity) -> Self {
            Self {
                id: value.id,
                title: value.title,
                year: value.year,
                description: value.description,
                price: value.price,
                genre: value.genre,
                thumbnail: value.thumbnail,
                media_file: value.media_file,
                duration: duration_from_column(value.duration),
                created_at: value.created_at,
            }
        }
    }
}

const COLUMNS: &str =
    "id, title, year, description, price, genre, thumbnail, media_file, duration, created_at";

#[derive(Debug, Clone)]
pub struct FilmRecord<'a> {
    pub title: &'a str,
    pub year: i32,
    pub description: &'a str,
    pub price: i64,
    pub genre: &'a str,
    pub thumbnail: Option<&'a str>,
    pub media_file: &'a str,
}

pub async fn list<'e, E>(executor: E) -> sqlx::Result<Vec<Film>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM films ORDER BY title");
    let rows = sqlx::query_as::<_, FilmEntity>(&sql)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> sqlx::Result<Option<Film>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM films WHERE id = $1");
    let record = sqlx::query_as::<_, FilmEntity>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn get_many<'e, E>(executor: E, ids: &[Uuid]) -> sqlx::Result<Vec<Film>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {COLUMNS} FROM films WHERE id = ANY($1) ORDER BY title");
    let rows = sqlx::query_as::<_, FilmEntity>(&sql)
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn insert<'e, E>(executor: E, film: &FilmRecord<'_>) -> sqlx::Result<Film>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO films (title, year, description, price, genre, thumbnail, media_file) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, FilmEntity>(&sql)
        .bind(film.title)
        .bind(film.year)
        .bind(film.description)
        .bind(film.price)
        .bind(film.genre)
        .bind(film.thumbnail)
        .bind(film.media_file)
        .fetch_one(executor)
        .await?;
    Ok(record.into())
}

pub async fn update<'e, E>(executor: E, id: Uuid, film: &FilmRecord<'_>) -> sqlx::Result<Option<Film>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE films SET title = $2, year = $3, description = $4, price = $5, genre = $6, \
         thumbnail = $7, media_file = $8 WHERE id = $1 RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, FilmEntity>(&sql)
        .bind(id)
        .bind(film.title)
        .bind(film.year)
        .bind(film.description)
        .bind(film.price)
        .bind(film.genre)
        .bind(film.thumbnail)
        .bind(film.media_file)
        .fetch_optional(executor)
        .await?;
    Ok(record.map(Into::into))
}

pub async fn set_duration<'e, E>(executor: E, id: Uuid, duration: Option<u32>) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE films SET duration = $2 WHERE id = $1")
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
    let result = sqlx::query("DELETE FROM films WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count<'e, E>(executor: E) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM films")
        .fetch_one(executor)
        .await
}
