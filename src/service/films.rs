// Film CRUD, the like relation, and the popularity ranking. MPA and genre
// ids are resolved against the catalog before any film row is written.
use crate::domain::{Film, Genre, MpaRating};
use crate::error::{AppError, AppResult};
use crate::storage::{DynCatalogStorage, DynFilmStorage, DynUserStorage};

pub const DEFAULT_POPULAR_COUNT: i64 = 10;

#[derive(Clone)]
pub struct FilmService {
    films: DynFilmStorage,
    users: DynUserStorage,
    catalog: DynCatalogStorage,
}

impl FilmService {
    pub fn new(films: DynFilmStorage, users: DynUserStorage, catalog: DynCatalogStorage) -> Self {
        Self {
            films,
            users,
            catalog,
        }
    }

    pub async fn create(&self, mut film: Film) -> AppResult<Film> {
        film.validate()?;
        film.mpa = self.resolve_mpa(film.mpa.id).await?;
        film.genres = self.resolve_genres(film.genres).await?;
        let created = self.films.create(film).await?;
        tracing::debug!("created film {}", created.id);
        Ok(created)
    }

    pub async fn update(&self, mut film: Film) -> AppResult<Film> {
        film.validate()?;
        self.require_film(film.id).await?;
        film.mpa = self.resolve_mpa(film.mpa.id).await?;
        film.genres = self.resolve_genres(film.genres).await?;
        Ok(self.films.update(film).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<Film>> {
        Ok(self.films.list().await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<Film> {
        self.require_film(id).await
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.films.delete(id).await? {
            return Err(film_not_found(id));
        }
        Ok(())
    }

    /// Idempotent; the film is checked before the user, so a request that
    /// misses both reports the film id.
    pub async fn add_like(&self, film_id: i64, user_id: i64) -> AppResult<()> {
        self.require_film(film_id).await?;
        self.require_user(user_id).await?;
        self.films.add_like(film_id, user_id).await?;
        tracing::debug!("user {} liked film {}", user_id, film_id);
        Ok(())
    }

    pub async fn remove_like(&self, film_id: i64, user_id: i64) -> AppResult<()> {
        self.require_film(film_id).await?;
        self.require_user(user_id).await?;
        self.films.remove_like(film_id, user_id).await?;
        tracing::debug!("user {} unliked film {}", user_id, film_id);
        Ok(())
    }

    pub async fn most_popular(&self, count: Option<i64>) -> AppResult<Vec<Film>> {
        let count = count.unwrap_or(DEFAULT_POPULAR_COUNT);
        if count <= 0 {
            return Err(AppError::BadRequest("count must be positive".into()));
        }
        Ok(self.films.most_popular(count).await?)
    }

    pub async fn genres(&self) -> AppResult<Vec<Genre>> {
        Ok(self.catalog.genres().await?)
    }

    pub async fn genre(&self, id: i64) -> AppResult<Genre> {
        self.catalog
            .genre(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("genre with id {} not found", id)))
    }

    pub async fn mpa_ratings(&self) -> AppResult<Vec<MpaRating>> {
        Ok(self.catalog.mpa_ratings().await?)
    }

    pub async fn mpa(&self, id: i64) -> AppResult<MpaRating> {
        self.catalog
            .mpa(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("mpa rating with id {} not found", id)))
    }

    async fn resolve_mpa(&self, id: i64) -> AppResult<MpaRating> {
        self.catalog
            .mpa(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("mpa rating with id {} not found", id)))
    }

    // Resolves every id to its full genre, deduplicates, and orders
    // ascending so reads are stable.
    async fn resolve_genres(&self, genres: Vec<Genre>) -> AppResult<Vec<Genre>> {
        let mut ids: Vec<i64> = genres.into_iter().map(|g| g.id).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let genre = self
                .catalog
                .genre(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("genre with id {} not found", id)))?;
            resolved.push(genre);
        }
        Ok(resolved)
    }

    async fn require_film(&self, id: i64) -> AppResult<Film> {
        self.films.get(id).await?.ok_or_else(|| film_not_found(id))
    }

    async fn require_user(&self, id: i64) -> AppResult<()> {
        match self.users.get(id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("user with id {} not found", id))),
        }
    }
}

fn film_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("film with id {} not found", id))
}
