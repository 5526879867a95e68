// Store contracts - one trait per concern, two implementations behind each
// (SQLite and in-memory), selected via configuration.
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Film, Genre, MpaRating, User};

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// User rows plus the friendship relation.
#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn create(&self, user: User) -> Result<User, StorageError>;

    /// Fails with `NotFound` when no row matches the user's id.
    async fn update(&self, user: User) -> Result<User, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn list(&self) -> Result<Vec<User>, StorageError>;

    async fn delete(&self, id: i64) -> Result<bool, StorageError>;

    async fn email_in_use(&self, email: &str, exclude_id: i64) -> Result<bool, StorageError>;

    /// Insert both directed friendship rows as one atomic unit.
    /// Returns false when the pair already exists (no-op).
    async fn add_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError>;

    /// Remove both directed friendship rows as one atomic unit.
    /// Returns false when the pair was not present (no-op).
    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError>;

    async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>, StorageError>;
}

/// Film rows plus the like relation and the popularity ranking derived
/// from it. The ranking is always recomputed from the relation; there is
/// no stored like counter to drift out of sync.
#[async_trait]
pub trait FilmStorage: Send + Sync {
    async fn create(&self, film: Film) -> Result<Film, StorageError>;

    /// Fails with `NotFound` when no row matches the film's id.
    /// Replaces the genre set wholesale.
    async fn update(&self, film: Film) -> Result<Film, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<Film>, StorageError>;

    async fn list(&self) -> Result<Vec<Film>, StorageError>;

    async fn delete(&self, id: i64) -> Result<bool, StorageError>;

    /// Idempotent: inserting an existing (film, user) pair is a no-op.
    async fn add_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError>;

    /// Idempotent: removing an absent pair is a no-op.
    async fn remove_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError>;

    /// Films ordered by descending distinct-liker count, ties broken by
    /// ascending film id. Zero-like films sort after all liked films.
    async fn most_popular(&self, count: i64) -> Result<Vec<Film>, StorageError>;
}

/// Read-only reference data: genres and MPA ratings.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    async fn genres(&self) -> Result<Vec<Genre>, StorageError>;

    async fn genre(&self, id: i64) -> Result<Option<Genre>, StorageError>;

    async fn mpa_ratings(&self) -> Result<Vec<MpaRating>, StorageError>;

    async fn mpa(&self, id: i64) -> Result<Option<MpaRating>, StorageError>;
}

pub type DynUserStorage = Arc<dyn UserStorage>;
pub type DynFilmStorage = Arc<dyn FilmStorage>;
pub type DynCatalogStorage = Arc<dyn CatalogStorage>;
