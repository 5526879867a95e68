// SQLite implementation of the store contracts.
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::domain::{Film, Genre, MpaRating, User};
use crate::state::DbPool;
use crate::storage::{CatalogStorage, FilmStorage, StorageError, UserStorage};

pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(idx: usize, value: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let birthday: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        login: row.get(2)?,
        name: Some(row.get(3)?),
        birthday: parse_date(4, birthday)?,
    })
}

// Expects columns: film_id, film_name, description, release_date,
// duration, rating_id, rating_name. Genres are loaded separately.
fn film_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Film> {
    let release_date: String = row.get(3)?;
    Ok(Film {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        release_date: parse_date(3, release_date)?,
        duration: row.get(4)?,
        mpa: MpaRating {
            id: row.get(5)?,
            name: Some(row.get(6)?),
        },
        genres: Vec::new(),
    })
}

const FILM_COLUMNS: &str = "f.film_id, f.film_name, f.description, f.release_date, \
                            f.duration, f.rating_id, r.rating_name";

fn load_genres(conn: &Connection, film_id: i64) -> Result<Vec<Genre>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT g.genre_id, g.genre_name FROM film_genres fg
         JOIN genres g ON g.genre_id = fg.genre_id
         WHERE fg.film_id = ?1
         ORDER BY g.genre_id ASC",
    )?;
    let genres = stmt
        .query_map(params![film_id], |row| {
            Ok(Genre {
                id: row.get(0)?,
                name: Some(row.get(1)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(genres)
}

// Genre rows are replaced wholesale on every write.
fn replace_genres(conn: &Connection, film_id: i64, genres: &[Genre]) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM film_genres WHERE film_id = ?1",
        params![film_id],
    )?;
    for genre in genres {
        conn.execute(
            "INSERT INTO film_genres (film_id, genre_id) VALUES (?1, ?2)",
            params![film_id, genre.id],
        )?;
    }
    Ok(())
}

#[async_trait]
impl UserStorage for SqliteStorage {
    async fn create(&self, mut user: User) -> Result<User, StorageError> {
        let conn = self.pool.get()?;

        let name = user.display_name().to_string();
        conn.execute(
            "INSERT INTO users (email, login, user_name, birthday)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.email,
                user.login,
                name,
                user.birthday.format(DATE_FORMAT).to_string()
            ],
        )?;
        user.id = conn.last_insert_rowid();
        user.name = Some(name);
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, StorageError> {
        let conn = self.pool.get()?;

        let name = user.display_name().to_string();
        let rows = conn.execute(
            "UPDATE users
             SET email = ?1, login = ?2, user_name = ?3, birthday = ?4
             WHERE user_id = ?5",
            params![
                user.email,
                user.login,
                name,
                user.birthday.format(DATE_FORMAT).to_string(),
                user.id
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!(
                "user with id {} not found",
                user.id
            )));
        }
        Ok(User {
            name: Some(name),
            ..user
        })
    }

    async fn get(&self, id: i64) -> Result<Option<User>, StorageError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            "SELECT user_id, email, login, user_name, birthday
             FROM users WHERE user_id = ?1",
            params![id],
            user_from_row,
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<User>, StorageError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT user_id, email, login, user_name, birthday
             FROM users ORDER BY user_id",
        )?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.pool.get()?;

        // friendships and film_likes rows go with the user (ON DELETE CASCADE)
        let rows = conn.execute("DELETE FROM users WHERE user_id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn email_in_use(&self, email: &str, exclude_id: i64) -> Result<bool, StorageError> {
        let conn = self.pool.get()?;

        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 AND user_id != ?2",
            params![email, exclude_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn add_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError> {
        let conn = self.pool.get()?;

        // Both directed rows or neither - no reader may observe one side only.
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<bool, StorageError> = (|| {
            let already: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                params![user_id, friend_id],
                |row| row.get(0),
            )?;
            if already {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                params![user_id, friend_id],
            )?;
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                params![friend_id, user_id],
            )?;
            Ok(true)
        })();

        match result {
            Ok(added) => {
                conn.execute("COMMIT", [])?;
                Ok(added)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError> {
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<bool, StorageError> = (|| {
            let removed = conn.execute(
                "DELETE FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                params![user_id, friend_id],
            )?;
            conn.execute(
                "DELETE FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                params![friend_id, user_id],
            )?;
            Ok(removed > 0)
        })();

        match result {
            Ok(removed) => {
                conn.execute("COMMIT", [])?;
                Ok(removed)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>, StorageError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY friend_id",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[async_trait]
impl FilmStorage for SqliteStorage {
    async fn create(&self, mut film: Film) -> Result<Film, StorageError> {
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<Film, StorageError> = (|| {
            conn.execute(
                "INSERT INTO films (film_name, description, release_date, duration, rating_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    film.name,
                    film.description,
                    film.release_date.format(DATE_FORMAT).to_string(),
                    film.duration,
                    film.mpa.id
                ],
            )?;
            film.id = conn.last_insert_rowid();
            replace_genres(&conn, film.id, &film.genres)?;
            Ok(film)
        })();

        match result {
            Ok(film) => {
                conn.execute("COMMIT", [])?;
                Ok(film)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn update(&self, film: Film) -> Result<Film, StorageError> {
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<Film, StorageError> = (|| {
            let rows = conn.execute(
                "UPDATE films
                 SET film_name = ?1, description = ?2, release_date = ?3,
                     duration = ?4, rating_id = ?5
                 WHERE film_id = ?6",
                params![
                    film.name,
                    film.description,
                    film.release_date.format(DATE_FORMAT).to_string(),
                    film.duration,
                    film.mpa.id,
                    film.id
                ],
            )?;
            if rows == 0 {
                return Err(StorageError::NotFound(format!(
                    "film with id {} not found",
                    film.id
                )));
            }
            replace_genres(&conn, film.id, &film.genres)?;
            Ok(film)
        })();

        match result {
            Ok(film) => {
                conn.execute("COMMIT", [])?;
                Ok(film)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Option<Film>, StorageError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            &format!(
                "SELECT {FILM_COLUMNS} FROM films f
                 JOIN rating_mpa r ON r.rating_id = f.rating_id
                 WHERE f.film_id = ?1"
            ),
            params![id],
            film_from_row,
        );
        match result {
            Ok(mut film) => {
                film.genres = load_genres(&conn, film.id)?;
                Ok(Some(film))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Film>, StorageError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {FILM_COLUMNS} FROM films f
             JOIN rating_mpa r ON r.rating_id = f.rating_id
             ORDER BY f.film_id"
        ))?;
        let mut films = stmt
            .query_map([], film_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for film in &mut films {
            film.genres = load_genres(&conn, film.id)?;
        }
        Ok(films)
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.pool.get()?;

        let rows = conn.execute("DELETE FROM films WHERE film_id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn add_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT OR IGNORE INTO film_likes (film_id, user_id) VALUES (?1, ?2)",
            params![film_id, user_id],
        )?;
        Ok(())
    }

    async fn remove_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError> {
        let conn = self.pool.get()?;

        conn.execute(
            "DELETE FROM film_likes WHERE film_id = ?1 AND user_id = ?2",
            params![film_id, user_id],
        )?;
        Ok(())
    }

    async fn most_popular(&self, count: i64) -> Result<Vec<Film>, StorageError> {
        let conn = self.pool.get()?;

        // Live aggregation over the like relation; the ascending film_id
        // tie-break keeps the ordering reproducible across calls.
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILM_COLUMNS} FROM films f
             LEFT JOIN film_likes l ON l.film_id = f.film_id
             JOIN rating_mpa r ON r.rating_id = f.rating_id
             GROUP BY f.film_id
             ORDER BY COUNT(l.user_id) DESC, f.film_id ASC
             LIMIT ?1"
        ))?;
        let mut films = stmt
            .query_map(params![count], film_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for film in &mut films {
            film.genres = load_genres(&conn, film.id)?;
        }
        Ok(films)
    }
}

#[async_trait]
impl CatalogStorage for SqliteStorage {
    async fn genres(&self) -> Result<Vec<Genre>, StorageError> {
        let conn = self.pool.get()?;

        let mut stmt =
            conn.prepare("SELECT genre_id, genre_name FROM genres ORDER BY genre_id")?;
        let genres = stmt
            .query_map([], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: Some(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    async fn genre(&self, id: i64) -> Result<Option<Genre>, StorageError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            "SELECT genre_id, genre_name FROM genres WHERE genre_id = ?1",
            params![id],
            |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: Some(row.get(1)?),
                })
            },
        );
        match result {
            Ok(genre) => Ok(Some(genre)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mpa_ratings(&self) -> Result<Vec<MpaRating>, StorageError> {
        let conn = self.pool.get()?;

        let mut stmt =
            conn.prepare("SELECT rating_id, rating_name FROM rating_mpa ORDER BY rating_id")?;
        let ratings = stmt
            .query_map([], |row| {
                Ok(MpaRating {
                    id: row.get(0)?,
                    name: Some(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    async fn mpa(&self, id: i64) -> Result<Option<MpaRating>, StorageError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            "SELECT rating_id, rating_name FROM rating_mpa WHERE rating_id = ?1",
            params![id],
            |row| {
                Ok(MpaRating {
                    id: row.get(0)?,
                    name: Some(row.get(1)?),
                })
            },
        );
        match result {
            Ok(rating) => Ok(Some(rating)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = db::create_pool(&db_path).unwrap();
        db::run_migrations(&pool).unwrap();

        (SqliteStorage::new(pool), temp_dir)
    }

    fn user(login: &str) -> User {
        User {
            id: 0,
            email: format!("{login}@example.com"),
            login: login.into(),
            name: Some(login.into()),
            birthday: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        }
    }

    fn film(name: &str) -> Film {
        Film {
            id: 0,
            name: name.into(),
            description: String::new(),
            release_date: NaiveDate::from_ymd_opt(1999, 3, 31).unwrap(),
            duration: 136,
            mpa: MpaRating {
                id: 4,
                name: Some("R".into()),
            },
            genres: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_user_ids() {
        let (store, _temp) = create_test_store();

        let alice = UserStorage::create(&store, user("alice")).await.unwrap();
        let bob = UserStorage::create(&store, user("bob")).await.unwrap();
        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);

        let loaded = UserStorage::get(&store, alice.id).await.unwrap().unwrap();
        assert_eq!(loaded, alice);
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let (store, _temp) = create_test_store();

        let mut ghost = user("ghost");
        ghost.id = 999;
        let result = UserStorage::update(&store, ghost).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn add_friend_writes_both_directions() {
        let (store, _temp) = create_test_store();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();

        let added = store.add_friend(a.id, b.id).await.unwrap();
        assert!(added);

        assert_eq!(store.friend_ids(a.id).await.unwrap(), vec![b.id]);
        assert_eq!(store.friend_ids(b.id).await.unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn add_friend_twice_is_a_noop() {
        let (store, _temp) = create_test_store();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();

        assert!(store.add_friend(a.id, b.id).await.unwrap());
        assert!(!store.add_friend(a.id, b.id).await.unwrap());

        assert_eq!(store.friend_ids(a.id).await.unwrap(), vec![b.id]);
        assert_eq!(store.friend_ids(b.id).await.unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn remove_friend_clears_both_directions() {
        let (store, _temp) = create_test_store();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();

        store.add_friend(a.id, b.id).await.unwrap();
        let removed = store.remove_friend(a.id, b.id).await.unwrap();
        assert!(removed);

        assert!(store.friend_ids(a.id).await.unwrap().is_empty());
        assert!(store.friend_ids(b.id).await.unwrap().is_empty());

        // Removing again is a no-op
        assert!(!store.remove_friend(a.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn likes_are_idempotent_per_pair() {
        let (store, _temp) = create_test_store();

        let u = UserStorage::create(&store, user("u")).await.unwrap();
        let f = FilmStorage::create(&store, film("The Matrix")).await.unwrap();

        store.add_like(f.id, u.id).await.unwrap();
        store.add_like(f.id, u.id).await.unwrap();

        let top = store.most_popular(10).await.unwrap();
        assert_eq!(top.len(), 1);

        store.remove_like(f.id, u.id).await.unwrap();
        store.remove_like(f.id, u.id).await.unwrap();
    }

    #[tokio::test]
    async fn most_popular_orders_by_likes_then_id() {
        let (store, _temp) = create_test_store();

        let users: Vec<i64> = {
            let mut ids = Vec::new();
            for login in ["a", "b", "c"] {
                ids.push(UserStorage::create(&store, user(login)).await.unwrap().id);
            }
            ids
        };
        let mut films = Vec::new();
        for name in ["one", "two", "three", "four"] {
            films.push(FilmStorage::create(&store, film(name)).await.unwrap().id);
        }

        // film 2: 3 likes, film 3: 3 likes, film 4: 1 like, film 1: 0 likes
        for &u in &users {
            store.add_like(films[1], u).await.unwrap();
            store.add_like(films[2], u).await.unwrap();
        }
        store.add_like(films[3], users[0]).await.unwrap();

        let top: Vec<i64> = store
            .most_popular(3)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(top, vec![films[1], films[2], films[3]]);

        // Count beyond the total returns everything, zero-like film last
        let all: Vec<i64> = store
            .most_popular(10)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(all, vec![films[1], films[2], films[3], films[0]]);
    }

    #[tokio::test]
    async fn genres_read_back_in_ascending_id_order() {
        let (store, _temp) = create_test_store();

        let mut f = film("Pulp Fiction");
        f.genres = vec![
            Genre {
                id: 4,
                name: Some("Thriller".into()),
            },
            Genre {
                id: 2,
                name: Some("Drama".into()),
            },
        ];
        let created = FilmStorage::create(&store, f).await.unwrap();

        let loaded = FilmStorage::get(&store, created.id).await.unwrap().unwrap();
        let ids: Vec<i64> = loaded.genres.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(loaded.genres[0].name.as_deref(), Some("Drama"));
    }

    #[tokio::test]
    async fn film_update_replaces_genre_set() {
        let (store, _temp) = create_test_store();

        let mut f = film("Heat");
        f.genres = vec![Genre {
            id: 4,
            name: Some("Thriller".into()),
        }];
        let mut created = FilmStorage::create(&store, f).await.unwrap();

        created.genres = vec![Genre {
            id: 6,
            name: Some("Action".into()),
        }];
        FilmStorage::update(&store, created.clone()).await.unwrap();

        let loaded = FilmStorage::get(&store, created.id).await.unwrap().unwrap();
        let ids: Vec<i64> = loaded.genres.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![6]);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_their_likes() {
        let (store, _temp) = create_test_store();

        let u = UserStorage::create(&store, user("u")).await.unwrap();
        let f = FilmStorage::create(&store, film("Se7en")).await.unwrap();
        store.add_like(f.id, u.id).await.unwrap();

        assert!(UserStorage::delete(&store, u.id).await.unwrap());

        // The like rows vanished with the user, so the ranking is clean
        let conn = store.pool.get().unwrap();
        let likes: i64 = conn
            .query_row("SELECT COUNT(*) FROM film_likes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[tokio::test]
    async fn deleted_user_ids_are_not_reused() {
        let (store, _temp) = create_test_store();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        UserStorage::delete(&store, a.id).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn catalog_lookups_resolve_reference_data() {
        let (store, _temp) = create_test_store();

        let genres = store.genres().await.unwrap();
        assert_eq!(genres.len(), 6);
        assert_eq!(genres[0].name.as_deref(), Some("Comedy"));

        let mpa = store.mpa(3).await.unwrap().unwrap();
        assert_eq!(mpa.name.as_deref(), Some("PG-13"));

        assert!(store.genre(999).await.unwrap().is_none());
        assert!(store.mpa(999).await.unwrap().is_none());
    }
}
