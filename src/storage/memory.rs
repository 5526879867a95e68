// In-memory implementation of the store contracts. A single mutex guards
// all tables, so the dual-row friendship writes and the per-pair like
// mutations are trivially atomic.
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

use crate::domain::{Film, Genre, MpaRating, User};
use crate::storage::{CatalogStorage, FilmStorage, StorageError, UserStorage};

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    films: BTreeMap<i64, Film>,
    friends: HashMap<i64, BTreeSet<i64>>,
    likes: HashMap<i64, BTreeSet<i64>>,
    genres: BTreeMap<i64, Genre>,
    mpa: BTreeMap<i64, MpaRating>,
    next_user_id: i64,
    next_film_id: i64,
}

pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Seeded with the same reference data the SQLite migrations install.
    pub fn new() -> Self {
        let mut inner = Inner {
            next_user_id: 1,
            next_film_id: 1,
            ..Inner::default()
        };
        for (id, name) in [
            (1, "Comedy"),
            (2, "Drama"),
            (3, "Cartoon"),
            (4, "Thriller"),
            (5, "Documentary"),
            (6, "Action"),
        ] {
            inner.genres.insert(
                id,
                Genre {
                    id,
                    name: Some(name.into()),
                },
            );
        }
        for (id, name) in [(1, "G"), (2, "PG"), (3, "PG-13"), (4, "R"), (5, "NC-17")] {
            inner.mpa.insert(
                id,
                MpaRating {
                    id,
                    name: Some(name.into()),
                },
            );
        }
        Self {
            inner: Mutex::new(inner),
        }
    }
}

fn sorted_genres(mut genres: Vec<Genre>) -> Vec<Genre> {
    genres.sort_by_key(|g| g.id);
    genres
}

#[async_trait]
impl UserStorage for InMemoryStorage {
    async fn create(&self, mut user: User) -> Result<User, StorageError> {
        let mut inner = self.inner.lock().await;

        user.id = inner.next_user_id;
        inner.next_user_id += 1;
        user.name = Some(user.display_name().to_string());
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, mut user: User) -> Result<User, StorageError> {
        let mut inner = self.inner.lock().await;

        if !inner.users.contains_key(&user.id) {
            return Err(StorageError::NotFound(format!(
                "user with id {} not found",
                user.id
            )));
        }
        user.name = Some(user.display_name().to_string());
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().cloned().collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().await;

        let existed = inner.users.remove(&id).is_some();
        if existed {
            inner.friends.remove(&id);
            for set in inner.friends.values_mut() {
                set.remove(&id);
            }
            for set in inner.likes.values_mut() {
                set.remove(&id);
            }
        }
        Ok(existed)
    }

    async fn email_in_use(&self, email: &str, exclude_id: i64) -> Result<bool, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .any(|u| u.email == email && u.id != exclude_id))
    }

    async fn add_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().await;

        let already = inner
            .friends
            .get(&user_id)
            .is_some_and(|set| set.contains(&friend_id));
        if already {
            return Ok(false);
        }
        inner.friends.entry(user_id).or_default().insert(friend_id);
        inner.friends.entry(friend_id).or_default().insert(user_id);
        Ok(true)
    }

    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().await;

        let removed = inner
            .friends
            .get_mut(&user_id)
            .is_some_and(|set| set.remove(&friend_id));
        if let Some(set) = inner.friends.get_mut(&friend_id) {
            set.remove(&user_id);
        }
        Ok(removed)
    }

    async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .friends
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl FilmStorage for InMemoryStorage {
    async fn create(&self, mut film: Film) -> Result<Film, StorageError> {
        let mut inner = self.inner.lock().await;

        film.id = inner.next_film_id;
        inner.next_film_id += 1;
        film.genres = sorted_genres(film.genres);
        inner.films.insert(film.id, film.clone());
        Ok(film)
    }

    async fn update(&self, mut film: Film) -> Result<Film, StorageError> {
        let mut inner = self.inner.lock().await;

        if !inner.films.contains_key(&film.id) {
            return Err(StorageError::NotFound(format!(
                "film with id {} not found",
                film.id
            )));
        }
        film.genres = sorted_genres(film.genres);
        inner.films.insert(film.id, film.clone());
        Ok(film)
    }

    async fn get(&self, id: i64) -> Result<Option<Film>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.films.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Film>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.films.values().cloned().collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().await;

        let existed = inner.films.remove(&id).is_some();
        if existed {
            inner.likes.remove(&id);
        }
        Ok(existed)
    }

    async fn add_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.likes.entry(film_id).or_default().insert(user_id);
        Ok(())
    }

    async fn remove_like(&self, film_id: i64, user_id: i64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        if let Some(set) = inner.likes.get_mut(&film_id) {
            set.remove(&user_id);
        }
        Ok(())
    }

    async fn most_popular(&self, count: i64) -> Result<Vec<Film>, StorageError> {
        let inner = self.inner.lock().await;

        let mut ranked: Vec<(usize, &Film)> = inner
            .films
            .values()
            .map(|film| {
                let likers = inner.likes.get(&film.id).map_or(0, BTreeSet::len);
                (likers, film)
            })
            .collect();
        // Descending like count, ascending film id on ties
        ranked.sort_by(|(la, fa), (lb, fb)| lb.cmp(la).then(fa.id.cmp(&fb.id)));
        Ok(ranked
            .into_iter()
            .take(count.max(0) as usize)
            .map(|(_, film)| film.clone())
            .collect())
    }
}

#[async_trait]
impl CatalogStorage for InMemoryStorage {
    async fn genres(&self) -> Result<Vec<Genre>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.genres.values().cloned().collect())
    }

    async fn genre(&self, id: i64) -> Result<Option<Genre>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.genres.get(&id).cloned())
    }

    async fn mpa_ratings(&self) -> Result<Vec<MpaRating>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.mpa.values().cloned().collect())
    }

    async fn mpa(&self, id: i64) -> Result<Option<MpaRating>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.mpa.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

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
    async fn friendship_is_symmetric() {
        let store = InMemoryStorage::new();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();

        assert!(store.add_friend(a.id, b.id).await.unwrap());
        assert_eq!(store.friend_ids(a.id).await.unwrap(), vec![b.id]);
        assert_eq!(store.friend_ids(b.id).await.unwrap(), vec![a.id]);

        // Second add is a no-op, remove clears both sides
        assert!(!store.add_friend(a.id, b.id).await.unwrap());
        assert!(store.remove_friend(a.id, b.id).await.unwrap());
        assert!(store.friend_ids(a.id).await.unwrap().is_empty());
        assert!(store.friend_ids(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn most_popular_matches_sqlite_ordering_contract() {
        let store = InMemoryStorage::new();

        let mut users = Vec::new();
        for login in ["a", "b", "c"] {
            users.push(UserStorage::create(&store, user(login)).await.unwrap().id);
        }
        let mut films = Vec::new();
        for name in ["one", "two", "three", "four"] {
            films.push(FilmStorage::create(&store, film(name)).await.unwrap().id);
        }

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
    async fn duplicate_likes_collapse() {
        let store = InMemoryStorage::new();

        let u = UserStorage::create(&store, user("u")).await.unwrap();
        let f = FilmStorage::create(&store, film("The Matrix")).await.unwrap();

        store.add_like(f.id, u.id).await.unwrap();
        store.add_like(f.id, u.id).await.unwrap();
        store.remove_like(f.id, u.id).await.unwrap();

        let top = store.most_popular(10).await.unwrap();
        assert_eq!(top.len(), 1);
        // Like relation is empty again, ranking still lists the film
        assert_eq!(top[0].id, f.id);
    }

    #[tokio::test]
    async fn deleting_a_user_drops_their_relations() {
        let store = InMemoryStorage::new();

        let a = UserStorage::create(&store, user("a")).await.unwrap();
        let b = UserStorage::create(&store, user("b")).await.unwrap();
        let f = FilmStorage::create(&store, film("Alien")).await.unwrap();

        store.add_friend(a.id, b.id).await.unwrap();
        store.add_like(f.id, a.id).await.unwrap();

        assert!(UserStorage::delete(&store, a.id).await.unwrap());
        assert!(store.friend_ids(b.id).await.unwrap().is_empty());

        let inner = store.inner.lock().await;
        assert!(inner.likes.get(&f.id).map_or(true, |s| s.is_empty()));
    }

    #[tokio::test]
    async fn genres_are_sorted_on_write() {
        let store = InMemoryStorage::new();

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
        let ids: Vec<i64> = created.genres.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn reference_data_is_seeded() {
        let store = InMemoryStorage::new();

        assert_eq!(store.genres().await.unwrap().len(), 6);
        assert_eq!(store.mpa_ratings().await.unwrap().len(), 5);
        assert_eq!(
            store.mpa(3).await.unwrap().unwrap().name.as_deref(),
            Some("PG-13")
        );
        assert!(store.genre(999).await.unwrap().is_none());
    }
}
