use std::sync::Arc;

use tracing::info;

use crate::model::{Movie, Ms, User};
use crate::retry::RetryPolicy;
use crate::store::{StoreClient, StoreError};

/// Movie and user registration. Both go through the store's conditional
/// insert, so creating the same movie twice is a no-op and username
/// collisions are decided by the store, not by a read-then-write race.
pub struct Catalog {
    store: Arc<dyn StoreClient>,
    retry: RetryPolicy,
}

impl Catalog {
    pub fn new(store: Arc<dyn StoreClient>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Idempotent insert. Returns whether this call created the movie.
    pub async fn add_movie(&self, name: &str, showtime: Ms) -> Result<bool, StoreError> {
        let movie = Movie::new(name, showtime);
        let applied = self
            .retry
            .run("movie insert", || {
                self.store.insert_movie_if_absent(movie.clone())
            })
            .await?;
        if applied {
            info!("movie '{name}' inserted");
        } else {
            info!("movie '{name}' already exists");
        }
        Ok(applied)
    }

    /// Registers a new user. `None` means the username is already taken —
    /// possibly by an earlier attempt of ours whose ack was lost, so callers
    /// that need the id can recover it with [`Catalog::find_user`].
    pub async fn register_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = User::new(username);
        let applied = self
            .retry
            .run("user insert", || {
                self.store.insert_user_if_absent(user.clone())
            })
            .await?;
        if applied {
            info!("user '{username}' created with id {}", user.id);
            Ok(Some(user))
        } else {
            info!("username '{username}' already registered");
            Ok(None)
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.store.get_user_by_username(username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fault, InMemoryQuorumStore};

    fn catalog(store: Arc<InMemoryQuorumStore>) -> Catalog {
        Catalog::new(store, RetryPolicy::immediate())
    }

    #[tokio::test]
    async fn add_movie_is_idempotent() {
        let store = Arc::new(InMemoryQuorumStore::new());
        let catalog = catalog(store.clone());
        assert!(catalog.add_movie("StressMovie1", 1_766_692_800_000).await.unwrap());
        assert!(!catalog.add_movie("StressMovie1", 1_766_692_800_000).await.unwrap());
        assert_eq!(store.list_movies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let store = Arc::new(InMemoryQuorumStore::new());
        let catalog = catalog(store.clone());
        let first = catalog.register_user("stresstest0").await.unwrap();
        assert!(first.is_some());
        let second = catalog.register_user("stresstest0").await.unwrap();
        assert!(second.is_none());
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lost_registration_ack_is_recoverable_by_username() {
        let store = Arc::new(InMemoryQuorumStore::new());
        let catalog = catalog(store.clone());
        store.inject_faults([Fault::AmbiguousCommitted]);

        // The insert committed but the retry sees the username taken.
        let registered = catalog.register_user("stresstest0").await.unwrap();
        assert!(registered.is_none());
        let recovered = catalog.find_user("stresstest0").await.unwrap();
        assert!(recovered.is_some());
    }
}
