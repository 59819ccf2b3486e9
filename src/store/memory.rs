use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{NodeDescriptor, NodeTopology, StoreClient, StoreError};
use crate::model::{Movie, Reservation, User, UserId};

/// A single injected ambiguous outcome. The two variants cover both halves of
/// real CAS-timeout ambiguity: the write may or may not have committed before
/// the client gave up waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No fault — placeholder so a script can target the Nth write.
    Clean,
    /// The write lands, but the caller is told the outcome is unknown.
    AmbiguousCommitted,
    /// Nothing lands, and the caller is told the outcome is unknown.
    AmbiguousDropped,
}

/// Fault plan for conditional writes. Scripted faults fire first (in order),
/// then a seeded random rate takes over — deterministic either way.
pub struct Faults {
    scripted: Mutex<VecDeque<Fault>>,
    ambiguous_rate: f64,
    rng: Mutex<StdRng>,
}

impl Faults {
    pub fn none() -> Self {
        Self::random(0.0, 0)
    }

    pub fn random(ambiguous_rate: f64, seed: u64) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            ambiguous_rate,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn scripted(faults: impl IntoIterator<Item = Fault>) -> Self {
        Self {
            scripted: Mutex::new(faults.into_iter().collect()),
            ambiguous_rate: 0.0,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    fn next(&self) -> Option<Fault> {
        if let Some(fault) = self.scripted.lock().expect("fault queue poisoned").pop_front() {
            return Some(fault);
        }
        if self.ambiguous_rate <= 0.0 {
            return None;
        }
        let mut rng = self.rng.lock().expect("fault rng poisoned");
        if rng.gen_bool(self.ambiguous_rate) {
            Some(if rng.gen_bool(0.5) {
                Fault::AmbiguousCommitted
            } else {
                Fault::AmbiguousDropped
            })
        } else {
            None
        }
    }
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(row).map_err(|e| StoreError::Backend(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

/// In-process stand-in for the quorum-replicated store. Rows are kept
/// bincode-encoded and decoded at the read boundary, the way a remote
/// client would. Per-key conditional semantics come from the DashMap entry
/// API; the quorum-timeout failure mode comes from `Faults`.
pub struct InMemoryQuorumStore {
    movies: DashMap<String, Vec<u8>>,
    users: DashMap<UserId, Vec<u8>>,
    usernames: DashMap<String, UserId>,
    reservations: DashMap<(String, String), Vec<u8>>,
    peers: usize,
    faults: Faults,
}

impl Default for InMemoryQuorumStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQuorumStore {
    /// Healthy three-node cluster, no fault injection.
    pub fn new() -> Self {
        Self::with(2, Faults::none())
    }

    pub fn with(peers: usize, faults: Faults) -> Self {
        Self {
            movies: DashMap::new(),
            users: DashMap::new(),
            usernames: DashMap::new(),
            reservations: DashMap::new(),
            peers,
            faults,
        }
    }

    /// Queues scripted faults against the next conditional writes. Lets a
    /// test seed fixtures cleanly first and then arm the failure.
    pub fn inject_faults(&self, faults: impl IntoIterator<Item = Fault>) {
        self.faults
            .scripted
            .lock()
            .expect("fault queue poisoned")
            .extend(faults);
    }

    /// Runs a conditional write under the fault plan. On an injected fault the
    /// write is committed or dropped per the fault variant, and the caller
    /// only ever sees `Ambiguous`.
    fn conditional<F>(&self, op: &'static str, write: F) -> Result<bool, StoreError>
    where
        F: FnOnce() -> Result<bool, StoreError>,
    {
        match self.faults.next() {
            None | Some(Fault::Clean) => write(),
            Some(Fault::AmbiguousCommitted) => {
                write()?;
                Err(StoreError::Ambiguous { op })
            }
            Some(Fault::AmbiguousDropped) => Err(StoreError::Ambiguous { op }),
        }
    }
}

fn insert_if_absent<K, T>(map: &DashMap<K, Vec<u8>>, key: K, row: &T) -> Result<bool, StoreError>
where
    K: std::hash::Hash + Eq,
    T: Serialize,
{
    let bytes = encode(row)?;
    match map.entry(key) {
        Entry::Occupied(_) => Ok(false),
        Entry::Vacant(slot) => {
            slot.insert(bytes);
            Ok(true)
        }
    }
}

#[async_trait::async_trait]
impl StoreClient for InMemoryQuorumStore {
    async fn insert_movie_if_absent(&self, movie: Movie) -> Result<bool, StoreError> {
        self.conditional("movie insert", || {
            insert_if_absent(&self.movies, movie.name.clone(), &movie)
        })
    }

    async fn get_movie(&self, name: &str) -> Result<Option<Movie>, StoreError> {
        self.movies.get(name).map(|e| decode(e.value())).transpose()
    }

    async fn list_movies(&self) -> Result<Vec<Movie>, StoreError> {
        self.movies.iter().map(|e| decode(e.value())).collect()
    }

    async fn insert_user_if_absent(&self, user: User) -> Result<bool, StoreError> {
        self.conditional("user insert", || {
            // Uniqueness hangs off the username key; the id row follows.
            match self.usernames.entry(user.username.clone()) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(user.id);
                    self.users.insert(user.id, encode(&user)?);
                    Ok(true)
                }
            }
        })
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.users.get(&id).map(|e| decode(e.value())).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.usernames.get(username).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.get_user(id).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.users.iter().map(|e| decode(e.value())).collect()
    }

    async fn insert_reservation_if_absent(&self, row: Reservation) -> Result<bool, StoreError> {
        self.conditional("reservation insert", || {
            let key = (row.movie.clone(), row.seat.clone());
            insert_if_absent(&self.reservations, key, &row)
        })
    }

    async fn get_reservation(
        &self,
        movie: &str,
        seat: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let key = (movie.to_string(), seat.to_string());
        self.reservations.get(&key).map(|e| decode(e.value())).transpose()
    }

    async fn delete_reservation_if_owner(
        &self,
        movie: &str,
        seat: &str,
        owner: UserId,
    ) -> Result<bool, StoreError> {
        self.conditional("reservation delete", || {
            let key = (movie.to_string(), seat.to_string());
            let removed = self.reservations.remove_if(&key, |_, bytes| {
                decode::<Reservation>(bytes).is_ok_and(|r| r.user_id == owner)
            });
            Ok(removed.is_some())
        })
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        self.reservations.iter().map(|e| decode(e.value())).collect()
    }

    async fn topology(&self) -> Result<NodeTopology, StoreError> {
        Ok(NodeTopology {
            local: NodeDescriptor {
                address: "127.0.0.1:9042".into(),
            },
            peers: (0..self.peers)
                .map(|i| NodeDescriptor {
                    address: format!("10.0.0.{}:9042", i + 2),
                })
                .collect(),
        })
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.movies.clear();
        self.users.clear();
        self.usernames.clear();
        self.reservations.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn reservation_insert_is_first_writer_wins() {
        let store = InMemoryQuorumStore::new();
        let a = Reservation::new("m", "A1", Ulid::new());
        let b = Reservation::new("m", "A1", Ulid::new());
        assert!(store.insert_reservation_if_absent(a.clone()).await.unwrap());
        assert!(!store.insert_reservation_if_absent(b).await.unwrap());
        let held = store.get_reservation("m", "A1").await.unwrap().unwrap();
        assert_eq!(held.user_id, a.user_id);
    }

    #[tokio::test]
    async fn username_uniqueness_enforced() {
        let store = InMemoryQuorumStore::new();
        assert!(store.insert_user_if_absent(User::new("ada")).await.unwrap());
        assert!(!store.insert_user_if_absent(User::new("ada")).await.unwrap());
        let found = store.get_user_by_username("ada").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn delete_requires_matching_owner() {
        let store = InMemoryQuorumStore::new();
        let row = Reservation::new("m", "B2", Ulid::new());
        store.insert_reservation_if_absent(row.clone()).await.unwrap();

        assert!(
            !store
                .delete_reservation_if_owner("m", "B2", Ulid::new())
                .await
                .unwrap()
        );
        assert!(store.get_reservation("m", "B2").await.unwrap().is_some());

        assert!(
            store
                .delete_reservation_if_owner("m", "B2", row.user_id)
                .await
                .unwrap()
        );
        assert!(store.get_reservation("m", "B2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_absent_row_not_applied() {
        let store = InMemoryQuorumStore::new();
        assert!(
            !store
                .delete_reservation_if_owner("m", "Z9", Ulid::new())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn scripted_ambiguity_committed_still_writes() {
        let store = InMemoryQuorumStore::with(2, Faults::scripted([Fault::AmbiguousCommitted]));
        let row = Reservation::new("m", "C3", Ulid::new());
        let err = store
            .insert_reservation_if_absent(row.clone())
            .await
            .unwrap_err();
        assert!(err.is_ambiguous());
        // The write landed even though the caller couldn't see it.
        assert!(store.get_reservation("m", "C3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scripted_ambiguity_dropped_writes_nothing() {
        let store = InMemoryQuorumStore::with(2, Faults::scripted([Fault::AmbiguousDropped]));
        let row = Reservation::new("m", "C3", Ulid::new());
        let err = store.insert_reservation_if_absent(row).await.unwrap_err();
        assert!(err.is_ambiguous());
        assert!(store.get_reservation("m", "C3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_clears_every_keyspace() {
        let store = InMemoryQuorumStore::new();
        store
            .insert_movie_if_absent(Movie::new("m", 0))
            .await
            .unwrap();
        store.insert_user_if_absent(User::new("ada")).await.unwrap();
        store
            .insert_reservation_if_absent(Reservation::new("m", "A1", Ulid::new()))
            .await
            .unwrap();

        store.reset().await.unwrap();
        assert!(store.list_movies().await.unwrap().is_empty());
        assert!(store.list_users().await.unwrap().is_empty());
        assert!(store.list_reservations().await.unwrap().is_empty());
        assert!(store.get_user_by_username("ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn topology_reports_peer_count() {
        let store = InMemoryQuorumStore::with(4, Faults::none());
        let topo = store.topology().await.unwrap();
        assert_eq!(topo.total_nodes(), 5);
    }
}
