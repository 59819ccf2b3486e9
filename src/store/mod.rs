mod error;
mod memory;

pub use error::StoreError;
pub use memory::{Fault, Faults, InMemoryQuorumStore};

use async_trait::async_trait;

use crate::model::{Movie, Reservation, User, UserId};

/// One visible cluster member, as reported by the store's topology view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub address: String,
}

/// The store's view of cluster membership: the node we are connected to plus
/// its peers. Coarse — says nothing about any particular key's replicas.
#[derive(Debug, Clone)]
pub struct NodeTopology {
    pub local: NodeDescriptor,
    pub peers: Vec<NodeDescriptor>,
}

impl NodeTopology {
    pub fn total_nodes(&self) -> usize {
        self.peers.len() + 1
    }
}

/// Quorum-consistent key-value contract the reservation protocols run on.
///
/// Every operation executes at quorum consistency; the conditional writes
/// return `Ok(true)` when applied and `Ok(false)` when the precondition did
/// not hold (key present for inserts, value mismatch or absent for deletes).
/// A write whose commit status cannot be confirmed before the call's timeout
/// resolves to `Err(StoreError::Ambiguous)` — never a guess either way.
///
/// There are no multi-key transactions. Each key is governed by whichever
/// conditional write last succeeded against it; callers re-read before every
/// decision instead of trusting any in-process cache.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn insert_movie_if_absent(&self, movie: Movie) -> Result<bool, StoreError>;
    async fn get_movie(&self, name: &str) -> Result<Option<Movie>, StoreError>;
    async fn list_movies(&self) -> Result<Vec<Movie>, StoreError>;

    /// Applied=false when the username is already registered.
    async fn insert_user_if_absent(&self, user: User) -> Result<bool, StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn insert_reservation_if_absent(&self, row: Reservation) -> Result<bool, StoreError>;
    async fn get_reservation(
        &self,
        movie: &str,
        seat: &str,
    ) -> Result<Option<Reservation>, StoreError>;
    /// Deletes (movie, seat) only if the row exists and is owned by `owner`.
    async fn delete_reservation_if_owner(
        &self,
        movie: &str,
        seat: &str,
        owner: UserId,
    ) -> Result<bool, StoreError>;
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn topology(&self) -> Result<NodeTopology, StoreError>;

    /// Drop and recreate the whole keyspace. Harness precondition only.
    async fn reset(&self) -> Result<(), StoreError>;
}
