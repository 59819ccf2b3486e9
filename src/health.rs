use std::sync::Arc;

use tracing::{info, warn};

use crate::store::{StoreClient, StoreError};

/// Minimum visible nodes for quorum operations to be satisfiable cluster-wide.
pub const QUORUM_MIN_NODES: usize = 2;

/// Coarse cluster-membership check: counts the local node plus its visible
/// peers. Says nothing about any specific key's replicas.
///
/// Advisory only — booking and transfer never consult this before acting.
/// A caller that wants the guarantee checks health itself first.
pub struct HealthMonitor {
    store: Arc<dyn StoreClient>,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Topology read plus the node-count threshold, with the raw numbers.
    pub async fn probe(&self) -> Result<ClusterHealth, StoreError> {
        let topology = self.store.topology().await?;
        let total_nodes = topology.total_nodes();
        Ok(ClusterHealth {
            total_nodes,
            healthy: total_nodes >= QUORUM_MIN_NODES,
        })
    }

    /// The plain yes/no surface. Topology errors count as unhealthy.
    pub async fn check(&self) -> bool {
        match self.probe().await {
            Ok(health) => {
                if health.healthy {
                    info!("cluster health: {} nodes visible, quorum satisfiable", health.total_nodes);
                } else {
                    warn!("cluster health: only {} node(s) visible, quorum not satisfiable", health.total_nodes);
                }
                health.healthy
            }
            Err(e) => {
                warn!("cluster health check failed: {e}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterHealth {
    pub total_nodes: usize,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Faults, InMemoryQuorumStore};

    #[tokio::test]
    async fn lone_node_is_unhealthy() {
        let store = Arc::new(InMemoryQuorumStore::with(0, Faults::none()));
        let monitor = HealthMonitor::new(store);
        assert!(!monitor.check().await);
    }

    #[tokio::test]
    async fn two_nodes_satisfy_quorum() {
        let store = Arc::new(InMemoryQuorumStore::with(1, Faults::none()));
        let monitor = HealthMonitor::new(store);
        let health = monitor.probe().await.unwrap();
        assert_eq!(health.total_nodes, 2);
        assert!(health.healthy);
    }

    #[tokio::test]
    async fn membership_ignores_reservation_state() {
        // Health is a node count, independent of any per-key state.
        let store = Arc::new(InMemoryQuorumStore::with(2, Faults::none()));
        store
            .insert_reservation_if_absent(crate::model::Reservation::new(
                "m",
                "A1",
                ulid::Ulid::new(),
            ))
            .await
            .unwrap();
        let monitor = HealthMonitor::new(store);
        assert!(monitor.check().await);
    }
}
