//! Seat reservations over a quorum-replicated store that offers per-key
//! conditional writes but no multi-key transactions. Booking is one
//! compare-and-swap insert; moving a seat is claim-then-release with a
//! best-effort compensation; ambiguous outcomes are retried under an
//! injected policy and never assumed to have succeeded.

pub mod booking;
pub mod catalog;
pub mod health;
pub mod model;
pub mod observability;
pub mod retry;
pub mod store;
pub mod stress;
pub mod transfer;

pub use booking::{BookOutcome, BookingService};
pub use catalog::Catalog;
pub use health::HealthMonitor;
pub use retry::RetryPolicy;
pub use store::{InMemoryQuorumStore, StoreClient, StoreError};
pub use stress::StressHarness;
pub use transfer::{TransferOutcome, TransferService};
