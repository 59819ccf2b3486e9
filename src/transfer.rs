use std::sync::Arc;

use tracing::{info, warn};

use crate::model::UserId;
use crate::retry::RetryPolicy;
use crate::store::{StoreClient, StoreError};

/// How a transfer attempt ended. Like booking, declines are outcomes and
/// store failures are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Moved,
    /// New seat equals current seat — successful no-op.
    SameSeat,
    UnknownMovie,
    UnknownUser,
    /// No reservation at (movie, current seat).
    NotReserved,
    /// The reservation belongs to a different user.
    WrongOwner,
    /// The new seat's conditional insert was not applied. Nothing was
    /// written, so nothing needs compensating.
    SeatTaken,
    /// The claim landed but the release was not applied; the claim was
    /// deleted again (best effort) and the transfer reported as failed.
    RolledBack,
    /// A step stayed ambiguous through every retry. State unknown; no
    /// compensation is attempted on an unknown outcome.
    Unresolved,
}

impl TransferOutcome {
    pub fn moved(&self) -> bool {
        matches!(self, TransferOutcome::Moved | TransferOutcome::SameSeat)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Moved => "moved",
            TransferOutcome::SameSeat => "same_seat",
            TransferOutcome::UnknownMovie => "unknown_movie",
            TransferOutcome::UnknownUser => "unknown_user",
            TransferOutcome::NotReserved => "not_reserved",
            TransferOutcome::WrongOwner => "wrong_owner",
            TransferOutcome::SeatTaken => "seat_taken",
            TransferOutcome::RolledBack => "rolled_back",
            TransferOutcome::Unresolved => "unresolved",
        }
    }
}

/// Moves a reservation to another seat as claim-then-release: a conditional
/// insert on the new key, then a conditional delete on the old one.
///
/// The two steps touch independent keys and the store has no multi-key
/// transactions, so this is not atomic. A crash between a successful claim
/// and the release leaves the user holding both seats, and the compensation
/// delete after a failed release is itself best-effort. That window is a
/// deliberate scope boundary of the store's capability, documented and
/// tested rather than papered over.
pub struct TransferService {
    store: Arc<dyn StoreClient>,
    retry: RetryPolicy,
}

impl TransferService {
    pub fn new(store: Arc<dyn StoreClient>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn transfer(
        &self,
        movie: &str,
        current_seat: &str,
        new_seat: &str,
        user_id: UserId,
    ) -> Result<TransferOutcome, StoreError> {
        let outcome = self
            .try_transfer(movie, current_seat, new_seat, user_id)
            .await?;
        metrics::counter!(crate::observability::TRANSFERS_TOTAL, "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    async fn try_transfer(
        &self,
        movie: &str,
        current_seat: &str,
        new_seat: &str,
        user_id: UserId,
    ) -> Result<TransferOutcome, StoreError> {
        if self.store.get_movie(movie).await?.is_none() {
            info!("transfer declined: movie '{movie}' does not exist");
            return Ok(TransferOutcome::UnknownMovie);
        }
        if self.store.get_user(user_id).await?.is_none() {
            info!("transfer declined: user {user_id} does not exist");
            return Ok(TransferOutcome::UnknownUser);
        }

        let Some(current) = self.store.get_reservation(movie, current_seat).await? else {
            info!("transfer declined: no reservation at {movie}/{current_seat}");
            return Ok(TransferOutcome::NotReserved);
        };
        if current.user_id != user_id {
            info!("transfer declined: {movie}/{current_seat} belongs to a different user");
            return Ok(TransferOutcome::WrongOwner);
        }
        if new_seat == current_seat {
            return Ok(TransferOutcome::SameSeat);
        }

        // Claim: conditional insert on the new key, original creation
        // timestamp carried over.
        let claim = current.moved_to(new_seat);
        match self
            .retry
            .run("transfer claim", || {
                self.store.insert_reservation_if_absent(claim.clone())
            })
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!("transfer declined: seat {new_seat} already taken for {movie}");
                return Ok(TransferOutcome::SeatTaken);
            }
            Err(e) if e.is_ambiguous() => {
                warn!("transfer claim for {movie}/{new_seat} unresolved; seat may be stranded");
                return Ok(TransferOutcome::Unresolved);
            }
            Err(e) => return Err(e),
        }

        // Release: conditional delete of the old key, guarded on ownership.
        match self
            .retry
            .run("transfer release", || {
                self.store
                    .delete_reservation_if_owner(movie, current_seat, user_id)
            })
            .await
        {
            Ok(true) => {
                info!("reservation moved: {movie} {current_seat} -> {new_seat}");
                Ok(TransferOutcome::Moved)
            }
            Ok(false) => {
                // Old seat vanished or changed hands while we held both keys.
                self.compensate(movie, new_seat, user_id).await;
                Ok(TransferOutcome::RolledBack)
            }
            Err(e) if e.is_ambiguous() => {
                // Release state unknown: compensating now could strand the
                // user with no seat at all, so leave both keys as they are.
                warn!(
                    "transfer release for {movie}/{current_seat} unresolved; \
                     user {user_id} may hold both seats"
                );
                Ok(TransferOutcome::Unresolved)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort rollback of a claimed seat after a failed release. Tried
    /// once, never retried; a failure here leaves the documented dual-seat
    /// window open and is only logged and counted.
    async fn compensate(&self, movie: &str, new_seat: &str, user_id: UserId) {
        match self
            .store
            .delete_reservation_if_owner(movie, new_seat, user_id)
            .await
        {
            Ok(true) => info!("transfer rolled back: released claim on {movie}/{new_seat}"),
            Ok(false) => {
                metrics::counter!(crate::observability::COMPENSATION_FAILURES_TOTAL).increment(1);
                warn!("rollback of {movie}/{new_seat} not applied; claim already gone or reowned");
            }
            Err(e) => {
                metrics::counter!(crate::observability::COMPENSATION_FAILURES_TOTAL).increment(1);
                warn!("rollback of {movie}/{new_seat} failed: {e}");
            }
        }
    }
}
