use std::sync::Arc;

use tracing::info;

use crate::model::{Reservation, UserId};
use crate::retry::RetryPolicy;
use crate::store::{StoreClient, StoreError};

/// How a booking attempt ended. Everything except `Booked` is a business
/// decline, not an error — store failures travel as `Err(StoreError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookOutcome {
    Booked,
    /// The conditional insert was not applied: someone else holds the seat.
    /// Certain outcome, never retried.
    SeatTaken,
    UnknownMovie,
    UnknownUser,
    /// Every attempt came back ambiguous. The seat may or may not be ours;
    /// we report failure rather than guess.
    Unresolved,
}

impl BookOutcome {
    pub fn booked(&self) -> bool {
        matches!(self, BookOutcome::Booked)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookOutcome::Booked => "booked",
            BookOutcome::SeatTaken => "seat_taken",
            BookOutcome::UnknownMovie => "unknown_movie",
            BookOutcome::UnknownUser => "unknown_user",
            BookOutcome::Unresolved => "unresolved",
        }
    }
}

/// Books one seat with one conditional insert. The store's per-key
/// compare-and-swap is the only thing preventing double-booking; there is no
/// client-side locking anywhere in this path.
pub struct BookingService {
    store: Arc<dyn StoreClient>,
    retry: RetryPolicy,
}

impl BookingService {
    pub fn new(store: Arc<dyn StoreClient>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn book(
        &self,
        movie: &str,
        user_id: UserId,
        seat: &str,
    ) -> Result<BookOutcome, StoreError> {
        let outcome = self.try_book(movie, user_id, seat).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    async fn try_book(
        &self,
        movie: &str,
        user_id: UserId,
        seat: &str,
    ) -> Result<BookOutcome, StoreError> {
        if self.store.get_movie(movie).await?.is_none() {
            info!("booking declined: movie '{movie}' does not exist");
            return Ok(BookOutcome::UnknownMovie);
        }
        if self.store.get_user(user_id).await?.is_none() {
            info!("booking declined: user {user_id} does not exist");
            return Ok(BookOutcome::UnknownUser);
        }

        let row = Reservation::new(movie, seat, user_id);
        // Retrying the identical insert is safe: a lost-but-committed attempt
        // shows up as not-applied on the retry.
        match self
            .retry
            .run("reservation insert", || {
                self.store.insert_reservation_if_absent(row.clone())
            })
            .await
        {
            Ok(true) => {
                info!("reservation created: movie {movie}, user {user_id}, seat {seat}");
                Ok(BookOutcome::Booked)
            }
            Ok(false) => {
                info!("seat {seat} already reserved for movie {movie}");
                Ok(BookOutcome::SeatTaken)
            }
            Err(e) if e.is_ambiguous() => Ok(BookOutcome::Unresolved),
            Err(e) => Err(e),
        }
    }
}
