//! Concurrent workloads that hammer the booking and transfer protocols
//! against a freshly reset store, then verify the no-double-booking and
//! count invariants from a full read-back.
//!
//! Aggregation is message-passing: every worker task returns its own
//! [`Tally`] on completion and the harness merges them after the join —
//! there is no shared counter behind a lock.

mod scenarios;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::model::{Reservation, UserId};
use crate::retry::RetryPolicy;
use crate::store::{StoreClient, StoreError};

/// Fixture showtime: 2025-12-25 20:00 UTC.
pub(crate) const FIXTURE_SHOWTIME: crate::model::Ms = 1_766_692_800_000;

/// What the post-run read-back is allowed to assert.
///
/// Against a store with no injected faults the client-side tallies predict
/// the table exactly. Under injected ambiguity a retried-but-committed write
/// is invisible to the tallies (the caller was told "not applied"), so only
/// the safety invariants — seat uniqueness, known owners, no hard errors —
/// remain checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    Strict,
    SafetyOnly,
}

/// Drives the four stress scenarios over one store handle. The same retry
/// policy is injected into every service the harness constructs.
pub struct StressHarness {
    pub(crate) store: Arc<dyn StoreClient>,
    pub(crate) retry: RetryPolicy,
    pub(crate) verify: VerifyMode,
}

impl StressHarness {
    pub fn new(store: Arc<dyn StoreClient>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            verify: VerifyMode::Strict,
        }
    }

    /// For runs against a store with fault injection enabled.
    pub fn safety_only(store: Arc<dyn StoreClient>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            verify: VerifyMode::SafetyOnly,
        }
    }
}

/// Scenario A: N identical booking requests through a bounded pool.
#[derive(Debug, Clone, Copy)]
pub struct RapidFireOptions {
    pub requests: usize,
}

impl Default for RapidFireOptions {
    fn default() -> Self {
        Self { requests: 50 }
    }
}

/// Scenarios B and C: clients mixing random books and transfers.
#[derive(Debug, Clone, Copy)]
pub struct MixedOptions {
    pub clients: usize,
    pub ops_per_client: usize,
    /// Workers derive their RNG from this, so runs are reproducible.
    pub seed: u64,
}

impl Default for MixedOptions {
    fn default() -> Self {
        Self {
            clients: 5,
            ops_per_client: 15,
            seed: 0,
        }
    }
}

/// Scenario D: two users racing for one pool of seats.
#[derive(Debug, Clone, Copy)]
pub struct SeatRaceOptions {
    pub seats: usize,
    pub workers_per_user: usize,
    pub seed: u64,
}

impl Default for SeatRaceOptions {
    fn default() -> Self {
        Self {
            seats: 30,
            workers_per_user: 20,
            seed: 0,
        }
    }
}

/// Per-worker operation counts.
///
/// `unresolved` and `rolled_back` only move under injected ambiguity; when
/// both are zero the count invariants are asserted exactly, otherwise each
/// such operation is allowed to shift the final row count by one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub booked: u64,
    pub transferred: u64,
    pub skipped: u64,
    pub errored: u64,
    pub unresolved: u64,
    pub rolled_back: u64,
}

impl Tally {
    pub fn merge(&mut self, other: Tally) {
        self.booked += other.booked;
        self.transferred += other.transferred;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.unresolved += other.unresolved;
        self.rolled_back += other.rolled_back;
    }

    pub fn operations(&self) -> u64 {
        self.booked + self.transferred + self.skipped + self.errored + self.unresolved
            + self.rolled_back
    }

    /// Operations whose effect on the row count is not knowable client-side.
    pub fn disturbances(&self) -> u64 {
        self.unresolved + self.rolled_back
    }
}

/// Outcome of one scenario run: counters, timing, read-back size, verdict.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub elapsed: Duration,
    pub tally: Tally,
    /// Final full-table reservation count.
    pub reservations: usize,
    pub passed: bool,
    pub detail: String,
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = &self.tally;
        writeln!(
            f,
            "[{}] {} in {:.2}s",
            self.name,
            if self.passed { "PASS" } else { "FAIL" },
            self.elapsed.as_secs_f64(),
        )?;
        writeln!(
            f,
            "  booked={} transferred={} skipped={} errored={} unresolved={} rolled_back={}",
            t.booked, t.transferred, t.skipped, t.errored, t.unresolved, t.rolled_back,
        )?;
        write!(f, "  reservations={} — {}", self.reservations, self.detail)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

pub(crate) async fn seed_movie(catalog: &Catalog, name: &str) -> Result<(), StoreError> {
    catalog.add_movie(name, FIXTURE_SHOWTIME).await?;
    Ok(())
}

/// Fixture users run against a reset store, so a taken username can only
/// mean our own insert committed behind a lost ack — recover the id by the
/// unique username lookup.
pub(crate) async fn seed_user(catalog: &Catalog, username: &str) -> Result<UserId, StoreError> {
    if let Some(user) = catalog.register_user(username).await? {
        return Ok(user.id);
    }
    catalog
        .find_user(username)
        .await?
        .map(|u| u.id)
        .ok_or_else(|| StoreError::Backend(format!("fixture user '{username}' unrecoverable")))
}

// ── Read-back verification ───────────────────────────────────────

/// True when no (movie, seat) pair appears twice — the core invariant.
pub(crate) fn seats_unique(rows: &[Reservation]) -> bool {
    let mut seen = HashSet::new();
    rows.iter().all(|r| seen.insert((r.movie.as_str(), r.seat.as_str())))
}

/// True when every row is owned by one of the fixture users.
pub(crate) fn owners_known(rows: &[Reservation], users: &[UserId]) -> bool {
    rows.iter().all(|r| users.contains(&r.user_id))
}
