use std::collections::HashSet;
use std::sync::Arc;

use marquee::store::{Faults, InMemoryQuorumStore};
use marquee::stress::{MixedOptions, RapidFireOptions, SeatRaceOptions};
use marquee::{
    BookOutcome, BookingService, Catalog, HealthMonitor, RetryPolicy, StoreClient, StressHarness,
    TransferOutcome, TransferService,
};

// ── Test infrastructure ──────────────────────────────────────

fn harness() -> StressHarness {
    StressHarness::new(
        Arc::new(InMemoryQuorumStore::new()),
        RetryPolicy::immediate(),
    )
}

async fn seeded_store() -> (Arc<InMemoryQuorumStore>, ulid::Ulid) {
    let store = Arc::new(InMemoryQuorumStore::new());
    let catalog = Catalog::new(store.clone(), RetryPolicy::immediate());
    catalog.add_movie("StressMovie1", 1_766_692_800_000).await.unwrap();
    let user = catalog.register_user("stresstest0").await.unwrap().unwrap();
    (store, user.id)
}

// ── Scenario A ───────────────────────────────────────────────

#[tokio::test]
async fn rapid_fire_fifty_requests_one_winner() {
    let report = harness()
        .rapid_fire(RapidFireOptions { requests: 50 })
        .await
        .unwrap();
    assert!(report.passed, "{report}");
    assert_eq!(report.tally.booked, 1);
    assert_eq!(report.tally.skipped, 49);
    assert_eq!(report.tally.errored, 0);
    assert_eq!(report.reservations, 1);
}

#[tokio::test]
async fn rapid_fire_holds_across_pool_sizes() {
    // The one-winner property must not depend on concurrency level.
    for requests in [1, 10, 25, 50] {
        let report = harness()
            .rapid_fire(RapidFireOptions { requests })
            .await
            .unwrap();
        assert!(report.passed, "requests={requests}: {report}");
        assert_eq!(report.tally.booked, 1, "requests={requests}");
    }
}

// ── Scenarios B and C ────────────────────────────────────────

#[tokio::test]
async fn coordinated_mixed_count_matches_bookings() {
    let report = harness()
        .coordinated_mixed(MixedOptions {
            clients: 5,
            ops_per_client: 15,
            seed: 11,
        })
        .await
        .unwrap();
    assert!(report.passed, "{report}");
    assert_eq!(report.reservations as u64, report.tally.booked);
    assert_eq!(report.tally.errored, 0);
}

#[tokio::test]
async fn uncoordinated_mixed_needs_no_client_locking() {
    let report = harness()
        .uncoordinated_mixed(MixedOptions {
            clients: 5,
            ops_per_client: 15,
            seed: 13,
        })
        .await
        .unwrap();
    assert!(report.passed, "{report}");
    assert_eq!(report.reservations as u64, report.tally.booked);
}

#[tokio::test]
async fn uncoordinated_mixed_survives_injected_ambiguity() {
    // Under random CAS timeouts the exact count can drift by the number of
    // unresolved operations, but no seat may ever be double-booked and no
    // operation may surface a hard error.
    let store = Arc::new(InMemoryQuorumStore::with(2, Faults::random(0.08, 42)));
    let harness = StressHarness::safety_only(store.clone(), RetryPolicy::immediate());
    let report = harness
        .uncoordinated_mixed(MixedOptions {
            clients: 5,
            ops_per_client: 15,
            seed: 42,
        })
        .await
        .unwrap();
    assert!(report.passed, "{report}");

    let rows = store.list_reservations().await.unwrap();
    let mut seen = HashSet::new();
    for row in &rows {
        assert!(
            seen.insert((row.movie.clone(), row.seat.clone())),
            "seat {}/{} double-booked",
            row.movie,
            row.seat
        );
    }
}

// ── Scenario D ───────────────────────────────────────────────

#[tokio::test]
async fn seat_race_thirty_seats_two_users() {
    let report = harness()
        .seat_race(SeatRaceOptions {
            seats: 30,
            workers_per_user: 20,
            seed: 5,
        })
        .await
        .unwrap();
    assert!(report.passed, "{report}");
    assert_eq!(report.tally.errored, 0);
    // Every seat went to exactly one of the two racers.
    assert_eq!(report.reservations, 30);
}

// ── Cross-protocol properties ────────────────────────────────

#[tokio::test]
async fn book_then_move_then_move_back_round_trip() {
    let (store, user) = seeded_store().await;
    let booking = BookingService::new(store.clone(), RetryPolicy::immediate());
    let transfer = TransferService::new(store.clone(), RetryPolicy::immediate());

    assert_eq!(
        booking.book("StressMovie1", user, "A1").await.unwrap(),
        BookOutcome::Booked
    );
    let original = store.get_reservation("StressMovie1", "A1").await.unwrap().unwrap();

    assert_eq!(
        transfer.transfer("StressMovie1", "A1", "B2", user).await.unwrap(),
        TransferOutcome::Moved
    );
    assert_eq!(
        transfer.transfer("StressMovie1", "B2", "A1", user).await.unwrap(),
        TransferOutcome::Moved
    );

    let back = store.get_reservation("StressMovie1", "A1").await.unwrap().unwrap();
    assert_eq!(back.movie, original.movie);
    assert_eq!(back.seat, original.seat);
    assert_eq!(back.user_id, original.user_id);
    assert_eq!(back.creation, original.creation);
    assert!(back.modification >= original.modification);
    assert_eq!(store.list_reservations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn health_is_advisory_booking_proceeds_regardless() {
    // One visible node: unhealthy. Booking does not consult the monitor and
    // still succeeds — the documented design gap.
    let store = Arc::new(InMemoryQuorumStore::with(0, Faults::none()));
    let catalog = Catalog::new(store.clone(), RetryPolicy::immediate());
    catalog.add_movie("StressMovie1", 1_766_692_800_000).await.unwrap();
    let user = catalog.register_user("stresstest0").await.unwrap().unwrap();

    let monitor = HealthMonitor::new(store.clone());
    assert!(!monitor.check().await);

    let booking = BookingService::new(store.clone(), RetryPolicy::immediate());
    assert_eq!(
        booking.book("StressMovie1", user.id, "Z9").await.unwrap(),
        BookOutcome::Booked
    );
}
