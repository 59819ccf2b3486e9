use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// User ids are generated at registration and never reused.
pub type UserId = Ulid;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

/// A movie showing. Keyed by `name`; inserted once, idempotently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub name: String,
    pub showtime: Ms,
    pub creation: Ms,
    pub modification: Ms,
}

impl Movie {
    pub fn new(name: impl Into<String>, showtime: Ms) -> Self {
        let now = now_ms();
        Self {
            name: name.into(),
            showtime,
            creation: now,
            modification: now,
        }
    }
}

/// A registered user. Keyed by `id`; `username` is unique via the store's
/// conditional insert, never via client-side checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub creation: Ms,
    pub modification: Ms,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Ulid::new(),
            username: username.into(),
            creation: now,
            modification: now,
        }
    }
}

/// One seat held by one user for one movie. Composite key (movie, seat).
///
/// `creation` survives seat moves; `modification` is bumped on every move.
/// At most one reservation exists per (movie, seat) at any time — the store's
/// per-key conditional insert enforces this, not application locking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub movie: String,
    pub seat: String,
    pub user_id: UserId,
    pub creation: Ms,
    pub modification: Ms,
}

impl Reservation {
    pub fn new(movie: impl Into<String>, seat: impl Into<String>, user_id: UserId) -> Self {
        let now = now_ms();
        Self {
            movie: movie.into(),
            seat: seat.into(),
            user_id,
            creation: now,
            modification: now,
        }
    }

    /// The replacement row a transfer claims: same owner, same creation
    /// timestamp, fresh modification timestamp.
    pub fn moved_to(&self, new_seat: impl Into<String>) -> Self {
        Self {
            movie: self.movie.clone(),
            seat: new_seat.into(),
            user_id: self.user_id,
            creation: self.creation,
            modification: now_ms(),
        }
    }
}

/// Seat labels "A1", "A2", .. row-major: `seat_grid(5, 10)` is A1–E10.
pub fn seat_grid(rows: u8, cols: u8) -> Vec<String> {
    (0..rows)
        .flat_map(|r| (1..=cols).map(move |c| format!("{}{c}", (b'A' + r) as char)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_grid_layout() {
        let seats = seat_grid(5, 10);
        assert_eq!(seats.len(), 50);
        assert_eq!(seats[0], "A1");
        assert_eq!(seats[9], "A10");
        assert_eq!(seats[10], "B1");
        assert_eq!(seats[49], "E10");
    }

    #[test]
    fn moved_reservation_keeps_creation() {
        let r = Reservation::new("StressMovie1", "A1", Ulid::new());
        let moved = r.moved_to("B2");
        assert_eq!(moved.creation, r.creation);
        assert_eq!(moved.user_id, r.user_id);
        assert_eq!(moved.movie, r.movie);
        assert_eq!(moved.seat, "B2");
        assert!(moved.modification >= r.modification);
    }

    #[test]
    fn record_serialization_roundtrip() {
        let r = Reservation::new("StressMovie1", "Z9", Ulid::new());
        let bytes = bincode::serialize(&r).unwrap();
        let decoded: Reservation = bincode::deserialize(&bytes).unwrap();
        assert_eq!(r, decoded);
    }
}
