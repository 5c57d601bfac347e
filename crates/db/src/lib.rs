use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDateTime;
use padel_models::{
    Court, NewCourt, NewReservation, NewUser, RegisterOutcome, Reservation, ReservationDetail, User,
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

/// Opens a pool on `database_url`.
///
/// Every connection to an in-memory database sees its own empty database, so
/// such URLs get a single connection that is never recycled, whatever
/// `max_connections` says.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if is_in_memory(database_url) {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;
    info!("Connected to database: {database_url}");
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

/// Round-trips a trivial query; used by the health endpoint.
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub const SLOT_CONFLICT_MESSAGE: &str = "Court is already booked for this time slot";

/// Failure modes of [`create_reservation`].
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{}", SLOT_CONFLICT_MESSAGE)]
    SlotConflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

// Stored form of every timestamp column. Must match SQLite's datetime('now').
fn sql_timestamp(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

// --- Courts ---

const COURT_COLUMNS: &str = "id, name, description, indoor, capacity, price, currency, timezone";

pub async fn list_courts(pool: &SqlitePool) -> Result<Vec<Court>> {
    let sql = format!("SELECT {COURT_COLUMNS} FROM courts ORDER BY id");
    let courts = sqlx::query_as::<_, Court>(&sql).fetch_all(pool).await?;
    Ok(courts)
}

pub async fn get_court(pool: &SqlitePool, court_id: i64) -> Result<Option<Court>> {
    let sql = format!("SELECT {COURT_COLUMNS} FROM courts WHERE id = ?");
    let court = sqlx::query_as::<_, Court>(&sql)
        .bind(court_id)
        .fetch_optional(pool)
        .await?;
    Ok(court)
}

pub async fn add_court(pool: &SqlitePool, court: &NewCourt) -> Result<Court> {
    let sql = format!(
        "INSERT INTO courts (name, description, indoor, capacity, price, currency, timezone) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         RETURNING {COURT_COLUMNS}"
    );
    let court = sqlx::query_as::<_, Court>(&sql)
        .bind(&court.name)
        .bind(&court.description)
        .bind(court.indoor)
        .bind(court.capacity)
        .bind(court.price)
        .bind(&court.currency)
        .bind(&court.timezone)
        .fetch_one(pool)
        .await?;
    info!("Court {} ({}) added", court.id, court.name);
    Ok(court)
}

// --- Reservations ---

const RESERVATION_COLUMNS: &str = "id, court_id, user_id, start_time, end_time, players_count, \
    price_cents, currency, status, cancel_reason, cancelled_at, created_at";

/// Books a slot unless an active reservation on the same court starts or ends
/// inside `[start_time, end_time]` (inclusive on both ends).
///
/// Only endpoints are checked: an existing booking that strictly contains the
/// requested interval is not detected. The check and the insert run as two
/// separate statements, so concurrent requests for one slot can both succeed.
pub async fn create_reservation(
    pool: &SqlitePool,
    req: &NewReservation,
) -> Result<i64, BookingError> {
    let start = sql_timestamp(&req.start_time);
    let end = sql_timestamp(&req.end_time);

    let overlapping: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM reservations \
         WHERE court_id = ? \
           AND status != 'cancelled' \
           AND ((start_time BETWEEN ? AND ?) OR (end_time BETWEEN ? AND ?))",
    )
    .bind(req.court_id)
    .bind(&start)
    .bind(&end)
    .bind(&start)
    .bind(&end)
    .fetch_all(pool)
    .await?;

    if let Some((existing,)) = overlapping.first() {
        debug!(
            "Court {} slot {start}..{end} collides with reservation {existing}",
            req.court_id
        );
        return Err(BookingError::SlotConflict);
    }

    let result = sqlx::query(
        "INSERT INTO reservations \
            (court_id, user_id, start_time, end_time, players_count, price_cents, currency) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(req.court_id)
    .bind(&req.user_id)
    .bind(&start)
    .bind(&end)
    .bind(req.players_count)
    .bind(req.price_cents)
    .bind(&req.currency)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_reservation(pool: &SqlitePool, reservation_id: i64) -> Result<Option<Reservation>> {
    let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?");
    let reservation = sqlx::query_as::<_, Reservation>(&sql)
        .bind(reservation_id)
        .fetch_optional(pool)
        .await?;
    Ok(reservation)
}

/// Marks a reservation cancelled. No existence or status check is made;
/// returns the number of rows touched (0 for an unknown id).
pub async fn cancel_reservation(
    pool: &SqlitePool,
    reservation_id: i64,
    cancel_reason: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE reservations \
         SET status = 'cancelled', cancel_reason = ?, cancelled_at = datetime('now') \
         WHERE id = ?",
    )
    .bind(cancel_reason)
    .bind(reservation_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_reservations_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ReservationDetail>> {
    let reservations = sqlx::query_as::<_, ReservationDetail>(
        "SELECT r.id, r.court_id, r.user_id, r.start_time, r.end_time, r.players_count, \
                r.price_cents, r.currency, r.status, r.cancel_reason, r.cancelled_at, \
                r.created_at, c.name AS court_name \
         FROM reservations r \
         JOIN courts c ON r.court_id = c.id \
         WHERE r.user_id = ? \
         ORDER BY r.start_time DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(reservations)
}

// --- Users ---

/// Inserts the user unless one with the same `uid` already exists. An existing
/// row is left untouched.
pub async fn register_user(pool: &SqlitePool, user: &NewUser) -> Result<RegisterOutcome> {
    let result = sqlx::query("INSERT OR IGNORE INTO users (uid, name, email, photo) VALUES (?, ?, ?, ?)")
        .bind(&user.uid)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.photo)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        Ok(RegisterOutcome::Created)
    } else {
        Ok(RegisterOutcome::AlreadyExists)
    }
}

pub async fn get_user(pool: &SqlitePool, uid: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT uid, name, email, photo, created_at FROM users WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use padel_models::ReservationStatus;

    async fn test_pool() -> SqlitePool {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    fn court(name: &str) -> NewCourt {
        NewCourt {
            name: name.to_string(),
            description: Some(format!("{name} description")),
            indoor: true,
            capacity: 4,
            price: 5000,
            currency: "EUR".to_string(),
            timezone: "Europe/Madrid".to_string(),
        }
    }

    fn user(uid: &str) -> NewUser {
        NewUser {
            uid: uid.to_string(),
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            photo: Some("https://example.com/photo.jpg".to_string()),
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        padel_models::datetime::parse(s).unwrap()
    }

    fn booking(court_id: i64, user_id: &str, start: &str, end: &str) -> NewReservation {
        NewReservation {
            court_id,
            user_id: user_id.to_string(),
            start_time: at(start),
            end_time: at(end),
            players_count: 4,
            price_cents: 5000,
            currency: "EUR".to_string(),
        }
    }

    /// Pool with two courts (ids 1, 2) and one registered user "user123".
    async fn seeded_pool() -> SqlitePool {
        let pool = test_pool().await;
        add_court(&pool, &court("Court A")).await.unwrap();
        add_court(&pool, &court("Court B")).await.unwrap();
        register_user(&pool, &user("user123")).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn lists_courts_in_id_order() {
        let pool = test_pool().await;
        assert!(list_courts(&pool).await.unwrap().is_empty());

        let a = add_court(&pool, &court("Court A")).await.unwrap();
        let mut outdoor = court("Court B");
        outdoor.indoor = false;
        outdoor.description = None;
        let b = add_court(&pool, &outdoor).await.unwrap();

        let courts = list_courts(&pool).await.unwrap();
        assert_eq!(courts, vec![a.clone(), b]);
        assert!(courts[0].indoor);
        assert!(!courts[1].indoor);
        assert_eq!(courts[1].description, None);
        assert_eq!(get_court(&pool, a.id).await.unwrap(), Some(a));
        assert_eq!(get_court(&pool, 99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn creates_confirmed_reservation() {
        let pool = seeded_pool().await;
        let id = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        let stored = get_reservation(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.court_id, 1);
        assert_eq!(stored.user_id, "user123");
        assert_eq!(stored.start_time, at("2026-01-10 10:00:00"));
        assert_eq!(stored.end_time, at("2026-01-10 11:00:00"));
        assert_eq!(stored.status, ReservationStatus::Confirmed);
        assert_eq!(stored.cancel_reason, None);
        assert_eq!(stored.cancelled_at, None);

        let second = create_reservation(&pool, &booking(1, "user123", "2026-01-10 12:00:00", "2026-01-10 13:00:00"))
            .await
            .unwrap();
        assert_ne!(id, second);
    }

    #[tokio::test]
    async fn rejects_booking_with_existing_endpoint_inside() {
        let pool = seeded_pool().await;
        create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        // existing start (10:00) falls inside 09:30..10:30
        let err = create_reservation(&pool, &booking(1, "user123", "2026-01-10 09:30:00", "2026-01-10 10:30:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));

        // existing end (11:00) falls inside 10:30..11:30
        let err = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:30:00", "2026-01-10 11:30:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));

        // identical slot
        let err = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));
    }

    #[tokio::test]
    async fn back_to_back_bookings_collide_on_shared_endpoint() {
        let pool = seeded_pool().await;
        create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        let err = create_reservation(&pool, &booking(1, "user123", "2026-01-10 11:00:00", "2026-01-10 12:00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));
    }

    #[tokio::test]
    async fn interval_inside_existing_booking_is_not_detected() {
        let pool = seeded_pool().await;
        create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 12:00:00"))
            .await
            .unwrap();

        let inner = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:30:00", "2026-01-10 11:30:00")).await;
        assert!(inner.is_ok());
    }

    #[tokio::test]
    async fn other_courts_and_cancelled_bookings_do_not_block() {
        let pool = seeded_pool().await;
        let id = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        create_reservation(&pool, &booking(2, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        cancel_reservation(&pool, id, Some("Rain")).await.unwrap();
        create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_court_is_a_database_error() {
        let pool = seeded_pool().await;
        let err = create_reservation(&pool, &booking(42, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Database(_)));
    }

    #[tokio::test]
    async fn cancel_is_unconditional() {
        let pool = seeded_pool().await;
        let id = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();

        assert_eq!(cancel_reservation(&pool, id, Some("Weather conditions")).await.unwrap(), 1);
        let stored = get_reservation(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Cancelled);
        assert_eq!(stored.cancel_reason.as_deref(), Some("Weather conditions"));
        assert!(stored.cancelled_at.is_some());

        // already cancelled: still succeeds, reason overwritten
        assert_eq!(cancel_reservation(&pool, id, None).await.unwrap(), 1);
        let stored = get_reservation(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Cancelled);
        assert_eq!(stored.cancel_reason, None);

        assert_eq!(cancel_reservation(&pool, 999, Some("Changed plans")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lists_user_reservations_latest_first() {
        let pool = seeded_pool().await;
        register_user(&pool, &user("user456")).await.unwrap();

        let early = create_reservation(&pool, &booking(1, "user123", "2026-01-10 10:00:00", "2026-01-10 11:00:00"))
            .await
            .unwrap();
        let late = create_reservation(&pool, &booking(2, "user123", "2026-01-11 14:00:00", "2026-01-11 15:00:00"))
            .await
            .unwrap();
        create_reservation(&pool, &booking(1, "user456", "2026-01-12 10:00:00", "2026-01-12 11:00:00"))
            .await
            .unwrap();

        let list = list_reservations_for_user(&pool, "user123").await.unwrap();
        let ids: Vec<i64> = list.iter().map(|d| d.reservation.id).collect();
        assert_eq!(ids, vec![late, early]);
        assert_eq!(list[0].court_name, "Court B");
        assert_eq!(list[1].court_name, "Court A");

        assert!(list_reservations_for_user(&pool, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let pool = test_pool().await;
        assert_eq!(register_user(&pool, &user("google123")).await.unwrap(), RegisterOutcome::Created);

        let mut renamed = user("google123");
        renamed.name = "Someone Else".to_string();
        assert_eq!(
            register_user(&pool, &renamed).await.unwrap(),
            RegisterOutcome::AlreadyExists
        );

        let stored = get_user(&pool, "google123").await.unwrap().unwrap();
        assert_eq!(stored.name, "John Doe");
        assert_eq!(stored.photo.as_deref(), Some("https://example.com/photo.jpg"));
    }

    #[tokio::test]
    async fn in_memory_pool_shares_one_database() {
        let pool = connect("sqlite::memory:", 5).await.unwrap();
        migrate(&pool).await.unwrap();
        add_court(&pool, &court("Court A")).await.unwrap();

        let (a, b, c) = tokio::join!(list_courts(&pool), list_courts(&pool), list_courts(&pool));
        for courts in [a, b, c] {
            assert_eq!(courts.unwrap().len(), 1);
        }
        assert!(is_in_memory("sqlite:file:padel?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite:padel.db"));
    }

    #[test]
    fn conflict_error_uses_shared_message() {
        assert_eq!(BookingError::SlotConflict.to_string(), SLOT_CONFLICT_MESSAGE);
    }

    #[tokio::test]
    async fn ping_fails_once_pool_is_closed() {
        let pool = test_pool().await;
        ping(&pool).await.unwrap();
        pool.close().await;
        assert!(ping(&pool).await.is_err());
    }
}
