use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

/// A bookable court. Reference data: rows are seeded once and never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Court {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub indoor: bool,
    pub capacity: i32,
    /// Price in minor units of `currency`.
    pub price: i64,
    pub currency: String,
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct NewCourt {
    pub name: String,
    pub description: Option<String>,
    pub indoor: bool,
    pub capacity: i32,
    pub price: i64,
    pub currency: String,
    pub timezone: String,
}

/// Lifecycle of a reservation. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Confirmed => write!(f, "confirmed"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: i64,
    pub court_id: i64,
    pub user_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub players_count: i32,
    pub price_cents: i64,
    pub currency: String,
    pub status: ReservationStatus,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// A reservation joined with the name of its court, as shown in a user's booking list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReservationDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reservation: Reservation,
    pub court_name: String,
}

/// Booking request as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
    pub court_id: i64,
    pub user_id: String,
    #[serde(deserialize_with = "datetime::deserialize")]
    pub start_time: NaiveDateTime,
    #[serde(deserialize_with = "datetime::deserialize")]
    pub end_time: NaiveDateTime,
    pub players_count: i32,
    pub price_cents: i64,
    pub currency: String,
}

/// A user as reported by the identity provider. `uid` is the provider's subject id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

/// Lenient timestamp parsing for booking requests.
///
/// Accepts `2026-01-10 10:00:00`, `2026-01-10T10:00:00` and the browser's
/// `datetime-local` value `2026-01-10T10:00`.
pub mod datetime {
    use chrono::NaiveDateTime;
    use serde::de::Error;

    use super::{Deserialize, Deserializer};

    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| s.parse::<NaiveDateTime>().ok())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
