//! Entities shared by the reservation store, the catalog lookups and the services.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Occupancy of one seat for one show. A seat with no entry is free.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Confirmed,
    Released,
    Pending,
}

impl SeatStatus {
    /// Persisted status code.
    pub fn code(self) -> i16 {
        match self {
            SeatStatus::Confirmed => 1,
            SeatStatus::Released => 2,
            SeatStatus::Pending => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(SeatStatus::Confirmed),
            2 => Some(SeatStatus::Released),
            3 => Some(SeatStatus::Pending),
            _ => None,
        }
    }

    /// Pending and confirmed seats cannot be held again.
    pub fn is_occupied(self) -> bool {
        matches!(self, SeatStatus::Pending | SeatStatus::Confirmed)
    }
}

/// One seat-map entry: the status and the booking that last held the seat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatEntry {
    pub status: SeatStatus,
    pub booking_id: Uuid,
}

pub type SeatMap = HashMap<String, SeatEntry>;

/// Sorted ids of the seats that are pending or confirmed.
pub fn occupied_seats(map: &SeatMap) -> Vec<String> {
    let mut seats: Vec<String> = map
        .iter()
        .filter(|(_, entry)| entry.status.is_occupied())
        .map(|(seat, _)| seat.clone())
        .collect();
    seats.sort();
    seats
}

/// Requested seats that are currently pending or confirmed, in request order.
pub fn conflicting_seats(map: &SeatMap, requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|seat| {
            map.get(seat.as_str())
                .map(|entry| entry.status.is_occupied())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, seats held, no payment outcome yet
    Pending,
    Paid,
    Failed,
    /// Reconciliation gave up without a terminal answer from the gateway
    Abandoned,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Failed => "failed",
            BookingStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "paid" => Some(BookingStatus::Paid),
            "failed" => Some(BookingStatus::Failed),
            "abandoned" => Some(BookingStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    /// Whether a settlement may still be applied from this status.
    ///
    /// An abandoned booking accepts a late success so a payment that did go
    /// through can re-claim its seats.
    pub fn accepts(&self, settlement: Settlement) -> bool {
        match self {
            BookingStatus::Pending => true,
            BookingStatus::Abandoned => settlement == Settlement::Paid,
            BookingStatus::Paid | BookingStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal payment outcome applied to a booking and its held seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Paid,
    Failed,
    Abandoned,
}

impl Settlement {
    pub fn booking_status(self) -> BookingStatus {
        match self {
            Settlement::Paid => BookingStatus::Paid,
            Settlement::Failed => BookingStatus::Failed,
            Settlement::Abandoned => BookingStatus::Abandoned,
        }
    }

    pub fn seat_status(self) -> SeatStatus {
        match self {
            Settlement::Paid => SeatStatus::Confirmed,
            Settlement::Failed | Settlement::Abandoned => SeatStatus::Released,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    Held,
    Conflict { seats: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// The transition was applied; carries the updated booking.
    Applied(Booking),
    /// The booking had already reached a terminal status; nothing changed.
    AlreadySettled(BookingStatus),
    /// Seats could not be re-claimed for a late success; nothing changed.
    SeatsUnavailable(Vec<String>),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub show_id: Uuid,
    pub booked_seats: Vec<String>,
    /// Total charge in the smallest currency unit
    pub amount: i64,
    pub status: BookingStatus,
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(user_id: impl Into<String>, show_id: Uuid, seats: Vec<String>, amount: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            show_id,
            booked_seats: seats,
            amount,
            status: BookingStatus::Pending,
            payment_link: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Gateway transaction reference: `yyMMdd_<booking id hex>`.
    pub fn app_trans_id(&self) -> String {
        format!(
            "{}_{}",
            self.created_at.format("%y%m%d"),
            self.id.simple()
        )
    }
}

/// A scheduled screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: Uuid,
    pub movie_id: Option<Uuid>,
    pub room_id: Uuid,
    pub show_date_time: DateTime<Utc>,
    /// Base seat price in the smallest currency unit
    pub show_price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    /// Seat id to seat-type id
    pub seat_layout: HashMap<String, Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatType {
    pub id: Uuid,
    pub name: String,
    pub price_multiplier: Decimal,
}
