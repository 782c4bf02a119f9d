//! Storage seams used by the services.
//!
//! `ReservationStore` owns seat occupancy and booking records. Every method that
//! changes seats does so atomically with the matching booking change, so no
//! caller ever observes a booking whose seats disagree with its status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{
    Booking, HoldOutcome, Room, SeatMap, SeatType, Settlement, SettleOutcome, Show,
};

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Current seat map of a show. Shows never touched return an empty map.
    async fn seat_map(&self, show_id: Uuid) -> Result<SeatMap, DatabaseError>;

    /// Persist `booking` and mark each of its seats PENDING under its id.
    ///
    /// Either every seat is free (absent or RELEASED) and all are held together
    /// with the booking insert, or nothing is written and the occupied seats are
    /// returned. Seats must already be de-duplicated.
    async fn create_booking_with_hold(
        &self,
        booking: &Booking,
    ) -> Result<HoldOutcome, DatabaseError>;

    async fn set_payment_link(&self, booking_id: Uuid, link: &str) -> Result<(), DatabaseError>;

    /// Compensate a hold whose payment never started: delete the booking and
    /// move its still-pending seats to RELEASED.
    async fn rollback_booking(&self, booking_id: Uuid) -> Result<(), DatabaseError>;

    /// Apply a terminal outcome to a booking and the seats it holds.
    ///
    /// Only a booking that still accepts the settlement changes; otherwise the
    /// current status is reported and nothing is written.
    async fn settle_booking(
        &self,
        booking_id: Uuid,
        settlement: Settlement,
    ) -> Result<SettleOutcome, DatabaseError>;

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, DatabaseError>;

    /// Bookings of one user, newest first.
    async fn list_user_bookings(&self, user_id: &str) -> Result<Vec<Booking>, DatabaseError>;

    /// Pending bookings worth polling after a restart, oldest first: those that
    /// carry a payment link, plus link-less ones created before `stale_before`.
    async fn list_resumable_pending(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Booking>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// Read-only show, room and seat-type lookups.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_show(&self, show_id: Uuid) -> Result<Option<Show>, DatabaseError>;

    async fn get_room(&self, room_id: Uuid) -> Result<Option<Room>, DatabaseError>;

    /// Seat types with the given ids. Unknown ids are skipped.
    async fn get_seat_types(&self, ids: &[Uuid]) -> Result<Vec<SeatType>, DatabaseError>;
}
