//! In-process store used when `SKIP_EXTERNALS=true` and by the test suite.
//!
//! Each show's seat map sits behind its own async mutex, which serializes
//! holds and settlements per show. The bookings mutex is only ever taken
//! while already holding a show lock (or on its own), never the other way
//! round.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{
    conflicting_seats, Booking, BookingStatus, HoldOutcome, Room, SeatEntry, SeatMap, SeatStatus,
    SeatType, Settlement, SettleOutcome, Show,
};
use crate::database::repository::{CatalogRepository, ReservationStore};

#[derive(Default)]
pub struct InMemoryReservationStore {
    shows: RwLock<HashMap<Uuid, Arc<Mutex<SeatMap>>>>,
    bookings: Mutex<HashMap<Uuid, Booking>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn show_lock(&self, show_id: Uuid) -> Arc<Mutex<SeatMap>> {
        if let Some(lock) = self.shows.read().await.get(&show_id) {
            return lock.clone();
        }
        self.shows
            .write()
            .await
            .entry(show_id)
            .or_default()
            .clone()
    }

    async fn booking_snapshot(&self, booking_id: Uuid) -> Option<Booking> {
        self.bookings.lock().await.get(&booking_id).cloned()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn seat_map(&self, show_id: Uuid) -> Result<SeatMap, DatabaseError> {
        let lock = self.show_lock(show_id).await;
        let seats = lock.lock().await;
        Ok(seats.clone())
    }

    async fn create_booking_with_hold(
        &self,
        booking: &Booking,
    ) -> Result<HoldOutcome, DatabaseError> {
        let lock = self.show_lock(booking.show_id).await;
        let mut seats = lock.lock().await;

        let taken = conflicting_seats(&seats, &booking.booked_seats);
        if !taken.is_empty() {
            return Ok(HoldOutcome::Conflict { seats: taken });
        }

        let mut bookings = self.bookings.lock().await;
        if bookings.contains_key(&booking.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "bookings_pkey".to_string(),
            }));
        }
        for seat in &booking.booked_seats {
            seats.insert(
                seat.clone(),
                SeatEntry {
                    status: SeatStatus::Pending,
                    booking_id: booking.id,
                },
            );
        }
        bookings.insert(booking.id, booking.clone());
        Ok(HoldOutcome::Held)
    }

    async fn set_payment_link(&self, booking_id: Uuid, link: &str) -> Result<(), DatabaseError> {
        let mut bookings = self.bookings.lock().await;
        let booking = bookings
            .get_mut(&booking_id)
            .ok_or_else(|| DatabaseError::not_found("booking", booking_id))?;
        booking.payment_link = Some(link.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn rollback_booking(&self, booking_id: Uuid) -> Result<(), DatabaseError> {
        let Some(snapshot) = self.booking_snapshot(booking_id).await else {
            return Ok(());
        };

        let lock = self.show_lock(snapshot.show_id).await;
        let mut seats = lock.lock().await;
        let mut bookings = self.bookings.lock().await;

        for seat in &snapshot.booked_seats {
            if let Some(entry) = seats.get_mut(seat) {
                if entry.booking_id == booking_id && entry.status == SeatStatus::Pending {
                    entry.status = SeatStatus::Released;
                }
            }
        }
        bookings.remove(&booking_id);
        Ok(())
    }

    async fn settle_booking(
        &self,
        booking_id: Uuid,
        settlement: Settlement,
    ) -> Result<SettleOutcome, DatabaseError> {
        let Some(snapshot) = self.booking_snapshot(booking_id).await else {
            return Ok(SettleOutcome::NotFound);
        };

        let lock = self.show_lock(snapshot.show_id).await;
        let mut seats = lock.lock().await;
        let mut bookings = self.bookings.lock().await;

        let Some(booking) = bookings.get_mut(&booking_id) else {
            return Ok(SettleOutcome::NotFound);
        };
        if !booking.status.accepts(settlement) {
            return Ok(SettleOutcome::AlreadySettled(booking.status));
        }

        match (booking.status, settlement) {
            (BookingStatus::Abandoned, Settlement::Paid) => {
                // Late success: re-claim every seat or none.
                let taken = conflicting_seats(&seats, &booking.booked_seats);
                if !taken.is_empty() {
                    return Ok(SettleOutcome::SeatsUnavailable(taken));
                }
                for seat in &booking.booked_seats {
                    seats.insert(
                        seat.clone(),
                        SeatEntry {
                            status: SeatStatus::Confirmed,
                            booking_id,
                        },
                    );
                }
            }
            _ => {
                let target = settlement.seat_status();
                for seat in &booking.booked_seats {
                    if let Some(entry) = seats.get_mut(seat) {
                        if entry.booking_id == booking_id && entry.status == SeatStatus::Pending {
                            entry.status = target;
                        }
                    }
                }
            }
        }

        booking.status = settlement.booking_status();
        booking.updated_at = Utc::now();
        Ok(SettleOutcome::Applied(booking.clone()))
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, DatabaseError> {
        Ok(self.booking_snapshot(booking_id).await)
    }

    async fn list_user_bookings(&self, user_id: &str) -> Result<Vec<Booking>, DatabaseError> {
        let bookings = self.bookings.lock().await;
        let mut result: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_resumable_pending(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Booking>, DatabaseError> {
        let bookings = self.bookings.lock().await;
        let mut result: Vec<Booking> = bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending)
            .filter(|b| b.payment_link.is_some() || b.created_at < stale_before)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Catalog held in memory. Populated by tests and by the demo seed.
#[derive(Default)]
pub struct InMemoryCatalog {
    shows: RwLock<HashMap<Uuid, Show>>,
    rooms: RwLock<HashMap<Uuid, Room>>,
    seat_types: RwLock<HashMap<Uuid, SeatType>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_show(&self, show: Show) {
        self.shows.write().await.insert(show.id, show);
    }

    pub async fn insert_room(&self, room: Room) {
        self.rooms.write().await.insert(room.id, room);
    }

    pub async fn insert_seat_type(&self, seat_type: SeatType) {
        self.seat_types.write().await.insert(seat_type.id, seat_type);
    }

    /// One room with a standard and a VIP row and a single evening show.
    /// Returns the show id.
    pub async fn seed_demo(&self) -> Uuid {
        let standard = SeatType {
            id: Uuid::new_v4(),
            name: "Standard".to_string(),
            price_multiplier: Decimal::ONE,
        };
        let vip = SeatType {
            id: Uuid::new_v4(),
            name: "VIP".to_string(),
            price_multiplier: Decimal::new(15, 1),
        };

        let mut seat_layout = HashMap::new();
        for n in 1..=10 {
            seat_layout.insert(format!("A{}", n), standard.id);
            seat_layout.insert(format!("B{}", n), vip.id);
        }
        let room = Room {
            id: Uuid::new_v4(),
            name: "Room 1".to_string(),
            seat_layout,
        };
        let show = Show {
            id: Uuid::new_v4(),
            movie_id: None,
            room_id: room.id,
            show_date_time: Utc
                .with_ymd_and_hms(2030, 1, 1, 19, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            show_price: 100_000,
        };
        let show_id = show.id;

        self.insert_seat_type(standard).await;
        self.insert_seat_type(vip).await;
        self.insert_room(room).await;
        self.insert_show(show).await;
        show_id
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_show(&self, show_id: Uuid) -> Result<Option<Show>, DatabaseError> {
        Ok(self.shows.read().await.get(&show_id).cloned())
    }

    async fn get_room(&self, room_id: Uuid) -> Result<Option<Room>, DatabaseError> {
        Ok(self.rooms.read().await.get(&room_id).cloned())
    }

    async fn get_seat_types(&self, ids: &[Uuid]) -> Result<Vec<SeatType>, DatabaseError> {
        let types = self.seat_types.read().await;
        Ok(ids.iter().filter_map(|id| types.get(id).cloned()).collect())
    }
}
