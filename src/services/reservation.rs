//! Reservation Orchestrator
//!
//! Drives the reserve-then-pay flow: validate and price the selection, hold
//! the seats together with the booking record, open a payment with the
//! gateway, and either hand the booking over to reconciliation or undo the
//! hold when the gateway refuses.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{
    conflicting_seats, occupied_seats, Booking, HoldOutcome, SeatMap,
};
use crate::database::repository::{CatalogRepository, ReservationStore};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{EmbedData, PaymentRequest};
use crate::services::pricing::{PricingError, PricingResolver};
use crate::workers::reconciliation_poller::{PollJob, ReconciliationPoller};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("seats unavailable: {}", seats.join(", "))]
    SeatUnavailable { seats: Vec<String> },

    #[error("payment initiation failed: {reason}")]
    PaymentInitiationFailed { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

impl From<PricingError> for ReservationError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::RoomNotFound(id) => ReservationError::NotFound {
                entity: "room",
                id: id.to_string(),
            },
            PricingError::Overflow { seat } => ReservationError::InvalidRequest {
                message: format!("price for seat {} is out of range", seat),
            },
            PricingError::Storage(e) => ReservationError::Storage(e),
        }
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub show_id: Uuid,
    pub user_id: String,
    pub selected_seats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationReceipt {
    pub booking_id: Uuid,
    pub payment_link: String,
    pub amount: i64,
}

/// Trim, drop duplicates keeping first occurrence, reject empty ids and
/// empty selections.
pub fn normalize_seats(seats: &[String]) -> ReservationResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(seats.len());
    for seat in seats {
        let seat = seat.trim();
        if seat.is_empty() {
            return Err(ReservationError::InvalidRequest {
                message: "seat ids must not be empty".to_string(),
            });
        }
        if seen.insert(seat.to_string()) {
            normalized.push(seat.to_string());
        }
    }
    if normalized.is_empty() {
        return Err(ReservationError::InvalidRequest {
            message: "at least one seat must be selected".to_string(),
        });
    }
    Ok(normalized)
}

// ============================================================================
// Service
// ============================================================================

pub struct ReservationService {
    store: Arc<dyn ReservationStore>,
    catalog: Arc<dyn CatalogRepository>,
    pricing: PricingResolver,
    gateway: Arc<dyn PaymentGateway>,
    poller: ReconciliationPoller,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        catalog: Arc<dyn CatalogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        poller: ReconciliationPoller,
    ) -> Self {
        Self {
            store,
            pricing: PricingResolver::new(catalog.clone()),
            catalog,
            gateway,
            poller,
        }
    }

    /// Hold the selected seats and open a payment for them.
    ///
    /// On success the seats stay PENDING under the new booking and a poll job
    /// watches the payment. If the gateway refuses or cannot be reached, the
    /// booking is deleted and its seats released before the error is returned.
    pub async fn reserve(&self, request: ReservationRequest) -> ReservationResult<ReservationReceipt> {
        let seats = normalize_seats(&request.selected_seats)?;
        if request.user_id.trim().is_empty() {
            return Err(ReservationError::InvalidRequest {
                message: "user id is required".to_string(),
            });
        }

        let show = self
            .catalog
            .get_show(request.show_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound {
                entity: "show",
                id: request.show_id.to_string(),
            })?;

        // Cheap pre-check; the hold below is the authoritative one.
        let seat_map = self.store.seat_map(show.id).await?;
        let taken = conflicting_seats(&seat_map, &seats);
        if !taken.is_empty() {
            info!(show_id = %show.id, seats = ?taken, "requested seats already taken");
            return Err(ReservationError::SeatUnavailable { seats: taken });
        }

        let quote = self.pricing.quote(&show, &seats).await?;
        let booking = Booking::new(request.user_id.clone(), show.id, seats.clone(), quote.total);

        if let HoldOutcome::Conflict { seats: taken } =
            self.store.create_booking_with_hold(&booking).await?
        {
            info!(show_id = %show.id, seats = ?taken, "lost seat hold race");
            return Err(ReservationError::SeatUnavailable { seats: taken });
        }

        info!(
            booking_id = %booking.id,
            show_id = %show.id,
            user_id = %booking.user_id,
            seats = booking.booked_seats.len(),
            amount = booking.amount,
            "seats held, opening payment"
        );

        let app_trans_id = booking.app_trans_id();
        let payment = PaymentRequest {
            transaction_reference: app_trans_id.clone(),
            app_user: booking.user_id.clone(),
            amount: booking.amount,
            description: format!("Payment for the ticket #{}", booking.id),
            items: quote.items,
            embed_data: EmbedData {
                preferred_payment_method: Vec::new(),
                redirecturl: None,
                booking_id: booking.id,
                show_id: show.id,
                selected_seats: seats,
            },
        };

        let reason = match self.gateway.initiate_payment(payment).await {
            Ok(response) if response.accepted => match response.payment_url {
                Some(link) => return Ok(self.activate(&booking, app_trans_id, link).await),
                None => "gateway returned no payment link".to_string(),
            },
            Ok(response) => format!(
                "gateway refused order (return_code={}): {}",
                response.return_code, response.return_message
            ),
            Err(e) => e.to_string(),
        };

        warn!(booking_id = %booking.id, reason = %reason, "payment initiation failed, releasing seats");
        self.compensate(&booking, app_trans_id).await;
        Err(ReservationError::PaymentInitiationFailed { reason })
    }

    async fn activate(&self, booking: &Booking, app_trans_id: String, link: String) -> ReservationReceipt {
        if let Err(e) = self.store.set_payment_link(booking.id, &link).await {
            // The hold is intact and the link is returned; only the stored copy is missing.
            error!(booking_id = %booking.id, error = %e, "failed to store payment link");
        }

        self.poller.schedule(PollJob {
            booking_id: booking.id,
            transaction_reference: app_trans_id,
        });

        info!(booking_id = %booking.id, "payment opened, reconciliation scheduled");
        ReservationReceipt {
            booking_id: booking.id,
            payment_link: link,
            amount: booking.amount,
        }
    }

    async fn compensate(&self, booking: &Booking, app_trans_id: String) {
        if let Err(e) = self.store.rollback_booking(booking.id).await {
            // Fall back to polling: an unknown order settles as failed and
            // releases the seats through the normal path.
            error!(
                booking_id = %booking.id,
                error = %e,
                "failed to release held seats, handing booking to reconciliation"
            );
            self.poller.schedule(PollJob {
                booking_id: booking.id,
                transaction_reference: app_trans_id,
            });
        }
    }

    /// Seats of a show that are pending or confirmed.
    pub async fn occupied_seats(&self, show_id: Uuid) -> ReservationResult<Vec<String>> {
        Ok(occupied_seats(&self.seat_map(show_id).await?))
    }

    pub async fn seat_map(&self, show_id: Uuid) -> ReservationResult<SeatMap> {
        if self.catalog.get_show(show_id).await?.is_none() {
            return Err(ReservationError::NotFound {
                entity: "show",
                id: show_id.to_string(),
            });
        }
        Ok(self.store.seat_map(show_id).await?)
    }

    /// A booking visible only to the user who made it.
    pub async fn get_booking(&self, booking_id: Uuid, user_id: &str) -> ReservationResult<Booking> {
        match self.store.find_booking(booking_id).await? {
            Some(booking) if booking.user_id == user_id => Ok(booking),
            _ => Err(ReservationError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            }),
        }
    }

    pub async fn list_user_bookings(&self, user_id: &str) -> ReservationResult<Vec<Booking>> {
        Ok(self.store.list_user_bookings(user_id).await?)
    }
}
