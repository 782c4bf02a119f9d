//! Applies terminal payment outcomes. Shared by the callback path and the poller
//! so both log and treat duplicates the same way.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{BookingStatus, Settlement, SettleOutcome};
use crate::database::repository::ReservationStore;

/// Where a settlement came from, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementSource {
    Callback,
    Poller,
}

impl SettlementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementSource::Callback => "callback",
            SettlementSource::Poller => "poller",
        }
    }
}

/// A success report for a booking already marked failed: the customer was
/// charged for seats that were released.
pub fn is_paid_after_failure(current: BookingStatus, settlement: Settlement) -> bool {
    current == BookingStatus::Failed && settlement == Settlement::Paid
}

pub async fn apply_settlement(
    store: &dyn ReservationStore,
    booking_id: Uuid,
    settlement: Settlement,
    source: SettlementSource,
) -> Result<SettleOutcome, DatabaseError> {
    let outcome = store.settle_booking(booking_id, settlement).await?;

    match &outcome {
        SettleOutcome::Applied(booking) => info!(
            booking_id = %booking_id,
            status = %booking.status,
            seats = booking.booked_seats.len(),
            source = source.as_str(),
            "Booking settled"
        ),
        SettleOutcome::AlreadySettled(status) if is_paid_after_failure(*status, settlement) => {
            error!(
                booking_id = %booking_id,
                source = source.as_str(),
                "Payment reported successful for a failed booking; manual refund may be needed"
            )
        }
        SettleOutcome::AlreadySettled(status) => info!(
            booking_id = %booking_id,
            status = %status,
            source = source.as_str(),
            "Booking already settled, ignoring duplicate outcome"
        ),
        SettleOutcome::SeatsUnavailable(seats) => error!(
            booking_id = %booking_id,
            seats = ?seats,
            source = source.as_str(),
            "Payment succeeded after abandonment but seats were re-sold; booking stays abandoned"
        ),
        SettleOutcome::NotFound => warn!(
            booking_id = %booking_id,
            source = source.as_str(),
            "Settlement for unknown booking"
        ),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryReservationStore;
    use crate::database::models::Booking;

    #[test]
    fn only_paid_over_failed_is_flagged() {
        assert!(is_paid_after_failure(BookingStatus::Failed, Settlement::Paid));
        assert!(!is_paid_after_failure(BookingStatus::Paid, Settlement::Paid));
        assert!(!is_paid_after_failure(BookingStatus::Failed, Settlement::Failed));
        assert!(!is_paid_after_failure(BookingStatus::Abandoned, Settlement::Paid));
    }

    #[tokio::test]
    async fn success_after_failure_leaves_booking_failed() {
        let store = InMemoryReservationStore::new();
        let booking = Booking::new("user_1", Uuid::new_v4(), vec!["A1".to_string()], 100);
        store.create_booking_with_hold(&booking).await.unwrap();
        store.settle_booking(booking.id, Settlement::Failed).await.unwrap();

        let outcome = apply_settlement(
            &store,
            booking.id,
            Settlement::Paid,
            SettlementSource::Callback,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SettleOutcome::AlreadySettled(BookingStatus::Failed));
    }
}
