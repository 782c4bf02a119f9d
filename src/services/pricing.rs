//! Per-seat pricing from the show's base price and the room's seat types.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{Room, SeatType, Show};
use crate::database::repository::CatalogRepository;
use crate::payments::types::PaymentItem;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("room not found: {0}")]
    RoomNotFound(Uuid),

    #[error("price overflow for seat {seat}")]
    Overflow { seat: String },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub items: Vec<PaymentItem>,
    pub total: i64,
}

/// `base * multiplier`, rounded to the nearest unit with halves away from zero.
pub fn seat_price(base: i64, multiplier: Decimal) -> Option<i64> {
    Decimal::from(base)
        .checked_mul(multiplier)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Price each seat in order. Seats without a known seat type cost the base price.
pub fn quote_seats(
    show: &Show,
    room: &Room,
    seat_types: &[SeatType],
    seats: &[String],
) -> Result<PriceQuote, PricingError> {
    let multipliers: HashMap<Uuid, Decimal> = seat_types
        .iter()
        .map(|t| (t.id, t.price_multiplier))
        .collect();

    let mut items = Vec::with_capacity(seats.len());
    let mut total: i64 = 0;
    for seat in seats {
        let multiplier = room
            .seat_layout
            .get(seat)
            .and_then(|type_id| multipliers.get(type_id))
            .copied()
            .unwrap_or(Decimal::ONE);

        let overflow = || PricingError::Overflow { seat: seat.clone() };
        let price = seat_price(show.show_price, multiplier).ok_or_else(overflow)?;
        total = total.checked_add(price).ok_or_else(overflow)?;
        items.push(PaymentItem {
            seat: seat.clone(),
            price,
        });
    }

    Ok(PriceQuote { items, total })
}

pub struct PricingResolver {
    catalog: Arc<dyn CatalogRepository>,
}

impl PricingResolver {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    pub async fn quote(&self, show: &Show, seats: &[String]) -> Result<PriceQuote, PricingError> {
        let room = self
            .catalog
            .get_room(show.room_id)
            .await?
            .ok_or(PricingError::RoomNotFound(show.room_id))?;

        let mut type_ids: Vec<Uuid> = seats
            .iter()
            .filter_map(|seat| room.seat_layout.get(seat).copied())
            .collect();
        type_ids.sort();
        type_ids.dedup();
        let seat_types = self.catalog.get_seat_types(&type_ids).await?;

        quote_seats(show, &room, &seat_types, seats)
    }
}
