//! Business logic: pricing, the reservation flow, settlement and callbacks

pub mod callback_verifier;
pub mod pricing;
pub mod reservation;
pub mod settlement;

pub use callback_verifier::{CallbackAck, CallbackError, CallbackPayload, CallbackVerifier};
pub use pricing::{PriceQuote, PricingError, PricingResolver};
pub use reservation::{
    ReservationError, ReservationReceipt, ReservationRequest, ReservationResult,
    ReservationService,
};
