pub mod auth;
pub mod bookings;
pub mod health;
pub mod payments;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::callback_verifier::CallbackVerifier;
use crate::services::reservation::ReservationService;

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub callbacks: Arc<CallbackVerifier>,
    pub health: HealthChecker,
}

/// All routes with request-id and request-logging layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .route("/api/bookings/create", post(bookings::create_booking))
        .route("/api/bookings/seats/{show_id}", get(bookings::occupied_seats))
        .route("/api/bookings/{booking_id}", get(bookings::get_booking))
        .route("/api/users/bookings", get(bookings::list_user_bookings))
        .route("/api/payment/update-booking", post(payments::payment_callback))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "Cinebook reservation API"
}
