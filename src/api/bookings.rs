use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::auth::AuthenticatedUser;
use crate::api::AppState;
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::middleware::error::{get_request_id_from_headers, success_response};
use crate::services::reservation::ReservationRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub show_id: Uuid,
    pub selected_seats: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    pub booking_id: Uuid,
    pub payment_link: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupiedSeatsResponse {
    pub show_id: Uuid,
    pub occupied_seats: Vec<String>,
}

fn with_request_id(err: impl Into<AppError>, headers: &HeaderMap) -> AppError {
    let err = err.into();
    match get_request_id_from_headers(headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be a UUID".to_string(),
        }))
    })
}

/// POST /api/bookings/create
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body.map_err(|e| {
        with_request_id(
            AppError::new(AppErrorKind::Validation(ValidationError::InvalidRequest {
                message: e.body_text(),
            })),
            &headers,
        )
    })?;

    info!(
        user_id = %user.user_id,
        show_id = %body.show_id,
        seats = ?body.selected_seats,
        "booking requested"
    );

    let receipt = state
        .reservations
        .reserve(ReservationRequest {
            show_id: body.show_id,
            user_id: user.user_id,
            selected_seats: body.selected_seats,
        })
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    let response = CreateBookingResponse {
        booking_id: receipt.booking_id,
        payment_link: receipt.payment_link,
        amount: receipt.amount,
    };
    Ok((StatusCode::CREATED, success_response(response)).into_response())
}

/// GET /api/bookings/seats/{show_id}
pub async fn occupied_seats(
    State(state): State<AppState>,
    Path(show_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let show_id = parse_uuid("showId", &show_id).map_err(|e| with_request_id(e, &headers))?;
    let occupied_seats = state
        .reservations
        .occupied_seats(show_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    Ok(success_response(OccupiedSeatsResponse {
        show_id,
        occupied_seats,
    }))
}

/// GET /api/bookings/{booking_id}
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let booking_id =
        parse_uuid("bookingId", &booking_id).map_err(|e| with_request_id(e, &headers))?;
    let booking = state
        .reservations
        .get_booking(booking_id, &user.user_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    Ok(success_response(booking))
}

/// GET /api/users/bookings
pub async fn list_user_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let bookings = state
        .reservations
        .list_user_bookings(&user.user_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    Ok(success_response(bookings))
}
