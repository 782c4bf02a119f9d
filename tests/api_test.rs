//! HTTP tests driving the full router
//!
//! Tests cover:
//! - Identity header enforcement
//! - Booking creation and seat conflicts
//! - Seat and booking queries
//! - Gateway callback acknowledgements
//! - Health probes

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use cinebook_backend::database::models::BookingStatus;
use cinebook_backend::services::reservation::ReservationRequest;
use cinebook_backend::workers::reconciliation_poller::ReconciliationConfig;

use common::*;

async fn harness() -> Harness {
    Harness::new(ReconciliationConfig {
        enabled: false,
        ..fast_reconciliation()
    })
    .await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn create_request(user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/bookings/create")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_create_booking_requires_identity() {
    let h = harness().await;
    let (status, body) = send(
        h.router(),
        create_request(None, json!({"showId": h.show_id, "selectedSeats": ["A1"]})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHENTICATED");
    assert!(h.service.occupied_seats(h.show_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_booking_returns_payment_link() {
    let h = harness().await;
    let response = h
        .router()
        .oneshot(create_request(
            Some("alice"),
            json!({"showId": h.show_id, "selectedSeats": ["A1", "B1"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["amount"], 250_000);
    assert!(body["data"]["paymentLink"]
        .as_str()
        .unwrap()
        .starts_with("https://pay.test/"));
}

#[tokio::test]
async fn test_taken_seat_is_a_conflict() {
    let h = harness().await;
    h.service
        .reserve(ReservationRequest {
            show_id: h.show_id,
            user_id: "alice".to_string(),
            selected_seats: vec!["A1".to_string()],
        })
        .await
        .unwrap();

    let (status, body) = send(
        h.router(),
        create_request(
            Some("bob"),
            json!({"showId": h.show_id, "selectedSeats": ["A1", "A2"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "SEAT_UNAVAILABLE");
    assert_eq!(body["details"]["seats"], json!(["A1"]));
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let h = harness().await;
    let (status, body) = send(
        h.router(),
        create_request(Some("alice"), json!({"showId": "nope"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_refused_order_maps_to_bad_gateway() {
    let h = harness().await;
    h.gateway.push_initiate(Ok(refused()));

    let (status, body) = send(
        h.router(),
        create_request(
            Some("alice"),
            json!({"showId": h.show_id, "selectedSeats": ["A1"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "PAYMENT_INITIATION_FAILED");
    assert!(h.service.occupied_seats(h.show_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_occupied_seats_endpoint() {
    let h = harness().await;
    h.service
        .reserve(ReservationRequest {
            show_id: h.show_id,
            user_id: "alice".to_string(),
            selected_seats: vec!["A2".to_string(), "A1".to_string()],
        })
        .await
        .unwrap();

    let (status, body) = send(
        h.router(),
        Request::builder()
            .uri(format!("/api/bookings/seats/{}", h.show_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["occupiedSeats"], json!(["A1", "A2"]));

    let (status, body) = send(
        h.router(),
        Request::builder()
            .uri(format!("/api/bookings/seats/{}", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SHOW_NOT_FOUND");
}

#[tokio::test]
async fn test_bookings_are_visible_to_owner_only() {
    let h = harness().await;
    let receipt = h
        .service
        .reserve(ReservationRequest {
            show_id: h.show_id,
            user_id: "alice".to_string(),
            selected_seats: vec!["A1".to_string()],
        })
        .await
        .unwrap();

    let get = |user: &str| {
        Request::builder()
            .uri(format!("/api/bookings/{}", receipt.booking_id))
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(h.router(), get("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["bookedSeats"], json!(["A1"]));

    let (status, _) = send(h.router(), get("mallory")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        h.router(),
        Request::builder()
            .uri("/api/users/bookings")
            .header("x-user-id", "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

fn callback_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/payment/update-booking")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_callback_acknowledges_gateway() {
    let h = harness().await;
    let receipt = h
        .service
        .reserve(ReservationRequest {
            show_id: h.show_id,
            user_id: "alice".to_string(),
            selected_seats: vec!["A1".to_string()],
        })
        .await
        .unwrap();
    let callback = signed_callback(&h.booking(receipt.booking_id).await);

    let (status, body) = send(
        h.router(),
        callback_request(serde_json::to_string(&callback).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["return_code"], 1);
    assert_eq!(h.booking(receipt.booking_id).await.status, BookingStatus::Paid);
}

#[tokio::test]
async fn test_callback_with_bad_mac_or_body_is_rejected() {
    let h = harness().await;
    let receipt = h
        .service
        .reserve(ReservationRequest {
            show_id: h.show_id,
            user_id: "alice".to_string(),
            selected_seats: vec!["A1".to_string()],
        })
        .await
        .unwrap();
    let mut callback = signed_callback(&h.booking(receipt.booking_id).await);
    callback.mac = callback.mac.chars().rev().collect();

    let (status, body) = send(
        h.router(),
        callback_request(serde_json::to_string(&callback).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["return_code"], -1);

    let (_, body) = send(h.router(), callback_request("not json".to_string())).await;
    assert_eq!(body["return_code"], -1);

    assert_eq!(h.booking(receipt.booking_id).await.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_health_probes() {
    let h = harness().await;

    let (status, body) = send(
        h.router(),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["storage"]["status"], "Up");

    let response = h
        .router()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
