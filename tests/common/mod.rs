#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use uuid::Uuid;

use cinebook_backend::api::{self, AppState};
use cinebook_backend::database::memory::{InMemoryCatalog, InMemoryReservationStore};
use cinebook_backend::database::models::{Booking, BookingStatus, Room, SeatType, Show};
use cinebook_backend::database::repository::ReservationStore;
use cinebook_backend::health::HealthChecker;
use cinebook_backend::payments::error::{PaymentError, PaymentResult};
use cinebook_backend::payments::provider::PaymentGateway;
use cinebook_backend::payments::types::{
    CallbackEvent, EmbedData, PaymentRequest, PaymentResponse, PaymentState, StatusResponse,
    WebhookVerificationResult,
};
use cinebook_backend::payments::utils::{hmac_sha256_hex, verify_hmac_sha256_hex};
use cinebook_backend::services::callback_verifier::{CallbackPayload, CallbackVerifier};
use cinebook_backend::services::reservation::ReservationService;
use cinebook_backend::workers::reconciliation_poller::{ReconciliationConfig, ReconciliationPoller};

pub const CALLBACK_KEY: &str = "test-callback-key";

/// Gateway double: initiation and status answers are scripted per test.
/// Once a script is exhausted, initiation accepts and status reports pending.
#[derive(Default)]
pub struct FakeGateway {
    initiate_script: Mutex<VecDeque<PaymentResult<PaymentResponse>>>,
    status_script: Mutex<VecDeque<PaymentResult<PaymentState>>>,
    pub initiated: Mutex<Vec<PaymentRequest>>,
    pub status_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_initiate(&self, result: PaymentResult<PaymentResponse>) {
        self.initiate_script.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: PaymentResult<PaymentState>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn initiated_requests(&self) -> Vec<PaymentRequest> {
        self.initiated.lock().unwrap().clone()
    }
}

pub fn accepted(reference: &str) -> PaymentResponse {
    PaymentResponse {
        accepted: true,
        return_code: 1,
        return_message: "success".to_string(),
        payment_url: Some(format!("https://pay.test/{}", reference)),
        provider_reference: Some("token-1".to_string()),
    }
}

pub fn refused() -> PaymentResponse {
    PaymentResponse {
        accepted: false,
        return_code: -2,
        return_message: "invalid app_id".to_string(),
        payment_url: None,
        provider_reference: None,
    }
}

pub fn network_error() -> PaymentError {
    PaymentError::NetworkError {
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        let reference = request.transaction_reference.clone();
        self.initiated.lock().unwrap().push(request);
        let scripted = self.initiate_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(accepted(&reference)))
    }

    async fn get_payment_status(
        &self,
        _transaction_reference: &str,
    ) -> PaymentResult<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.status_script.lock().unwrap().pop_front();
        let state = scripted.unwrap_or(Ok(PaymentState::Pending))?;
        let return_code = match state {
            PaymentState::Success => 1,
            PaymentState::Pending => 3,
            PaymentState::Failed => 2,
        };
        Ok(StatusResponse {
            status: state,
            return_code,
            return_message: format!("{:?}", state),
            amount: None,
            provider_reference: None,
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha256_hex(payload, CALLBACK_KEY, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: (!valid).then(|| "mac mismatch".to_string()),
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<CallbackEvent> {
        let data: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: e.to_string(),
            }
        })?;
        let embed_raw = data["embed_data"].as_str().unwrap_or_default();
        let embed_data: EmbedData = serde_json::from_str(embed_raw).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: e.to_string(),
            }
        })?;
        Ok(CallbackEvent {
            transaction_reference: data["app_trans_id"].as_str().unwrap_or_default().to_string(),
            provider_reference: None,
            amount: data["amount"].as_i64(),
            embed_data,
        })
    }
}

/// Callback body the gateway would post for a paid booking.
pub fn signed_callback(booking: &Booking) -> CallbackPayload {
    let embed = EmbedData {
        preferred_payment_method: Vec::new(),
        redirecturl: None,
        booking_id: booking.id,
        show_id: booking.show_id,
        selected_seats: booking.booked_seats.clone(),
    };
    let data = serde_json::json!({
        "app_id": 2553,
        "app_trans_id": booking.app_trans_id(),
        "zp_trans_id": 240101000001_i64,
        "amount": booking.amount,
        "embed_data": serde_json::to_string(&embed).unwrap(),
    })
    .to_string();
    let mac = hmac_sha256_hex(CALLBACK_KEY, &data);
    CallbackPayload {
        data,
        mac,
        callback_type: Some(1),
    }
}

/// Room with one seat type per listed seat; returns the show id.
pub async fn seed_show(
    catalog: &InMemoryCatalog,
    show_price: i64,
    seats: &[(&str, Decimal)],
) -> Uuid {
    let mut seat_layout = HashMap::new();
    for (seat, multiplier) in seats {
        let seat_type = SeatType {
            id: Uuid::new_v4(),
            name: format!("type-{}", seat),
            price_multiplier: *multiplier,
        };
        seat_layout.insert(seat.to_string(), seat_type.id);
        catalog.insert_seat_type(seat_type).await;
    }
    let room = Room {
        id: Uuid::new_v4(),
        name: "Hall".to_string(),
        seat_layout,
    };
    let show = Show {
        id: Uuid::new_v4(),
        movie_id: None,
        room_id: room.id,
        show_date_time: Utc.with_ymd_and_hms(2030, 6, 1, 20, 0, 0).unwrap(),
        show_price,
    };
    let show_id = show.id;
    catalog.insert_room(room).await;
    catalog.insert_show(show).await;
    show_id
}

pub fn fast_reconciliation() -> ReconciliationConfig {
    ReconciliationConfig {
        enabled: true,
        poll_interval: Duration::from_secs(1),
        max_attempts: 3,
        max_network_retries: 2,
        max_backoff: Duration::from_secs(8),
        resume_batch_size: 100,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryReservationStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub gateway: Arc<FakeGateway>,
    pub poller: ReconciliationPoller,
    pub service: Arc<ReservationService>,
    pub callbacks: Arc<CallbackVerifier>,
    pub shutdown_tx: watch::Sender<bool>,
    pub show_id: Uuid,
}

impl Harness {
    pub async fn new(config: ReconciliationConfig) -> Self {
        let store = Arc::new(InMemoryReservationStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let show_id = seed_show(
            &catalog,
            100_000,
            &[
                ("A1", Decimal::ONE),
                ("A2", Decimal::ONE),
                ("A3", Decimal::ONE),
                ("B1", Decimal::new(15, 1)),
            ],
        )
        .await;
        let gateway = Arc::new(FakeGateway::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = ReconciliationPoller::new(store.clone(), gateway.clone(), config, shutdown_rx);
        let service = Arc::new(ReservationService::new(
            store.clone(),
            catalog.clone(),
            gateway.clone(),
            poller.clone(),
        ));
        let callbacks = Arc::new(CallbackVerifier::new(store.clone(), gateway.clone()));

        Self {
            store,
            catalog,
            gateway,
            poller,
            service,
            callbacks,
            shutdown_tx,
            show_id,
        }
    }

    pub fn router(&self) -> axum::Router {
        api::router(AppState {
            reservations: self.service.clone(),
            callbacks: self.callbacks.clone(),
            health: HealthChecker::new(self.store.clone(), true),
        })
    }

    pub async fn booking(&self, booking_id: Uuid) -> Booking {
        self.store.find_booking(booking_id).await.unwrap().unwrap()
    }

    /// Sleep on the (paused) clock until the booking leaves `pending`.
    pub async fn wait_for_settlement(&self, booking_id: Uuid) -> BookingStatus {
        for _ in 0..600 {
            let status = self.booking(booking_id).await.status;
            if status != BookingStatus::Pending {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        BookingStatus::Pending
    }
}
