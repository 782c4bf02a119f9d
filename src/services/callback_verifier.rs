//! Handles the gateway's asynchronous payment-success notification.
//!
//! The callback is only trusted after its MAC checks out against the callback
//! key. A verified callback settles the booking as paid, which is a no-op if
//! the poller already got there.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::models::{Settlement, SettleOutcome};
use crate::database::repository::ReservationStore;
use crate::payments::provider::PaymentGateway;
use crate::services::settlement::{apply_settlement, SettlementSource};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Body posted by the gateway: the raw `data` string and its MAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub data: String,
    pub mac: String,
    #[serde(default, rename = "type")]
    pub callback_type: Option<i64>,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub return_code: i32,
    pub return_message: String,
}

impl CallbackAck {
    pub fn success() -> Self {
        Self {
            return_code: 1,
            return_message: "success".to_string(),
        }
    }

    pub fn invalid() -> Self {
        Self {
            return_code: -1,
            return_message: "invalid callback".to_string(),
        }
    }

    /// Processing failed after verification; the gateway should retry.
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            return_code: 0,
            return_message: message.into(),
        }
    }
}

pub struct CallbackVerifier {
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CallbackVerifier {
    pub fn new(store: Arc<dyn ReservationStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Verify and apply a callback, always producing an acknowledgement.
    pub async fn handle_callback(&self, payload: &CallbackPayload) -> CallbackAck {
        match self.process_callback(payload).await {
            Ok(SettleOutcome::NotFound) => CallbackAck {
                return_code: 1,
                return_message: "booking not found".to_string(),
            },
            Ok(_) => CallbackAck::success(),
            Err(CallbackError::InvalidSignature) => CallbackAck::invalid(),
            Err(e) => {
                error!(error = %e, "callback processing failed");
                CallbackAck::retry(e.to_string())
            }
        }
    }

    pub async fn process_callback(
        &self,
        payload: &CallbackPayload,
    ) -> Result<SettleOutcome, CallbackError> {
        let verification = self
            .gateway
            .verify_webhook(payload.data.as_bytes(), &payload.mac)
            .map_err(|_| CallbackError::InvalidSignature)?;

        if !verification.valid {
            warn!(
                gateway = self.gateway.name(),
                reason = verification.reason.as_deref().unwrap_or("unknown"),
                "rejected callback with invalid signature"
            );
            return Err(CallbackError::InvalidSignature);
        }

        let event = self
            .gateway
            .parse_webhook_event(payload.data.as_bytes())
            .map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;
        let booking_id = event.embed_data.booking_id;

        info!(
            booking_id = %booking_id,
            show_id = %event.embed_data.show_id,
            app_trans_id = %event.transaction_reference,
            amount = ?event.amount,
            "verified payment callback"
        );

        let outcome = apply_settlement(
            self.store.as_ref(),
            booking_id,
            Settlement::Paid,
            SettlementSource::Callback,
        )
        .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_codes() {
        assert_eq!(CallbackAck::success().return_code, 1);
        assert_eq!(CallbackAck::invalid().return_code, -1);
        assert_eq!(CallbackAck::invalid().return_message, "invalid callback");
        assert_eq!(CallbackAck::retry("db down").return_code, 0);
    }

    #[test]
    fn payload_accepts_gateway_shape() {
        let payload: CallbackPayload =
            serde_json::from_str(r#"{"data":"{}","mac":"abc","type":1}"#).unwrap();
        assert_eq!(payload.callback_type, Some(1));
        let payload: CallbackPayload = serde_json::from_str(r#"{"data":"{}","mac":"abc"}"#).unwrap();
        assert!(payload.callback_type.is_none());
    }
}
