use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome reported by a status query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Still processing; ask again later
    Pending,
    Success,
    Failed,
}

/// One priced seat, sent to the gateway as an order line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentItem {
    pub seat: String,
    pub price: i64,
}

/// Opaque booking context echoed back by the gateway in its callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedData {
    #[serde(default)]
    pub preferred_payment_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirecturl: Option<String>,
    #[serde(rename = "bookingId")]
    pub booking_id: Uuid,
    #[serde(rename = "showId")]
    pub show_id: Uuid,
    #[serde(rename = "selectedSeats", default)]
    pub selected_seats: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// `app_trans_id`, unique per booking
    pub transaction_reference: String,
    pub app_user: String,
    pub amount: i64,
    pub description: String,
    pub items: Vec<PaymentItem>,
    pub embed_data: EmbedData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResponse {
    /// Gateway accepted the order and returned a payment link
    pub accepted: bool,
    pub return_code: i64,
    pub return_message: String,
    pub payment_url: Option<String>,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: PaymentState,
    pub return_code: i64,
    pub return_message: String,
    pub amount: Option<i64>,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Contents of a verified payment-success callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub transaction_reference: String,
    pub provider_reference: Option<String>,
    pub amount: Option<i64>,
    pub embed_data: EmbedData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_data_uses_gateway_field_names() {
        let embed = EmbedData {
            preferred_payment_method: vec![],
            redirecturl: Some("https://cinema.example/bookings".to_string()),
            booking_id: Uuid::nil(),
            show_id: Uuid::nil(),
            selected_seats: vec!["A1".to_string()],
        };
        let json = serde_json::to_value(&embed).expect("serialization should succeed");
        assert_eq!(json["redirecturl"], "https://cinema.example/bookings");
        assert_eq!(json["selectedSeats"][0], "A1");
        assert!(json["preferred_payment_method"].as_array().unwrap().is_empty());
        assert!(json.get("bookingId").is_some());
    }

    #[test]
    fn embed_data_tolerates_missing_optional_fields() {
        let raw = format!(
            r#"{{"bookingId":"{}","showId":"{}"}}"#,
            Uuid::nil(),
            Uuid::nil()
        );
        let parsed: EmbedData = serde_json::from_str(&raw).expect("deserialization should succeed");
        assert!(parsed.selected_seats.is_empty());
        assert!(parsed.redirecturl.is_none());
    }
}
