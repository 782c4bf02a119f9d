use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CallbackEvent, PaymentRequest, PaymentResponse, StatusResponse, WebhookVerificationResult,
};
use async_trait::async_trait;

/// Hosted-checkout payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order and obtain a payment link. A refused order comes back as
    /// `Ok` with `accepted == false`; `Err` means no usable answer at all.
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse>;

    async fn get_payment_status(
        &self,
        transaction_reference: &str,
    ) -> PaymentResult<StatusResponse>;

    fn name(&self) -> &'static str;

    /// Check a callback `mac` against its raw `data` string.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    /// Decode a callback `data` string that has already been verified.
    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<CallbackEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{EmbedData, PaymentState};
    use uuid::Uuid;

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn initiate_payment(
            &self,
            request: PaymentRequest,
        ) -> PaymentResult<PaymentResponse> {
            Ok(PaymentResponse {
                accepted: true,
                return_code: 1,
                return_message: "success".to_string(),
                payment_url: Some(format!("https://pay.example/{}", request.transaction_reference)),
                provider_reference: None,
            })
        }

        async fn get_payment_status(
            &self,
            _transaction_reference: &str,
        ) -> PaymentResult<StatusResponse> {
            Ok(StatusResponse {
                status: PaymentState::Success,
                return_code: 1,
                return_message: "success".to_string(),
                amount: Some(100),
                provider_reference: Some("zp_1".to_string()),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> PaymentResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<CallbackEvent> {
            Ok(CallbackEvent {
                transaction_reference: "260101_x".to_string(),
                provider_reference: None,
                amount: None,
                embed_data: EmbedData {
                    preferred_payment_method: vec![],
                    redirecturl: None,
                    booking_id: Uuid::nil(),
                    show_id: Uuid::nil(),
                    selected_seats: vec![],
                },
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);
        let response = gateway
            .initiate_payment(PaymentRequest {
                transaction_reference: "260101_abc".to_string(),
                app_user: "user_1".to_string(),
                amount: 100,
                description: "Payment for the ticket #abc".to_string(),
                items: vec![],
                embed_data: EmbedData {
                    preferred_payment_method: vec![],
                    redirecturl: None,
                    booking_id: Uuid::nil(),
                    show_id: Uuid::nil(),
                    selected_seats: vec![],
                },
            })
            .await
            .expect("payment initiation should succeed");
        assert!(response.accepted);
        assert_eq!(
            response.payment_url.as_deref(),
            Some("https://pay.example/260101_abc")
        );

        let status = gateway
            .get_payment_status("260101_abc")
            .await
            .expect("status should succeed");
        assert_eq!(status.status, PaymentState::Success);
    }
}
