use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CallbackEvent, EmbedData, PaymentRequest, PaymentResponse, PaymentState, StatusResponse,
    WebhookVerificationResult,
};
use crate::payments::utils::{hmac_sha256_hex, verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

const RETURN_CODE_SUCCESS: i64 = 1;
const RETURN_CODE_PROCESSING: i64 = 3;

#[derive(Debug, Clone)]
pub struct ZaloPayConfig {
    pub app_id: i64,
    /// Signs outgoing order and status requests
    pub key1: String,
    /// Verifies incoming callbacks
    pub key2: String,
    pub create_endpoint: String,
    pub status_endpoint: String,
    pub callback_url: Option<String>,
    pub redirect_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ZaloPayConfig {
    fn default() -> Self {
        Self {
            app_id: 2553,
            key1: String::new(),
            key2: String::new(),
            create_endpoint: "https://sb-openapi.zalopay.vn/v2/create".to_string(),
            status_endpoint: "https://sb-openapi.zalopay.vn/v2/query".to_string(),
            callback_url: None,
            redirect_url: None,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl ZaloPayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| PaymentError::ValidationError {
                message: format!("{} environment variable is required", name),
                field: Some(name.to_string()),
            })
        };

        let app_id = required("ZALOPAY_APP_ID")?
            .parse::<i64>()
            .map_err(|_| PaymentError::ValidationError {
                message: "ZALOPAY_APP_ID must be an integer".to_string(),
                field: Some("ZALOPAY_APP_ID".to_string()),
            })?;
        let defaults = Self::default();

        Ok(Self {
            app_id,
            key1: required("ZALOPAY_KEY1")?,
            key2: required("ZALOPAY_KEY2")?,
            create_endpoint: std::env::var("ZALOPAY_CREATE_ENDPOINT")
                .unwrap_or(defaults.create_endpoint),
            status_endpoint: std::env::var("ZALOPAY_STATUS_ENDPOINT")
                .unwrap_or(defaults.status_endpoint),
            callback_url: std::env::var("PAYMENT_CALLBACK_URL").ok(),
            redirect_url: std::env::var("CLIENT_REDIRECT_URL").ok(),
            timeout_secs: parse_env_or("ZALOPAY_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_retries: parse_env_or("ZALOPAY_MAX_RETRIES", defaults.max_retries)?,
        })
    }
}

/// `default` when `name` is unset; a set but unparsable value is an error.
fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> PaymentResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| PaymentError::ValidationError {
            message: format!("{} has an invalid value: {:?}", name, raw),
            field: Some(name.to_string()),
        }),
        Err(_) => Ok(default),
    }
}

/// Order form posted to the create endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OrderForm {
    pub app_id: i64,
    pub app_user: String,
    pub app_trans_id: String,
    /// Milliseconds since the epoch
    pub app_time: i64,
    pub amount: i64,
    /// JSON array of order lines
    pub item: String,
    /// JSON object echoed back in the callback
    pub embed_data: String,
    pub description: String,
    pub bank_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub mac: String,
}

impl OrderForm {
    pub fn mac_input(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.app_id,
            self.app_trans_id,
            self.app_user,
            self.amount,
            self.app_time,
            self.embed_data,
            self.item
        )
    }
}

#[derive(Debug, Clone, Serialize)]
struct StatusForm {
    app_id: i64,
    app_trans_id: String,
    mac: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    order_url: Option<String>,
    #[serde(default)]
    zp_trans_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryOrderResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    zp_trans_id: Option<i64>,
}

/// The callback `data` string once decoded. `embed_data` is itself a JSON string.
#[derive(Debug, Deserialize)]
struct CallbackData {
    app_trans_id: String,
    embed_data: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    zp_trans_id: Option<i64>,
}

pub struct ZaloPayProvider {
    config: ZaloPayConfig,
    http: PaymentHttpClient,
}

impl ZaloPayProvider {
    pub fn new(config: ZaloPayConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(ZaloPayConfig::from_env()?)
    }

    /// Build and sign the order form for `request`.
    pub fn build_order(&self, request: &PaymentRequest, app_time: i64) -> PaymentResult<OrderForm> {
        if request.amount <= 0 {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let mut embed = request.embed_data.clone();
        if embed.redirecturl.is_none() {
            embed.redirecturl = self.config.redirect_url.clone();
        }
        let encode_err = |e: serde_json::Error| PaymentError::ValidationError {
            message: format!("failed to encode order: {}", e),
            field: None,
        };
        let item = serde_json::to_string(&request.items).map_err(encode_err)?;
        let embed_data = serde_json::to_string(&embed).map_err(encode_err)?;

        let mut form = OrderForm {
            app_id: self.config.app_id,
            app_user: request.app_user.clone(),
            app_trans_id: request.transaction_reference.clone(),
            app_time,
            amount: request.amount,
            item,
            embed_data,
            description: request.description.clone(),
            bank_code: String::new(),
            callback_url: self.config.callback_url.clone(),
            mac: String::new(),
        };
        form.mac = hmac_sha256_hex(&self.config.key1, &form.mac_input());
        Ok(form)
    }

    fn status_mac(&self, app_trans_id: &str) -> String {
        hmac_sha256_hex(
            &self.config.key1,
            &format!("{}|{}|{}", self.config.app_id, app_trans_id, self.config.key1),
        )
    }

    fn status_form(&self, app_trans_id: &str) -> StatusForm {
        StatusForm {
            app_id: self.config.app_id,
            app_trans_id: app_trans_id.to_string(),
            mac: self.status_mac(app_trans_id),
        }
    }
}

fn map_return_code(return_code: i64) -> PaymentState {
    match return_code {
        RETURN_CODE_SUCCESS => PaymentState::Success,
        RETURN_CODE_PROCESSING => PaymentState::Pending,
        _ => PaymentState::Failed,
    }
}

#[async_trait]
impl PaymentGateway for ZaloPayProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        let form = self.build_order(&request, chrono::Utc::now().timestamp_millis())?;

        let raw: CreateOrderResponse = self
            .http
            .post_form(&self.config.create_endpoint, &form)
            .await?;

        let accepted = raw.return_code == RETURN_CODE_SUCCESS && raw.order_url.is_some();
        if accepted {
            info!(app_trans_id = %form.app_trans_id, amount = form.amount, "zalopay order created");
        } else {
            warn!(
                app_trans_id = %form.app_trans_id,
                return_code = raw.return_code,
                return_message = %raw.return_message,
                "zalopay refused order"
            );
        }

        Ok(PaymentResponse {
            accepted,
            return_code: raw.return_code,
            return_message: raw.return_message,
            payment_url: raw.order_url,
            provider_reference: raw.zp_trans_token,
        })
    }

    async fn get_payment_status(
        &self,
        transaction_reference: &str,
    ) -> PaymentResult<StatusResponse> {
        if transaction_reference.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "app_trans_id is required".to_string(),
                field: Some("app_trans_id".to_string()),
            });
        }

        let form = self.status_form(transaction_reference);
        let raw: QueryOrderResponse = self
            .http
            .post_form(&self.config.status_endpoint, &form)
            .await?;

        Ok(StatusResponse {
            status: map_return_code(raw.return_code),
            return_code: raw.return_code,
            return_message: raw.return_message,
            amount: raw.amount,
            provider_reference: raw.zp_trans_id.map(|id| id.to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "zalopay"
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        if self.config.key2.is_empty() {
            return Ok(WebhookVerificationResult {
                valid: false,
                reason: Some("callback key is not configured".to_string()),
            });
        }
        let valid = verify_hmac_sha256_hex(payload, &self.config.key2, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("mac mismatch".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<CallbackEvent> {
        let data: CallbackData =
            serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookVerificationError {
                message: format!("invalid callback data: {}", e),
            })?;
        let embed_data: EmbedData = serde_json::from_str(&data.embed_data).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: format!("invalid embed_data: {}", e),
            }
        })?;

        Ok(CallbackEvent {
            transaction_reference: data.app_trans_id,
            provider_reference: data.zp_trans_id.map(|id| id.to_string()),
            amount: data.amount,
            embed_data,
        })
    }
}
