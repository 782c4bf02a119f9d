use crate::payments::error::{PaymentError, PaymentResult};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// POST an `application/x-www-form-urlencoded` body and decode a JSON reply.
    ///
    /// 429, 5xx and transport failures are retried with `1 << attempt` second
    /// backoff; anything else is returned at once.
    pub async fn post_form<F, T>(&self, url: &str, form: &F) -> PaymentResult<T>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let response = self
                .client
                .post(url)
                .timeout(self.timeout)
                .form(form)
                .send()
                .await
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("gateway request failed: {}", e),
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::ProviderError {
                                provider: "http".to_string(),
                                message: format!("invalid gateway JSON response: {}", e),
                                provider_code: None,
                                retryable: false,
                            }
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                            continue;
                        }
                        return Err(PaymentError::RateLimitError {
                            message: "gateway rate limit exceeded".to_string(),
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "gateway server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::ProviderError {
                        provider: "http".to_string(),
                        message: format!("HTTP {}", status),
                        provider_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "gateway request failed");
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "gateway request failed".to_string(),
        }))
    }
}

/// Lowercase hex HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256_hex(key: &str, data: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(
        computed.as_bytes(),
        signature.trim().to_ascii_lowercase().as_bytes(),
    )
}

/// Constant-time comparison for equal-length inputs.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn hmac_matches_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            hmac_sha256_hex("Jefe", "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verification_accepts_own_signature_and_rejects_tampering() {
        let data = r#"{"app_trans_id":"260101_abc","amount":150000}"#;
        let mac = hmac_sha256_hex("key2", data);
        assert!(verify_hmac_sha256_hex(data.as_bytes(), "key2", &mac));
        assert!(verify_hmac_sha256_hex(data.as_bytes(), "key2", &mac.to_uppercase()));
        assert!(!verify_hmac_sha256_hex(data.as_bytes(), "key1", &mac));
        assert!(!verify_hmac_sha256_hex(b"{\"amount\":1}", "key2", &mac));
        assert!(!verify_hmac_sha256_hex(data.as_bytes(), "key2", "not-a-valid-signature"));
    }
}
