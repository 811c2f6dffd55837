use crate::api::error::{ApiError, ApiResult};
use crate::config::ApiConfig;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Thin JSON client for the delivery backend.
///
/// Every failure leaves this type already classified as an [`ApiError`];
/// callers never inspect status codes or message text themselves.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    auth_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: config.max_retries,
            auth_token: Arc::new(RwLock::new(config.auth_token.clone())),
        })
    }

    /// Replaces the bearer token used for subsequent requests.
    pub async fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().await = token;
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        let url = self.endpoint(path, query)?;
        let text = self.execute(Method::GET, url, None).await?;
        decode(&text)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.endpoint(path, &[])?;
        let payload = serde_json::to_value(body)
            .map_err(|e| ApiError::validation(format!("unserializable request: {}", e), None))?;
        let text = self.execute(Method::POST, url, Some(payload)).await?;
        decode(&text)
    }

    /// POST without a body, ignoring whatever the server returns on success.
    pub async fn post_empty(&self, path: &str) -> ApiResult<()> {
        let url = self.endpoint(path, &[])?;
        self.execute(Method::POST, url, None).await.map(|_| ())
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| {
            ApiError::validation(format!("invalid endpoint {}: {}", path, e), None)
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<JsonValue>) -> ApiResult<String> {
        // Only idempotent reads are retried here; writes are retried (or not)
        // by the caller that knows whether a duplicate is harmless.
        let retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };
        let token = self.auth_token.read().await.clone();

        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .timeout(self.timeout);
            if let Some(token) = token.as_deref() {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body.as_ref() {
                request = request.json(payload);
            }

            debug!(method = %method, url = %url, attempt = attempt + 1, "sending backend request");

            let err = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return Ok(text);
                    }
                    classify_status(status, &text)
                }
                Err(e) => ApiError::from(e),
            };

            if err.is_retryable() && attempt < retries {
                warn!(
                    method = %method,
                    url = %url,
                    attempt = attempt + 1,
                    error = %err,
                    "backend request failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                attempt += 1;
                continue;
            }
            return Err(err);
        }
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> ApiResult<T> {
    serde_json::from_str::<T>(text).map_err(|e| ApiError::ServerRejected {
        status: None,
        message: format!("invalid backend JSON response: {}", e),
        retryable: false,
    })
}

/// Pulls a human message out of an error body (`message` or `error`).
pub(crate) fn extract_message(text: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(text).ok()?;
    ["message", "error"].iter().find_map(|key| match value.get(*key) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(JsonValue::Object(inner)) => inner
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        _ => None,
    })
}

pub(crate) fn classify_status(status: StatusCode, text: &str) -> ApiError {
    let message = extract_message(text);
    match status.as_u16() {
        400 => ApiError::Validation {
            message: message.unwrap_or_else(|| "Invalid request data".to_string()),
            field: None,
        },
        401 => ApiError::Unauthorized {
            message: message.unwrap_or_else(|| "Authentication required".to_string()),
        },
        429 => ApiError::ServerRejected {
            status: Some(429),
            message: message.unwrap_or_else(|| "rate limit exceeded".to_string()),
            retryable: true,
        },
        code => ApiError::ServerRejected {
            status: Some(code),
            message: message.unwrap_or_else(|| format!("HTTP {}", status)),
            retryable: status.is_server_error(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;

    #[test]
    fn extracts_message_or_error_field() {
        assert_eq!(
            extract_message(r#"{"message":"Order not found"}"#).as_deref(),
            Some("Order not found")
        );
        assert_eq!(
            extract_message(r#"{"error":{"message":"bad medium"}}"#).as_deref(),
            Some("bad medium")
        );
        assert_eq!(extract_message("<html>oops</html>"), None);
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "").kind(),
            ErrorKind::Auth
        );
        let unavailable = classify_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(unavailable.kind(), ErrorKind::ServerRejected);
        assert!(unavailable.is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, "").is_retryable());
    }

    #[test]
    fn endpoint_appends_query_pairs() {
        let client = ApiClient::new(&ApiConfig {
            base_url: "https://api.example.com/".to_string(),
            ..ApiConfig::default()
        })
        .expect("client should build");
        let url = client
            .endpoint("/payments/verify", &[("transId", "tx 1")])
            .expect("url should parse");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/payments/verify?transId=tx+1"
        );
    }
}
