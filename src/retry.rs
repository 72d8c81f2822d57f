//! Retry/backoff policy for remote API calls.
//!
//! Both the embedding and chat-completion adapters post JSON to an
//! OpenAI-compatible endpoint through [`post_json_with_retry`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff doubles from `initial_backoff_ms`, capped at `max_backoff_ms`

use serde::Deserialize;
use std::time::Duration;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    32_000
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Read an API key from the named environment variable.
pub fn api_key_from_env(var: &str) -> Result<String, ApiError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ApiError::MissingApiKey(var.to_string())),
    }
}

/// POST a JSON body and return the parsed JSON response, retrying
/// transient failures according to `policy`.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
    policy: &RetryPolicy,
    service: &'static str,
) -> Result<serde_json::Value, ApiError> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            tracing::debug!(service, attempt, ?delay, "retrying remote call");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| ApiError::InvalidResponse {
                            service,
                            reason: e.to_string(),
                        });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = ApiError::Status {
                    service,
                    status: status.as_u16(),
                    body: body_text,
                };

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(service, status = status.as_u16(), "transient API error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                tracing::warn!(service, error = %e, "API transport error");
                last_err = Some(ApiError::Transport { service, source: e });
            }
        }
    }

    Err(last_err.unwrap_or(ApiError::InvalidResponse {
        service,
        reason: "no attempt was made".to_string(),
    }))
}
