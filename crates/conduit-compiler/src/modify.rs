//! Modification hook: an external service that may rewrite a configuration
//! after expansion.

use std::time::Duration;

use conduit_config::parse::decode_yaml;
use conduit_config::system::ModificationConfig;
use conduit_core::document::Build;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CompileError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRequest {
    /// The configuration as YAML.
    pub pipeline: String,
    pub build: i64,
    pub repo: String,
    pub org: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyResponse {
    pub pipeline: String,
}

pub struct ModificationClient {
    client: reqwest::Client,
    config: ModificationConfig,
}

impl ModificationClient {
    pub fn new(config: ModificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn attempts(&self) -> u32 {
        self.config.retries.max(1)
    }

    /// Wait before the given retry (1-based): doubling from the minimum,
    /// capped at the maximum.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.config
            .backoff_min
            .saturating_mul(factor)
            .min(self.config.backoff_max)
    }

    /// Sends `build` to the endpoint and returns the replacement document and
    /// its parse warnings.
    pub async fn modify(
        &self,
        build: &Build,
        request: ModifyRequest,
    ) -> Result<(Build, Vec<String>)> {
        let attempts = self.attempts();
        let pipeline = serde_yaml::to_string(build).map_err(|e| CompileError::ModificationHook {
            attempts: 0,
            message: format!("unable to encode configuration: {e}"),
        })?;
        let request = ModifyRequest { pipeline, ..request };

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                let wait = self.backoff(attempt - 1);
                warn!(
                    endpoint = %self.config.endpoint,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %last_error,
                    "retrying modification request"
                );
                tokio::time::sleep(wait).await;
            }

            match self.send(&request).await {
                Ok(response) => {
                    debug!(endpoint = %self.config.endpoint, attempt, "configuration modified");
                    return decode_yaml(response.pipeline.as_bytes()).map_err(|e| {
                        CompileError::ModificationHook {
                            attempts: attempt,
                            message: format!("unable to parse modified configuration: {e}"),
                        }
                    });
                }
                Err(e) => last_error = e,
            }
        }

        Err(CompileError::ModificationHook {
            attempts,
            message: last_error,
        })
    }

    async fn send(&self, request: &ModifyRequest) -> std::result::Result<ModifyResponse, String> {
        let mut builder = self
            .client
            .post(&self.config.endpoint)
            .header("User-Agent", "Conduit-CI")
            .timeout(self.config.timeout)
            .json(request);
        if !self.config.secret.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.secret));
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("endpoint returned {}: {}", status.as_u16(), text));
        }

        let body: ModifyResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {e}"))?;
        if body.pipeline.trim().is_empty() {
            return Err("response contained no pipeline".to_string());
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff() {
        let mut config = ModificationConfig::new("http://localhost");
        config.backoff_min = Duration::from_millis(100);
        config.backoff_max = Duration::from_millis(350);
        let client = ModificationClient::new(config);

        assert_eq!(client.backoff(1), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(200));
        assert_eq!(client.backoff(3), Duration::from_millis(350));
        assert_eq!(client.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn test_attempts_never_zero() {
        let mut config = ModificationConfig::new("http://localhost");
        config.retries = 0;
        assert_eq!(ModificationClient::new(config).attempts(), 1);
    }
}
