//! Back-channel logout delivery.
//!
//! Logout tokens are POSTed to every client's `backchannel_logout_uri`
//! concurrently. Delivery is best effort: failures are logged and counted but
//! never fail the logout.

use crate::constants::params;
use crate::error::{FlowError, Result};
use crate::metrics::{FlowMetric, FlowMetrics};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// One logout token to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutDelivery {
    /// Receiving client.
    pub client_id: String,
    /// The client's back-channel logout URI.
    pub url: String,
    /// Signed logout token.
    pub token: String,
}

/// Sends logout tokens to relying parties.
#[derive(Debug, Clone)]
pub struct BackChannelNotifier {
    http: reqwest::Client,
    metrics: Arc<FlowMetrics>,
}

impl BackChannelNotifier {
    /// Create a notifier whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration, metrics: Arc<FlowMetrics>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlowError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self { http, metrics })
    }

    /// Deliver all tokens and wait for every attempt to finish.
    pub async fn deliver(&self, deliveries: Vec<LogoutDelivery>) {
        if deliveries.is_empty() {
            return;
        }

        let mut tasks = JoinSet::new();
        for delivery in deliveries {
            let http = self.http.clone();
            let metrics = Arc::clone(&self.metrics);
            tasks.spawn(async move {
                let outcome = http
                    .post(&delivery.url)
                    .form(&[(params::LOGOUT_TOKEN, delivery.token.as_str())])
                    .send()
                    .await;

                match outcome {
                    Ok(response)
                        if matches!(response.status(), StatusCode::OK | StatusCode::NO_CONTENT) =>
                    {
                        metrics.increment(FlowMetric::BackChannelDelivered);
                        tracing::debug!(
                            client_id = %delivery.client_id,
                            "Back-channel logout delivered"
                        );
                    }
                    Ok(response) => {
                        metrics.increment(FlowMetric::BackChannelFailed);
                        tracing::warn!(
                            client_id = %delivery.client_id,
                            url = %delivery.url,
                            status = %response.status(),
                            "Back-channel logout rejected by client"
                        );
                    }
                    Err(e) => {
                        metrics.increment(FlowMetric::BackChannelFailed);
                        tracing::warn!(
                            client_id = %delivery.client_id,
                            url = %delivery.url,
                            error = %e,
                            "Back-channel logout delivery failed"
                        );
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Back-channel logout task panicked");
            }
        }
    }
}
