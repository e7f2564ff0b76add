use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExtensionSettings;
use crate::network::RewriteError;
use crate::tone::Tone;
use crate::usage::UsageTracker;

#[derive(Debug, Clone, Serialize)]
pub struct RewriteApiRequest<'a> {
    pub text: &'a str,
    pub mode: Tone,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteApiResponse {
    pub rewritten_text: String,
}

/// Calls the rewrite endpoint on behalf of the background context and
/// charges the monthly quota for every successful rewrite.
pub struct RewriteClient {
    http: Client,
    endpoint: String,
    tracker: Arc<UsageTracker>,
}

impl RewriteClient {
    pub fn new(endpoint: impl Into<String>, tracker: Arc<UsageTracker>) -> Result<Self, RewriteError> {
        let http = Client::builder()
            .build()
            .map_err(|err| RewriteError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            tracker,
        })
    }

    pub fn from_settings(
        settings: &ExtensionSettings,
        tracker: Arc<UsageTracker>,
    ) -> Result<Self, RewriteError> {
        Self::new(settings.rewrite_endpoint(), tracker)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    /// Rewrites `text` in the requested tone.
    ///
    /// Quota is checked before the request and consumed only after a
    /// successful response; failures never charge the quota.
    pub async fn rewrite(&self, text: &str, tone: Tone) -> Result<String, RewriteError> {
        if !self.tracker.check_quota().await? {
            let usage = self.tracker.usage().await?;
            info!(
                used = usage.used,
                limit = self.tracker.limit(),
                "rewrite refused: monthly quota exhausted"
            );
            return Err(RewriteError::QuotaExceeded {
                used: usage.used,
                limit: self.tracker.limit(),
            });
        }

        debug!(endpoint = %self.endpoint, %tone, chars = text.chars().count(), "sending rewrite request");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RewriteApiRequest { text, mode: tone })
            .send()
            .await
            .map_err(|err| RewriteError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "rewrite endpoint returned an error status");
            return Err(RewriteError::Upstream(status.as_u16()));
        }

        let body: RewriteApiResponse = response
            .json()
            .await
            .map_err(|err| RewriteError::Transport(err.to_string()))?;

        // The rewrite already happened; a failed counter write must not hide it.
        match self.tracker.consume().await {
            Ok(used) => info!(%tone, used, limit = self.tracker.limit(), "rewrite completed"),
            Err(err) => warn!("rewrite completed but usage could not be recorded: {err}"),
        }

        Ok(body.rewritten_text)
    }
}
