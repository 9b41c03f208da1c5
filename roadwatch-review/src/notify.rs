//! Violation notice delivery
//!
//! The consensus engine invokes the notifier once per case finalized as a
//! valid violation. Delivery is synchronous and never retried here; a
//! failure surfaces to the submitter of the closing rating while the case
//! stays solved.

use std::future::Future;

use roadwatch_common::models::ViolationNotice;
use roadwatch_common::{Error, Result};
use tracing::{debug, info};

/// Delivers a violation notice for a finalized case.
pub trait Notifier: Send + Sync {
    fn send(&self, notice: &ViolationNotice) -> impl Future<Output = Result<()>> + Send;
}

/// Posts the notice as JSON to a configured webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// When `url` is `None`, notices are skipped with a debug log entry.
    pub fn new(url: Option<String>) -> Self {
        WebhookNotifier {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl Notifier for WebhookNotifier {
    async fn send(&self, notice: &ViolationNotice) -> Result<()> {
        let Some(url) = &self.url else {
            debug!("notify_url not configured, skipping violation notice");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(notice)
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notify(format!(
                "notice webhook returned {}",
                response.status()
            )));
        }

        info!(email = %notice.email, "violation notice delivered");
        Ok(())
    }
}

/// Discards notices; used in tests and when running without a notifier.
#[derive(Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn send(&self, _notice: &ViolationNotice) -> Result<()> {
        Ok(())
    }
}
