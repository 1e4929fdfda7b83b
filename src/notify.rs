//! Healthchecks.io style ping notifications.
//!
//! Success is signalled with a GET on the base URL, failure with a GET on
//! `<base>/fail`. Delivery is at-most-once and never retried.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT_SECS: u64 = 5;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, success: bool) -> Result<()>;
}

pub struct HttpNotifier {
    http_client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new() -> Self {
        Self { http_client: reqwest::Client::new() }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str, success: bool) -> Result<()> {
        let target = signal_url(url, success);
        let resp = self
            .http_client
            .get(&target)
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .send()
            .await?;
        if resp.status().as_u16() >= 400 {
            bail!("{} returned status {}", target, resp.status());
        }
        Ok(())
    }
}

pub fn signal_url(base: &str, success: bool) -> String {
    if success {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{}fail", base)
    } else {
        format!("{}/fail", base)
    }
}

/// Fires a notification in the background. Errors are logged and dropped.
pub fn dispatch(notifier: Arc<dyn Notifier>, host: String, url: String, success: bool) {
    tokio::spawn(async move {
        match notifier.notify(&url, success).await {
            Ok(()) => debug!(%host, success, "Notification delivered"),
            Err(e) => warn!(%host, success, error = %e, "Notification failed"),
        }
    });
}
