use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{CheckConfig, CheckKind, HostConfig, MonitorConfig};
use crate::models::Outcome;
use crate::notify::Notifier;
use crate::probe::Prober;

/// router (ping), web (ping + default http), nas (ping, no notify URL).
pub(crate) fn sample_config() -> MonitorConfig {
    MonitorConfig {
        check_interval: 30,
        hosts: vec![
            HostConfig {
                name: "router".into(),
                address: "192.168.1.1".into(),
                notify_url: Some("https://hc.example/router".into()),
                checks: vec![CheckConfig::ping()],
            },
            HostConfig {
                name: "web".into(),
                address: "10.0.0.2".into(),
                notify_url: Some("https://hc.example/web".into()),
                checks: vec![
                    CheckConfig::ping(),
                    CheckConfig {
                        kind: CheckKind::Http { url: String::new(), expect: 200 },
                        enabled: true,
                    },
                ],
            },
            HostConfig {
                name: "nas".into(),
                address: "nas.lan".into(),
                notify_url: None,
                checks: vec![CheckConfig::ping()],
            },
        ],
        ..MonitorConfig::default()
    }
}

/// Answers every probe successfully unless the target was marked failing.
/// Targets are recorded as `"ping <address>"` or `"http <url> <expect>"`.
#[derive(Default)]
pub(crate) struct StubProber {
    delay: Duration,
    failing: Mutex<HashSet<String>>,
    probed: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubProber {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub(crate) fn fail(&self, target: &str) {
        self.failing.lock().unwrap().insert(target.to_string());
    }

    pub(crate) fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, target: String) -> Outcome {
        let timestamp = Utc::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self.failing.lock().unwrap().contains(&target);
        self.probed.lock().unwrap().push(target);
        if failing {
            Outcome::down("stub failure", timestamp)
        } else {
            Outcome::up("stub ok", 1.0, timestamp)
        }
    }
}

#[async_trait]
impl Prober for StubProber {
    async fn ping(&self, address: &str) -> Outcome {
        self.respond(format!("ping {}", address)).await
    }

    async fn http(&self, url: &str, expect: u16) -> Outcome {
        self.respond(format!("http {} {}", url, expect)).await
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub(crate) fn sent(&self) -> Vec<(String, bool)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, url: &str, success: bool) -> Result<()> {
        self.sent.lock().unwrap().push((url.to_string(), success));
        if self.fail {
            bail!("endpoint unreachable");
        }
        Ok(())
    }
}

pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 1s");
}
