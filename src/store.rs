//! In-memory check state shared by the scheduler and the API.
//!
//! All state sits behind one `RwLock`. Reads take the shared side and return
//! deep copies; every mutation and a whole sweep take the exclusive side.
//! Topology changes are written back to the config file before returning.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{self, CheckConfig, CheckKind, HostConfig, MonitorConfig};
use crate::error::{StoreError, StoreResult};
use crate::models::{CheckStatus, HostStatus, Outcome, Status};
use crate::notify::{self, HttpNotifier, Notifier};
use crate::probe::{NetworkProber, Prober};

pub struct CheckStore {
    inner: RwLock<Inner>,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    config_path: Option<PathBuf>,
    max_concurrency: usize,
    scheduler_active: AtomicBool,
}

struct HostEntry {
    /// Insertion sequence; display order is derived from it.
    seq: u64,
    status: HostStatus,
}

struct Inner {
    hosts: HashMap<String, HostEntry>,
    next_seq: u64,
    /// Non-host settings of the loaded document, written back unchanged.
    settings: MonitorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSummary {
    pub executed: usize,
    pub failed: usize,
    pub duration: Duration,
}

enum Probe {
    Ping(String),
    Http(String, u16),
}

impl Inner {
    fn insert(&mut self, status: HostStatus) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.hosts.insert(status.name.clone(), HostEntry { seq, status });
    }

    fn ordered(&self) -> Vec<&HostEntry> {
        let mut entries: Vec<&HostEntry> = self.hosts.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    fn document(&self) -> MonitorConfig {
        let mut doc = self.settings.clone();
        doc.hosts = self.ordered().into_iter().map(|e| HostConfig::from(&e.status)).collect();
        doc
    }

    fn host_mut(&mut self, name: &str) -> StoreResult<&mut HostStatus> {
        self.hosts
            .get_mut(name)
            .map(|e| &mut e.status)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn check_mut(&mut self, name: &str, index: usize) -> StoreResult<&mut CheckStatus> {
        let host = self.host_mut(name)?;
        let len = host.checks.len();
        host.checks.get_mut(index).ok_or_else(|| StoreError::IndexOutOfRange {
            host: name.to_string(),
            index,
            len,
        })
    }
}

fn clean_url(url: Option<&str>) -> Option<String> {
    url.map(str::trim).filter(|u| !u.is_empty()).map(String::from)
}

/// Rejects hosts the config loader would refuse on the next start.
fn validate_host(name: &str, address: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::Invalid("name is required".into()));
    }
    if address.trim().is_empty() {
        return Err(StoreError::Invalid(format!("{} has no address", name)));
    }
    Ok(())
}

impl CheckStore {
    pub fn new(mut config: MonitorConfig) -> StoreResult<Self> {
        config.normalize();
        let prober: Arc<dyn Prober> = Arc::new(NetworkProber::from_config(&config));
        let max_concurrency = config.max_concurrency.max(1);

        let hosts = std::mem::take(&mut config.hosts);
        let mut inner = Inner {
            hosts: HashMap::with_capacity(hosts.len()),
            next_seq: 0,
            settings: config,
        };
        for host in &hosts {
            validate_host(&host.name, &host.address)?;
            if inner.hosts.contains_key(&host.name) {
                return Err(StoreError::AlreadyExists(host.name.clone()));
            }
            inner.insert(HostStatus::from(host));
        }

        Ok(Self {
            inner: RwLock::new(inner),
            prober,
            notifier: Arc::new(HttpNotifier::new()),
            config_path: None,
            max_concurrency,
            scheduler_active: AtomicBool::new(false),
        })
    }

    /// Enables persistence: every topology change rewrites this file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config_path = Some(std::path::absolute(&path).unwrap_or(path));
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config_path.as_deref()
    }

    pub async fn snapshot(&self) -> Vec<HostStatus> {
        let inner = self.inner.read().await;
        inner.ordered().into_iter().map(|e| e.status.clone()).collect()
    }

    pub async fn get_host(&self, name: &str) -> StoreResult<HostStatus> {
        let inner = self.inner.read().await;
        inner
            .hosts
            .get(name)
            .map(|e| e.status.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// The document as it would be persisted right now.
    pub async fn document(&self) -> MonitorConfig {
        self.inner.read().await.document()
    }

    pub async fn add_host(&self, name: &str, address: &str, notify_url: Option<&str>) -> StoreResult<()> {
        validate_host(name, address)?;
        let mut inner = self.inner.write().await;
        if inner.hosts.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        inner.insert(HostStatus {
            name: name.to_string(),
            address: address.to_string(),
            notify_url: clean_url(notify_url),
            checks: vec![CheckStatus::from(&CheckConfig::ping())],
        });
        info!(host = %name, %address, "Host added");
        self.persist(&inner)
    }

    pub async fn update_host(
        &self,
        old_name: &str,
        new_name: &str,
        address: &str,
        notify_url: Option<&str>,
    ) -> StoreResult<()> {
        validate_host(new_name, address)?;
        let mut inner = self.inner.write().await;
        if !inner.hosts.contains_key(old_name) {
            return Err(StoreError::NotFound(old_name.to_string()));
        }
        if new_name != old_name && inner.hosts.contains_key(new_name) {
            return Err(StoreError::AlreadyExists(new_name.to_string()));
        }
        let Some(mut entry) = inner.hosts.remove(old_name) else {
            return Err(StoreError::NotFound(old_name.to_string()));
        };
        entry.status.name = new_name.to_string();
        entry.status.address = address.to_string();
        entry.status.notify_url = clean_url(notify_url);
        inner.hosts.insert(new_name.to_string(), entry);

        info!(host = %new_name, previous = %old_name, %address, "Host updated");
        self.persist(&inner)
    }

    pub async fn delete_host(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.hosts.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        info!(host = %name, "Host deleted");
        self.persist(&inner)
    }

    /// Appends an enabled check and returns its index.
    pub async fn add_check(&self, host: &str, kind: CheckKind) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let status = inner.host_mut(host)?;
        info!(%host, kind = kind.name(), "Check added");
        status.checks.push(CheckStatus { kind, enabled: true, outcome: None });
        let index = status.checks.len() - 1;
        self.persist(&inner)?;
        Ok(index)
    }

    pub async fn remove_check(&self, host: &str, index: usize) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let status = inner.host_mut(host)?;
        if index >= status.checks.len() {
            return Err(StoreError::IndexOutOfRange {
                host: host.to_string(),
                index,
                len: status.checks.len(),
            });
        }
        let removed = status.checks.remove(index);
        info!(%host, index, kind = removed.kind.name(), "Check removed");
        self.persist(&inner)
    }

    /// Replaces the parameters of a check. The kind must match; the previous
    /// outcome is cleared since it described the old target.
    pub async fn update_check(&self, host: &str, index: usize, kind: CheckKind) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let check = inner.check_mut(host, index)?;
        if !check.kind.same_kind(&kind) {
            return Err(StoreError::WrongKind {
                host: host.to_string(),
                index,
                actual: check.kind.name(),
                requested: kind.name(),
            });
        }
        check.kind = kind;
        check.outcome = None;
        info!(%host, index, "Check updated");
        self.persist(&inner)
    }

    pub async fn update_http_check(&self, host: &str, index: usize, url: &str, expect: u16) -> StoreResult<()> {
        self.update_check(host, index, CheckKind::Http { url: url.to_string(), expect })
            .await
    }

    pub async fn toggle_check(&self, host: &str, index: usize, enabled: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let check = inner.check_mut(host, index)?;
        if check.enabled == enabled {
            return Ok(());
        }
        check.enabled = enabled;
        info!(%host, index, enabled, "Check toggled");
        self.persist(&inner)
    }

    /// Sets or clears the notify URL. A failure to persist is logged, not returned.
    pub async fn set_notify_url(&self, host: &str, url: Option<&str>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let status = inner.host_mut(host)?;
        status.notify_url = clean_url(url);
        info!(%host, notify_url = ?status.notify_url, "Notify URL set");
        if let Err(e) = self.persist(&inner) {
            warn!(%host, error = %e, "Notify URL kept in memory only");
        }
        Ok(())
    }

    /// Runs every enabled check once and records the outcomes.
    ///
    /// The write lock is held for the whole sweep, network I/O included, so
    /// readers see either the state before or after it and nothing in between.
    /// A slow probe therefore delays every other store call.
    pub async fn run_sweep(&self) -> SweepSummary {
        let start = Instant::now();
        let mut inner = self.inner.write().await;

        let jobs: Vec<(String, usize, Probe)> = inner
            .ordered()
            .into_iter()
            .flat_map(|entry| {
                let host = &entry.status;
                host.checks
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.enabled)
                    .map(move |(index, c)| {
                        let probe = match &c.kind {
                            CheckKind::Ping => Probe::Ping(host.address.clone()),
                            CheckKind::Http { url, expect } => Probe::Http(host.http_target(url), *expect),
                        };
                        (host.name.clone(), index, probe)
                    })
            })
            .collect();
        let executed = jobs.len();

        let results: Vec<(String, usize, Outcome)> = stream::iter(jobs)
            .map(|(host, index, probe)| {
                let prober = Arc::clone(&self.prober);
                async move {
                    let outcome = match probe {
                        Probe::Ping(address) => prober.ping(&address).await,
                        Probe::Http(url, expect) => prober.http(&url, expect).await,
                    };
                    (host, index, outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut failed = 0;
        let mut host_ok: HashMap<String, bool> = HashMap::new();
        for (name, index, outcome) in results {
            if !outcome.success {
                failed += 1;
            }
            *host_ok.entry(name.clone()).or_insert(true) &= outcome.success;

            let Some(check) = inner
                .hosts
                .get_mut(&name)
                .and_then(|e| e.status.checks.get_mut(index))
            else {
                continue;
            };
            log_transition(&name, index, check, &outcome);
            check.outcome = Some(outcome);
        }

        let signals: Vec<(String, String, bool)> = host_ok
            .into_iter()
            .filter_map(|(name, ok)| {
                let url = inner.hosts.get(&name)?.status.notify_url.clone()?;
                Some((name, url, ok))
            })
            .collect();
        drop(inner);

        // One signal per host: HTTP outcomes count alongside ping, any failure fails it.
        for (host, url, ok) in signals {
            notify::dispatch(Arc::clone(&self.notifier), host, url, ok);
        }

        let duration = start.elapsed();
        info!(
            checks = executed,
            failed,
            "Sweep completed {} checks in {:.2}s at {}",
            executed,
            duration.as_secs_f64(),
            Utc::now().format("%H:%M:%S")
        );
        SweepSummary { executed, failed, duration }
    }

    pub(crate) fn claim_scheduler(&self) -> bool {
        self.scheduler_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_scheduler(&self) {
        self.scheduler_active.store(false, Ordering::Release);
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler_active.load(Ordering::Acquire)
    }

    fn persist(&self, inner: &Inner) -> StoreResult<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        // Blocking write under the write lock: the caller returns only once the file is on disk.
        match config::save(path, &inner.document()) {
            Ok(()) => {
                debug!(path = %path.display(), "Persisted config");
                Ok(())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to persist config, in-memory state kept");
                Err(StoreError::Persistence(e))
            }
        }
    }
}

fn log_transition(host: &str, index: usize, check: &CheckStatus, outcome: &Outcome) {
    let new_status = outcome.status();
    let changed = match check.outcome.as_ref().map(Outcome::status) {
        Some(old) => old != new_status,
        None => new_status == Status::Down,
    };
    if !changed {
        return;
    }

    let msg = format!("[CHANGE] {}/{}#{} -> {:?}", host, check.kind.name(), index, new_status);
    if new_status == Status::Down {
        error!(reason = %outcome.message, "{}", msg);
    } else {
        warn!("{}", msg);
    }
}
