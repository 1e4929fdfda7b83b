use async_trait::async_trait;
use chrono::Utc;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use socket2::Type;
use std::error::Error as _;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, SurgeError, ICMP};
use tracing::{debug, warn};

use crate::config::{default_expect, MonitorConfig};
use crate::models::Outcome;

/// Executes single probes. Implementations never touch store state and report
/// every failure as a failed [`Outcome`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn ping(&self, address: &str) -> Outcome;
    async fn http(&self, url: &str, expect: u16) -> Outcome;
}

pub struct NetworkProber {
    http_client: reqwest::Client,
    dns_resolver: TokioResolver,
    ping_timeout: Duration,
    http_timeout: Duration,
}

#[derive(Debug)]
enum PingError {
    Permission(io::Error),
    Failed(String),
}

impl PingError {
    fn from_io(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::PermissionDenied {
            PingError::Permission(e)
        } else {
            PingError::Failed(format!("ICMP socket error: {}", e))
        }
    }
}

/// Runs `attempt` on a raw ICMP socket and, when that is not permitted, once
/// more on a datagram socket. Raw ICMP usually needs privileges; datagram ICMP
/// sockets do not.
async fn with_unprivileged_fallback<F, Fut>(address: &str, mut attempt: F) -> Result<Duration, PingError>
where
    F: FnMut(Type) -> Fut,
    Fut: Future<Output = Result<Duration, PingError>>,
{
    match attempt(Type::RAW).await {
        Err(PingError::Permission(e)) => {
            debug!(%address, error = %e, "Raw ICMP not permitted, retrying unprivileged");
            attempt(Type::DGRAM).await
        }
        other => other,
    }
}

impl NetworkProber {
    pub fn new(ping_timeout: Duration, http_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http_client,
            dns_resolver: build_resolver(),
            ping_timeout,
            http_timeout,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.ping_timeout_ms),
            Duration::from_millis(config.http_timeout_ms),
        )
    }

    async fn resolve(&self, address: &str) -> Result<IpAddr, String> {
        if let Ok(ip) = address.parse::<IpAddr>() { return Ok(ip); }
        match self.dns_resolver.lookup_ip(address).await {
            Ok(lookup) => lookup.iter().next().ok_or_else(|| format!("no IP address found for {}", address)),
            Err(e) => Err(format!("DNS resolution failed: {}", e)),
        }
    }

    async fn ping_ip(&self, ip: IpAddr, sock_type: Type) -> Result<Duration, PingError> {
        let kind = if ip.is_ipv4() { ICMP::V4 } else { ICMP::V6 };
        let config = PingConfig::builder().kind(kind).sock_type_hint(sock_type).build();
        let client = PingClient::new(&config).map_err(PingError::from_io)?;

        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.ping_timeout);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, rtt)) => Ok(rtt),
            Err(SurgeError::IOError(e)) => Err(PingError::from_io(e)),
            Err(SurgeError::Timeout { .. }) => Err(PingError::Failed(format!(
                "request timeout after {}ms",
                self.ping_timeout.as_millis()
            ))),
            Err(e) => Err(PingError::Failed(e.to_string())),
        }
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("request timeout after {}ms", self.http_timeout.as_millis());
        }
        let mut msg = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        msg
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn ping(&self, address: &str) -> Outcome {
        let timestamp = Utc::now();
        let ip = match self.resolve(address).await {
            Ok(ip) => ip,
            Err(e) => return Outcome::down(e, timestamp),
        };

        let result = with_unprivileged_fallback(address, move |sock_type| self.ping_ip(ip, sock_type)).await;

        match result {
            Ok(rtt) => Outcome::up("pong", rtt.as_secs_f64() * 1000.0, timestamp),
            Err(PingError::Permission(e)) => Outcome::down(format!("permission denied: {}", e), timestamp),
            Err(PingError::Failed(msg)) => Outcome::down(msg, timestamp),
        }
    }

    async fn http(&self, url: &str, expect: u16) -> Outcome {
        let timestamp = Utc::now();
        let expect = if expect == 0 { default_expect() } else { expect };
        let start = Instant::now();

        match self.http_client.get(url).timeout(self.http_timeout).send().await {
            Ok(resp) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                let code = resp.status().as_u16();
                Outcome {
                    success: code == expect,
                    message: format!("status {} (expect {})", code, expect),
                    latency_ms: Some(latency),
                    timestamp,
                }
            }
            Err(e) => Outcome::down(self.describe(&e), timestamp),
        }
    }
}

fn build_resolver() -> TokioResolver {
    match TokioResolver::builder_tokio() {
        Ok(builder) => builder.build(),
        Err(e) => {
            warn!(error = %e, "System DNS config unavailable, using Cloudflare 1.1.1.1 / 1.0.0.1");
            TokioResolver::builder_with_config(
                ResolverConfig::cloudflare(),
                TokioConnectionProvider::default(),
            )
            .build()
        }
    }
}
