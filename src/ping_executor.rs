use std::future::Future;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence};
use tokio::process::Command;

use crate::config::{ProbeConfig, ProbeKind};
use crate::ping::Latency;

/// A single reachability check against one host.
///
/// Implementations never fail: every kind of failure is reported as `None`.
pub trait Probe {
    fn probe(&self, host: &str) -> impl Future<Output = Latency> + Send;
}

/// Which textual format the system `ping` utility prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    Windows,
    Unix,
}

impl PlatformFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            PlatformFamily::Windows
        } else {
            PlatformFamily::Unix
        }
    }

    fn count_flag(self) -> &'static str {
        match self {
            PlatformFamily::Windows => "-n",
            PlatformFamily::Unix => "-c",
        }
    }

    pub fn parse_latency(self, output: &str) -> Latency {
        let figure = match self {
            // Reply summary: "Minimum = 11ms, Maximum = 11ms, Average = 11ms"
            PlatformFamily::Windows => {
                let start = output.rfind("Average = ")? + "Average = ".len();
                leading_number(&output[start..])
            }
            // Reply line: "64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.3 ms".
            // Sub-millisecond replies on some systems read "time<1ms".
            PlatformFamily::Unix => {
                let start = ["time=", "time<"]
                    .into_iter()
                    .filter_map(|marker| output.rfind(marker))
                    .max()?
                    + "time=".len();
                leading_number(&output[start..])
            }
        }?;

        figure.parse::<f64>().ok().filter(|ms| ms.is_finite() && *ms >= 0.0)
    }
}

fn leading_number(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}

/// Collapses an attempt that outlives `limit` to `None`.
async fn within(limit: Duration, host: &str, attempt: impl Future<Output = Latency>) -> Latency {
    match tokio::time::timeout(limit, attempt).await {
        Ok(latency) => latency,
        Err(_) => {
            log::debug!("Probe of {host} did not finish within {limit:?}");
            None
        }
    }
}

/// Runs the platform `ping` utility once per probe and parses its stdout.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    platform: PlatformFamily,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("ping", PlatformFamily::current(), timeout)
    }

    pub fn with_program(
        program: impl Into<String>,
        platform: PlatformFamily,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            platform,
            timeout,
        }
    }

    fn command(&self, host: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args([self.platform.count_flag(), "1", host])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, host: &str) -> Latency {
        let output = match self.command(host).output().await {
            Ok(output) => output,
            Err(e) => {
                log::debug!("Failed to run {}: {e}", self.program);
                return None;
            }
        };

        if !output.status.success() {
            log::debug!("{} {host} exited with {}", self.program, output.status);
            return None;
        }

        self.platform.parse_latency(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Probe for CommandProbe {
    async fn probe(&self, host: &str) -> Latency {
        if host.is_empty() || host.starts_with('-') {
            log::debug!("Refusing to ping suspicious host {host:?}");
            return None;
        }

        within(self.timeout, host, self.run(host)).await
    }
}

/// Keep only characters valid in a hostname. Returns None if nothing is left.
fn sanitize_hostname(hostname: &str) -> Option<String> {
    // Also handle case where user included port like "example.com:8080"
    let hostname = hostname.split(':').next().unwrap_or(hostname);

    let sanitized: String = hostname
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

async fn resolve_target(target: &str) -> Option<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Some(ip);
    }

    let sanitized = sanitize_hostname(target)?;
    match tokio::net::lookup_host(format!("{sanitized}:0")).await {
        Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
        Err(e) => {
            log::debug!("Failed to resolve {target}: {e}");
            None
        }
    }
}

/// Sends one ICMP echo request from this process. Needs raw or datagram
/// ICMP socket permission.
#[derive(Debug)]
pub struct IcmpProbe {
    timeout: Duration,
    sequence: AtomicU16,
}

impl IcmpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sequence: AtomicU16::new(0),
        }
    }

    async fn echo(&self, host: &str) -> Latency {
        let target_ip = resolve_target(host).await?;

        let config = match target_ip {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = match Client::new(&config) {
            Ok(client) => client,
            Err(e) => {
                log::debug!("Failed to open ICMP socket: {e}");
                return None;
            }
        };

        let identifier = PingIdentifier(std::process::id() as u16);
        let mut pinger = client.pinger(target_ip, identifier).await;
        pinger.timeout(self.timeout);

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        match pinger.ping(PingSequence(sequence), &[]).await {
            Ok((IcmpPacket::V4(_), duration)) | Ok((IcmpPacket::V6(_), duration)) => {
                Some(duration.as_secs_f64() * 1000.0)
            }
            Err(e) => {
                log::debug!("ICMP echo to {host} ({target_ip}) failed: {e}");
                None
            }
        }
    }
}

impl Probe for IcmpProbe {
    /// Name resolution and the echo share one deadline.
    async fn probe(&self, host: &str) -> Latency {
        within(self.timeout, host, self.echo(host)).await
    }
}

/// The probe selected by configuration.
#[derive(Debug)]
pub enum ProbeBackend {
    Command(CommandProbe),
    Icmp(IcmpProbe),
}

impl ProbeBackend {
    pub fn from_config(config: &ProbeConfig) -> Self {
        let timeout = config.timeout();
        match config.backend {
            ProbeKind::Command => ProbeBackend::Command(CommandProbe::new(timeout)),
            ProbeKind::Icmp => ProbeBackend::Icmp(IcmpProbe::new(timeout)),
        }
    }
}

impl Probe for ProbeBackend {
    async fn probe(&self, host: &str) -> Latency {
        match self {
            ProbeBackend::Command(probe) => probe.probe(host).await,
            ProbeBackend::Icmp(probe) => probe.probe(host).await,
        }
    }
}
