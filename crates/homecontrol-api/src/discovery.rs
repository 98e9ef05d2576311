//! Local gateway discovery over multicast DNS.
//!
//! Browses `_http._tcp.local.` for a bounded time and probes every
//! advertised IPv4 address with the gateway's local credentials. The
//! first candidate answering the identification path with HTTP 200 is
//! the gateway; the scan stops there.
//!
//! The mDNS daemon runs on a blocking thread and feeds candidates into a
//! channel, so [`LocalDiscovery::probe_candidates`] can be driven by any
//! candidate source (tests feed it directly).

use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::gateway::GatewayDescriptor;

const SERVICE_TYPE: &str = "_http._tcp.local.";
const HOSTNAME_PREFIX: &str = "devolo-homecontrol";
const PROBE_PATH: &str = "/dhlp/port/full";
const CANDIDATE_CHANNEL_CAPACITY: usize = 32;
/// Longest the browser thread blocks before checking for cancellation.
const BROWSE_POLL_SLICE: Duration = Duration::from_millis(50);

/// Timeouts for a discovery scan.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Overall scan duration. Default: 3s.
    pub scan_timeout: Duration,
    /// Per-candidate probe timeout. Default: 500ms.
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_millis(500),
        }
    }
}

/// Finds the gateway on the local network.
pub struct LocalDiscovery {
    http: reqwest::Client,
    local_user: String,
    local_passkey: SecretString,
    config: DiscoveryConfig,
}

impl LocalDiscovery {
    pub fn new(gateway: &GatewayDescriptor, config: DiscoveryConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| Error::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            local_user: gateway.local_user().to_owned(),
            local_passkey: gateway.local_passkey().clone(),
            config,
        })
    }

    /// Scan the LAN. Returns `None` when no gateway answered in time.
    ///
    /// Failure to start the mDNS daemon is logged and treated like an
    /// empty network.
    pub async fn discover(&self) -> Option<SocketAddrV4> {
        let (tx, rx) = mpsc::channel(CANDIDATE_CHANNEL_CAPACITY);
        let deadline = Instant::now() + self.config.scan_timeout;

        let browser = tokio::task::spawn_blocking(move || {
            if let Err(e) = browse(deadline, &tx) {
                warn!(error = %e, "mDNS browse failed");
            }
        });

        let found = self.probe_candidates(rx).await;
        // The browser thread sees the dropped receiver within one poll slice.
        if let Err(e) = browser.await {
            debug!(error = %e, "mDNS browser task ended abnormally");
        }
        found
    }

    /// Probe candidates from `rx` until one answers or the scan times out.
    pub async fn probe_candidates(
        &self,
        mut rx: mpsc::Receiver<SocketAddr>,
    ) -> Option<SocketAddrV4> {
        let scan = async {
            while let Some(candidate) = rx.recv().await {
                let SocketAddr::V4(addr) = candidate else {
                    debug!(%candidate, "skipping non-IPv4 candidate");
                    continue;
                };
                if self.probe(addr).await {
                    info!(%addr, "gateway found in LAN");
                    return Some(addr);
                }
            }
            None
        };

        tokio::time::timeout(self.config.scan_timeout, scan)
            .await
            .unwrap_or_else(|_| {
                debug!("no gateway answered before the scan timed out");
                None
            })
    }

    /// `true` if `addr` answers the identification path with HTTP 200.
    async fn probe(&self, addr: SocketAddrV4) -> bool {
        let url = format!("http://{addr}{PROBE_PATH}");
        debug!("probing {}", url);

        match self
            .http
            .get(&url)
            .basic_auth(&self.local_user, Some(self.local_passkey.expose_secret()))
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(%addr, error = %e, "candidate unreachable");
                false
            }
        }
    }
}

/// What one poll of the mDNS event stream yielded.
enum Browsed {
    Candidates(Vec<SocketAddr>),
    Idle,
    Ended,
}

/// Browse mDNS until `deadline`, forwarding candidate addresses.
///
/// Runs on a blocking thread; returns early once the receiver is gone.
fn browse(deadline: Instant, tx: &mpsc::Sender<SocketAddr>) -> Result<(), Error> {
    let daemon = ServiceDaemon::new().map_err(|e| Error::Discovery(e.to_string()))?;
    let events = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| Error::Discovery(e.to_string()))?;

    pump(deadline, tx, |wait| match events.recv_timeout(wait) {
        Ok(ServiceEvent::ServiceResolved(info))
            if info.get_hostname().starts_with(HOSTNAME_PREFIX) =>
        {
            let port = info.get_port();
            Browsed::Candidates(
                info.get_addresses()
                    .iter()
                    .map(|ip| SocketAddr::new(*ip, port))
                    .collect(),
            )
        }
        Err(_) if events.is_disconnected() => Browsed::Ended,
        _ => Browsed::Idle,
    });

    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown failed");
    }
    Ok(())
}

/// Forward candidates from `poll` until the deadline passes, the event
/// stream ends or the receiver is dropped. `poll` is never asked to wait
/// longer than [`BROWSE_POLL_SLICE`].
fn pump(
    deadline: Instant,
    tx: &mpsc::Sender<SocketAddr>,
    mut poll: impl FnMut(Duration) -> Browsed,
) {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || tx.is_closed() {
            return;
        }
        match poll(remaining.min(BROWSE_POLL_SLICE)) {
            Browsed::Candidates(found) => {
                for candidate in found {
                    if tx.blocking_send(candidate).is_err() {
                        return;
                    }
                }
            }
            Browsed::Idle => {}
            Browsed::Ended => return,
        }
    }
}
