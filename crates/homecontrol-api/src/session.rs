// Session establishment
//
// Chooses between a LAN handshake and a cloud-relayed handshake and
// produces a cookie-bearing `Session`. The choice is made fresh on
// every call, so a reconnect falls back to the cloud when the LAN
// address is gone and vice versa.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::gateway::GatewayDescriptor;
use crate::transport::TransportConfig;

const LOCAL_BOOTSTRAP_PATH: &str = "/dhlp/portal/full";

/// Timeouts for the two handshake strategies.
#[derive(Debug, Clone)]
pub struct HandshakeTimeouts {
    /// Local bootstrap and token requests. Default: 5s.
    pub local: Duration,
    /// Remote full-access request. Default: 15s.
    pub remote: Duration,
}

impl Default for HandshakeTimeouts {
    fn default() -> Self {
        Self {
            local: Duration::from_secs(5),
            remote: Duration::from_secs(15),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// An authenticated connection context to one gateway.
///
/// Holds the HTTP client whose cookie jar carries the session cookie,
/// the base URL every request is resolved against, and the JSON-RPC id
/// counter. Never mutated after creation; a reconnect builds a new one.
pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    cookie_jar: Arc<Jar>,
    local: bool,
    last_id: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("local", &self.local)
            .field("last_id", &self.last_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Assemble a session from an already authenticated client.
    pub fn from_parts(
        http: reqwest::Client,
        base_url: Url,
        cookie_jar: Arc<Jar>,
        local: bool,
    ) -> Self {
        Self {
            http,
            base_url,
            cookie_jar,
            local,
            last_id: AtomicU64::new(0),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `true` when the session talks to the gateway over the LAN.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// `Cookie` header value for requests outside the HTTP client
    /// (the push channel upgrade request).
    pub fn cookie_header(&self) -> Option<String> {
        self.cookie_jar
            .cookies(&self.base_url)
            .and_then(|v| v.to_str().ok().map(str::to_owned))
    }

    /// Allocate the next JSON-RPC request id. Ids start at 1.
    pub(crate) fn next_request_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ── SessionEstablisher ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BootstrapResponse {
    link: String,
}

/// Performs the handshake that yields a [`Session`].
pub struct SessionEstablisher {
    gateway: Arc<GatewayDescriptor>,
    transport: TransportConfig,
    timeouts: HandshakeTimeouts,
}

impl SessionEstablisher {
    pub fn new(
        gateway: Arc<GatewayDescriptor>,
        transport: TransportConfig,
        timeouts: HandshakeTimeouts,
    ) -> Self {
        Self {
            gateway,
            transport,
            timeouts,
        }
    }

    pub fn gateway(&self) -> &Arc<GatewayDescriptor> {
        &self.gateway
    }

    /// Establish a session, locally when `local` is known, else remotely.
    ///
    /// Fails with [`Error::ConnectionImpossible`] when there is no local
    /// address and the cloud route is disallowed or in maintenance.
    pub async fn establish(&self, local: Option<SocketAddrV4>) -> Result<Session, Error> {
        if let Some(addr) = local {
            return self.local_session(addr).await;
        }

        if self.gateway.external_access() && !self.gateway.directory().maintenance().await? {
            return self.remote_session().await;
        }

        Err(Error::ConnectionImpossible)
    }

    /// LAN handshake: bootstrap with basic auth, then follow the token link.
    async fn local_session(&self, addr: SocketAddrV4) -> Result<Session, Error> {
        info!(%addr, "connecting to gateway locally");

        let jar = Arc::new(Jar::default());
        let http = self.client(&jar)?;
        let base_url = Url::parse(&format!("http://{addr}"))?;
        let bootstrap = base_url.join(LOCAL_BOOTSTRAP_PATH)?;

        debug!("GET {}", bootstrap);
        let resp = http
            .get(bootstrap)
            .basic_auth(
                self.gateway.local_user(),
                Some(self.gateway.local_passkey().expose_secret()),
            )
            .timeout(self.timeouts.local)
            .send()
            .await?;

        let body = resp.text().await?;
        let bootstrap: BootstrapResponse = serde_json::from_str(&body)
            .map_err(|e| Error::offline(format!("unreadable bootstrap response: {e}")))?;

        let link = base_url.join(&bootstrap.link)?;
        debug!("GET {}", link);
        http.get(link)
            .timeout(self.timeouts.local)
            .send()
            .await?
            .error_for_status()?;

        self.gateway.set_local_connection(true);
        self.gateway.set_online(true);
        Ok(Session::from_parts(http, base_url, jar, true))
    }

    /// Cloud handshake through the pre-resolved full-access URL.
    async fn remote_session(&self) -> Result<Session, Error> {
        let full_url = self.gateway.full_url().await?.clone();
        info!("connecting to gateway via cloud");

        let jar = Arc::new(Jar::default());
        let http = self.client(&jar)?;

        debug!("GET {}", full_url);
        let resp = http
            .get(full_url)
            .timeout(self.timeouts.remote)
            .send()
            .await?;

        let final_url = resp.url().clone();
        let body = resp.text().await?;
        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| Error::offline(format!("unreadable full-access response: {e}")))?;

        let base_url = origin(&final_url);
        self.gateway.set_local_connection(false);
        self.gateway.set_online(true);
        Ok(Session::from_parts(http, base_url, jar, false))
    }

    fn client(&self, jar: &Arc<Jar>) -> Result<reqwest::Client, Error> {
        TransportConfig {
            cookie_jar: Some(Arc::clone(jar)),
            ..self.transport.clone()
        }
        .build_client()
    }
}

/// `scheme://host[:port]/` of a URL.
fn origin(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_start_at_one_and_increase() {
        let session = Session::from_parts(
            reqwest::Client::new(),
            Url::parse("http://192.168.0.10").unwrap(),
            Arc::new(Jar::default()),
            true,
        );
        assert_eq!(session.next_request_id(), 1);
        assert_eq!(session.next_request_id(), 2);
        assert_eq!(session.next_request_id(), 3);
    }

    #[test]
    fn cookie_header_reflects_jar() {
        let jar = Arc::new(Jar::default());
        let url = Url::parse("http://192.168.0.10").unwrap();
        jar.add_cookie_str("JSESSIONID=abc123; Path=/", &url);

        let session = Session::from_parts(reqwest::Client::new(), url, jar, true);
        assert_eq!(session.cookie_header().as_deref(), Some("JSESSIONID=abc123"));
    }

    #[test]
    fn origin_strips_path_and_query() {
        let url = Url::parse("https://relay.example.com:8443/dhp/portal/fullLogin?token=x").unwrap();
        assert_eq!(origin(&url).as_str(), "https://relay.example.com:8443/");
    }
}
