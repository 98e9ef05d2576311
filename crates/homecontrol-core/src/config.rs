// ── Runtime connection configuration ──
//
// These types describe *how* to reach a gateway. They carry credential
// data and connection tuning, but never touch disk. Callers (or the
// homecontrol-config crate) construct a `HomeControlConfig` and hand it in.

use std::time::Duration;

use homecontrol_api::{
    DirectoryClient, DiscoveryConfig, HandshakeTimeouts, PushConfig, TransportConfig,
};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Configuration for connecting to one gateway.
#[derive(Debug, Clone)]
pub struct HomeControlConfig {
    /// Cloud directory base URL.
    pub directory_url: String,
    /// Directory account e-mail.
    pub username: String,
    /// Directory account password.
    pub password: SecretString,
    /// Gateway serial to connect to. `None` picks the first gateway of
    /// the account.
    pub gateway_id: Option<String>,
    /// Look for the gateway in the LAN before going through the cloud.
    pub zeroconf: bool,
    pub discovery: DiscoveryConfig,
    pub handshake: HandshakeTimeouts,
    /// JSON-RPC request timeout.
    pub rpc_timeout: Duration,
    pub push: PushConfig,
    /// How long `connect` waits for the push channel.
    pub establish_timeout: Duration,
}

impl HomeControlConfig {
    /// Defaults for the given account.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            directory_url: homecontrol_api::DEFAULT_DIRECTORY_URL.to_owned(),
            username: username.into(),
            password,
            gateway_id: None,
            zeroconf: true,
            discovery: DiscoveryConfig::default(),
            handshake: HandshakeTimeouts::default(),
            rpc_timeout: Duration::from_secs(30),
            push: PushConfig::default(),
            establish_timeout: homecontrol_api::DEFAULT_ESTABLISH_TIMEOUT,
        }
    }

    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = Some(gateway_id.into());
        self
    }

    /// Build the directory client for this account.
    pub fn directory_client(&self) -> Result<DirectoryClient, CoreError> {
        let base_url = Url::parse(&self.directory_url).map_err(|e| CoreError::Config {
            message: format!("invalid directory URL {}: {e}", self.directory_url),
        })?;
        let transport = TransportConfig {
            timeout: self.rpc_timeout,
            cookie_jar: None,
        };
        Ok(DirectoryClient::new(
            base_url,
            self.username.clone(),
            self.password.clone(),
            &transport,
        )?)
    }
}
