// Gateway descriptor
//
// Identity, local credentials and reachability flags of one gateway.
// Identity is fixed at construction; the flags live in a `watch`
// channel so the session, RPC and dispatch layers can flip them while
// consumers observe the changes.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{OnceCell, watch};
use tracing::debug;
use url::Url;

use crate::directory::{DirectoryClient, GatewayDetails};
use crate::error::Error;

const STATUS_ONLINE: &str = "devolo.hc_gateway.status.online";
const STATE_IDLE: &str = "devolo.hc_gateway.state.idle";

/// Mutable reachability flags of a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayState {
    /// The gateway answers requests.
    pub online: bool,
    /// The gateway is synchronized with the cloud.
    pub sync: bool,
    /// The current session talks to the gateway over the LAN.
    pub local_connection: bool,
}

/// In-memory record of one gateway.
pub struct GatewayDescriptor {
    id: String,
    name: Option<String>,
    role: Option<String>,
    local_user: String,
    local_passkey: SecretString,
    firmware_version: Option<String>,
    external_access: bool,
    full_url: OnceCell<Url>,
    state: watch::Sender<GatewayState>,
    directory: Arc<DirectoryClient>,
}

impl std::fmt::Debug for GatewayDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("external_access", &self.external_access)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GatewayDescriptor {
    /// Look the gateway up in the directory and build its descriptor.
    pub async fn from_directory(
        gateway_id: &str,
        directory: Arc<DirectoryClient>,
    ) -> Result<Self, Error> {
        let details = directory.gateway(gateway_id).await?;
        debug!(gateway_id, "gateway details retrieved");
        Ok(Self::from_details(details, directory))
    }

    /// Build a descriptor from already fetched directory data.
    pub fn from_details(details: GatewayDetails, directory: Arc<DirectoryClient>) -> Self {
        let state = GatewayState {
            online: details.status.as_deref() == Some(STATUS_ONLINE),
            sync: details.state.as_deref() == Some(STATE_IDLE),
            local_connection: false,
        };
        let (state, _) = watch::channel(state);

        Self {
            id: details.gateway_id,
            name: details.name,
            role: details.role,
            local_user: details.local_user.unwrap_or_default(),
            local_passkey: SecretString::from(details.local_passkey.unwrap_or_default()),
            firmware_version: details.firmware_version,
            external_access: details.external_access.unwrap_or(false),
            full_url: OnceCell::new(),
            state,
            directory,
        }
    }

    /// Pre-resolve the full-access URL instead of asking the directory.
    pub fn with_full_url(self, url: Url) -> Self {
        // A fresh cell is always empty, so `set` cannot fail here.
        let _ = self.full_url.set(url);
        self
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    pub fn external_access(&self) -> bool {
        self.external_access
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    pub fn local_passkey(&self) -> &SecretString {
        &self.local_passkey
    }

    pub fn directory(&self) -> &Arc<DirectoryClient> {
        &self.directory
    }

    /// The full-access URL, resolved through the directory on first use.
    pub async fn full_url(&self) -> Result<&Url, Error> {
        self.full_url
            .get_or_try_init(|| self.directory.full_url(&self.id))
            .await
    }

    // ── Flags ────────────────────────────────────────────────────────

    pub fn state(&self) -> GatewayState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GatewayState> {
        self.state.subscribe()
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|s| replace(&mut s.online, online));
    }

    pub fn set_sync(&self, sync: bool) {
        self.state.send_if_modified(|s| replace(&mut s.sync, sync));
    }

    pub fn set_local_connection(&self, local: bool) {
        self.state
            .send_if_modified(|s| replace(&mut s.local_connection, local));
    }
}

/// Assign `value` and report whether it changed.
fn replace(slot: &mut bool, value: bool) -> bool {
    let changed = *slot != value;
    *slot = value;
    changed
}
