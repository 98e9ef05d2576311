use thiserror::Error;

/// Top-level error type for the `homecontrol-api` crate.
///
/// Covers every failure mode across all API surfaces:
/// directory, discovery, session handshake, JSON-RPC, and push channel.
/// `homecontrol-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Directory ───────────────────────────────────────────────────
    /// The directory rejected the user's e-mail/password (HTTP 403).
    #[error("Wrong directory credentials")]
    WrongCredentials,

    /// The directory is in maintenance mode (HTTP 503).
    #[error("Directory is in maintenance mode")]
    DirectoryMaintenance,

    /// The requested directory resource does not exist (HTTP 404).
    #[error("Directory resource not found: {path}")]
    DirectoryNotFound { path: String },

    /// Any other non-success directory response.
    #[error("Directory error (HTTP {status}): {message}")]
    Directory { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Client construction failed.
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    // ── Gateway ─────────────────────────────────────────────────────
    /// The gateway did not answer in a usable way. Transient.
    #[error("Gateway is offline: {reason}")]
    GatewayOffline { reason: String },

    /// Neither a local nor a remote connection is possible.
    #[error(
        "Cannot connect to gateway: no gateway found in LAN and external access is not possible"
    )]
    ConnectionImpossible,

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// The response id does not match the request id.
    #[error("JSON-RPC protocol violation: sent id {expected}, got id {got}")]
    ProtocolViolation { expected: u64, got: u64 },

    /// The gateway returned a JSON-RPC `error` member.
    #[error("JSON-RPC error: {message}")]
    Rpc { message: String },

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// No pong arrived within the keep-alive window.
    #[error("WebSocket keep-alive timed out after {timeout_secs}s")]
    PongTimeout { timeout_secs: u64 },

    // ── Discovery ───────────────────────────────────────────────────
    /// The mDNS daemon could not be started or queried.
    #[error("mDNS discovery failed: {0}")]
    Discovery(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error the reconnect loop retries.
    ///
    /// Body-parse failures during a handshake are already folded into
    /// [`GatewayOffline`](Self::GatewayOffline) by the session establisher.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::GatewayOffline { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::PongTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for errors that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionImpossible | Self::ProtocolViolation { .. } | Self::WrongCredentials
        )
    }

    pub(crate) fn offline(reason: impl Into<String>) -> Self {
        Self::GatewayOffline {
            reason: reason.into(),
        }
    }
}
