// ── Core error types ──
//
// User-facing errors from homecontrol-core. Consumers never see HTTP
// status codes or JSON parse failures directly. The
// `From<homecontrol_api::Error>` impl folds transport-layer errors into
// domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Gateway is offline: {reason}")]
    GatewayOffline { reason: String },

    #[error(
        "Cannot connect to gateway: no gateway found in LAN and external access is not possible"
    )]
    ConnectionImpossible,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("No gateway attached to this account")]
    NoGateway,

    #[error("Cloud directory is in maintenance mode")]
    Maintenance,

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {uid}")]
    DeviceNotFound { uid: String },

    #[error("Property not found: {uid}")]
    PropertyNotFound { uid: String },

    /// A property was constructed with a uid of another kind.
    #[error("Uid {uid} does not belong to a {kind} property")]
    WrongElement { uid: String, kind: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<homecontrol_api::Error> for CoreError {
    fn from(err: homecontrol_api::Error) -> Self {
        use homecontrol_api::Error as ApiError;

        match err {
            ApiError::WrongCredentials => CoreError::AuthenticationFailed {
                message: "the directory rejected the e-mail/password".into(),
            },
            ApiError::DirectoryMaintenance => CoreError::Maintenance,
            ApiError::GatewayOffline { reason } => CoreError::GatewayOffline { reason },
            ApiError::ConnectionImpossible => CoreError::ConnectionImpossible,
            ApiError::ProtocolViolation { .. } => CoreError::ProtocolViolation {
                message: err.to_string(),
            },
            ApiError::Transport(ref e) if e.is_timeout() || e.is_connect() => {
                CoreError::GatewayOffline {
                    reason: e.to_string(),
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::ClientSetup(message) => CoreError::Config { message },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::Api {
                message: other.to_string(),
            },
        }
    }
}
