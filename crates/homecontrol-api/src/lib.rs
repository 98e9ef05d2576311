// homecontrol-api: Async Rust client for devolo Home Control gateways (directory, discovery, session, JSON-RPC, push events)

pub mod directory;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod push;
pub mod rpc;
pub mod session;
pub mod transport;

pub use directory::{DEFAULT_DIRECTORY_URL, DirectoryClient, GatewayDetails, ZwaveProduct};
pub use discovery::{DiscoveryConfig, LocalDiscovery};
pub use error::Error;
pub use gateway::{GatewayDescriptor, GatewayState};
pub use push::{
    ConnectionState, DEFAULT_ESTABLISH_TIMEOUT, PushChannel, PushConfig, PushNotification,
    ReconnectConfig,
};
pub use rpc::{FunctionalItem, InvokeStatus, RpcClient, SessionSlot};
pub use session::{HandshakeTimeouts, Session, SessionEstablisher};
pub use transport::TransportConfig;
