// JSON-RPC transport
//
// Request/response channel to the gateway's `/remote/json-rpc` endpoint.
// Every call is correlated by an id drawn from the live session; the
// session itself sits in an `ArcSwap` slot shared with the push channel,
// which swaps in a fresh one after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::gateway::GatewayDescriptor;
use crate::session::Session;

const RPC_PATH: &str = "/remote/json-rpc";
const GET_FUNCTIONAL_ITEMS: &str = "FIM/getFunctionalItems";
const INVOKE_OPERATION: &str = "FIM/invokeOperation";

/// Shared slot holding the single live session.
pub type SessionSlot = Arc<ArcSwap<Session>>;

/// One item returned by `FIM/getFunctionalItems`.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionalItem {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

/// Outcome of `FIM/invokeOperation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeStatus {
    /// Status `1`: the gateway applied the operation.
    Accepted,
    /// Status `2`: accepted, but the value did not change.
    Unchanged,
    /// Any other status.
    Failed(i64),
}

impl InvokeStatus {
    fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Accepted,
            2 => Self::Unchanged,
            other => Self::Failed(other),
        }
    }

    /// `true` only when the caller may assume its value changed.
    pub fn changed(self) -> bool {
        self == Self::Accepted
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ItemsResult {
    #[serde(default)]
    items: Vec<FunctionalItem>,
}

#[derive(Debug, Deserialize)]
struct InvokeResult {
    status: i64,
}

/// JSON-RPC client bound to the gateway's live session.
#[derive(Clone)]
pub struct RpcClient {
    session: SessionSlot,
    gateway: Arc<GatewayDescriptor>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(session: SessionSlot, gateway: Arc<GatewayDescriptor>) -> Self {
        Self {
            session,
            gateway,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The current session.
    pub fn session(&self) -> Arc<Session> {
        self.session.load_full()
    }

    pub fn session_slot(&self) -> &SessionSlot {
        &self.session
    }

    /// Send one JSON-RPC request and return its `result`.
    ///
    /// Timeouts and connection failures mark the gateway offline and
    /// surface as [`Error::GatewayOffline`]. A response carrying a
    /// different id is a [`Error::ProtocolViolation`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let session = self.session.load_full();
        let id = session.next_request_id();
        let url = session.base_url().join(RPC_PATH)?;
        let body = json!({
            "method": method,
            "params": params,
            "jsonrpc": "2.0",
            "id": id,
        });

        debug!(id, method, "POST {}", url);

        let text = match self.send(&session, url, &body).await {
            Ok(text) => text,
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!(error = %e, method, "gateway did not answer");
                self.gateway.set_online(false);
                return Err(Error::offline(e.to_string()));
            }
            Err(e) => return Err(Error::Transport(e)),
        };

        let response: RpcResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;

        if response.id != id {
            return Err(Error::ProtocolViolation {
                expected: id,
                got: response.id,
            });
        }

        if let Some(err) = response.error {
            return Err(Error::Rpc {
                message: err.to_string(),
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn send(
        &self,
        session: &Session,
        url: url::Url,
        body: &Value,
    ) -> Result<String, reqwest::Error> {
        session
            .http()
            .post(url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?
            .text()
            .await
    }

    // ── Typed calls ──────────────────────────────────────────────────

    /// Fetch functional items by uid.
    pub async fn fetch_items(&self, uids: &[String]) -> Result<Vec<FunctionalItem>, Error> {
        let result = self
            .call(GET_FUNCTIONAL_ITEMS, json!([uids, 0]))
            .await?;
        let items: ItemsResult =
            serde_json::from_value(result.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: result.to_string(),
            })?;
        Ok(items.items)
    }

    /// Invoke an operation on a functional item.
    ///
    /// Status `2` and failures are logged; only
    /// [`InvokeStatus::Accepted`] means the value changed.
    pub async fn invoke(
        &self,
        uid: &str,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<InvokeStatus, Error> {
        let result = self
            .call(INVOKE_OPERATION, json!([uid, operation, args]))
            .await?;
        let parsed: InvokeResult =
            serde_json::from_value(result.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: result.to_string(),
            })?;

        let status = InvokeStatus::from_code(parsed.status);
        match status {
            InvokeStatus::Accepted => {}
            InvokeStatus::Unchanged => {
                debug!(uid, operation, "operation accepted, value did not change");
            }
            InvokeStatus::Failed(code) => {
                error!(uid, operation, status = code, "operation failed");
            }
        }
        Ok(status)
    }

    /// Ask the gateway to extend the session timeout. Idempotent.
    pub async fn refresh_session(&self) -> Result<(), Error> {
        self.invoke("devolo.UserPrefs", "resetSessionTimeout", Vec::new())
            .await
            .map(|_| ())
    }
}
