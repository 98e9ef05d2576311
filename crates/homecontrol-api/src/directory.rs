// Cloud directory client
//
// Thin request/response wrapper around the account directory
// (`https://www.mydevolo.com`). Resolves the user's uuid, the gateways
// attached to the account, their full-access URLs and the maintenance
// state. Every call is a basic-auth GET returning JSON.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Default directory endpoint.
pub const DEFAULT_DIRECTORY_URL: &str = "https://www.mydevolo.com";

/// Gateway record as delivered by the directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDetails {
    pub gateway_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub local_user: Option<String>,
    #[serde(default)]
    pub local_passkey: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub external_access: Option<bool>,
    #[serde(rename = "type", default)]
    pub gateway_type: Option<String>,
}

/// Z-Wave product metadata.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZwaveProduct {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub is_zwave_plus: bool,
    #[serde(default)]
    pub manufacturer_id: String,
    #[serde(default)]
    pub product_type_id: String,
    #[serde(default)]
    pub product_id: String,
}

impl ZwaveProduct {
    /// Placeholder returned for products the directory does not know.
    fn unknown(manufacturer: &str, product_type: &str, product: &str) -> Self {
        Self {
            brand: "devolo".into(),
            name: "Unknown device".into(),
            identifier: "unknown".into(),
            is_zwave_plus: false,
            manufacturer_id: manufacturer.into(),
            product_type_id: product_type.into(),
            product_id: product.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UuidResponse {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct GatewayStatusList {
    #[serde(default)]
    items: Vec<GatewayStatusItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayStatusItem {
    gateway_id: String,
}

#[derive(Debug, Deserialize)]
struct FullUrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MaintenanceResponse {
    state: String,
}

/// Client for the cloud account directory.
///
/// Shared behind an `Arc` by the session establisher and the gateway
/// descriptor. The user's uuid is resolved once and cached.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    user: String,
    password: SecretString,
    uuid: OnceCell<String>,
}

impl DirectoryClient {
    pub fn new(
        base_url: Url,
        user: String,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            user,
            password,
            uuid: OnceCell::new(),
        })
    }

    /// Create a directory client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        user: String,
        password: SecretString,
    ) -> Self {
        Self {
            http,
            base_url,
            user,
            password,
            uuid: OnceCell::new(),
        }
    }

    /// The directory base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check the configured e-mail/password against the directory.
    pub async fn credentials_valid(&self) -> Result<bool, Error> {
        match self.get::<UuidResponse>("/v1/users/uuid").await {
            Ok(_) => Ok(true),
            Err(Error::WrongCredentials) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The account uuid, fetched on first use.
    pub async fn uuid(&self) -> Result<&str, Error> {
        let uuid = self
            .uuid
            .get_or_try_init(|| async {
                let resp: UuidResponse = self.get("/v1/users/uuid").await?;
                Ok::<_, Error>(resp.uuid)
            })
            .await?;
        Ok(uuid.as_str())
    }

    /// Serial ids of every gateway attached to the account.
    pub async fn gateway_ids(&self) -> Result<Vec<String>, Error> {
        let uuid = self.uuid().await?;
        let list: GatewayStatusList = self
            .get(&format!("/v1/users/{uuid}/hc/gateways/status"))
            .await?;
        if list.items.is_empty() {
            debug!("no gateways attached to account");
        }
        Ok(list.items.into_iter().map(|i| i.gateway_id).collect())
    }

    /// Details for a single gateway.
    pub async fn gateway(&self, gateway_id: &str) -> Result<GatewayDetails, Error> {
        let uuid = self.uuid().await?;
        self.get(&format!("/v1/users/{uuid}/hc/gateways/{gateway_id}"))
            .await
    }

    /// The URL granting full remote access to a gateway.
    pub async fn full_url(&self, gateway_id: &str) -> Result<Url, Error> {
        let uuid = self.uuid().await?;
        let resp: FullUrlResponse = self
            .get(&format!("/v1/users/{uuid}/hc/gateways/{gateway_id}/fullURL"))
            .await?;
        Ok(Url::parse(&resp.url)?)
    }

    /// `true` while the cloud service is in a maintenance window.
    pub async fn maintenance(&self) -> Result<bool, Error> {
        let resp: MaintenanceResponse = self.get("/v1/hc/maintenance").await?;
        if resp.state == "on" {
            return Ok(false);
        }
        warn!(state = %resp.state, "devolo Home Control is in maintenance mode");
        Ok(true)
    }

    /// Metadata for a Z-Wave product. Unknown products yield a placeholder.
    pub async fn zwave_product(
        &self,
        manufacturer: &str,
        product_type: &str,
        product: &str,
    ) -> Result<ZwaveProduct, Error> {
        let path = format!("/v1/zwave/products/{manufacturer}/{product_type}/{product}");
        match self.get::<ZwaveProduct>(&path).await {
            Ok(p) => Ok(p),
            Err(Error::DirectoryNotFound { .. }) => {
                debug!(manufacturer, product_type, product, "unknown Z-Wave product");
                Ok(ZwaveProduct::unknown(manufacturer, product_type, product))
            }
            Err(e) => Err(e),
        }
    }

    // ── Request helper ───────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            403 => return Err(Error::WrongCredentials),
            404 => {
                return Err(Error::DirectoryNotFound {
                    path: path.to_owned(),
                });
            }
            503 => return Err(Error::DirectoryMaintenance),
            _ if !status.is_success() => {
                let message = resp.text().await.unwrap_or_default();
                return Err(Error::Directory {
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
