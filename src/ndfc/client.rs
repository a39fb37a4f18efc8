use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;

use super::types::*;
use crate::config::Config;

const REST_PREFIX: &str = "/appcenter/cisco/ndfc/api/v1/lan-fabric/rest";

/// Typed error for a control-plane rejection, so callers can tell
/// "not found" and "duplicate" apart from transport failures.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: String,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NDFC API error {}: {}", self.status, self.body)
    }
}

impl std::error::Error for ApiError {}

/// NDFC REST API client
pub struct NdfcClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NdfcClient {
    /// Build the HTTP client and log in to Nexus Dashboard
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.ndfc_timeout_secs))
            .danger_accept_invalid_certs(!cfg.ndfc_verify_tls)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        let base_url = cfg.ndfc_url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{}/login", base_url))
            .json(&LoginRequest {
                user_name: cfg.ndfc_user.clone(),
                user_passwd: cfg.ndfc_password.clone(),
                domain: cfg.ndfc_domain.clone(),
            })
            .send()
            .await
            .with_context(|| format!("Nexus Dashboard unreachable at {}", base_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError { status, body }).context("NDFC login failed");
        }
        let login: LoginResponse = resp.json().await.context("Unexpected NDFC login response")?;
        tracing::info!("Logged in to {} as {}", base_url, cfg.ndfc_user);

        Ok(Self {
            base_url,
            token: login.jwttoken,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, REST_PREFIX, path)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Helper to perform a GET and decode the JSON body
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.api_url(path))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError { status, body }.into());
        }
        Ok(resp.json().await?)
    }

    /// GET that maps 404 or an empty body to an empty list
    async fn get_list<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let resp = self
            .client
            .get(self.api_url(path))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError { status, body }.into());
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).with_context(|| format!("Unexpected response from {}", path))
    }

    /// Helper to send a JSON body; the response body is not interpreted
    async fn send_json<B: serde::Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<()> {
        let resp = self
            .client
            .request(method, self.api_url(path))
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError { status, body }.into());
        }
        Ok(())
    }

    // --- Fabrics ---

    pub async fn list_fabrics(&self) -> Result<Vec<NdFabric>> {
        self.get_list("/control/fabrics").await
    }

    pub async fn create_fabric(&self, fabric: &FabricPayload) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/control/fabrics/{}/{}", fabric.name, fabric.template),
            &fabric.nv_pairs,
        )
        .await
    }

    // --- Inventory ---

    pub async fn list_switches(&self, fabric: &str) -> Result<Vec<NdInventorySwitch>> {
        self.get_json(&format!("/control/fabrics/{}/inventory/switchesByFabric", fabric))
            .await
    }

    pub async fn discover(&self, fabric: &str, payload: &DiscoverPayload) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/control/fabrics/{}/inventory/discover", fabric),
            payload,
        )
        .await
    }

    // --- POAP ---

    pub async fn list_poap(&self, fabric: &str) -> Result<Vec<NdPoapSwitch>> {
        self.get_list(&format!("/control/fabrics/{}/inventory/poap", fabric))
            .await
    }

    /// Pre-provision and bootstrap share the endpoint; it takes a list
    pub async fn submit_poap(&self, fabric: &str, entries: &[PoapPayload]) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/control/fabrics/{}/inventory/poap", fabric),
            entries,
        )
        .await
    }

    // --- Policies ---

    pub async fn list_policies(&self, serial: &str) -> Result<Vec<NdPolicy>> {
        self.get_list(&format!("/control/policies/switches?serialNumber={}", serial))
            .await
    }

    pub async fn create_policy(&self, policy: &PolicyPayload) -> Result<()> {
        self.send_json(Method::POST, "/control/policies/bulk-create", policy)
            .await
    }

    // --- VPC pairs ---

    pub async fn get_vpc_pair(&self, serial: &str) -> Result<Option<NdVpcPair>> {
        match self.get_json::<NdVpcPair>(&format!("/vpcpair?serialNumber={}", serial)).await {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => match e.downcast_ref::<ApiError>() {
                // NDFC answers 500 with "not a vPC switch" rather than 404
                Some(api) if api.is_not_found() || api.body.contains("not a vPC") => Ok(None),
                _ => Err(e),
            },
        }
    }

    pub async fn create_vpc_pair(&self, pair: &VpcPairPayload) -> Result<()> {
        self.send_json(Method::POST, "/vpcpair", pair).await
    }

    // --- Interfaces ---

    pub async fn list_interfaces(&self, serial: &str) -> Result<Vec<NdInterfaceGroup>> {
        self.get_list(&format!("/interface?serialNumber={}", serial)).await
    }

    /// Logical interfaces are created; physical ones already exist and are updated
    pub async fn create_interface(&self, payload: &InterfacePayload) -> Result<()> {
        let method = if payload.interface_type == interface_type::ETHERNET {
            Method::PUT
        } else {
            Method::POST
        };
        self.send_json(method, "/globalInterface", payload).await
    }
}
