use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Authentication ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    pub user_name: String,
    pub user_passwd: String,
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub jwttoken: String,
}

// --- Read-back types ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdFabric {
    pub fabric_name: String,
    #[serde(default)]
    pub fabric_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdInventorySwitch {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub logical_name: Option<String>,
    #[serde(default)]
    pub switch_role: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// A switch sitting in the fabric's POAP queue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdPoapSwitch {
    pub serial_number: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub seed_ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdPolicy {
    #[serde(default)]
    pub policy_id: Option<String>,
    pub serial_number: String,
    pub template_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdVpcPair {
    pub peer_one_id: String,
    pub peer_two_id: String,
}

/// GET /interface returns the same grouping the create call takes
#[derive(Debug, Clone, Deserialize)]
pub struct NdInterfaceGroup {
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub interfaces: Vec<NdInterface>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdInterface {
    #[serde(default, alias = "serialNo")]
    pub serial_number: String,
    pub if_name: String,
}

// --- Create payloads ---

/// Fabric create: POST /control/fabrics/{name}/{template} with the nvPairs as body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FabricPayload {
    pub name: String,
    pub template: String,
    pub nv_pairs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverPayload {
    #[serde(rename = "seedIP")]
    pub seed_ip: String,
    pub username: String,
    pub password: String,
    pub max_hops: u32,
    pub cdp_second_timeout: u32,
    pub preserve_config: bool,
    pub switches: Vec<DiscoverSwitch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverSwitch {
    pub ipaddr: String,
    pub sys_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// POAP entry, used both to pre-provision and to bootstrap
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoapPayload {
    pub serial_number: String,
    pub model: String,
    pub version: String,
    pub hostname: String,
    pub ip_address: String,
    pub password: String,
    pub discovery_auth_protocol: u8,
    pub role: String,
    /// NDFC expects this as a JSON-encoded string
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_add: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPayload {
    pub serial_number: String,
    pub template_name: String,
    pub description: String,
    pub priority: u32,
    pub entity_type: String,
    pub entity_name: String,
    pub source: String,
    pub nv_pairs: BTreeMap<String, String>,
}

impl PolicyPayload {
    pub fn new(serial: &str, template: &str, description: &str, nv_pairs: BTreeMap<String, String>) -> Self {
        Self {
            serial_number: serial.to_string(),
            template_name: template.to_string(),
            description: description.to_string(),
            priority: 500,
            entity_type: "SWITCH".to_string(),
            entity_name: "SWITCH".to_string(),
            source: String::new(),
            nv_pairs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcPairPayload {
    pub peer_one_id: String,
    pub peer_two_id: String,
    pub use_virtual_peerlink: bool,
    pub template_name: String,
    pub nv_pairs: BTreeMap<String, String>,
}

impl VpcPairPayload {
    /// Order-independent identity of the pair, "A~B" with A < B
    pub fn pair_serial(&self) -> String {
        pair_serial(&self.peer_one_id, &self.peer_two_id)
    }
}

pub fn pair_serial(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}~{}", a, b)
    } else {
        format!("{}~{}", b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfacePayload {
    pub policy: String,
    pub interface_type: String,
    pub interfaces: Vec<InterfaceEntry>,
    pub skip_resource_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceEntry {
    pub serial_number: String,
    pub if_name: String,
    pub interface_type: String,
    pub fabric_name: String,
    pub nv_pairs: BTreeMap<String, String>,
}

/// Canonical NDFC interface type values
pub mod interface_type {
    pub const ETHERNET: &str = "INTERFACE_ETHERNET";
    pub const PORT_CHANNEL: &str = "INTERFACE_PORT_CHANNEL";
    pub const VPC: &str = "INTERFACE_VPC";
    pub const VLAN: &str = "INTERFACE_VLAN";
    pub const LOOPBACK: &str = "INTERFACE_LOOPBACK";
}
