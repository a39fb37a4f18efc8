use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod profile;

pub use profile::*;

/// Canonical NDFC switch role values
pub mod switch_role {
    pub const LEAF: &str = "leaf";
    pub const SPINE: &str = "spine";
    pub const BORDER: &str = "border";
    pub const BORDER_SPINE: &str = "border_spine";
    pub const BORDER_GATEWAY: &str = "border_gateway";
    pub const SUPER_SPINE: &str = "super_spine";
    pub const ACCESS: &str = "access";
    pub const AGGREGATION: &str = "aggregation";
    pub const CORE_ROUTER: &str = "core_router";
    pub const EDGE_ROUTER: &str = "edge_router";
    pub const TOR: &str = "tor";

    pub const ALL: &[&str] = &[
        LEAF,
        SPINE,
        BORDER,
        BORDER_SPINE,
        BORDER_GATEWAY,
        SUPER_SPINE,
        ACCESS,
        AGGREGATION,
        CORE_ROUTER,
        EDGE_ROUTER,
        TOR,
    ];

    pub fn is_valid(role: &str) -> bool {
        ALL.contains(&role)
    }
}

/// Inventory keys carrying the POAP triplet
pub mod poap_field {
    pub const SERIAL: &str = "destination_switch_sn";
    pub const MODEL: &str = "destination_switch_model";
    pub const VERSION: &str = "destination_switch_version";
}

/// SwitchRecord is one inventory host after group vars have been merged.
/// The onboarding mode is derived from it (see `onboarding::classify`), never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwitchRecord {
    pub hostname: String,
    /// Management IP (`ansible_host` in the inventory)
    pub ansible_host: String,
    pub fabric: String,
    pub role: String,
    #[serde(default)]
    pub add_to_fabric: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_switch_sn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_switch_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_switch_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_pass: Option<String>,
    // Attached after discovery or from the artifact cache
    #[serde(skip)]
    pub profile: Option<SwitchProfile>,
}

impl SwitchRecord {
    pub fn new(hostname: &str, ansible_host: &str, fabric: &str, role: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ansible_host: ansible_host.to_string(),
            fabric: fabric.to_string(),
            role: role.to_string(),
            add_to_fabric: true,
            destination_switch_sn: None,
            destination_switch_model: None,
            destination_switch_version: None,
            ssh_user: None,
            ssh_pass: None,
            profile: None,
        }
    }

    /// The three POAP fields in (serial, model, version) order, blanks treated as absent
    pub fn poap_fields(&self) -> [(&'static str, Option<&str>); 3] {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        [
            (poap_field::SERIAL, present(&self.destination_switch_sn)),
            (poap_field::MODEL, present(&self.destination_switch_model)),
            (poap_field::VERSION, present(&self.destination_switch_version)),
        ]
    }

    /// Serial number known for this switch: the POAP serial, else the discovered one
    pub fn serial_number(&self) -> Option<&str> {
        self.poap_fields()[0]
            .1
            .or_else(|| self.profile.as_ref().and_then(|p| p.serial.as_deref()))
    }
}

/// PoapTriplet only exists when serial, model and version are all present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoapTriplet {
    pub serial: String,
    pub model: String,
    pub version: String,
}

fn default_fabric_template() -> String {
    "Easy_Fabric".to_string()
}

fn default_keepalive_vrf() -> String {
    "management".to_string()
}

/// FabricDefinition is read-only input from the fabric definition file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FabricDefinition {
    pub name: String,
    #[serde(default = "default_fabric_template")]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_asn: Option<String>,
    /// Gateway handed to POAP switches, e.g. "10.1.1.1/24"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_mode: Option<String>,
    #[serde(default)]
    pub nv_pairs: BTreeMap<String, String>,
    #[serde(default)]
    pub vpc_domains: Vec<VpcDomain>,
}

/// VpcDomain describes one VPC switch pair and its peer-link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VpcDomain {
    pub domain_id: u16,
    pub peer1: String,
    pub peer2: String,
    #[serde(default = "default_keepalive_vrf")]
    pub keepalive_vrf: String,
    pub peer_link_po: u16,
    #[serde(default)]
    pub peer_link_members: Vec<String>,
}

/// HostFailure records a switch that dropped out of a stage
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostFailure {
    pub hostname: String,
    pub error: String,
}

impl HostFailure {
    pub fn new(hostname: &str, error: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poap_fields_treat_blank_as_absent() {
        let mut sw = SwitchRecord::new("leaf01", "10.0.0.1", "site1", "leaf");
        sw.destination_switch_sn = Some("  ".to_string());
        sw.destination_switch_model = Some("N9K-C93180YC-FX".to_string());
        let fields = sw.poap_fields();
        assert_eq!(fields[0], (poap_field::SERIAL, None));
        assert_eq!(fields[1], (poap_field::MODEL, Some("N9K-C93180YC-FX")));
        assert_eq!(fields[2], (poap_field::VERSION, None));
    }

    #[test]
    fn test_serial_prefers_poap_over_profile() {
        let mut sw = SwitchRecord::new("leaf01", "10.0.0.1", "site1", "leaf");
        sw.profile = Some(SwitchProfile {
            serial: Some("DISCOVERED".to_string()),
            ..SwitchProfile::new("leaf01")
        });
        assert_eq!(sw.serial_number(), Some("DISCOVERED"));
        sw.destination_switch_sn = Some("FDO123".to_string());
        assert_eq!(sw.serial_number(), Some("FDO123"));
    }

    #[test]
    fn test_role_validation() {
        assert!(switch_role::is_valid("leaf"));
        assert!(switch_role::is_valid("border_gateway"));
        assert!(!switch_role::is_valid("Leaf"));
        assert!(!switch_role::is_valid(""));
    }

    #[test]
    fn test_fabric_defaults() {
        let fabric: FabricDefinition = serde_yaml::from_str(
            "name: site1\nvpc_domains:\n  - domain_id: 10\n    peer1: leaf01\n    peer2: leaf02\n    peer_link_po: 500\n",
        )
        .unwrap();
        assert_eq!(fabric.template, "Easy_Fabric");
        assert_eq!(fabric.vpc_domains[0].keepalive_vrf, "management");
        assert_eq!(fabric.vpc_domains[0].peer_link_po, 500);
    }
}
