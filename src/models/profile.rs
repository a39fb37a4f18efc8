use serde::{Deserialize, Serialize};

/// SwitchProfile is what profiling learns about one running switch.
/// It is written to the per-fabric artifact file and read back by the policy stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwitchProfile {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub vlans: Vec<VlanRecord>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceRecord>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
}

impl SwitchProfile {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VlanRecord {
    pub id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub shutdown: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Ethernet,
    PortChannel,
    Svi,
    Loopback,
    Management,
    Other,
}

impl InterfaceKind {
    /// Classify an NX-OS interface name by its prefix
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("eth") {
            InterfaceKind::Ethernet
        } else if lower.starts_with("port-channel") || lower.starts_with("po") {
            InterfaceKind::PortChannel
        } else if lower.starts_with("vlan") {
            InterfaceKind::Svi
        } else if lower.starts_with("loopback") || lower.starts_with("lo") {
            InterfaceKind::Loopback
        } else if lower.starts_with("mgmt") {
            InterfaceKind::Management
        } else {
            InterfaceKind::Other
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwitchportMode {
    Access,
    Trunk,
    Routed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterfaceRecord {
    pub name: String,
    pub kind: InterfaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub shutdown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SwitchportMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_vlan: Option<u16>,
    // Raw NX-OS allowed list ("10,20-30"); "all" when unrestricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk_allowed_vlans: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_group: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<u16>,
    #[serde(default)]
    pub peer_link: bool,
    // Port-channel members, filled in for port-channels only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

impl InterfaceRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: InterfaceKind::from_name(name),
            description: None,
            shutdown: false,
            mtu: None,
            mode: None,
            access_vlan: None,
            trunk_allowed_vlans: None,
            native_vlan: None,
            ipv4_address: None,
            vrf: None,
            channel_group: None,
            vpc_id: None,
            peer_link: false,
            members: Vec::new(),
        }
    }

    pub fn is_routed(&self) -> bool {
        self.mode == Some(SwitchportMode::Routed) || self.ipv4_address.is_some()
    }
}

fn default_vrf() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticRoute {
    #[serde(default = "default_vrf")]
    pub vrf: String,
    pub prefix: String,
    pub next_hop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_kind_from_name() {
        assert_eq!(InterfaceKind::from_name("Ethernet1/4"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::from_name("Eth1/4"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::from_name("port-channel113"), InterfaceKind::PortChannel);
        assert_eq!(InterfaceKind::from_name("Vlan10"), InterfaceKind::Svi);
        assert_eq!(InterfaceKind::from_name("loopback0"), InterfaceKind::Loopback);
        assert_eq!(InterfaceKind::from_name("mgmt0"), InterfaceKind::Management);
        assert_eq!(InterfaceKind::from_name("nve1"), InterfaceKind::Other);
    }

    #[test]
    fn test_static_route_default_vrf() {
        let route: StaticRoute =
            serde_yaml::from_str("prefix: 0.0.0.0/0\nnext_hop: 10.0.0.1\n").unwrap();
        assert_eq!(route.vrf, "default");
        assert!(route.name.is_none());
    }
}
