use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::models::{InterfaceRecord, StaticRoute, SwitchportMode, VlanRecord};

/// Identity reported by `show version | json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionInfo {
    pub hostname: Option<String>,
    pub serial: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
}

/// Everything lifted out of `show running-config`, before exclusions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningConfig {
    pub features: Vec<String>,
    pub vlans: Vec<VlanRecord>,
    pub interfaces: Vec<InterfaceRecord>,
    pub static_routes: Vec<StaticRoute>,
}

pub fn parse_show_version(output: &str) -> Result<VersionInfo> {
    let json: serde_json::Value =
        serde_json::from_str(output.trim()).context("show version did not return JSON")?;
    let field = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    Ok(VersionInfo {
        hostname: field("host_name"),
        serial: field("proc_board_id"),
        model: field("chassis_id"),
        version: field("nxos_ver_str").or_else(|| field("kickstart_ver_str")),
    })
}

/// Expand an NX-OS VLAN list such as "10-12,20" into ids.
/// Returns None for anything that is not a list of VLAN ids.
pub fn expand_vlan_range(list: &str) -> Option<Vec<u16>> {
    let mut ids = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u16 = lo.trim().parse().ok()?;
                let hi: u16 = hi.trim().parse().ok()?;
                if lo > hi || hi > 4094 || lo == 0 {
                    return None;
                }
                ids.extend(lo..=hi);
            }
            None => {
                let id: u16 = part.parse().ok()?;
                if id == 0 || id > 4094 {
                    return None;
                }
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

enum Section {
    None,
    Vlan(Vec<u16>),
    Interface(usize),
    VrfContext(String),
}

/// Parse NX-OS `show running-config` text.
/// Only the sections this tool migrates are understood; everything else is ignored.
pub fn parse_running_config(text: &str) -> RunningConfig {
    let mut cfg = RunningConfig::default();
    let mut vlans: BTreeMap<u16, VlanRecord> = BTreeMap::new();
    let mut section = Section::None;

    for raw in text.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('!') {
            continue;
        }
        let indented = line.starts_with(' ');
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if !indented {
            section = Section::None;
            match tokens.as_slice() {
                ["feature", name, ..] => cfg.features.push(name.to_string()),
                ["vlan", list] => {
                    if let Some(ids) = expand_vlan_range(list) {
                        for id in &ids {
                            vlans.entry(*id).or_insert(VlanRecord {
                                id: *id,
                                name: None,
                                shutdown: false,
                            });
                        }
                        section = Section::Vlan(ids);
                    }
                }
                ["interface", name] => {
                    cfg.interfaces.push(InterfaceRecord::new(name));
                    section = Section::Interface(cfg.interfaces.len() - 1);
                }
                ["vrf", "context", name] => section = Section::VrfContext(name.to_string()),
                ["ip", "route", rest @ ..] => {
                    if let Some(route) = parse_ip_route("default", rest) {
                        cfg.static_routes.push(route);
                    }
                }
                _ => {}
            }
            continue;
        }

        match &section {
            Section::Vlan(ids) => match tokens.as_slice() {
                ["name", name] if ids.len() == 1 => {
                    if let Some(v) = vlans.get_mut(&ids[0]) {
                        v.name = Some(name.to_string());
                    }
                }
                ["shutdown"] | ["state", "suspend"] => {
                    for id in ids {
                        if let Some(v) = vlans.get_mut(id) {
                            v.shutdown = true;
                        }
                    }
                }
                _ => {}
            },
            Section::Interface(idx) => apply_interface_line(&mut cfg.interfaces[*idx], line.trim(), &tokens),
            Section::VrfContext(vrf) => {
                if let ["ip", "route", rest @ ..] = tokens.as_slice() {
                    if let Some(route) = parse_ip_route(vrf, rest) {
                        cfg.static_routes.push(route);
                    }
                }
            }
            Section::None => {}
        }
    }

    cfg.vlans = vlans.into_values().collect();
    cfg
}

fn apply_interface_line(iface: &mut InterfaceRecord, line: &str, tokens: &[&str]) {
    match tokens {
        ["description", ..] => {
            iface.description = Some(line["description".len()..].trim().to_string());
        }
        ["shutdown"] => iface.shutdown = true,
        ["no", "shutdown"] => iface.shutdown = false,
        ["mtu", n] => iface.mtu = n.parse().ok(),
        ["no", "switchport"] => iface.mode = Some(SwitchportMode::Routed),
        ["switchport", "mode", "access"] => iface.mode = Some(SwitchportMode::Access),
        ["switchport", "mode", "trunk"] => iface.mode = Some(SwitchportMode::Trunk),
        ["switchport", "access", "vlan", n] => iface.access_vlan = n.parse().ok(),
        ["switchport", "trunk", "native", "vlan", n] => iface.native_vlan = n.parse().ok(),
        ["switchport", "trunk", "allowed", "vlan", "add", list] => {
            let merged = match iface.trunk_allowed_vlans.take() {
                Some(existing) if existing != "all" && existing != "none" => format!("{},{}", existing, list),
                _ => list.to_string(),
            };
            iface.trunk_allowed_vlans = Some(merged);
        }
        ["switchport", "trunk", "allowed", "vlan", list] => {
            iface.trunk_allowed_vlans = Some(list.to_string());
        }
        // Secondaries follow the primary; only the primary is migrated
        ["ip", "address", addr, rest @ ..] if !rest.contains(&"secondary") => {
            iface.ipv4_address = Some(addr.to_string());
        }
        ["vrf", "member", vrf] => iface.vrf = Some(vrf.to_string()),
        ["channel-group", n, ..] => iface.channel_group = n.parse().ok(),
        ["vpc", "peer-link"] => iface.peer_link = true,
        ["vpc", n] => iface.vpc_id = n.parse().ok(),
        _ => {}
    }
}

/// `ip route <prefix> [<interface>] <next-hop> [name <name>] [tag <n>] [<pref>]`
fn parse_ip_route(vrf: &str, args: &[&str]) -> Option<StaticRoute> {
    let prefix = args.first()?;
    if !prefix.contains('/') {
        return None;
    }

    let mut hops: Vec<&str> = Vec::new();
    let mut name = None;
    let mut i = 1;
    while i < args.len() {
        match args[i] {
            "name" => {
                name = args.get(i + 1).map(|s| s.to_string());
                i += 2;
            }
            "tag" => i += 2,
            token if token.chars().all(|c| c.is_ascii_digit()) => i += 1,
            token => {
                hops.push(token);
                i += 1;
            }
        }
    }

    if hops.is_empty() {
        return None;
    }

    Some(StaticRoute {
        vrf: vrf.to_string(),
        prefix: prefix.to_string(),
        next_hop: hops.join(" "),
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterfaceKind;

    const RUNNING_CONFIG: &str = r#"
!Command: show running-config
version 10.3(2) Bios:version 05.47
hostname agg01

feature lacp
feature vpc
feature interface-vlan

vlan 1,10-12
vlan 10
  name web
vlan 12
  state suspend

vrf context management
  ip route 0.0.0.0/0 10.1.1.1
vrf context tenant-a
  ip route 172.16.0.0/16 10.20.0.1 name to-dc tag 100
ip route 10.99.0.0/16 Ethernet1/10 192.168.1.1 5

interface Vlan1

interface Vlan10
  no shutdown
  ip address 10.10.0.1/24
  vrf member tenant-a

interface port-channel1
  switchport mode trunk
  vpc peer-link

interface port-channel113
  description host-113
  switchport mode trunk
  switchport trunk allowed vlan 10-11
  switchport trunk allowed vlan add 12
  vpc 113

interface Ethernet1/4
  description server a
  switchport access vlan 10
  switchport mode access
  mtu 9216

interface Ethernet1/5
  switchport mode trunk
  channel-group 113 mode active

interface Ethernet1/10
  no switchport
  ip address 192.168.1.2/30
  shutdown

interface mgmt0
  vrf member management
  ip address 10.1.1.21/24
"#;

    #[test]
    fn test_features() {
        let cfg = parse_running_config(RUNNING_CONFIG);
        assert_eq!(cfg.features, vec!["lacp", "vpc", "interface-vlan"]);
    }

    #[test]
    fn test_vlans_expand_and_merge() {
        let cfg = parse_running_config(RUNNING_CONFIG);
        let ids: Vec<u16> = cfg.vlans.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![1, 10, 11, 12]);
        assert_eq!(cfg.vlans[1].name.as_deref(), Some("web"));
        assert!(cfg.vlans[3].shutdown);
        assert!(!cfg.vlans[2].shutdown);
    }

    #[test]
    fn test_interfaces() {
        let cfg = parse_running_config(RUNNING_CONFIG);
        let get = |n: &str| cfg.interfaces.iter().find(|i| i.name == n).unwrap();

        let po = get("port-channel113");
        assert_eq!(po.kind, InterfaceKind::PortChannel);
        assert_eq!(po.vpc_id, Some(113));
        assert_eq!(po.trunk_allowed_vlans.as_deref(), Some("10-11,12"));
        assert_eq!(po.description.as_deref(), Some("host-113"));

        assert!(get("port-channel1").peer_link);

        let e14 = get("Ethernet1/4");
        assert_eq!(e14.mode, Some(SwitchportMode::Access));
        assert_eq!(e14.access_vlan, Some(10));
        assert_eq!(e14.mtu, Some(9216));
        assert_eq!(e14.description.as_deref(), Some("server a"));

        assert_eq!(get("Ethernet1/5").channel_group, Some(113));

        let routed = get("Ethernet1/10");
        assert!(routed.is_routed());
        assert!(routed.shutdown);

        let svi = get("Vlan10");
        assert_eq!(svi.kind, InterfaceKind::Svi);
        assert_eq!(svi.vrf.as_deref(), Some("tenant-a"));
        assert_eq!(svi.ipv4_address.as_deref(), Some("10.10.0.1/24"));
    }

    #[test]
    fn test_secondary_address_keeps_primary() {
        let cfg = parse_running_config(
            "interface Vlan10\n  ip address 10.10.0.1/24\n  ip address 10.20.0.1/24 secondary\n  ip address 10.30.0.1/24 secondary tag 5\n",
        );
        assert_eq!(cfg.interfaces[0].ipv4_address.as_deref(), Some("10.10.0.1/24"));
    }

    #[test]
    fn test_static_routes() {
        let cfg = parse_running_config(RUNNING_CONFIG);
        assert_eq!(cfg.static_routes.len(), 3);
        let tenant = cfg.static_routes.iter().find(|r| r.vrf == "tenant-a").unwrap();
        assert_eq!(tenant.next_hop, "10.20.0.1");
        assert_eq!(tenant.name.as_deref(), Some("to-dc"));
        let global = cfg.static_routes.iter().find(|r| r.vrf == "default").unwrap();
        assert_eq!(global.prefix, "10.99.0.0/16");
        assert_eq!(global.next_hop, "Ethernet1/10 192.168.1.1");
    }

    #[test]
    fn test_expand_vlan_range() {
        assert_eq!(expand_vlan_range("10-12,20"), Some(vec![10, 11, 12, 20]));
        assert_eq!(expand_vlan_range("5"), Some(vec![5]));
        assert_eq!(expand_vlan_range("configuration"), None);
        assert_eq!(expand_vlan_range("12-10"), None);
        assert_eq!(expand_vlan_range("4095"), None);
    }

    #[test]
    fn test_show_version() {
        let info = parse_show_version(
            r#"{"host_name": "agg01", "proc_board_id": "FDO2231", "chassis_id": "Nexus9000 C93180YC-FX Chassis", "kickstart_ver_str": "10.3(2)"}"#,
        )
        .unwrap();
        assert_eq!(info.hostname.as_deref(), Some("agg01"));
        assert_eq!(info.serial.as_deref(), Some("FDO2231"));
        assert_eq!(info.version.as_deref(), Some("10.3(2)"));
        assert!(parse_show_version("% Invalid command").is_err());
    }
}
