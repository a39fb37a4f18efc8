//! Policy renderer: pure mapping from profiles and inventory records to
//! NDFC payloads. Nothing here talks to the network.

pub mod naming;

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use tera::{Context, Tera};

use crate::apply::DesiredResource;
use crate::models::{
    FabricDefinition, InterfaceKind, InterfaceRecord, PoapTriplet, StaticRoute, SwitchProfile, SwitchRecord,
    SwitchportMode, VpcDomain,
};
use crate::ndfc::types::{
    interface_type, pair_serial, DiscoverPayload, DiscoverSwitch, FabricPayload, InterfaceEntry, InterfacePayload,
    NdPoapSwitch, PoapPayload, PolicyPayload, VpcPairPayload,
};
use naming::{expand_ethernet, member_list, port_channel_id, port_channel_name, vpc_name, RESERVED_VPC_ID};

/// Policy descriptions start with this; the rest identifies the instance
pub const DESCRIPTION_PREFIX: &str = "ndfc-migrate";

pub mod template {
    pub const CREATE_VLAN: &str = "create_vlan";
    pub const FREEFORM: &str = "switch_freeform";
    pub const VPC_PAIR: &str = "vpc_pair";
    pub const ACCESS_HOST: &str = "int_access_host";
    pub const TRUNK_HOST: &str = "int_trunk_host";
    pub const ROUTED_HOST: &str = "int_routed_host";
    pub const PO_ACCESS_HOST: &str = "int_port_channel_access_host";
    pub const PO_TRUNK_HOST: &str = "int_port_channel_trunk_host";
    pub const L3_PORT_CHANNEL: &str = "int_l3_port_channel";
    pub const VPC_ACCESS_HOST: &str = "int_vpc_access_host";
    pub const VPC_TRUNK_HOST: &str = "int_vpc_trunk_host";
    pub const SVI: &str = "int_vlan";
    pub const LOOPBACK: &str = "int_loopback";
}

const FEATURES_TEMPLATE: &str = "{% for feature in features %}feature {{ feature }}\n{% endfor %}";

const STATIC_ROUTES_TEMPLATE: &str = r#"{% if vrf != "default" %}vrf context {{ vrf }}
{% endif %}{% for route in routes %}{% if vrf != "default" %}  {% endif %}ip route {{ route.prefix }} {{ route.next_hop }}{% if route.name %} name {{ route.name }}{% endif %}
{% endfor %}"#;

fn description(what: &str) -> String {
    format!("{} {}", DESCRIPTION_PREFIX, what)
}

/// Renders the freeform CLI bodies with tera; payload builders below are plain functions
pub struct PolicyRenderer {
    tera: Tera,
}

impl PolicyRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("features", FEATURES_TEMPLATE)
            .map_err(|e| anyhow!("Invalid features template: {}", e))?;
        tera.add_raw_template("static_routes", STATIC_ROUTES_TEMPLATE)
            .map_err(|e| anyhow!("Invalid static routes template: {}", e))?;
        Ok(Self { tera })
    }

    fn render(&self, name: &str, context: &Context) -> Result<String> {
        self.tera
            .render(name, context)
            .map_err(|e| anyhow!("Template rendering failed: {}", e))
    }

    /// One freeform policy carrying every `feature` line of the switch
    pub fn feature_policy(&self, serial: &str, profile: &SwitchProfile) -> Result<Option<DesiredResource>> {
        if profile.features.is_empty() {
            return Ok(None);
        }
        let mut context = Context::new();
        context.insert("features", &profile.features);
        let conf = self.render("features", &context)?;

        let mut nv_pairs = BTreeMap::new();
        nv_pairs.insert("CONF".to_string(), conf);
        Ok(Some(DesiredResource::Policy(PolicyPayload::new(
            serial,
            template::FREEFORM,
            &description("features"),
            nv_pairs,
        ))))
    }

    /// One freeform policy per VRF holding that VRF's static routes
    pub fn static_route_policies(&self, serial: &str, profile: &SwitchProfile) -> Result<Vec<DesiredResource>> {
        let mut by_vrf: BTreeMap<&str, Vec<&StaticRoute>> = BTreeMap::new();
        for route in &profile.static_routes {
            by_vrf.entry(route.vrf.as_str()).or_default().push(route);
        }

        let mut policies = Vec::new();
        for (vrf, routes) in by_vrf {
            let mut context = Context::new();
            context.insert("vrf", vrf);
            context.insert("routes", &routes);
            let conf = self.render("static_routes", &context)?;

            let mut nv_pairs = BTreeMap::new();
            nv_pairs.insert("CONF".to_string(), conf);
            policies.push(DesiredResource::Policy(PolicyPayload::new(
                serial,
                template::FREEFORM,
                &description(&format!("static routes vrf {}", vrf)),
                nv_pairs,
            )));
        }
        Ok(policies)
    }
}

// --- Fabric and switch onboarding ---

pub fn fabric_resource(def: &FabricDefinition) -> DesiredResource {
    let mut nv_pairs = BTreeMap::new();
    nv_pairs.insert("FABRIC_NAME".to_string(), def.name.clone());
    if let Some(asn) = &def.bgp_asn {
        nv_pairs.insert("BGP_AS".to_string(), asn.clone());
    }
    if let Some(mode) = &def.replication_mode {
        nv_pairs.insert("REPLICATION_MODE".to_string(), mode.clone());
    }
    // Explicit nvPairs from the definition file win
    nv_pairs.extend(def.nv_pairs.clone());

    DesiredResource::Fabric(FabricPayload {
        name: def.name.clone(),
        template: def.template.clone(),
        nv_pairs,
    })
}

fn poap_payload(sw: &SwitchRecord, triplet: &PoapTriplet, fabric: &FabricDefinition, password: &str) -> Result<PoapPayload> {
    let gateway = fabric
        .mgmt_gateway
        .as_deref()
        .ok_or_else(|| anyhow!("fabric {} has no mgmt_gateway for POAP", fabric.name))?;
    let data = serde_json::json!({
        "modulesModel": [triplet.model],
        "gateway": gateway,
    });

    Ok(PoapPayload {
        serial_number: triplet.serial.clone(),
        model: triplet.model.clone(),
        version: triplet.version.clone(),
        hostname: sw.hostname.clone(),
        ip_address: sw.ansible_host.clone(),
        password: password.to_string(),
        discovery_auth_protocol: 0,
        role: sw.role.clone(),
        data: data.to_string(),
        fingerprint: None,
        public_key: None,
        re_add: None,
    })
}

pub fn preprovision_resource(
    sw: &SwitchRecord,
    triplet: &PoapTriplet,
    fabric: &FabricDefinition,
    password: &str,
) -> Result<DesiredResource> {
    Ok(DesiredResource::Preprovision(poap_payload(sw, triplet, fabric, password)?))
}

/// Bootstrap reuses the pre-provision entry plus what the switch reported on check-in
pub fn bootstrap_payload(
    sw: &SwitchRecord,
    triplet: &PoapTriplet,
    waiting: &NdPoapSwitch,
    fabric: &FabricDefinition,
    password: &str,
) -> Result<PoapPayload> {
    let mut payload = poap_payload(sw, triplet, fabric, password)?;
    if let Some(version) = &waiting.version {
        payload.version = version.clone();
    }
    payload.fingerprint = waiting.fingerprint.clone();
    payload.public_key = waiting.public_key.clone();
    payload.re_add = Some(false);
    Ok(payload)
}

pub fn discover_resource(sw: &SwitchRecord, username: &str, password: &str) -> DesiredResource {
    let profile = sw.profile.as_ref();
    DesiredResource::Discover(DiscoverPayload {
        seed_ip: sw.ansible_host.clone(),
        username: username.to_string(),
        password: password.to_string(),
        max_hops: 0,
        cdp_second_timeout: 5,
        // Brownfield import: keep the running config
        preserve_config: true,
        switches: vec![DiscoverSwitch {
            ipaddr: sw.ansible_host.clone(),
            sys_name: sw.hostname.clone(),
            serial_number: profile.and_then(|p| p.serial.clone()),
            platform: profile.and_then(|p| p.model.clone()),
            version: profile.and_then(|p| p.version.clone()),
        }],
    })
}

// --- VLANs and VPC ---

pub fn vlan_policies(serial: &str, profile: &SwitchProfile) -> Vec<DesiredResource> {
    profile
        .vlans
        .iter()
        .filter(|v| v.id != 1)
        .map(|v| {
            let mut nv_pairs = BTreeMap::new();
            nv_pairs.insert("VLAN_ID".to_string(), v.id.to_string());
            nv_pairs.insert("NAME".to_string(), v.name.clone().unwrap_or_default());
            nv_pairs.insert("ADMIN_STATE".to_string(), (!v.shutdown).to_string());
            DesiredResource::Policy(PolicyPayload::new(
                serial,
                template::CREATE_VLAN,
                &description(&format!("vlan {}", v.id)),
                nv_pairs,
            ))
        })
        .collect()
}

pub fn vpc_pair_resource(domain: &VpcDomain, serial1: &str, serial2: &str) -> DesiredResource {
    let members = member_list(&domain.peer_link_members);
    let mut nv_pairs = BTreeMap::new();
    nv_pairs.insert("DOMAIN_ID".to_string(), domain.domain_id.to_string());
    nv_pairs.insert("PEER1_PCID".to_string(), domain.peer_link_po.to_string());
    nv_pairs.insert("PEER2_PCID".to_string(), domain.peer_link_po.to_string());
    nv_pairs.insert("PEER1_MEMBER_INTERFACES".to_string(), members.clone());
    nv_pairs.insert("PEER2_MEMBER_INTERFACES".to_string(), members);
    nv_pairs.insert("KEEP_ALIVE_VRF".to_string(), domain.keepalive_vrf.clone());

    DesiredResource::VpcPair(VpcPairPayload {
        peer_one_id: serial1.to_string(),
        peer_two_id: serial2.to_string(),
        use_virtual_peerlink: false,
        template_name: template::VPC_PAIR.to_string(),
        nv_pairs,
    })
}

// --- Interfaces ---

/// NDFC host policies take "jumbo"/"default" rather than a number
fn host_mtu(mtu: Option<u32>) -> String {
    match mtu {
        Some(9216) => "jumbo".to_string(),
        None | Some(1500) => "default".to_string(),
        Some(other) => other.to_string(),
    }
}

fn split_ipv4(address: &str) -> (String, String) {
    match address.split_once('/') {
        Some((ip, prefix)) => (ip.to_string(), prefix.to_string()),
        None => (address.to_string(), "32".to_string()),
    }
}

/// Switchport mode as configured, or inferred from the VLAN settings present
fn effective_mode(iface: &InterfaceRecord) -> Option<SwitchportMode> {
    if iface.is_routed() {
        return Some(SwitchportMode::Routed);
    }
    iface.mode.or_else(|| {
        if iface.access_vlan.is_some() {
            Some(SwitchportMode::Access)
        } else if iface.trunk_allowed_vlans.is_some() || iface.native_vlan.is_some() {
            Some(SwitchportMode::Trunk)
        } else {
            None
        }
    })
}

fn common_nv_pairs(if_name: &str, iface: &InterfaceRecord) -> BTreeMap<String, String> {
    let mut nv = BTreeMap::new();
    nv.insert("INTF_NAME".to_string(), if_name.to_string());
    nv.insert("DESC".to_string(), iface.description.clone().unwrap_or_default());
    nv.insert("ADMIN_STATE".to_string(), (!iface.shutdown).to_string());
    nv.insert("CONF".to_string(), String::new());
    nv
}

fn insert_l2(nv: &mut BTreeMap<String, String>, prefix: &str, mode: SwitchportMode, iface: &InterfaceRecord) {
    match mode {
        SwitchportMode::Access => {
            nv.insert(
                format!("{}ACCESS_VLAN", prefix),
                iface.access_vlan.map(|v| v.to_string()).unwrap_or_default(),
            );
        }
        SwitchportMode::Trunk => {
            nv.insert(
                format!("{}ALLOWED_VLANS", prefix),
                iface.trunk_allowed_vlans.clone().unwrap_or_else(|| "all".to_string()),
            );
            nv.insert(
                format!("{}NATIVE_VLAN", prefix),
                iface.native_vlan.map(|v| v.to_string()).unwrap_or_default(),
            );
        }
        SwitchportMode::Routed => {}
    }
}

fn insert_l3(nv: &mut BTreeMap<String, String>, iface: &InterfaceRecord) {
    let (ip, prefix) = iface
        .ipv4_address
        .as_deref()
        .map(split_ipv4)
        .unwrap_or_default();
    nv.insert("IP".to_string(), ip);
    nv.insert("PREFIX".to_string(), prefix);
    nv.insert("INTF_VRF".to_string(), iface.vrf.clone().unwrap_or_default());
    nv.insert("MTU".to_string(), iface.mtu.unwrap_or(9216).to_string());
}

fn interface_resource(
    fabric: &str,
    serial: &str,
    if_name: String,
    policy: &str,
    itype: &str,
    nv_pairs: BTreeMap<String, String>,
) -> DesiredResource {
    DesiredResource::Interface(InterfacePayload {
        policy: policy.to_string(),
        interface_type: itype.to_string(),
        interfaces: vec![InterfaceEntry {
            serial_number: serial.to_string(),
            if_name,
            interface_type: itype.to_string(),
            fabric_name: fabric.to_string(),
            nv_pairs,
        }],
        skip_resource_check: false,
    })
}

/// Per-switch interface payloads. VPC port-channels are left to
/// `vpc_interface_resources`, which needs both peers.
pub fn interface_resources(fabric: &str, serial: &str, profile: &SwitchProfile) -> Vec<DesiredResource> {
    let mut out = Vec::new();

    for iface in &profile.interfaces {
        if iface.vpc_id.is_some() {
            continue;
        }
        let mode = effective_mode(iface);

        let rendered = match (iface.kind, mode) {
            (InterfaceKind::Ethernet, Some(mode)) => {
                let if_name = expand_ethernet(&iface.name);
                let mut nv = common_nv_pairs(&if_name, iface);
                let policy = match mode {
                    SwitchportMode::Access => template::ACCESS_HOST,
                    SwitchportMode::Trunk => template::TRUNK_HOST,
                    SwitchportMode::Routed => template::ROUTED_HOST,
                };
                if mode == SwitchportMode::Routed {
                    insert_l3(&mut nv, iface);
                } else {
                    nv.insert("MTU".to_string(), host_mtu(iface.mtu));
                    insert_l2(&mut nv, "", mode, iface);
                }
                Some((if_name, policy, interface_type::ETHERNET, nv))
            }
            (InterfaceKind::PortChannel, Some(mode)) => port_channel_id(&iface.name).map(|id| {
                let if_name = port_channel_name(id);
                let mut nv = common_nv_pairs(&if_name, iface);
                nv.insert("PO_ID".to_string(), if_name.clone());
                nv.insert("MEMBER_INTERFACES".to_string(), member_list(&iface.members));
                nv.insert("PC_MODE".to_string(), "active".to_string());
                let policy = match mode {
                    SwitchportMode::Access => template::PO_ACCESS_HOST,
                    SwitchportMode::Trunk => template::PO_TRUNK_HOST,
                    SwitchportMode::Routed => template::L3_PORT_CHANNEL,
                };
                if mode == SwitchportMode::Routed {
                    insert_l3(&mut nv, iface);
                } else {
                    nv.insert("MTU".to_string(), host_mtu(iface.mtu));
                    insert_l2(&mut nv, "", mode, iface);
                }
                (if_name, policy, interface_type::PORT_CHANNEL, nv)
            }),
            (InterfaceKind::Svi, _) => {
                let if_name = iface.name.to_lowercase();
                let mut nv = common_nv_pairs(&if_name, iface);
                insert_l3(&mut nv, iface);
                Some((if_name, template::SVI, interface_type::VLAN, nv))
            }
            (InterfaceKind::Loopback, _) => {
                let if_name = iface.name.to_lowercase();
                let mut nv = common_nv_pairs(&if_name, iface);
                let (ip, _) = iface.ipv4_address.as_deref().map(split_ipv4).unwrap_or_default();
                nv.insert("IP".to_string(), ip);
                nv.insert("INTF_VRF".to_string(), iface.vrf.clone().unwrap_or_default());
                Some((if_name, template::LOOPBACK, interface_type::LOOPBACK, nv))
            }
            _ => None,
        };

        match rendered {
            Some((if_name, policy, itype, nv)) => {
                out.push(interface_resource(fabric, serial, if_name, policy, itype, nv));
            }
            None => tracing::debug!("{}: nothing to migrate on {}", profile.hostname, iface.name),
        }
    }
    out
}

/// VPC port-channel payloads for one domain. A port-channel is rendered only
/// when both peers carry the same VPC id. VPC id 1 and the peer-link are never rendered.
pub fn vpc_interface_resources(
    fabric: &str,
    domain: &VpcDomain,
    peer_a: (&str, &SwitchProfile),
    peer_b: (&str, &SwitchProfile),
) -> Vec<DesiredResource> {
    // PEER1 is always the lower serial so the pair key is stable
    let ((serial1, p1), (serial2, p2)) = if peer_a.0 <= peer_b.0 { (peer_a, peer_b) } else { (peer_b, peer_a) };
    let pair = pair_serial(serial1, serial2);
    let mut out = Vec::new();

    for po1 in p1.interfaces.iter().filter(|i| i.kind == InterfaceKind::PortChannel) {
        let Some(vpc_id) = po1.vpc_id else { continue };
        let Some(pc_id) = port_channel_id(&po1.name) else { continue };
        if vpc_id == RESERVED_VPC_ID || pc_id == RESERVED_VPC_ID || pc_id == domain.peer_link_po {
            continue;
        }
        let Some(po2) = p2
            .interfaces
            .iter()
            .find(|i| i.kind == InterfaceKind::PortChannel && i.vpc_id == Some(vpc_id))
        else {
            tracing::warn!("vpc {} on {} has no counterpart on {}; skipped", vpc_id, p1.hostname, p2.hostname);
            continue;
        };
        let Some(mode) = effective_mode(po1).filter(|m| *m != SwitchportMode::Routed) else {
            tracing::warn!("vpc {} on {} is not a layer-2 port-channel; skipped", vpc_id, p1.hostname);
            continue;
        };

        let if_name = vpc_name(&po1.name);
        let mut nv = BTreeMap::new();
        nv.insert("INTF_NAME".to_string(), if_name.clone());
        nv.insert("PEER1_PCID".to_string(), pc_id.to_string());
        nv.insert(
            "PEER2_PCID".to_string(),
            port_channel_id(&po2.name).unwrap_or(pc_id).to_string(),
        );
        nv.insert("PEER1_MEMBER_INTERFACES".to_string(), member_list(&po1.members));
        nv.insert("PEER2_MEMBER_INTERFACES".to_string(), member_list(&po2.members));
        nv.insert("PEER1_PO_DESC".to_string(), po1.description.clone().unwrap_or_default());
        nv.insert("PEER2_PO_DESC".to_string(), po2.description.clone().unwrap_or_default());
        nv.insert("PC_MODE".to_string(), "active".to_string());
        nv.insert("MTU".to_string(), host_mtu(po1.mtu));
        nv.insert("ADMIN_STATE".to_string(), (!po1.shutdown).to_string());
        insert_l2(&mut nv, "PEER1_", mode, po1);
        insert_l2(&mut nv, "PEER2_", mode, po2);

        let policy = match mode {
            SwitchportMode::Access => template::VPC_ACCESS_HOST,
            _ => template::VPC_TRUNK_HOST,
        };
        out.push(interface_resource(fabric, &pair, if_name, policy, interface_type::VPC, nv));
    }
    out
}
