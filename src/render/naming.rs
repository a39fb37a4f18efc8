//! Interface naming transforms between NX-OS and NDFC spellings.
//! Every transform here is idempotent: feeding it its own output is a no-op.

/// VPC id reserved for the VPC domain definition itself
pub const RESERVED_VPC_ID: u16 = 1;

fn strip_prefix_ci<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &name[prefix.len()..])
}

/// Numeric id of a port-channel written as `port-channel113`, `Port-channel113`,
/// `po113`, `vpc113` or plain `113`
pub fn port_channel_id(name: &str) -> Option<u16> {
    let name = name.trim();
    let digits = ["port-channel", "vpc", "po"]
        .iter()
        .find_map(|p| strip_prefix_ci(name, p))
        .unwrap_or(name);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `port-channel113` -> `vpc113`. Names that are not port-channels pass through unchanged.
pub fn vpc_name(name: &str) -> String {
    match port_channel_id(name) {
        Some(id) => format!("vpc{}", id),
        None => name.to_string(),
    }
}

/// `port-channel113` -> `Port-channel113`, the spelling NDFC reads back
pub fn port_channel_name(id: u16) -> String {
    format!("Port-channel{}", id)
}

/// Slot/port part of an Ethernet name in any of its spellings
fn ethernet_suffix(name: &str) -> Option<&str> {
    let name = name.trim();
    let rest = strip_prefix_ci(name, "ethernet")
        .or_else(|| strip_prefix_ci(name, "eth"))
        .or_else(|| strip_prefix_ci(name, "e"))?;
    let valid = rest.starts_with(|c: char| c.is_ascii_digit())
        && rest.contains('/')
        && rest.chars().all(|c| c.is_ascii_digit() || c == '/');
    if valid {
        Some(rest)
    } else {
        None
    }
}

/// `Ethernet1/4` -> `e1/4`. Non-Ethernet names pass through unchanged.
pub fn short_ethernet(name: &str) -> String {
    match ethernet_suffix(name) {
        Some(rest) => format!("e{}", rest),
        None => name.to_string(),
    }
}

/// `e1/4` -> `Ethernet1/4`, the inverse of `short_ethernet`
pub fn expand_ethernet(name: &str) -> String {
    match ethernet_suffix(name) {
        Some(rest) => format!("Ethernet{}", rest),
        None => name.to_string(),
    }
}

/// Comma-joined short member list as NDFC port-channel policies expect it
pub fn member_list(members: &[String]) -> String {
    members
        .iter()
        .map(|m| short_ethernet(m))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_patterns() {
        assert_eq!(vpc_name("port-channel113"), "vpc113");
        assert_eq!(short_ethernet("Ethernet1/4"), "e1/4");
    }

    #[test]
    fn test_transforms_are_idempotent() {
        for name in ["port-channel113", "Port-channel7", "po20", "vpc5", "Ethernet1/4", "loopback0"] {
            let once = vpc_name(name);
            assert_eq!(vpc_name(&once), once);
        }
        for name in ["Ethernet1/4", "Eth1/1/2", "e1/4", "Vlan10", "mgmt0"] {
            let once = short_ethernet(name);
            assert_eq!(short_ethernet(&once), once);
        }
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(expand_ethernet(&short_ethernet("Ethernet1/4")), "Ethernet1/4");
        assert_eq!(expand_ethernet(&short_ethernet("Ethernet1/1/4")), "Ethernet1/1/4");
        assert_eq!(port_channel_id(&vpc_name("port-channel113")), Some(113));
        assert_eq!(port_channel_name(port_channel_id("port-channel113").unwrap()), "Port-channel113");
    }

    #[test]
    fn test_non_matching_names_pass_through() {
        assert_eq!(vpc_name("Ethernet1/4"), "Ethernet1/4");
        assert_eq!(vpc_name("port-channel"), "port-channel");
        assert_eq!(short_ethernet("eth-uplink"), "eth-uplink");
        assert_eq!(short_ethernet("Vlan10"), "Vlan10");
        assert_eq!(expand_ethernet("loopback0"), "loopback0");
    }

    #[test]
    fn test_member_list() {
        let members = vec!["Ethernet1/1".to_string(), "Ethernet1/2".to_string()];
        assert_eq!(member_list(&members), "e1/1,e1/2");
    }
}
