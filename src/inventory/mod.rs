use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::parse_bool;
use crate::models::{switch_role, SwitchRecord};
use crate::onboarding::{self, OnboardingMode, SkipReason};

/// Typed error for an inventory host that cannot become a SwitchRecord.
/// Only that host is excluded; the rest of the inventory still loads.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryError {
    pub hostname: String,
    pub reason: String,
}

impl InventoryError {
    pub fn new(hostname: &str, reason: impl Into<String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for InventoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inventory host {}: {}", self.hostname, self.reason)
    }
}

impl std::error::Error for InventoryError {}

/// Inventory is the loaded set of switches plus the hosts that were rejected
#[derive(Debug, Default)]
pub struct Inventory {
    pub switches: Vec<SwitchRecord>,
    pub rejected: Vec<InventoryError>,
}

impl Inventory {
    pub fn get(&self, hostname: &str) -> Option<&SwitchRecord> {
        self.switches.iter().find(|s| s.hostname == hostname)
    }

    /// Switches with a partial POAP triplet, with the fields they are missing.
    /// They stay in the inventory but are never onboarded.
    pub fn incomplete_poap(&self) -> Vec<(&str, Vec<&'static str>)> {
        self.switches
            .iter()
            .filter_map(|sw| match onboarding::classify(sw) {
                OnboardingMode::Skip(SkipReason::IncompletePoap { missing }) => {
                    Some((sw.hostname.as_str(), missing))
                }
                _ => None,
            })
            .collect()
    }

    /// Distinct fabric names, in order of first appearance
    pub fn fabrics(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for sw in &self.switches {
            if !names.contains(&sw.fabric) {
                names.push(sw.fabric.clone());
            }
        }
        names
    }
}

// Ansible YAML inventory layout: groups with vars, hosts and nested children
#[derive(Debug, Default, Deserialize)]
struct InventoryGroup {
    #[serde(default)]
    vars: BTreeMap<String, Value>,
    #[serde(default)]
    hosts: BTreeMap<String, Option<BTreeMap<String, Value>>>,
    #[serde(default)]
    children: BTreeMap<String, Option<InventoryGroup>>,
}

/// Load and validate an inventory file
pub fn load_inventory(path: impl AsRef<Path>) -> Result<Inventory> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;
    let inventory = parse_inventory(&content)
        .with_context(|| format!("Failed to parse inventory {}", path.display()))?;

    for err in &inventory.rejected {
        tracing::warn!("{}", err);
    }
    for (hostname, missing) in inventory.incomplete_poap() {
        tracing::warn!(
            "{}: incomplete POAP fields, missing {}; it will not be onboarded",
            hostname,
            missing.join(", ")
        );
    }
    tracing::info!(
        "Loaded {} switches from {} ({} rejected)",
        inventory.switches.len(),
        path.display(),
        inventory.rejected.len()
    );
    Ok(inventory)
}

/// Vars collected for one host: everything inherited from its groups, and
/// its own vars, which are merged last.
#[derive(Debug, Default)]
struct HostVars {
    groups: BTreeMap<String, Value>,
    own: BTreeMap<String, Value>,
}

impl HostVars {
    fn merged(self) -> BTreeMap<String, Value> {
        let mut vars = self.groups;
        vars.extend(self.own);
        vars
    }
}

/// Parse inventory YAML. Group vars are inherited by descendant hosts and
/// host vars override them. A host listed in several groups merges all of them.
pub fn parse_inventory(content: &str) -> Result<Inventory> {
    let groups: BTreeMap<String, Option<InventoryGroup>> = serde_yaml::from_str(content)?;

    let mut order: Vec<String> = Vec::new();
    let mut collected: BTreeMap<String, HostVars> = BTreeMap::new();

    for group in groups.into_values().flatten() {
        collect_hosts(group, &BTreeMap::new(), &mut order, &mut collected);
    }

    let mut inventory = Inventory::default();
    for hostname in order {
        let vars = collected.remove(&hostname).unwrap_or_default().merged();
        match build_switch(&hostname, &vars) {
            Ok(sw) => inventory.switches.push(sw),
            Err(e) => inventory.rejected.push(e),
        }
    }
    Ok(inventory)
}

fn collect_hosts(
    group: InventoryGroup,
    inherited: &BTreeMap<String, Value>,
    order: &mut Vec<String>,
    collected: &mut BTreeMap<String, HostVars>,
) {
    let mut scope = inherited.clone();
    scope.extend(group.vars);

    for (hostname, host_vars) in group.hosts {
        let entry = collected.entry(hostname.clone()).or_insert_with(|| {
            order.push(hostname.clone());
            HostVars::default()
        });
        entry.groups.extend(scope.clone());
        entry.own.extend(host_vars.unwrap_or_default());
    }

    for child in group.children.into_values().flatten() {
        collect_hosts(child, &scope, order, collected);
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn build_switch(hostname: &str, vars: &BTreeMap<String, Value>) -> Result<SwitchRecord, InventoryError> {
    let get = |key: &str| vars.get(key).and_then(value_to_string);
    let required = |key: &str| {
        get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| InventoryError::new(hostname, format!("missing required field '{}'", key)))
    };

    let ansible_host = required("ansible_host")?;
    let fabric = required("fabric")?;
    let role = required("role")?;

    if !switch_role::is_valid(&role) {
        return Err(InventoryError::new(hostname, format!("unknown role '{}'", role)));
    }
    if !crate::utils::is_valid_ipv4(&ansible_host) {
        return Err(InventoryError::new(hostname, format!("ansible_host '{}' is not an IPv4 address", ansible_host)));
    }
    if !crate::utils::is_valid_hostname(hostname) {
        return Err(InventoryError::new(hostname, "invalid hostname"));
    }

    let add_to_fabric = match vars.get("add_to_fabric") {
        Some(Value::Bool(b)) => *b,
        Some(other) => value_to_string(other).map(|s| parse_bool(&s)).unwrap_or(false),
        None => false,
    };

    Ok(SwitchRecord {
        hostname: hostname.to_string(),
        ansible_host,
        fabric,
        role,
        add_to_fabric,
        destination_switch_sn: get("destination_switch_sn"),
        destination_switch_model: get("destination_switch_model"),
        destination_switch_version: get("destination_switch_version"),
        ssh_user: get("ansible_user"),
        ssh_pass: get("ansible_password"),
        profile: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
all:
  vars:
    ansible_user: admin
    add_to_fabric: true
  children:
    site1:
      vars:
        fabric: site1
      hosts:
        leaf01:
          ansible_host: 10.1.1.11
          role: leaf
          destination_switch_sn: FDO1234
          destination_switch_model: N9K-C93180YC-FX
          destination_switch_version: "10.3(2)"
        agg01:
          ansible_host: 10.1.1.21
          role: aggregation
          add_to_fabric: "no"
    site2:
      vars:
        fabric: site2
      hosts:
        spine01:
          ansible_host: 10.2.1.1
          role: spine
          ansible_user: netops
        broken01:
          role: leaf
"#;

    #[test]
    fn test_group_vars_inherited() {
        let inv = parse_inventory(INVENTORY).unwrap();
        let leaf = inv.get("leaf01").unwrap();
        assert_eq!(leaf.fabric, "site1");
        assert_eq!(leaf.ansible_host, "10.1.1.11");
        assert!(leaf.add_to_fabric);
        assert_eq!(leaf.ssh_user.as_deref(), Some("admin"));
        assert_eq!(leaf.destination_switch_version.as_deref(), Some("10.3(2)"));
    }

    #[test]
    fn test_host_vars_override_group_vars() {
        let inv = parse_inventory(INVENTORY).unwrap();
        assert!(!inv.get("agg01").unwrap().add_to_fabric);
        assert_eq!(inv.get("spine01").unwrap().ssh_user.as_deref(), Some("netops"));
    }

    #[test]
    fn test_missing_required_field_rejects_host_only() {
        let inv = parse_inventory(INVENTORY).unwrap();
        assert_eq!(inv.switches.len(), 3);
        assert_eq!(inv.rejected.len(), 1);
        assert_eq!(inv.rejected[0].hostname, "broken01");
        assert!(inv.rejected[0].reason.contains("ansible_host"));
    }

    #[test]
    fn test_fabrics_in_first_seen_order() {
        let inv = parse_inventory(INVENTORY).unwrap();
        assert_eq!(inv.fabrics(), vec!["site1".to_string(), "site2".to_string()]);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let inv = parse_inventory(
            "all:\n  hosts:\n    x1:\n      ansible_host: 10.0.0.1\n      fabric: f\n      role: router\n",
        )
        .unwrap();
        assert!(inv.switches.is_empty());
        assert!(inv.rejected[0].reason.contains("unknown role"));
    }

    #[test]
    fn test_non_ip_ansible_host_rejected() {
        let inv = parse_inventory(
            "all:\n  hosts:\n    x1:\n      ansible_host: x1.example.net\n      fabric: f\n      role: leaf\n",
        )
        .unwrap();
        assert!(inv.switches.is_empty());
        assert!(inv.rejected[0].reason.contains("IPv4"));
    }

    #[test]
    fn test_host_in_two_groups_merges() {
        let inv = parse_inventory(
            r#"
all:
  children:
    leafs:
      vars: { role: leaf }
      hosts:
        leaf09:
    site9:
      vars: { fabric: site9 }
      hosts:
        leaf09: { ansible_host: 10.9.9.9 }
"#,
        )
        .unwrap();
        let sw = inv.get("leaf09").unwrap();
        assert_eq!(sw.role, "leaf");
        assert_eq!(sw.fabric, "site9");
        assert!(!sw.add_to_fabric);
    }

    #[test]
    fn test_host_vars_win_over_a_later_group() {
        // site9 sorts before zzleafs, so zzleafs' vars are merged after sp01's own
        let inv = parse_inventory(
            r#"
all:
  children:
    site9:
      vars: { fabric: site9 }
      hosts:
        sp01: { ansible_host: 10.9.9.1, role: spine, destination_switch_sn: FDO9 }
    zzleafs:
      vars: { role: leaf, destination_switch_sn: FDO0 }
      hosts:
        sp01:
"#,
        )
        .unwrap();
        let sw = inv.get("sp01").unwrap();
        assert_eq!(sw.role, "spine");
        assert_eq!(sw.destination_switch_sn.as_deref(), Some("FDO9"));
        assert_eq!(sw.fabric, "site9");
    }

    #[test]
    fn test_partial_triplet_detected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yml");
        std::fs::write(
            &path,
            r#"
all:
  vars: { fabric: site1, add_to_fabric: true }
  hosts:
    leaf01:
      ansible_host: 10.1.1.11
      role: leaf
      destination_switch_sn: FDO1
      destination_switch_model: N9K-C93180YC-FX
      destination_switch_version: "10.3(2)"
    leaf03:
      ansible_host: 10.1.1.13
      role: leaf
      destination_switch_sn: FDO3
    agg01:
      ansible_host: 10.1.1.21
      role: aggregation
"#,
        )
        .unwrap();

        let inv = load_inventory(&path).unwrap();
        assert_eq!(inv.switches.len(), 3);
        assert_eq!(
            inv.incomplete_poap(),
            vec![("leaf03", vec!["destination_switch_model", "destination_switch_version"])]
        );
    }
}
