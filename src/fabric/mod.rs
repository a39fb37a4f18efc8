use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::FabricDefinition;

#[derive(Debug, Deserialize)]
struct FabricFile {
    #[serde(default)]
    fabrics: Vec<FabricDefinition>,
}

/// Load the fabric definition file
pub fn load_fabrics(path: impl AsRef<Path>) -> Result<Vec<FabricDefinition>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fabric definitions {}", path.display()))?;
    parse_fabrics(&content).with_context(|| format!("Invalid fabric definitions in {}", path.display()))
}

pub fn parse_fabrics(content: &str) -> Result<Vec<FabricDefinition>> {
    let file: FabricFile = serde_yaml::from_str(content)?;

    for (i, fabric) in file.fabrics.iter().enumerate() {
        if fabric.name.trim().is_empty() {
            anyhow::bail!("fabric #{} has an empty name", i);
        }
        if file.fabrics[..i].iter().any(|f| f.name == fabric.name) {
            anyhow::bail!("fabric '{}' is defined twice", fabric.name);
        }
        for domain in &fabric.vpc_domains {
            if domain.peer1 == domain.peer2 {
                anyhow::bail!(
                    "fabric '{}': vpc domain {} pairs {} with itself",
                    fabric.name,
                    domain.domain_id,
                    domain.peer1
                );
            }
        }
    }

    Ok(file.fabrics)
}

pub fn find<'a>(fabrics: &'a [FabricDefinition], name: &str) -> Option<&'a FabricDefinition> {
    fabrics.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FABRICS: &str = r#"
fabrics:
  - name: site1
    bgp_asn: "65001"
    mgmt_gateway: 10.1.1.1/24
    nv_pairs:
      FABRIC_MTU: "9216"
    vpc_domains:
      - domain_id: 10
        peer1: leaf01
        peer2: leaf02
        peer_link_po: 500
        peer_link_members: [Ethernet1/53, Ethernet1/54]
  - name: site2
    template: LAN_Classic
"#;

    #[test]
    fn test_parse_fabrics() {
        let fabrics = parse_fabrics(FABRICS).unwrap();
        assert_eq!(fabrics.len(), 2);
        let site1 = find(&fabrics, "site1").unwrap();
        assert_eq!(site1.bgp_asn.as_deref(), Some("65001"));
        assert_eq!(site1.nv_pairs.get("FABRIC_MTU").map(String::as_str), Some("9216"));
        assert_eq!(site1.vpc_domains[0].peer_link_members.len(), 2);
        assert_eq!(find(&fabrics, "site2").unwrap().template, "LAN_Classic");
        assert!(find(&fabrics, "site3").is_none());
    }

    #[test]
    fn test_duplicate_fabric_rejected() {
        let err = parse_fabrics("fabrics:\n  - name: a\n  - name: a\n").unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_self_paired_vpc_rejected() {
        let err = parse_fabrics(
            "fabrics:\n  - name: a\n    vpc_domains:\n      - {domain_id: 1, peer1: x, peer2: x, peer_link_po: 1}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("with itself"));
    }
}
