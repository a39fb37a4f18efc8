//! Idempotent applier: read what the control plane already has, diff it
//! against the desired set by natural key, and create only the missing part.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::ndfc::types::{
    DiscoverPayload, FabricPayload, InterfacePayload, PoapPayload, PolicyPayload, VpcPairPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Fabric,
    Switch,
    Policy,
    VpcPair,
    Interface,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Fabric => "fabrics",
            ResourceKind::Switch => "switches",
            ResourceKind::Policy => "policies",
            ResourceKind::VpcPair => "vpc pairs",
            ResourceKind::Interface => "interfaces",
        };
        f.write_str(s)
    }
}

/// Natural key of a control-plane resource: owning serial number (empty for
/// fabric-level objects), template or kind name, and an instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub serial: String,
    pub template: String,
    pub instance: String,
}

impl ResourceKey {
    pub fn new(serial: &str, template: &str, instance: &str) -> Self {
        Self {
            serial: serial.to_string(),
            template: template.to_string(),
            instance: instance.to_lowercase(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.serial.is_empty() {
            write!(f, "{}/{}", self.template, self.instance)
        } else {
            write!(f, "{}:{}/{}", self.serial, self.template, self.instance)
        }
    }
}

/// One desired control-plane object and the payload that creates it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DesiredResource {
    Fabric(FabricPayload),
    Preprovision(PoapPayload),
    Discover(DiscoverPayload),
    Policy(PolicyPayload),
    VpcPair(VpcPairPayload),
    Interface(InterfacePayload),
}

impl DesiredResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredResource::Fabric(_) => ResourceKind::Fabric,
            DesiredResource::Preprovision(_) | DesiredResource::Discover(_) => ResourceKind::Switch,
            DesiredResource::Policy(_) => ResourceKind::Policy,
            DesiredResource::VpcPair(_) => ResourceKind::VpcPair,
            DesiredResource::Interface(_) => ResourceKind::Interface,
        }
    }

    pub fn key(&self) -> ResourceKey {
        match self {
            DesiredResource::Fabric(f) => ResourceKey::new("", "fabric", &f.name),
            // Switch membership is keyed by management IP: discovery may not know the serial yet
            DesiredResource::Preprovision(p) => ResourceKey::new("", "switch", &p.ip_address),
            DesiredResource::Discover(d) => ResourceKey::new("", "switch", &d.seed_ip),
            DesiredResource::Policy(p) => ResourceKey::new(&p.serial_number, &p.template_name, &p.description),
            DesiredResource::VpcPair(v) => ResourceKey::new(&v.pair_serial(), "vpc_pair", ""),
            DesiredResource::Interface(i) => {
                let entry = i.interfaces.first();
                ResourceKey::new(
                    entry.map(|e| e.serial_number.as_str()).unwrap_or(""),
                    &i.policy,
                    entry.map(|e| e.if_name.as_str()).unwrap_or(""),
                )
            }
        }
    }

    /// The create call's JSON body
    pub fn payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serial number the control plane should be queried with
    pub fn serial(&self) -> Option<String> {
        let key = self.key();
        if key.serial.is_empty() {
            None
        } else {
            Some(key.serial)
        }
    }
}

/// The control plane as the applier sees it: list keys, create one object
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Keys of the objects of `kind` that already exist. `serials` narrows
    /// per-switch kinds to the switches being applied.
    async fn existing_keys(&self, kind: ResourceKind, fabric: &str, serials: &[String]) -> Result<BTreeSet<ResourceKey>>;

    async fn create(&self, fabric: &str, resource: &DesiredResource) -> Result<()>;
}

/// What an apply would do
#[derive(Debug, Default)]
pub struct Plan {
    pub to_create: Vec<DesiredResource>,
    pub already_present: Vec<ResourceKey>,
}

/// Set difference by natural key. Duplicate desired keys collapse to the first.
pub fn plan(desired: Vec<DesiredResource>, existing: &BTreeSet<ResourceKey>) -> Plan {
    let mut seen: BTreeSet<ResourceKey> = BTreeSet::new();
    let mut plan = Plan::default();

    for resource in desired {
        let key = resource.key();
        if !seen.insert(key.clone()) {
            tracing::debug!("Duplicate desired resource {} ignored", key);
            continue;
        }
        if existing.contains(&key) {
            plan.already_present.push(key);
        } else {
            plan.to_create.push(resource);
        }
    }
    plan
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub key: ResourceKey,
    pub error: String,
}

/// Outcome of applying one resource kind to one fabric
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub kind: ResourceKind,
    pub fabric: String,
    pub dry_run: bool,
    pub created: Vec<ResourceKey>,
    pub planned: Vec<ResourceKey>,
    pub already_present: Vec<ResourceKey>,
    pub failed: Vec<ItemFailure>,
}

impl ApplyReport {
    pub(crate) fn new(kind: ResourceKind, fabric: &str, dry_run: bool) -> Self {
        Self {
            kind,
            fabric: fabric.to_string(),
            dry_run,
            created: Vec::new(),
            planned: Vec::new(),
            already_present: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn to_create(&self) -> usize {
        self.created.len() + self.planned.len() + self.failed.len()
    }

    pub fn summary(&self) -> String {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        format!(
            "{}{} {}: {} to create, {} already configured, {} failed",
            prefix,
            self.fabric,
            self.kind,
            self.to_create(),
            self.already_present.len(),
            self.failed.len()
        )
    }
}

/// Read, diff, and create the missing subset of `desired`.
/// A failed create is recorded and the remaining items are still attempted;
/// nothing already created is rolled back.
pub async fn apply(
    plane: &dyn ControlPlane,
    kind: ResourceKind,
    fabric: &str,
    desired: Vec<DesiredResource>,
    dry_run: bool,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::new(kind, fabric, dry_run);
    if desired.is_empty() {
        return Ok(report);
    }

    let mut serials: Vec<String> = desired.iter().filter_map(DesiredResource::serial).collect();
    serials.sort();
    serials.dedup();

    let existing = plane.existing_keys(kind, fabric, &serials).await?;
    let plan = plan(desired, &existing);
    report.already_present = plan.already_present;

    for resource in plan.to_create {
        let key = resource.key();
        if dry_run {
            tracing::info!("[dry-run] would create {} {}", kind, key);
            if let Ok(body) = resource.payload() {
                tracing::debug!("[dry-run] {} payload: {}", key, body);
            }
            report.planned.push(key);
            continue;
        }
        match plane.create(fabric, &resource).await {
            Ok(()) => {
                tracing::info!("Created {} {}", kind, key);
                report.created.push(key);
            }
            Err(e) => {
                tracing::error!("Failed to create {} {}: {:#}", kind, key, e);
                report.failed.push(ItemFailure {
                    key,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory control plane: keeps created keys, can reject chosen instances
    #[derive(Default)]
    pub(crate) struct FakePlane {
        pub state: Mutex<BTreeSet<ResourceKey>>,
        pub create_calls: Mutex<usize>,
        pub reject: Vec<String>,
    }

    #[async_trait]
    impl ControlPlane for FakePlane {
        async fn existing_keys(&self, _kind: ResourceKind, _fabric: &str, _serials: &[String]) -> Result<BTreeSet<ResourceKey>> {
            Ok(self.state.lock().unwrap().clone())
        }

        async fn create(&self, _fabric: &str, resource: &DesiredResource) -> Result<()> {
            *self.create_calls.lock().unwrap() += 1;
            let key = resource.key();
            if self.reject.contains(&key.instance) {
                anyhow::bail!("NDFC API error 400: duplicate {}", key.instance);
            }
            self.state.lock().unwrap().insert(key);
            Ok(())
        }
    }

    pub(crate) fn vlan_policy(serial: &str, vlan: u16) -> DesiredResource {
        let mut nv_pairs = BTreeMap::new();
        nv_pairs.insert("VLAN_ID".to_string(), vlan.to_string());
        DesiredResource::Policy(PolicyPayload::new(
            serial,
            "create_vlan",
            &format!("vlan {}", vlan),
            nv_pairs,
        ))
    }

    #[test]
    fn test_plan_diff_and_dedup() {
        let mut existing = BTreeSet::new();
        existing.insert(vlan_policy("SN1", 10).key());

        let desired = vec![vlan_policy("SN1", 10), vlan_policy("SN1", 20), vlan_policy("SN1", 20)];
        let plan = plan(desired, &existing);
        assert_eq!(plan.already_present.len(), 1);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].key().instance, "vlan 20");
    }

    #[test]
    fn test_second_apply_creates_nothing() {
        let plane = FakePlane::default();
        let desired = || vec![vlan_policy("SN1", 10), vlan_policy("SN1", 20), vlan_policy("SN2", 10)];

        let first = tokio_test::block_on(apply(&plane, ResourceKind::Policy, "site1", desired(), false)).unwrap();
        assert_eq!(first.created.len(), 3);
        let state_after_first = plane.state.lock().unwrap().clone();

        let second = tokio_test::block_on(apply(&plane, ResourceKind::Policy, "site1", desired(), false)).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.already_present.len(), first.created.len());
        assert_eq!(*plane.state.lock().unwrap(), state_after_first);
        assert_eq!(*plane.create_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_create_does_not_stop_batch() {
        let plane = FakePlane {
            reject: vec!["vlan 20".to_string()],
            ..Default::default()
        };
        let desired = vec![vlan_policy("SN1", 10), vlan_policy("SN1", 20), vlan_policy("SN1", 30)];
        let report = apply(&plane, ResourceKind::Policy, "site1", desired, false).await.unwrap();

        assert_eq!(report.created.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key.instance, "vlan 20");
        assert!(report.failed[0].error.contains("duplicate"));
        // Earlier creates stay in place
        assert_eq!(plane.state.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_never_creates() {
        let plane = FakePlane::default();
        let report = apply(&plane, ResourceKind::Policy, "site1", vec![vlan_policy("SN1", 10)], true)
            .await
            .unwrap();
        assert_eq!(report.planned.len(), 1);
        assert!(report.created.is_empty());
        assert_eq!(*plane.create_calls.lock().unwrap(), 0);
        assert!(report.summary().starts_with("[dry-run] site1 policies: 1 to create"));
    }

    #[test]
    fn test_payload_is_the_bare_body() {
        let body = vlan_policy("SN1", 10).payload().unwrap();
        assert_eq!(body["templateName"], "create_vlan");
        assert_eq!(body["nvPairs"]["VLAN_ID"], "10");
    }

    #[test]
    fn test_key_instance_is_case_insensitive() {
        assert_eq!(
            ResourceKey::new("SN1", "int_vpc_trunk_host", "vPC113"),
            ResourceKey::new("SN1", "int_vpc_trunk_host", "vpc113")
        );
    }
}
