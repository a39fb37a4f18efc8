//! Stage orchestration. Each CLI subcommand maps to one method on `Runner`;
//! every stage ends with a retry file and one summary line per resource kind.

mod policy;
mod onboard;

pub use onboard::PoapQueue;

use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};

use crate::apply::{self, ApplyReport, ControlPlane, DesiredResource, ResourceKind};
use crate::artifacts::ArtifactStore;
use crate::collector::{self, Connector};
use crate::config::Config;
use crate::inventory::Inventory;
use crate::models::{FabricDefinition, HostFailure, SwitchProfile, SwitchRecord};
use crate::onboarding::{self, OnboardingMode};

pub mod stage {
    pub const PROFILE: &str = "profile";
    pub const FABRIC: &str = "fabric";
    pub const SWITCHES: &str = "switches";
    pub const BOOTSTRAP: &str = "bootstrap";
    pub const VLANS: &str = "vlans";
    pub const VPC: &str = "vpc";
    pub const INTERFACES: &str = "interfaces";
    pub const POLICIES: &str = "policies";

    pub const ALL: &[&str] = &[PROFILE, FABRIC, SWITCHES, BOOTSTRAP, VLANS, VPC, INTERFACES, POLICIES];
}

/// Flags shared by every stage subcommand
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Hostnames to restrict the run to; None means every host
    pub limit: Option<BTreeSet<String>>,
    pub fabric: Option<String>,
    pub dry_run: bool,
}

/// Resolve a `--limit` value: comma-separated hostnames, or `@<stage>` for
/// the hosts in that stage's retry file
pub async fn resolve_limit(raw: &str, store: &ArtifactStore) -> Result<BTreeSet<String>> {
    let raw = raw.trim();
    if let Some(name) = raw.strip_prefix('@') {
        if !stage::ALL.contains(&name) {
            return Err(anyhow!("Unknown stage '{}' in --limit", name));
        }
        return Ok(store.read_retry(name).await?.into_iter().collect());
    }

    let hosts: BTreeSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect();
    if hosts.is_empty() {
        return Err(anyhow!("--limit needs at least one hostname"));
    }
    Ok(hosts)
}

/// What one stage run did
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub reports: Vec<ApplyReport>,
    pub host_failures: Vec<HostFailure>,
    /// Fabric-level failures, e.g. the read-back call itself failed
    pub errors: Vec<String>,
    /// Summary lines of stages that do not go through the applier
    pub notes: Vec<String>,
}

impl StageOutcome {
    pub fn failed(&self) -> bool {
        !self.host_failures.is_empty()
            || !self.errors.is_empty()
            || self.reports.iter().any(|r| !r.failed.is_empty())
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = self.notes.clone();
        lines.extend(self.reports.iter().map(ApplyReport::summary));
        lines.extend(self.errors.iter().map(|e| format!("error: {}", e)));
        lines
    }

    fn merge(&mut self, other: StageOutcome) {
        self.reports.extend(other.reports);
        self.host_failures.extend(other.host_failures);
        self.errors.extend(other.errors);
        self.notes.extend(other.notes);
    }

    /// Attribute per-item failures of a report to the hosts that own them
    fn absorb(&mut self, report: ApplyReport, owners: &BTreeMap<String, String>) {
        for failure in &report.failed {
            let owner = failure
                .key
                .serial
                .split('~')
                .chain(std::iter::once(failure.key.instance.as_str()))
                .filter_map(|id| owners.get(id));
            for hostname in owner {
                self.host_failures.push(HostFailure::new(hostname, &failure.error));
            }
        }
        self.reports.push(report);
    }
}

/// Stage runner over one loaded inventory and fabric file
pub struct Runner {
    config: Config,
    inventory: Inventory,
    fabrics: Vec<FabricDefinition>,
    store: ArtifactStore,
    opts: StageOptions,
    // Hosts dropped by an earlier stage of the same run
    excluded: BTreeSet<String>,
}

impl Runner {
    pub fn new(config: Config, inventory: Inventory, fabrics: Vec<FabricDefinition>, opts: StageOptions) -> Self {
        let store = ArtifactStore::new(&config.artifact_dir);
        if let Some(limit) = &opts.limit {
            for host in limit.iter().filter(|h| inventory.get(h).is_none()) {
                tracing::warn!("--limit host {} is not in the inventory", host);
            }
        }
        Self {
            config,
            inventory,
            fabrics,
            store,
            opts,
            excluded: BTreeSet::new(),
        }
    }

    /// Inventory switches passing --fabric, --limit and earlier-stage exclusions
    fn selected(&self) -> Vec<&SwitchRecord> {
        self.inventory
            .switches
            .iter()
            .filter(|s| self.opts.fabric.as_deref().map_or(true, |f| s.fabric == f))
            .filter(|s| self.opts.limit.as_ref().map_or(true, |l| l.contains(&s.hostname)))
            .filter(|s| !self.excluded.contains(&s.hostname))
            .collect()
    }

    /// Fabrics of the selected switches, in inventory order
    fn fabric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for sw in self.selected() {
            if !names.contains(&sw.fabric) {
                names.push(sw.fabric.clone());
            }
        }
        names
    }

    /// SSH credentials for a switch: host vars first, then the environment
    fn credentials(&self, sw: &SwitchRecord) -> (String, String) {
        let user = sw
            .ssh_user
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.ssh_user.clone());
        let pass = sw
            .ssh_pass
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.ssh_pass.clone());
        (user, pass)
    }

    /// Onboarded switches of one fabric with their cached profile attached.
    /// A switch whose serial number is unknown cannot carry policies and is
    /// reported as failed.
    async fn fabric_switches(&self, fabric: &str, outcome: &mut StageOutcome) -> Result<Vec<SwitchRecord>> {
        let profiles = self.store.read_fabric(fabric).await?;
        let mut switches = Vec::new();

        for sw in self.selected().into_iter().filter(|s| s.fabric == fabric) {
            if let OnboardingMode::Skip(reason) = onboarding::decide(sw) {
                tracing::debug!("{} not onboarded: {}", sw.hostname, reason);
                continue;
            }
            let mut sw = sw.clone();
            sw.profile = profiles.get(&sw.hostname).cloned();
            if sw.serial_number().is_none() {
                outcome.host_failures.push(HostFailure::new(
                    &sw.hostname,
                    "serial number unknown, run the profile stage first",
                ));
                continue;
            }
            switches.push(sw);
        }
        Ok(switches)
    }

    /// Apply one kind for one fabric and fold the result into the outcome.
    /// A failure to read back existing objects fails the whole kind for that fabric.
    async fn apply_kind(
        &self,
        plane: &dyn ControlPlane,
        kind: ResourceKind,
        fabric: &str,
        desired: Vec<DesiredResource>,
        owners: &BTreeMap<String, String>,
        outcome: &mut StageOutcome,
    ) {
        match apply::apply(plane, kind, fabric, desired, self.opts.dry_run).await {
            Ok(report) => outcome.absorb(report, owners),
            Err(e) => {
                tracing::error!("{} {}: {:#}", fabric, kind, e);
                outcome.errors.push(format!("{} {}: {:#}", fabric, kind, e));
            }
        }
    }

    /// Write (or clear) the stage's retry file. Dry runs leave files alone.
    async fn finish(&self, stage_name: &str, outcome: &StageOutcome) -> Result<()> {
        if self.opts.dry_run {
            return Ok(());
        }
        self.store.write_retry(stage_name, &outcome.host_failures).await
    }

    // --- Stages ---

    /// Collect facts from every switch that is reachable over SSH today:
    /// no POAP fields at all, whether or not it is being onboarded
    pub async fn profile(&self, connector: &dyn Connector) -> Result<StageOutcome> {
        let targets: Vec<&SwitchRecord> = self
            .selected()
            .into_iter()
            .filter(|s| s.poap_fields().iter().all(|(_, v)| v.is_none()))
            .collect();
        let report = collector::collect_all(connector, &targets, self.config.forks).await;

        let mut by_fabric: BTreeMap<String, Vec<SwitchProfile>> = BTreeMap::new();
        for profile in report.profiles {
            if let Some(sw) = self.inventory.get(&profile.hostname) {
                by_fabric.entry(sw.fabric.clone()).or_default().push(profile);
            }
        }

        let mut outcome = StageOutcome::default();
        for (fabric, profiles) in &by_fabric {
            if self.opts.dry_run {
                tracing::info!("[dry-run] would write {} profiles for {}", profiles.len(), fabric);
            } else {
                self.store.write_fabric(fabric, profiles).await?;
            }
        }
        let collected: usize = by_fabric.values().map(Vec::len).sum();
        outcome.notes.push(format!(
            "profiles: {} collected, {} failed",
            collected,
            report.failed.len()
        ));
        outcome.host_failures = report.failed;

        self.finish(stage::PROFILE, &outcome).await?;
        Ok(outcome)
    }

    /// One line per selected switch with its onboarding decision
    pub fn classify(&self) -> Vec<String> {
        self.selected()
            .into_iter()
            .map(|sw| {
                let mode = onboarding::decide(sw);
                let detail = match &mode {
                    OnboardingMode::Preprovision(t) => format!("{} {} {}", t.serial, t.model, t.version),
                    OnboardingMode::Discover => sw.ansible_host.clone(),
                    OnboardingMode::Skip(reason) => reason.to_string(),
                };
                format!("{:<20} {:<12} {:<13} {}", sw.hostname, sw.fabric, mode.label(), detail)
            })
            .collect()
    }

    /// profile, fabric, switches, vlans, vpc, interfaces, policies. Hosts that
    /// fail a stage are left out of the stages after it.
    pub async fn all(&mut self, plane: &dyn ControlPlane, connector: &dyn Connector) -> Result<StageOutcome> {
        let mut total = StageOutcome::default();

        let outcome = self.profile(connector).await?;
        self.exclude_failed(&outcome);
        total.merge(outcome);

        let outcome = self.fabric(plane).await?;
        total.merge(outcome);

        let outcome = self.switches(plane).await?;
        self.exclude_failed(&outcome);
        total.merge(outcome);

        let outcome = self.vlans(plane).await?;
        self.exclude_failed(&outcome);
        total.merge(outcome);

        let outcome = self.vpc(plane).await?;
        self.exclude_failed(&outcome);
        total.merge(outcome);

        let outcome = self.interfaces(plane).await?;
        self.exclude_failed(&outcome);
        total.merge(outcome);

        total.merge(self.policies(plane).await?);
        Ok(total)
    }

    fn exclude_failed(&mut self, outcome: &StageOutcome) {
        for failure in &outcome.host_failures {
            if self.excluded.insert(failure.hostname.clone()) {
                tracing::warn!("{} excluded from the remaining stages", failure.hostname);
            }
        }
    }
}

/// Serial and management IP of each switch, mapped back to its hostname
fn owners_of(switches: &[SwitchRecord]) -> BTreeMap<String, String> {
    let mut owners = BTreeMap::new();
    for sw in switches {
        if let Some(serial) = sw.serial_number() {
            owners.insert(serial.to_string(), sw.hostname.clone());
        }
        owners.insert(sw.ansible_host.clone(), sw.hostname.clone());
    }
    owners
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::apply::tests::FakePlane;
    use crate::collector::tests::FakeConnector;
    use crate::inventory::parse_inventory;

    pub(crate) const INVENTORY: &str = r#"
all:
  vars:
    ansible_user: admin
  children:
    site1:
      vars:
        fabric: site1
        add_to_fabric: true
      hosts:
        leaf01:
          ansible_host: 10.1.1.11
          role: leaf
          destination_switch_sn: FDO1
          destination_switch_model: N9K-C93180YC-FX
          destination_switch_version: 10.3(2)
        agg01:
          ansible_host: 10.1.1.21
          role: aggregation
        agg02:
          ansible_host: 10.1.1.22
          role: aggregation
        leaf03:
          ansible_host: 10.1.1.13
          role: leaf
          destination_switch_sn: FDO3
"#;

    pub(crate) const FABRICS: &str = r#"
fabrics:
  - name: site1
    bgp_asn: "65001"
    mgmt_gateway: 10.1.1.1/24
    vpc_domains:
      - domain_id: 10
        peer1: agg01
        peer2: agg02
        peer_link_po: 1
        peer_link_members: [Ethernet1/49]
"#;

    pub(crate) fn test_runner(dir: &std::path::Path, opts: StageOptions) -> Runner {
        let mut config = Config::load();
        config.artifact_dir = dir.to_string_lossy().to_string();
        config.ssh_pass = "secret".to_string();
        config.forks = 2;
        let inventory = parse_inventory(INVENTORY).unwrap();
        let fabrics = crate::fabric::parse_fabrics(FABRICS).unwrap();
        Runner::new(config, inventory, fabrics, opts)
    }

    #[tokio::test]
    async fn test_resolve_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let hosts = resolve_limit("agg01, agg02,,", &store).await.unwrap();
        assert_eq!(hosts.into_iter().collect::<Vec<_>>(), vec!["agg01", "agg02"]);

        store
            .write_retry(stage::VLANS, &[HostFailure::new("agg02", "boom")])
            .await
            .unwrap();
        let hosts = resolve_limit("@vlans", &store).await.unwrap();
        assert_eq!(hosts.into_iter().collect::<Vec<_>>(), vec!["agg02"]);

        assert!(resolve_limit("@nonsense", &store).await.is_err());
        assert!(resolve_limit("@policies", &store).await.is_err());
        assert!(resolve_limit(" , ", &store).await.is_err());
    }

    #[tokio::test]
    async fn test_profile_skips_poap_switches_and_writes_retry() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path(), StageOptions::default());
        let connector = FakeConnector { unreachable: vec!["agg02"] };

        let outcome = runner.profile(&connector).await.unwrap();
        assert_eq!(outcome.notes, vec!["profiles: 1 collected, 1 failed"]);
        assert!(outcome.failed());

        let cached = runner.store.read_fabric("site1").await.unwrap();
        assert_eq!(cached.keys().collect::<Vec<_>>(), vec!["agg01"]);
        assert_eq!(runner.store.read_retry(stage::PROFILE).await.unwrap(), vec!["agg02"]);

        // Retrying the failed host alone clears the retry file
        let opts = StageOptions {
            limit: Some(resolve_limit("@profile", &runner.store).await.unwrap()),
            ..Default::default()
        };
        let retry = test_runner(dir.path(), opts);
        let outcome = retry.profile(&FakeConnector { unreachable: vec![] }).await.unwrap();
        assert!(!outcome.failed());
        assert!(!retry.store.retry_path(stage::PROFILE).exists());
        assert_eq!(retry.store.read_fabric("site1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_profile_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let opts = StageOptions {
            dry_run: true,
            ..Default::default()
        };
        let runner = test_runner(dir.path(), opts);
        runner.profile(&FakeConnector { unreachable: vec!["agg02"] }).await.unwrap();
        assert!(!runner.store.fabric_path("site1").exists());
        assert!(!runner.store.retry_path(stage::PROFILE).exists());
    }

    #[test]
    fn test_classify_lines() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path(), StageOptions::default());
        let lines = runner.classify();
        assert_eq!(lines.len(), 4);
        let leaf01 = lines.iter().find(|l| l.starts_with("leaf01")).unwrap();
        assert!(leaf01.contains("preprovision"));
        assert!(leaf01.contains("FDO1"));
        let leaf03 = lines.iter().find(|l| l.starts_with("leaf03")).unwrap();
        assert!(leaf03.contains("skip"));
        assert!(leaf03.contains("destination_switch_model"));
    }

    #[test]
    fn test_limit_and_fabric_filter_selection() {
        let dir = tempfile::tempdir().unwrap();
        let opts = StageOptions {
            limit: Some(["agg01".to_string(), "ghost".to_string()].into_iter().collect()),
            ..Default::default()
        };
        let runner = test_runner(dir.path(), opts);
        let names: Vec<&str> = runner.selected().iter().map(|s| s.hostname.as_str()).collect();
        assert_eq!(names, vec!["agg01"]);

        let opts = StageOptions {
            fabric: Some("site2".to_string()),
            ..Default::default()
        };
        let runner = test_runner(dir.path(), opts);
        assert!(runner.selected().is_empty());
        assert!(runner.fabric_names().is_empty());
    }

    #[tokio::test]
    async fn test_all_runs_every_stage_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let plane = FakePlane::default();
        let connector = FakeConnector { unreachable: vec![] };

        let mut first = test_runner(dir.path(), StageOptions::default());
        let outcome = first.all(&plane, &connector).await.unwrap();
        assert!(!outcome.failed(), "{:?}", outcome.summary_lines());
        let created: usize = outcome.reports.iter().map(|r| r.created.len()).sum();
        assert!(created > 0);
        let calls = *plane.create_calls.lock().unwrap();

        let mut second = test_runner(dir.path(), StageOptions::default());
        let outcome = second.all(&plane, &connector).await.unwrap();
        assert!(outcome.reports.iter().all(|r| r.created.is_empty()));
        let present: usize = outcome.reports.iter().map(|r| r.already_present.len()).sum();
        assert_eq!(present, created);
        assert_eq!(*plane.create_calls.lock().unwrap(), calls);
    }

    #[test]
    fn test_absorb_maps_failures_to_hosts() {
        let mut sw1 = SwitchRecord::new("agg01", "10.1.1.21", "site1", "aggregation");
        sw1.destination_switch_sn = Some("SN1".to_string());
        let mut sw2 = SwitchRecord::new("agg02", "10.1.1.22", "site1", "aggregation");
        sw2.destination_switch_sn = Some("SN2".to_string());
        let owners = owners_of(&[sw1, sw2]);

        let mut report = ApplyReport::new(ResourceKind::Interface, "site1", false);
        report.failed.push(apply::ItemFailure {
            key: crate::apply::ResourceKey::new("SN1~SN2", "int_vpc_trunk_host", "vpc7"),
            error: "rejected".to_string(),
        });
        let mut outcome = StageOutcome::default();
        outcome.absorb(report, &owners);

        let hosts: Vec<&str> = outcome.host_failures.iter().map(|f| f.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["agg01", "agg02"]);
        assert!(outcome.failed());
    }
}
