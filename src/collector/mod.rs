//! Fact collector: reads a running switch over SSH and normalizes what it
//! finds into a `SwitchProfile`.

pub mod parser;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::models::{HostFailure, InterfaceKind, SwitchProfile, SwitchRecord};
use parser::{RunningConfig, VersionInfo};

/// Interfaces NDFC owns after onboarding; never migrated as policies
pub const FIXED_EXCLUDED_INTERFACES: &[&str] = &["mgmt0", "Vlan1"];

/// VRF whose routes belong to the management plane, not the fabric
pub const MANAGEMENT_VRF: &str = "management";

pub const SHOW_VERSION: &str = "show version | json";
pub const SHOW_RUNNING_CONFIG: &str = "show running-config";

/// A command-based session to one device
#[async_trait]
pub trait CliSession: Send + Sync {
    async fn run(&self, command: &str) -> Result<String>;
}

/// Opens sessions to inventory switches
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, switch: &SwitchRecord) -> Result<Box<dyn CliSession>>;
}

/// SSH session backed by ssh2; every command runs on the blocking pool
pub struct SshSession {
    session: ssh2::Session,
}

#[async_trait]
impl CliSession for SshSession {
    async fn run(&self, command: &str) -> Result<String> {
        let session = self.session.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || crate::utils::ssh_exec(&session, &command))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))?
    }
}

pub struct SshConnector {
    pub default_user: String,
    pub default_pass: String,
    pub timeout_secs: u64,
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, switch: &SwitchRecord) -> Result<Box<dyn CliSession>> {
        let host = switch.ansible_host.clone();
        let user = switch
            .ssh_user
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_user.clone());
        let pass = switch
            .ssh_pass
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_pass.clone());
        let timeout = self.timeout_secs;

        if user.is_empty() || pass.is_empty() {
            return Err(anyhow!("No SSH credentials available for {}", switch.hostname));
        }

        let session = tokio::task::spawn_blocking(move || crate::utils::ssh_connect(&host, &user, &pass, timeout))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;
        Ok(Box::new(SshSession { session }))
    }
}

/// Issue the read-only fact commands and build the profile
pub async fn collect_switch(session: &dyn CliSession, hostname: &str) -> Result<SwitchProfile> {
    let version = parser::parse_show_version(&session.run(SHOW_VERSION).await?)?;
    let running = parser::parse_running_config(&session.run(SHOW_RUNNING_CONFIG).await?);

    if let Some(reported) = &version.hostname {
        if !reported.eq_ignore_ascii_case(hostname) {
            tracing::warn!("{} reports hostname {}", hostname, reported);
        }
    }

    Ok(build_profile(hostname, version, running))
}

fn is_fixed_exclusion(name: &str) -> bool {
    FIXED_EXCLUDED_INTERFACES
        .iter()
        .any(|fixed| fixed.eq_ignore_ascii_case(name))
}

/// Apply the exclusion list and fold port-channel members into their port-channel
pub fn build_profile(hostname: &str, version: VersionInfo, running: RunningConfig) -> SwitchProfile {
    let RunningConfig {
        features,
        vlans,
        interfaces,
        static_routes,
    } = running;

    let mut members: Vec<(u16, String)> = interfaces
        .iter()
        .filter_map(|i| i.channel_group.map(|po| (po, i.name.clone())))
        .collect();
    members.sort();

    let interfaces = interfaces
        .into_iter()
        .filter(|i| !is_fixed_exclusion(&i.name))
        .filter(|i| i.kind != InterfaceKind::Management)
        .filter(|i| i.channel_group.is_none())
        .filter(|i| !(i.kind == InterfaceKind::PortChannel && i.peer_link))
        .map(|mut i| {
            if i.kind == InterfaceKind::PortChannel {
                if let Some(id) = port_channel_number(&i.name) {
                    i.members = members
                        .iter()
                        .filter(|(po, _)| *po == id)
                        .map(|(_, name)| name.clone())
                        .collect();
                }
            }
            i
        })
        .collect();

    SwitchProfile {
        hostname: hostname.to_string(),
        serial: version.serial,
        model: version.model,
        version: version.version,
        features,
        vlans: vlans.into_iter().filter(|v| v.id != 1).collect(),
        interfaces,
        static_routes: static_routes
            .into_iter()
            .filter(|r| r.vrf != MANAGEMENT_VRF)
            .collect(),
    }
}

fn port_channel_number(name: &str) -> Option<u16> {
    name.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().ok()
}

/// Result of collecting a batch of switches
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub profiles: Vec<SwitchProfile>,
    pub failed: Vec<HostFailure>,
}

/// Collect from every switch with at most `forks` sessions open at once.
/// A failed switch is recorded and the batch carries on.
pub async fn collect_all(connector: &dyn Connector, switches: &[&SwitchRecord], forks: usize) -> CollectionReport {
    let results: Vec<(String, Result<SwitchProfile>)> = stream::iter(switches.iter().copied())
        .map(|sw| async move {
            tracing::info!("Collecting facts from {} ({})", sw.hostname, sw.ansible_host);
            let result = match connector.connect(sw).await {
                Ok(session) => collect_switch(session.as_ref(), &sw.hostname).await,
                Err(e) => Err(e),
            };
            (sw.hostname.clone(), result)
        })
        .buffer_unordered(forks.max(1))
        .collect()
        .await;

    let mut report = CollectionReport::default();
    for (hostname, result) in results {
        match result {
            Ok(profile) => report.profiles.push(profile),
            Err(e) => {
                tracing::error!("Fact collection failed for {}: {:#}", hostname, e);
                report.failed.push(HostFailure::new(&hostname, &format!("{:#}", e)));
            }
        }
    }
    report.profiles.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    report.failed.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeSession {
        outputs: HashMap<&'static str, String>,
    }

    #[async_trait]
    impl CliSession for FakeSession {
        async fn run(&self, command: &str) -> Result<String> {
            self.outputs
                .get(command)
                .cloned()
                .ok_or_else(|| anyhow!("unexpected command {}", command))
        }
    }

    /// Connects to every switch except those listed as unreachable
    pub(crate) struct FakeConnector {
        pub unreachable: Vec<&'static str>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, switch: &SwitchRecord) -> Result<Box<dyn CliSession>> {
            if self.unreachable.contains(&switch.hostname.as_str()) {
                return Err(anyhow!("TCP connection to {}:22 failed", switch.ansible_host));
            }
            let mut outputs = HashMap::new();
            outputs.insert(
                SHOW_VERSION,
                format!(r#"{{"host_name": "{}", "proc_board_id": "SN-{}"}}"#, switch.hostname, switch.hostname),
            );
            outputs.insert(SHOW_RUNNING_CONFIG, CONFIG.to_string());
            Ok(Box::new(FakeSession { outputs }))
        }
    }

    const CONFIG: &str = "feature vpc\nvlan 1,20\ninterface mgmt0\n  ip address 10.0.0.5/24\ninterface Vlan1\ninterface port-channel1\n  vpc peer-link\ninterface port-channel7\n  switchport mode trunk\n  vpc 7\ninterface Ethernet1/1\n  channel-group 7 mode active\ninterface Ethernet1/2\n  channel-group 7 mode active\ninterface Ethernet1/49\n  channel-group 1 mode active\ninterface Ethernet1/3\n  switchport access vlan 20\nvrf context management\n  ip route 0.0.0.0/0 10.0.0.1\nip route 10.50.0.0/16 10.20.0.1\n";

    #[tokio::test]
    async fn test_exclusions_applied() {
        let connector = FakeConnector { unreachable: vec![] };
        let sw = SwitchRecord::new("agg01", "10.0.0.5", "site1", "aggregation");
        let session = connector.connect(&sw).await.unwrap();
        let profile = collect_switch(session.as_ref(), "agg01").await.unwrap();

        let names: Vec<&str> = profile.interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["port-channel7", "Ethernet1/3"]);
        assert_eq!(profile.interfaces[0].members, vec!["Ethernet1/1", "Ethernet1/2"]);
        assert_eq!(profile.vlans.len(), 1);
        assert_eq!(profile.vlans[0].id, 20);
        assert_eq!(profile.static_routes.len(), 1);
        assert_eq!(profile.serial.as_deref(), Some("SN-agg01"));
    }

    #[tokio::test]
    async fn test_connection_failure_does_not_abort_batch() {
        let connector = FakeConnector { unreachable: vec!["agg02"] };
        let a = SwitchRecord::new("agg01", "10.0.0.5", "site1", "aggregation");
        let b = SwitchRecord::new("agg02", "10.0.0.6", "site1", "aggregation");
        let c = SwitchRecord::new("agg03", "10.0.0.7", "site1", "aggregation");

        let report = collect_all(&connector, &[&a, &b, &c], 2).await;
        let ok: Vec<&str> = report.profiles.iter().map(|p| p.hostname.as_str()).collect();
        assert_eq!(ok, vec!["agg01", "agg03"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].hostname, "agg02");
        assert!(report.failed[0].error.contains("TCP connection"));
    }

    #[test]
    fn test_port_channel_number() {
        assert_eq!(port_channel_number("port-channel113"), Some(113));
        assert_eq!(port_channel_number("po7"), Some(7));
        assert_eq!(port_channel_number("port-channel"), None);
    }
}
