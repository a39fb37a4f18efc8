use anyhow::Result;

use super::{owners_of, stage, Runner, StageOutcome};
use crate::apply::{ControlPlane, DesiredResource, ResourceKind};
use crate::fabric;
use crate::models::{HostFailure, SwitchRecord, VpcDomain};
use crate::render::{self, PolicyRenderer};

/// Both peers of a domain, if both are selected and onboarded
fn peers<'a>(domain: &VpcDomain, switches: &'a [SwitchRecord]) -> Option<(&'a SwitchRecord, &'a SwitchRecord)> {
    let find = |name: &str| switches.iter().find(|s| s.hostname == name);
    match (find(&domain.peer1), find(&domain.peer2)) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => {
            tracing::debug!("vpc domain {}: {} and {} not both selected", domain.domain_id, domain.peer1, domain.peer2);
            None
        }
    }
}

impl Runner {
    /// Build the per-switch desired set of one fabric and apply it as one kind
    async fn per_switch<F>(
        &self,
        plane: &dyn ControlPlane,
        stage_name: &str,
        kind: ResourceKind,
        build: F,
    ) -> Result<StageOutcome>
    where
        F: Fn(&str, &SwitchRecord) -> Result<Vec<DesiredResource>>,
    {
        let mut outcome = StageOutcome::default();
        for fabric_name in self.fabric_names() {
            let switches = self.fabric_switches(&fabric_name, &mut outcome).await?;
            let mut desired = Vec::new();
            for sw in &switches {
                match build(&fabric_name, sw) {
                    Ok(resources) => desired.extend(resources),
                    Err(e) => {
                        tracing::error!("Cannot render {} for {}: {:#}", stage_name, sw.hostname, e);
                        outcome.host_failures.push(HostFailure::new(&sw.hostname, &format!("{:#}", e)));
                    }
                }
            }
            self.apply_kind(plane, kind, &fabric_name, desired, &owners_of(&switches), &mut outcome)
                .await;
        }
        self.finish(stage_name, &outcome).await?;
        Ok(outcome)
    }

    /// VLAN policies from each switch's cached profile
    pub async fn vlans(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        self.per_switch(plane, stage::VLANS, ResourceKind::Policy, |_, sw| {
            Ok(match (sw.serial_number(), &sw.profile) {
                (Some(serial), Some(profile)) => render::vlan_policies(serial, profile),
                _ => Vec::new(),
            })
        })
        .await
    }

    /// Feature and static-route freeform policies
    pub async fn policies(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        let renderer = PolicyRenderer::new()?;
        self.per_switch(plane, stage::POLICIES, ResourceKind::Policy, |_, sw| {
            let (Some(serial), Some(profile)) = (sw.serial_number(), &sw.profile) else {
                return Ok(Vec::new());
            };
            let mut resources: Vec<DesiredResource> = renderer.feature_policy(serial, profile)?.into_iter().collect();
            resources.extend(renderer.static_route_policies(serial, profile)?);
            Ok(resources)
        })
        .await
    }

    /// VPC pairs for every domain whose two peers are onboarded
    pub async fn vpc(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        let mut outcome = StageOutcome::default();
        for fabric_name in self.fabric_names() {
            let Some(definition) = fabric::find(&self.fabrics, &fabric_name) else {
                tracing::debug!("{} has no fabric definition, no vpc domains", fabric_name);
                continue;
            };
            if definition.vpc_domains.is_empty() {
                continue;
            }
            let switches = self.fabric_switches(&fabric_name, &mut outcome).await?;

            let desired: Vec<DesiredResource> = definition
                .vpc_domains
                .iter()
                .filter_map(|domain| {
                    let (a, b) = peers(domain, &switches)?;
                    Some(render::vpc_pair_resource(domain, a.serial_number()?, b.serial_number()?))
                })
                .collect();
            self.apply_kind(plane, ResourceKind::VpcPair, &fabric_name, desired, &owners_of(&switches), &mut outcome)
                .await;
        }
        self.finish(stage::VPC, &outcome).await?;
        Ok(outcome)
    }

    /// Per-switch interfaces plus VPC port-channels across each domain's peers
    pub async fn interfaces(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        let mut outcome = StageOutcome::default();
        for fabric_name in self.fabric_names() {
            let switches = self.fabric_switches(&fabric_name, &mut outcome).await?;

            let mut desired = Vec::new();
            for sw in &switches {
                if let (Some(serial), Some(profile)) = (sw.serial_number(), &sw.profile) {
                    desired.extend(render::interface_resources(&fabric_name, serial, profile));
                }
            }

            let domains = fabric::find(&self.fabrics, &fabric_name)
                .map(|f| f.vpc_domains.as_slice())
                .unwrap_or_default();
            for domain in domains {
                let Some((a, b)) = peers(domain, &switches) else { continue };
                match (a.serial_number(), &a.profile, b.serial_number(), &b.profile) {
                    (Some(sn_a), Some(pa), Some(sn_b), Some(pb)) => {
                        desired.extend(render::vpc_interface_resources(&fabric_name, domain, (sn_a, pa), (sn_b, pb)));
                    }
                    _ => tracing::warn!(
                        "vpc domain {}: profiles of {} and {} are needed for vpc interfaces",
                        domain.domain_id,
                        a.hostname,
                        b.hostname
                    ),
                }
            }

            self.apply_kind(plane, ResourceKind::Interface, &fabric_name, desired, &owners_of(&switches), &mut outcome)
                .await;
        }
        self.finish(stage::INTERFACES, &outcome).await?;
        Ok(outcome)
    }
}
