use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{stage, Runner, StageOutcome};
use crate::apply::{ApplyReport, ControlPlane, ItemFailure, ResourceKey, ResourceKind};
use crate::fabric;
use crate::models::HostFailure;
use crate::ndfc::types::{NdPoapSwitch, PoapPayload};
use crate::ndfc::NdfcClient;
use crate::onboarding::route_all;
use crate::render;

/// The fabric's POAP queue: switches that booted and are waiting for a bootstrap
#[async_trait]
pub trait PoapQueue: Send + Sync {
    async fn waiting(&self, fabric: &str) -> Result<Vec<NdPoapSwitch>>;
    async fn bootstrap(&self, fabric: &str, entry: &PoapPayload) -> Result<()>;
}

#[async_trait]
impl PoapQueue for NdfcClient {
    async fn waiting(&self, fabric: &str) -> Result<Vec<NdPoapSwitch>> {
        self.list_poap(fabric).await
    }

    async fn bootstrap(&self, fabric: &str, entry: &PoapPayload) -> Result<()> {
        self.submit_poap(fabric, std::slice::from_ref(entry)).await
    }
}

fn undefined_fabric(name: &str) -> anyhow::Error {
    anyhow!("fabric {} is not in the fabric definition file", name)
}

impl Runner {
    /// Create the fabrics from the definition file that do not exist yet
    pub async fn fabric(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        let mut outcome = StageOutcome::default();
        if let Some(name) = &self.opts.fabric {
            if fabric::find(&self.fabrics, name).is_none() {
                outcome.errors.push(undefined_fabric(name).to_string());
            }
        }

        let definitions = self
            .fabrics
            .iter()
            .filter(|f| self.opts.fabric.as_deref().map_or(true, |name| f.name == name));
        for definition in definitions {
            let desired = vec![render::fabric_resource(definition)];
            self.apply_kind(plane, ResourceKind::Fabric, &definition.name, desired, &BTreeMap::new(), &mut outcome)
                .await;
        }

        self.finish(stage::FABRIC, &outcome).await?;
        Ok(outcome)
    }

    /// Pre-provision POAP switches and discover the SSH-reachable ones.
    /// Switches whose management IP is already in the fabric are left alone.
    pub async fn switches(&self, plane: &dyn ControlPlane) -> Result<StageOutcome> {
        let mut outcome = StageOutcome::default();

        for fabric_name in self.fabric_names() {
            let profiles = self.store.read_fabric(&fabric_name).await?;
            let definition = fabric::find(&self.fabrics, &fabric_name);
            let routing = route_all(self.selected().into_iter().filter(|s| s.fabric == fabric_name));

            let mut desired = Vec::new();
            let mut owners = BTreeMap::new();
            for (sw, triplet) in &routing.preprovision {
                let (_, pass) = self.credentials(sw);
                let resource = definition
                    .ok_or_else(|| undefined_fabric(&fabric_name))
                    .and_then(|def| render::preprovision_resource(sw, triplet, def, &pass));
                match resource {
                    Ok(resource) => {
                        owners.insert(sw.ansible_host.clone(), sw.hostname.clone());
                        desired.push(resource);
                    }
                    Err(e) => {
                        tracing::error!("Cannot pre-provision {}: {:#}", sw.hostname, e);
                        outcome.host_failures.push(HostFailure::new(&sw.hostname, &format!("{:#}", e)));
                    }
                }
            }

            for sw in &routing.discover {
                let mut sw = (*sw).clone();
                sw.profile = profiles.get(&sw.hostname).cloned();
                let (user, pass) = self.credentials(&sw);
                owners.insert(sw.ansible_host.clone(), sw.hostname.clone());
                desired.push(render::discover_resource(&sw, &user, &pass));
            }

            self.apply_kind(plane, ResourceKind::Switch, &fabric_name, desired, &owners, &mut outcome)
                .await;
        }

        self.finish(stage::SWITCHES, &outcome).await?;
        Ok(outcome)
    }

    /// Bootstrap pre-provisioned switches that have checked in to the POAP queue.
    /// Switches not in the queue yet are reported and left for a later run.
    pub async fn bootstrap(&self, queue: &dyn PoapQueue) -> Result<StageOutcome> {
        let mut outcome = StageOutcome::default();

        for fabric_name in self.fabric_names() {
            let routing = route_all(self.selected().into_iter().filter(|s| s.fabric == fabric_name));
            if routing.preprovision.is_empty() {
                continue;
            }
            let Some(definition) = fabric::find(&self.fabrics, &fabric_name) else {
                outcome.errors.push(undefined_fabric(&fabric_name).to_string());
                continue;
            };
            let waiting = match queue.waiting(&fabric_name).await {
                Ok(waiting) => waiting,
                Err(e) => {
                    tracing::error!("{} POAP queue: {:#}", fabric_name, e);
                    outcome.errors.push(format!("{} POAP queue: {:#}", fabric_name, e));
                    continue;
                }
            };

            let mut report = ApplyReport::new(ResourceKind::Switch, &fabric_name, self.opts.dry_run);
            for (sw, triplet) in &routing.preprovision {
                let key = ResourceKey::new("", "switch", &sw.ansible_host);
                let Some(entry) = waiting
                    .iter()
                    .find(|w| w.serial_number.eq_ignore_ascii_case(&triplet.serial))
                else {
                    tracing::info!("{} ({}) has not checked in yet", sw.hostname, triplet.serial);
                    continue;
                };
                if let Some(model) = entry.model.as_deref().filter(|m| *m != triplet.model) {
                    tracing::warn!("{} reports model {}, inventory says {}", sw.hostname, model, triplet.model);
                }

                let (_, pass) = self.credentials(sw);
                let result = match render::bootstrap_payload(sw, triplet, entry, definition, &pass) {
                    Ok(_) if self.opts.dry_run => {
                        tracing::info!("[dry-run] would bootstrap {} ({})", sw.hostname, triplet.serial);
                        report.planned.push(key);
                        continue;
                    }
                    Ok(payload) => queue.bootstrap(&fabric_name, &payload).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        tracing::info!("Bootstrapped {} ({})", sw.hostname, triplet.serial);
                        report.created.push(key);
                    }
                    Err(e) => {
                        tracing::error!("Failed to bootstrap {}: {:#}", sw.hostname, e);
                        let error = format!("{:#}", e);
                        outcome.host_failures.push(HostFailure::new(&sw.hostname, &error));
                        report.failed.push(ItemFailure { key, error });
                    }
                }
            }
            tracing::info!("{}", report.summary());
            outcome.reports.push(report);
        }

        self.finish(stage::BOOTSTRAP, &outcome).await?;
        Ok(outcome)
    }
}
