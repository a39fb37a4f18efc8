pub mod client;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::apply::{ControlPlane, DesiredResource, ResourceKey, ResourceKind};
pub use client::{ApiError, NdfcClient};

#[async_trait]
impl ControlPlane for NdfcClient {
    async fn existing_keys(&self, kind: ResourceKind, fabric: &str, serials: &[String]) -> Result<BTreeSet<ResourceKey>> {
        let mut keys = BTreeSet::new();
        match kind {
            ResourceKind::Fabric => {
                for f in self.list_fabrics().await? {
                    keys.insert(ResourceKey::new("", "fabric", &f.fabric_name));
                }
            }
            ResourceKind::Switch => {
                for sw in self.list_switches(fabric).await? {
                    keys.insert(ResourceKey::new("", "switch", &sw.ip_address));
                }
            }
            ResourceKind::Policy => {
                for serial in serials {
                    for p in self.list_policies(serial).await? {
                        let description = p.description.unwrap_or_default();
                        keys.insert(ResourceKey::new(&p.serial_number, &p.template_name, &description));
                    }
                }
            }
            ResourceKind::VpcPair => {
                for serial in serials {
                    // Either peer answers for the pair
                    let first = serial.split('~').next().unwrap_or(serial);
                    if let Some(pair) = self.get_vpc_pair(first).await? {
                        let pair_serial = types::pair_serial(&pair.peer_one_id, &pair.peer_two_id);
                        keys.insert(ResourceKey::new(&pair_serial, "vpc_pair", ""));
                    }
                }
            }
            ResourceKind::Interface => {
                // VPC interfaces are owned by "A~B"; they are read back through peer A
                for serial in serials {
                    let first = serial.split('~').next().unwrap_or(serial);
                    for group in self.list_interfaces(first).await? {
                        for iface in group.interfaces {
                            keys.insert(ResourceKey::new(serial, &group.policy, &iface.if_name));
                        }
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn create(&self, fabric: &str, resource: &DesiredResource) -> Result<()> {
        match resource {
            DesiredResource::Fabric(f) => self.create_fabric(f).await,
            DesiredResource::Preprovision(p) => self.submit_poap(fabric, std::slice::from_ref(p)).await,
            DesiredResource::Discover(d) => self.discover(fabric, d).await,
            DesiredResource::Policy(p) => self.create_policy(p).await,
            DesiredResource::VpcPair(v) => self.create_vpc_pair(v).await,
            DesiredResource::Interface(i) => self.create_interface(i).await,
        }
    }
}
