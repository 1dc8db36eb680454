/*!

Selects and carries out the networking strategy for the new cluster. [`NetworkingPlan::decide`]
is a pure function of the inputs, [`realize`] performs the cloud lookups and fills in the VPC of
the request. Every strategy ends in the same sufficiency check.

!*/

use crate::clients::CloudProvider;
use crate::error::{self, Result};
use crate::request::ClusterCreationRequest;
use crate::vpc::{allocate_subnets, check_sufficiency, SubnetTopology, MIN_SUBNET_ZONES};
use log::{error, info, warn};
use snafu::ensure;
use std::collections::{BTreeMap, BTreeSet};

/// The number of zones picked when none are given.
pub const AUTO_SELECT_ZONES: usize = 3;

/// Zones in which EKS control planes cannot be placed.
pub const UNSUPPORTED_ZONES: &[&str] = &["us-east-1e"];

pub const CUSTOM_NETWORKING_NOTICE: &str = "custom VPC/subnets will be used; if resulting cluster \
doesn't function as expected, make sure to review the configuration of VPC/subnets";

const SUBNETS_OPTION: &str = "--vpc-private-subnets/--vpc-public-subnets";
const IMPORT_OPTION: &str = "--vpc-from-kops-cluster";
const ZONES_OPTION: &str = "--zones";

/// The inputs that decide the networking strategy.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetworkingSignals {
    pub subnets: BTreeMap<SubnetTopology, Vec<String>>,
    pub import_from: Option<String>,
    pub zones: Vec<String>,
}

impl NetworkingSignals {
    /// Collects the signals from a request and the optional import source.
    pub fn from_request(request: &ClusterCreationRequest, import_from: Option<&str>) -> Self {
        let subnets = SubnetTopology::ALL
            .iter()
            .map(|topology| (*topology, request.vpc.subnet_ids(*topology)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        Self {
            subnets,
            import_from: import_from
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            zones: request.availability_zones.clone(),
        }
    }

    fn has_subnets(&self) -> bool {
        self.subnets.values().any(|ids| !ids.is_empty())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkingPlan {
    /// Create a VPC for the cluster in these zones. Empty means they are auto-selected.
    DedicatedNew { zones: Vec<String> },
    /// Use the VPC of the named externally managed cluster.
    ImportedFrom { source: String },
    /// Use these existing subnets.
    ExplicitSubnets {
        subnets: BTreeMap<SubnetTopology, Vec<String>>,
    },
}

impl NetworkingPlan {
    /// Chooses exactly one plan. Any two signals given together are a configuration conflict.
    pub fn decide(signals: &NetworkingSignals) -> Result<Self> {
        let has_zones = !signals.zones.is_empty();
        let has_subnets = signals.has_subnets();
        match &signals.import_from {
            Some(source) => {
                ensure!(
                    !has_zones,
                    error::IncompatibleOptionsSnafu {
                        first: IMPORT_OPTION,
                        second: ZONES_OPTION,
                    }
                );
                ensure!(
                    !has_subnets,
                    error::IncompatibleOptionsSnafu {
                        first: IMPORT_OPTION,
                        second: SUBNETS_OPTION,
                    }
                );
                Ok(NetworkingPlan::ImportedFrom {
                    source: source.clone(),
                })
            }
            None if has_subnets => {
                ensure!(
                    !has_zones,
                    error::IncompatibleOptionsSnafu {
                        first: SUBNETS_OPTION,
                        second: ZONES_OPTION,
                    }
                );
                Ok(NetworkingPlan::ExplicitSubnets {
                    subnets: signals.subnets.clone(),
                })
            }
            None => Ok(NetworkingPlan::DedicatedNew {
                zones: signals.zones.clone(),
            }),
        }
    }
}

/// Picks the first [`AUTO_SELECT_ZONES`] zones in sorted order, skipping unsupported ones.
pub fn select_zones(region: &str, available: &[String]) -> Result<Vec<String>> {
    let usable: BTreeSet<&String> = available
        .iter()
        .filter(|zone| !UNSUPPORTED_ZONES.contains(&zone.as_str()))
        .collect();
    ensure!(
        usable.len() >= MIN_SUBNET_ZONES,
        error::InsufficientZonesSnafu {
            region,
            found: usable.len(),
            required: MIN_SUBNET_ZONES,
        }
    );
    Ok(usable
        .into_iter()
        .take(AUTO_SELECT_ZONES)
        .cloned()
        .collect())
}

/// Performs the plan, filling in the VPC and zones of `request`, then checks that the resulting
/// subnets are sufficient.
pub async fn realize(
    plan: &NetworkingPlan,
    cloud: &dyn CloudProvider,
    request: &mut ClusterCreationRequest,
) -> Result<()> {
    let region = request.metadata.region.clone();
    let private_networking = request.node_group.private_networking;
    match plan {
        NetworkingPlan::DedicatedNew { zones } => {
            let zones = if zones.is_empty() {
                let available = cloud.availability_zones().await?;
                let selected = select_zones(&region, &available)?;
                info!("setting availability zones to {:?}", selected);
                selected
            } else {
                ensure!(
                    zones.len() >= MIN_SUBNET_ZONES,
                    error::InvalidFieldSnafu {
                        reason: format!(
                            "only {} zones specified {:?}, {} are required",
                            zones.len(),
                            zones,
                            MIN_SUBNET_ZONES
                        ),
                    }
                );
                zones.clone()
            };
            allocate_subnets(&mut request.vpc, &zones)?;
            request.availability_zones = zones;
            check_sufficiency(&request.vpc, private_networking)?;
            info!("subnets for {:?} will be created", request.availability_zones);
        }
        NetworkingPlan::ImportedFrom { source } => {
            let imported = cloud.import_vpc(source).await?;
            request.vpc.id = Some(imported.vpc_id);
            if let Some(cidr) = imported.cidr {
                request.vpc.cidr = cidr;
            }
            request.vpc.subnets = imported.subnets;
            request.availability_zones = zones_of(request);
            check_sufficiency(&request.vpc, private_networking)?;
            info!("using {} from kops cluster {:?}", request.vpc.describe(), source);
            warn!("{}", CUSTOM_NETWORKING_NOTICE);
        }
        NetworkingPlan::ExplicitSubnets { subnets } => {
            let ids: Vec<String> = subnets.values().flatten().cloned().collect();
            let described = cloud.describe_subnets(&ids).await?;
            let vpcs: BTreeSet<&str> = described.iter().map(|s| s.vpc_id.as_str()).collect();
            ensure!(
                vpcs.len() == 1,
                error::SubnetVpcMismatchSnafu {
                    vpcs: vpcs.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
                }
            );
            request.vpc.id = vpcs.iter().next().map(|v| v.to_string());
            request.vpc.subnets.clear();
            for (topology, topology_ids) in subnets {
                for id in topology_ids {
                    let subnet = described.iter().find(|s| &s.id == id).ok_or_else(|| {
                        error::Error::InvalidField {
                            reason: format!("subnet {:?} was not found", id),
                        }
                    })?;
                    request.vpc.add_subnet(*topology, subnet.clone().into());
                }
            }
            request.availability_zones = zones_of(request);
            if let Err(e) = check_sufficiency(&request.vpc, private_networking) {
                error!("unable to use given {}", request.vpc.describe());
                return Err(e);
            }
            info!("using existing {}", request.vpc.describe());
            warn!("{}", CUSTOM_NETWORKING_NOTICE);
        }
    }
    Ok(())
}

fn zones_of(request: &ClusterCreationRequest) -> Vec<String> {
    request
        .vpc
        .zones()
        .into_iter()
        .map(|z| z.to_string())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn signals(subnets: bool, import: bool, zones: bool) -> NetworkingSignals {
        let mut s = NetworkingSignals::default();
        if subnets {
            s.subnets
                .insert(SubnetTopology::Public, ids(&["subnet-1", "subnet-2"]));
        }
        if import {
            s.import_from = Some("kops-cluster".to_string());
        }
        if zones {
            s.zones = ids(&["us-west-2a", "us-west-2b"]);
        }
        s
    }

    #[test]
    fn exactly_one_plan_per_input() {
        assert_eq!(
            NetworkingPlan::decide(&signals(false, false, false)).unwrap(),
            NetworkingPlan::DedicatedNew { zones: vec![] }
        );
        assert!(matches!(
            NetworkingPlan::decide(&signals(false, false, true)).unwrap(),
            NetworkingPlan::DedicatedNew { zones } if zones.len() == 2
        ));
        assert!(matches!(
            NetworkingPlan::decide(&signals(false, true, false)).unwrap(),
            NetworkingPlan::ImportedFrom { .. }
        ));
        assert!(matches!(
            NetworkingPlan::decide(&signals(true, false, false)).unwrap(),
            NetworkingPlan::ExplicitSubnets { .. }
        ));
    }

    #[test]
    fn any_two_signals_conflict() {
        for (subnets, import, zones) in [
            (true, true, false),
            (true, false, true),
            (false, true, true),
            (true, true, true),
        ] {
            let err = NetworkingPlan::decide(&signals(subnets, import, zones)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
        }
        let err = NetworkingPlan::decide(&signals(false, true, true)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "--vpc-from-kops-cluster and --zones cannot be used at the same time"
        );
    }

    #[test]
    fn zone_selection() {
        let available = ids(&["us-east-1e", "us-east-1d", "us-east-1a", "us-east-1c", "us-east-1b"]);
        assert_eq!(
            select_zones("us-east-1", &available).unwrap(),
            ids(&["us-east-1a", "us-east-1b", "us-east-1c"])
        );
        assert_eq!(
            select_zones("x", &ids(&["b", "a"])).unwrap(),
            ids(&["a", "b"])
        );
        let err = select_zones("us-east-1", &ids(&["us-east-1a", "us-east-1e"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
