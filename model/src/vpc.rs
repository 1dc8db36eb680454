use crate::constants::DEFAULT_VPC_CIDR;
use crate::error::{self, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use snafu::{ensure, ResultExt};
use std::collections::{BTreeMap, BTreeSet};

/// The minimum number of distinct availability zones a usable set of subnets must span.
pub const MIN_SUBNET_ZONES: usize = 2;
/// The minimum number of subnets required in each zone counted towards [`MIN_SUBNET_ZONES`].
pub const MIN_SUBNETS_PER_ZONE: usize = 1;
/// A dedicated VPC CIDR is split into this many equally sized blocks.
const SUBNET_BLOCKS: usize = 8;
/// Each zone takes a public and a private block, so at most half the blocks can be used.
pub const MAX_DEDICATED_ZONES: usize = SUBNET_BLOCKS / 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum SubnetTopology {
    Private,
    Public,
}

derive_display_from_serialize!(SubnetTopology);
derive_fromstr_from_deserialize!(SubnetTopology);

impl SubnetTopology {
    pub const ALL: [SubnetTopology; 2] = [SubnetTopology::Private, SubnetTopology::Public];
}

/// A subnet, either one we plan to create (no id yet) or one that already exists.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Empty for existing subnets until they have been looked up.
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<Ipv4Net>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// Set when an existing VPC is used.
    pub id: Option<String>,
    pub cidr: Ipv4Net,
    pub subnets: BTreeMap<SubnetTopology, Vec<SubnetRef>>,
}

impl Default for VpcSpec {
    fn default() -> Self {
        Self {
            id: None,
            cidr: default_vpc_cidr(),
            subnets: BTreeMap::new(),
        }
    }
}

pub fn default_vpc_cidr() -> Ipv4Net {
    // The default is a valid constant.
    DEFAULT_VPC_CIDR.parse().unwrap_or_default()
}

pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net> {
    cidr.trim().parse().context(error::InvalidCidrSnafu { cidr })
}

impl VpcSpec {
    pub fn with_cidr(cidr: Ipv4Net) -> Self {
        Self {
            cidr,
            ..Self::default()
        }
    }

    pub fn subnets(&self, topology: SubnetTopology) -> &[SubnetRef] {
        self.subnets
            .get(&topology)
            .map(|subnets| subnets.as_slice())
            .unwrap_or_default()
    }

    pub fn subnet_ids(&self, topology: SubnetTopology) -> Vec<String> {
        self.subnets(topology)
            .iter()
            .filter_map(|subnet| subnet.id.clone())
            .collect()
    }

    /// Counts the subnets of `topology` in each availability zone.
    pub fn subnets_per_zone(&self, topology: SubnetTopology) -> BTreeMap<&str, usize> {
        let mut zones = BTreeMap::new();
        for subnet in self.subnets(topology) {
            *zones.entry(subnet.availability_zone.as_str()).or_default() += 1;
        }
        zones
    }

    pub fn zones(&self) -> BTreeSet<&str> {
        self.subnets
            .values()
            .flatten()
            .map(|subnet| subnet.availability_zone.as_str())
            .collect()
    }

    /// Registers a subnet under `topology`.
    pub fn add_subnet(&mut self, topology: SubnetTopology, subnet: SubnetRef) {
        self.subnets.entry(topology).or_default().push(subnet);
    }

    /// Describes the VPC and its subnets for log and error messages.
    pub fn describe(&self) -> String {
        format!(
            "VPC ({}) and subnets (private:{:?} public:{:?})",
            self.id.as_deref().unwrap_or("to be created"),
            self.subnet_labels(SubnetTopology::Private),
            self.subnet_labels(SubnetTopology::Public),
        )
    }

    fn subnet_labels(&self, topology: SubnetTopology) -> Vec<String> {
        self.subnets(topology)
            .iter()
            .map(|subnet| match (&subnet.id, &subnet.cidr) {
                (Some(id), _) => id.clone(),
                (None, Some(cidr)) => format!("{} ({})", cidr, subnet.availability_zone),
                (None, None) => subnet.availability_zone.clone(),
            })
            .collect()
    }

    /// Returns `true` when the subnets of `topology` span enough zones to be used.
    pub fn has_sufficient_subnets(&self, topology: SubnetTopology) -> bool {
        self.subnets_per_zone(topology)
            .values()
            .filter(|count| **count >= MIN_SUBNETS_PER_ZONE)
            .count()
            >= MIN_SUBNET_ZONES
    }
}

/// Splits the VPC CIDR into equally sized blocks and assigns one public and one private block to
/// each zone. Zone `i` gets public block `i` and private block `i + zones.len()`.
pub fn allocate_subnets(vpc: &mut VpcSpec, zones: &[String]) -> Result<()> {
    let cidr = vpc.cidr;
    ensure!(
        zones.len() <= MAX_DEDICATED_ZONES,
        error::SubnetAllocationSnafu {
            cidr: cidr.to_string(),
            reason: format!(
                "{} zones were requested but at most {} can be used",
                zones.len(),
                MAX_DEDICATED_ZONES
            ),
        }
    );
    let new_prefix = cidr.prefix_len() + 3;
    let blocks: Vec<Ipv4Net> = cidr
        .subnets(new_prefix)
        .map_err(|e| error::Error::SubnetAllocation {
            cidr: cidr.to_string(),
            reason: e.to_string(),
        })?
        .take(SUBNET_BLOCKS)
        .collect();

    vpc.subnets.clear();
    for (i, zone) in zones.iter().enumerate() {
        vpc.add_subnet(
            SubnetTopology::Public,
            SubnetRef {
                id: None,
                availability_zone: zone.clone(),
                cidr: blocks.get(i).copied(),
            },
        );
        vpc.add_subnet(
            SubnetTopology::Private,
            SubnetRef {
                id: None,
                availability_zone: zone.clone(),
                cidr: blocks.get(i + zones.len()).copied(),
            },
        );
    }
    Ok(())
}

/// The one sufficiency rule shared by every networking strategy. At least one topology must span
/// enough zones for the control plane, and private node networking additionally requires the
/// private subnets to span enough zones.
pub fn check_sufficiency(vpc: &VpcSpec, private_networking: bool) -> Result<()> {
    ensure!(
        vpc.has_sufficient_subnets(SubnetTopology::Public)
            || vpc.has_sufficient_subnets(SubnetTopology::Private),
        error::InsufficientSubnetsSnafu {
            reason: format!(
                "insufficient number of subnets, public and/or private subnets in at least {} \
                availability zones are required",
                MIN_SUBNET_ZONES
            ),
            examined: vpc.describe(),
        }
    );
    if private_networking {
        ensure!(
            vpc.has_sufficient_subnets(SubnetTopology::Private),
            error::InsufficientSubnetsSnafu {
                reason: format!(
                    "none or too few private subnets to use with --node-private-networking, \
                    private subnets in at least {} availability zones are required",
                    MIN_SUBNET_ZONES
                ),
                examined: vpc.describe(),
            }
        );
    }
    Ok(())
}
