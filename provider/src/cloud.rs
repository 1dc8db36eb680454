use crate::error::{AwsContext, Required};
use crate::AwsClients;
use aws_sdk_ec2::model::{Filter, Subnet, Tag};
use eksup_model::clients::{CallerIdentity, CloudProvider, ImportedVpc, SubnetDescription};
use eksup_model::{Error, Result, SubnetRef, SubnetTopology};
use ipnet::Ipv4Net;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// The tag kops puts on the resources of a cluster, holding the cluster name.
const KOPS_CLUSTER_TAG: &str = "KubernetesCluster";
/// The tag kops puts on subnets, one of `Private`, `Public` or `Utility`.
const KOPS_SUBNET_TYPE_TAG: &str = "SubnetType";

/// Read-only EC2 and STS queries.
#[derive(Clone, Debug)]
pub struct AwsCloud {
    ec2: aws_sdk_ec2::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsCloud {
    pub fn new(clients: &AwsClients) -> Self {
        Self {
            ec2: clients.ec2.clone(),
            sts: clients.sts.clone(),
        }
    }
}

#[async_trait::async_trait]
impl CloudProvider for AwsCloud {
    async fn check_auth(&self) -> Result<CallerIdentity> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| Error::Auth {
                reason: e.to_string(),
            })?;
        let identity = CallerIdentity {
            account: output
                .account()
                .required("get caller identity", "Account")?
                .to_string(),
            arn: output
                .arn()
                .required("get caller identity", "Arn")?
                .to_string(),
        };
        debug!("credentials belong to {}", identity.arn);
        Ok(identity)
    }

    async fn availability_zones(&self) -> Result<Vec<String>> {
        let output = self
            .ec2
            .describe_availability_zones()
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
            .aws_context("describe availability zones")?;
        Ok(output
            .availability_zones()
            .unwrap_or_default()
            .iter()
            .filter_map(|zone| zone.zone_name().map(|name| name.to_string()))
            .collect())
    }

    async fn describe_subnets(&self, ids: &[String]) -> Result<Vec<SubnetDescription>> {
        let output = self
            .ec2
            .describe_subnets()
            .set_subnet_ids(Some(ids.to_vec()))
            .send()
            .await
            .aws_context(format!("describe subnets {:?}", ids))?;
        output
            .subnets()
            .unwrap_or_default()
            .iter()
            .map(subnet_description)
            .collect()
    }

    async fn import_vpc(&self, source_cluster: &str) -> Result<ImportedVpc> {
        info!("looking up the network of kops cluster {:?}", source_cluster);
        let action = format!("describe subnets of kops cluster {:?}", source_cluster);
        let output = self
            .ec2
            .describe_subnets()
            .filters(
                Filter::builder()
                    .name(format!("tag:{}", KOPS_CLUSTER_TAG))
                    .values(source_cluster)
                    .build(),
            )
            .send()
            .await
            .aws_context(action.as_str())?;
        let subnets = output.subnets().unwrap_or_default();

        let vpcs: BTreeSet<&str> = subnets.iter().filter_map(|s| s.vpc_id()).collect();
        let vpc_id = match vpcs.len() {
            1 => vpcs.into_iter().next().unwrap_or_default().to_string(),
            0 => {
                return Err(Error::InvalidField {
                    reason: format!("no subnets of kops cluster {:?} were found", source_cluster),
                })
            }
            _ => {
                return Err(Error::SubnetVpcMismatch {
                    vpcs: vpcs.into_iter().map(|v| v.to_string()).collect(),
                })
            }
        };

        let mut imported = ImportedVpc {
            vpc_id: vpc_id.clone(),
            cidr: self.vpc_cidr(&vpc_id).await?,
            subnets: BTreeMap::new(),
        };
        for subnet in subnets {
            let topology = kops_topology(subnet.tags().unwrap_or_default());
            imported
                .subnets
                .entry(topology)
                .or_insert_with(Vec::new)
                .push(SubnetRef::from(subnet_description(subnet)?));
        }
        Ok(imported)
    }
}

impl AwsCloud {
    async fn vpc_cidr(&self, vpc_id: &str) -> Result<Option<Ipv4Net>> {
        let output = self
            .ec2
            .describe_vpcs()
            .vpc_ids(vpc_id)
            .send()
            .await
            .aws_context(format!("describe VPC {}", vpc_id))?;
        Ok(output
            .vpcs()
            .unwrap_or_default()
            .first()
            .and_then(|vpc| vpc.cidr_block())
            .and_then(|cidr| cidr.parse().ok()))
    }
}

fn subnet_description(subnet: &Subnet) -> Result<SubnetDescription> {
    let action = "describe subnets";
    Ok(SubnetDescription {
        id: subnet.subnet_id().required(action, "SubnetId")?.to_string(),
        availability_zone: subnet
            .availability_zone()
            .required(action, "AvailabilityZone")?
            .to_string(),
        vpc_id: subnet.vpc_id().required(action, "VpcId")?.to_string(),
        cidr: subnet.cidr_block().and_then(|cidr| cidr.parse().ok()),
    })
}

/// kops `Utility` subnets hold the load balancers and NAT gateways of a private topology, so
/// they count as public.
fn kops_topology(tags: &[Tag]) -> SubnetTopology {
    let subnet_type = tags
        .iter()
        .find(|tag| tag.key() == Some(KOPS_SUBNET_TYPE_TAG))
        .and_then(|tag| tag.value());
    match subnet_type {
        Some("Private") => SubnetTopology::Private,
        _ => SubnetTopology::Public,
    }
}

#[test]
fn kops_subnet_types() {
    let tag = |value: &str| {
        vec![Tag::builder()
            .key(KOPS_SUBNET_TYPE_TAG)
            .value(value)
            .build()]
    };
    assert_eq!(kops_topology(&tag("Private")), SubnetTopology::Private);
    assert_eq!(kops_topology(&tag("Utility")), SubnetTopology::Public);
    assert_eq!(kops_topology(&tag("Public")), SubnetTopology::Public);
    assert_eq!(kops_topology(&[]), SubnetTopology::Public);
}
