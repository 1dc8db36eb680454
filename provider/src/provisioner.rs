/*!

Creates the EKS control plane and its node group by calling the IAM, EC2 and EKS APIs directly.
The IAM roles and the network do not depend on each other and are created concurrently. Nothing
is rolled back: every error is collected into the [`ProvisioningResult`] and the resources already
created are left for the cleanup command.

!*/

use crate::error::{AwsContext, Required};
use crate::tags::{cluster_tags, ec2_tag_specification, hash_map, iam_tags};
use crate::AwsClients;
use aws_sdk_ec2::model::{
    AttributeBooleanValue, DomainType, InstanceType, IpPermission, IpRange,
    LaunchTemplateBlockDeviceMappingRequest, LaunchTemplateEbsBlockDeviceRequest,
    NatGatewayState, RequestLaunchTemplateData, ResourceType, VolumeType,
};
use aws_sdk_eks::error::{CreateClusterError, CreateClusterErrorKind};
use aws_sdk_eks::model::{
    ClusterStatus, LaunchTemplateSpecification, NodegroupScalingConfig, VpcConfigRequest,
};
use aws_sdk_eks::output::CreateClusterOutput;
use aws_sdk_eks::types::SdkError;
use eksup_model::clients::{ClusterConnection, Provisioner, ProvisioningResult};
use eksup_model::constants::{LABEL_NODEGROUP_NAME, TAG_NODEGROUP_NAME};
use eksup_model::readiness::wait::{poll_until, Poll};
use eksup_model::{ClusterCreationRequest, Error, NodeGroupSpec, Result, SubnetTopology};
use log::{debug, info, trace};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLICY_ARN_PREFIX: &str = "arn:aws:iam::aws:policy/";
const SERVICE_ROLE_POLICIES: &[&str] = &["AmazonEKSClusterPolicy", "AmazonEKSServicePolicy"];
const NODE_ROLE_POLICIES: &[&str] = &[
    "AmazonEKSWorkerNodePolicy",
    "AmazonEKS_CNI_Policy",
    "AmazonEC2ContainerRegistryReadOnly",
];
const ECR_POWER_USER_POLICY: &str = "AmazonEC2ContainerRegistryPowerUser";

/// IAM role names are limited to 64 characters.
const MAX_ROLE_NAME_LEN: usize = 64;

const CLUSTER_POLL_INTERVAL: Duration = Duration::from_secs(30);
const NAT_GATEWAY_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// New IAM roles take a few seconds before EKS accepts them.
const ROLE_PROPAGATION_RETRIES: usize = 6;
const ROLE_PROPAGATION_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Roles {
    service_role_arn: String,
    node_role_arn: String,
}

#[derive(Debug, Default)]
struct Network {
    vpc_id: String,
    subnet_ids: BTreeMap<SubnetTopology, Vec<String>>,
}

impl Network {
    fn all_subnet_ids(&self) -> Vec<String> {
        self.subnet_ids.values().flatten().cloned().collect()
    }
}

/// Creates EKS clusters. Internal waits are bounded by `timeout` and stop when `cancel` fires.
#[derive(Clone, Debug)]
pub struct AwsProvisioner {
    ec2: aws_sdk_ec2::Client,
    eks: aws_sdk_eks::Client,
    iam: aws_sdk_iam::Client,
    timeout: Duration,
    cancel: CancellationToken,
}

impl AwsProvisioner {
    pub fn new(clients: &AwsClients, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            ec2: clients.ec2.clone(),
            eks: clients.eks.clone(),
            iam: clients.iam.clone(),
            timeout,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl Provisioner for AwsProvisioner {
    async fn create_cluster_with_node_group(
        &self,
        request: &ClusterCreationRequest,
    ) -> ProvisioningResult {
        let tags = cluster_tags(&request.metadata);
        let mut errors = Vec::new();

        let (roles, network) = futures::join!(
            self.create_roles(request, &tags),
            self.create_network(request, &tags)
        );
        let (roles, network) = match (roles, network) {
            (Ok(roles), Ok(network)) => (roles, network),
            (roles, network) => {
                errors.extend(roles.err());
                errors.extend(network.err());
                return ProvisioningResult::new(errors);
            }
        };
        debug!("created {:?} and {:?}", roles, network);

        if let Err(e) = self
            .create_control_plane(request, &roles, &network, &tags)
            .await
        {
            errors.push(e);
            return ProvisioningResult::new(errors);
        }
        if let Err(e) = self
            .create_node_group(request, &roles, &network, &tags)
            .await
        {
            errors.push(e);
        }
        ProvisioningResult::new(errors)
    }

    async fn cluster_connection(
        &self,
        request: &ClusterCreationRequest,
    ) -> Result<ClusterConnection> {
        let name = &request.metadata.name;
        let action = "describe cluster";
        let output = self
            .eks
            .describe_cluster()
            .name(name)
            .send()
            .await
            .aws_context(format!("describe cluster {:?}", name))?;
        let cluster = output.cluster().required(action, "cluster")?;
        let endpoint = cluster.endpoint().required(action, "endpoint")?;
        let certificate_authority_data = cluster
            .certificate_authority()
            .and_then(|ca| ca.data())
            .required(action, "certificateAuthority.data")?;

        let node_role = role_name(name, "NodeInstanceRole");
        let role = self
            .iam
            .get_role()
            .role_name(&node_role)
            .send()
            .await
            .aws_context(format!("get role {}", node_role))?;
        let node_instance_role_arn = role
            .role()
            .and_then(|r| r.arn())
            .required("get role", "Arn")?;

        Ok(ClusterConnection {
            endpoint: endpoint.to_string(),
            certificate_authority_data: certificate_authority_data.to_string(),
            node_instance_role_arn: node_instance_role_arn.to_string(),
        })
    }
}

impl AwsProvisioner {
    async fn create_roles(
        &self,
        request: &ClusterCreationRequest,
        tags: &BTreeMap<String, String>,
    ) -> Result<Roles> {
        let name = &request.metadata.name;
        let addons = &request.addons.with_iam;

        let service_role_arn = self
            .create_role(
                &role_name(name, "ServiceRole"),
                "eks.amazonaws.com",
                SERVICE_ROLE_POLICIES,
                tags,
            )
            .await?;

        let mut node_policies = NODE_ROLE_POLICIES.to_vec();
        if addons.policy_ecr_power_user {
            node_policies.push(ECR_POWER_USER_POLICY);
        }
        let node_role = role_name(name, "NodeInstanceRole");
        let node_role_arn = self
            .create_role(&node_role, "ec2.amazonaws.com", &node_policies, tags)
            .await?;
        if addons.policy_auto_scaling {
            self.put_role_policy(&node_role, "PolicyAutoScaling", auto_scaling_policy())
                .await?;
        }
        if addons.policy_external_dns {
            self.put_role_policy(&node_role, "PolicyExternalDNS", external_dns_policy())
                .await?;
        }

        Ok(Roles {
            service_role_arn,
            node_role_arn,
        })
    }

    async fn create_role(
        &self,
        role_name: &str,
        service: &str,
        policies: &[&str],
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        let trust = json!({"Version": "2012-10-17", "Statement": [{
            "Effect": "Allow",
            "Principal": {
                "Service": service
            },
            "Action": "sts:AssumeRole"
        }]});
        info!("creating IAM role {}", role_name);
        let output = self
            .iam
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust.to_string())
            .set_tags(Some(iam_tags(tags)))
            .send()
            .await
            .aws_context(format!("create role {}", role_name))?;
        let arn = output
            .role()
            .and_then(|r| r.arn())
            .required("create role", "Arn")?
            .to_string();

        for policy in policies {
            let policy_arn = format!("{}{}", POLICY_ARN_PREFIX, policy);
            self.iam
                .attach_role_policy()
                .role_name(role_name)
                .policy_arn(&policy_arn)
                .send()
                .await
                .aws_context(format!(
                    "attach policy {} to role {}",
                    policy_arn, role_name
                ))?;
        }
        Ok(arn)
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: serde_json::Value,
    ) -> Result<()> {
        self.iam
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document.to_string())
            .send()
            .await
            .aws_context(format!(
                "put policy {} on role {}",
                policy_name, role_name
            ))?;
        Ok(())
    }

    /// Uses the existing VPC when there is one, otherwise creates the VPC, its subnets, an
    /// internet gateway for the public subnets and a NAT gateway for the private ones.
    async fn create_network(
        &self,
        request: &ClusterCreationRequest,
        tags: &BTreeMap<String, String>,
    ) -> Result<Network> {
        let vpc = &request.vpc;
        if let Some(vpc_id) = &vpc.id {
            info!("using existing VPC {}", vpc_id);
            return Ok(Network {
                vpc_id: vpc_id.clone(),
                subnet_ids: SubnetTopology::ALL
                    .iter()
                    .map(|topology| (*topology, vpc.subnet_ids(*topology)))
                    .collect(),
            });
        }

        let prefix = format!("eksup-{}", request.metadata.name);
        info!("creating VPC {} with CIDR {}", prefix, vpc.cidr);
        let vpc_id = self
            .ec2
            .create_vpc()
            .cidr_block(vpc.cidr.to_string())
            .tag_specifications(ec2_tag_specification(ResourceType::Vpc, &prefix, tags))
            .send()
            .await
            .aws_context("create VPC")?
            .vpc()
            .and_then(|v| v.vpc_id())
            .required("create VPC", "VpcId")?
            .to_string();
        self.ec2
            .modify_vpc_attribute()
            .vpc_id(&vpc_id)
            .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .aws_context("enable DNS hostnames")?;

        let igw_id = self
            .ec2
            .create_internet_gateway()
            .tag_specifications(ec2_tag_specification(
                ResourceType::InternetGateway,
                &prefix,
                tags,
            ))
            .send()
            .await
            .aws_context("create internet gateway")?
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .required("create internet gateway", "InternetGatewayId")?
            .to_string();
        self.ec2
            .attach_internet_gateway()
            .internet_gateway_id(&igw_id)
            .vpc_id(&vpc_id)
            .send()
            .await
            .aws_context("attach internet gateway")?;

        let mut network = Network {
            vpc_id: vpc_id.clone(),
            subnet_ids: BTreeMap::new(),
        };

        let public_table = self
            .create_route_table(&vpc_id, &format!("{}-public", prefix), tags)
            .await?;
        self.ec2
            .create_route()
            .route_table_id(&public_table)
            .destination_cidr_block("0.0.0.0/0")
            .gateway_id(&igw_id)
            .send()
            .await
            .aws_context("create public route")?;
        for subnet in vpc.subnets(SubnetTopology::Public) {
            let id = self
                .create_subnet(&vpc_id, SubnetTopology::Public, subnet, &public_table, tags)
                .await?;
            network
                .subnet_ids
                .entry(SubnetTopology::Public)
                .or_insert_with(Vec::new)
                .push(id);
        }

        let private = vpc.subnets(SubnetTopology::Private);
        if private.is_empty() {
            return Ok(network);
        }
        let nat_subnet = network
            .subnet_ids
            .get(&SubnetTopology::Public)
            .and_then(|ids| ids.first())
            .cloned()
            .required("create NAT gateway", "public subnet")?;
        let nat_id = self.create_nat_gateway(&nat_subnet, &prefix, tags).await?;
        let private_table = self
            .create_route_table(&vpc_id, &format!("{}-private", prefix), tags)
            .await?;
        self.ec2
            .create_route()
            .route_table_id(&private_table)
            .destination_cidr_block("0.0.0.0/0")
            .nat_gateway_id(&nat_id)
            .send()
            .await
            .aws_context("create private route")?;
        for subnet in private {
            let id = self
                .create_subnet(&vpc_id, SubnetTopology::Private, subnet, &private_table, tags)
                .await?;
            network
                .subnet_ids
                .entry(SubnetTopology::Private)
                .or_insert_with(Vec::new)
                .push(id);
        }
        Ok(network)
    }

    async fn create_route_table(
        &self,
        vpc_id: &str,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        Ok(self
            .ec2
            .create_route_table()
            .vpc_id(vpc_id)
            .tag_specifications(ec2_tag_specification(ResourceType::RouteTable, name, tags))
            .send()
            .await
            .aws_context(format!("create route table {}", name))?
            .route_table()
            .and_then(|t| t.route_table_id())
            .required("create route table", "RouteTableId")?
            .to_string())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        topology: SubnetTopology,
        subnet: &eksup_model::SubnetRef,
        route_table_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        let cidr = subnet
            .cidr
            .required("create subnet", format!("CIDR of {} subnet", topology))?;
        let mut subnet_tags = tags.clone();
        let (role_tag, name) = match topology {
            SubnetTopology::Public => ("kubernetes.io/role/elb", "public"),
            SubnetTopology::Private => ("kubernetes.io/role/internal-elb", "private"),
        };
        subnet_tags.insert(role_tag.to_string(), "1".to_string());
        let subnet_name = format!("{}-{}", name, subnet.availability_zone);
        debug!("creating subnet {} with CIDR {}", subnet_name, cidr);

        let subnet_id = self
            .ec2
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr.to_string())
            .availability_zone(&subnet.availability_zone)
            .tag_specifications(ec2_tag_specification(
                ResourceType::Subnet,
                &subnet_name,
                &subnet_tags,
            ))
            .send()
            .await
            .aws_context(format!("create subnet {}", subnet_name))?
            .subnet()
            .and_then(|s| s.subnet_id())
            .required("create subnet", "SubnetId")?
            .to_string();
        if topology == SubnetTopology::Public {
            self.ec2
                .modify_subnet_attribute()
                .subnet_id(&subnet_id)
                .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
                .send()
                .await
                .aws_context(format!("map public IPs in subnet {}", subnet_id))?;
        }
        self.ec2
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(&subnet_id)
            .send()
            .await
            .aws_context(format!("associate route table with subnet {}", subnet_id))?;
        Ok(subnet_id)
    }

    async fn create_nat_gateway(
        &self,
        subnet_id: &str,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        let allocation_id = self
            .ec2
            .allocate_address()
            .domain(DomainType::Vpc)
            .tag_specifications(ec2_tag_specification(ResourceType::ElasticIp, name, tags))
            .send()
            .await
            .aws_context("allocate elastic IP")?
            .allocation_id()
            .required("allocate elastic IP", "AllocationId")?
            .to_string();
        let nat_id = self
            .ec2
            .create_nat_gateway()
            .subnet_id(subnet_id)
            .allocation_id(&allocation_id)
            .tag_specifications(ec2_tag_specification(ResourceType::Natgateway, name, tags))
            .send()
            .await
            .aws_context("create NAT gateway")?
            .nat_gateway()
            .and_then(|n| n.nat_gateway_id())
            .required("create NAT gateway", "NatGatewayId")?
            .to_string();

        let ec2 = &self.ec2;
        let nat = nat_id.as_str();
        let state = poll_until(
            &format!("NAT gateway {} to become available", nat_id),
            self.timeout,
            NAT_GATEWAY_POLL_INTERVAL,
            &self.cancel,
            || async move {
                let output = ec2
                    .describe_nat_gateways()
                    .nat_gateway_ids(nat)
                    .send()
                    .await
                    .aws_context("describe NAT gateways")?;
                match output
                    .nat_gateways()
                    .and_then(|gateways| gateways.first())
                    .and_then(|gateway| gateway.state())
                {
                    Some(NatGatewayState::Pending) | None => Ok(Poll::Pending(format!(
                        "NAT gateway {} is pending",
                        nat
                    ))),
                    Some(state) => Ok(Poll::Done(state.clone())),
                }
            },
        )
        .await?;
        if state != NatGatewayState::Available {
            return Err(Error::InvalidField {
                reason: format!("NAT gateway {} is {}", nat_id, state.as_str()),
            });
        }
        Ok(nat_id)
    }

    async fn create_control_plane(
        &self,
        request: &ClusterCreationRequest,
        roles: &Roles,
        network: &Network,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let meta = &request.metadata;
        let version = meta.version.major_minor_without_v();
        info!("creating EKS control plane {:?} with version {}", meta.name, version);

        let mut attempt = 0;
        loop {
            let result = self
                .eks
                .create_cluster()
                .name(&meta.name)
                .version(&version)
                .role_arn(&roles.service_role_arn)
                .resources_vpc_config(
                    VpcConfigRequest::builder()
                        .set_subnet_ids(Some(network.all_subnet_ids()))
                        .build(),
                )
                .set_tags(Some(hash_map(tags)))
                .send()
                .await;
            attempt += 1;
            if attempt < ROLE_PROPAGATION_RETRIES && role_not_ready(&result) {
                trace!("service role is not usable yet, retrying");
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(Error::Cancelled {
                            what: format!("the service role of {:?} to propagate", meta.name),
                        });
                    }
                    _ = tokio::time::sleep(ROLE_PROPAGATION_DELAY) => continue,
                }
            }
            result.aws_context(format!("create EKS cluster {:?}", meta.name))?;
            break;
        }

        let eks = &self.eks;
        let name = meta.name.as_str();
        let status = poll_until(
            &format!("EKS control plane {:?} to become active", name),
            self.timeout,
            CLUSTER_POLL_INTERVAL,
            &self.cancel,
            || async move {
                let output = eks
                    .describe_cluster()
                    .name(name)
                    .send()
                    .await
                    .aws_context("describe cluster")?;
                match output.cluster().and_then(|c| c.status()) {
                    Some(ClusterStatus::Active) => Ok(Poll::Done(ClusterStatus::Active)),
                    Some(ClusterStatus::Failed) => Ok(Poll::Done(ClusterStatus::Failed)),
                    status => Ok(Poll::Pending(format!(
                        "control plane status is {}",
                        status.map(|s| s.as_str()).unwrap_or("unknown")
                    ))),
                }
            },
        )
        .await?;
        if status != ClusterStatus::Active {
            return Err(Error::InvalidField {
                reason: format!("EKS control plane {:?} is {}", name, status.as_str()),
            });
        }
        Ok(())
    }

    async fn create_node_group(
        &self,
        request: &ClusterCreationRequest,
        roles: &Roles,
        network: &Network,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let meta = &request.metadata;
        let ng = &request.node_group;
        let topology = if ng.private_networking {
            SubnetTopology::Private
        } else {
            SubnetTopology::Public
        };
        let subnets = network
            .subnet_ids
            .get(&topology)
            .cloned()
            .unwrap_or_default();

        let mut security_groups = vec![self.cluster_security_group(&meta.name).await?];
        if ng.allow_ssh {
            security_groups.push(self.create_ssh_security_group(request, network, tags).await?);
        }

        let ami = ng
            .ami
            .id()
            .required("create launch template", "image id")?;
        let template_name = format!("eksup-{}-{}", meta.name, ng.name);
        let template_id = self
            .ec2
            .create_launch_template()
            .launch_template_name(&template_name)
            .launch_template_data(
                RequestLaunchTemplateData::builder()
                    .image_id(ami)
                    .instance_type(InstanceType::from(ng.instance_type.as_str()))
                    .set_key_name(ng.ssh_key_name.clone())
                    .set_security_group_ids(Some(security_groups))
                    .user_data(user_data(&meta.name, ng))
                    .block_device_mappings(
                        LaunchTemplateBlockDeviceMappingRequest::builder()
                            .device_name("/dev/xvda")
                            .ebs(
                                LaunchTemplateEbsBlockDeviceRequest::builder()
                                    .volume_size(ng.volume_size as i32)
                                    .volume_type(VolumeType::Gp2)
                                    .delete_on_termination(true)
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .aws_context(format!("create launch template {}", template_name))?
            .launch_template()
            .and_then(|t| t.launch_template_id())
            .required("create launch template", "LaunchTemplateId")?
            .to_string();

        let mut nodegroup_tags = hash_map(tags);
        nodegroup_tags.insert(TAG_NODEGROUP_NAME.to_string(), ng.name.clone());
        info!("creating node group {:?} with {} node(s)", ng.name, ng.desired_capacity);
        self.eks
            .create_nodegroup()
            .cluster_name(&meta.name)
            .nodegroup_name(&ng.name)
            .node_role(&roles.node_role_arn)
            .set_subnets(Some(subnets))
            .scaling_config(
                NodegroupScalingConfig::builder()
                    .min_size(ng.min_size as i32)
                    .max_size(ng.max_size as i32)
                    .desired_size(ng.desired_capacity as i32)
                    .build(),
            )
            .launch_template(LaunchTemplateSpecification::builder().id(template_id).build())
            .labels(LABEL_NODEGROUP_NAME, &ng.name)
            .set_tags(Some(nodegroup_tags))
            .send()
            .await
            .aws_context(format!("create node group {:?}", ng.name))?;
        Ok(())
    }

    async fn cluster_security_group(&self, cluster_name: &str) -> Result<String> {
        let output = self
            .eks
            .describe_cluster()
            .name(cluster_name)
            .send()
            .await
            .aws_context(format!("describe cluster {:?}", cluster_name))?;
        Ok(output
            .cluster()
            .and_then(|c| c.resources_vpc_config())
            .and_then(|c| c.cluster_security_group_id())
            .required("describe cluster", "clusterSecurityGroupId")?
            .to_string())
    }

    async fn create_ssh_security_group(
        &self,
        request: &ClusterCreationRequest,
        network: &Network,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        let name = format!(
            "eksup-{}-{}-ssh",
            request.metadata.name, request.node_group.name
        );
        let group_id = self
            .ec2
            .create_security_group()
            .group_name(&name)
            .description("Allow SSH access to the nodes")
            .vpc_id(&network.vpc_id)
            .tag_specifications(ec2_tag_specification(
                ResourceType::SecurityGroup,
                &name,
                tags,
            ))
            .send()
            .await
            .aws_context(format!("create security group {}", name))?
            .group_id()
            .required("create security group", "GroupId")?
            .to_string();
        self.ec2
            .authorize_security_group_ingress()
            .group_id(&group_id)
            .ip_permissions(
                IpPermission::builder()
                    .ip_protocol("tcp")
                    .from_port(22)
                    .to_port(22)
                    .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
                    .build(),
            )
            .send()
            .await
            .aws_context(format!("allow SSH in security group {}", group_id))?;
        Ok(group_id)
    }
}

fn role_not_ready(
    result: &std::result::Result<CreateClusterOutput, SdkError<CreateClusterError>>,
) -> bool {
    match result {
        Err(SdkError::ServiceError(service_error)) => match &service_error.err().kind {
            CreateClusterErrorKind::InvalidParameterException(e) => {
                is_role_propagation_message(e.message())
            }
            _ => false,
        },
        _ => false,
    }
}

/// EKS rejects a role it cannot assume yet with "Role with arn: ... could not be assumed".
fn is_role_propagation_message(message: Option<&str>) -> bool {
    message
        .map(|m| m.contains("could not be assumed"))
        .unwrap_or(false)
}

/// `eksup-<cluster>-<suffix>`, shortening the cluster part so the suffix always survives the
/// IAM length limit.
fn role_name(cluster_name: &str, suffix: &str) -> String {
    let fixed = "eksup-".len() + 1 + suffix.len();
    let cluster: String = cluster_name
        .chars()
        .take(MAX_ROLE_NAME_LEN.saturating_sub(fixed))
        .collect();
    format!("eksup-{}-{}", cluster, suffix)
}

/// The node bootstrap script, base64 encoded for the launch template.
fn user_data(cluster_name: &str, ng: &NodeGroupSpec) -> String {
    let mut kubelet_args = format!("--node-labels={}={}", LABEL_NODEGROUP_NAME, ng.name);
    if let Some(max_pods) = ng.max_pods_per_node {
        kubelet_args.push_str(&format!(" --max-pods={}", max_pods));
    }
    let bootstrap_args = if ng.max_pods_per_node.is_some() {
        " --use-max-pods false"
    } else {
        ""
    };
    base64::encode(format!(
        r#"#!/bin/bash
set -o xtrace
/etc/eks/bootstrap.sh '{}'{} --kubelet-extra-args '{}'
"#,
        cluster_name, bootstrap_args, kubelet_args
    ))
}

fn auto_scaling_policy() -> serde_json::Value {
    json!({"Version": "2012-10-17", "Statement": [{
        "Effect": "Allow",
        "Action": [
            "autoscaling:DescribeAutoScalingGroups",
            "autoscaling:DescribeAutoScalingInstances",
            "autoscaling:DescribeLaunchConfigurations",
            "autoscaling:DescribeTags",
            "autoscaling:SetDesiredCapacity",
            "autoscaling:TerminateInstanceInAutoScalingGroup"
        ],
        "Resource": "*"
    }]})
}

fn external_dns_policy() -> serde_json::Value {
    json!({"Version": "2012-10-17", "Statement": [
        {
            "Effect": "Allow",
            "Action": ["route53:ChangeResourceRecordSets"],
            "Resource": "arn:aws:route53:::hostedzone/*"
        },
        {
            "Effect": "Allow",
            "Action": ["route53:ListHostedZones", "route53:ListResourceRecordSets"],
            "Resource": "*"
        }
    ]})
}
