use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use eksup_aws::{
    aws_config, AwsClients, AwsCloud, AwsProvisioner, AwsResources, StsTokenSource,
};
use eksup_model::clients::KubeConnector;
use eksup_model::config::{parse_tag, CreateFlags, Resolver};
use eksup_model::constants::{
    DEFAULT_NODE_COUNT, DEFAULT_NODE_TYPE, DEFAULT_NODE_VOLUME_SIZE, DEFAULT_SSH_PUBLIC_KEY,
    DEFAULT_VPC_CIDR, LATEST_VERSION_SENTINEL,
};
use eksup_model::kubeconfig::FileCredentialWriter;
use eksup_model::naming::NameGenerator;
use eksup_model::paths::default_kubeconfig_path;
use eksup_model::{create_cluster, prepare, AmiFamily, Collaborators, CreateClusterOptions};
use log::warn;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Create resources.
#[derive(Debug, Parser)]
pub(crate) struct Create {
    #[clap(subcommand)]
    command: CreateCommand,
}

#[derive(Debug, Subcommand)]
enum CreateCommand {
    /// Create a cluster with an initial node group.
    Cluster(CreateCluster),
}

impl Create {
    pub(crate) async fn run(self, explicitly_set: BTreeSet<String>) -> Result<()> {
        match self.command {
            CreateCommand::Cluster(create_cluster) => create_cluster.run(explicitly_set).await,
        }
    }
}

/// Create an EKS cluster and wait for its nodes to join.
#[derive(Debug, Parser)]
struct CreateCluster {
    /// The cluster name. Mutually exclusive with `--name`.
    #[clap(value_name = "NAME")]
    names: Vec<String>,

    /// Load the cluster definition from this file instead of the flags below.
    #[clap(long, short = 'f')]
    config_file: Option<PathBuf>,

    /// EKS cluster name (generated if unspecified, e.g. "unique-creature-1561094398").
    #[clap(long, short = 'n', default_value = "")]
    name: String,

    /// A list of KV pairs used to tag the AWS resources (e.g. "Owner=John Doe,Team=Some Team").
    #[clap(long, value_parser = parse_tag, value_delimiter = ',')]
    tags: Vec<(String, String)>,

    /// AWS region. Defaults to the region of the AWS environment, then us-west-2.
    #[clap(long, short = 'r', default_value = "")]
    region: String,

    /// Availability zones to use (auto-select if unspecified).
    #[clap(long, value_delimiter = ',')]
    zones: Vec<String>,

    /// Kubernetes version.
    #[clap(long, default_value = LATEST_VERSION_SENTINEL)]
    version: String,

    /// Name of the node group (generated if unspecified).
    #[clap(long, default_value = "")]
    nodegroup_name: String,

    /// Total number of nodes (desired capacity of the autoscaling group).
    #[clap(long, default_value_t = DEFAULT_NODE_COUNT)]
    nodes: u32,

    /// Minimum number of nodes (defaults to `--nodes`).
    #[clap(long)]
    nodes_min: Option<u32>,

    /// Maximum number of nodes (defaults to `--nodes`).
    #[clap(long)]
    nodes_max: Option<u32>,

    /// Node instance type.
    #[clap(long, default_value = DEFAULT_NODE_TYPE)]
    node_type: String,

    /// Node volume size in GB.
    #[clap(long, default_value_t = DEFAULT_NODE_VOLUME_SIZE)]
    node_volume_size: u32,

    /// Maximum number of pods per node (the default follows the instance type).
    #[clap(long)]
    max_pods_per_node: Option<u32>,

    /// Image id for the nodes, "static" to use the recommended image or "auto" to look up the
    /// latest one.
    #[clap(long, default_value = "static")]
    node_ami: String,

    /// Family of the node image [AmazonLinux2|Ubuntu1804].
    #[clap(long, default_value = "AmazonLinux2")]
    node_ami_family: AmiFamily,

    /// Allow SSH access to the nodes.
    #[clap(long)]
    ssh_access: bool,

    /// Public key to import for SSH access to the nodes.
    #[clap(long, default_value = DEFAULT_SSH_PUBLIC_KEY)]
    ssh_public_key: String,

    /// Place the nodes in private subnets.
    #[clap(long)]
    node_private_networking: bool,

    /// Enable the IAM policy for the cluster autoscaler.
    #[clap(long)]
    asg_access: bool,

    /// Enable the IAM policy for ExternalDNS.
    #[clap(long)]
    external_dns_access: bool,

    /// Enable full access to ECR.
    #[clap(long)]
    full_ecr_access: bool,

    /// Create a default storage class.
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    storage_class: bool,

    /// CIDR of the dedicated VPC.
    #[clap(long, default_value = DEFAULT_VPC_CIDR)]
    vpc_cidr: String,

    /// Existing private subnets to use.
    #[clap(long, value_delimiter = ',')]
    vpc_private_subnets: Vec<String>,

    /// Existing public subnets to use.
    #[clap(long, value_delimiter = ',')]
    vpc_public_subnets: Vec<String>,

    /// Use the VPC of this kops cluster.
    #[clap(long)]
    vpc_from_kops_cluster: Option<String>,

    /// AWS credentials profile to use.
    #[clap(long, short = 'p')]
    profile: Option<String>,

    /// Maximum seconds to wait for each readiness step.
    #[clap(long, default_value = "1200")]
    timeout: u64,

    /// Maximum seconds to wait for the control plane (defaults to `--timeout`).
    #[clap(long)]
    control_plane_timeout: Option<u64>,

    /// Maximum seconds to wait for the nodes (defaults to `--timeout`).
    #[clap(long)]
    nodes_timeout: Option<u64>,

    /// Path to write the kubeconfig to (defaults to the first entry of $KUBECONFIG, then
    /// ~/.kube/config).
    #[clap(long)]
    kubeconfig: Option<PathBuf>,

    /// Make the new cluster the current context of the written kubeconfig.
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    set_kubeconfig_context: bool,

    /// Write the kubeconfig to ~/.kube/eksup/clusters/<name>.
    #[clap(long)]
    auto_kubeconfig: bool,

    /// Write a kubeconfig for the new cluster.
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    write_kubeconfig: bool,
}

impl CreateCluster {
    fn options(&self) -> Result<CreateClusterOptions> {
        let mut options = CreateClusterOptions::new(
            default_kubeconfig_path().context("Unable to find the default kubeconfig path")?,
        );
        options.config_file = self.config_file.clone();
        options.flags = CreateFlags {
            name: self.name.clone(),
            tags: self.tags.iter().cloned().collect(),
            region: self.region.clone(),
            zones: self.zones.clone(),
            version: self.version.clone(),
            nodegroup_name: self.nodegroup_name.clone(),
            nodes: self.nodes,
            nodes_min: self.nodes_min,
            nodes_max: self.nodes_max,
            node_type: self.node_type.clone(),
            node_volume_size: self.node_volume_size,
            max_pods_per_node: self.max_pods_per_node,
            node_ami: self.node_ami.clone(),
            node_ami_family: self.node_ami_family,
            ssh_access: self.ssh_access,
            ssh_public_key: self.ssh_public_key.clone(),
            node_private_networking: self.node_private_networking,
            asg_access: self.asg_access,
            external_dns_access: self.external_dns_access,
            full_ecr_access: self.full_ecr_access,
            storage_class: self.storage_class,
            vpc_cidr: self.vpc_cidr.clone(),
            vpc_private_subnets: self.vpc_private_subnets.clone(),
            vpc_public_subnets: self.vpc_public_subnets.clone(),
        };
        options.name_args = self.names.clone();
        options.vpc_from_kops_cluster = self.vpc_from_kops_cluster.clone();
        options.write_kubeconfig = self.write_kubeconfig;
        options.kubeconfig = self.kubeconfig.clone();
        options.auto_kubeconfig = self.auto_kubeconfig;
        options.set_kubeconfig_context = self.set_kubeconfig_context;
        options.profile = self.profile.clone().filter(|p| !p.is_empty());
        options.control_plane_timeout =
            Duration::from_secs(self.control_plane_timeout.unwrap_or(self.timeout));
        options.nodes_timeout = Duration::from_secs(self.nodes_timeout.unwrap_or(self.timeout));
        Ok(options)
    }

    async fn run(self, explicitly_set: BTreeSet<String>) -> Result<()> {
        let options = self.options()?;
        let resolver = Resolver::new(explicitly_set, NameGenerator::from_entropy());
        // Everything that can be checked offline fails here, before any client is built.
        let prepared = prepare(&resolver, &options)?;

        let sdk_config = aws_config(
            options.profile.as_deref(),
            &prepared.request.metadata.region,
        )
        .await;
        let clients = AwsClients::new(&sdk_config);

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                ctrl_c.cancel();
            }
        });

        let cloud = AwsCloud::new(&clients);
        let resources = AwsResources::new(&clients);
        let provisioner =
            AwsProvisioner::new(&clients, options.control_plane_timeout, cancel.clone());
        let tokens = StsTokenSource::new(&sdk_config);
        let collaborators = Collaborators {
            cloud: &cloud,
            resources: &resources,
            provisioner: &provisioner,
            tokens: &tokens,
            connector: &KubeConnector,
            writer: &FileCredentialWriter,
        };

        create_cluster(prepared, &options, collaborators, cancel).await?;
        Ok(())
    }
}
