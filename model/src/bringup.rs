/*!

The `create cluster` operation. [`prepare`] does everything that needs no network access and so
fails fast on bad input. [`create_cluster`] then checks credentials, realizes the networking plan,
fills in the node group, provisions, and drives the readiness workflow to the end.

!*/

use crate::clients::{
    CloudProvider, ClusterConnector, CredentialWriter, Provisioner, ResourceResolver, TokenSource,
};
use crate::config::{CreateFlags, Resolver};
use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
use crate::error::Result;
use crate::kubeconfig::output_path;
use crate::network::{realize, NetworkingPlan, NetworkingSignals};
use crate::readiness::{ReadinessClients, ReadinessOptions, ReadinessState, ReadinessWorkflow};
use crate::request::ClusterCreationRequest;
use crate::tooling::{check_client_tools, gpu_notice, kubeconfig_hint};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the operator asked for, as given on the command line.
#[derive(Clone, Debug)]
pub struct CreateClusterOptions {
    pub config_file: Option<PathBuf>,
    pub flags: CreateFlags,
    pub name_args: Vec<String>,
    /// The externally managed cluster whose VPC should be used.
    pub vpc_from_kops_cluster: Option<String>,
    pub write_kubeconfig: bool,
    /// The `--kubeconfig` value, `None` when it was not given.
    pub kubeconfig: Option<PathBuf>,
    /// Where the kubeconfig goes when `--kubeconfig` is not given.
    pub default_kubeconfig: PathBuf,
    pub auto_kubeconfig: bool,
    pub set_kubeconfig_context: bool,
    pub profile: Option<String>,
    pub control_plane_timeout: Duration,
    pub nodes_timeout: Duration,
    pub poll_interval: Duration,
}

impl CreateClusterOptions {
    pub fn new(default_kubeconfig: PathBuf) -> Self {
        Self {
            config_file: None,
            flags: CreateFlags::default(),
            name_args: Vec::new(),
            vpc_from_kops_cluster: None,
            write_kubeconfig: true,
            kubeconfig: None,
            default_kubeconfig,
            auto_kubeconfig: false,
            set_kubeconfig_context: true,
            profile: None,
            control_plane_timeout: DEFAULT_WAIT_TIMEOUT,
            nodes_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The outcome of [`prepare`].
#[derive(Clone, Debug)]
pub struct PreparedCluster {
    pub request: ClusterCreationRequest,
    pub plan: NetworkingPlan,
    /// Where the kubeconfig will be written, `None` when writing is disabled.
    pub kubeconfig_path: Option<PathBuf>,
}

/// Resolves the request, decides the networking plan and the kubeconfig location, and names the
/// node group. Makes no external calls.
pub fn prepare(resolver: &Resolver, options: &CreateClusterOptions) -> Result<PreparedCluster> {
    let mut request = resolver.resolve(
        options.config_file.as_deref(),
        &options.flags,
        &options.name_args,
    )?;
    let plan = NetworkingPlan::decide(&NetworkingSignals::from_request(
        &request,
        options.vpc_from_kops_cluster.as_deref(),
    ))?;
    debug!("networking plan: {:?}", plan);

    let kubeconfig_path = if options.write_kubeconfig {
        Some(output_path(
            options.kubeconfig.as_deref(),
            options.auto_kubeconfig,
            &request.metadata.name,
            &options.default_kubeconfig,
        )?)
    } else {
        None
    };

    if request.node_group.name.is_empty() {
        request.node_group.name = resolver.names.node_group_name();
    }

    Ok(PreparedCluster {
        request,
        plan,
        kubeconfig_path,
    })
}

/// The external systems [`create_cluster`] talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub cloud: &'a dyn CloudProvider,
    pub resources: &'a dyn ResourceResolver,
    pub provisioner: &'a dyn Provisioner,
    pub tokens: &'a dyn TokenSource,
    pub connector: &'a dyn ClusterConnector,
    pub writer: &'a dyn CredentialWriter,
}

/// A cluster that reached [`ReadinessState::Ready`].
#[derive(Clone, Debug)]
pub struct CreatedCluster {
    pub request: ClusterCreationRequest,
    pub kubeconfig_path: Option<PathBuf>,
    pub history: Vec<ReadinessState>,
    /// Non-fatal notices logged after the cluster became ready.
    pub advisories: Vec<String>,
}

/// Creates the prepared cluster and waits for it to become ready.
pub async fn create_cluster(
    prepared: PreparedCluster,
    options: &CreateClusterOptions,
    clients: Collaborators<'_>,
    cancel: CancellationToken,
) -> Result<CreatedCluster> {
    let PreparedCluster {
        mut request,
        plan,
        kubeconfig_path,
    } = prepared;

    let identity = clients.cloud.check_auth().await?;
    debug!("using credentials of {}", identity.arn);

    realize(&plan, clients.cloud, &mut request).await?;
    clients
        .resources
        .ensure_ami(&request.metadata.version, &mut request.node_group)
        .await?;
    info!(
        "node group {:?} will use image {}",
        request.node_group.name, request.node_group.ami
    );
    clients
        .resources
        .load_ssh_public_key(&request.metadata.name, &mut request.node_group)
        .await?;

    info!("creating {}", request.metadata);
    debug!("cluster request: {:?}", request);
    let provisioning = clients
        .provisioner
        .create_cluster_with_node_group(&request)
        .await;

    let readiness_options = ReadinessOptions {
        kubeconfig_path,
        set_context: options.set_kubeconfig_context,
        profile: options.profile.clone(),
        username: identity.username(),
        control_plane_timeout: options.control_plane_timeout,
        nodes_timeout: options.nodes_timeout,
        poll_interval: options.poll_interval,
    };
    let readiness_clients = ReadinessClients {
        provisioner: clients.provisioner,
        tokens: clients.tokens,
        connector: clients.connector,
        writer: clients.writer,
    };
    let mut workflow =
        ReadinessWorkflow::new(&request, &readiness_options, readiness_clients, cancel);
    if let Err(e) = workflow.run(provisioning).await {
        // Provisioning failures have already printed their cleanup guidance.
        let provisioned = workflow
            .history()
            .contains(&ReadinessState::ControlPlaneProvisioned);
        if provisioned {
            error!("{} did not become ready", request.metadata);
            info!(
                "the cluster may have been partially created, to cleanup resources, run \
                'eksup delete cluster --region={} --name={}'",
                request.metadata.region, request.metadata.name
            );
        }
        return Err(e);
    }
    let written = workflow.kubeconfig_path().map(|p| p.to_path_buf());
    let context = workflow.client_config().map(|c| c.context_name());
    let history = workflow.history().to_vec();

    let mut advisories = Vec::new();
    let tools = check_client_tools(written.is_some()).await;
    if !tools.is_empty() {
        advisories.extend(tools);
        advisories.push(
            "cluster should be functional despite missing (or misconfigured) client binaries"
                .to_string(),
        );
    }
    advisories.extend(gpu_notice(&request.node_group));
    for advisory in &advisories {
        warn!("{}", advisory);
    }
    if let Some(hint) = kubeconfig_hint(
        written.as_deref(),
        Some(options.default_kubeconfig.as_path()),
        options.set_kubeconfig_context,
        context.as_deref().unwrap_or_default(),
    ) {
        info!("{}", hint);
    }

    info!("{} is ready", request.metadata);
    Ok(CreatedCluster {
        request,
        kubeconfig_path: written,
        history,
        advisories,
    })
}
