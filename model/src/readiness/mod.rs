/*!

The readiness workflow takes a provisioned cluster to the point where it can be used. It is a
state machine:

`Requested -> ControlPlaneProvisioned -> ControlPlaneReachable -> NodesAuthorized -> NodesJoined ->
[StorageClassApplied] -> Ready`

Any non-terminal state may move to `Failed`.

Cluster tokens expire after 15 minutes while a wait may take much longer, so every poll attempt and
every step talks to the cluster through a connection made with a freshly issued token.

!*/

pub mod auth;
pub mod wait;

use crate::clients::{
    ClusterClient, ClusterConnection, ClusterConnector, CredentialWriter, ProvisioningResult,
    Provisioner, TokenSource,
};
use crate::constants::{LABEL_NODEGROUP_NAME, LEGACY_STORAGE_CLASS_VERSION};
use crate::error::{self, ErrorKind, Result};
use crate::kubeconfig::ClientConfig;
use crate::request::ClusterCreationRequest;
use log::{debug, error, info};
use snafu::OptionExt;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wait::{poll_until, Poll};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadinessState {
    Requested,
    ControlPlaneProvisioned,
    ControlPlaneReachable,
    NodesAuthorized,
    NodesJoined,
    StorageClassApplied,
    Ready,
    Failed(String),
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadinessState::Ready | ReadinessState::Failed(_))
    }
}

impl Display for ReadinessState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadinessState::Requested => write!(f, "Requested"),
            ReadinessState::ControlPlaneProvisioned => write!(f, "ControlPlaneProvisioned"),
            ReadinessState::ControlPlaneReachable => write!(f, "ControlPlaneReachable"),
            ReadinessState::NodesAuthorized => write!(f, "NodesAuthorized"),
            ReadinessState::NodesJoined => write!(f, "NodesJoined"),
            ReadinessState::StorageClassApplied => write!(f, "StorageClassApplied"),
            ReadinessState::Ready => write!(f, "Ready"),
            ReadinessState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReadinessOptions {
    /// Where the kubeconfig is written, `None` when writing is disabled.
    pub kubeconfig_path: Option<PathBuf>,
    pub set_context: bool,
    /// The AWS profile the written kubeconfig should use.
    pub profile: Option<String>,
    /// The owner of the credentials, used in the kubeconfig context name.
    pub username: String,
    pub control_plane_timeout: Duration,
    pub nodes_timeout: Duration,
    pub poll_interval: Duration,
}

/// The collaborators the workflow calls.
#[derive(Clone, Copy)]
pub struct ReadinessClients<'a> {
    pub provisioner: &'a dyn Provisioner,
    pub tokens: &'a dyn TokenSource,
    pub connector: &'a dyn ClusterConnector,
    pub writer: &'a dyn CredentialWriter,
}

pub struct ReadinessWorkflow<'a> {
    request: &'a ClusterCreationRequest,
    options: &'a ReadinessOptions,
    clients: ReadinessClients<'a>,
    cancel: CancellationToken,
    state: ReadinessState,
    history: Vec<ReadinessState>,
    provisioning: Option<ProvisioningResult>,
    connection: Option<ClusterConnection>,
    client_config: Option<ClientConfig>,
    written_kubeconfig: Option<PathBuf>,
}

impl<'a> ReadinessWorkflow<'a> {
    pub fn new(
        request: &'a ClusterCreationRequest,
        options: &'a ReadinessOptions,
        clients: ReadinessClients<'a>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            options,
            clients,
            cancel,
            state: ReadinessState::Requested,
            history: vec![ReadinessState::Requested],
            provisioning: None,
            connection: None,
            client_config: None,
            written_kubeconfig: None,
        }
    }

    pub fn state(&self) -> &ReadinessState {
        &self.state
    }

    /// Every state the workflow has been in, in order.
    pub fn history(&self) -> &[ReadinessState] {
        &self.history
    }

    /// The kubeconfig file written, if any.
    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.written_kubeconfig.as_deref()
    }

    pub fn client_config(&self) -> Option<&ClientConfig> {
        self.client_config.as_ref()
    }

    /// Drives the workflow from `Requested` to a terminal state.
    pub async fn run(&mut self, provisioning: ProvisioningResult) -> Result<()> {
        self.provisioning = Some(provisioning);
        while !self.state.is_terminal() {
            match self.step().await {
                Ok(next) => self.transition(next),
                Err(e) => {
                    self.transition(ReadinessState::Failed(e.to_string()));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: ReadinessState) {
        debug!("readiness: {} -> {}", self.state, next);
        self.state = next.clone();
        self.history.push(next);
    }

    async fn step(&mut self) -> Result<ReadinessState> {
        match self.state.clone() {
            ReadinessState::Requested => self.check_provisioning(),
            ReadinessState::ControlPlaneProvisioned => self.reach_control_plane().await,
            ReadinessState::ControlPlaneReachable => self.authorize_nodes().await,
            ReadinessState::NodesAuthorized => self.wait_for_nodes().await,
            ReadinessState::NodesJoined => self.apply_storage_class().await,
            ReadinessState::StorageClassApplied => Ok(ReadinessState::Ready),
            // Terminal states are never stepped.
            terminal @ (ReadinessState::Ready | ReadinessState::Failed(_)) => Ok(terminal),
        }
    }

    fn check_provisioning(&mut self) -> Result<ReadinessState> {
        let request = self.request;
        let meta = &request.metadata;
        let errors = self.provisioning.take().unwrap_or_default().errors;
        if errors.is_empty() {
            info!("all EKS cluster resources for {:?} have been created", meta.name);
            return Ok(ReadinessState::ControlPlaneProvisioned);
        }
        let count = errors.len();
        info!(
            "{} error(s) occurred and cluster hasn't been created properly",
            count
        );
        info!(
            "to cleanup resources, run 'eksup delete cluster --region={} --name={}'",
            meta.region, meta.name
        );
        for e in &errors {
            error!("{}", e);
        }
        // An interrupted wait inside the provisioner is a cancellation, not a failed resource.
        if let Some(cancelled) = errors.into_iter().find(|e| e.kind() == ErrorKind::Cancelled) {
            return Err(cancelled);
        }
        error::ProvisioningSnafu {
            cluster_name: meta.name.as_str(),
            count,
        }
        .fail()
    }

    async fn reach_control_plane(&mut self) -> Result<ReadinessState> {
        let request = self.request;
        let meta = &request.metadata;
        let connection = self
            .clients
            .provisioner
            .cluster_connection(request)
            .await?;
        let client_config = ClientConfig::new(
            meta,
            connection.endpoint.as_str(),
            connection.certificate_authority_data.as_str(),
            self.options.username.as_str(),
        );

        if let Some(path) = &self.options.kubeconfig_path {
            let kubeconfig =
                client_config.with_exec_authenticator(self.options.profile.as_deref());
            let written =
                self.clients
                    .writer
                    .write(path, &kubeconfig, self.options.set_context)?;
            info!("saved kubeconfig as {:?}", written);
            self.written_kubeconfig = Some(written);
        }

        let session = Session {
            tokens: self.clients.tokens,
            connector: self.clients.connector,
            config: &client_config,
        };
        let version = poll_until(
            "the control plane to become ready",
            self.options.control_plane_timeout,
            self.options.poll_interval,
            &self.cancel,
            || async move { session.connect().await?.server_version().await.map(Poll::Done) },
        )
        .await?;
        info!(
            "the Kubernetes API endpoint {} is reachable, server version {}",
            connection.endpoint,
            version.full_version_with_v()
        );

        self.connection = Some(connection);
        self.client_config = Some(client_config);
        Ok(ReadinessState::ControlPlaneReachable)
    }

    async fn authorize_nodes(&mut self) -> Result<ReadinessState> {
        let role_arn = self
            .connection
            .as_ref()
            .map(|c| c.node_instance_role_arn.clone())
            .context(error::MissingFieldSnafu {
                field: "node instance role",
            })?;
        let client = self.session()?.connect().await?;
        auth::authorize_nodes(client.as_ref(), &role_arn).await?;
        Ok(ReadinessState::NodesAuthorized)
    }

    async fn wait_for_nodes(&mut self) -> Result<ReadinessState> {
        let request = self.request;
        let ng = &request.node_group;
        let desired = ng.desired_capacity as usize;
        let selector = format!("{}={}", LABEL_NODEGROUP_NAME, ng.name);
        let session = self.session()?;
        let what = format!("{} node(s) of node group {:?} to become ready", desired, ng.name);
        let ready = poll_until(
            &what,
            self.options.nodes_timeout,
            self.options.poll_interval,
            &self.cancel,
            || {
                let selector = selector.as_str();
                async move {
                    let nodes = session.connect().await?.list_nodes(selector).await?;
                    let ready: Vec<String> = nodes
                        .into_iter()
                        .filter(|n| n.ready)
                        .map(|n| n.name)
                        .collect();
                    if ready.len() >= desired {
                        Ok(Poll::Done(ready))
                    } else {
                        Ok(Poll::Pending(format!(
                            "{} of {} node(s) are ready",
                            ready.len(),
                            desired
                        )))
                    }
                }
            },
        )
        .await?;
        for node in &ready {
            info!("node {:?} is ready", node);
        }
        Ok(ReadinessState::NodesJoined)
    }

    async fn apply_storage_class(&mut self) -> Result<ReadinessState> {
        let request = self.request;
        let meta = &request.metadata;
        if !request.addons.storage
            || meta.version.major_minor_without_v() != LEGACY_STORAGE_CLASS_VERSION
        {
            return Ok(ReadinessState::Ready);
        }
        self.session()?
            .connect()
            .await?
            .create_default_storage_class()
            .await?;
        info!("created default storage class \"gp2\"");
        Ok(ReadinessState::StorageClassApplied)
    }

    fn session(&self) -> Result<Session<'_>> {
        let config = self
            .client_config
            .as_ref()
            .context(error::MissingFieldSnafu {
                field: "cluster client configuration",
            })?;
        Ok(Session {
            tokens: self.clients.tokens,
            connector: self.clients.connector,
            config,
        })
    }
}

/// Connects to the cluster with a new token on every call.
#[derive(Clone, Copy)]
struct Session<'s> {
    tokens: &'s dyn TokenSource,
    connector: &'s dyn ClusterConnector,
    config: &'s ClientConfig,
}

impl Session<'_> {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>> {
        let token = self
            .tokens
            .token(&self.config.cluster_name, &self.config.region)
            .await?;
        self.connector
            .connect(&self.config.with_embedded_token(token))
            .await
    }
}
