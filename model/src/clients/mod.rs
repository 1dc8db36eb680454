/*!

The collaborators the bring-up depends on. Each one is a trait so that the AWS and Kubernetes
implementations can be swapped for mocks in tests.

!*/

mod kube_client;

pub use kube_client::{KubeClusterClient, KubeConnector};

use crate::error::{Error, Result};
use crate::kubeconfig::Kubeconfig;
use crate::request::{ClusterCreationRequest, NodeGroupSpec};
use crate::version::K8sVersion;
use crate::vpc::{SubnetRef, SubnetTopology};
use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The identity the cloud credentials belong to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

impl CallerIdentity {
    /// The last segment of the ARN, e.g. `alice` for `arn:aws:iam::123456789012:user/alice`.
    pub fn username(&self) -> String {
        self.arn
            .rsplit(|c: char| c == '/' || c == ':')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("user")
            .to_string()
    }
}

/// An existing subnet as reported by the cloud.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubnetDescription {
    pub id: String,
    pub availability_zone: String,
    pub vpc_id: String,
    pub cidr: Option<Ipv4Net>,
}

impl From<SubnetDescription> for SubnetRef {
    fn from(subnet: SubnetDescription) -> Self {
        Self {
            id: Some(subnet.id),
            availability_zone: subnet.availability_zone,
            cidr: subnet.cidr,
        }
    }
}

/// The network of another cluster that the new cluster is placed into.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportedVpc {
    pub vpc_id: String,
    pub cidr: Option<Ipv4Net>,
    pub subnets: BTreeMap<SubnetTopology, Vec<SubnetRef>>,
}

/// Read-only queries against the cloud, all of which happen before anything is created.
#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    /// Verifies that usable credentials are configured.
    async fn check_auth(&self) -> Result<CallerIdentity>;

    /// Names of the availability zones in the configured region that are currently available.
    async fn availability_zones(&self) -> Result<Vec<String>>;

    async fn describe_subnets(&self, ids: &[String]) -> Result<Vec<SubnetDescription>>;

    /// Finds the VPC and subnets of the externally managed cluster `source_cluster`.
    async fn import_vpc(&self, source_cluster: &str) -> Result<ImportedVpc>;
}

/// Fills in the node group fields that depend on cloud lookups.
#[async_trait::async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Replaces a `static` or `auto` image selection with a concrete image id.
    async fn ensure_ami(&self, version: &K8sVersion, node_group: &mut NodeGroupSpec)
        -> Result<()>;

    /// Registers the SSH public key when SSH access is requested and records the key name.
    async fn load_ssh_public_key(
        &self,
        cluster_name: &str,
        node_group: &mut NodeGroupSpec,
    ) -> Result<()>;
}

/// The errors of one provisioning attempt. An empty list is the only success signal.
#[derive(Debug, Default)]
pub struct ProvisioningResult {
    pub errors: Vec<Error>,
}

impl ProvisioningResult {
    pub fn new(errors: Vec<Error>) -> Self {
        Self { errors }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What is needed to talk to a provisioned cluster and to authorize its nodes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterConnection {
    pub endpoint: String,
    /// Base64 encoded PEM.
    pub certificate_authority_data: String,
    pub node_instance_role_arn: String,
}

/// Creates the cluster and its initial node group.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates all infrastructure. Every error is collected, nothing is rolled back.
    async fn create_cluster_with_node_group(
        &self,
        request: &ClusterCreationRequest,
    ) -> ProvisioningResult;

    async fn cluster_connection(
        &self,
        request: &ClusterCreationRequest,
    ) -> Result<ClusterConnection>;
}

/// Issues short lived bearer tokens for the cluster API.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, cluster_name: &str, region: &str) -> Result<String>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
}

/// The Kubernetes calls made while waiting for the cluster to become ready.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn server_version(&self) -> Result<K8sVersion>;

    /// The `data` of a config map, or `None` if it does not exist.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>>;

    /// Creates the config map or replaces its `data`.
    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()>;

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeSummary>>;

    /// Creates the default `gp2` storage class.
    async fn create_default_storage_class(&self) -> Result<()>;
}

/// Builds a [`ClusterClient`] from an in-memory kubeconfig.
#[async_trait::async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Box<dyn ClusterClient>>;
}

/// Persists a kubeconfig.
pub trait CredentialWriter: Send + Sync {
    /// Merges `kubeconfig` into the file at `path` and returns the path written.
    fn write(&self, path: &Path, kubeconfig: &Kubeconfig, set_context: bool) -> Result<PathBuf>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn caller_username() {
        let identity = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/alice".to_string(),
        };
        assert_eq!(identity.username(), "alice");
        let identity = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:root".to_string(),
        };
        assert_eq!(identity.username(), "root");
    }
}
