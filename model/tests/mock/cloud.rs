use super::Calls;
use eksup_model::clients::{
    CallerIdentity, CloudProvider, ClusterConnection, ImportedVpc, Provisioner,
    ProvisioningResult, ResourceResolver, SubnetDescription, TokenSource,
};
use eksup_model::{AmiSelection, ClusterCreationRequest, Error, K8sVersion, NodeGroupSpec, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const NODE_ROLE_ARN: &str = "arn:aws:iam::123456789012:role/eksup-mock-NodeInstanceRole";

/// Pretends to be a region with the given availability zones and, optionally, one kops cluster.
pub(crate) struct MockCloud {
    pub(crate) calls: Calls,
    pub(crate) zones: Vec<String>,
    /// The VPC of the only kops cluster in the region.
    pub(crate) kops: Option<ImportedVpc>,
}

#[async_trait::async_trait]
impl CloudProvider for MockCloud {
    async fn check_auth(&self) -> Result<CallerIdentity> {
        self.calls.record("check_auth");
        Ok(CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/tester".to_string(),
        })
    }

    async fn availability_zones(&self) -> Result<Vec<String>> {
        self.calls.record("availability_zones");
        Ok(self.zones.clone())
    }

    async fn describe_subnets(&self, ids: &[String]) -> Result<Vec<SubnetDescription>> {
        self.calls.record("describe_subnets");
        Ok(ids
            .iter()
            .enumerate()
            .map(|(i, id)| SubnetDescription {
                id: id.clone(),
                availability_zone: self.zones[i % self.zones.len()].clone(),
                vpc_id: "vpc-mock".to_string(),
                cidr: None,
            })
            .collect())
    }

    async fn import_vpc(&self, source_cluster: &str) -> Result<ImportedVpc> {
        self.calls.record("import_vpc");
        self.kops.clone().ok_or_else(|| Error::InvalidField {
            reason: format!("no kops cluster named {:?}", source_cluster),
        })
    }
}

/// Resolves every image to the same id.
pub(crate) struct MockResources {
    pub(crate) calls: Calls,
}

#[async_trait::async_trait]
impl ResourceResolver for MockResources {
    async fn ensure_ami(&self, _version: &K8sVersion, node_group: &mut NodeGroupSpec) -> Result<()> {
        self.calls.record("ensure_ami");
        if node_group.ami.id().is_none() {
            node_group.ami = AmiSelection::Id("ami-0123456789abcdef0".to_string());
        }
        Ok(())
    }

    async fn load_ssh_public_key(
        &self,
        _cluster_name: &str,
        _node_group: &mut NodeGroupSpec,
    ) -> Result<()> {
        self.calls.record("load_ssh_public_key");
        Ok(())
    }
}

/// Pretends to create the cluster, reporting `failures` errors. With `cancelled`, the creation is
/// reported as interrupted while waiting.
pub(crate) struct MockProvisioner {
    pub(crate) calls: Calls,
    pub(crate) failures: usize,
    pub(crate) cancelled: bool,
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn create_cluster_with_node_group(
        &self,
        request: &ClusterCreationRequest,
    ) -> ProvisioningResult {
        self.calls.record("create_cluster_with_node_group");
        let mut errors: Vec<Error> = (0..self.failures)
            .map(|i| Error::InvalidField {
                reason: format!("stack {} for {} failed", i, request.metadata.name),
            })
            .collect();
        if self.cancelled {
            errors.push(Error::Cancelled {
                what: format!("the control plane of {:?}", request.metadata.name),
            });
        }
        ProvisioningResult::new(errors)
    }

    async fn cluster_connection(
        &self,
        request: &ClusterCreationRequest,
    ) -> Result<ClusterConnection> {
        self.calls.record("cluster_connection");
        Ok(ClusterConnection {
            endpoint: format!("https://{}.mock.eks.amazonaws.com", request.metadata.name),
            certificate_authority_data: "bW9jayBjYQ==".to_string(),
            node_instance_role_arn: NODE_ROLE_ARN.to_string(),
        })
    }
}

/// Issues a distinct token on every call.
pub(crate) struct MockTokens {
    pub(crate) calls: Calls,
    pub(crate) issued: AtomicUsize,
}

#[async_trait::async_trait]
impl TokenSource for MockTokens {
    async fn token(&self, _cluster_name: &str, _region: &str) -> Result<String> {
        self.calls.record("token");
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("k8s-aws-v1.mock-{}", n))
    }
}
