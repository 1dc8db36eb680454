use crate::error::{AwsContext, Required};
use crate::AwsClients;
use aws_sdk_ec2::model::Filter;
use aws_smithy_types::Blob;
use eksup_model::clients::ResourceResolver;
use eksup_model::paths::expand_home;
use eksup_model::{AmiFamily, AmiSelection, Error, K8sVersion, NodeGroupSpec, Result};
use log::{debug, info};

/// The account that publishes the EKS optimized Amazon Linux 2 images.
const AMAZON_LINUX_2_OWNER: &str = "602401143452";
/// The account that publishes the Ubuntu EKS images.
const UBUNTU_OWNER: &str = "099720109477";

/// Resolves images and registers SSH keys.
#[derive(Clone, Debug)]
pub struct AwsResources {
    ec2: aws_sdk_ec2::Client,
    ssm: aws_sdk_ssm::Client,
}

impl AwsResources {
    pub fn new(clients: &AwsClients) -> Self {
        Self {
            ec2: clients.ec2.clone(),
            ssm: clients.ssm.clone(),
        }
    }

    /// The recommended image published as a public SSM parameter.
    async fn static_ami(&self, version: &K8sVersion, family: AmiFamily) -> Result<String> {
        let parameter = recommended_image_parameter(version, family);
        debug!("reading image id from SSM parameter {}", parameter);
        let output = self
            .ssm
            .get_parameter()
            .name(&parameter)
            .send()
            .await
            .aws_context(format!("get SSM parameter {}", parameter))?;
        Ok(output
            .parameter()
            .and_then(|p| p.value())
            .required("get SSM parameter", parameter)?
            .to_string())
    }

    /// The most recently created image matching the family's name pattern.
    async fn latest_ami(&self, version: &K8sVersion, family: AmiFamily) -> Result<String> {
        let (owner, pattern) = image_name_pattern(version, family);
        let output = self
            .ec2
            .describe_images()
            .owners(owner)
            .filters(Filter::builder().name("name").values(&pattern).build())
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
            .aws_context(format!("describe images named {}", pattern))?;
        let mut images: Vec<(&str, &str)> = output
            .images()
            .unwrap_or_default()
            .iter()
            .filter_map(|image| Some((image.creation_date()?, image.image_id()?)))
            .collect();
        images.sort();
        images
            .last()
            .map(|(_, id)| id.to_string())
            .ok_or_else(|| Error::InvalidField {
                reason: format!(
                    "no {} image for Kubernetes {} was found",
                    family,
                    version.major_minor_without_v()
                ),
            })
    }
}

#[async_trait::async_trait]
impl ResourceResolver for AwsResources {
    async fn ensure_ami(&self, version: &K8sVersion, node_group: &mut NodeGroupSpec) -> Result<()> {
        let id = match &node_group.ami {
            AmiSelection::Id(_) => return Ok(()),
            AmiSelection::Static => self.static_ami(version, node_group.ami_family).await?,
            AmiSelection::Auto => self.latest_ami(version, node_group.ami_family).await?,
        };
        info!("using {} image {} for node group {:?}", node_group.ami_family, id, node_group.name);
        node_group.ami = AmiSelection::Id(id);
        Ok(())
    }

    async fn load_ssh_public_key(
        &self,
        cluster_name: &str,
        node_group: &mut NodeGroupSpec,
    ) -> Result<()> {
        if !node_group.allow_ssh {
            return Ok(());
        }
        let path = expand_home(&node_group.ssh_public_key_path)?;
        let material = tokio::fs::read(&path)
            .await
            .map_err(|source| Error::File {
                action: "read SSH public key".to_string(),
                path: path.clone(),
                source,
            })?;
        let key_name = key_pair_name(cluster_name, &node_group.name);

        let existing = self
            .ec2
            .describe_key_pairs()
            .filters(Filter::builder().name("key-name").values(&key_name).build())
            .send()
            .await
            .aws_context("describe key pairs")?;
        if existing.key_pairs().map_or(false, |pairs| !pairs.is_empty()) {
            info!("using existing EC2 key pair {:?}", key_name);
        } else {
            self.ec2
                .import_key_pair()
                .key_name(&key_name)
                .public_key_material(Blob::new(material))
                .send()
                .await
                .aws_context(format!("import SSH public key {}", path.display()))?;
            info!("importing SSH public key {:?} as {:?}", path, key_name);
        }
        node_group.ssh_key_name = Some(key_name);
        Ok(())
    }
}

fn recommended_image_parameter(version: &K8sVersion, family: AmiFamily) -> String {
    let version = version.major_minor_without_v();
    match family {
        AmiFamily::AmazonLinux2 => format!(
            "/aws/service/eks/optimized-ami/{}/amazon-linux-2/recommended/image_id",
            version
        ),
        AmiFamily::Ubuntu1804 => format!(
            "/aws/service/canonical/ubuntu/eks/18.04/{}/stable/current/amd64/hvm/ebs-gp2/ami-id",
            version
        ),
    }
}

fn image_name_pattern(version: &K8sVersion, family: AmiFamily) -> (&'static str, String) {
    let version = version.major_minor_without_v();
    match family {
        AmiFamily::AmazonLinux2 => (
            AMAZON_LINUX_2_OWNER,
            format!("amazon-eks-node-{}-v*", version),
        ),
        AmiFamily::Ubuntu1804 => (UBUNTU_OWNER, format!("ubuntu-eks/k8s_{}/images/*", version)),
    }
}

fn key_pair_name(cluster_name: &str, node_group_name: &str) -> String {
    format!("eksup-{}-nodegroup-{}", cluster_name, node_group_name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn image_lookups() {
        let version = K8sVersion::parse("1.11").unwrap();
        assert_eq!(
            recommended_image_parameter(&version, AmiFamily::AmazonLinux2),
            "/aws/service/eks/optimized-ami/1.11/amazon-linux-2/recommended/image_id"
        );
        let (owner, pattern) = image_name_pattern(&version, AmiFamily::Ubuntu1804);
        assert_eq!(owner, UBUNTU_OWNER);
        assert_eq!(pattern, "ubuntu-eks/k8s_1.11/images/*");
    }

    #[test]
    fn key_names() {
        assert_eq!(key_pair_name("c1", "ng-1"), "eksup-c1-nodegroup-ng-1");
    }
}
