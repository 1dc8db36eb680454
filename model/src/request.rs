use crate::constants::{
    DEFAULT_NODE_COUNT, DEFAULT_NODE_TYPE, DEFAULT_NODE_VOLUME_SIZE, DEFAULT_SSH_PUBLIC_KEY,
    GPU_INSTANCE_FAMILIES,
};
use crate::version::K8sVersion;
use crate::vpc::VpcSpec;
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// The single, resolved description of the cluster to bring up. It is built once by the
/// configuration resolver and then passed by reference through every later step. Only the
/// defaulting steps (AMI, SSH key, node group name, subnets) fill in fields afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCreationRequest {
    pub metadata: ClusterMeta,
    /// Zones requested by the user. Empty means "auto-select" for a dedicated VPC.
    pub availability_zones: Vec<String>,
    pub vpc: VpcSpec,
    pub node_group: NodeGroupSpec,
    pub addons: Addons,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMeta {
    pub name: String,
    pub region: String,
    pub version: K8sVersion,
    pub tags: BTreeMap<String, String>,
}

impl ClusterMeta {
    /// A short human readable description used in log messages.
    pub fn log_string(&self) -> String {
        format!("EKS cluster {:?} in {:?} region", self.name, self.region)
    }
}

impl Display for ClusterMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.log_string(), f)
    }
}

/// The family of the machine image used for worker nodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AmiFamily {
    AmazonLinux2,
    Ubuntu1804,
}

impl Default for AmiFamily {
    fn default() -> Self {
        Self::AmazonLinux2
    }
}

derive_display_from_serialize!(AmiFamily);
derive_fromstr_from_deserialize!(AmiFamily);

/// How the worker node image is chosen. `Static` and `Auto` are resolution modes that a
/// resource resolver replaces with a concrete image id before provisioning.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum AmiSelection {
    /// Look the image up in a built-in region table.
    Static,
    /// Query the cloud for the most recent matching image.
    Auto,
    /// A concrete image id.
    Id(String),
}

impl AmiSelection {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        match s.as_ref().trim() {
            "" | "static" => Self::Static,
            "auto" => Self::Auto,
            id => Self::Id(id.to_string()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl Default for AmiSelection {
    fn default() -> Self {
        Self::Static
    }
}

impl Display for AmiSelection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Auto => f.write_str("auto"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

impl Serialize for AmiSelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AmiSelection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    /// Empty until the orchestrator generates a name.
    pub name: String,
    pub ami: AmiSelection,
    pub ami_family: AmiFamily,
    pub instance_type: String,
    pub desired_capacity: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub volume_size: u32,
    pub max_pods_per_node: Option<u32>,
    pub allow_ssh: bool,
    pub ssh_public_key_path: String,
    /// The name under which the public key was registered with the cloud, once loaded.
    pub ssh_key_name: Option<String>,
    pub private_networking: bool,
}

impl Default for NodeGroupSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            ami: AmiSelection::default(),
            ami_family: AmiFamily::default(),
            instance_type: DEFAULT_NODE_TYPE.to_string(),
            desired_capacity: DEFAULT_NODE_COUNT,
            min_size: DEFAULT_NODE_COUNT,
            max_size: DEFAULT_NODE_COUNT,
            volume_size: DEFAULT_NODE_VOLUME_SIZE,
            max_pods_per_node: None,
            allow_ssh: false,
            ssh_public_key_path: DEFAULT_SSH_PUBLIC_KEY.to_string(),
            ssh_key_name: None,
            private_networking: false,
        }
    }
}

impl NodeGroupSpec {
    /// Returns `true` when the instance type belongs to a GPU instance family.
    pub fn is_gpu_instance_type(&self) -> bool {
        let instance_type = self.instance_type.to_ascii_lowercase();
        GPU_INSTANCE_FAMILIES
            .iter()
            .any(|family| instance_type.starts_with(family))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamAddons {
    #[serde(default)]
    pub policy_auto_scaling: bool,
    #[serde(default)]
    pub policy_external_dns: bool,
    #[serde(default, rename = "policyAmazonEC2ContainerRegistryPowerUser")]
    pub policy_ecr_power_user: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addons {
    #[serde(default, rename = "withIAM")]
    pub with_iam: IamAddons,
    #[serde(default = "default_storage")]
    pub storage: bool,
}

impl Default for Addons {
    fn default() -> Self {
        Self {
            with_iam: IamAddons::default(),
            storage: default_storage(),
        }
    }
}

fn default_storage() -> bool {
    true
}
