use std::time::Duration;

/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
macro_rules! eksup {
    () => {
        "eksup.io"
    };
    ($s:literal) => {
        concat!(eksup!(), "/", $s)
    };
}

// Config document identifiers
pub const API_GROUP: &str = eksup!();
pub const API_VERSION_V1ALPHA1: &str = eksup!("v1alpha1");
pub const API_VERSION_V1ALPHA2: &str = eksup!("v1alpha2");
pub const KIND_CLUSTER_CONFIG: &str = "ClusterConfig";
pub const KIND_CLUSTER_CONFIG_LIST: &str = "ClusterConfigList";

// Label and tag keys
pub const LABEL_NODEGROUP_NAME: &str = eksup!("nodegroup-name");
pub const TAG_CLUSTER_NAME: &str = eksup!("cluster-name");
pub const TAG_NODEGROUP_NAME: &str = eksup!("nodegroup-name");
pub const TAG_CREATED_BY: &str = eksup!("created-by");

/// The region used when neither `--region` nor the AWS environment provide one.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Regions in which EKS clusters can be created.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us-west-2",
    "us-east-1",
    "us-east-2",
    "eu-west-1",
    "eu-west-2",
    "eu-central-1",
    "eu-north-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
];

/// The version sentinel that resolves to the latest supported version.
pub const LATEST_VERSION_SENTINEL: &str = "latest";
/// Supported control plane versions, oldest first. The last entry is the latest.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.10", "1.11"];
/// The only version for which a default storage class is created by us.
pub const LEGACY_STORAGE_CLASS_VERSION: &str = "1.10";

pub const MAX_CLUSTER_NAME_LEN: usize = 100;
pub const DEFAULT_VPC_CIDR: &str = "192.168.0.0/16";
pub const DEFAULT_NODE_COUNT: u32 = 2;
pub const DEFAULT_NODE_TYPE: &str = "m5.large";
pub const DEFAULT_NODE_VOLUME_SIZE: u32 = 20;
pub const DEFAULT_SSH_PUBLIC_KEY: &str = "~/.ssh/id_rsa.pub";

/// The shared deadline for every readiness wait when no specific deadline is given.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(20 * 60);
/// How often readiness waits poll the cluster.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

// Node authorization
pub const AUTH_CONFIG_MAP_NAMESPACE: &str = "kube-system";
pub const AUTH_CONFIG_MAP_NAME: &str = "aws-auth";
pub const AUTH_MAP_ROLES_KEY: &str = "mapRoles";
pub const NODE_USERNAME: &str = "system:node:{{EC2PrivateDNSName}}";
pub const NODE_GROUPS: &[&str] = &["system:bootstrappers", "system:nodes"];

// Default storage class
pub const STORAGE_CLASS_NAME: &str = "gp2";
pub const STORAGE_CLASS_DEFAULT_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
pub const STORAGE_CLASS_PROVISIONER: &str = "kubernetes.io/aws-ebs";

/// Instance families that carry GPUs and need the NVIDIA device plugin.
pub const GPU_INSTANCE_FAMILIES: &[&str] = &["p2", "p3", "p4", "g3", "g4", "g5"];

/// The oldest `kubectl` client that can talk to a supported control plane.
pub const MIN_KUBECTL_VERSION: (u8, u8) = (1, 10);

#[test]
fn eksup_constants_macro_test() {
    assert_eq!("eksup.io", eksup!());
    assert_eq!("eksup.io/v1alpha2", API_VERSION_V1ALPHA2);
    assert_eq!("eksup.io/nodegroup-name", LABEL_NODEGROUP_NAME);
}
