/*!

This library brings up an Amazon EKS cluster with its initial node group. It resolves the request
from a config document or command line flags, plans the networking, and drives provisioning and
the readiness workflow through the collaborator traits in [`clients`].

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use bringup::{
    create_cluster, prepare, Collaborators, CreateClusterOptions, CreatedCluster, PreparedCluster,
};
pub use error::{Error, ErrorKind, Result};
pub use network::{NetworkingPlan, NetworkingSignals};
pub use readiness::ReadinessState;
pub use request::{
    Addons, AmiFamily, AmiSelection, ClusterCreationRequest, ClusterMeta, IamAddons,
    NodeGroupSpec,
};
pub use version::K8sVersion;
pub use vpc::{SubnetRef, SubnetTopology, VpcSpec};

pub mod bringup;
pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod kubeconfig;
pub mod naming;
pub mod network;
pub mod paths;
pub mod readiness;
mod request;
pub mod tooling;
pub mod version;
pub mod vpc;
