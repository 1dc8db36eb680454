/*!

Decoding of the `ClusterConfig` document. The `apiVersion` and `kind` fields are read first and
decide which versioned schema the rest of the document is decoded with. Every version converts
into the same [`ClusterConfig`].

!*/

use crate::constants::{
    API_GROUP, API_VERSION_V1ALPHA1, API_VERSION_V1ALPHA2, KIND_CLUSTER_CONFIG,
    KIND_CLUSTER_CONFIG_LIST,
};
use crate::error::{self, Result};
use crate::request::{Addons, AmiFamily, AmiSelection};
use crate::vpc::{SubnetRef, SubnetTopology};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    api_version: Option<String>,
    kind: Option<String>,
}

/// A decoded config document. The variant is the document's `kind`.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigObject {
    ClusterConfig(ClusterConfig),
    ClusterConfigList(Vec<ClusterConfig>),
}

impl ConfigObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigObject::ClusterConfig(_) => KIND_CLUSTER_CONFIG,
            ConfigObject::ClusterConfigList(_) => KIND_CLUSTER_CONFIG_LIST,
        }
    }

    /// Returns the cluster config, or a type mismatch error naming the decoded kind.
    pub fn into_cluster_config(self) -> Result<ClusterConfig> {
        match self {
            ConfigObject::ClusterConfig(config) => Ok(config),
            other => error::TypeMismatchSnafu {
                expected: KIND_CLUSTER_CONFIG,
                found: other.kind(),
            }
            .fail(),
        }
    }
}

/// The version independent form of a `ClusterConfig` document.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub metadata: ConfigMetadata,
    pub availability_zones: Vec<String>,
    pub vpc: Option<ConfigVpc>,
    pub node_groups: Vec<ConfigNodeGroup>,
    pub addons: Addons,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVpc {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub subnets: BTreeMap<SubnetTopology, Vec<SubnetRef>>,
}

impl ConfigVpc {
    pub fn has_subnets(&self) -> bool {
        self.subnets.values().any(|subnets| !subnets.is_empty())
    }
}

/// A node group as written in the document. Unset fields take the same defaults as the
/// corresponding command line flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigNodeGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ami: Option<AmiSelection>,
    #[serde(default)]
    pub ami_family: Option<AmiFamily>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub desired_capacity: Option<u32>,
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub volume_size: Option<u32>,
    #[serde(default)]
    pub max_pods_per_node: Option<u32>,
    #[serde(default, rename = "allowSSH")]
    pub allow_ssh: bool,
    #[serde(default, rename = "sshPublicKeyPath")]
    pub ssh_public_key_path: Option<String>,
    #[serde(default)]
    pub private_networking: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfigV1Alpha1 {
    #[serde(default)]
    metadata: ConfigMetadata,
    #[serde(default)]
    availability_zones: Vec<String>,
    #[serde(default)]
    vpc: Option<ConfigVpc>,
    #[serde(default)]
    node_group: Option<ConfigNodeGroup>,
    #[serde(default)]
    addons: Addons,
}

impl From<ClusterConfigV1Alpha1> for ClusterConfig {
    fn from(v: ClusterConfigV1Alpha1) -> Self {
        Self {
            metadata: v.metadata,
            availability_zones: v.availability_zones,
            vpc: v.vpc,
            node_groups: v.node_group.into_iter().collect(),
            addons: v.addons,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfigV1Alpha2 {
    #[serde(default)]
    metadata: ConfigMetadata,
    #[serde(default)]
    availability_zones: Vec<String>,
    #[serde(default)]
    vpc: Option<ConfigVpc>,
    #[serde(default)]
    node_groups: Vec<ConfigNodeGroup>,
    #[serde(default)]
    addons: Addons,
}

impl From<ClusterConfigV1Alpha2> for ClusterConfig {
    fn from(v: ClusterConfigV1Alpha2) -> Self {
        Self {
            metadata: v.metadata,
            availability_zones: v.availability_zones,
            vpc: v.vpc,
            node_groups: v.node_groups,
            addons: v.addons,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListV1Alpha1 {
    #[serde(default)]
    items: Vec<ClusterConfigV1Alpha1>,
}

#[derive(Debug, Deserialize)]
struct ListV1Alpha2 {
    #[serde(default)]
    items: Vec<ClusterConfigV1Alpha2>,
}

pub fn supported_api_versions() -> Vec<String> {
    vec![
        API_VERSION_V1ALPHA1.to_string(),
        API_VERSION_V1ALPHA2.to_string(),
    ]
}

/// Reads and decodes the document at `path`.
pub fn decode_file(path: &Path) -> Result<ConfigObject> {
    let data = std::fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
    decode(&data)
}

/// Decodes a YAML (or JSON) document into a [`ConfigObject`].
pub fn decode(data: &str) -> Result<ConfigObject> {
    let type_meta: TypeMeta = serde_yaml::from_str(data).context(error::ConfigDecodeSnafu)?;
    let api_version = type_meta
        .api_version
        .filter(|s| !s.is_empty())
        .context(error::ConfigTypeMetaSnafu {
            field: "apiVersion",
        })?;
    let kind = type_meta
        .kind
        .filter(|s| !s.is_empty())
        .context(error::ConfigTypeMetaSnafu { field: "kind" })?;
    ensure!(
        api_version.starts_with(&format!("{}/", API_GROUP)),
        error::UnknownApiVersionSnafu {
            api_version: api_version.as_str(),
            supported: supported_api_versions(),
        }
    );

    match (api_version.as_str(), kind.as_str()) {
        (API_VERSION_V1ALPHA1, KIND_CLUSTER_CONFIG) => Ok(ConfigObject::ClusterConfig(
            decode_as::<ClusterConfigV1Alpha1>(data)?.into(),
        )),
        (API_VERSION_V1ALPHA2, KIND_CLUSTER_CONFIG) => Ok(ConfigObject::ClusterConfig(
            decode_as::<ClusterConfigV1Alpha2>(data)?.into(),
        )),
        (API_VERSION_V1ALPHA1, KIND_CLUSTER_CONFIG_LIST) => Ok(ConfigObject::ClusterConfigList(
            decode_as::<ListV1Alpha1>(data)?
                .items
                .into_iter()
                .map(Into::into)
                .collect(),
        )),
        (API_VERSION_V1ALPHA2, KIND_CLUSTER_CONFIG_LIST) => Ok(ConfigObject::ClusterConfigList(
            decode_as::<ListV1Alpha2>(data)?
                .items
                .into_iter()
                .map(Into::into)
                .collect(),
        )),
        (API_VERSION_V1ALPHA1, _) | (API_VERSION_V1ALPHA2, _) => error::UnknownKindSnafu {
            api_version: api_version.as_str(),
            kind: kind.as_str(),
        }
        .fail(),
        _ => error::UnknownApiVersionSnafu {
            api_version: api_version.as_str(),
            supported: supported_api_versions(),
        }
        .fail(),
    }
}

fn decode_as<T>(data: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_yaml::from_str(data).context(error::ConfigDecodeSnafu)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    const V1ALPHA2: &str = r#"
apiVersion: eksup.io/v1alpha2
kind: ClusterConfig
metadata:
  name: my-cluster
  region: us-west-2
  version: "1.11"
  tags:
    team: infra
vpc:
  subnets:
    Private:
      - id: subnet-1
        availabilityZone: us-west-2a
      - id: subnet-2
        availabilityZone: us-west-2b
nodeGroups:
  - name: ng-1
    instanceType: m5.xlarge
    desiredCapacity: 3
    allowSSH: true
    privateNetworking: true
addons:
  withIAM:
    policyAutoScaling: true
"#;

    const V1ALPHA1: &str = r#"
apiVersion: eksup.io/v1alpha1
kind: ClusterConfig
metadata:
  name: legacy
  region: eu-west-1
availabilityZones: ["eu-west-1a", "eu-west-1b"]
nodeGroup:
  ami: auto
  amiFamily: Ubuntu1804
"#;

    #[test]
    fn decode_v1alpha2() {
        let config = decode(V1ALPHA2).unwrap().into_cluster_config().unwrap();
        assert_eq!(config.metadata.name, "my-cluster");
        assert_eq!(config.metadata.version.as_deref(), Some("1.11"));
        assert_eq!(config.metadata.tags.get("team").unwrap(), "infra");
        assert_eq!(config.node_groups.len(), 1);
        let ng = &config.node_groups[0];
        assert_eq!(ng.instance_type.as_deref(), Some("m5.xlarge"));
        assert_eq!(ng.desired_capacity, Some(3));
        assert!(ng.allow_ssh);
        assert!(ng.private_networking);
        let vpc = config.vpc.unwrap();
        assert!(vpc.has_subnets());
        assert_eq!(vpc.subnets[&SubnetTopology::Private][1].id.as_deref(), Some("subnet-2"));
        assert!(config.addons.with_iam.policy_auto_scaling);
        assert!(config.addons.storage);
    }

    #[test]
    fn decode_v1alpha1() {
        let config = decode(V1ALPHA1).unwrap().into_cluster_config().unwrap();
        assert_eq!(config.metadata.region, "eu-west-1");
        assert_eq!(config.availability_zones.len(), 2);
        assert_eq!(config.node_groups.len(), 1);
        assert_eq!(config.node_groups[0].ami, Some(AmiSelection::Auto));
        assert_eq!(config.node_groups[0].ami_family, Some(AmiFamily::Ubuntu1804));
    }

    #[test]
    fn list_is_a_type_mismatch() {
        let doc = r#"
apiVersion: eksup.io/v1alpha2
kind: ClusterConfigList
items:
  - metadata:
      name: a
"#;
        let object = decode(doc).unwrap();
        assert_eq!(object.kind(), KIND_CLUSTER_CONFIG_LIST);
        let err = object.into_cluster_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "decoded object of wrong type: expected 'ClusterConfig' but found 'ClusterConfigList'"
        );
    }

    #[test]
    fn unknown_type_meta() {
        let err = decode("apiVersion: example.com/v1\nkind: ClusterConfig\n").unwrap_err();
        assert!(matches!(err, error::Error::UnknownApiVersion { .. }));
        let err = decode("apiVersion: eksup.io/v9\nkind: ClusterConfig\n").unwrap_err();
        assert!(matches!(err, error::Error::UnknownApiVersion { .. }));
        let err = decode("apiVersion: eksup.io/v1alpha2\nkind: Pod\n").unwrap_err();
        assert!(matches!(err, error::Error::UnknownKind { .. }));
        let err = decode("kind: ClusterConfig\n").unwrap_err();
        assert!(matches!(err, error::Error::ConfigTypeMeta { .. }));
    }
}
