/*!

The configuration resolver turns either a config document or the command line flags into a single
[`ClusterCreationRequest`]. The two sources are mutually exclusive and exactly one of them is used.

!*/

pub mod document;

use crate::constants::{DEFAULT_REGION, MAX_CLUSTER_NAME_LEN, SUPPORTED_REGIONS};
use crate::error::{self, Result};
use crate::naming::{resolve_name, NameGenerator, NameResolution};
use crate::request::{
    Addons, AmiFamily, AmiSelection, ClusterCreationRequest, ClusterMeta, IamAddons, NodeGroupSpec,
};
use crate::version::{resolve_version, RequestedVersion};
use crate::vpc::{parse_cidr, SubnetRef, SubnetTopology, VpcSpec};
use document::{ClusterConfig, ConfigNodeGroup};
use log::{debug, info};
use snafu::{ensure, OptionExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Flags that describe the cluster itself and therefore cannot be combined with a config
/// document. When more than one is set, the first one in this order is reported.
pub const FLAG_ONLY_OPTIONS: &[&str] = &[
    "name",
    "tags",
    "zones",
    "version",
    "region",
    "nodes",
    "nodes-min",
    "nodes-max",
    "node-type",
    "node-volume-size",
    "max-pods-per-node",
    "node-ami",
    "node-ami-family",
    "ssh-access",
    "ssh-public-key",
    "node-private-networking",
    "asg-access",
    "external-dns-access",
    "full-ecr-access",
    "storage-class",
    "vpc-private-subnets",
    "vpc-public-subnets",
    "vpc-cidr",
];

/// The values of the cluster describing command line flags, with their defaults applied.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateFlags {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub region: String,
    pub zones: Vec<String>,
    pub version: String,
    pub nodegroup_name: String,
    pub nodes: u32,
    pub nodes_min: Option<u32>,
    pub nodes_max: Option<u32>,
    pub node_type: String,
    pub node_volume_size: u32,
    pub max_pods_per_node: Option<u32>,
    pub node_ami: String,
    pub node_ami_family: AmiFamily,
    pub ssh_access: bool,
    pub ssh_public_key: String,
    pub node_private_networking: bool,
    pub asg_access: bool,
    pub external_dns_access: bool,
    pub full_ecr_access: bool,
    pub storage_class: bool,
    pub vpc_cidr: String,
    pub vpc_private_subnets: Vec<String>,
    pub vpc_public_subnets: Vec<String>,
}

impl Default for CreateFlags {
    fn default() -> Self {
        let ng = NodeGroupSpec::default();
        Self {
            name: String::new(),
            tags: BTreeMap::new(),
            region: String::new(),
            zones: Vec::new(),
            version: crate::constants::LATEST_VERSION_SENTINEL.to_string(),
            nodegroup_name: String::new(),
            nodes: ng.desired_capacity,
            nodes_min: None,
            nodes_max: None,
            node_type: ng.instance_type,
            node_volume_size: ng.volume_size,
            max_pods_per_node: None,
            node_ami: ng.ami.to_string(),
            node_ami_family: ng.ami_family,
            ssh_access: false,
            ssh_public_key: ng.ssh_public_key_path,
            node_private_networking: false,
            asg_access: false,
            external_dns_access: false,
            full_ecr_access: false,
            storage_class: true,
            vpc_cidr: crate::constants::DEFAULT_VPC_CIDR.to_string(),
            vpc_private_subnets: Vec::new(),
            vpc_public_subnets: Vec::new(),
        }
    }
}

/// Resolves a [`ClusterCreationRequest`] from one of the two sources.
#[derive(Clone, Debug)]
pub struct Resolver {
    /// Long names of the flags that were given on the command line, as opposed to defaulted.
    pub explicitly_set: BTreeSet<String>,
    /// The region from the AWS environment, used when `--region` is not given.
    pub environment_region: Option<String>,
    pub names: NameGenerator,
}

impl Resolver {
    pub fn new(explicitly_set: BTreeSet<String>, names: NameGenerator) -> Self {
        Self {
            explicitly_set,
            environment_region: region_from_env(),
            names,
        }
    }

    /// Uses the config document when `config_file` is given and the flags otherwise.
    pub fn resolve(
        &self,
        config_file: Option<&Path>,
        flags: &CreateFlags,
        name_args: &[String],
    ) -> Result<ClusterCreationRequest> {
        let name_arg = name_arg(name_args)?;
        let request = match config_file {
            Some(path) => {
                let config = document::decode_file(path)?.into_cluster_config()?;
                self.resolve_from_document(config)?
            }
            None => self.resolve_from_flags(flags, &name_arg)?,
        };
        info!("using region {}", request.metadata.region);
        debug!("resolved request: {:?}", request);
        Ok(request)
    }

    /// Builds the request from a decoded config document. Fails if any flag-only option was set
    /// on the command line.
    pub fn resolve_from_document(&self, config: ClusterConfig) -> Result<ClusterCreationRequest> {
        if let Some(option) = FLAG_ONLY_OPTIONS
            .iter()
            .find(|option| self.explicitly_set.contains(**option))
        {
            return error::IncompatibleConfigurationSnafu { option: *option }.fail();
        }
        ensure!(
            !config.metadata.name.trim().is_empty(),
            error::MissingFieldSnafu { field: "name" }
        );
        ensure!(
            !config.metadata.region.trim().is_empty(),
            error::MissingFieldSnafu { field: "region" }
        );
        ensure!(
            config.node_groups.len() <= 1,
            error::InvalidFieldSnafu {
                reason: format!(
                    "only one node group is supported, {} were given",
                    config.node_groups.len()
                ),
            }
        );
        let node_group = node_group_from_document(
            config
                .node_groups
                .into_iter()
                .next()
                .context(error::MissingFieldSnafu {
                    field: "nodeGroups",
                })?,
        );

        let mut vpc = VpcSpec::default();
        if let Some(config_vpc) = config.vpc {
            if let Some(cidr) = config_vpc.cidr {
                vpc.cidr = parse_cidr(&cidr)?;
            }
            vpc.id = config_vpc.id;
            vpc.subnets = config_vpc.subnets;
        }

        let metadata = ClusterMeta {
            name: check_cluster_name(config.metadata.name.trim())?,
            region: check_region(config.metadata.region.trim())?,
            version: resolve_version(&RequestedVersion::new(
                config.metadata.version.unwrap_or_default(),
            ))?,
            tags: config.metadata.tags,
        };
        let request = ClusterCreationRequest {
            metadata,
            availability_zones: config.availability_zones,
            vpc,
            node_group,
            addons: config.addons,
        };
        check_node_counts(&request.node_group)?;
        Ok(request)
    }

    /// Builds the request from command line flags and the optional positional name argument.
    pub fn resolve_from_flags(
        &self,
        flags: &CreateFlags,
        name_arg: &str,
    ) -> Result<ClusterCreationRequest> {
        let name = match resolve_name(&flags.name, name_arg) {
            NameResolution::Provided(name) => check_cluster_name(&name)?,
            NameResolution::Generated => self.names.cluster_name(),
            NameResolution::Conflict => {
                return error::NameFlagAndArgSnafu {
                    flag: flags.name.as_str(),
                    arg: name_arg,
                }
                .fail()
            }
        };
        ensure!(
            !(flags.ssh_access && flags.ssh_public_key.trim().is_empty()),
            error::SshPublicKeyEmptySnafu
        );

        let region = match flags.region.trim() {
            "" => self
                .environment_region
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            region => region.to_string(),
        };

        let mut vpc = VpcSpec::with_cidr(parse_cidr(&flags.vpc_cidr)?);
        for (topology, ids) in [
            (SubnetTopology::Private, &flags.vpc_private_subnets),
            (SubnetTopology::Public, &flags.vpc_public_subnets),
        ] {
            for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
                vpc.add_subnet(
                    topology,
                    SubnetRef {
                        id: Some(id.to_string()),
                        availability_zone: String::new(),
                        cidr: None,
                    },
                );
            }
        }

        let node_group = NodeGroupSpec {
            name: flags.nodegroup_name.trim().to_string(),
            ami: AmiSelection::new(&flags.node_ami),
            ami_family: flags.node_ami_family,
            instance_type: flags.node_type.clone(),
            desired_capacity: flags.nodes,
            min_size: flags.nodes_min.unwrap_or(flags.nodes),
            max_size: flags.nodes_max.unwrap_or(flags.nodes),
            volume_size: flags.node_volume_size,
            max_pods_per_node: flags.max_pods_per_node,
            allow_ssh: flags.ssh_access,
            ssh_public_key_path: flags.ssh_public_key.trim().to_string(),
            ssh_key_name: None,
            private_networking: flags.node_private_networking,
        };
        check_node_counts(&node_group)?;

        Ok(ClusterCreationRequest {
            metadata: ClusterMeta {
                name,
                region: check_region(&region)?,
                version: resolve_version(&RequestedVersion::new(&flags.version))?,
                tags: flags.tags.clone(),
            },
            availability_zones: flags
                .zones
                .iter()
                .map(|z| z.trim().to_string())
                .filter(|z| !z.is_empty())
                .collect(),
            vpc,
            node_group,
            addons: Addons {
                with_iam: IamAddons {
                    policy_auto_scaling: flags.asg_access,
                    policy_external_dns: flags.external_dns_access,
                    policy_ecr_power_user: flags.full_ecr_access,
                },
                storage: flags.storage_class,
            },
        })
    }
}

/// Returns the single positional name argument, or an empty string when there is none.
pub fn name_arg(args: &[String]) -> Result<String> {
    ensure!(
        args.len() <= 1,
        error::TooManyNameArgsSnafu { count: args.len() }
    );
    Ok(args
        .first()
        .map(|arg| arg.trim().to_string())
        .unwrap_or_default())
}

/// The region configured in the AWS environment, if any.
pub fn region_from_env() -> Option<String> {
    ["AWS_REGION", "AWS_DEFAULT_REGION"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|region| !region.trim().is_empty())
}

pub fn check_region(region: &str) -> Result<String> {
    ensure!(
        SUPPORTED_REGIONS.contains(&region),
        error::UnsupportedRegionSnafu {
            region,
            supported: SUPPORTED_REGIONS
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>(),
        }
    );
    Ok(region.to_string())
}

/// EKS cluster names are 1 to 100 characters from `[A-Za-z0-9_-]` and start with an
/// alphanumeric character.
pub fn check_cluster_name(name: &str) -> Result<String> {
    let valid = (1..=MAX_CLUSTER_NAME_LEN).contains(&name.len())
        && name
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    ensure!(valid, error::InvalidClusterNameSnafu { name });
    Ok(name.to_string())
}

/// Parses a `key=value` pair given to `--tags`.
pub fn parse_tag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("'{}' is not a key=value pair", s)),
    }
}

fn node_group_from_document(ng: ConfigNodeGroup) -> NodeGroupSpec {
    let defaults = NodeGroupSpec::default();
    let desired_capacity = ng.desired_capacity.unwrap_or(defaults.desired_capacity);
    NodeGroupSpec {
        name: ng.name.unwrap_or_default().trim().to_string(),
        // Left as the static resolution mode, the resource resolver picks the image.
        ami: ng.ami.unwrap_or(AmiSelection::Static),
        ami_family: ng.ami_family.unwrap_or(AmiFamily::AmazonLinux2),
        instance_type: ng.instance_type.unwrap_or(defaults.instance_type),
        desired_capacity,
        min_size: ng.min_size.unwrap_or(desired_capacity),
        max_size: ng.max_size.unwrap_or(desired_capacity),
        volume_size: ng.volume_size.unwrap_or(defaults.volume_size),
        max_pods_per_node: ng.max_pods_per_node,
        allow_ssh: ng.allow_ssh,
        ssh_public_key_path: ng
            .ssh_public_key_path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.ssh_public_key_path),
        ssh_key_name: None,
        private_networking: ng.private_networking,
    }
}

fn check_node_counts(ng: &NodeGroupSpec) -> Result<()> {
    ensure!(
        ng.min_size <= ng.desired_capacity && ng.desired_capacity <= ng.max_size,
        error::InvalidFieldSnafu {
            reason: format!(
                "node counts must satisfy min ({}) <= desired ({}) <= max ({})",
                ng.min_size, ng.desired_capacity, ng.max_size
            ),
        }
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::version::latest_version;

    const DOC: &str = r#"
apiVersion: eksup.io/v1alpha2
kind: ClusterConfig
metadata:
  name: from-file
  region: eu-north-1
nodeGroups:
  - instanceType: t3.large
"#;

    fn resolver(explicit: &[&str]) -> Resolver {
        Resolver {
            explicitly_set: explicit.iter().map(|s| s.to_string()).collect(),
            environment_region: None,
            names: NameGenerator::from_seed(1).at(1_561_094_398),
        }
    }

    fn document() -> ClusterConfig {
        document::decode(DOC)
            .unwrap()
            .into_cluster_config()
            .unwrap()
    }

    #[test]
    fn document_with_flag_only_option_is_rejected() {
        let err = resolver(&["region"])
            .resolve_from_document(document())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
        assert_eq!(
            err.to_string(),
            "cannot use --region when --config-file/-f is set"
        );
    }

    #[test]
    fn first_offending_option_is_reported() {
        let err = resolver(&["vpc-cidr", "nodes", "storage-class"])
            .resolve_from_document(document())
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleConfiguration { option } if option == "nodes"));
    }

    #[test]
    fn flags_outside_the_list_are_allowed_with_a_document() {
        let request = resolver(&["kubeconfig", "timeout", "nodegroup-name"])
            .resolve_from_document(document())
            .unwrap();
        assert_eq!(request.metadata.name, "from-file");
        assert_eq!(request.metadata.region, "eu-north-1");
        assert_eq!(request.metadata.version, latest_version());
        assert_eq!(request.node_group.instance_type, "t3.large");
        assert_eq!(request.node_group.ami, AmiSelection::Static);
        assert_eq!(request.node_group.ami_family, AmiFamily::AmazonLinux2);
        assert_eq!(request.node_group.min_size, request.node_group.desired_capacity);
    }

    #[test]
    fn document_requires_name_and_region() {
        let mut config = document();
        config.metadata.name = String::new();
        let err = resolver(&[]).resolve_from_document(config).unwrap_err();
        assert_eq!(err.to_string(), "name must be set");

        let mut config = document();
        config.metadata.region = String::new();
        let err = resolver(&[]).resolve_from_document(config).unwrap_err();
        assert_eq!(err.to_string(), "region must be set");
    }

    #[test]
    fn flags_generate_a_name() {
        let resolver = resolver(&[]);
        let request = resolver
            .resolve_from_flags(&CreateFlags::default(), "")
            .unwrap();
        assert_eq!(request.metadata.name, resolver.names.cluster_name());
        assert_eq!(request.metadata.region, DEFAULT_REGION);
        assert!(request.availability_zones.is_empty());
        assert!(request.vpc.subnets.is_empty());
        assert!(request.addons.storage);
    }

    #[test]
    fn flags_name_sources() {
        let flags = CreateFlags {
            name: "foo".to_string(),
            ..CreateFlags::default()
        };
        let request = resolver(&[]).resolve_from_flags(&flags, "").unwrap();
        assert_eq!(request.metadata.name, "foo");

        let err = resolver(&[]).resolve_from_flags(&flags, "bar").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationConflict);
        assert_eq!(
            err.to_string(),
            "--name=foo and argument bar cannot be used at the same time"
        );
    }

    #[test]
    fn cluster_names_are_checked() {
        assert_eq!(check_cluster_name("my-cluster_1").unwrap(), "my-cluster_1");
        assert!(check_cluster_name(&"a".repeat(100)).is_ok());
        for bad in ["", "-leading", "_leading", "has space", "dots.in.name"] {
            let err = check_cluster_name(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", bad);
        }
        assert!(check_cluster_name(&"a".repeat(101)).is_err());

        let flags = CreateFlags {
            name: "not/valid".to_string(),
            ..CreateFlags::default()
        };
        let err = resolver(&[]).resolve_from_flags(&flags, "").unwrap_err();
        assert!(matches!(err, Error::InvalidClusterName { name } if name == "not/valid"));

        let mut config = document();
        config.metadata.name = "-bad".to_string();
        let err = resolver(&[]).resolve_from_document(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn too_many_name_args() {
        let err = name_arg(&["a".to_string(), "b".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(name_arg(&[" a ".to_string()]).unwrap(), "a");
    }

    #[test]
    fn ssh_access_requires_a_key() {
        let flags = CreateFlags {
            ssh_access: true,
            ssh_public_key: String::new(),
            ..CreateFlags::default()
        };
        let err = resolver(&[]).resolve_from_flags(&flags, "").unwrap_err();
        assert_eq!(err.to_string(), "--ssh-public-key must be non-empty string");
    }

    #[test]
    fn region_precedence() {
        let mut resolver = resolver(&[]);
        resolver.environment_region = Some("eu-west-1".to_string());
        let request = resolver
            .resolve_from_flags(&CreateFlags::default(), "")
            .unwrap();
        assert_eq!(request.metadata.region, "eu-west-1");

        let flags = CreateFlags {
            region: "us-east-2".to_string(),
            ..CreateFlags::default()
        };
        let request = resolver.resolve_from_flags(&flags, "").unwrap();
        assert_eq!(request.metadata.region, "us-east-2");

        let flags = CreateFlags {
            region: "mars-north-1".to_string(),
            ..CreateFlags::default()
        };
        let err = resolver.resolve_from_flags(&flags, "").unwrap_err();
        assert!(err.to_string().starts_with("--region=mars-north-1 is not supported"));
    }

    #[test]
    fn explicit_subnets_are_registered() {
        let flags = CreateFlags {
            vpc_private_subnets: vec!["subnet-1".to_string(), "subnet-2".to_string()],
            ..CreateFlags::default()
        };
        let request = resolver(&[]).resolve_from_flags(&flags, "").unwrap();
        assert_eq!(
            request.vpc.subnet_ids(SubnetTopology::Private),
            vec!["subnet-1", "subnet-2"]
        );
        assert!(request.vpc.subnet_ids(SubnetTopology::Public).is_empty());
    }

    #[test]
    fn invalid_node_counts() {
        let flags = CreateFlags {
            nodes: 5,
            nodes_max: Some(3),
            ..CreateFlags::default()
        };
        let err = resolver(&[]).resolve_from_flags(&flags, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn tags() {
        assert_eq!(
            parse_tag("Owner=John Doe").unwrap(),
            ("Owner".to_string(), "John Doe".to_string())
        );
        assert!(parse_tag("novalue").is_err());
    }
}
