use crate::clients::ClusterClient;
use crate::constants::{
    AUTH_CONFIG_MAP_NAME, AUTH_CONFIG_MAP_NAMESPACE, AUTH_MAP_ROLES_KEY, NODE_GROUPS, NODE_USERNAME,
};
use crate::error::{self, Result};
use log::info;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;

/// One entry of the `mapRoles` list in the `aws-auth` config map.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MapRole {
    pub rolearn: String,
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl MapRole {
    /// The mapping that lets instances with `role_arn` join as nodes.
    pub fn node(role_arn: &str) -> Self {
        Self {
            rolearn: role_arn.to_string(),
            username: NODE_USERNAME.to_string(),
            groups: NODE_GROUPS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Adds the node mapping for `role_arn` to the existing config map data. Returns `None` when an
/// identical mapping is already present, meaning nothing needs to be written.
pub fn merge_node_role(
    existing: Option<&BTreeMap<String, String>>,
    role_arn: &str,
) -> Result<Option<BTreeMap<String, String>>> {
    let mut data = existing.cloned().unwrap_or_default();
    let mut roles: Vec<MapRole> = match data.get(AUTH_MAP_ROLES_KEY) {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).context(error::SerdeYamlSnafu {
                action: "parse aws-auth mapRoles",
            })?
        }
        _ => Vec::new(),
    };

    let wanted = MapRole::node(role_arn);
    if roles.contains(&wanted) {
        return Ok(None);
    }
    // A mapping for the same role with different groups is replaced.
    roles.retain(|role| role.rolearn != role_arn);
    roles.push(wanted);
    let yaml = serde_yaml::to_string(&roles).context(error::SerdeYamlSnafu {
        action: "serialize aws-auth mapRoles",
    })?;
    data.insert(AUTH_MAP_ROLES_KEY.to_string(), yaml);
    Ok(Some(data))
}

/// Makes sure nodes with `role_arn` are allowed to join. Returns whether a write was made.
pub async fn authorize_nodes(client: &dyn ClusterClient, role_arn: &str) -> Result<bool> {
    let existing = client
        .get_config_map(AUTH_CONFIG_MAP_NAMESPACE, AUTH_CONFIG_MAP_NAME)
        .await?;
    match merge_node_role(existing.as_ref(), role_arn)? {
        Some(data) => {
            client
                .apply_config_map(AUTH_CONFIG_MAP_NAMESPACE, AUTH_CONFIG_MAP_NAME, data)
                .await?;
            info!(
                "created \"{}/configmap/{}\"",
                AUTH_CONFIG_MAP_NAMESPACE, AUTH_CONFIG_MAP_NAME
            );
            Ok(true)
        }
        None => {
            info!(
                "nodes with role {} are already authorized in \"{}/configmap/{}\"",
                role_arn, AUTH_CONFIG_MAP_NAMESPACE, AUTH_CONFIG_MAP_NAME
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ROLE: &str = "arn:aws:iam::123456789012:role/NodeInstanceRole";

    #[test]
    fn merge_into_missing_config_map() {
        let data = merge_node_role(None, ROLE).unwrap().unwrap();
        let roles: Vec<MapRole> = serde_yaml::from_str(&data[AUTH_MAP_ROLES_KEY]).unwrap();
        assert_eq!(roles, vec![MapRole::node(ROLE)]);
        assert_eq!(roles[0].username, "system:node:{{EC2PrivateDNSName}}");
        assert_eq!(roles[0].groups, vec!["system:bootstrappers", "system:nodes"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let first = merge_node_role(None, ROLE).unwrap().unwrap();
        assert!(merge_node_role(Some(&first), ROLE).unwrap().is_none());
    }

    #[test]
    fn merge_keeps_other_roles() {
        let mut existing = BTreeMap::new();
        existing.insert(
            AUTH_MAP_ROLES_KEY.to_string(),
            "- rolearn: arn:aws:iam::123456789012:role/Admin\n  username: admin\n  groups:\n    - system:masters\n"
                .to_string(),
        );
        existing.insert("mapUsers".to_string(), "[]".to_string());
        let data = merge_node_role(Some(&existing), ROLE).unwrap().unwrap();
        let roles: Vec<MapRole> = serde_yaml::from_str(&data[AUTH_MAP_ROLES_KEY]).unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].username, "admin");
        assert_eq!(data["mapUsers"], "[]");
    }
}
