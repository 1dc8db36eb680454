use aws_sdk_ec2::model::{ResourceType, Tag, TagSpecification};
use eksup_model::constants::{TAG_CLUSTER_NAME, TAG_CREATED_BY};
use eksup_model::ClusterMeta;
use std::collections::{BTreeMap, HashMap};

const CREATED_BY: &str = "eksup";

/// The tags put on everything created for the cluster: the user's tags plus our own.
pub(crate) fn cluster_tags(meta: &ClusterMeta) -> BTreeMap<String, String> {
    let mut tags = meta.tags.clone();
    tags.insert(TAG_CLUSTER_NAME.to_string(), meta.name.clone());
    tags.insert(TAG_CREATED_BY.to_string(), CREATED_BY.to_string());
    tags
}

pub(crate) fn hash_map(tags: &BTreeMap<String, String>) -> HashMap<String, String> {
    tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// EC2 tags for `resource_type`, with a `Name` tag.
pub(crate) fn ec2_tag_specification(
    resource_type: ResourceType,
    name: &str,
    tags: &BTreeMap<String, String>,
) -> TagSpecification {
    let mut builder = TagSpecification::builder()
        .resource_type(resource_type)
        .tags(Tag::builder().key("Name").value(name).build());
    for (key, value) in tags {
        builder = builder.tags(Tag::builder().key(key).value(value).build());
    }
    builder.build()
}

pub(crate) fn iam_tags(tags: &BTreeMap<String, String>) -> Vec<aws_sdk_iam::model::Tag> {
    tags.iter()
        .map(|(key, value)| aws_sdk_iam::model::Tag::builder().key(key).value(value).build())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use eksup_model::K8sVersion;

    #[test]
    fn our_tags_are_added() {
        let meta = ClusterMeta {
            name: "c1".to_string(),
            region: "us-west-2".to_string(),
            version: K8sVersion::parse("1.11").unwrap(),
            tags: [("team".to_string(), "infra".to_string())].into_iter().collect(),
        };
        let tags = cluster_tags(&meta);
        assert_eq!(tags["team"], "infra");
        assert_eq!(tags["eksup.io/cluster-name"], "c1");
        assert_eq!(tags["eksup.io/created-by"], "eksup");
    }
}
