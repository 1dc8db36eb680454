use super::{ClusterClient, ClusterConnector, NodeSummary};
use crate::constants::{STORAGE_CLASS_DEFAULT_ANNOTATION, STORAGE_CLASS_NAME, STORAGE_CLASS_PROVISIONER};
use crate::error::{self, Result};
use crate::kubeconfig::Kubeconfig;
use crate::version::K8sVersion;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config};
use log::{debug, trace};
use maplit::btreemap;
use snafu::ResultExt;
use std::collections::BTreeMap;

/// Connects to a cluster by handing an in-memory kubeconfig to `kube`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeConnector;

#[async_trait::async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Box<dyn ClusterClient>> {
        let config =
            Config::from_custom_kubeconfig(kubeconfig.clone(), &KubeConfigOptions::default())
            .await
            .context(error::KubeconfigLoadSnafu)?;
        let client = Client::try_from(config).context(error::KubeClientSnafu)?;
        Ok(Box::new(KubeClusterClient::new(client)))
    }
}

/// A [`ClusterClient`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn server_version(&self) -> Result<K8sVersion> {
        let info = self
            .client
            .apiserver_version()
            .await
            .context(error::KubeSnafu {
                action: "get the server version",
            })?;
        trace!("server version info: {:?}", info);
        K8sVersion::parse(&info.git_version).map_err(|reason| error::Error::InvalidField {
            reason: format!("server reported an unexpected version: {}", reason),
        })
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api = Api::<ConfigMap>::namespaced(self.client.clone(), namespace);
        let config_map = api.get_opt(name).await.context(error::KubeSnafu {
            action: format!("get config map '{}/{}'", namespace, name),
        })?;
        Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let api = Api::<ConfigMap>::namespaced(self.client.clone(), namespace);
        let existing = api.get_opt(name).await.context(error::KubeSnafu {
            action: format!("get config map '{}/{}'", namespace, name),
        })?;
        match existing {
            Some(mut config_map) => {
                debug!("replacing config map '{}/{}'", namespace, name);
                config_map.data = Some(data);
                api.replace(name, &PostParams::default(), &config_map)
                    .await
                    .context(error::KubeSnafu {
                        action: format!("replace config map '{}/{}'", namespace, name),
                    })?;
            }
            None => {
                debug!("creating config map '{}/{}'", namespace, name);
                let config_map = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    data: Some(data),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &config_map)
                    .await
                    .context(error::KubeSnafu {
                        action: format!("create config map '{}/{}'", namespace, name),
                    })?;
            }
        }
        Ok(())
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeSummary>> {
        let api = Api::<Node>::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(error::KubeSnafu {
                action: format!("list nodes matching '{}'", label_selector),
            })?;
        Ok(nodes.items.iter().map(node_summary).collect())
    }

    async fn create_default_storage_class(&self) -> Result<()> {
        let api = Api::<StorageClass>::all(self.client.clone());
        api.create(&PostParams::default(), &default_storage_class())
            .await
            .context(error::KubeSnafu {
                action: format!("create storage class '{}'", STORAGE_CLASS_NAME),
            })?;
        Ok(())
    }
}

fn node_summary(node: &Node) -> NodeSummary {
    let ready = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready,
    }
}

fn default_storage_class() -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(STORAGE_CLASS_NAME.to_string()),
            annotations: Some(btreemap! {
                STORAGE_CLASS_DEFAULT_ANNOTATION.to_string() => "true".to_string(),
            }),
            ..Default::default()
        },
        provisioner: STORAGE_CLASS_PROVISIONER.to_string(),
        parameters: Some(btreemap! {
            "type".to_string() => "gp2".to_string(),
            "fsType".to_string() => "ext4".to_string(),
        }),
        reclaim_policy: Some("Delete".to_string()),
        ..Default::default()
    }
}
