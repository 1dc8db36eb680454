use super::Calls;
use eksup_model::clients::{ClusterClient, ClusterConnector, NodeSummary};
use eksup_model::kubeconfig::Kubeconfig;
use eksup_model::{Error, K8sVersion, Result};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// What the mock cluster holds.
#[derive(Debug, Default)]
pub(crate) struct ClusterState {
    pub(crate) config_maps: BTreeMap<(String, String), BTreeMap<String, String>>,
    pub(crate) config_map_writes: usize,
    pub(crate) storage_classes: usize,
    /// The number of nodes reported as ready.
    pub(crate) ready_nodes: usize,
    /// Nodes are reported as not ready until they have been listed this many times.
    pub(crate) node_lists_before_ready: usize,
    pub(crate) node_lists: usize,
    /// How many requests each bearer token has made.
    pub(crate) token_uses: BTreeMap<String, usize>,
    /// Requests beyond this many per token are rejected as if the token had expired.
    pub(crate) max_token_uses: Option<usize>,
}

impl ClusterState {
    fn authenticate(&mut self, token: &str) -> Result<()> {
        let uses = self.token_uses.entry(token.to_string()).or_default();
        *uses += 1;
        match self.max_token_uses {
            Some(max) if *uses > max => Err(Error::InvalidField {
                reason: format!("Unauthorized: token {:?} has expired", token),
            }),
            _ => Ok(()),
        }
    }
}

pub(crate) struct MockConnector {
    pub(crate) calls: Calls,
    pub(crate) state: Arc<Mutex<ClusterState>>,
}

#[async_trait::async_trait]
impl ClusterConnector for MockConnector {
    async fn connect(&self, kubeconfig: &Kubeconfig) -> Result<Box<dyn ClusterClient>> {
        self.calls.record("connect");
        assert_eq!(kubeconfig.auth_infos.len(), 1);
        let token = kubeconfig.auth_infos[0]
            .auth_info
            .as_ref()
            .and_then(|auth_info| auth_info.token.as_ref())
            .map(|token| token.expose_secret().clone())
            .expect("in-memory kubeconfigs carry a token");
        Ok(Box::new(MockClusterClient {
            calls: self.calls.clone(),
            state: Arc::clone(&self.state),
            token,
        }))
    }
}

struct MockClusterClient {
    calls: Calls,
    state: Arc<Mutex<ClusterState>>,
    token: String,
}

impl MockClusterClient {
    fn authenticate(&self) -> Result<()> {
        self.state.lock().unwrap().authenticate(&self.token)
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn server_version(&self) -> Result<K8sVersion> {
        self.calls.record("server_version");
        self.authenticate()?;
        Ok(K8sVersion::parse("v1.11.5").unwrap())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        self.calls.record("get_config_map");
        self.authenticate()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        self.calls.record("apply_config_map");
        self.authenticate()?;
        let mut state = self.state.lock().unwrap();
        state
            .config_maps
            .insert((namespace.to_string(), name.to_string()), data);
        state.config_map_writes += 1;
        Ok(())
    }

    async fn list_nodes(&self, _label_selector: &str) -> Result<Vec<NodeSummary>> {
        self.calls.record("list_nodes");
        self.authenticate()?;
        let mut state = self.state.lock().unwrap();
        state.node_lists += 1;
        let ready = if state.node_lists > state.node_lists_before_ready {
            state.ready_nodes
        } else {
            0
        };
        Ok((0..ready)
            .map(|i| NodeSummary {
                name: format!("ip-192-168-{}-10.us-west-2.compute.internal", i),
                ready: true,
            })
            .collect())
    }

    async fn create_default_storage_class(&self) -> Result<()> {
        self.calls.record("create_default_storage_class");
        self.authenticate()?;
        self.state.lock().unwrap().storage_classes += 1;
        Ok(())
    }
}
