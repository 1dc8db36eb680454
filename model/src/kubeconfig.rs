/*!

Kubeconfig documents for a newly created cluster, built from `kube`'s own kubeconfig types. A
[`ClientConfig`] holds the cluster endpoint and CA and renders either a kubeconfig that obtains
tokens via an exec plugin (written to disk) or one with an embedded bearer token (used in memory
while waiting for the cluster).

!*/

use crate::clients::CredentialWriter;
use crate::error::{self, Result};
use crate::paths::{auto_kubeconfig_path, home_dir};
use crate::request::ClusterMeta;
use kube::config::{
    AuthInfo, Cluster, Context, ExecConfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use log::debug;
use maplit::hashmap;
use secrecy::SecretString;
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

pub use kube::config::Kubeconfig;

const KUBECONFIG_API_VERSION: &str = "v1";
const KUBECONFIG_KIND: &str = "Config";
const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";
const EXEC_COMMAND: &str = "aws";

/// Parses a kubeconfig file. An empty file is an empty kubeconfig.
pub fn from_yaml(data: &str) -> Result<Kubeconfig> {
    if data.trim().is_empty() {
        return Ok(Kubeconfig::default());
    }
    Kubeconfig::from_yaml(data).context(error::KubeconfigLoadSnafu)
}

pub fn to_yaml(kubeconfig: &Kubeconfig) -> Result<String> {
    serde_yaml::to_string(kubeconfig).context(error::SerdeYamlSnafu {
        action: "serialize kubeconfig",
    })
}

/// Merges `new` into `existing`. Clusters, users and contexts with the same name are replaced,
/// others are kept. `current-context` is taken from `new` when `set_context` is true.
pub fn merge(existing: &mut Kubeconfig, new: &Kubeconfig, set_context: bool) {
    existing
        .api_version
        .get_or_insert_with(|| KUBECONFIG_API_VERSION.to_string());
    existing
        .kind
        .get_or_insert_with(|| KUBECONFIG_KIND.to_string());
    replace_by_name(&mut existing.clusters, &new.clusters, |c| &c.name);
    replace_by_name(&mut existing.auth_infos, &new.auth_infos, |u| &u.name);
    replace_by_name(&mut existing.contexts, &new.contexts, |c| &c.name);
    if set_context && new.current_context.is_some() {
        existing.current_context = new.current_context.clone();
    }
}

fn replace_by_name<T, F>(existing: &mut Vec<T>, new: &[T], name: F)
where
    T: Clone,
    F: Fn(&T) -> &String,
{
    for item in new {
        match existing.iter_mut().find(|e| name(e) == name(item)) {
            Some(slot) => *slot = item.clone(),
            None => existing.push(item.clone()),
        }
    }
}

/// The connection details of one cluster, before a credential is chosen.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    pub cluster_name: String,
    pub region: String,
    pub endpoint: String,
    pub certificate_authority_data: String,
    /// The name of the credential's owner, used in the context name.
    pub username: String,
}

impl ClientConfig {
    pub fn new(
        meta: &ClusterMeta,
        endpoint: impl Into<String>,
        certificate_authority_data: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: meta.name.clone(),
            region: meta.region.clone(),
            endpoint: endpoint.into(),
            certificate_authority_data: certificate_authority_data.into(),
            username: username.into(),
        }
    }

    /// The name of the cluster entry, e.g. `my-cluster.us-west-2.eksup.io`.
    pub fn kubeconfig_cluster_name(&self) -> String {
        format!("{}.{}.eksup.io", self.cluster_name, self.region)
    }

    pub fn context_name(&self) -> String {
        format!("{}@{}", self.username, self.kubeconfig_cluster_name())
    }

    /// A kubeconfig whose user runs `aws eks get-token` to obtain credentials.
    pub fn with_exec_authenticator(&self, profile: Option<&str>) -> Kubeconfig {
        let env = profile.filter(|p| !p.is_empty()).map(|p| {
            vec![hashmap! {
                "name".to_string() => "AWS_PROFILE".to_string(),
                "value".to_string() => p.to_string(),
            }]
        });
        self.kubeconfig(AuthInfo {
            exec: Some(ExecConfig {
                api_version: Some(EXEC_API_VERSION.to_string()),
                command: Some(EXEC_COMMAND.to_string()),
                args: Some(vec![
                    "eks".to_string(),
                    "get-token".to_string(),
                    "--cluster-name".to_string(),
                    self.cluster_name.clone(),
                    "--region".to_string(),
                    self.region.clone(),
                ]),
                env,
                drop_env: None,
                interactive_mode: None,
            }),
            ..AuthInfo::default()
        })
    }

    /// A kubeconfig with `token` embedded.
    pub fn with_embedded_token<S: Into<String>>(&self, token: S) -> Kubeconfig {
        self.kubeconfig(AuthInfo {
            token: Some(SecretString::new(token.into())),
            ..AuthInfo::default()
        })
    }

    fn kubeconfig(&self, auth_info: AuthInfo) -> Kubeconfig {
        let cluster = self.kubeconfig_cluster_name();
        let context = self.context_name();
        Kubeconfig {
            api_version: Some(KUBECONFIG_API_VERSION.to_string()),
            kind: Some(KUBECONFIG_KIND.to_string()),
            clusters: vec![NamedCluster {
                name: cluster.clone(),
                cluster: Some(Cluster {
                    server: Some(self.endpoint.clone()),
                    certificate_authority_data: Some(self.certificate_authority_data.clone()),
                    ..Cluster::default()
                }),
            }],
            auth_infos: vec![NamedAuthInfo {
                name: context.clone(),
                auth_info: Some(auth_info),
            }],
            contexts: vec![NamedContext {
                name: context.clone(),
                context: Some(Context {
                    cluster,
                    user: context.clone(),
                    namespace: None,
                    extensions: None,
                }),
            }],
            current_context: Some(context),
            ..Kubeconfig::default()
        }
    }
}

/// Decides where the kubeconfig goes. `explicit` is the `--kubeconfig` value if one was given and
/// `default_path` is where it goes otherwise. `--auto-kubeconfig` may only be combined with the
/// default path.
pub fn output_path(
    explicit: Option<&Path>,
    auto: bool,
    cluster_name: &str,
    default_path: &Path,
) -> Result<PathBuf> {
    let chosen = explicit.unwrap_or(default_path);
    if !auto {
        return Ok(chosen.to_path_buf());
    }
    ensure!(
        chosen == default_path,
        error::IncompatibleOptionsSnafu {
            first: "--kubeconfig",
            second: "--auto-kubeconfig",
        }
    );
    Ok(auto_kubeconfig_path(&home_dir()?, cluster_name))
}

/// Writes kubeconfig files on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileCredentialWriter;

impl CredentialWriter for FileCredentialWriter {
    fn write(&self, path: &Path, kubeconfig: &Kubeconfig, set_context: bool) -> Result<PathBuf> {
        let mut existing = if path.exists() {
            let data = fs::read_to_string(path).context(error::FileSnafu {
                action: "read kubeconfig",
                path,
            })?;
            from_yaml(&data)?
        } else {
            Kubeconfig::default()
        };
        merge(&mut existing, kubeconfig, set_context);

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context(error::FileSnafu {
                action: "create directory",
                path: dir,
            })?;
        }
        debug!("writing kubeconfig to {}", path.display());
        fs::write(path, to_yaml(&existing)?).context(error::FileSnafu {
            action: "write kubeconfig",
            path,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).context(
                error::FileSnafu {
                    action: "set permissions of",
                    path,
                },
            )?;
        }
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::version::K8sVersion;
    use secrecy::ExposeSecret;
    use std::collections::BTreeMap;

    fn client_config() -> ClientConfig {
        let meta = ClusterMeta {
            name: "my-cluster".to_string(),
            region: "us-west-2".to_string(),
            version: K8sVersion::new(1, 11, None),
            tags: BTreeMap::new(),
        };
        ClientConfig::new(&meta, "https://example.com", "Q0EK", "alice")
    }

    fn auth_info(kubeconfig: &Kubeconfig) -> &AuthInfo {
        kubeconfig.auth_infos[0].auth_info.as_ref().unwrap()
    }

    #[test]
    fn exec_authenticator() {
        let config = client_config().with_exec_authenticator(Some("dev"));
        assert_eq!(
            config.current_context.as_deref(),
            Some("alice@my-cluster.us-west-2.eksup.io")
        );
        let exec = auth_info(&config).exec.as_ref().unwrap();
        assert_eq!(exec.command.as_deref(), Some("aws"));
        assert_eq!(
            exec.args.as_ref().unwrap(),
            &vec!["eks", "get-token", "--cluster-name", "my-cluster", "--region", "us-west-2"]
        );
        assert_eq!(exec.env.as_ref().unwrap()[0]["name"], "AWS_PROFILE");
        assert_eq!(exec.env.as_ref().unwrap()[0]["value"], "dev");
        assert!(auth_info(&config).token.is_none());

        let yaml = to_yaml(&config).unwrap();
        assert!(yaml.contains("certificate-authority-data: Q0EK"), "{}", yaml);
        assert!(yaml.contains("current-context: alice@my-cluster.us-west-2.eksup.io"));
        assert!(yaml.contains("apiVersion: client.authentication.k8s.io/v1beta1"));

        // What we write is what kube reads back.
        let read = from_yaml(&yaml).unwrap();
        assert_eq!(read.auth_infos[0].name, "alice@my-cluster.us-west-2.eksup.io");
        assert!(from_yaml("").unwrap().clusters.is_empty());
    }

    #[test]
    fn embedded_token() {
        let config = client_config().with_embedded_token("secret");
        assert_eq!(
            auth_info(&config).token.as_ref().unwrap().expose_secret(),
            "secret"
        );
        assert!(auth_info(&config).exec.is_none());
        assert!(to_yaml(&config).unwrap().contains("token: secret"));
    }

    #[test]
    fn merge_keeps_other_entries() {
        let existing = r#"
apiVersion: v1
kind: Config
preferences: {}
clusters:
  - name: other
    cluster:
      server: https://other.example.com
      insecure-skip-tls-verify: true
users:
  - name: other
    user:
      token: abc
contexts:
  - name: other
    context:
      cluster: other
      user: other
current-context: other
"#;
        let mut kubeconfig = from_yaml(existing).unwrap();
        merge(
            &mut kubeconfig,
            &client_config().with_exec_authenticator(None),
            false,
        );
        assert_eq!(kubeconfig.clusters.len(), 2);
        assert_eq!(kubeconfig.current_context.as_deref(), Some("other"));
        assert!(kubeconfig.preferences.is_some());
        assert_eq!(
            kubeconfig.clusters[0]
                .cluster
                .as_ref()
                .unwrap()
                .insecure_skip_tls_verify,
            Some(true)
        );

        // Merging the same cluster again replaces it.
        merge(
            &mut kubeconfig,
            &client_config().with_exec_authenticator(None),
            true,
        );
        assert_eq!(kubeconfig.clusters.len(), 2);
        assert_eq!(kubeconfig.auth_infos.len(), 2);
        assert_eq!(
            kubeconfig.current_context.as_deref(),
            Some("alice@my-cluster.us-west-2.eksup.io")
        );
    }

    #[test]
    fn file_writer_merges() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config");
        let writer = FileCredentialWriter;
        let written = writer
            .write(&path, &client_config().with_exec_authenticator(None), true)
            .unwrap();
        assert_eq!(written, path);
        writer
            .write(&path, &client_config().with_exec_authenticator(None), true)
            .unwrap();
        let read = from_yaml(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read.clusters.len(), 1);
        assert_eq!(
            read.current_context.as_deref(),
            Some("alice@my-cluster.us-west-2.eksup.io")
        );
    }

    #[test]
    fn output_path_conflicts() {
        let default = Path::new("/home/me/.kube/config");
        assert_eq!(
            output_path(None, false, "c", default).unwrap(),
            default.to_path_buf()
        );
        assert_eq!(
            output_path(Some(Path::new("/tmp/kc")), false, "c", default).unwrap(),
            PathBuf::from("/tmp/kc")
        );
        let err = output_path(Some(Path::new("/tmp/kc")), true, "c", default).unwrap_err();
        assert_eq!(
            err.to_string(),
            "--kubeconfig and --auto-kubeconfig cannot be used at the same time"
        );
        // The default path given explicitly is not a conflict.
        assert!(output_path(Some(default), true, "c", default)
            .unwrap()
            .ends_with(".kube/eksup/clusters/c"));
    }
}
