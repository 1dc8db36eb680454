/*!

Checks of the client tools an operator needs to use the new cluster. Nothing here is fatal, every
problem is reported as an advisory.

!*/

use crate::constants::MIN_KUBECTL_VERSION;
use crate::error::{self, Result};
use crate::request::NodeGroupSpec;
use crate::version::K8sVersion;
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::path::Path;
use tokio::process::Command;

const KUBECTL: &str = "kubectl";
const AWS_CLI: &str = "aws";
const NVIDIA_DEVICE_PLUGIN_URL: &str = "https://github.com/NVIDIA/k8s-device-plugin";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubectlVersionOutput {
    client_version: GitVersionInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitVersionInfo {
    git_version: String,
}

/// Parses the output of `kubectl version --client -o json`.
pub fn parse_kubectl_version(json: &str) -> Result<K8sVersion> {
    let output: KubectlVersionOutput = serde_json::from_str(json).context(error::SerdeJsonSnafu {
        action: "parse kubectl version output",
    })?;
    K8sVersion::parse(&output.client_version.git_version)
        .map_err(|reason| error::Error::InvalidField { reason })
}

async fn kubectl_client_version() -> Result<K8sVersion> {
    let what = format!("{} version --client -o json", KUBECTL);
    let output = Command::new(KUBECTL)
        .args(["version", "--client", "-o", "json"])
        .output()
        .await
        .context(error::ProcessSnafu { what: what.as_str() })?;
    ensure!(
        output.status.success(),
        error::CommandFailedSnafu {
            what: what.as_str(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr),
        }
    );
    parse_kubectl_version(&String::from_utf8_lossy(&output.stdout))
}

/// The advisory for a `kubectl` client of `version`, or for a missing one.
pub fn kubectl_advisory(version: Option<&K8sVersion>) -> Option<String> {
    let (major, minor) = MIN_KUBECTL_VERSION;
    match version {
        None => Some(format!(
            "{} not found, v{}.{}.0 or newer is required",
            KUBECTL, major, minor
        )),
        Some(v) if !v.at_least(major, minor) => Some(format!(
            "{} version {} was found, minimum required version to use EKS is v{}.{}.0",
            KUBECTL,
            v.full_version_with_v(),
            major,
            minor
        )),
        Some(_) => None,
    }
}

async fn aws_cli_present() -> bool {
    Command::new(AWS_CLI)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// The advisory for a missing `aws` CLI, which the written kubeconfig runs to obtain tokens.
pub fn aws_cli_advisory(present: bool, kubeconfig_written: bool) -> Option<String> {
    if kubeconfig_written && !present {
        Some(format!(
            "{} not found, the written kubeconfig runs '{} eks get-token' to authenticate",
            AWS_CLI, AWS_CLI
        ))
    } else {
        None
    }
}

/// How to use the written kubeconfig when it is not picked up by default.
pub fn kubeconfig_hint(
    kubeconfig: Option<&Path>,
    default_path: Option<&Path>,
    set_context: bool,
    context: &str,
) -> Option<String> {
    let path = kubeconfig?;
    if Some(path) != default_path {
        Some(format!(
            "kubectl command should work with {:?}, try 'kubectl --kubeconfig={} get nodes'",
            path,
            path.display()
        ))
    } else if !set_context {
        Some(format!(
            "kubectl command should work with {:?}, try 'kubectl --context={} get nodes'",
            path, context
        ))
    } else {
        None
    }
}

/// Advisories about local client tools. Runs `kubectl` and `aws` when called.
pub async fn check_client_tools(kubeconfig_written: bool) -> Vec<String> {
    let (kubectl, aws_cli) = tokio::join!(kubectl_client_version(), aws_cli_present());
    kubectl_advisory(kubectl.ok().as_ref())
        .into_iter()
        .chain(aws_cli_advisory(aws_cli, kubeconfig_written))
        .collect()
}

/// The notice for GPU instance types, which need the NVIDIA device plugin.
pub fn gpu_notice(node_group: &NodeGroupSpec) -> Option<String> {
    if node_group.is_gpu_instance_type() {
        Some(format!(
            "as you are using a GPU optimized instance type you will need to install NVIDIA \
            Kubernetes device plugin, see {} for instructions",
            NVIDIA_DEVICE_PLUGIN_URL
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kubectl_versions() {
        let json = r#"{"clientVersion":{"major":"1","minor":"27","gitVersion":"v1.27.3"},"kustomizeVersion":"v5.0.1"}"#;
        let v = parse_kubectl_version(json).unwrap();
        assert!(kubectl_advisory(Some(&v)).is_none());

        let old = K8sVersion::parse("v1.9.2").unwrap();
        assert!(kubectl_advisory(Some(&old)).unwrap().contains("v1.10.0"));
        assert!(kubectl_advisory(None).unwrap().contains("not found"));
        assert!(parse_kubectl_version("not json").is_err());
    }

    #[test]
    fn aws_cli() {
        assert!(aws_cli_advisory(false, true).is_some());
        assert!(aws_cli_advisory(false, false).is_none());
        assert!(aws_cli_advisory(true, true).is_none());
    }

    #[tokio::test]
    async fn aws_cli_is_only_checked_for_written_kubeconfigs() {
        let advisories = check_client_tools(false).await;
        assert!(advisories.iter().all(|a| !a.contains(AWS_CLI)), "{:?}", advisories);
    }

    #[test]
    fn hints() {
        let default = Path::new("/home/me/.kube/config");
        let auto = Path::new("/home/me/.kube/eksup/clusters/c");
        assert!(kubeconfig_hint(Some(auto), Some(default), true, "ctx")
            .unwrap()
            .contains("--kubeconfig=/home/me/.kube/eksup/clusters/c"));
        assert!(kubeconfig_hint(Some(default), Some(default), false, "ctx")
            .unwrap()
            .contains("--context=ctx"));
        assert!(kubeconfig_hint(Some(default), Some(default), true, "ctx").is_none());
        assert!(kubeconfig_hint(None, Some(default), true, "ctx").is_none());
    }

    #[test]
    fn gpu() {
        let mut ng = NodeGroupSpec::default();
        assert!(gpu_notice(&ng).is_none());
        ng.instance_type = "p3.8xlarge".to_string();
        assert!(gpu_notice(&ng).unwrap().contains("NVIDIA"));
    }
}
