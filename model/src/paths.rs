use crate::error::{self, Result};
use snafu::OptionExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context(error::HomeDirSnafu)
}

/// Expands a leading `~` to the home directory.
pub fn expand_home<S: AsRef<str>>(path: S) -> Result<PathBuf> {
    expand_home_with(path.as_ref(), home_dir)
}

fn expand_home_with<F>(path: &str, home: F) -> Result<PathBuf>
where
    F: FnOnce() -> Result<PathBuf>,
{
    if path == "~" {
        return home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home()?.join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}

/// The kubeconfig written to when no path is given: the first entry of `$KUBECONFIG`, or
/// `~/.kube/config`.
pub fn default_kubeconfig_path() -> Result<PathBuf> {
    default_kubeconfig_path_from(std::env::var_os("KUBECONFIG"), dirs::home_dir())
}

pub fn default_kubeconfig_path_from(
    env: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(first) = env
        .as_ref()
        .and_then(|env| std::env::split_paths(env).find(|p| !p.as_os_str().is_empty()))
    {
        return Ok(first);
    }
    Ok(home.context(error::HomeDirSnafu)?.join(".kube").join("config"))
}

/// The per-cluster kubeconfig used by `--auto-kubeconfig`.
pub fn auto_kubeconfig_path(home: &Path, cluster_name: &str) -> PathBuf {
    home.join(".kube")
        .join("eksup")
        .join("clusters")
        .join(cluster_name)
}
