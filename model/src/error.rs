use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// The broad class an [`Error`] belongs to. The class decides whether side effects may already
/// exist and what the operator is told to do next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Two mutually exclusive options were both set. Raised before any external call.
    ConfigurationConflict,
    /// A required value is missing or a value is not acceptable. Raised before any side effect.
    Validation,
    /// Infrastructure creation reported one or more errors. Resources may be left behind.
    Provisioning,
    /// A readiness wait ran past its deadline.
    ReadinessTimeout,
    /// The operator aborted a wait.
    Cancelled,
    /// A call to the cloud, the cluster or the local system failed.
    External,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("cannot use --{} when --config-file/-f is set", option))]
    IncompatibleConfiguration { option: String },

    #[snafu(display(
        "--name={} and argument {} cannot be used at the same time",
        flag,
        arg
    ))]
    NameFlagAndArg { flag: String, arg: String },

    #[snafu(display("{} and {} cannot be used at the same time", first, second))]
    IncompatibleOptions { first: String, second: String },

    #[snafu(display("only one argument is allowed to be used as a name, got {}", count))]
    TooManyNameArgs { count: usize },

    #[snafu(display("Unable to read config file '{}': {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to decode config document: {}", source))]
    ConfigDecode { source: serde_yaml::Error },

    #[snafu(display("Config document is missing '{}'", field))]
    ConfigTypeMeta { field: String },

    #[snafu(display(
        "Unsupported config document apiVersion '{}', supported values: {}",
        api_version,
        supported.join(",")
    ))]
    UnknownApiVersion {
        api_version: String,
        supported: Vec<String>,
    },

    #[snafu(display("Unknown kind '{}' for apiVersion '{}'", kind, api_version))]
    UnknownKind { api_version: String, kind: String },

    #[snafu(display(
        "decoded object of wrong type: expected '{}' but found '{}'",
        expected,
        found
    ))]
    TypeMismatch { expected: String, found: String },

    #[snafu(display("{} must be set", field))]
    MissingField { field: String },

    #[snafu(display("{}", reason))]
    InvalidField { reason: String },

    #[snafu(display(
        "invalid cluster name {:?}, it must be 1 to 100 letters, digits, '-' or '_' and start with a letter or digit",
        name
    ))]
    InvalidClusterName { name: String },

    #[snafu(display("--ssh-public-key must be non-empty string"))]
    SshPublicKeyEmpty,

    #[snafu(display(
        "--region={} is not supported - use one of: {}",
        region,
        supported.join(", ")
    ))]
    UnsupportedRegion {
        region: String,
        supported: Vec<String>,
    },

    #[snafu(display("invalid version, supported values: {}", supported.join(",")))]
    UnsupportedVersion {
        version: String,
        supported: Vec<String>,
    },

    #[snafu(display("Unable to parse '{}' as a CIDR block: {}", cidr, source))]
    InvalidCidr {
        cidr: String,
        source: ipnet::AddrParseError,
    },

    #[snafu(display("Unable to split VPC CIDR '{}' into subnets: {}", cidr, reason))]
    SubnetAllocation { cidr: String, reason: String },

    #[snafu(display(
        "only {} availability zones were found in region '{}', at least {} are required",
        found,
        region,
        required
    ))]
    InsufficientZones {
        region: String,
        found: usize,
        required: usize,
    },

    #[snafu(display("{}: {}", reason, examined))]
    InsufficientSubnets { reason: String, examined: String },

    #[snafu(display(
        "subnets belong to more than one VPC ({}), all subnets must be in the same VPC",
        vpcs.join(", ")
    ))]
    SubnetVpcMismatch { vpcs: Vec<String> },

    #[snafu(display("failed to create cluster {:?} ({} error(s))", cluster_name, count))]
    Provisioning { cluster_name: String, count: usize },

    #[snafu(display("timed out after {:?} waiting for {}", timeout, what))]
    ReadinessTimeout { what: String, timeout: Duration },

    #[snafu(display("cancelled while waiting for {}", what))]
    Cancelled { what: String },

    #[snafu(display("Unable to {}: {}", action, source))]
    AwsSdk {
        action: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[snafu(display("AWS response for '{}' is missing '{}'", action, field))]
    AwsMissingField { action: String, field: String },

    #[snafu(display("Unable to verify AWS credentials: {}", reason))]
    Auth { reason: String },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube { action: String, source: kube::Error },

    #[snafu(display("Unable to create Kubernetes client: {}", source))]
    KubeClient { source: kube::Error },

    #[snafu(display("Unable to load kubeconfig: {}", source))]
    KubeconfigLoad {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    SerdeYaml {
        action: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    SerdeJson {
        action: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to {} '{}': {}", action, path.display(), source))]
    File {
        action: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to determine the home directory"))]
    HomeDir,

    #[snafu(display("Failed to run '{}': {}", what, source))]
    Process {
        what: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' failed with exit code {}\nstderr:\n{}", what, code, stderr))]
    CommandFailed {
        what: String,
        code: i32,
        stderr: String,
    },
}

impl Error {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IncompatibleConfiguration { .. }
            | Error::NameFlagAndArg { .. }
            | Error::IncompatibleOptions { .. } => ErrorKind::ConfigurationConflict,

            Error::TooManyNameArgs { .. }
            | Error::ConfigRead { .. }
            | Error::ConfigDecode { .. }
            | Error::ConfigTypeMeta { .. }
            | Error::UnknownApiVersion { .. }
            | Error::UnknownKind { .. }
            | Error::TypeMismatch { .. }
            | Error::MissingField { .. }
            | Error::InvalidField { .. }
            | Error::InvalidClusterName { .. }
            | Error::SshPublicKeyEmpty
            | Error::UnsupportedRegion { .. }
            | Error::UnsupportedVersion { .. }
            | Error::InvalidCidr { .. }
            | Error::SubnetAllocation { .. }
            | Error::InsufficientZones { .. }
            | Error::InsufficientSubnets { .. }
            | Error::SubnetVpcMismatch { .. } => ErrorKind::Validation,

            Error::Provisioning { .. } => ErrorKind::Provisioning,
            Error::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,

            Error::AwsSdk { .. }
            | Error::AwsMissingField { .. }
            | Error::Auth { .. }
            | Error::Kube { .. }
            | Error::KubeClient { .. }
            | Error::KubeconfigLoad { .. }
            | Error::SerdeYaml { .. }
            | Error::SerdeJson { .. }
            | Error::File { .. }
            | Error::HomeDir
            | Error::Process { .. }
            | Error::CommandFailed { .. } => ErrorKind::External,
        }
    }
}
