/*!

AWS implementations of the collaborator traits defined in `eksup_model::clients`. The SDK clients
are created once from a shared [`aws_types::SdkConfig`] and handed to each implementation.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use cloud::AwsCloud;
pub use config::aws_config;
pub use provisioner::AwsProvisioner;
pub use resources::AwsResources;
pub use token::StsTokenSource;

mod cloud;
mod config;
mod error;
mod provisioner;
mod resources;
mod tags;
mod token;

use aws_types::SdkConfig;

/// The SDK clients for every service we call.
#[derive(Clone, Debug)]
pub struct AwsClients {
    pub ec2: aws_sdk_ec2::Client,
    pub eks: aws_sdk_eks::Client,
    pub iam: aws_sdk_iam::Client,
    pub ssm: aws_sdk_ssm::Client,
    pub sts: aws_sdk_sts::Client,
}

impl AwsClients {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            eks: aws_sdk_eks::Client::new(config),
            iam: aws_sdk_iam::Client::new(config),
            ssm: aws_sdk_ssm::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}
