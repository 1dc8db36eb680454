use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::info;

/// Loads the config for AWS calls in `region`, using the named `profile` when one is given and the
/// default credential chain otherwise.
pub async fn aws_config(profile: Option<&str>, region: &str) -> SdkConfig {
    info!(
        "Creating a custom region provider for '{}' to be used in the aws config.",
        region
    );
    let mut config_loader = aws_config::from_env().retry_config(
        RetryConfig::standard()
            .with_retry_mode(RetryMode::Adaptive)
            .with_max_attempts(15),
    );
    if let Some(profile) = profile.filter(|p| !p.is_empty()) {
        info!("Using credentials of AWS profile '{}'", profile);
        config_loader = config_loader.credentials_provider(
            ProfileFileCredentialsProvider::builder()
                .profile_name(profile)
                .build(),
        );
    }
    config_loader
        .region(Region::new(region.to_string()))
        .load()
        .await
}
