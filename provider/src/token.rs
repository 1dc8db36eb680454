use crate::error::AwsContext;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SignatureLocation, SigningParams, SigningSettings,
};
use aws_types::SdkConfig;
use base64::engine::fast_portable::{FastPortable, NO_PAD};
use eksup_model::clients::TokenSource;
use eksup_model::{Error, Result};
use log::trace;
use std::time::{Duration, SystemTime};

const TOKEN_PREFIX: &str = "k8s-aws-v1.";
const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";
/// How long the presigned request inside a token stays valid.
const PRESIGNED_URL_EXPIRY: Duration = Duration::from_secs(60);
const URL_SAFE_NO_PAD: FastPortable = FastPortable::from(&base64::alphabet::URL_SAFE, NO_PAD);

/// Issues cluster tokens in-process. A token is a presigned STS `GetCallerIdentity` URL bound to
/// the cluster name, which the cluster's authenticator replays to learn the caller's identity.
#[derive(Clone, Debug)]
pub struct StsTokenSource {
    credentials: Option<SharedCredentialsProvider>,
}

impl StsTokenSource {
    /// Uses the credentials of `config`, so tokens are issued for the same identity (and profile)
    /// as the cluster is created with.
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            credentials: config.credentials_provider().cloned(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for StsTokenSource {
    async fn token(&self, cluster_name: &str, region: &str) -> Result<String> {
        let provider = self.credentials.as_ref().ok_or_else(|| Error::Auth {
            reason: "no AWS credentials are configured".to_string(),
        })?;
        let credentials = provider
            .provide_credentials()
            .await
            .aws_context("load AWS credentials")?;
        trace!("presigning a token for cluster {:?}", cluster_name);
        presigned_token(&credentials, cluster_name, region, SystemTime::now())
    }
}

fn presigned_token(
    credentials: &Credentials,
    cluster_name: &str,
    region: &str,
    time: SystemTime,
) -> Result<String> {
    let mut request = http::Request::builder()
        .method("GET")
        .uri(format!(
            "https://sts.{}.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15",
            region
        ))
        .header(CLUSTER_ID_HEADER, cluster_name)
        .body(())
        .aws_context("build the token request")?;

    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.expires_in = Some(PRESIGNED_URL_EXPIRY);
    let mut builder = SigningParams::builder()
        .access_key(credentials.access_key_id())
        .secret_key(credentials.secret_access_key())
        .region(region)
        .service_name("sts")
        .time(time)
        .settings(settings);
    builder.set_security_token(credentials.session_token());
    let params = builder.build().aws_context("sign the token request")?;

    let signable = SignableRequest::new(
        request.method(),
        request.uri(),
        request.headers(),
        SignableBody::Bytes(&[]),
    );
    let (instructions, _) = sign(signable, &params)
        .aws_context("sign the token request")?
        .into_parts();
    instructions.apply_to_request(&mut request);

    Ok(format!(
        "{}{}",
        TOKEN_PREFIX,
        base64::encode_engine(request.uri().to_string(), &URL_SAFE_NO_PAD)
    ))
}
