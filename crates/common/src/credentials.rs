//! AWS client configuration resolution.
//!
//! Every remote service client is constructed from a freshly resolved
//! [`ResolvedClientConfig`]. Resolution is never cached, so the object store
//! and the build service each go through [`resolve`] on their own.

use aws_config::{
    profile::ProfileFileCredentialsProvider, sts::AssumeRoleProvider, BehaviorVersion,
    ConfigLoader, Region, SdkConfig,
};
use aws_credential_types::provider::{error::CredentialsError, ProvideCredentials};
use derive_more::{Display, Error};
use tracing::{debug, instrument};

/// Session name attached to every assumed role session.
const ROLE_SESSION_NAME: &str = "cbdeploy";

/// Credential resolution errors.
#[derive(Debug, Display, Error)]
pub enum CredentialError {
    /// Selected credential source was unable to provide credentials.
    #[display(fmt = "unable to obtain {} credentials: {}", mode, source)]
    Provider {
        /// Resolution mode which failed.
        mode: CredentialMode,

        /// Underlying provider error.
        source: CredentialsError,
    },
}

/// Input to the credential resolver.
#[derive(Clone, Debug, Default)]
pub struct CredentialSpec {
    /// Named profile from the shared credentials file.
    pub profile: Option<String>,

    /// ARN of a role that should be assumed.
    pub role_arn: Option<String>,

    /// Region every client is scoped to.
    pub region: String,

    /// Service endpoint override, used for local or alternate endpoints.
    pub endpoint: Option<String>,
}

impl CredentialSpec {
    /// Resolution mode implied by the provided profile and role.
    pub fn mode(&self) -> CredentialMode {
        CredentialMode::select(self.profile.as_deref(), self.role_arn.as_deref())
    }
}

/// Strategy used to obtain credentials.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CredentialMode {
    /// Use the named profile directly.
    #[display(fmt = "profile")]
    Profile,

    /// Assume a role using the default credential chain.
    #[display(fmt = "assumed role")]
    AssumeRole,

    /// Assume a role using the named profile as the assuming principal.
    #[display(fmt = "profile assumed role")]
    ProfileAssumeRole,

    /// Ambient credential discovery (environment, instance role, etc.).
    #[display(fmt = "default")]
    Default,
}

impl CredentialMode {
    /// Select a mode from the presence of a profile name and a role ARN.
    ///
    /// Empty strings count as absent.
    pub fn select(profile: Option<&str>, role_arn: Option<&str>) -> Self {
        let profile = profile.filter(|value| !value.is_empty());
        let role_arn = role_arn.filter(|value| !value.is_empty());

        match (profile, role_arn) {
            (Some(_), None) => Self::Profile,
            (None, Some(_)) => Self::AssumeRole,
            (Some(_), Some(_)) => Self::ProfileAssumeRole,
            (None, None) => Self::Default,
        }
    }
}

/// Credential-bearing configuration used to construct a single service client.
#[derive(Debug)]
pub struct ResolvedClientConfig {
    sdk_config: SdkConfig,
    endpoint_overridden: bool,
}

impl ResolvedClientConfig {
    /// Underlying SDK configuration.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    /// Whether the service endpoint URL was overridden.
    pub fn endpoint_overridden(&self) -> bool {
        self.endpoint_overridden
    }
}

/// Resolve a client configuration for the provided [`CredentialSpec`].
#[instrument(skip_all, fields(mode = %spec.mode(), region = %spec.region))]
pub async fn resolve(spec: &CredentialSpec) -> Result<ResolvedClientConfig, CredentialError> {
    let region = Region::new(spec.region.clone());
    let mode = spec.mode();

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

    match mode {
        CredentialMode::Profile => {
            let provider = ProfileFileCredentialsProvider::builder()
                .profile_name(profile_name(spec))
                .build();
            verify(&provider, mode).await?;
            loader = loader.credentials_provider(provider);
        }
        CredentialMode::AssumeRole => {
            let session = base_loader(region.clone()).load().await;
            let provider = assume_role(spec, region.clone(), &session).await;
            verify(&provider, mode).await?;
            loader = loader.credentials_provider(provider);
        }
        CredentialMode::ProfileAssumeRole => {
            let session = base_loader(region.clone())
                .profile_name(profile_name(spec))
                .load()
                .await;
            let provider = assume_role(spec, region.clone(), &session).await;
            verify(&provider, mode).await?;
            loader = loader.credentials_provider(provider);
        }
        CredentialMode::Default => {}
    }

    let endpoint = spec.endpoint.as_deref().filter(|value| !value.is_empty());

    if let Some(endpoint) = endpoint {
        debug!(endpoint, "overriding service endpoint");
        loader = loader.endpoint_url(endpoint);
    }

    Ok(ResolvedClientConfig {
        sdk_config: loader.load().await,
        endpoint_overridden: endpoint.is_some(),
    })
}

/// Loader for the session that is used as the role assuming principal.
///
/// Endpoint override applies to the configured service only, never to STS.
fn base_loader(region: Region) -> ConfigLoader {
    aws_config::defaults(BehaviorVersion::latest()).region(region)
}

/// Create a role assuming credentials provider on top of the provided session.
async fn assume_role(
    spec: &CredentialSpec,
    region: Region,
    session: &SdkConfig,
) -> AssumeRoleProvider {
    AssumeRoleProvider::builder(spec.role_arn.clone().unwrap_or_default())
        .session_name(ROLE_SESSION_NAME)
        .region(region)
        .configure(session)
        .build()
        .await
}

fn profile_name(spec: &CredentialSpec) -> String {
    spec.profile.clone().unwrap_or_default()
}

/// Fetch credentials once, so that resolution failures are reported before any service call.
async fn verify<P: ProvideCredentials>(
    provider: &P,
    mode: CredentialMode,
) -> Result<(), CredentialError> {
    provider
        .provide_credentials()
        .await
        .map(|_| ())
        .map_err(|source| CredentialError::Provider { mode, source })
}
