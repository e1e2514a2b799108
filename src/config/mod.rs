use serde::{Deserialize, Serialize};

/// Region used when neither the environment nor the caller names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS settings as found in the process environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsEnv {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_default_region: Option<String>,
    pub aws_profile: Option<String>,
    /// Endpoint override, e.g. a local emulator.
    pub aws_endpoint_url: Option<String>,
}

impl AwsEnv {
    /// Read the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

/// AWS settings supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Resolved AWS settings shared by every client.
///
/// Each value comes from the environment when set there, otherwise from
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Arguments for building an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionArgs {
    #[serde(rename = "aws_access_key_id", skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(rename = "aws_secret_access_key", skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    pub region_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

/// Per-client arguments. Empty unless an endpoint override is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    pub fn new(settings: AwsSettings) -> Result<Self, ConfigError> {
        let env = AwsEnv::from_env()?;
        Ok(Self::resolve(settings, env))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(AwsSettings::default())
    }

    /// Merge caller settings with environment values. The environment wins.
    pub fn resolve(settings: AwsSettings, env: AwsEnv) -> Self {
        fn pick(env: Option<String>, arg: Option<String>) -> Option<String> {
            env.filter(|v| !v.is_empty())
                .or(arg.filter(|v| !v.is_empty()))
        }

        let config = Self {
            access_key: pick(env.aws_access_key_id, settings.access_key),
            secret_key: pick(env.aws_secret_access_key, settings.secret_key),
            region: pick(env.aws_default_region, settings.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            profile: pick(env.aws_profile, settings.profile),
            endpoint_url: pick(env.aws_endpoint_url, settings.endpoint_url),
        };

        if !config.has_static_keys() && config.profile.is_none() {
            tracing::warn!(
                "No AWS access keys or profile configured, falling back to the default credential chain"
            );
        }

        config
    }

    pub fn has_static_keys(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }

    pub fn session_args(&self) -> SessionArgs {
        SessionArgs {
            access_key_id: self.access_key.clone(),
            secret_access_key: self.secret_key.clone(),
            region_name: self.region.clone(),
            profile_name: self.profile.clone(),
        }
    }

    pub fn client_args(&self) -> ClientArgs {
        ClientArgs {
            endpoint_url: self.endpoint_url.clone(),
        }
    }

    /// Shared AWS SDK configuration for the DynamoDB and Textract clients.
    pub async fn sdk_config(&self) -> aws_config::SdkConfig {
        let session = self.session_args();
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(session.region_name));

        if let Some(profile) = session.profile_name {
            loader = loader.profile_name(profile);
        }
        if let (Some(access_key), Some(secret_key)) =
            (session.access_key_id, session.secret_access_key)
        {
            loader = loader.credentials_provider(aws_sdk_dynamodb::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "auris-config",
            ));
        }
        if let Some(endpoint) = self.client_args().endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        loader.load().await
    }

    /// Region for the S3 client, pointing at the endpoint override if any.
    pub fn s3_region(&self) -> Result<s3::Region, ConfigError> {
        match &self.endpoint_url {
            Some(endpoint) => Ok(s3::Region::Custom {
                region: self.region.clone(),
                endpoint: endpoint.clone(),
            }),
            None => self
                .region
                .parse()
                .map_err(|_| ConfigError::Region(self.region.clone())),
        }
    }

    pub fn s3_credentials(&self) -> Result<s3::creds::Credentials, ConfigError> {
        let credentials = s3::creds::Credentials::new(
            self.access_key.as_deref(),
            self.secret_key.as_deref(),
            None,
            None,
            self.profile.as_deref(),
        )?;
        Ok(credentials)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid region: {0:?}")]
    Region(String),

    #[error("Invalid S3 credentials: {0}")]
    Credentials(#[from] s3::creds::error::CredentialsError),
}
