//! Provider configuration and credential resolution.
//!
//! Values come from the provider block first and the environment second.
//! Credentials are resolved as a set: the provider block's credentials win as
//! a whole if any are present, otherwise the environment's are used. When an
//! AWS role is configured, credentials are fetched from AWS Secrets Manager
//! through a [`SecretsSource`] instead.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::plan::strip_unknowns;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema,
};
use crate::validators::Validator;

/// Base URL of the commercial cloud.
pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com";

/// Base URL of the government cloud.
pub const GOV_BASE_URL: &str = "https://cloud.mongodbgov.com";

const ASSUME_ROLE_MIN: Duration = Duration::from_secs(15 * 60);
const ASSUME_ROLE_MAX: Duration = Duration::from_secs(12 * 60 * 60);

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Programmatic API public key.
    pub public_key: Option<String>,
    /// Programmatic API private key.
    pub private_key: Option<String>,
    /// Service account client id.
    pub client_id: Option<String>,
    /// Service account client secret.
    pub client_secret: Option<String>,
    /// Bearer token used as is.
    pub access_token: Option<String>,
    /// Management API base URL.
    pub base_url: Option<String>,
    /// App Services base URL.
    pub realm_base_url: Option<String>,
    /// Target the government cloud.
    pub is_mongodbgov_cloud: Option<bool>,
    /// Fetch credentials from AWS Secrets Manager through this role.
    pub assume_role: Option<AssumeRoleConfig>,
    /// Name of the secret holding the credentials.
    pub secret_name: Option<String>,
    /// AWS region of the secret.
    pub region: Option<String>,
    /// STS endpoint override.
    pub sts_endpoint: Option<String>,
    /// AWS access key id.
    pub aws_access_key_id: Option<String>,
    /// AWS secret access key.
    pub aws_secret_access_key: Option<String>,
    /// AWS session token.
    pub aws_session_token: Option<String>,
}

/// The `assume_role` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssumeRoleConfig {
    /// Role to assume.
    pub role_arn: Option<String>,
    /// Session duration, between 15m and 12h.
    pub duration: Option<String>,
    /// External id required by the role trust policy.
    pub external_id: Option<String>,
    /// Inline session policy, JSON.
    pub policy: Option<String>,
    /// Managed session policies.
    pub policy_arns: Option<Vec<String>>,
    /// Session name.
    pub session_name: Option<String>,
    /// Source identity passed to STS.
    pub source_identity: Option<String>,
    /// Session tags.
    pub tags: Option<HashMap<String, String>>,
    /// Tags carried to chained roles.
    pub transitive_tag_keys: Option<Vec<String>>,
}

impl ProviderConfig {
    /// Parse the provider block. Unknown values are treated as unset.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        let value = strip_unknowns(value);
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    let length = |min, max| Validator::LengthBetween { min, max };

    Schema::v0()
        .with_attribute(
            "public_key",
            Attribute::optional_string().with_description("MongoDB Atlas Programmatic Public Key"),
        )
        .with_attribute(
            "private_key",
            Attribute::optional_string()
                .sensitive()
                .with_description("MongoDB Atlas Programmatic Private Key"),
        )
        .with_attribute(
            "client_id",
            Attribute::optional_string().with_description("MongoDB Atlas Service Account Client ID"),
        )
        .with_attribute(
            "client_secret",
            Attribute::optional_string()
                .sensitive()
                .with_description("MongoDB Atlas Service Account Client Secret"),
        )
        .with_attribute(
            "access_token",
            Attribute::optional_string()
                .sensitive()
                .with_description("MongoDB Atlas Access Token for Service Account"),
        )
        .with_attribute(
            "base_url",
            Attribute::optional_string().with_description("MongoDB Atlas Base URL"),
        )
        .with_attribute(
            "realm_base_url",
            Attribute::optional_string().with_description("MongoDB Realm Base URL"),
        )
        .with_attribute(
            "is_mongodbgov_cloud",
            Attribute::optional_bool().with_description("Use the MongoDB Atlas for Government base URL"),
        )
        .with_attribute("secret_name", Attribute::optional_string())
        .with_attribute("region", Attribute::optional_string())
        .with_attribute("sts_endpoint", Attribute::optional_string())
        .with_attribute("aws_access_key_id", Attribute::optional_string().sensitive())
        .with_attribute("aws_secret_access_key", Attribute::optional_string().sensitive())
        .with_attribute("aws_session_token", Attribute::optional_string().sensitive())
        .with_block(
            "assume_role",
            NestedBlock::single(
                Block::new()
                    .with_attribute("role_arn", Attribute::optional_string())
                    .with_attribute(
                        "duration",
                        Attribute::optional_string().with_validator(Validator::DurationBetween {
                            min: ASSUME_ROLE_MIN,
                            max: ASSUME_ROLE_MAX,
                        }),
                    )
                    .with_attribute(
                        "external_id",
                        Attribute::optional_string().with_validator(length(2, 1224)),
                    )
                    .with_attribute(
                        "policy",
                        Attribute::optional_string().with_validator(Validator::Json),
                    )
                    .with_attribute("policy_arns", Attribute::optional_string_list())
                    .with_attribute(
                        "session_name",
                        Attribute::optional_string().with_validator(length(2, 64)),
                    )
                    .with_attribute(
                        "source_identity",
                        Attribute::optional_string().with_validator(length(2, 64)),
                    )
                    .with_attribute(
                        "tags",
                        Attribute::new(
                            AttributeType::map(AttributeType::String),
                            AttributeFlags::optional(),
                        ),
                    )
                    .with_attribute("transitive_tag_keys", Attribute::optional_string_list())
                    .with_description("Credentials from AWS Secrets Manager through an assumed role"),
            ),
        )
}

/// Settings for fetching credentials from AWS Secrets Manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsVars {
    /// Role to assume; empty when unset.
    pub assume_role_arn: String,
    /// Name of the secret holding the credentials.
    pub secret_name: String,
    /// AWS region of the secret.
    pub region: String,
    /// AWS access key id.
    pub access_key_id: String,
    /// AWS secret access key.
    pub secret_access_key: String,
    /// AWS session token.
    pub session_token: String,
    /// STS endpoint override.
    pub endpoint: String,
}

impl AwsVars {
    /// An assumed role is what makes AWS settings count.
    pub fn is_present(&self) -> bool {
        !self.assume_role_arn.is_empty()
    }
}

/// Configuration values from a single source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    /// Bearer token used as is.
    pub access_token: String,
    /// Service account client id.
    pub client_id: String,
    /// Service account client secret.
    pub client_secret: String,
    /// Programmatic API public key.
    pub public_key: String,
    /// Programmatic API private key.
    pub private_key: String,
    /// Management API base URL.
    pub base_url: String,
    /// App Services base URL.
    pub realm_base_url: String,
    /// AWS Secrets Manager settings.
    pub aws: AwsVars,
}

fn first_of(lookup: &dyn Fn(&str) -> Option<String>, names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| lookup(name))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

impl Vars {
    /// Values set in the provider block.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let s = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            access_token: s(&config.access_token),
            client_id: s(&config.client_id),
            client_secret: s(&config.client_secret),
            public_key: s(&config.public_key),
            private_key: s(&config.private_key),
            base_url: s(&config.base_url),
            realm_base_url: s(&config.realm_base_url),
            aws: AwsVars {
                assume_role_arn: config
                    .assume_role
                    .as_ref()
                    .and_then(|r| r.role_arn.clone())
                    .unwrap_or_default(),
                secret_name: s(&config.secret_name),
                region: s(&config.region),
                access_key_id: s(&config.aws_access_key_id),
                secret_access_key: s(&config.aws_secret_access_key),
                session_token: s(&config.aws_session_token),
                endpoint: s(&config.sts_endpoint),
            },
        }
    }

    /// Values from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Values from an environment-like lookup; the first non-empty variable wins.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |names: &[&str]| first_of(&lookup, names);
        Self {
            access_token: get(&["MONGODB_ATLAS_ACCESS_TOKEN"]),
            client_id: get(&["MONGODB_ATLAS_CLIENT_ID"]),
            client_secret: get(&["MONGODB_ATLAS_CLIENT_SECRET"]),
            public_key: get(&[
                "MONGODB_ATLAS_PUBLIC_API_KEY",
                "MONGODB_ATLAS_PUBLIC_KEY",
                "MCLI_PUBLIC_API_KEY",
            ]),
            private_key: get(&[
                "MONGODB_ATLAS_PRIVATE_API_KEY",
                "MONGODB_ATLAS_PRIVATE_KEY",
                "MCLI_PRIVATE_API_KEY",
            ]),
            base_url: get(&["MONGODB_ATLAS_BASE_URL", "MCLI_OPS_MANAGER_URL"]),
            realm_base_url: get(&["MONGODB_REALM_BASE_URL"]),
            aws: AwsVars {
                assume_role_arn: get(&["ASSUME_ROLE_ARN", "TF_VAR_ASSUME_ROLE_ARN"]),
                secret_name: get(&["SECRET_NAME", "TF_VAR_SECRET_NAME"]),
                region: get(&["AWS_REGION", "TF_VAR_AWS_REGION"]),
                access_key_id: get(&["AWS_ACCESS_KEY_ID", "TF_VAR_AWS_ACCESS_KEY_ID"]),
                secret_access_key: get(&["AWS_SECRET_ACCESS_KEY", "TF_VAR_AWS_SECRET_ACCESS_KEY"]),
                session_token: get(&["AWS_SESSION_TOKEN", "TF_VAR_AWS_SESSION_TOKEN"]),
                endpoint: get(&["STS_ENDPOINT", "TF_VAR_STS_ENDPOINT"]),
            },
        }
    }

    /// The credential fields of this source.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: self.access_token.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            public_key: self.public_key.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

/// How requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// A bearer token supplied directly.
    AccessToken,
    /// OAuth2 client credentials exchanged for a bearer token.
    ServiceAccount,
    /// Programmatic API key pair, HTTP Digest.
    Digest,
    /// Nothing usable.
    Unknown,
}

/// The credentials in effect.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token used as is.
    pub access_token: String,
    /// Service account client id.
    pub client_id: String,
    /// Service account client secret.
    pub client_secret: String,
    /// Programmatic API public key.
    pub public_key: String,
    /// Programmatic API private key.
    pub private_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("public_key", &self.public_key)
            .field("private_key", &redact(&self.private_key))
            .finish()
    }
}

impl Credentials {
    /// Method chosen by priority: access token, service account, API key.
    pub fn auth_method(&self) -> AuthMethod {
        if self.has_access_token() {
            AuthMethod::AccessToken
        } else if self.has_service_account() {
            AuthMethod::ServiceAccount
        } else if self.has_digest() {
            AuthMethod::Digest
        } else {
            AuthMethod::Unknown
        }
    }

    /// An access token is set.
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Either half of a service account is set.
    pub fn has_service_account(&self) -> bool {
        !self.client_id.is_empty() || !self.client_secret.is_empty()
    }

    /// Either half of an API key is set.
    pub fn has_digest(&self) -> bool {
        !self.public_key.is_empty() || !self.private_key.is_empty()
    }

    /// Anything at all is set.
    pub fn is_present(&self) -> bool {
        self.auth_method() != AuthMethod::Unknown
    }

    /// A note about credentials that are set but will not be used.
    pub fn warnings(&self) -> Option<String> {
        if !self.is_present() {
            return Some("No credentials set".to_string());
        }
        let msg = match (
            self.has_access_token(),
            self.has_service_account(),
            self.has_digest(),
        ) {
            (true, true, true) => {
                "Access Token will be used although Service Account and API Keys are also set"
            }
            (true, true, false) => "Access Token will be used although Service Account is also set",
            (true, false, true) => "Access Token will be used although API Key is also set",
            (false, true, true) => "Service Account will be used although API Key is also set",
            _ => return None,
        };
        Some(msg.to_string())
    }

    /// A problem with the selected method that makes it unusable.
    pub fn errors(&self) -> Option<String> {
        let msg = match self.auth_method() {
            AuthMethod::ServiceAccount if self.client_id.is_empty() => {
                "Service Account is being used but Client ID is required"
            }
            AuthMethod::ServiceAccount if self.client_secret.is_empty() => {
                "Service Account is being used but Client Secret is required"
            }
            AuthMethod::Digest if self.public_key.is_empty() => {
                "API Key is being used but Public Key is required"
            }
            AuthMethod::Digest if self.private_key.is_empty() => {
                "API Key is being used but Private Key is required"
            }
            _ => return None,
        };
        Some(msg.to_string())
    }

    /// Warnings and errors as diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(warning) = self.warnings() {
            diagnostics.push(Diagnostic::warning("Credentials").with_detail(warning));
        }
        if let Some(error) = self.errors() {
            diagnostics.push(Diagnostic::error("Invalid credentials").with_detail(error));
        }
        diagnostics
    }
}

/// Where credentials come from when an AWS role is configured.
#[async_trait::async_trait]
pub trait SecretsSource: Send + Sync {
    /// Fetch the credentials stored in the secret named by `aws`.
    async fn credentials(&self, aws: &AwsVars) -> Result<Credentials, ProviderError>;
}

/// The default [`SecretsSource`], for builds without AWS support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAwsSecrets;

#[async_trait::async_trait]
impl SecretsSource for NoAwsSecrets {
    async fn credentials(&self, aws: &AwsVars) -> Result<Credentials, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "assume_role {} is configured, but this provider build cannot read AWS Secrets Manager",
            aws.assume_role_arn
        )))
    }
}

/// The first AWS settings with a role set.
pub fn coalesce_aws_vars<'a>(candidates: &[&'a AwsVars]) -> Option<&'a AwsVars> {
    candidates.iter().copied().find(|v| v.is_present())
}

/// The first credentials with anything set.
pub fn coalesce_credentials(candidates: Vec<Credentials>) -> Option<Credentials> {
    candidates.into_iter().find(Credentials::is_present)
}

/// Resolve credentials: AWS first, then provider block, then environment.
pub async fn get_credentials(
    provider: &Vars,
    env: &Vars,
    secrets: &dyn SecretsSource,
) -> Result<Credentials, ProviderError> {
    if let Some(aws) = coalesce_aws_vars(&[&provider.aws, &env.aws]) {
        return secrets.credentials(aws).await;
    }
    Ok(coalesce_credentials(vec![provider.credentials(), env.credentials()]).unwrap_or_default())
}

/// Base URL: provider block, then environment, then the cloud default.
pub fn resolve_base_url(provider: &Vars, env: &Vars, is_gov: bool) -> String {
    [&provider.base_url, &env.base_url]
        .into_iter()
        .find(|u| !u.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            if is_gov {
                GOV_BASE_URL.to_string()
            } else {
                DEFAULT_BASE_URL.to_string()
            }
        })
}

/// Everything needed to build an API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Credentials in effect.
    pub credentials: Credentials,
    /// Management API base URL.
    pub base_url: String,
    /// App Services base URL.
    pub realm_base_url: Option<String>,
}

/// Resolve the provider block against the environment.
///
/// Returns the settings together with credential warnings and errors. The
/// caller must not build a client when an error diagnostic is returned.
pub async fn resolve(
    config: &ProviderConfig,
    env: &Vars,
    secrets: &dyn SecretsSource,
) -> Result<(ResolvedConfig, Vec<Diagnostic>), ProviderError> {
    let provider = Vars::from_config(config);
    let credentials = get_credentials(&provider, env, secrets).await?;
    let diagnostics = credentials.diagnostics();

    let realm = [&provider.realm_base_url, &env.realm_base_url]
        .into_iter()
        .find(|u| !u.is_empty())
        .cloned();

    Ok((
        ResolvedConfig {
            credentials,
            base_url: resolve_base_url(&provider, env, config.is_mongodbgov_cloud.unwrap_or(false)),
            realm_base_url: realm,
        },
        diagnostics,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;
    use serde_json::json;

    fn creds(token: &str, id: &str, secret: &str, public: &str, private: &str) -> Credentials {
        Credentials {
            access_token: token.into(),
            client_id: id.into(),
            client_secret: secret.into(),
            public_key: public.into(),
            private_key: private.into(),
        }
    }

    #[test]
    fn test_auth_method_priority() {
        let cases = [
            (creds("", "", "", "", ""), AuthMethod::Unknown),
            (creds("t", "i", "s", "p", "k"), AuthMethod::AccessToken),
            (creds("", "i", "s", "p", "k"), AuthMethod::ServiceAccount),
            (creds("", "i", "", "", ""), AuthMethod::ServiceAccount),
            (creds("", "", "s", "", ""), AuthMethod::ServiceAccount),
            (creds("", "", "", "p", "k"), AuthMethod::Digest),
            (creds("", "", "", "p", ""), AuthMethod::Digest),
            (creds("", "", "", "", "k"), AuthMethod::Digest),
        ];
        for (credentials, want) in cases {
            assert_eq!(credentials.auth_method(), want, "{:?}", credentials);
        }
    }

    #[test]
    fn test_warnings() {
        let cases = [
            (creds("", "", "", "", ""), Some("No credentials set")),
            (creds("t", "", "", "", ""), None),
            (creds("", "i", "", "", ""), None),
            (creds("", "", "", "p", ""), None),
            (
                creds("t", "i", "s", "", ""),
                Some("Access Token will be used although Service Account is also set"),
            ),
            (
                creds("t", "", "", "p", "k"),
                Some("Access Token will be used although API Key is also set"),
            ),
            (
                creds("", "i", "", "p", "k"),
                Some("Service Account will be used although API Key is also set"),
            ),
            (
                creds("t", "i", "s", "p", "k"),
                Some("Access Token will be used although Service Account and API Keys are also set"),
            ),
        ];
        for (credentials, want) in cases {
            assert_eq!(credentials.warnings().as_deref(), want, "{:?}", credentials);
        }
    }

    #[test]
    fn test_errors() {
        let cases = [
            (creds("", "", "", "", ""), None),
            (creds("t", "", "", "", ""), None),
            (
                creds("", "", "s", "", ""),
                Some("Service Account is being used but Client ID is required"),
            ),
            (
                creds("", "i", "", "", ""),
                Some("Service Account is being used but Client Secret is required"),
            ),
            (creds("", "i", "s", "", ""), None),
            (
                creds("", "", "", "", "k"),
                Some("API Key is being used but Public Key is required"),
            ),
            (
                creds("", "", "", "p", ""),
                Some("API Key is being used but Private Key is required"),
            ),
            (creds("", "", "", "p", "k"), None),
            (creds("t", "i", "", "", ""), None),
            (creds("t", "", "", "p", ""), None),
            (creds("", "i", "s", "p", ""), None),
            (
                creds("", "i", "", "p", "k"),
                Some("Service Account is being used but Client Secret is required"),
            ),
            (creds("t", "i", "s", "p", "k"), None),
        ];
        for (credentials, want) in cases {
            assert_eq!(credentials.errors().as_deref(), want, "{:?}", credentials);
        }
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let out = format!(
            "{:?}",
            creds("tok-SECRET-1", "id-1", "sec-SECRET-2", "pub-1", "priv-SECRET-3")
        );
        assert!(!out.contains("SECRET"));
        assert!(out.contains("\"***\""));
        assert!(out.contains("pub-1"));
        assert!(out.contains("id-1"));
    }

    #[test]
    fn test_env_lookup_order() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MONGODB_ATLAS_PUBLIC_KEY", "second"),
            ("MCLI_PUBLIC_API_KEY", "third"),
            ("MONGODB_ATLAS_PRIVATE_API_KEY", ""),
            ("MCLI_PRIVATE_API_KEY", "mcli-private"),
            ("MCLI_OPS_MANAGER_URL", "https://ops.example.com"),
            ("TF_VAR_AWS_REGION", "eu-west-1"),
            ("ASSUME_ROLE_ARN", "arn:aws:iam::1:role/r"),
        ]);
        let vars = Vars::from_lookup(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(vars.public_key, "second");
        assert_eq!(vars.private_key, "mcli-private");
        assert_eq!(vars.base_url, "https://ops.example.com");
        assert_eq!(vars.aws.region, "eu-west-1");
        assert!(vars.aws.is_present());
        assert_eq!(vars.access_token, "");
    }

    struct FixedSecrets;

    #[async_trait::async_trait]
    impl SecretsSource for FixedSecrets {
        async fn credentials(&self, aws: &AwsVars) -> Result<Credentials, ProviderError> {
            if aws.assume_role_arn == "error" {
                return Err(ProviderError::Configuration("AWS error".into()));
            }
            Ok(creds("aws-token", "", "", "", ""))
        }
    }

    fn with_public(key: &str) -> Vars {
        Vars {
            public_key: key.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_credentials() {
        let mut provider = with_public("provider-public");
        provider.aws.assume_role_arn = "arn".into();
        let got = get_credentials(&provider, &with_public("env-public"), &FixedSecrets)
            .await
            .unwrap();
        assert_eq!(got.access_token, "aws-token");

        let mut provider = Vars::default();
        provider.aws.assume_role_arn = "error".into();
        assert!(get_credentials(&provider, &Vars::default(), &FixedSecrets)
            .await
            .is_err());

        let got = get_credentials(&with_public("provider-public"), &with_public("env-public"), &FixedSecrets)
            .await
            .unwrap();
        assert_eq!(got.public_key, "provider-public");

        let got = get_credentials(&Vars::default(), &with_public("env-public"), &FixedSecrets)
            .await
            .unwrap();
        assert_eq!(got.public_key, "env-public");

        let got = get_credentials(&Vars::default(), &Vars::default(), &FixedSecrets)
            .await
            .unwrap();
        assert_eq!(got, Credentials::default());
    }

    #[tokio::test]
    async fn test_provider_credentials_win_as_a_set() {
        let provider = with_public("provider-public");
        let env = Vars {
            private_key: "env-private".into(),
            ..Default::default()
        };
        let got = get_credentials(&provider, &env, &NoAwsSecrets).await.unwrap();
        assert_eq!(got.public_key, "provider-public");
        assert_eq!(got.private_key, "");
        assert_eq!(
            got.errors().as_deref(),
            Some("API Key is being used but Private Key is required")
        );
    }

    #[tokio::test]
    async fn test_no_aws_secrets_is_unimplemented() {
        let aws = AwsVars {
            assume_role_arn: "arn:aws:iam::1:role/r".into(),
            ..Default::default()
        };
        let err = NoAwsSecrets.credentials(&aws).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
    }

    #[test]
    fn test_coalesce() {
        let a = AwsVars {
            assume_role_arn: "arn1".into(),
            ..Default::default()
        };
        let empty = AwsVars::default();
        assert_eq!(coalesce_aws_vars(&[&empty, &a]), Some(&a));
        assert_eq!(coalesce_aws_vars(&[&empty, &empty]), None);
        assert_eq!(coalesce_aws_vars(&[]), None);

        let c = creds("", "", "", "key2", "");
        assert_eq!(
            coalesce_credentials(vec![Credentials::default(), c.clone()]),
            Some(c)
        );
        assert_eq!(coalesce_credentials(vec![]), None);
    }

    #[test]
    fn test_base_url_resolution() {
        let empty = Vars::default();
        assert_eq!(resolve_base_url(&empty, &empty, false), DEFAULT_BASE_URL);
        assert_eq!(resolve_base_url(&empty, &empty, true), GOV_BASE_URL);

        let env = Vars {
            base_url: "https://env.example.com".into(),
            ..Default::default()
        };
        assert_eq!(resolve_base_url(&empty, &env, true), "https://env.example.com");

        let provider = Vars {
            base_url: "https://provider.example.com".into(),
            ..Default::default()
        };
        assert_eq!(resolve_base_url(&provider, &env, false), "https://provider.example.com");
    }

    #[tokio::test]
    async fn test_resolve_reports_credential_diagnostics() {
        let config = ProviderConfig::from_value(json!({
            "client_id": "id",
            "public_key": "p",
            "private_key": "k",
            "is_mongodbgov_cloud": true,
        }))
        .unwrap();

        let (resolved, diagnostics) = resolve(&config, &Vars::default(), &NoAwsSecrets)
            .await
            .unwrap();
        assert_eq!(resolved.base_url, GOV_BASE_URL);
        assert_eq!(resolved.credentials.auth_method(), AuthMethod::ServiceAccount);
        assert_eq!(diagnostics.len(), 2);
        assert!(!diagnostics[0].is_error());
        assert!(diagnostics[1].is_error());
    }

    #[test]
    fn test_provider_config_parsing() {
        let config = ProviderConfig::from_value(json!({
            "public_key": crate::plan::UNKNOWN,
            "assume_role": {"role_arn": "arn:aws:iam::1:role/r", "duration": "1h"},
        }))
        .unwrap();
        assert_eq!(config.public_key, None);
        let vars = Vars::from_config(&config);
        assert_eq!(vars.aws.assume_role_arn, "arn:aws:iam::1:role/r");

        assert_eq!(ProviderConfig::from_value(Value::Null).unwrap(), ProviderConfig::default());
    }

    #[test]
    fn test_provider_schema_validators() {
        let schema = provider_schema();
        assert!(schema.block.attributes["private_key"].flags.sensitive);

        let ok = json!({"assume_role": {"duration": "15m", "policy": "{}", "session_name": "tf"}});
        assert!(validate(&schema, &ok).is_empty());

        let bad = json!({"assume_role": {"duration": "10m", "policy": "{", "session_name": "t", "external_id": "x"}});
        let diagnostics = validate(&schema, &bad);
        let mut attrs: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        attrs.sort();
        assert_eq!(
            attrs,
            vec![
                "assume_role.duration",
                "assume_role.external_id",
                "assume_role.policy",
                "assume_role.session_name",
            ]
        );
    }
}
