//! Provider configuration.
//!
//! The host passes the provider block as JSON. Each setting falls back to an
//! environment variable when the block leaves it null:
//!
//! | attribute      | environment                                          |
//! |----------------|------------------------------------------------------|
//! | `url`          | `JFROG_URL`, `ARTIFACTORY_URL`                       |
//! | `access_token` | `JFROG_ACCESS_TOKEN`, `ARTIFACTORY_ACCESS_TOKEN`     |
//! | `api_key`      | `ARTIFACTORY_API_KEY` (deprecated)                   |

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema, Validator};
use crate::value::Tristate;

/// Raw provider block as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Platform base URL.
    pub url: Tristate<String>,
    /// Access token (Bearer).
    pub access_token: Tristate<String>,
    /// Legacy API key.
    pub api_key: Tristate<String>,
    /// Verify the platform license on configure.
    pub check_license: Tristate<bool>,
}

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`.
    AccessToken(String),
    /// `X-JFrog-Art-Api: <key>`.
    ApiKey(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(***)"),
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

/// Configuration after environment fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Platform base URL.
    pub url: String,
    /// Request credentials.
    pub credentials: Credentials,
    /// Verify the platform license on configure.
    pub check_license: bool,
}

impl ProviderConfig {
    /// Decode the provider block. A null block is an empty configuration.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Validate without touching the environment.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (name, unknown) in [
            ("url", self.url.is_unknown()),
            ("access_token", self.access_token.is_unknown()),
            ("api_key", self.api_key.is_unknown()),
        ] {
            if unknown {
                diagnostics.push(
                    Diagnostic::error(format!("Unknown provider configuration value for {}", name))
                        .with_detail("The provider cannot be configured with a value that is only known after apply.")
                        .with_attribute(name),
                );
            }
        }
        if self.api_key.is_known() {
            diagnostics.push(
                Diagnostic::warning("Attribute api_key is deprecated")
                    .with_detail("API keys are deprecated by the platform; use access_token instead.")
                    .with_attribute("api_key"),
            );
        }
        diagnostics
    }

    /// Apply environment fallbacks.
    ///
    /// Returns the resolved configuration when no error was found, together
    /// with all diagnostics (including warnings).
    pub fn resolve(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> (Option<ResolvedConfig>, Vec<Diagnostic>) {
        let mut diagnostics = self.validate();
        let lookup = |configured: &Tristate<String>, names: &[&str]| -> Option<String> {
            configured
                .as_known()
                .cloned()
                .or_else(|| names.iter().find_map(|&n| env(n)))
                .filter(|v| !v.trim().is_empty())
        };

        let url = lookup(&self.url, &["JFROG_URL", "ARTIFACTORY_URL"]);
        if url.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing URL Configuration")
                    .with_detail("The url was not found in the JFROG_URL/ARTIFACTORY_URL environment variables or the provider configuration block url attribute.")
                    .with_attribute("url"),
            );
        }

        let token = lookup(
            &self.access_token,
            &["JFROG_ACCESS_TOKEN", "ARTIFACTORY_ACCESS_TOKEN"],
        );
        let api_key = lookup(&self.api_key, &["ARTIFACTORY_API_KEY"]);
        let credentials = match (token, api_key) {
            (Some(token), _) => Some(Credentials::AccessToken(token)),
            (None, Some(key)) => Some(Credentials::ApiKey(key)),
            (None, None) => {
                diagnostics.push(
                    Diagnostic::error("Missing JFrog Access Token")
                        .with_detail("The access token was not found in the JFROG_ACCESS_TOKEN/ARTIFACTORY_ACCESS_TOKEN environment variables or the provider configuration block access_token attribute.")
                        .with_attribute("access_token"),
                );
                None
            }
        };

        if diagnostics.iter().any(Diagnostic::is_error) {
            return (None, diagnostics);
        }

        let resolved = url.zip(credentials).map(|(url, credentials)| ResolvedConfig {
            url,
            credentials,
            check_license: self.check_license.value_or(false),
        });
        (resolved, diagnostics)
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "url",
                Attribute::optional_string()
                    .with_description("Platform URL, e.g. https://myinstance.jfrog.io. Falls back to JFROG_URL or ARTIFACTORY_URL.")
                    .with_validator(Validator::matches(r"^https?://", "url must be a valid http or https URL")),
            )
            .with_attribute(
                "access_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Access token. Falls back to JFROG_ACCESS_TOKEN or ARTIFACTORY_ACCESS_TOKEN."),
            )
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Deprecated API key. Falls back to ARTIFACTORY_API_KEY."),
            )
            .with_attribute(
                "check_license",
                Attribute::optional_bool()
                    .with_description("Verify that the platform license supports this provider."),
            )
    }
}

/// Read a variable from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Options for the HTTP client and usage reporting.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout. Default: 60 seconds.
    pub request_timeout: Duration,
    /// Capacity of the usage-event queue; events are dropped when full.
    /// Default: 64.
    pub usage_queue_capacity: usize,
    /// Product identifier attached to usage events.
    pub product_id: String,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let product = format!("artifactory-provider/{}", env!("CARGO_PKG_VERSION"));
        Self {
            request_timeout: Duration::from_secs(60),
            usage_queue_capacity: 64,
            product_id: product.clone(),
            user_agent: product,
        }
    }
}

impl ClientOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the usage queue capacity.
    pub fn with_usage_queue_capacity(mut self, capacity: usize) -> Self {
        self.usage_queue_capacity = capacity;
        self
    }

    /// Set the product identifier.
    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_configured_values_win_over_env() {
        let config = ProviderConfig::from_value(&json!({
            "url": "https://configured.jfrog.io",
            "access_token": "configured-token",
        }))
        .unwrap();

        let (resolved, diagnostics) =
            config.resolve(env_of(&[("JFROG_URL", "https://env.jfrog.io")]));
        assert!(diagnostics.is_empty());
        let resolved = resolved.unwrap();
        assert_eq!(resolved.url, "https://configured.jfrog.io");
        assert_eq!(
            resolved.credentials,
            Credentials::AccessToken("configured-token".into())
        );
        assert!(!resolved.check_license);
    }

    #[test]
    fn test_env_fallbacks() {
        let config = ProviderConfig::from_value(&Value::Null).unwrap();
        let (resolved, _) = config.resolve(env_of(&[
            ("ARTIFACTORY_URL", "https://legacy.jfrog.io"),
            ("ARTIFACTORY_ACCESS_TOKEN", "legacy-token"),
        ]));
        let resolved = resolved.unwrap();
        assert_eq!(resolved.url, "https://legacy.jfrog.io");
        assert_eq!(resolved.credentials, Credentials::AccessToken("legacy-token".into()));
    }

    #[test]
    fn test_api_key_is_deprecated_but_accepted() {
        let config = ProviderConfig::from_value(&json!({
            "url": "https://x.jfrog.io",
            "api_key": "key",
        }))
        .unwrap();
        let (resolved, diagnostics) = config.resolve(env_of(&[]));
        assert_eq!(resolved.unwrap().credentials, Credentials::ApiKey("key".into()));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_warning());
    }

    #[test]
    fn test_missing_everything_reports_both_errors() {
        let config = ProviderConfig::default();
        let (resolved, diagnostics) = config.resolve(env_of(&[]));
        assert!(resolved.is_none());
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Missing URL Configuration", "Missing JFrog Access Token"]
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::AccessToken("secret".into());
        assert_eq!(format!("{:?}", creds), "AccessToken(***)");
    }

    #[test]
    fn test_client_options_builder() {
        let options = ClientOptions::new()
            .with_request_timeout(Duration::from_secs(5))
            .with_usage_queue_capacity(4)
            .with_product_id("test/1.0");
        assert_eq!(options.request_timeout, Duration::from_secs(5));
        assert_eq!(options.usage_queue_capacity, 4);
        assert_eq!(options.product_id, "test/1.0");
    }
}
