//! `artifactory_remote_oci_repository`: a remote repository proxying an OCI
//! registry.
//!
//! Repositories are created with `PUT` and updated with `POST` on the same
//! path. The upstream password is never returned by the API.

use serde::{Deserialize, Serialize};

use crate::client::Method;
use crate::error::ProviderError;
use crate::resource::{Descriptor, EnginePolicy, Endpoints, Resource, UpdateMode};
use crate::schema::{Attribute, Schema, Validator};
use crate::value::Tristate;

/// Type name.
pub const TYPE_NAME: &str = "artifactory_remote_oci_repository";

const RCLASS: &str = "remote";
const PACKAGE_TYPE: &str = "oci";

const ENDPOINTS: Endpoints = Endpoints::new(
    "artifactory/api/repositories",
    "artifactory/api/repositories/{key}",
);

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOciState {
    /// Repository key.
    pub key: Tristate<String>,
    /// Upstream registry URL.
    pub url: Tristate<String>,
    /// Free-form description.
    pub description: Tristate<String>,
    /// Internal notes.
    pub notes: Tristate<String>,
    /// Upstream username.
    pub username: Tristate<String>,
    /// Upstream password. Never returned by the API.
    pub password: Tristate<String>,
    /// Network proxy key.
    pub proxy: Tristate<String>,
    /// Artifact patterns to include.
    pub includes_pattern: Tristate<String>,
    /// Artifact patterns to exclude.
    pub excludes_pattern: Tristate<String>,
    /// Repository layout.
    pub repo_layout_ref: Tristate<String>,
    /// Serve only cached artifacts.
    pub offline: Tristate<bool>,
    /// Fail instead of falling back on upstream errors.
    pub hard_fail: Tristate<bool>,
    /// Cache artifacts locally.
    pub store_artifacts_locally: Tristate<bool>,
    /// Reject all requests.
    pub blacked_out: Tristate<bool>,
    /// Metadata cache period.
    pub retrieval_cache_period_seconds: Tristate<i64>,
    /// Follow foreign layers.
    pub external_dependencies_enabled: Tristate<bool>,
    /// URL patterns allowed for foreign layers.
    pub external_dependencies_patterns: Tristate<Vec<String>>,
    /// Use token authentication upstream.
    pub enable_token_authentication: Tristate<bool>,
    /// Upstream project id.
    pub project_id: Tristate<String>,
}

/// Request and response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteOciBody {
    key: String,
    rclass: String,
    package_type: String,
    url: String,
    description: String,
    notes: String,
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    password: String,
    proxy: String,
    includes_pattern: String,
    excludes_pattern: String,
    repo_layout_ref: String,
    offline: bool,
    hard_fail: bool,
    store_artifacts_locally: bool,
    blacked_out: bool,
    #[serde(rename = "retrievalCachePeriodSecs")]
    retrieval_cache_period_seconds: i64,
    external_dependencies_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    external_dependencies_patterns: Vec<String>,
    enable_token_authentication: bool,
    #[serde(rename = "dockerProjectId")]
    project_id: String,
}

/// The remote OCI repository resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteOciRepository;

fn schema() -> Schema {
    Schema::v0()
        .with_description("Creates a remote OCI repository.")
        .with_attribute(
            "key",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_between(1, 64))
                .with_validator(Validator::matches(
                    r#"^[^\s/\\:*?"<>|]+$"#,
                    "Repository key cannot contain spaces or special characters",
                )),
        )
        .with_attribute(
            "url",
            Attribute::required_string()
                .with_validator(Validator::matches(r"^https?://.+", "must be a valid http(s) URL")),
        )
        .with_attribute("description", Attribute::optional_string())
        .with_attribute("notes", Attribute::optional_string())
        .with_attribute("username", Attribute::optional_string())
        .with_attribute("password", Attribute::optional_string().sensitive())
        .with_attribute("proxy", Attribute::optional_string())
        .with_attribute("includes_pattern", Attribute::defaulted_string("**/*"))
        .with_attribute("excludes_pattern", Attribute::defaulted_string(""))
        .with_attribute("repo_layout_ref", Attribute::defaulted_string("simple-default"))
        .with_attribute("offline", Attribute::defaulted_bool(false))
        .with_attribute("hard_fail", Attribute::defaulted_bool(false))
        .with_attribute("store_artifacts_locally", Attribute::defaulted_bool(true))
        .with_attribute("blacked_out", Attribute::defaulted_bool(false))
        .with_attribute(
            "retrieval_cache_period_seconds",
            Attribute::defaulted_int64(7200).with_validator(Validator::at_least(0)),
        )
        .with_attribute(
            "external_dependencies_enabled",
            Attribute::defaulted_bool(false)
                .with_description("Also known as 'Foreign Layers Caching' on the UI."),
        )
        .with_attribute(
            "external_dependencies_patterns",
            Attribute::optional_string_list()
                .with_validator(Validator::also_requires("external_dependencies_enabled"))
                .with_description(
                    "Include patterns to match external URLs. Must be set together with \
                     `external_dependencies_enabled = true`.",
                ),
        )
        .with_attribute("enable_token_authentication", Attribute::defaulted_bool(true))
        .with_attribute("project_id", Attribute::defaulted_string(""))
}

fn non_empty(value: String, prior: &Tristate<String>) -> Tristate<String> {
    if value.is_empty() && !prior.is_known() {
        Tristate::Null
    } else {
        Tristate::Known(value)
    }
}

impl Resource for RemoteOciRepository {
    type State = RemoteOciState;
    type Request = RemoteOciBody;
    type Response = RemoteOciBody;
    type Created = serde::de::IgnoredAny;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS).with_policy(
            EnginePolicy::default()
                .create_at_item(Method::Put)
                .with_update(UpdateMode::Remote(Method::Post)),
        )
    }

    fn key(&self, state: &RemoteOciState) -> Option<String> {
        state.key.as_known().cloned()
    }

    fn state_from_import_id(&self, id: &str) -> Result<RemoteOciState, ProviderError> {
        Ok(RemoteOciState {
            key: Tristate::Known(id.to_string()),
            ..Default::default()
        })
    }

    fn to_wire(&self, state: &RemoteOciState) -> Result<RemoteOciBody, ProviderError> {
        let external_dependencies_enabled = state.external_dependencies_enabled.value_or_default();
        Ok(RemoteOciBody {
            key: state.key.value_or_default(),
            rclass: RCLASS.to_string(),
            package_type: PACKAGE_TYPE.to_string(),
            url: state.url.value_or_default(),
            description: state.description.value_or_default(),
            notes: state.notes.value_or_default(),
            username: state.username.value_or_default(),
            password: state.password.value_or_default(),
            proxy: state.proxy.value_or_default(),
            includes_pattern: state.includes_pattern.value_or("**/*".to_string()),
            excludes_pattern: state.excludes_pattern.value_or_default(),
            repo_layout_ref: state.repo_layout_ref.value_or("simple-default".to_string()),
            offline: state.offline.value_or_default(),
            hard_fail: state.hard_fail.value_or_default(),
            store_artifacts_locally: state.store_artifacts_locally.value_or(true),
            blacked_out: state.blacked_out.value_or_default(),
            retrieval_cache_period_seconds: state.retrieval_cache_period_seconds.value_or(7200),
            external_dependencies_enabled,
            external_dependencies_patterns: if external_dependencies_enabled {
                state.external_dependencies_patterns.value_or_default()
            } else {
                Vec::new()
            },
            enable_token_authentication: state.enable_token_authentication.value_or(true),
            project_id: state.project_id.value_or_default(),
        })
    }

    fn from_wire(&self, prior: &RemoteOciState, wire: RemoteOciBody) -> RemoteOciState {
        let external_dependencies_patterns = if wire.external_dependencies_enabled {
            Tristate::Known(wire.external_dependencies_patterns)
        } else {
            prior.external_dependencies_patterns.clone().resolve()
        };

        RemoteOciState {
            key: Tristate::Known(wire.key),
            url: Tristate::Known(wire.url),
            description: non_empty(wire.description, &prior.description),
            notes: non_empty(wire.notes, &prior.notes),
            username: non_empty(wire.username, &prior.username),
            password: prior.password.clone().resolve(),
            proxy: non_empty(wire.proxy, &prior.proxy),
            includes_pattern: Tristate::Known(wire.includes_pattern),
            excludes_pattern: Tristate::Known(wire.excludes_pattern),
            repo_layout_ref: Tristate::Known(wire.repo_layout_ref),
            offline: Tristate::Known(wire.offline),
            hard_fail: Tristate::Known(wire.hard_fail),
            store_artifacts_locally: Tristate::Known(wire.store_artifacts_locally),
            blacked_out: Tristate::Known(wire.blacked_out),
            retrieval_cache_period_seconds: Tristate::Known(wire.retrieval_cache_period_seconds),
            external_dependencies_enabled: Tristate::Known(wire.external_dependencies_enabled),
            external_dependencies_patterns,
            enable_token_authentication: Tristate::Known(wire.enable_token_authentication),
            project_id: Tristate::Known(wire.project_id),
        }
    }
}
