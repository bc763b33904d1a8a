//! `artifactory_scoped_token`: access tokens minted by JFrog Access.
//!
//! Tokens are immutable once issued. Every configurable attribute forces a
//! new token except `ignore_missing_token_warning`, which only lives in
//! state. Token secrets appear exactly once, in the create response.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::resource::{Descriptor, EnginePolicy, Endpoints, Resource, UpdateMode};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema, Validator};
use crate::scopes::{join_scopes, split_scopes};
use crate::upgrade::{set_default_if_absent, Upgrader};
use crate::value::{reorder_like, Tristate};

/// Type name.
pub const TYPE_NAME: &str = "artifactory_scoped_token";

const ENDPOINTS: Endpoints = Endpoints::new("access/api/v1/tokens", "access/api/v1/tokens/{id}");

const MAX_SCOPES_LENGTH: usize = 500;
const MAX_AUDIENCES_LENGTH: usize = 255;

const SERVICE_TYPES: &[&str] = &[
    "jfrt", "jfxr", "jfpip", "jfds", "jfmc", "jfac", "jfevt", "jfmd", "jfcon",
];

const FIXED_SCOPES: &[&str] = &["applied-permissions/user", "applied-permissions/admin"];

/// Scope patterns with the message shown when none matches.
const SCOPE_PATTERNS: &[(&str, &str)] = &[
    (
        r"^applied-permissions/groups:.+$",
        "must be 'applied-permissions/groups:<group-name>[,<group-name>...]'",
    ),
    (
        r"^applied-permissions/roles:.+:.+$",
        "must be 'applied-permissions/roles:<project-key>:<role-name>[,<role-name>...]'",
    ),
    (
        r"^artifact:(?:.+):(?:(?:[rwdamxs*]+)|(?:[rwdamxs]+)(?:,[rwdamxs]+)+)$",
        "must be '<resource-type>:<target>[/<sub-resource>]:<actions>'",
    ),
    (
        r"^system:(?:metrics|livelogs|identities|permissions):(?:(?:[rwdamxs*]+)|(?:[rwdamxs]+)(?:,[rwdamxs]+)+)$",
        "must be 'system:(metrics|livelogs|identities|permissions):<actions>'",
    ),
];

static SCOPE_REGEXES: LazyLock<Vec<(Result<Regex, regex::Error>, &str)>> = LazyLock::new(|| {
    SCOPE_PATTERNS
        .iter()
        .map(|(pattern, message)| (Regex::new(pattern), *message))
        .collect()
});

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopedTokenState {
    /// Token id assigned by Access.
    pub id: Tristate<String>,
    /// Grant type of the request.
    pub grant_type: Tristate<String>,
    /// Subject user.
    pub username: Tristate<String>,
    /// Project the token belongs to.
    pub project_key: Tristate<String>,
    /// Permission scopes.
    pub scopes: Tristate<Vec<String>>,
    /// Lifetime in seconds.
    pub expires_in: Tristate<i64>,
    /// Whether a refresh token is issued.
    pub refreshable: Tristate<bool>,
    /// Whether a reference token is issued.
    pub include_reference_token: Tristate<bool>,
    /// Free-form description.
    pub description: Tristate<String>,
    /// Services that accept the token.
    pub audiences: Tristate<Vec<String>>,
    /// Access token. Only known after create.
    pub access_token: Tristate<String>,
    /// Refresh token. Only known after create.
    pub refresh_token: Tristate<String>,
    /// Reference token. Only known after create.
    pub reference_token: Tristate<String>,
    /// Token type, usually `Bearer`.
    pub token_type: Tristate<String>,
    /// Token subject.
    pub subject: Tristate<String>,
    /// Expiry as a Unix timestamp.
    pub expiry: Tristate<i64>,
    /// Issue time as a Unix timestamp.
    pub issued_at: Tristate<i64>,
    /// Issuing service id.
    pub issuer: Tristate<String>,
    /// Suppress the warning when the token cannot be read back.
    pub ignore_missing_token_warning: Tristate<bool>,
}

/// `POST access/api/v1/tokens` body.
#[derive(Debug, Serialize)]
pub struct TokenRequest {
    grant_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    project_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    scope: String,
    expires_in: i64,
    refreshable: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    audience: String,
    include_reference_token: bool,
}

/// Create response; the only place the token secrets appear.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenCreated {
    token_id: String,
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    scope: String,
    token_type: String,
    reference_token: String,
}

/// `GET access/api/v1/tokens/{id}` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenInfo {
    token_id: String,
    subject: String,
    expiry: i64,
    issued_at: i64,
    issuer: String,
    description: String,
    refreshable: bool,
}

/// The scoped token resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopedToken;

fn schema() -> Schema {
    let audience_pattern = format!(r"^({}|\*)@.+", SERVICE_TYPES.join("|"));

    Schema::new(1)
        .with_description(
            "Create scoped tokens for any of the services in your JFrog Platform and manage user access to these \
             services. Tokens cannot be updated in place.",
        )
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "grant_type",
            Attribute::defaulted_string("client_credentials")
                .with_force_new()
                .with_description("The grant type used to authenticate the request."),
        )
        .with_attribute(
            "username",
            Attribute::optional_string()
                .with_force_new()
                .with_validator(Validator::length_between(1, 255)),
        )
        .with_attribute(
            "project_key",
            Attribute::optional_string().with_force_new().with_validator(Validator::matches(
                r"^[a-z][a-z0-9\-]{1,31}$",
                "must be 2 - 32 lowercase alphanumeric and hyphen characters",
            )),
        )
        .with_attribute(
            "scopes",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional_computed(),
            )
            .with_force_new(),
        )
        .with_attribute(
            "expires_in",
            Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                .with_force_new()
                .with_validator(Validator::at_least(0)),
        )
        .with_attribute("refreshable", Attribute::defaulted_bool(false).with_force_new())
        .with_attribute(
            "include_reference_token",
            Attribute::new(AttributeType::Bool, AttributeFlags::optional_computed()).with_force_new(),
        )
        .with_attribute(
            "description",
            Attribute::defaulted_string("")
                .with_force_new()
                .with_validator(Validator::length_between(0, 1024)),
        )
        .with_attribute(
            "audiences",
            Attribute::optional_string_set()
                .with_force_new()
                .with_validator(Validator::each(Validator::length_at_least(1)))
                .with_validator(Validator::each(Validator::matches(
                    audience_pattern,
                    format!(
                        "must either begin with {}, or *",
                        SERVICE_TYPES
                            .iter()
                            .map(|s| format!("{}@", s))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                ))),
        )
        .with_attribute("access_token", Attribute::computed_string().sensitive())
        .with_attribute("refresh_token", Attribute::computed_string().sensitive())
        .with_attribute("reference_token", Attribute::computed_string().sensitive())
        .with_attribute("token_type", Attribute::computed_string())
        .with_attribute("subject", Attribute::computed_string())
        .with_attribute("expiry", Attribute::computed_int64())
        .with_attribute("issued_at", Attribute::computed_int64())
        .with_attribute("issuer", Attribute::computed_string())
        .with_attribute(
            "ignore_missing_token_warning",
            Attribute::defaulted_bool(false).with_description(
                "Toggle to ignore warning message when token was missing or not created and stored by Artifactory.",
            ),
        )
}

fn add_ignore_missing_token_warning(
    mut attributes: Map<String, Value>,
) -> Result<Map<String, Value>, ProviderError> {
    set_default_if_absent(&mut attributes, "ignore_missing_token_warning", Value::Bool(false));
    Ok(attributes)
}

/// Returns the reason `scope` is rejected, if it is.
fn check_scope(scope: &str) -> Option<String> {
    if FIXED_SCOPES.contains(&scope) {
        return None;
    }
    let mut reasons = vec![format!("must be one of {:?}", FIXED_SCOPES)];
    for (regex, message) in SCOPE_REGEXES.iter() {
        match regex {
            Ok(re) if re.is_match(scope) => return None,
            Ok(_) => reasons.push((*message).to_string()),
            Err(e) => reasons.push(format!("{} (pattern cannot be checked: {})", message, e)),
        }
    }
    Some(reasons.join(", or "))
}

fn joined(values: &Tristate<Vec<String>>) -> String {
    values.as_known().map(|v| join_scopes(v)).unwrap_or_default()
}

impl Resource for ScopedToken {
    type State = ScopedTokenState;
    type Request = TokenRequest;
    type Response = TokenInfo;
    type Created = TokenCreated;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS)
            .with_policy(
                EnginePolicy::default()
                    .with_update(UpdateMode::StateOnly)
                    .without_import()
                    .tolerate_missing_after_write(),
            )
            .with_upgrader(Upgrader::new(1).with_step(0, add_ignore_missing_token_warning))
    }

    fn key(&self, state: &ScopedTokenState) -> Option<String> {
        state.id.as_known().filter(|id| !id.is_empty()).cloned()
    }

    fn validate(&self, state: &ScopedTokenState) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for scope in state.scopes.as_known().into_iter().flatten() {
            if let Some(reason) = check_scope(scope) {
                diagnostics.push(
                    Diagnostic::error("Invalid Attribute Value")
                        .with_detail(format!("scope {:?} {}", scope, reason))
                        .with_attribute("scopes"),
                );
            }
        }

        let scopes = joined(&state.scopes);
        if scopes.len() > MAX_SCOPES_LENGTH {
            diagnostics.push(
                Diagnostic::error("Scopes length exceeds 500 characters")
                    .with_detail(format!(
                        "total combined length of scopes field exceeds 500 characters:{}",
                        scopes
                    ))
                    .with_attribute("scopes"),
            );
        }

        let audiences = joined(&state.audiences);
        if audiences.len() > MAX_AUDIENCES_LENGTH {
            diagnostics.push(
                Diagnostic::error("Audiences length exceeds 255 characters")
                    .with_detail(format!(
                        "total combined length of audiences field exceeds 255 characters:{}",
                        audiences
                    ))
                    .with_attribute("audiences"),
            );
        }

        diagnostics
    }

    fn to_wire(&self, state: &ScopedTokenState) -> Result<TokenRequest, ProviderError> {
        Ok(TokenRequest {
            grant_type: state.grant_type.value_or("client_credentials".to_string()),
            username: state.username.value_or_default(),
            project_key: state.project_key.value_or_default(),
            scope: joined(&state.scopes),
            expires_in: state.expires_in.value_or_default(),
            refreshable: state.refreshable.value_or_default(),
            description: state.description.value_or_default(),
            audience: joined(&state.audiences),
            include_reference_token: state.include_reference_token.value_or_default(),
        })
    }

    fn apply_created(&self, state: &mut ScopedTokenState, created: TokenCreated) {
        state.id = Tristate::Known(created.token_id);
        if !created.scope.is_empty() {
            let configured = state.scopes.as_known().map(Vec::as_slice).unwrap_or_default();
            let scopes = reorder_like(configured, split_scopes(&created.scope), String::clone);
            state.scopes = Tristate::Known(scopes);
        }
        state.expires_in = Tristate::Known(created.expires_in);
        state.access_token = Tristate::Known(created.access_token);

        let refreshable = state.refreshable.value_or_default();
        state.refresh_token = if refreshable && !created.refresh_token.is_empty() {
            Tristate::Known(created.refresh_token)
        } else {
            Tristate::Null
        };

        let include_reference_token = state.include_reference_token.value_or_default();
        state.reference_token = if include_reference_token && !created.reference_token.is_empty() {
            Tristate::Known(created.reference_token)
        } else {
            Tristate::Null
        };
        state.include_reference_token = Tristate::Known(include_reference_token);
        state.token_type = Tristate::Known(created.token_type);
    }

    fn from_wire(&self, prior: &ScopedTokenState, wire: TokenInfo) -> ScopedTokenState {
        let mut state = prior.clone();
        state.id = Tristate::Known(wire.token_id);
        if !state.grant_type.is_known() {
            state.grant_type = Tristate::Known("client_credentials".to_string());
        }
        state.subject = Tristate::Known(wire.subject);
        state.expiry = Tristate::Known(wire.expiry);
        state.issued_at = Tristate::Known(wire.issued_at);
        state.issuer = Tristate::Known(wire.issuer);

        if !wire.description.is_empty() {
            state.description = Tristate::Known(wire.description);
        } else if !state.description.is_known() {
            state.description = Tristate::Known(String::new());
        }
        state.refreshable = Tristate::Known(wire.refreshable);

        // Empty rather than null, so a token without secrets does not drift.
        if !state.refresh_token.is_known() {
            state.refresh_token = Tristate::Known(String::new());
        }
        if !state.reference_token.is_known() {
            state.reference_token = Tristate::Known(String::new());
        }
        state
    }

    fn on_missing(&self, state: &ScopedTokenState) -> Vec<Diagnostic> {
        if state.ignore_missing_token_warning.value_or_default() {
            return Vec::new();
        }
        let id = state.id.value_or_default();
        vec![Diagnostic::warning(format!(
            "Scoped token {} not found or not created",
            id
        ))
        .with_detail(
            "Access token would not be saved by Artifactory if 'expires_in' is less than the persistence \
             threshold value (default to 10800 seconds) set in Access configuration. \
             The resource will be removed from state.",
        )]
    }

    fn on_missing_after_write(&self, state: &ScopedTokenState) -> Vec<Diagnostic> {
        let id = state.id.value_or_default();
        vec![Diagnostic::warning(format!("Scoped token with ID {} is not found", id)).with_detail(
            "Token would not be saved by Artifactory if 'expires_in' is less than the persistence threshold \
             value (default to 10800 seconds) set in Access configuration. \
             See https://jfrog.com/help/r/jfrog-platform-administration-documentation/persistency-threshold for details.",
        )]
    }

    fn delete_failed(&self, key: &str, err: &ProviderError) -> Diagnostic {
        Diagnostic::error(format!("Failed to revoke scoped token {}", key)).with_detail(format!(
            "An unexpected error occurred while attempting to delete the resource.\n\nHTTP Error: {}",
            err
        ))
    }
}
