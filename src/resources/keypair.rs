//! `artifactory_keypair`: RSA or GPG key pairs used for signing.
//!
//! Key pairs cannot be modified remotely. Key material changes replace the
//! pair; only the passphrase can change in place, and only in state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::resource::{Descriptor, EnginePolicy, Endpoints, Resource, UpdateMode};
use crate::schema::{Attribute, Diagnostic, Schema, Validator};
use crate::value::Tristate;

/// Type name.
pub const TYPE_NAME: &str = "artifactory_keypair";

const ENDPOINTS: Endpoints = Endpoints::new(
    "artifactory/api/security/keypair",
    "artifactory/api/security/keypair/{pairName}",
);

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypairState {
    /// Unique name of the pair.
    pub pair_name: Tristate<String>,
    /// `RSA` or `GPG`.
    pub pair_type: Tristate<String>,
    /// Alias used when signing.
    pub alias: Tristate<String>,
    /// Private key in PEM or armored form. Never returned by the API.
    pub private_key: Tristate<String>,
    /// Passphrase of the private key. Never returned by the API.
    pub passphrase: Tristate<String>,
    /// Public key in PEM or armored form.
    pub public_key: Tristate<String>,
}

/// Request and response body. The private key is never returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeypairBody {
    pair_name: String,
    pair_type: String,
    alias: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    private_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    passphrase: String,
    public_key: String,
}

/// The keypair resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct Keypair;

fn schema() -> Schema {
    Schema::v0()
        .with_description("Creates a keypair resource used to sign packages and metadata.")
        .with_attribute(
            "pair_name",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_at_least(1)),
        )
        .with_attribute(
            "pair_type",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::one_of(&["RSA", "GPG"])),
        )
        .with_attribute(
            "alias",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_at_least(1)),
        )
        .with_attribute(
            "private_key",
            Attribute::required_string().with_force_new().sensitive(),
        )
        .with_attribute(
            "passphrase",
            Attribute::optional_string()
                .sensitive()
                .with_description("Used to decrypt the private key (if applicable). Will be used to sign metadata."),
        )
        .with_attribute("public_key", Attribute::required_string().with_force_new())
}

/// Label of a PEM document (`-----BEGIN <label>-----`), if `text` is one
/// whose payload decodes as base64.
fn pem_label(text: &str) -> Option<&str> {
    let text = text.trim();
    let rest = text.strip_prefix("-----BEGIN ")?;
    let (label, rest) = rest.split_once("-----")?;
    let footer = format!("-----END {}-----", label);
    let body = rest.trim_end().strip_suffix(footer.as_str())?;

    // Encapsulated headers such as `Proc-Type: 4,ENCRYPTED` precede the payload.
    let payload: String = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.contains(':'))
        .collect();
    let decoded = STANDARD.decode(payload).ok()?;
    (!decoded.is_empty()).then_some(label)
}

impl Resource for Keypair {
    type State = KeypairState;
    type Request = KeypairBody;
    type Response = KeypairBody;
    type Created = serde::de::IgnoredAny;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS)
            .with_policy(EnginePolicy::default().with_update(UpdateMode::StateOnly))
    }

    fn key(&self, state: &KeypairState) -> Option<String> {
        state.pair_name.as_known().cloned()
    }

    fn state_from_import_id(&self, id: &str) -> Result<KeypairState, ProviderError> {
        Ok(KeypairState {
            pair_name: Tristate::Known(id.to_string()),
            ..Default::default()
        })
    }

    fn validate(&self, state: &KeypairState) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if state.pair_type.as_known().map(String::as_str) != Some("RSA") {
            return diagnostics;
        }

        if let Some(private_key) = state.private_key.as_known() {
            if !pem_label(private_key).is_some_and(|l| l.ends_with("PRIVATE KEY")) {
                diagnostics.push(
                    Diagnostic::error("unable to decode private key pem format")
                        .with_attribute("private_key"),
                );
            }
        }
        if let Some(public_key) = state.public_key.as_known() {
            if !matches!(pem_label(public_key), Some("PUBLIC KEY" | "RSA PUBLIC KEY")) {
                diagnostics.push(
                    Diagnostic::error("RSA public key not in pem format").with_attribute("public_key"),
                );
            }
        }
        diagnostics
    }

    fn to_wire(&self, state: &KeypairState) -> Result<KeypairBody, ProviderError> {
        Ok(KeypairBody {
            pair_name: state.pair_name.value_or_default(),
            pair_type: state.pair_type.value_or_default(),
            alias: state.alias.value_or_default(),
            private_key: state.private_key.value_or_default(),
            passphrase: state.passphrase.value_or_default(),
            public_key: state.public_key.value_or_default(),
        })
    }

    fn from_wire(&self, prior: &KeypairState, wire: KeypairBody) -> KeypairState {
        KeypairState {
            pair_name: Tristate::Known(wire.pair_name),
            pair_type: Tristate::Known(wire.pair_type),
            alias: Tristate::Known(wire.alias),
            private_key: prior.private_key.clone().resolve(),
            passphrase: prior.passphrase.clone().resolve(),
            public_key: Tristate::Known(wire.public_key),
        }
    }
}
