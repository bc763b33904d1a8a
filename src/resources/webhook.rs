//! `artifactory_artifact_lifecycle_custom_webhook`: event subscriptions for
//! archive and restore events, delivered to custom HTTP handlers.
//!
//! Handler secrets are write-only. The API answers with masked values, so
//! the configured secrets are carried over from state, matched by handler
//! URL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::resource::{Descriptor, Endpoints, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, Validator};
use crate::upgrade::{single_block_to_list, Upgrader};
use crate::value::{reorder_like, Tristate};

/// Type name.
pub const TYPE_NAME: &str = "artifactory_artifact_lifecycle_custom_webhook";

const DOMAIN: &str = "artifact_lifecycle";
const EVENT_TYPES: &[&str] = &["archive", "restore"];
const HANDLER_TYPE: &str = "custom-webhook";

const ENDPOINTS: Endpoints = Endpoints::new(
    "event/api/v1/subscriptions",
    "event/api/v1/subscriptions/{webhookKey}",
);

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookState {
    /// Webhook key.
    pub key: Tristate<String>,
    /// Free-form description.
    pub description: Tristate<String>,
    /// Whether events are delivered.
    pub enabled: Tristate<bool>,
    /// Lifecycle events that trigger the webhook.
    pub event_types: Tristate<Vec<String>>,
    /// Delivery targets.
    pub handler: Tristate<Vec<HandlerState>>,
}

/// One `handler` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerState {
    /// Target URL.
    pub url: Tristate<String>,
    /// HTTP method.
    pub method: Tristate<String>,
    /// Secret values keyed by name. The API returns them masked.
    pub secrets: Tristate<BTreeMap<String, String>>,
    /// Extra request headers.
    pub http_headers: Tristate<BTreeMap<String, String>>,
    /// Custom payload template.
    pub payload: Tristate<String>,
    /// Network proxy key.
    pub proxy: Tristate<String>,
}

/// Request and response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionBody {
    key: String,
    description: String,
    enabled: bool,
    event_filter: EventFilter,
    handlers: Vec<HandlerBody>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct EventFilter {
    domain: String,
    event_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct HandlerBody {
    handler_type: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<NameValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    http_headers: Vec<NameValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct NameValue {
    name: String,
    value: String,
}

/// The artifact lifecycle custom webhook resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactLifecycleCustomWebhook;

fn string_map() -> Attribute {
    Attribute::new(
        AttributeType::map(AttributeType::String),
        AttributeFlags::optional(),
    )
}

fn schema() -> Schema {
    let handler = Block::new()
        .with_attribute(
            "url",
            Attribute::required_string()
                .with_validator(Validator::matches(r"^https?://.+", "must be a valid http(s) URL")),
        )
        .with_attribute(
            "method",
            Attribute::optional_string()
                .with_validator(Validator::one_of(&["GET", "POST", "PUT", "PATCH", "DELETE"])),
        )
        .with_attribute(
            "secrets",
            string_map()
                .sensitive()
                .with_description("Secrets sent with each request. Not returned by the API."),
        )
        .with_attribute("http_headers", string_map())
        .with_attribute("payload", Attribute::optional_string())
        .with_attribute(
            "proxy",
            Attribute::optional_string()
                .with_validator(Validator::length_at_least(1))
                .with_description("Proxy key from Artifactory UI (Administration > Proxies > Configuration)."),
        );

    Schema::new(1)
        .with_description(
            "Provides an Artifactory webhook resource for artifact lifecycle events, delivered to custom handlers.",
        )
        .with_attribute(
            "key",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_between(2, 200))
                .with_validator(Validator::matches(
                    r"^[^\s]+$",
                    "Key cannot contain spaces",
                )),
        )
        .with_attribute(
            "description",
            Attribute::optional_string().with_validator(Validator::length_between(0, 1000)),
        )
        .with_attribute("enabled", Attribute::defaulted_bool(true))
        .with_attribute(
            "event_types",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::required(),
            )
            .with_validator(Validator::each(Validator::one_of(EVENT_TYPES))),
        )
        .with_block("handler", NestedBlock::set(handler).with_min_items(1))
}

fn handler_to_list(mut attributes: Map<String, Value>) -> Result<Map<String, Value>, ProviderError> {
    single_block_to_list(&mut attributes, "handler")?;
    Ok(attributes)
}

fn pairs(map: &Tristate<BTreeMap<String, String>>) -> Vec<NameValue> {
    map.as_known()
        .into_iter()
        .flatten()
        .map(|(name, value)| NameValue {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn map_or_null(pairs: Vec<NameValue>) -> Tristate<BTreeMap<String, String>> {
    if pairs.is_empty() {
        Tristate::Null
    } else {
        Tristate::Known(pairs.into_iter().map(|p| (p.name, p.value)).collect())
    }
}

fn non_empty(value: Option<String>) -> Tristate<String> {
    value.filter(|v| !v.is_empty()).into()
}

impl Resource for ArtifactLifecycleCustomWebhook {
    type State = WebhookState;
    type Request = SubscriptionBody;
    type Response = SubscriptionBody;
    type Created = serde::de::IgnoredAny;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS)
            .with_upgrader(Upgrader::new(1).with_step(0, handler_to_list))
    }

    fn key(&self, state: &WebhookState) -> Option<String> {
        state.key.as_known().cloned()
    }

    fn state_from_import_id(&self, id: &str) -> Result<WebhookState, ProviderError> {
        Ok(WebhookState {
            key: Tristate::Known(id.to_string()),
            ..Default::default()
        })
    }

    fn to_wire(&self, state: &WebhookState) -> Result<SubscriptionBody, ProviderError> {
        let handlers = state
            .handler
            .as_known()
            .into_iter()
            .flatten()
            .map(|h| HandlerBody {
                handler_type: HANDLER_TYPE.to_string(),
                url: h.url.value_or_default(),
                method: h.method.as_known().cloned(),
                secrets: pairs(&h.secrets),
                http_headers: pairs(&h.http_headers),
                payload: h.payload.as_known().cloned(),
                proxy: h.proxy.as_known().cloned(),
            })
            .collect();

        Ok(SubscriptionBody {
            key: state.key.value_or_default(),
            description: state.description.value_or_default(),
            enabled: state.enabled.value_or(true),
            event_filter: EventFilter {
                domain: DOMAIN.to_string(),
                event_types: state.event_types.value_or_default(),
            },
            handlers,
        })
    }

    fn from_wire(&self, prior: &WebhookState, wire: SubscriptionBody) -> WebhookState {
        let prior_handlers = prior.handler.as_known().map(Vec::as_slice).unwrap_or_default();

        let handlers = wire
            .handlers
            .into_iter()
            .map(|h| {
                let configured = prior_handlers
                    .iter()
                    .find(|p| p.url.as_known() == Some(&h.url));
                let secrets = match configured {
                    Some(p) => p.secrets.clone().resolve(),
                    None => map_or_null(h.secrets),
                };
                HandlerState {
                    url: Tristate::Known(h.url),
                    method: non_empty(h.method),
                    secrets,
                    http_headers: map_or_null(h.http_headers),
                    payload: non_empty(h.payload),
                    proxy: non_empty(h.proxy),
                }
            })
            .collect();

        let prior_events = prior.event_types.as_known().map(Vec::as_slice).unwrap_or_default();

        WebhookState {
            key: Tristate::Known(wire.key),
            description: if wire.description.is_empty() && !prior.description.is_known() {
                Tristate::Null
            } else {
                Tristate::Known(wire.description)
            },
            enabled: Tristate::Known(wire.enabled),
            event_types: Tristate::Known(reorder_like(
                prior_events,
                wire.event_filter.event_types,
                String::clone,
            )),
            handler: Tristate::Known(reorder_like(prior_handlers, handlers, |h| h.url.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::resource::{CrudEngine, ResourceHandler};
    use crate::testing::{assert_error_contains, assert_no_errors, mock_context, MockClient};

    fn engine() -> CrudEngine<ArtifactLifecycleCustomWebhook> {
        CrudEngine::new(ArtifactLifecycleCustomWebhook)
    }

    fn config() -> Value {
        json!({
            "key": "lifecycle-hook",
            "description": "test description",
            "event_types": ["archive", "restore"],
            "handler": [{
                "url": "https://example.com/hook",
                "method": "POST",
                "secrets": {"secret1": "value1", "secret2": "value2"},
                "http_headers": {"header-1": "value-1"},
                "payload": "{ \"ref\": \"main\" }",
            }],
        })
    }

    fn wire() -> Value {
        json!({
            "key": "lifecycle-hook",
            "description": "test description",
            "enabled": true,
            "event_filter": {"domain": "artifact_lifecycle", "event_types": ["restore", "archive"]},
            "handlers": [{
                "handler_type": "custom-webhook",
                "url": "https://example.com/hook",
                "method": "POST",
                "secrets": [{"name": "secret1", "value": ""}, {"name": "secret2", "value": ""}],
                "http_headers": [{"name": "header-1", "value": "value-1"}],
                "payload": "{ \"ref\": \"main\" }",
            }],
        })
    }

    #[test]
    fn test_validation() {
        assert_no_errors(&engine().validate(&config()));

        let mut bad = config();
        bad["event_types"] = json!(["archive", "locked"]);
        bad["handler"][0]["proxy"] = json!("");
        let diagnostics = engine().validate(&bad);
        assert_error_contains(&diagnostics, "value must be one of");
        assert_error_contains(&diagnostics, "string length must be at least 1");

        let mut no_handler = config();
        no_handler["handler"] = json!([]);
        assert_error_contains(&engine().validate(&no_handler), "requires at least 1 item(s)");
    }

    #[test]
    fn test_to_wire_shape() {
        let state: WebhookState = serde_json::from_value(config()).unwrap();
        let body = serde_json::to_value(ArtifactLifecycleCustomWebhook.to_wire(&state).unwrap()).unwrap();

        assert_eq!(body["event_filter"]["domain"], "artifact_lifecycle");
        assert_eq!(body["enabled"], true);
        let handler = &body["handlers"][0];
        assert_eq!(handler["handler_type"], "custom-webhook");
        assert_eq!(
            handler["secrets"],
            json!([{"name": "secret1", "value": "value1"}, {"name": "secret2", "value": "value2"}])
        );
        assert!(handler.get("proxy").is_none());
    }

    #[tokio::test]
    async fn test_read_preserves_secrets_by_url() {
        let client = Arc::new(MockClient::new());
        client.push_json(200, wire());

        let prior = engine().plan(None, &config()).planned_state;
        let response = engine().read(&mock_context(client.clone()), prior).await.unwrap();
        let state = response.state.unwrap();

        assert_eq!(state["handler"][0]["secrets"]["secret1"], "value1");
        assert_eq!(state["event_types"], json!(["archive", "restore"]));
        assert_eq!(client.requests()[0].path, "event/api/v1/subscriptions/lifecycle-hook");

        let plan = engine().plan(Some(&state), &config());
        assert!(plan.changes.is_empty(), "unexpected drift: {:?}", plan.changes);
    }

    #[tokio::test]
    async fn test_import_reports_masked_secrets() {
        let client = Arc::new(MockClient::new());
        client.push_json(200, wire());

        let imported = engine()
            .import(&mock_context(client), "lifecycle-hook")
            .await
            .unwrap();
        let state = &imported[0].state;
        assert_eq!(state["handler"][0]["secrets"]["secret1"], "");
        assert_eq!(state["handler"][0]["http_headers"]["header-1"], "value-1");
        assert!(state["handler"][0]["proxy"].is_null());
    }

    #[test]
    fn test_upgrade_single_handler_to_list() {
        let v0 = json!({
            "key": "lifecycle-hook",
            "event_types": ["archive"],
            "handler": {"url": "https://example.com/hook"},
        });
        let upgraded = engine().upgrade(0, v0).unwrap();
        assert_eq!(upgraded["handler"], json!([{"url": "https://example.com/hook"}]));

        let v0_already_list = json!({"key": "k", "handler": [{"url": "https://a"}]});
        let upgraded = engine().upgrade(0, v0_already_list.clone()).unwrap();
        assert_eq!(upgraded, v0_already_list);
    }
}
