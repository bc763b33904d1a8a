use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::registry::{DataSourceHandler, ResourceHandler};
use super::{CreateTarget, DataSource, Descriptor, ProviderContext, Resource, UpdateMode};
use crate::client::{expand_path, ApiRequest};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::schema::{Diagnostic, Schema};
use crate::telemetry::{Operation, UsageEvent};
use crate::types::{ImportedResource, PlanResult, ResourceResponse};
use crate::validation;
use crate::value::{is_unknown, resolve_unknowns};

/// Generic lifecycle for a [`Resource`].
///
/// Every call performs at most two sequential requests: the write and the
/// read-back. Nothing is cached between calls.
pub struct CrudEngine<R: Resource> {
    resource: R,
    descriptor: Descriptor,
}

impl<R: Resource> CrudEngine<R> {
    /// Wrap a resource type.
    pub fn new(resource: R) -> Self {
        let descriptor = resource.descriptor();
        Self {
            resource,
            descriptor,
        }
    }

    /// The static description of the wrapped type.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn report(&self, ctx: &ProviderContext, operation: Operation) {
        ctx.usage
            .report(UsageEvent::new(self.descriptor.type_name, operation));
    }

    fn decode(&self, value: &Value) -> Result<R::State, ProviderError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    fn encode(state: &R::State) -> Result<Value, ProviderError> {
        let mut value = serde_json::to_value(state)?;
        resolve_unknowns(&mut value);
        Ok(value)
    }

    fn require_key(&self, state: &R::State) -> Result<String, ProviderError> {
        self.resource.key(state).ok_or_else(|| {
            ProviderError::validation(format!(
                "{} state has no identifying key",
                self.descriptor.type_name
            ))
        })
    }

    fn item_path(&self, key: &str) -> String {
        expand_path(self.descriptor.endpoints.item, key)
    }

    /// Schema and cross-attribute checks. Any error aborts before the
    /// network; warnings are handed back for the response.
    fn preflight(&self, value: &Value, state: &R::State) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&self.descriptor.schema, value);
        diagnostics.extend(self.resource.validate(state));
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ProviderError::Validation(diagnostics));
        }
        Ok(diagnostics)
    }

    /// GET the object. `None` on 404.
    async fn fetch(
        &self,
        ctx: &ProviderContext,
        key: &str,
        state: &R::State,
    ) -> Result<Option<R::Response>, ProviderError> {
        let request = ApiRequest::get(self.item_path(key)).with_query(self.resource.query(state));
        let response = ctx.client.execute(request).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(Some(response.json()?))
    }

    async fn read_back(
        &self,
        ctx: &ProviderContext,
        state: R::State,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<ResourceResponse, ProviderError> {
        let key = self.require_key(&state)?;
        match self.fetch(ctx, &key, &state).await? {
            Some(wire) => {
                let fresh = self.resource.from_wire(&state, wire);
                Ok(ResourceResponse::with_state(Self::encode(&fresh)?).with_diagnostics(diagnostics))
            }
            None if self.descriptor.policy.tolerate_missing_after_write => {
                warn!(
                    resource_type = self.descriptor.type_name,
                    key = %key,
                    "Object missing right after write"
                );
                diagnostics.extend(self.resource.on_missing_after_write(&state));
                Ok(ResourceResponse::with_state(Self::encode(&state)?).with_diagnostics(diagnostics))
            }
            None => Err(ProviderError::NotFound(format!(
                "{} {} was not found after write",
                self.descriptor.type_name, key
            ))),
        }
    }
}

#[async_trait]
impl<R: Resource> ResourceHandler for CrudEngine<R> {
    fn type_name(&self) -> &str {
        self.descriptor.type_name
    }

    fn schema(&self) -> &Schema {
        &self.descriptor.schema
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.descriptor.schema, config);
        match self.decode(config) {
            Ok(state) => diagnostics.extend(self.resource.validate(&state)),
            Err(err) => diagnostics.extend(err.into_diagnostics()),
        }
        diagnostics
    }

    fn plan(&self, prior: Option<&Value>, proposed: &Value) -> PlanResult {
        plan_resource(&self.descriptor.schema, prior, proposed)
    }

    fn upgrade(&self, version: i64, state: Value) -> Result<Value, ProviderError> {
        self.descriptor.upgrader.upgrade(version, state)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.report(ctx, Operation::Create);
        let mut state = self.decode(&planned)?;
        let diagnostics = self.preflight(&planned, &state)?;

        let policy = self.descriptor.policy;
        let path = match policy.create_target {
            CreateTarget::Collection => self.descriptor.endpoints.collection.to_string(),
            CreateTarget::Item => self.item_path(&self.require_key(&state)?),
        };
        let body = serde_json::to_value(self.resource.to_wire(&state)?)?;
        let request = ApiRequest::new(policy.create_method, path)
            .with_query(self.resource.query(&state))
            .with_body(body);

        let response = ctx.client.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let created: R::Created = response.json_or_null()?;
        self.resource.apply_created(&mut state, created);
        debug!(resource_type = self.descriptor.type_name, "Created; reading back");

        self.read_back(ctx, state, diagnostics).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.report(ctx, Operation::Read);
        let state = self.decode(&current)?;
        let key = self.require_key(&state)?;

        match self.fetch(ctx, &key, &state).await? {
            Some(wire) => {
                let fresh = self.resource.from_wire(&state, wire);
                Ok(ResourceResponse::with_state(Self::encode(&fresh)?))
            }
            None => {
                info!(
                    resource_type = self.descriptor.type_name,
                    key = %key,
                    "Object no longer exists; removing from state"
                );
                Ok(ResourceResponse::removed().with_diagnostics(self.resource.on_missing(&state)))
            }
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.report(ctx, Operation::Update);

        let method = match self.descriptor.policy.update {
            UpdateMode::StateOnly => {
                let mut merged = use_prior_for_unknown(planned, &prior);
                resolve_unknowns(&mut merged);
                // Round-trip through the typed state to reject malformed plans.
                self.decode(&merged)?;
                return Ok(ResourceResponse::with_state(merged));
            }
            UpdateMode::Remote(method) => method,
        };

        let state = self.decode(&planned)?;
        let diagnostics = self.preflight(&planned, &state)?;
        let key = self.require_key(&state)?;
        let body = serde_json::to_value(self.resource.to_wire(&state)?)?;
        let request = ApiRequest::new(method, self.item_path(&key))
            .with_query(self.resource.query(&state))
            .with_body(body);

        let response = ctx.client.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        self.read_back(ctx, state, diagnostics).await
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.report(ctx, Operation::Delete);
        let state = self.decode(&current)?;
        let Some(key) = self.resource.key(&state) else {
            return Ok(Vec::new());
        };

        let request =
            ApiRequest::delete(self.item_path(&key)).with_query(self.resource.query(&state));
        let outcome = match ctx.client.execute(request).await {
            Ok(response) if response.is_success() || response.is_not_found() => Ok(()),
            Ok(response) => Err(response.into_error()),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => Ok(Vec::new()),
            Err(err) => {
                warn!(
                    resource_type = self.descriptor.type_name,
                    key = %key,
                    error = %err,
                    "Delete failed; dropping record anyway"
                );
                Ok(vec![self.resource.delete_failed(&key, &err)])
            }
        }
    }

    async fn import(
        &self,
        ctx: &ProviderContext,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.report(ctx, Operation::Import);
        if !self.descriptor.policy.importable {
            return Err(ProviderError::Unimplemented(format!(
                "resource {} doesn't support import",
                self.descriptor.type_name
            )));
        }

        let state = self.resource.state_from_import_id(id)?;
        let key = self.require_key(&state)?;
        match self.fetch(ctx, &key, &state).await? {
            Some(wire) => {
                let fresh = self.resource.from_wire(&state, wire);
                Ok(vec![ImportedResource::new(
                    self.descriptor.type_name,
                    Self::encode(&fresh)?,
                )])
            }
            None => Err(ProviderError::NotFound(
                "Cannot import non-existent remote object".to_string(),
            )),
        }
    }
}

/// Replace unknown top-level attributes of `planned` with their prior value.
fn use_prior_for_unknown(planned: Value, prior: &Value) -> Value {
    match (planned, prior.as_object()) {
        (Value::Object(planned), Some(prior)) => {
            let merged: Map<String, Value> = planned
                .into_iter()
                .map(|(name, value)| match prior.get(&name) {
                    Some(before) if is_unknown(&value) => (name, before.clone()),
                    _ => (name, value),
                })
                .collect();
            Value::Object(merged)
        }
        (planned, _) => planned,
    }
}

/// Lookup for a [`DataSource`].
pub struct DataSourceEngine<D: DataSource> {
    source: D,
    schema: Schema,
}

impl<D: DataSource> DataSourceEngine<D> {
    /// Wrap a data source type.
    pub fn new(source: D) -> Self {
        let schema = source.schema();
        Self { source, schema }
    }
}

#[async_trait]
impl<D: DataSource> DataSourceHandler for DataSourceEngine<D> {
    fn type_name(&self) -> &str {
        self.source.type_name()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema, config)
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        config: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        ctx.usage
            .report(UsageEvent::new(self.source.type_name(), Operation::Read));
        let state: D::State = serde_json::from_value(config)?;
        let key = self.source.key(&state).ok_or_else(|| {
            ProviderError::validation(format!("{} requires a key", self.source.type_name()))
        })?;

        let response = ctx
            .client
            .execute(ApiRequest::get(expand_path(self.source.item_path(), &key)))
            .await?;
        if response.is_not_found() {
            debug!(data_source = self.source.type_name(), key = %key, "Object not found");
            return Ok(ResourceResponse::removed());
        }
        if !response.is_success() {
            return Err(response.into_error());
        }

        let fresh = self.source.from_wire(&state, response.json()?)?;
        let mut value = serde_json::to_value(&fresh)?;
        resolve_unknowns(&mut value);
        Ok(ResourceResponse::with_state(value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::client::{ApiResponse, Method};
    use crate::resource::{EnginePolicy, Endpoints};
    use crate::schema::Attribute;
    use crate::telemetry::UsageReporter;
    use crate::testing::MockClient;
    use crate::value::{Tristate, UNKNOWN_VALUE};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct HookState {
        key: Tristate<String>,
        url: Tristate<String>,
        secret: Tristate<String>,
        created_by: Tristate<String>,
        one_time_code: Tristate<String>,
    }

    #[derive(Serialize)]
    struct HookBody {
        key: String,
        url: String,
        secret: Option<String>,
    }

    #[derive(Deserialize)]
    struct HookWire {
        key: String,
        url: String,
        created_by: String,
    }

    #[derive(Deserialize)]
    struct HookCreated {
        code: String,
    }

    struct Hook {
        policy: EnginePolicy,
    }

    impl Resource for Hook {
        type State = HookState;
        type Request = HookBody;
        type Response = HookWire;
        type Created = Option<HookCreated>;

        fn descriptor(&self) -> Descriptor {
            let schema = Schema::v0()
                .with_attribute("key", Attribute::required_string().with_force_new())
                .with_attribute("url", Attribute::required_string())
                .with_attribute("secret", Attribute::optional_string().sensitive())
                .with_attribute("created_by", Attribute::computed_string())
                .with_attribute("one_time_code", Attribute::computed_string());
            Descriptor::new("test_hook", schema, Endpoints::new("api/hooks", "api/hooks/{key}"))
                .with_policy(self.policy)
        }

        fn key(&self, state: &HookState) -> Option<String> {
            state.key.as_known().cloned()
        }

        fn state_from_import_id(&self, id: &str) -> Result<HookState, ProviderError> {
            Ok(HookState {
                key: Tristate::Known(id.to_string()),
                ..Default::default()
            })
        }

        fn validate(&self, state: &HookState) -> Vec<Diagnostic> {
            match state.url.as_known() {
                Some(url) if !url.starts_with("https://") => {
                    vec![Diagnostic::error("url must use https").with_attribute("url")]
                }
                _ => Vec::new(),
            }
        }

        fn to_wire(&self, state: &HookState) -> Result<HookBody, ProviderError> {
            Ok(HookBody {
                key: state.key.value_or_default(),
                url: state.url.value_or_default(),
                secret: state.secret.as_known().cloned(),
            })
        }

        fn from_wire(&self, prior: &HookState, wire: HookWire) -> HookState {
            HookState {
                key: Tristate::Known(wire.key),
                url: Tristate::Known(wire.url),
                secret: prior.secret.clone(),
                created_by: Tristate::Known(wire.created_by),
                one_time_code: prior.one_time_code.clone(),
            }
        }

        fn apply_created(&self, state: &mut HookState, created: Option<HookCreated>) {
            if let Some(created) = created {
                state.one_time_code = Tristate::Known(created.code);
            }
        }

        fn on_missing_after_write(&self, state: &HookState) -> Vec<Diagnostic> {
            vec![Diagnostic::warning(format!(
                "Hook {} is not found",
                state.key.value_or_default()
            ))]
        }
    }

    fn engine(policy: EnginePolicy) -> CrudEngine<Hook> {
        CrudEngine::new(Hook { policy })
    }

    fn context(client: &Arc<MockClient>) -> ProviderContext {
        ProviderContext::new(client.clone(), UsageReporter::disabled())
    }

    fn planned() -> Value {
        json!({
            "key": "hook",
            "url": "https://example.com",
            "secret": "s3cr3t",
            "created_by": UNKNOWN_VALUE,
            "one_time_code": UNKNOWN_VALUE,
        })
    }

    fn wire() -> Value {
        json!({"key": "hook", "url": "https://example.com", "created_by": "admin"})
    }

    #[tokio::test]
    async fn test_create_reads_back_and_keeps_one_time_fields() {
        let client = Arc::new(MockClient::new());
        client.push_json(201, json!({"code": "once"}));
        client.push_json(200, wire());

        let response = engine(EnginePolicy::default())
            .create(&context(&client), planned())
            .await
            .unwrap();

        let state = response.state.unwrap();
        assert_eq!(state["created_by"], "admin");
        assert_eq!(state["one_time_code"], "once");
        assert_eq!(state["secret"], "s3cr3t");

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, "api/hooks");
        assert_eq!(requests[0].body.as_ref().unwrap()["secret"], "s3cr3t");
        assert_eq!(requests[1].method, Method::Get);
        assert_eq!(requests[1].path, "api/hooks/hook");
    }

    #[tokio::test]
    async fn test_create_at_item_path_with_plain_text_response() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(200, "Successfully created"));
        client.push_json(200, wire());

        let policy = EnginePolicy::default().create_at_item(Method::Put);
        let response = engine(policy)
            .create(&context(&client), planned())
            .await
            .unwrap();

        assert!(response.state.unwrap()["one_time_code"].is_null());
        let requests = client.requests();
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].path, "api/hooks/hook");
    }

    #[tokio::test]
    async fn test_create_validation_failure_makes_no_request() {
        let client = Arc::new(MockClient::new());
        let mut config = planned();
        config["url"] = json!("http://insecure");

        let err = engine(EnginePolicy::default())
            .create(&context(&client), config)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_remote_error_aborts_without_read_back() {
        let client = Arc::new(MockClient::new());
        client.push_json(400, json!({"errors": [{"status": 400, "message": "Bad hook"}]}));

        let err = engine(EnginePolicy::default())
            .create(&context(&client), planned())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Bad hook");
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_after_write_is_error_by_default() {
        let client = Arc::new(MockClient::new());
        client.push_json(201, json!({"code": "once"}));
        client.push_response(ApiResponse::new(404, ""));

        let err = engine(EnginePolicy::default())
            .create(&context(&client), planned())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_after_write_tolerated_with_warning() {
        let client = Arc::new(MockClient::new());
        client.push_json(201, json!({"code": "once"}));
        client.push_response(ApiResponse::new(404, ""));

        let policy = EnginePolicy::default().tolerate_missing_after_write();
        let response = engine(policy)
            .create(&context(&client), planned())
            .await
            .unwrap();

        assert!(!response.has_errors());
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].is_warning());
        let state = response.state.unwrap();
        assert_eq!(state["one_time_code"], "once");
        assert!(state["created_by"].is_null());
    }

    #[tokio::test]
    async fn test_read_not_found_drops_record() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(404, ""));

        let response = engine(EnginePolicy::default())
            .read(&context(&client), json!({"key": "hook"}))
            .await
            .unwrap();
        assert!(response.state.is_none());
        assert!(!response.has_errors());
    }

    #[tokio::test]
    async fn test_read_server_error_is_fatal() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(500, "oops"));

        let err = engine(EnginePolicy::default())
            .read(&context(&client), json!({"key": "hook"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_update_remote_then_reads_back() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(200, ""));
        client.push_json(200, wire());

        let prior = json!({"key": "hook", "url": "https://old", "created_by": "admin"});
        let response = engine(EnginePolicy::default())
            .update(&context(&client), prior, planned())
            .await
            .unwrap();

        assert_eq!(response.state.unwrap()["url"], "https://example.com");
        let requests = client.requests();
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].path, "api/hooks/hook");
    }

    #[tokio::test]
    async fn test_update_state_only_makes_no_request() {
        let client = Arc::new(MockClient::new());
        let prior = json!({"key": "hook", "url": "https://example.com", "created_by": "admin", "one_time_code": "once"});

        let policy = EnginePolicy::default().with_update(UpdateMode::StateOnly);
        let response = engine(policy)
            .update(&context(&client), prior, planned())
            .await
            .unwrap();

        let state = response.state.unwrap();
        assert_eq!(state["created_by"], "admin");
        assert_eq!(state["one_time_code"], "once");
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_delete_tolerates_not_found() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(404, ""));

        let diagnostics = engine(EnginePolicy::default())
            .delete(&context(&client), json!({"key": "hook"}))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(client.requests()[0].method, Method::Delete);
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_not_raised() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(403, "forbidden"));

        let diagnostics = engine(EnginePolicy::default())
            .delete(&context(&client), json!({"key": "hook"}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Failed to delete hook");
    }

    #[tokio::test]
    async fn test_import() {
        let client = Arc::new(MockClient::new());
        client.push_json(200, wire());

        let imported = engine(EnginePolicy::default())
            .import(&context(&client), "hook")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "test_hook");
        assert_eq!(imported[0].state["created_by"], "admin");
    }

    #[tokio::test]
    async fn test_import_missing_object_fails() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(404, ""));

        let err = engine(EnginePolicy::default())
            .import(&context(&client), "gone")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot import non-existent remote object"));
    }

    #[tokio::test]
    async fn test_import_refused() {
        let client = Arc::new(MockClient::new());
        let err = engine(EnginePolicy::default().without_import())
            .import(&context(&client), "hook")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "resource test_hook doesn't support import");
        assert!(client.requests().is_empty());
    }

    #[test]
    fn test_validate_accumulates_schema_and_resource_errors() {
        let diagnostics = engine(EnginePolicy::default()).validate(&json!({
            "key": 42,
            "url": "http://insecure",
        }));
        // The type error on key fails decoding as well.
        assert!(diagnostics.len() >= 2);
        assert!(diagnostics.iter().any(|d| d.attribute.as_deref() == Some("key")));
    }

    #[test]
    fn test_usage_events_are_reported() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(404, ""));
        let (usage, mut receiver) = UsageReporter::channel(8);
        let ctx = ProviderContext::new(client, usage);

        let response = tokio_test::block_on(
            engine(EnginePolicy::default()).read(&ctx, json!({"key": "hook"})),
        )
        .unwrap();
        assert!(response.state.is_none());

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.feature_id(), "Resource/test_hook/READ");
    }
}
