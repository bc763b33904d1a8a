//! Test support: a scripted HTTP client and a provider harness.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use artifactory_provider::testing::{MockClient, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_property_set() {
//!     let client = Arc::new(MockClient::new());
//!     client.push_response(ApiResponse::new(201, "Created"));
//!     client.push_json(200, json!({"name": "qa", "visible": true, "properties": []}));
//!
//!     let tester = ProviderTester::with_client(client.clone()).unwrap();
//!     let state = tester
//!         .lifecycle_create("artifactory_property_set", json!({"name": "qa"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["name"], "qa");
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ApiRequest, ApiResponse, HttpClient};
use crate::error::ProviderError;
use crate::provider::{ArtifactoryProvider, ProviderService};
use crate::resource::ProviderContext;
use crate::resources;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::telemetry::UsageReporter;
use crate::types::{ImportedResource, PlanResult, ResourceResponse};

/// [`HttpClient`] answering from a queue of scripted responses.
///
/// Every request is recorded. When the queue is empty the call fails with a
/// transport error.
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockClient {
    /// A client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push_response(&self, response: ApiResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Queue a JSON response.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(ApiResponse::json_body(status, &body));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ProviderError> {
        let description = format!("{} {}", request.method.as_str(), request.path);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ProviderError::Transport(format!("no scripted response for {}", description)))
    }
}

/// A configured context backed by `client`, with usage reporting disabled.
pub fn mock_context(client: Arc<dyn HttpClient>) -> ProviderContext {
    ProviderContext::new(client, UsageReporter::disabled())
}

/// Drives a [`ProviderService`] the way the host would.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl ProviderTester<ArtifactoryProvider> {
    /// The built-in resources, already configured against `client`.
    ///
    /// Fails if the built-in registry cannot be built.
    pub fn with_client(client: Arc<dyn HttpClient>) -> Result<Self, ProviderError> {
        let registry = resources::registry()?;
        Ok(Self::new(ArtifactoryProvider::with_context(
            registry,
            mock_context(client),
        )))
    }
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Provider schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Configure; error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration; error diagnostics become `Err`.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a create.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan an update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    /// Plan a destroy.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Upgrade a persisted state.
    pub async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .upgrade_resource_state(resource_type, version, state)
            .await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Plan, create, then read. Returns the state after the read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = into_state(self.create(resource_type, plan.planned_state).await?)?;
        into_state(self.read(resource_type, created).await?)
    }

    /// Plan, update, then read. Returns the state after the read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;
        let updated = into_state(
            self.update(resource_type, prior_state, plan.planned_state)
                .await?,
        )?;
        into_state(self.read(resource_type, updated).await?)
    }

    /// Plan a destroy, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), TestError> {
        self.plan_delete(resource_type, current_state.clone())
            .await?;
        let diagnostics = self.delete(resource_type, current_state).await?;
        check_diagnostics(diagnostics)
    }

    /// Create, update, delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, TestError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone())
            .await?;
        Ok(updated)
    }
}

/// Failure of a harness call.
#[derive(Debug)]
pub enum TestError {
    /// The call returned error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The call failed outright.
    Provider(ProviderError),
    /// The call succeeded but the object was gone.
    Removed,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "{} error diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  {}", diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
            TestError::Removed => f.write_str("Object was removed from state"),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn errors_of(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.is_error()).collect()
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<Diagnostic> = errors_of(&diagnostics).into_iter().cloned().collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn into_state(response: ResourceResponse) -> Result<Value, TestError> {
    check_diagnostics(response.diagnostics)?;
    response.state.ok_or(TestError::Removed)
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert the plan creates (changes, no replacement).
///
/// # Panics
///
/// Panics otherwise.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "Expected a create plan, got no changes");
    assert!(!plan.requires_replace, "Expected a create plan, got a replacement");
}

/// Assert the plan has no changes.
///
/// # Panics
///
/// Panics if the plan changes anything.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, got: {:?}",
        changed_paths(plan)
    );
}

/// Assert the plan replaces the resource.
///
/// # Panics
///
/// Panics if it does not.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(plan.requires_replace, "Expected replacement, got an in-place plan");
}

/// Assert the plan updates in place.
///
/// # Panics
///
/// Panics if it replaces.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(!plan.requires_replace, "Expected an in-place update, got a replacement");
}

/// Assert the plan changes `path`.
///
/// # Panics
///
/// Panics if `path` is unchanged.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected '{}' to change; changed: {:?}",
        path,
        changed_paths(plan)
    );
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// Assert there are no error diagnostics.
///
/// # Panics
///
/// Panics on any error diagnostic.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = errors_of(diagnostics);
    assert!(
        errors.is_empty(),
        "Expected no errors, got: {:?}",
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert there is at least one error diagnostic.
///
/// # Panics
///
/// Panics if there is none.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        !errors_of(diagnostics).is_empty(),
        "Expected at least one error, got none"
    );
}

/// Assert some error summary contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = errors_of(diagnostics);
    assert!(
        errors.iter().any(|d| d.summary.contains(substring)),
        "Expected an error containing '{}', got: {:?}",
        substring,
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert some warning summary contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_warning_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_warning() && d.summary.contains(substring)),
        "Expected a warning containing '{}', got: {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use serde_json::json;

    const PROPERTY_SET: &str = "artifactory_property_set";

    fn wire(visible: bool) -> Value {
        json!({
            "name": "qa",
            "visible": visible,
            "properties": [{
                "name": "status",
                "predefinedValues": [{"name": "passed", "defaultValue": true}],
                "closedPredefinedValues": true,
                "multipleChoice": false,
            }],
        })
    }

    fn config(visible: bool) -> Value {
        json!({
            "name": "qa",
            "visible": visible,
            "property": [{
                "name": "status",
                "predefined_value": [{"name": "passed", "default_value": true}],
                "closed_predefined_values": true,
                "multiple_choice": false,
            }],
        })
    }

    #[tokio::test]
    async fn test_mock_client_records_and_runs_dry() {
        let client = MockClient::new();
        client.push_json(200, json!({"ok": true}));

        let response = client.execute(ApiRequest::get("a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(client.remaining(), 0);

        let err = client.execute(ApiRequest::delete("b")).await.unwrap_err();
        assert_eq!(err.to_string(), "Transport error: no scripted response for DELETE b");
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_tester_lists_builtin_types() {
        let tester = ProviderTester::with_client(Arc::new(MockClient::new())).unwrap();
        assert!(tester.resource_types().contains(&PROPERTY_SET.to_string()));
        assert!(tester
            .data_source_types()
            .contains(&"artifactory_virtual_rpm_repository".to_string()));
        assert!(tester.schema().resources.contains_key(PROPERTY_SET));
    }

    #[tokio::test]
    async fn test_tester_plans() {
        let tester = ProviderTester::with_client(Arc::new(MockClient::new())).unwrap();

        let plan = tester.plan_create(PROPERTY_SET, config(true)).await.unwrap();
        assert_plan_creates(&plan);

        let prior = plan.planned_state.clone();
        let plan = tester.plan_update(PROPERTY_SET, prior.clone(), config(true)).await.unwrap();
        assert_plan_no_changes(&plan);

        let plan = tester.plan_update(PROPERTY_SET, prior.clone(), config(false)).await.unwrap();
        assert_plan_changes_attribute(&plan, "visible");
        assert_plan_updates_in_place(&plan);

        let mut renamed = config(true);
        renamed["name"] = json!("other");
        let plan = tester.plan_update(PROPERTY_SET, prior, renamed).await.unwrap();
        assert_plan_replaces(&plan);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(201, "Created"));
        client.push_json(200, wire(true));
        client.push_json(200, wire(true));
        client.push_response(ApiResponse::new(200, ""));
        client.push_json(200, wire(false));
        client.push_json(200, wire(false));
        client.push_response(ApiResponse::new(200, ""));

        let tester = ProviderTester::with_client(client.clone()).unwrap();
        let state = tester
            .lifecycle_crud(PROPERTY_SET, config(true), config(false))
            .await
            .unwrap();

        assert_eq!(state["visible"], false);
        assert_eq!(client.remaining(), 0);
        let methods: Vec<Method> = client.requests().iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![
                Method::Post,
                Method::Get,
                Method::Get,
                Method::Put,
                Method::Get,
                Method::Get,
                Method::Delete
            ]
        );
    }

    #[tokio::test]
    async fn test_tester_surfaces_validation_errors() {
        let tester = ProviderTester::with_client(Arc::new(MockClient::new())).unwrap();
        let mut bad = config(true);
        bad["property"][0]["closed_predefined_values"] = json!(false);
        bad["property"][0]["multiple_choice"] = json!(true);

        match tester.validate_resource_config(PROPERTY_SET, bad).await {
            Err(TestError::Diagnostics(diagnostics)) => {
                assert_error_contains(&diagnostics, "disables multiple_choice")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_assertion_helpers() {
        let diagnostics = vec![
            Diagnostic::warning("Scoped token with ID abc is not found"),
            Diagnostic::error("Invalid configuration value"),
        ];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "configuration");
        assert_warning_contains(&diagnostics, "is not found");
        assert_no_errors(&diagnostics[..1]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("key"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);
        let display = err.to_string();
        assert!(display.contains("First error (at key)"));
        assert!(display.contains("Second error: More info"));
        assert_eq!(TestError::Removed.to_string(), "Object was removed from state");
    }
}
