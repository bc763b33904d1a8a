//! Host-facing provider.
//!
//! [`ProviderService`] is the boundary the plugin host drives: JSON states
//! in, JSON states and diagnostics out. [`ArtifactoryProvider`] implements
//! it by dispatching every call through an immutable [`Registry`] and the
//! [`ProviderContext`] built during `configure`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ApiRequest, HttpClient, RestClient};
use crate::config::{process_env, ClientOptions, ProviderConfig};
use crate::error::ProviderError;
use crate::resource::{ProviderContext, Registry};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::telemetry::UsageReporter;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ResourceResponse};

/// Operations the plugin host invokes.
///
/// # Example
///
/// ```ignore
/// use artifactory_provider::{resources, ArtifactoryProvider, ClientOptions, ProviderService};
///
/// let provider = ArtifactoryProvider::new(resources::registry()?, ClientOptions::default());
/// let diagnostics = provider.configure(serde_json::json!({
///     "url": "https://myinstance.jfrog.io",
///     "access_token": "...",
/// })).await?;
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Schemas of the provider block, resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Names of resources and data sources, sorted.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        let mut resources: Vec<String> = schema.resources.keys().cloned().collect();
        let mut data_sources: Vec<String> = schema.data_sources.keys().cloned().collect();
        resources.sort();
        data_sources.sort();
        ProviderMetadata {
            resources,
            data_sources,
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider block before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure credentials and the HTTP client.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade a persisted state to the current schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan a change.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Refresh a resource. A `None` state means the object is gone.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Update a resource in place.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Delete a resource. The record is dropped regardless of the returned
    /// diagnostics.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Import an existing object.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "resource {} doesn't support import",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        let _ = config;
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

/// License types accepted by `check_license`.
const SUPPORTED_LICENSES: [&str; 3] = ["Enterprise", "Commercial", "Edge"];

#[derive(Deserialize)]
struct LicenseInfo {
    #[serde(rename = "type", default)]
    license_type: String,
}

/// The Artifactory provider.
pub struct ArtifactoryProvider {
    registry: Registry,
    options: ClientOptions,
    context: RwLock<Option<ProviderContext>>,
}

impl ArtifactoryProvider {
    /// A provider that builds its HTTP client on `configure`.
    pub fn new(registry: Registry, options: ClientOptions) -> Self {
        Self {
            registry,
            options,
            context: RwLock::new(None),
        }
    }

    /// A provider that is already configured with `context`.
    pub fn with_context(registry: Registry, context: ProviderContext) -> Self {
        Self {
            registry,
            options: ClientOptions::default(),
            context: RwLock::new(Some(context)),
        }
    }

    /// The registry calls are dispatched through.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn context(&self) -> Result<ProviderContext, ProviderError> {
        self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    async fn check_license(client: &dyn HttpClient) -> Vec<Diagnostic> {
        let response = match client.execute(ApiRequest::get("artifactory/api/system/license")).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => return response.into_error().into_diagnostics(),
            Err(err) => return err.into_diagnostics(),
        };
        match response.json::<LicenseInfo>() {
            Ok(info) if SUPPORTED_LICENSES.iter().any(|t| info.license_type.contains(t)) => {
                debug!(license = %info.license_type, "License accepted");
                Vec::new()
            }
            Ok(info) => vec![Diagnostic::error("Unsupported Artifactory license").with_detail(
                format!(
                    "Artifactory requires one of the {:?} licenses, found {:?}.",
                    SUPPORTED_LICENSES, info.license_type
                ),
            )],
            Err(err) => err.into_diagnostics(),
        }
    }
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[async_trait::async_trait]
impl ProviderService for ArtifactoryProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.provider_schema()
    }

    fn metadata(&self) -> ProviderMetadata {
        self.registry.metadata()
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = crate::validation::validate(&ProviderConfig::schema(), &config);
        diagnostics.extend(ProviderConfig::from_value(&config)?.validate());
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(&config)?;
        let (resolved, mut diagnostics) = config.resolve(process_env);
        let Some(resolved) = resolved else {
            warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
            return Ok(diagnostics);
        };

        let client: Arc<dyn HttpClient> = Arc::new(RestClient::new(
            &resolved.url,
            &resolved.credentials,
            &self.options,
        )?);

        if resolved.check_license {
            diagnostics.extend(Self::check_license(client.as_ref()).await);
            if has_errors(&diagnostics) {
                warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
                return Ok(diagnostics);
            }
        }

        let usage = UsageReporter::spawn(
            client.clone(),
            self.options.product_id.clone(),
            self.options.usage_queue_capacity,
        );
        *self.context.write().await = Some(ProviderContext::new(client, usage));
        info!(url = %resolved.url, "Configure completed successfully");
        Ok(diagnostics)
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        // Dropping the context closes the usage queue and ends its consumer.
        self.context.write().await.take();
        info!("Stop completed successfully");
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.registry.resource(resource_type)?.validate(&config);
        if has_errors(&diagnostics) {
            warn!(resource_type, diagnostics = diagnostics.len(), "ValidateResourceConfig completed with errors");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, state), name = "provider.upgrade_resource_state")]
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let result = self.registry.resource(resource_type)?.upgrade(version, state);
        match &result {
            Ok(_) => info!(resource_type, from_version = version, "UpgradeResourceState completed"),
            Err(e) => error!(resource_type, version, error = %e, "UpgradeResourceState failed"),
        }
        result
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let plan = self
            .registry
            .resource(resource_type)?
            .plan(prior_state.as_ref(), &proposed_state);
        info!(
            resource_type,
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Plan completed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        info!(resource_type, "Create called");
        let handler = self.registry.resource(resource_type)?;
        let ctx = self.context().await?;
        let result = handler.create(&ctx, planned_state).await;
        match &result {
            Ok(_) => info!(resource_type, "Create completed successfully"),
            Err(e) => error!(resource_type, error = %e, "Create failed"),
        }
        result
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        let handler = self.registry.resource(resource_type)?;
        let ctx = self.context().await?;
        let result = handler.read(&ctx, current_state).await;
        if let Err(e) = &result {
            error!(resource_type, error = %e, "Read failed");
        }
        result
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        info!(resource_type, "Update called");
        let handler = self.registry.resource(resource_type)?;
        let ctx = self.context().await?;
        let result = handler.update(&ctx, prior_state, planned_state).await;
        match &result {
            Ok(_) => info!(resource_type, "Update completed successfully"),
            Err(e) => error!(resource_type, error = %e, "Update failed"),
        }
        result
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        info!(resource_type, "Delete called");
        let handler = self.registry.resource(resource_type)?;
        let ctx = self.context().await?;
        let result = handler.delete(&ctx, current_state).await;
        match &result {
            Ok(diagnostics) if has_errors(diagnostics) => {
                warn!(resource_type, "Delete completed with errors")
            }
            Ok(_) => info!(resource_type, "Delete completed successfully"),
            Err(e) => error!(resource_type, error = %e, "Delete failed"),
        }
        result
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        info!(resource_type, id, "ImportResourceState called");
        let handler = self.registry.resource(resource_type)?;
        let ctx = self.context().await?;
        let result = handler.import(&ctx, id).await;
        match &result {
            Ok(imported) => info!(resource_type, id, count = imported.len(), "ImportResourceState completed"),
            Err(e) => error!(resource_type, id, error = %e, "ImportResourceState failed"),
        }
        result
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.registry.data_source(data_source_type)?.validate(&config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        let handler = self.registry.data_source(data_source_type)?;
        let ctx = self.context().await?;
        let result = handler.read(&ctx, config).await;
        match &result {
            Ok(_) => info!(data_source_type, "ReadDataSource completed successfully"),
            Err(e) => error!(data_source_type, error = %e, "ReadDataSource failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::resources;
    use crate::testing::MockClient;
    use serde_json::json;

    fn provider(client: &Arc<MockClient>) -> ArtifactoryProvider {
        let ctx = ProviderContext::new(client.clone(), UsageReporter::disabled());
        ArtifactoryProvider::with_context(resources::registry().unwrap(), ctx)
    }

    #[tokio::test]
    async fn test_unconfigured_provider_rejects_calls() {
        let provider = ArtifactoryProvider::new(resources::registry().unwrap(), ClientOptions::default());
        let err = provider
            .read("artifactory_keypair", json!({"pair_name": "k"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let client = Arc::new(MockClient::new());
        let err = provider(&client)
            .create("artifactory_nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_and_schema_agree() {
        let client = Arc::new(MockClient::new());
        let provider = provider(&client);
        let metadata = provider.metadata();
        let schema = provider.schema();

        assert!(metadata.resources.contains(&"artifactory_scoped_token".to_string()));
        assert_eq!(metadata.resources.len(), schema.resources.len());
        assert_eq!(metadata.data_sources.len(), schema.data_sources.len());
        assert_eq!(schema.resources["artifactory_scoped_token"].version, 1);
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let client = Arc::new(MockClient::new());
        let diagnostics = provider(&client)
            .validate_provider_config(json!({"url": "ftp://nope", "api_key": "k"}))
            .await
            .unwrap();
        assert!(has_errors(&diagnostics));
        assert!(diagnostics
            .iter()
            .any(|d| d.is_warning()));
    }

    #[tokio::test]
    async fn test_check_license() {
        let client = MockClient::new();
        client.push_json(200, json!({"type": "Enterprise Plus"}));
        assert!(ArtifactoryProvider::check_license(&client).await.is_empty());

        client.push_json(200, json!({"type": "OSS"}));
        let diagnostics = ArtifactoryProvider::check_license(&client).await;
        assert_eq!(diagnostics[0].summary, "Unsupported Artifactory license");
    }

    #[tokio::test]
    async fn test_stop_clears_context() {
        let client = Arc::new(MockClient::new());
        let provider = provider(&client);
        provider.stop().await.unwrap();
        let err = provider
            .read("artifactory_keypair", json!({"pair_name": "k"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_read_dispatches_through_registry() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(404, ""));
        let response = provider(&client)
            .read("artifactory_property_set", json!({"name": "set"}))
            .await
            .unwrap();
        assert!(response.state.is_none());
        assert_eq!(client.requests()[0].path, "artifactory/api/propertysets/set");
    }
}
