//! Immutable lookup of resource and data source handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::ProviderContext;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ResourceResponse};

/// Type-erased lifecycle of one resource type.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Type name.
    fn type_name(&self) -> &str;

    /// Current schema.
    fn schema(&self) -> &Schema;

    /// Validate a configuration without network calls.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Plan a change; `prior` is `None` on create.
    fn plan(&self, prior: Option<&Value>, proposed: &Value) -> PlanResult;

    /// Upgrade a state persisted under an older schema version.
    fn upgrade(&self, version: i64, state: Value) -> Result<Value, ProviderError>;

    /// Create the remote object.
    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Refresh state from the remote object.
    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Update the remote object in place.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Delete the remote object. The record is dropped even when
    /// diagnostics are returned.
    async fn delete(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Import an existing object by identifier.
    async fn import(
        &self,
        ctx: &ProviderContext,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;
}

/// Type-erased read of one data source type.
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    /// Type name.
    fn type_name(&self) -> &str;

    /// Schema.
    fn schema(&self) -> &Schema;

    /// Validate a configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Look the object up.
    async fn read(
        &self,
        ctx: &ProviderContext,
        config: Value,
    ) -> Result<ResourceResponse, ProviderError>;
}

/// Every resource and data source the provider serves.
///
/// Built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct Registry {
    resources: BTreeMap<String, Arc<dyn ResourceHandler>>,
    data_sources: BTreeMap<String, Arc<dyn DataSourceHandler>>,
}

impl Registry {
    /// Start collecting handlers.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a resource type.
    pub fn resource(&self, name: &str) -> Result<&Arc<dyn ResourceHandler>, ProviderError> {
        self.resources
            .get(name)
            .ok_or_else(|| ProviderError::UnknownResource(name.to_string()))
    }

    /// Look up a data source type.
    pub fn data_source(&self, name: &str) -> Result<&Arc<dyn DataSourceHandler>, ProviderError> {
        self.data_sources
            .get(name)
            .ok_or_else(|| ProviderError::UnknownResource(name.to_string()))
    }

    /// Resource type names, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    /// Data source type names, sorted.
    pub fn data_source_names(&self) -> Vec<String> {
        self.data_sources.keys().cloned().collect()
    }

    /// Names of everything served.
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resource_names(),
            data_sources: self.data_source_names(),
        }
    }

    /// Schemas of the provider block, resources and data sources.
    pub fn provider_schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, (name, handler)| {
                s.with_resource(name.clone(), handler.schema().clone())
            });
        self.data_sources
            .iter()
            .fold(schema, |s, (name, handler)| {
                s.with_data_source(name.clone(), handler.schema().clone())
            })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects handlers for a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    resources: Vec<Arc<dyn ResourceHandler>>,
    data_sources: Vec<Arc<dyn DataSourceHandler>>,
}

impl RegistryBuilder {
    /// Add a resource handler.
    pub fn resource(mut self, handler: impl ResourceHandler + 'static) -> Self {
        self.resources.push(Arc::new(handler));
        self
    }

    /// Add a data source handler.
    pub fn data_source(mut self, handler: impl DataSourceHandler + 'static) -> Self {
        self.data_sources.push(Arc::new(handler));
        self
    }

    /// Freeze the registry. Type names must be unique per kind.
    pub fn build(self) -> Result<Registry, ProviderError> {
        let mut registry = Registry::default();
        for handler in self.resources {
            let name = handler.type_name().to_string();
            if registry.resources.insert(name.clone(), handler).is_some() {
                return Err(ProviderError::Configuration(format!(
                    "resource type {} registered twice",
                    name
                )));
            }
        }
        for handler in self.data_sources {
            let name = handler.type_name().to_string();
            if registry.data_sources.insert(name.clone(), handler).is_some() {
                return Err(ProviderError::Configuration(format!(
                    "data source type {} registered twice",
                    name
                )));
            }
        }
        Ok(registry)
    }
}
