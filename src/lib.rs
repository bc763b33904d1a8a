//! Artifactory provider core
//!
//! This crate manages Artifactory, Access and event-service objects through
//! their REST APIs on behalf of a declarative infrastructure host. The host
//! exchanges JSON states; the provider validates them, plans changes, and
//! drives the remote API.
//!
//! # Overview
//!
//! - **Resource engine**: a generic create/read/update/delete/import engine
//!   ([`resource::CrudEngine`]) driven by per-type [`resource::Resource`]
//!   implementations that convert between wire bodies and typed state
//! - **Schema types**: attributes, blocks, validators and diagnostics
//! - **Planning and validation**: schema-driven defaults, replacement and
//!   pre-flight checks
//! - **State upgrades**: versioned migration of persisted state
//! - **ProviderService trait**: the host boundary, implemented by
//!   [`ArtifactoryProvider`]
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use artifactory_provider::{
//!     init_logging, resources, ArtifactoryProvider, ClientOptions, ProviderService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     let provider = ArtifactoryProvider::new(resources::registry()?, ClientOptions::default());
//!     provider
//!         .configure(serde_json::json!({"url": "https://example.jfrog.io"}))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Unknown values
//!
//! States cross the host boundary as JSON. An attribute whose value is not
//! known until apply is encoded as the string [`value::UNKNOWN_VALUE`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod scopes;
pub mod telemetry;
pub mod testing;
pub mod types;
pub mod upgrade;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use client::{ApiRequest, ApiResponse, HttpClient, Method, RestClient};
pub use config::{ClientOptions, Credentials, ProviderConfig, ResolvedConfig};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::plan_resource;
pub use provider::{ArtifactoryProvider, ProviderService};
pub use resource::{
    CrudEngine, DataSource, DataSourceEngine, ProviderContext, Registry, Resource,
};
pub use schema::{Diagnostic, ProviderSchema};
pub use scopes::{join_scopes, split_scopes};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ResourceResponse,
};
pub use upgrade::Upgrader;
pub use validation::{is_valid, validate, validate_result};
pub use value::Tristate;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
