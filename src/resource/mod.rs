//! The resource abstraction every concrete type plugs into.
//!
//! A concrete type implements [`Resource`]: typed state and wire models plus
//! the conversions between them. [`CrudEngine`] supplies the lifecycle
//! (validate, plan, create, read, update, delete, import, upgrade) once for
//! all of them, steered by the static [`Descriptor`] each type returns.
//!
//! Read-only types implement [`DataSource`] and run through
//! [`DataSourceEngine`].

mod engine;
mod registry;

pub use engine::{CrudEngine, DataSourceEngine};
pub use registry::{DataSourceHandler, Registry, RegistryBuilder, ResourceHandler};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{HttpClient, Method};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::telemetry::UsageReporter;
use crate::upgrade::Upgrader;

/// REST paths of a resource type.
///
/// `item` holds one `{placeholder}` substituted with the object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Path used to create objects when the key is assigned remotely.
    pub collection: &'static str,
    /// Path addressing one object.
    pub item: &'static str,
}

impl Endpoints {
    /// Endpoints with distinct collection and item paths.
    pub const fn new(collection: &'static str, item: &'static str) -> Self {
        Self { collection, item }
    }
}

/// Where the create request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTarget {
    /// The collection path.
    Collection,
    /// The item path of the planned key.
    Item,
}

/// How in-place updates are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Send the request to the item path with this method, then re-read.
    Remote(Method),
    /// Only local toggles can change in place; write the plan to state.
    StateOnly,
}

/// Per-type switches of the generic lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePolicy {
    /// Method of the create request.
    pub create_method: Method,
    /// Path of the create request.
    pub create_target: CreateTarget,
    /// Update behavior.
    pub update: UpdateMode,
    /// Whether import is supported.
    pub importable: bool,
    /// A 404 on the read that follows a write is a warning, not an error.
    pub tolerate_missing_after_write: bool,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            create_method: Method::Post,
            create_target: CreateTarget::Collection,
            update: UpdateMode::Remote(Method::Put),
            importable: true,
            tolerate_missing_after_write: false,
        }
    }
}

impl EnginePolicy {
    /// Create with `method` on the item path (e.g. `PUT repositories/{key}`).
    pub fn create_at_item(mut self, method: Method) -> Self {
        self.create_method = method;
        self.create_target = CreateTarget::Item;
        self
    }

    /// Set the update mode.
    pub fn with_update(mut self, update: UpdateMode) -> Self {
        self.update = update;
        self
    }

    /// Refuse import.
    pub fn without_import(mut self) -> Self {
        self.importable = false;
        self
    }

    /// Accept a 404 on the read-back after a write.
    pub fn tolerate_missing_after_write(mut self) -> Self {
        self.tolerate_missing_after_write = true;
        self
    }
}

/// Static description of one resource type.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Type name, e.g. `artifactory_keypair`.
    pub type_name: &'static str,
    /// Attribute schema.
    pub schema: Schema,
    /// REST paths.
    pub endpoints: Endpoints,
    /// Lifecycle switches.
    pub policy: EnginePolicy,
    /// State upgrades ending at `schema.version`.
    pub upgrader: Upgrader,
}

impl Descriptor {
    /// A descriptor with the default policy and no upgrade steps.
    pub fn new(type_name: &'static str, schema: Schema, endpoints: Endpoints) -> Self {
        let upgrader = Upgrader::new(schema.version);
        Self {
            type_name,
            schema,
            endpoints,
            policy: EnginePolicy::default(),
            upgrader,
        }
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the upgrader.
    pub fn with_upgrader(mut self, upgrader: Upgrader) -> Self {
        self.upgrader = upgrader;
        self
    }
}

/// What lifecycle calls need once the provider is configured.
#[derive(Clone)]
pub struct ProviderContext {
    /// REST client.
    pub client: Arc<dyn HttpClient>,
    /// Usage event sink.
    pub usage: UsageReporter,
}

impl ProviderContext {
    /// Create a context.
    pub fn new(client: Arc<dyn HttpClient>, usage: UsageReporter) -> Self {
        Self { client, usage }
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

/// A resource type managed through the generic lifecycle.
///
/// Conversions are pure. `from_wire` receives the prior state so write-only
/// attributes (secrets the API never returns) can be carried over.
pub trait Resource: Send + Sync + 'static {
    /// Typed state; every field is a [`Tristate`](crate::value::Tristate).
    type State: Serialize + DeserializeOwned + Clone + Send + Sync;
    /// Body of create and update requests.
    type Request: Serialize + Send;
    /// Body of the read response.
    type Response: DeserializeOwned + Send;
    /// Body of the create response; `serde::de::IgnoredAny` when unused.
    type Created: DeserializeOwned + Send;

    /// Static description of the type.
    fn descriptor(&self) -> Descriptor;

    /// Key addressing the remote object, once known.
    fn key(&self, state: &Self::State) -> Option<String>;

    /// Build a key-only state from an import identifier.
    fn state_from_import_id(&self, id: &str) -> Result<Self::State, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "cannot parse import identifier {:?}",
            id
        )))
    }

    /// Query parameters sent with every request for this object.
    fn query(&self, _state: &Self::State) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Cross-attribute checks beyond the schema validators.
    fn validate(&self, _state: &Self::State) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Build the request body.
    fn to_wire(&self, state: &Self::State) -> Result<Self::Request, ProviderError>;

    /// Merge a read response into `prior`.
    fn from_wire(&self, prior: &Self::State, wire: Self::Response) -> Self::State;

    /// Record fields the create response returns only once.
    fn apply_created(&self, _state: &mut Self::State, _created: Self::Created) {}

    /// Diagnostics when a read finds the object gone.
    fn on_missing(&self, _state: &Self::State) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Diagnostics when the read following a write finds nothing; only
    /// consulted when the policy tolerates it.
    fn on_missing_after_write(&self, _state: &Self::State) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Diagnostic for a failed delete.
    fn delete_failed(&self, key: &str, err: &ProviderError) -> Diagnostic {
        Diagnostic::error(format!("Failed to delete {}", key)).with_detail(err.to_string())
    }
}

/// A read-only type backed by one GET.
pub trait DataSource: Send + Sync + 'static {
    /// Typed configuration and result.
    type State: Serialize + DeserializeOwned + Clone + Send + Sync;
    /// Body of the read response.
    type Response: DeserializeOwned + Send;

    /// Type name, e.g. `artifactory_virtual_rpm_repository`.
    fn type_name(&self) -> &str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Item path with one `{placeholder}`.
    fn item_path(&self) -> &'static str;

    /// Key of the object to look up.
    fn key(&self, config: &Self::State) -> Option<String>;

    /// Merge the response into the configuration. Fails when the object
    /// exists but does not belong to this type.
    fn from_wire(&self, config: &Self::State, wire: Self::Response)
        -> Result<Self::State, ProviderError>;
}
