//! Concrete resources and data sources served by the provider.

pub mod archive_policy;
pub mod keypair;
pub mod property_set;
pub mod remote_oci;
pub mod repositories;
pub mod scoped_token;
pub mod webhook;

pub use archive_policy::ArchivePolicy;
pub use keypair::Keypair;
pub use property_set::PropertySet;
pub use remote_oci::RemoteOciRepository;
pub use repositories::{Rclass, RepositoryDataSource};
pub use scoped_token::ScopedToken;
pub use webhook::ArtifactLifecycleCustomWebhook;

use crate::error::ProviderError;
use crate::resource::{CrudEngine, DataSourceEngine, Registry};

/// Register every resource and data source type.
pub fn registry() -> Result<Registry, ProviderError> {
    let builder = Registry::builder()
        .resource(CrudEngine::new(ScopedToken))
        .resource(CrudEngine::new(ArchivePolicy))
        .resource(CrudEngine::new(ArtifactLifecycleCustomWebhook))
        .resource(CrudEngine::new(RemoteOciRepository))
        .resource(CrudEngine::new(PropertySet))
        .resource(CrudEngine::new(Keypair));

    repositories::all()
        .into_iter()
        .fold(builder, |builder, source| {
            builder.data_source(DataSourceEngine::new(source))
        })
        .build()
}
