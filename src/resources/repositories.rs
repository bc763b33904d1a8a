//! Read-only repository data sources.
//!
//! One [`RepositoryDataSource`] per repository class and package type. All of
//! them read `artifactory/api/repositories/{key}` and expose a common set of
//! attributes plus the class and package specific ones.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::resource::DataSource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema, Validator};
use crate::value::Tristate;

const ITEM_PATH: &str = "artifactory/api/repositories/{key}";

/// Repository class, the `rclass` field of the REST model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rclass {
    /// Aggregates other repositories.
    Virtual,
    /// Proxies and caches an external registry.
    Remote,
    /// Mirrored across federation members.
    Federated,
}

impl Rclass {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Virtual => "virtual",
            Self::Remote => "remote",
            Self::Federated => "federated",
        }
    }
}

impl fmt::Display for Rclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    String,
    Bool,
    Int64,
}

/// Package specific attribute and its camelCase wire name.
#[derive(Debug, Clone, Copy)]
struct PackageField {
    attribute: &'static str,
    wire: &'static str,
    kind: FieldKind,
}

const fn field(attribute: &'static str, wire: &'static str, kind: FieldKind) -> PackageField {
    PackageField {
        attribute,
        wire,
        kind,
    }
}

const RETRIEVAL_CACHE: PackageField = field(
    "retrieval_cache_period_seconds",
    "virtualRetrievalCachePeriodSecs",
    FieldKind::Int64,
);
const PRIMARY_KEYPAIR: PackageField =
    field("primary_keypair_ref", "primaryKeyPairRef", FieldKind::String);
const FORCE_CONAN_AUTH: PackageField = field(
    "force_conan_authentication",
    "forceConanAuthentication",
    FieldKind::Bool,
);
const FORCE_NUGET_AUTH: PackageField = field(
    "force_nuget_authentication",
    "forceNugetAuthentication",
    FieldKind::Bool,
);

const VIRTUAL_ALPINE: &[PackageField] = &[PRIMARY_KEYPAIR, RETRIEVAL_CACHE];
const VIRTUAL_CONAN: &[PackageField] = &[RETRIEVAL_CACHE, FORCE_CONAN_AUTH];
const VIRTUAL_DOCKER: &[PackageField] = &[field(
    "resolve_docker_tags_by_timestamp",
    "resolveDockerTagsByTimestamp",
    FieldKind::Bool,
)];
const VIRTUAL_NUGET: &[PackageField] = &[FORCE_NUGET_AUTH];
const VIRTUAL_RPM: &[PackageField] = &[
    PRIMARY_KEYPAIR,
    field("secondary_keypair_ref", "secondaryKeyPairRef", FieldKind::String),
];
const REMOTE_COCOAPODS: &[PackageField] = &[
    field("pods_specs_repo_url", "podsSpecsRepoUrl", FieldKind::String),
    field("vcs_git_provider", "vcsGitProvider", FieldKind::String),
];
const REMOTE_CONAN: &[PackageField] = &[FORCE_CONAN_AUTH];
const REMOTE_NUGET: &[PackageField] = &[
    field("feed_context_path", "feedContextPath", FieldKind::String),
    field("download_context_path", "downloadContextPath", FieldKind::String),
    field("v3_feed_url", "v3FeedUrl", FieldKind::String),
    FORCE_NUGET_AUTH,
];
const FEDERATED_JAVA: &[PackageField] = &[
    field("handle_releases", "handleReleases", FieldKind::Bool),
    field("handle_snapshots", "handleSnapshots", FieldKind::Bool),
    field(
        "suppress_pom_consistency_checks",
        "suppressPomConsistencyChecks",
        FieldKind::Bool,
    ),
    field("checksum_policy_type", "checksumPolicyType", FieldKind::String),
];

/// Every supported repository data source.
pub fn all() -> Vec<RepositoryDataSource> {
    vec![
        RepositoryDataSource::new(Rclass::Virtual, "alpine", VIRTUAL_ALPINE),
        RepositoryDataSource::new(Rclass::Virtual, "conan", VIRTUAL_CONAN),
        RepositoryDataSource::new(Rclass::Virtual, "docker", VIRTUAL_DOCKER),
        RepositoryDataSource::new(Rclass::Virtual, "nuget", VIRTUAL_NUGET),
        RepositoryDataSource::new(Rclass::Virtual, "rpm", VIRTUAL_RPM),
        RepositoryDataSource::new(Rclass::Remote, "cocoapods", REMOTE_COCOAPODS),
        RepositoryDataSource::new(Rclass::Remote, "conan", REMOTE_CONAN),
        RepositoryDataSource::new(Rclass::Remote, "nuget", REMOTE_NUGET),
        RepositoryDataSource::new(Rclass::Federated, "maven", FEDERATED_JAVA),
        RepositoryDataSource::new(Rclass::Federated, "gradle", FEDERATED_JAVA),
        RepositoryDataSource::new(Rclass::Federated, "ivy", FEDERATED_JAVA),
        RepositoryDataSource::new(Rclass::Federated, "sbt", FEDERATED_JAVA),
    ]
}

/// Data source result. Class specific attributes are omitted for other
/// classes; package specific ones live in `package`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryState {
    /// Repository key.
    pub key: Tristate<String>,
    /// Free-form description.
    pub description: Tristate<String>,
    /// Internal notes.
    pub notes: Tristate<String>,
    /// Artifact patterns to include.
    pub includes_pattern: Tristate<String>,
    /// Artifact patterns to exclude.
    pub excludes_pattern: Tristate<String>,
    /// Repository layout.
    pub repo_layout_ref: Tristate<String>,
    /// Owning project.
    pub project_key: Tristate<String>,
    /// Aggregated repositories (virtual).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub repositories: Tristate<Vec<String>>,
    /// Deployment target (virtual).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub default_deployment_repo: Tristate<String>,
    /// Upstream URL (remote).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub url: Tristate<String>,
    /// Upstream username (remote).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub username: Tristate<String>,
    /// Serve only cached artifacts (remote).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub offline: Tristate<bool>,
    /// Federation members (federated).
    #[serde(skip_serializing_if = "Tristate::is_null")]
    pub member: Tristate<Vec<MemberState>>,
    /// Package-specific attributes.
    #[serde(flatten)]
    pub package: Map<String, Value>,
}

/// A federation member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberState {
    /// Member repository URL.
    pub url: String,
    /// Whether the member is enabled.
    pub enabled: bool,
}

/// Repository configuration as returned by the REST API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryBody {
    key: String,
    rclass: String,
    package_type: String,
    description: Option<String>,
    notes: Option<String>,
    includes_pattern: Option<String>,
    excludes_pattern: Option<String>,
    repo_layout_ref: Option<String>,
    project_key: Option<String>,
    repositories: Option<Vec<String>>,
    default_deployment_repo: Option<String>,
    url: Option<String>,
    username: Option<String>,
    offline: Option<bool>,
    members: Option<Vec<MemberState>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Looks up an existing repository of one class and package type.
#[derive(Debug, Clone)]
pub struct RepositoryDataSource {
    type_name: String,
    rclass: Rclass,
    package_type: &'static str,
    fields: &'static [PackageField],
}

impl RepositoryDataSource {
    fn new(rclass: Rclass, package_type: &'static str, fields: &'static [PackageField]) -> Self {
        Self {
            type_name: format!("artifactory_{}_{}_repository", rclass, package_type),
            rclass,
            package_type,
            fields,
        }
    }

    /// Repository class read by this data source.
    pub fn rclass(&self) -> Rclass {
        self.rclass
    }

    /// Package type read by this data source.
    pub fn package_type(&self) -> &str {
        self.package_type
    }
}

impl DataSource for RepositoryDataSource {
    type State = RepositoryState;
    type Response = RepositoryBody;

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::v0()
            .with_description(format!(
                "Provides a data source for a {} {} repository",
                self.rclass, self.package_type
            ))
            .with_attribute(
                "key",
                Attribute::required_string().with_validator(Validator::length_at_least(1)),
            )
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("notes", Attribute::computed_string())
            .with_attribute("includes_pattern", Attribute::computed_string())
            .with_attribute("excludes_pattern", Attribute::computed_string())
            .with_attribute("repo_layout_ref", Attribute::computed_string())
            .with_attribute("project_key", Attribute::computed_string());

        schema = match self.rclass {
            Rclass::Virtual => schema
                .with_attribute("repositories", Attribute::computed_string_list())
                .with_attribute("default_deployment_repo", Attribute::computed_string()),
            Rclass::Remote => schema
                .with_attribute("url", Attribute::computed_string())
                .with_attribute("username", Attribute::computed_string())
                .with_attribute("offline", Attribute::computed_bool()),
            Rclass::Federated => schema.with_attribute(
                "member",
                Attribute::new(
                    AttributeType::list(AttributeType::object(
                        [
                            ("url".to_string(), AttributeType::String),
                            ("enabled".to_string(), AttributeType::Bool),
                        ]
                        .into_iter()
                        .collect(),
                    )),
                    AttributeFlags::computed(),
                ),
            ),
        };

        for field in self.fields {
            let attribute = match field.kind {
                FieldKind::String => Attribute::computed_string(),
                FieldKind::Bool => Attribute::computed_bool(),
                FieldKind::Int64 => Attribute::computed_int64(),
            };
            schema = schema.with_attribute(field.attribute, attribute);
        }
        schema
    }

    fn item_path(&self) -> &'static str {
        ITEM_PATH
    }

    fn key(&self, config: &RepositoryState) -> Option<String> {
        config.key.as_known().cloned()
    }

    fn from_wire(
        &self,
        config: &RepositoryState,
        wire: RepositoryBody,
    ) -> Result<RepositoryState, ProviderError> {
        if wire.rclass != self.rclass.as_str() || wire.package_type != self.package_type {
            return Err(ProviderError::validation(format!(
                "repository '{}' is a {} {} repository, not {} {}",
                config.key.value_or_default(),
                wire.rclass,
                wire.package_type,
                self.rclass,
                self.package_type
            )));
        }

        let package = self
            .fields
            .iter()
            .map(|field| {
                let value = wire.extra.get(field.wire).cloned().unwrap_or(Value::Null);
                (field.attribute.to_string(), value)
            })
            .collect();

        let mut state = RepositoryState {
            key: Tristate::Known(wire.key),
            description: wire.description.into(),
            notes: wire.notes.into(),
            includes_pattern: wire.includes_pattern.into(),
            excludes_pattern: wire.excludes_pattern.into(),
            repo_layout_ref: wire.repo_layout_ref.into(),
            project_key: wire.project_key.into(),
            package,
            ..Default::default()
        };
        match self.rclass {
            Rclass::Virtual => {
                state.repositories = Tristate::Known(wire.repositories.unwrap_or_default());
                state.default_deployment_repo =
                    Tristate::Known(wire.default_deployment_repo.unwrap_or_default());
            }
            Rclass::Remote => {
                state.url = Tristate::Known(wire.url.unwrap_or_default());
                state.username = Tristate::Known(wire.username.unwrap_or_default());
                state.offline = Tristate::Known(wire.offline.unwrap_or_default());
            }
            Rclass::Federated => {
                state.member = Tristate::Known(wire.members.unwrap_or_default());
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::client::Method;
    use crate::resource::{DataSourceEngine, DataSourceHandler};
    use crate::testing::{mock_context, MockClient};

    fn source(type_name: &str) -> RepositoryDataSource {
        all()
            .into_iter()
            .find(|s| s.type_name() == type_name)
            .unwrap()
    }

    #[test]
    fn test_type_names() {
        let names: Vec<String> = all().iter().map(|s| s.type_name().to_string()).collect();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"artifactory_virtual_rpm_repository".to_string()));
        assert!(names.contains(&"artifactory_remote_cocoapods_repository".to_string()));
        assert!(names.contains(&"artifactory_federated_sbt_repository".to_string()));
    }

    #[test]
    fn test_schema_follows_class() {
        let rpm = source("artifactory_virtual_rpm_repository").schema();
        assert!(rpm.block.attributes.contains_key("repositories"));
        assert!(rpm.block.attributes.contains_key("secondary_keypair_ref"));
        assert!(!rpm.block.attributes.contains_key("url"));

        let nuget = source("artifactory_remote_nuget_repository").schema();
        assert!(nuget.block.attributes.contains_key("v3_feed_url"));
        assert!(!nuget.block.attributes.contains_key("member"));
    }

    #[tokio::test]
    async fn test_read_virtual_repository() {
        let client = Arc::new(MockClient::new());
        client.push_json(
            200,
            json!({
                "key": "rpm-virtual",
                "rclass": "virtual",
                "packageType": "rpm",
                "description": "rpm repos",
                "repoLayoutRef": "simple-default",
                "repositories": ["rpm-local", "rpm-remote"],
                "primaryKeyPairRef": "signing",
                "virtualRetrievalCachePeriodSecs": 600,
            }),
        );
        let engine = DataSourceEngine::new(source("artifactory_virtual_rpm_repository"));

        let response = engine
            .read(&mock_context(client.clone()), json!({"key": "rpm-virtual"}))
            .await
            .unwrap();
        let state = response.state.unwrap();
        assert_eq!(state["description"], "rpm repos");
        assert_eq!(state["repositories"], json!(["rpm-local", "rpm-remote"]));
        assert_eq!(state["primary_keypair_ref"], "signing");
        assert_eq!(state["secondary_keypair_ref"], Value::Null);
        assert_eq!(state["default_deployment_repo"], "");
        assert!(state.get("url").is_none());
        assert!(state.get("virtualRetrievalCachePeriodSecs").is_none());

        let requests = client.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].path, "artifactory/api/repositories/rpm-virtual");
    }

    #[tokio::test]
    async fn test_read_federated_members() {
        let client = Arc::new(MockClient::new());
        client.push_json(
            200,
            json!({
                "key": "maven-fed",
                "rclass": "federated",
                "packageType": "maven",
                "members": [{"url": "https://other/artifactory/maven-fed", "enabled": true}],
                "handleSnapshots": false,
            }),
        );
        let engine = DataSourceEngine::new(source("artifactory_federated_maven_repository"));

        let state = engine
            .read(&mock_context(client), json!({"key": "maven-fed"}))
            .await
            .unwrap()
            .state
            .unwrap();
        assert_eq!(state["member"][0]["enabled"], true);
        assert_eq!(state["handle_snapshots"], false);
    }

    #[tokio::test]
    async fn test_mismatched_package_type_fails() {
        let client = Arc::new(MockClient::new());
        client.push_json(
            200,
            json!({"key": "conan-remote", "rclass": "remote", "packageType": "nuget"}),
        );
        let engine = DataSourceEngine::new(source("artifactory_remote_conan_repository"));

        let err = engine
            .read(&mock_context(client), json!({"key": "conan-remote"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("remote nuget repository, not remote conan"));
    }

    #[tokio::test]
    async fn test_missing_repository_has_no_state() {
        let client = Arc::new(MockClient::new());
        client.push_json(404, json!({"errors": [{"status": 404, "message": "not found"}]}));
        let engine = DataSourceEngine::new(source("artifactory_virtual_docker_repository"));

        let response = engine
            .read(&mock_context(client), json!({"key": "missing"}))
            .await
            .unwrap();
        assert!(response.state.is_none());
        assert!(response.diagnostics.is_empty());
    }
}
