//! `artifactory_archive_policy`: scheduled archiving of old packages.
//!
//! Policies may belong to a project; the project key then travels as the
//! `projectKey` query parameter on every call.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::resource::{Descriptor, Endpoints, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema, Validator};
use crate::value::{reorder_like, Tristate};

/// Type name.
pub const TYPE_NAME: &str = "artifactory_archive_policy";

const ENDPOINTS: Endpoints = Endpoints::new(
    "artifactory/api/archive/v2/packages/policies",
    "artifactory/api/archive/v2/packages/policies/{policyKey}",
);

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicyState {
    /// Policy key.
    pub key: Tristate<String>,
    /// Owning project, sent as the `projectKey` query parameter.
    pub project_key: Tristate<String>,
    /// Free-form description.
    pub description: Tristate<String>,
    /// Schedule, as a Quartz cron expression.
    pub cron_expression: Tristate<String>,
    /// Maximum run time of one archiving pass.
    pub duration_in_minutes: Tristate<i64>,
    /// Whether the policy runs.
    pub enabled: Tristate<bool>,
    /// Delete archived packages without moving them to the trash can.
    pub skip_trashcan: Tristate<bool>,
    /// Which packages the policy archives.
    pub search_criteria: Tristate<SearchCriteriaState>,
}

/// The `search_criteria` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteriaState {
    /// Package types to match.
    pub package_types: Tristate<Vec<String>>,
    /// Repository patterns to include.
    pub repos: Tristate<Vec<String>>,
    /// Repository patterns to exclude.
    pub excluded_repos: Tristate<Vec<String>>,
    /// Package patterns to include.
    pub included_packages: Tristate<Vec<String>>,
    /// Package patterns to exclude.
    pub excluded_packages: Tristate<Vec<String>>,
    /// Match repositories of every project.
    pub include_all_projects: Tristate<bool>,
    /// Project keys whose repositories are matched.
    pub included_projects: Tristate<Vec<String>>,
    /// Archive packages created this many months ago or earlier.
    pub created_before_in_months: Tristate<i64>,
    /// Archive packages not downloaded for this many months.
    pub last_downloaded_before_in_months: Tristate<i64>,
    /// Versions to keep regardless of age.
    pub keep_last_amount_of_versions: Tristate<i64>,
}

/// Request and response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicyBody {
    key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    project_key: String,
    description: String,
    cron_expression: String,
    duration_in_minutes: i64,
    enabled: bool,
    skip_trashcan: bool,
    search_criteria: SearchCriteriaBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SearchCriteriaBody {
    package_types: Vec<String>,
    repos: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    excluded_repos: Vec<String>,
    included_packages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    excluded_packages: Vec<String>,
    include_all_projects: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    included_projects: Vec<String>,
    created_before_in_months: i64,
    last_downloaded_before_in_months: i64,
    keep_last_amount_of_versions: i64,
}

/// The archive policy resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchivePolicy;

fn string_set(flags: AttributeFlags) -> Attribute {
    Attribute::new(AttributeType::set(AttributeType::String), flags)
}

fn schema() -> Schema {
    let criteria = Block::new()
        .with_attribute(
            "package_types",
            string_set(AttributeFlags::required()).with_validator(Validator::each(Validator::one_of(&[
                "cargo", "cocoapods", "conan", "debian", "docker", "gems", "generic", "go", "gradle", "helm",
                "helmoci", "huggingfaceml", "maven", "npm", "nuget", "oci", "pypi", "terraform", "yum",
            ]))),
        )
        .with_attribute("repos", string_set(AttributeFlags::required()))
        .with_attribute("excluded_repos", string_set(AttributeFlags::optional()))
        .with_attribute("included_packages", string_set(AttributeFlags::required()))
        .with_attribute("excluded_packages", string_set(AttributeFlags::optional()))
        .with_attribute("include_all_projects", Attribute::optional_bool())
        .with_attribute("included_projects", string_set(AttributeFlags::optional()))
        .with_attribute(
            "created_before_in_months",
            Attribute::optional_int64().with_validator(Validator::at_least(0)),
        )
        .with_attribute(
            "last_downloaded_before_in_months",
            Attribute::optional_int64().with_validator(Validator::at_least(0)),
        )
        .with_attribute(
            "keep_last_amount_of_versions",
            Attribute::optional_int64().with_validator(Validator::at_least(0)),
        );

    Schema::v0()
        .with_description("Provides an Artifactory Archive Policy resource.")
        .with_attribute(
            "key",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_at_least(3))
                .with_validator(Validator::matches(
                    r"^[A-Za-z0-9_-]+$",
                    "only letters, numbers, underscore and hyphen are allowed",
                )),
        )
        .with_attribute(
            "project_key",
            Attribute::optional_string().with_force_new().with_validator(Validator::matches(
                r"^[a-z][a-z0-9\-]{1,31}$",
                "must be 2 - 32 lowercase alphanumeric and hyphen characters",
            )),
        )
        .with_attribute("description", Attribute::optional_string())
        .with_attribute("cron_expression", Attribute::required_string())
        .with_attribute(
            "duration_in_minutes",
            Attribute::defaulted_int64(0).with_validator(Validator::at_least(0)),
        )
        .with_attribute("enabled", Attribute::defaulted_bool(true))
        .with_attribute("skip_trashcan", Attribute::defaulted_bool(false))
        .with_block("search_criteria", NestedBlock::single(criteria).with_min_items(1))
}

fn list(values: &Tristate<Vec<String>>) -> Vec<String> {
    values.value_or_default()
}

/// `fresh` in the order of the prior set, so a reordered response is no drift.
fn in_prior_order(prior: &Tristate<Vec<String>>, fresh: Vec<String>) -> Vec<String> {
    let prior = prior.as_known().map(Vec::as_slice).unwrap_or_default();
    reorder_like(prior, fresh, String::clone)
}

fn known_list(values: Vec<String>) -> Tristate<Vec<String>> {
    if values.is_empty() {
        Tristate::Null
    } else {
        Tristate::Known(values)
    }
}

impl Resource for ArchivePolicy {
    type State = ArchivePolicyState;
    type Request = ArchivePolicyBody;
    type Response = ArchivePolicyBody;
    type Created = serde::de::IgnoredAny;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS)
    }

    fn key(&self, state: &ArchivePolicyState) -> Option<String> {
        state.key.as_known().cloned()
    }

    /// `<key>` or `<key>:<project-key>`.
    fn state_from_import_id(&self, id: &str) -> Result<ArchivePolicyState, ProviderError> {
        let (key, project_key) = match id.split_once(':') {
            Some((key, project)) if !key.is_empty() && !project.is_empty() => {
                (key, Tristate::Known(project.to_string()))
            }
            None if !id.is_empty() => (id, Tristate::Null),
            _ => {
                return Err(ProviderError::validation(format!(
                    "unexpected import identifier {:?}, expected <key> or <key>:<project-key>",
                    id
                )))
            }
        };
        Ok(ArchivePolicyState {
            key: Tristate::Known(key.to_string()),
            project_key,
            ..Default::default()
        })
    }

    fn query(&self, state: &ArchivePolicyState) -> Vec<(String, String)> {
        match state.project_key.as_known() {
            Some(project) if !project.is_empty() => vec![("projectKey".to_string(), project.clone())],
            _ => Vec::new(),
        }
    }

    fn validate(&self, state: &ArchivePolicyState) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let Some(criteria) = state.search_criteria.as_known() else {
            return diagnostics;
        };

        if criteria.created_before_in_months.as_known() == Some(&0)
            && criteria.last_downloaded_before_in_months.as_known() == Some(&0)
        {
            diagnostics.push(
                Diagnostic::error(
                    "Both created_before_in_months and last_downloaded_before_in_months cannot be zero at the same time",
                )
                .with_attribute("search_criteria.created_before_in_months"),
            );
        }

        let project_scoped = state.project_key.as_known().is_some_and(|p| !p.is_empty());
        let all_projects = criteria.include_all_projects.as_known() == Some(&true);
        let listed_projects = criteria.included_projects.as_known().is_some_and(|p| !p.is_empty());

        if project_scoped && all_projects {
            diagnostics.push(
                Diagnostic::error("include_all_projects cannot be set when project_key is set")
                    .with_attribute("search_criteria.include_all_projects"),
            );
        }
        if project_scoped && listed_projects {
            diagnostics.push(
                Diagnostic::error("included_projects cannot be set when project_key is set")
                    .with_attribute("search_criteria.included_projects"),
            );
        }
        if all_projects && listed_projects {
            diagnostics.push(
                Diagnostic::error("include_all_projects and included_projects are mutually exclusive")
                    .with_attribute("search_criteria.included_projects"),
            );
        }
        diagnostics
    }

    fn to_wire(&self, state: &ArchivePolicyState) -> Result<ArchivePolicyBody, ProviderError> {
        let criteria = state.search_criteria.as_known().ok_or_else(|| {
            ProviderError::validation("search_criteria is required")
        })?;
        Ok(ArchivePolicyBody {
            key: state.key.value_or_default(),
            project_key: state.project_key.value_or_default(),
            description: state.description.value_or_default(),
            cron_expression: state.cron_expression.value_or_default(),
            duration_in_minutes: state.duration_in_minutes.value_or_default(),
            enabled: state.enabled.value_or(true),
            skip_trashcan: state.skip_trashcan.value_or_default(),
            search_criteria: SearchCriteriaBody {
                package_types: list(&criteria.package_types),
                repos: list(&criteria.repos),
                excluded_repos: list(&criteria.excluded_repos),
                included_packages: list(&criteria.included_packages),
                excluded_packages: list(&criteria.excluded_packages),
                include_all_projects: criteria.include_all_projects.value_or_default(),
                included_projects: list(&criteria.included_projects),
                created_before_in_months: criteria.created_before_in_months.value_or_default(),
                last_downloaded_before_in_months: criteria
                    .last_downloaded_before_in_months
                    .value_or_default(),
                keep_last_amount_of_versions: criteria.keep_last_amount_of_versions.value_or_default(),
            },
        })
    }

    fn from_wire(&self, prior: &ArchivePolicyState, wire: ArchivePolicyBody) -> ArchivePolicyState {
        let prior_criteria = prior.search_criteria.as_known().cloned().unwrap_or_default();
        let criteria = wire.search_criteria;

        // The API omits the project key on some versions; keep the configured one.
        let project_key = if wire.project_key.is_empty() {
            prior.project_key.clone().resolve()
        } else {
            Tristate::Known(wire.project_key)
        };

        ArchivePolicyState {
            key: Tristate::Known(wire.key),
            project_key,
            description: if wire.description.is_empty() && !prior.description.is_known() {
                Tristate::Null
            } else {
                Tristate::Known(wire.description)
            },
            cron_expression: Tristate::Known(wire.cron_expression),
            duration_in_minutes: Tristate::Known(wire.duration_in_minutes),
            enabled: Tristate::Known(wire.enabled),
            skip_trashcan: Tristate::Known(wire.skip_trashcan),
            search_criteria: Tristate::Known(SearchCriteriaState {
                package_types: Tristate::Known(in_prior_order(
                    &prior_criteria.package_types,
                    criteria.package_types,
                )),
                repos: Tristate::Known(in_prior_order(&prior_criteria.repos, criteria.repos)),
                excluded_repos: known_list(in_prior_order(
                    &prior_criteria.excluded_repos,
                    criteria.excluded_repos,
                )),
                included_packages: Tristate::Known(in_prior_order(
                    &prior_criteria.included_packages,
                    criteria.included_packages,
                )),
                excluded_packages: known_list(in_prior_order(
                    &prior_criteria.excluded_packages,
                    criteria.excluded_packages,
                )),
                include_all_projects: if prior_criteria.include_all_projects.is_known()
                    || criteria.include_all_projects
                {
                    Tristate::Known(criteria.include_all_projects)
                } else {
                    Tristate::Null
                },
                included_projects: known_list(in_prior_order(
                    &prior_criteria.included_projects,
                    criteria.included_projects,
                )),
                created_before_in_months: Tristate::Known(criteria.created_before_in_months),
                last_downloaded_before_in_months: Tristate::Known(
                    criteria.last_downloaded_before_in_months,
                ),
                keep_last_amount_of_versions: if prior_criteria.keep_last_amount_of_versions.is_known()
                    || criteria.keep_last_amount_of_versions != 0
                {
                    Tristate::Known(criteria.keep_last_amount_of_versions)
                } else {
                    Tristate::Null
                },
            }),
        }
    }
}
