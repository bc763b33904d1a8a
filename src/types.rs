//! Result types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Diagnostic;

/// One top-level attribute whose value differs between prior and planned
/// state. `None` on either side means null or absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute name.
    pub path: String,
    /// Prior value.
    pub before: Option<Value>,
    /// Planned value.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Change from `before` to `after`.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// The attribute goes away, as on destroy.
    pub fn removed(path: impl Into<String>, before: Value) -> Self {
        Self::new(path, Some(before), None)
    }

    /// Whether the attribute is set for the first time.
    pub fn is_addition(&self) -> bool {
        self.before.is_none() && self.after.is_some()
    }
}

/// Planned state plus the changes that lead to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State after apply, with unknown sentinels for values known only then.
    /// Null on destroy.
    pub planned_state: Value,
    /// Changed attributes, sorted by name.
    pub changes: Vec<AttributeChange>,
    /// A force-new attribute changed.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Nothing to do.
    pub fn no_change(planned_state: Value) -> Self {
        Self::with_changes(planned_state, Vec::new(), false)
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying the plan changes anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// A state produced by import, ready to be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Type name.
    pub resource_type: String,
    /// Imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Imported state of `resource_type`.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Names of the types the provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names, sorted.
    pub resources: Vec<String>,
    /// Data source type names, sorted.
    pub data_sources: Vec<String>,
}

/// Outcome of a create, read, update or data source read.
///
/// `state` is `None` when the record must be dropped from the host's state.
/// Warnings travel alongside a successful state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// New state, or `None` if the remote object is gone.
    pub state: Option<Value>,
    /// Diagnostics collected during the call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourceResponse {
    /// A response carrying a new state.
    pub fn with_state(state: Value) -> Self {
        Self {
            state: Some(state),
            diagnostics: Vec::new(),
        }
    }

    /// A response instructing the host to drop the record.
    pub fn removed() -> Self {
        Self {
            state: None,
            diagnostics: Vec::new(),
        }
    }

    /// Append diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    /// Whether any error diagnostic was reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change() {
        let added = AttributeChange::new("description", None, Some(json!("nightly")));
        assert!(added.is_addition());

        let removed = AttributeChange::removed("description", json!("nightly"));
        assert_eq!(removed.before, Some(json!("nightly")));
        assert!(removed.after.is_none());
        assert!(!removed.is_addition());
    }

    #[test]
    fn test_plan_result() {
        let plan = PlanResult::no_change(json!({"key": "my-policy"}));
        assert!(!plan.has_changes());
        assert!(!plan.requires_replace);

        let plan = PlanResult::with_changes(
            json!({"key": "other-policy"}),
            vec![AttributeChange::new(
                "key",
                Some(json!("my-policy")),
                Some(json!("other-policy")),
            )],
            true,
        );
        assert!(plan.has_changes());
        assert!(plan.requires_replace);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new(
            "artifactory_archive_policy",
            json!({"key": "my-policy"}),
        );
        assert_eq!(imported.resource_type, "artifactory_archive_policy");
        assert_eq!(imported.state["key"], "my-policy");
    }

    #[test]
    fn test_resource_response() {
        let removed =
            ResourceResponse::removed().with_diagnostics([Diagnostic::warning("object is gone")]);
        assert!(removed.state.is_none());
        assert!(!removed.has_errors());

        let failed = ResourceResponse::removed().with_diagnostics([Diagnostic::error("boom")]);
        assert!(failed.has_errors());

        let encoded = serde_json::to_value(ResourceResponse::with_state(json!({"id": "1"}))).unwrap();
        assert_eq!(encoded, json!({"state": {"id": "1"}}));
    }
}
