//! Schema types for describing provider, resource and data source attributes.
//!
//! A [`Schema`] is the static half of a resource descriptor: attribute types,
//! usage flags, defaults, replacement markers and validators. Planning and
//! validation are both driven from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int64,
    /// Boolean.
    Bool,
    /// Ordered collection.
    List(Box<AttributeType>),
    /// Unordered collection of unique values, encoded as a JSON array.
    Set(Box<AttributeType>),
    /// String-keyed map.
    Map(Box<AttributeType>),
    /// Fixed set of named members.
    Object(HashMap<String, AttributeType>),
}

impl AttributeType {
    /// `list(element)`
    pub fn list(element: AttributeType) -> Self {
        Self::List(Box::new(element))
    }

    /// `set(element)`
    pub fn set(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }

    /// `map(element)`
    pub fn map(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }

    /// `object({name: type, ..})`
    pub fn object(members: HashMap<String, AttributeType>) -> Self {
        Self::Object(members)
    }
}

/// Who sets an attribute.
///
/// `optional + computed` means the configuration may set it, and the provider
/// fills it in otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider.
    pub computed: bool,
    /// Hidden from plan output and logs.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Required in configuration.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Optional in configuration.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Read-only, set by the provider.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Optional, with a provider-supplied value when unset.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Also mark as sensitive.
    pub fn sensitive(self) -> Self {
        Self {
            sensitive: true,
            ..self
        }
    }
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Usage flags.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this attribute replaces the remote object.
    #[serde(default)]
    pub force_new: bool,
    /// Default value filled in at plan time when the attribute is null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Value constraints checked during validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
}

impl Attribute {
    /// Attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            validators: Vec::new(),
        }
    }

    fn defaulted(attr_type: AttributeType, default: Value) -> Self {
        Self::new(attr_type, AttributeFlags::optional_computed()).with_default(default)
    }

    /// Required string.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Optional string.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Computed string.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Optional string that falls back to `default`.
    pub fn defaulted_string(default: &str) -> Self {
        Self::defaulted(AttributeType::String, Value::from(default))
    }

    /// Required int64.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Optional int64.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Computed int64.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Optional int64 that falls back to `default`.
    pub fn defaulted_int64(default: i64) -> Self {
        Self::defaulted(AttributeType::Int64, Value::from(default))
    }

    /// Required bool.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// Optional bool.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Computed bool.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Optional bool that falls back to `default`.
    pub fn defaulted_bool(default: bool) -> Self {
        Self::defaulted(AttributeType::Bool, Value::Bool(default))
    }

    /// Optional set of strings.
    pub fn optional_string_set() -> Self {
        Self::new(
            AttributeType::set(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Optional list of strings.
    pub fn optional_string_list() -> Self {
        Self::new(
            AttributeType::list(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Computed list of strings.
    pub fn computed_string_list() -> Self {
        Self::new(
            AttributeType::list(AttributeType::String),
            AttributeFlags::computed(),
        )
    }

    /// Set the documentation.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the remote object when this attribute changes.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set the plan-time default.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags = self.flags.sensitive();
        self
    }

    /// Add a value constraint.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }
}

/// A constraint on a known attribute value.
///
/// Patterns are kept as strings so schemas stay serializable; they are
/// compiled when a value is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validator {
    /// String length (in characters) within `min..=max`.
    LengthBetween {
        /// Inclusive lower bound.
        min: usize,
        /// Inclusive upper bound.
        max: usize,
    },
    /// String length of at least `min` characters.
    LengthAtLeast {
        /// Inclusive lower bound.
        min: usize,
    },
    /// String must match `pattern`; `message` is reported otherwise.
    Matches {
        /// Regular expression.
        pattern: String,
        /// Error summary when the value does not match.
        message: String,
    },
    /// String must be one of `values`.
    OneOf {
        /// Accepted values.
        values: Vec<String>,
    },
    /// Integer must be at least `min`.
    AtLeast {
        /// Inclusive lower bound.
        min: i64,
    },
    /// Apply `validator` to every element of a list or set.
    Each {
        /// Element validator.
        validator: Box<Validator>,
    },
    /// Sibling `attribute` must be set when this one is.
    AlsoRequires {
        /// Sibling attribute name.
        attribute: String,
    },
    /// Sibling `attribute` must be null when this one is set.
    ConflictsWith {
        /// Sibling attribute name.
        attribute: String,
    },
}

impl Validator {
    /// Length between `min` and `max` characters.
    pub fn length_between(min: usize, max: usize) -> Self {
        Self::LengthBetween { min, max }
    }

    /// Length of at least `min` characters.
    pub fn length_at_least(min: usize) -> Self {
        Self::LengthAtLeast { min }
    }

    /// Must match `pattern`.
    pub fn matches(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Matches {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Must be one of `values`.
    pub fn one_of(values: &[&str]) -> Self {
        Self::OneOf {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Must be at least `min`.
    pub fn at_least(min: i64) -> Self {
        Self::AtLeast { min }
    }

    /// Check each element with `validator`.
    pub fn each(validator: Validator) -> Self {
        Self::Each {
            validator: Box::new(validator),
        }
    }

    /// Requires the sibling `attribute`.
    pub fn also_requires(attribute: impl Into<String>) -> Self {
        Self::AlsoRequires {
            attribute: attribute.into(),
        }
    }

    /// Conflicts with the sibling `attribute`.
    pub fn conflicts_with(attribute: impl Into<String>) -> Self {
        Self::ConflictsWith {
            attribute: attribute.into(),
        }
    }
}

/// How a nested block appears in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// One JSON object, or null.
    #[default]
    Single,
    /// JSON array, order significant.
    List,
    /// JSON array, order ignored.
    Set,
}

/// Attributes and nested blocks at one level of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// Attributes by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks by name, e.g. the `handler` blocks of a webhook.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }
}

/// A block nested under a parent, with its nesting mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Contents.
    #[serde(flatten)]
    pub block: Block,
    /// Nesting mode.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of elements; for single blocks, 1 makes it required.
    #[serde(default)]
    pub min_items: u32,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
        }
    }

    /// At most one block.
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single)
    }

    /// Ordered blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List)
    }

    /// Unordered blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set)
    }

    /// Require at least `min` elements.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }
}

/// Schema of one resource or data source type.
///
/// `version` is bumped whenever the persisted shape changes; older states go
/// through [`crate::upgrade::Upgrader`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Persisted state version.
    #[serde(default)]
    pub version: u64,
    /// Top-level block.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add a top-level attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block = self.block.with_attribute(name, attr);
        self
    }

    /// Add a top-level nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block = self.block.with_block(name, block);
        self
    }

    /// Set the documentation.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Names of top-level attributes and blocks, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .block
            .attributes
            .keys()
            .chain(self.block.blocks.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Everything the provider serves, as reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Provider configuration block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas by type name.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
    /// Data source schemas by type name.
    #[serde(default)]
    pub data_sources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// Empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation failed.
    Error,
    /// The operation succeeded with a caveat.
    Warning,
}

/// A message reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: DiagnosticSeverity,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted attribute path, e.g. `handler.0.url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn new(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, summary)
    }

    /// Warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, summary)
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    /// Whether this is a warning.
    pub fn is_warning(&self) -> bool {
        self.severity == DiagnosticSeverity::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required && !required.optional && !required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional && optional_computed.computed);

        assert!(AttributeFlags::computed().sensitive().sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("Repository key")
            .with_force_new()
            .sensitive();
        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required && attr.flags.sensitive);
        assert_eq!(attr.description.as_deref(), Some("Repository key"));
        assert!(attr.force_new);

        let defaulted = Attribute::defaulted_int64(7200)
            .with_validator(Validator::at_least(0));
        assert!(defaulted.flags.optional && defaulted.flags.computed);
        assert_eq!(defaulted.default, Some(json!(7200)));
        assert_eq!(defaulted.validators, vec![Validator::AtLeast { min: 0 }]);
    }

    #[test]
    fn test_validator_serializes_tagged() {
        let validator = Validator::each(Validator::length_between(1, 255));
        assert_eq!(
            serde_json::to_value(&validator).unwrap(),
            json!({
                "kind": "each",
                "validator": {"kind": "length_between", "min": 1, "max": 255}
            })
        );
    }

    #[test]
    fn test_field_names_sorted() {
        let schema = Schema::new(1)
            .with_attribute("key", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_block("handler", NestedBlock::list(Block::new()).with_min_items(1));
        assert_eq!(schema.version, 1);
        assert_eq!(schema.field_names(), vec!["description", "handler", "key"]);
        assert_eq!(schema.block.blocks["handler"].min_items, 1);
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("access_token", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "artifactory_keypair",
                Schema::v0().with_attribute("pair_name", Attribute::required_string()),
            )
            .with_data_source(
                "artifactory_virtual_rpm_repository",
                Schema::v0().with_attribute("key", Attribute::required_string()),
            );

        assert!(provider_schema.provider.block.attributes["access_token"].flags.sensitive);
        assert!(provider_schema.resources.contains_key("artifactory_keypair"));
        assert!(provider_schema
            .data_sources
            .contains_key("artifactory_virtual_rpm_repository"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Scopes length exceeds 500 characters")
            .with_detail("Remove some scopes")
            .with_attribute("scopes");
        assert!(err.is_error() && !err.is_warning());
        assert_eq!(err.detail.as_deref(), Some("Remove some scopes"));
        assert_eq!(err.attribute.as_deref(), Some("scopes"));

        assert!(Diagnostic::warning("deprecated").is_warning());
    }

    #[test]
    fn test_nested_block_defaults_to_optional() {
        let single = NestedBlock::single(Block::new());
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.min_items, 0);
        assert_eq!(NestedBlock::set(Block::new()).nesting_mode, BlockNestingMode::Set);
    }
}
