//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` state or configuration against a
//! [`Schema`]. Every problem found is reported; validation never stops at the
//! first failure. Unknown values are skipped since they cannot be checked
//! until apply time.
//!
//! # Example
//!
//! ```
//! use artifactory_provider::schema::{Attribute, Schema, Validator};
//! use artifactory_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute(
//!         "key",
//!         Attribute::required_string().with_validator(Validator::length_at_least(3)),
//!     )
//!     .with_attribute("count", Attribute::optional_int64());
//!
//! // Valid input
//! let input = json!({
//!     "key": "my-policy",
//!     "count": 42
//! });
//! let diagnostics = validate(&schema, &input);
//! assert!(diagnostics.is_empty());
//!
//! // Invalid input: key too short and wrong type for count
//! let input = json!({
//!     "key": "ab",
//!     "count": "not a number"
//! });
//! let diagnostics = validate(&schema, &input);
//! assert_eq!(diagnostics.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema, Validator,
};
use crate::value::is_unknown;

/// Validate a JSON configuration or state against a schema.
///
/// An empty result means the value is valid. Computed-only attributes and
/// unknown values are not checked; validators run only on values of the
/// right type.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match value {
        Value::Object(map) => validate_block(&schema.block, map, "", &mut diagnostics),
        Value::Null => {}
        other => diagnostics.push(
            Diagnostic::error("Expected object").with_detail(format!("Got {}", type_name(other))),
        ),
    }
    diagnostics
}

/// [`validate`] as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether [`validate`] finds nothing.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(
    block: &Block,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Sorted so diagnostics come out in a stable order
    let mut attributes: Vec<_> = block.attributes.iter().collect();
    attributes.sort_by_key(|(name, _)| *name);
    for (name, attr) in attributes {
        validate_attribute(attr, obj.get(name), obj, &join_path(path, name), diagnostics);
    }

    let mut blocks: Vec<_> = block.blocks.iter().collect();
    blocks.sort_by_key(|(name, _)| *name);
    for (name, nested) in blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    siblings: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }
    match value {
        Some(v) if is_unknown(v) => {}
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            let before = diagnostics.len();
            check_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                for validator in &attr.validators {
                    check_validator(validator, v, siblings, path, diagnostics);
                }
            }
        }
    }
}

static PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(Default::default);

/// Compile `pattern` once per process. Failures are not cached.
fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let mut patterns = PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = patterns.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    patterns.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn check_validator(
    validator: &Validator,
    value: &Value,
    siblings: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let problem = match validator {
        Validator::LengthBetween { min, max } => value
            .as_str()
            .map(|s| s.chars().count())
            .filter(|len| len < min || len > max)
            .map(|len| {
                format!(
                    "Attribute {} string length must be between {} and {}, got: {}",
                    path, min, max, len
                )
            }),
        Validator::LengthAtLeast { min } => value
            .as_str()
            .map(|s| s.chars().count())
            .filter(|len| len < min)
            .map(|len| {
                format!(
                    "Attribute {} string length must be at least {}, got: {}",
                    path, min, len
                )
            }),
        Validator::Matches { pattern, message } => {
            let Some(s) = value.as_str() else { return };
            match compiled(pattern) {
                Ok(re) if re.is_match(s) => None,
                Ok(_) => {
                    diagnostics.push(
                        Diagnostic::error(message.clone())
                            .with_detail(format!("Attribute {} value {:?} is invalid", path, s))
                            .with_attribute(path),
                    );
                    None
                }
                Err(e) => {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid validation pattern for '{}'", path))
                            .with_detail(e.to_string())
                            .with_attribute(path),
                    );
                    None
                }
            }
        }
        Validator::OneOf { values } => value
            .as_str()
            .filter(|s| !values.iter().any(|v| v == s))
            .map(|s| {
                format!(
                    "Attribute {} value must be one of: {:?}, got: {:?}",
                    path, values, s
                )
            }),
        Validator::AtLeast { min } => value
            .as_i64()
            .filter(|n| n < min)
            .map(|n| format!("Attribute {} value must be at least {}, got: {}", path, min, n)),
        Validator::Each { validator } => {
            for (i, item) in value.as_array().into_iter().flatten().enumerate() {
                if !is_unknown(item) {
                    let item_path = format!("{}.{}", path, i);
                    check_validator(validator, item, siblings, &item_path, diagnostics);
                }
            }
            None
        }
        Validator::AlsoRequires { attribute } => siblings
            .get(attribute)
            .map_or(true, Value::is_null)
            .then(|| {
                format!(
                    "Attribute \"{}\" must be specified when \"{}\" is specified",
                    attribute, path
                )
            }),
        Validator::ConflictsWith { attribute } => siblings
            .get(attribute)
            .is_some_and(|v| !v.is_null())
            .then(|| {
                format!(
                    "Attribute \"{}\" cannot be specified when \"{}\" is specified",
                    attribute, path
                )
            }),
    };

    if let Some(summary) = problem {
        diagnostics.push(Diagnostic::error(summary).with_attribute(path));
    }
}

fn check_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let expected = match (attr_type, value) {
        (AttributeType::String, Value::String(_)) | (AttributeType::Bool, Value::Bool(_)) => return,
        (AttributeType::Int64, v) if is_int64(v) => return,
        (AttributeType::List(element) | AttributeType::Set(element), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_type(element, item, &format!("{}.{}", path, i), diagnostics);
            }
            return;
        }
        (AttributeType::Map(element), Value::Object(entries)) => {
            for (key, item) in entries {
                check_type(element, item, &format!("{}.{}", path, key), diagnostics);
            }
            return;
        }
        (AttributeType::Object(members), Value::Object(obj)) => {
            check_members(members, obj, path, diagnostics);
            return;
        }
        (AttributeType::String, _) => "string",
        (AttributeType::Int64, _) => "int64",
        (AttributeType::Bool, _) => "bool",
        (AttributeType::List(_), _) => "list",
        (AttributeType::Set(_), _) => "set",
        (AttributeType::Map(_), _) => "map",
        (AttributeType::Object(_), _) => "object",
    };
    diagnostics.push(type_error(path, expected, value));
}

// Object members carry no flags, so absent members are fine.
fn check_members(
    members: &HashMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, member_type) in members {
        if let Some(value) = obj.get(name) {
            check_type(member_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: Vec<&Value> = match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => Vec::new(),
        (BlockNestingMode::Single, Some(v)) => vec![v],
        (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(items))) => {
            items.iter().collect()
        }
        (_, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(v)))
                    .with_attribute(path),
            );
            return;
        }
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        let summary = match (nested.nesting_mode, value) {
            (BlockNestingMode::Single, _) => format!("Missing required block '{}'", path),
            (_, None | Some(Value::Null)) => format!(
                "Block '{}' requires at least {} item(s)",
                path, nested.min_items
            ),
            _ => format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ),
        };
        diagnostics.push(Diagnostic::error(summary).with_attribute(path));
    }

    let single = nested.nesting_mode == BlockNestingMode::Single;
    for (i, item) in items.into_iter().enumerate() {
        let item_path = if single {
            path.to_string()
        } else {
            format!("{}.{}", path, i)
        };
        match item {
            Value::Object(obj) => validate_block(&nested.block, obj, &item_path, diagnostics),
            other => diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", type_name(other)))
                    .with_attribute(item_path),
            ),
        }
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integers, including floats with no fractional part.
fn is_int64(value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    n.is_i64()
        || n.as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use crate::value::UNKNOWN_VALUE;
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("key", Attribute::required_string());

        assert!(validate(&schema, &json!({"key": "libs-release"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("key".to_string()));

        let diagnostics = validate(&schema, &json!({"key": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("access_token", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"access_token": 123})).is_empty());
    }

    #[test]
    fn test_unknown_values_are_skipped() {
        let schema = Schema::v0()
            .with_attribute(
                "expires_in",
                Attribute::optional_int64().with_validator(Validator::at_least(0)),
            )
            .with_attribute("username", Attribute::required_string());

        let diagnostics = validate(
            &schema,
            &json!({"expires_in": UNKNOWN_VALUE, "username": UNKNOWN_VALUE}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("duration_in_minutes", Attribute::required_int64());

        assert!(validate(&schema, &json!({"duration_in_minutes": 60})).is_empty());
        assert!(validate(&schema, &json!({"duration_in_minutes": 60.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"duration_in_minutes": 60.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"duration_in_minutes": "60"})).len(), 1);
    }

    #[test]
    fn test_validate_set_elements() {
        let schema = Schema::v0().with_attribute(
            "scopes",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        let diagnostics = validate(&schema, &json!({"scopes": ["applied-permissions/user", 7]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("scopes.1".to_string()));

        let diagnostics = validate(&schema, &json!({"scopes": "applied-permissions/user"}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_length_validators() {
        let schema = Schema::v0()
            .with_attribute(
                "key",
                Attribute::required_string().with_validator(Validator::length_at_least(3)),
            )
            .with_attribute(
                "username",
                Attribute::optional_string().with_validator(Validator::length_between(1, 255)),
            );

        let diagnostics = validate(&schema, &json!({"key": "ab", "username": ""}));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[0].summary.contains("string length must be at least 3"));
        assert!(diagnostics[1].summary.contains("between 1 and 255"));
    }

    #[test]
    fn test_matches_validator_reports_message() {
        let schema = Schema::v0().with_attribute(
            "project_key",
            Attribute::optional_string().with_validator(Validator::matches(
                r"^[a-z][a-z0-9\-]{1,31}$",
                "project_key must be 2 - 32 lowercase alphanumeric and hyphen characters",
            )),
        );

        assert!(validate(&schema, &json!({"project_key": "myproj"})).is_empty());

        let diagnostics = validate(&schema, &json!({"project_key": "My Project"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.starts_with("project_key must be"));
        assert_eq!(diagnostics[0].attribute, Some("project_key".to_string()));
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let schema = Schema::v0().with_attribute(
            "name",
            Attribute::optional_string().with_validator(Validator::matches("^(unclosed", "bad name")),
        );

        for _ in 0..2 {
            let diagnostics = validate(&schema, &json!({"name": "anything"}));
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].summary, "Invalid validation pattern for 'name'");
        }
        assert!(compiled(r"^[a-z]+$").is_ok_and(|re| re.is_match("abc")));
    }

    #[test]
    fn test_each_and_one_of() {
        let schema = Schema::v0().with_attribute(
            "event_types",
            Attribute::optional_string_set()
                .with_validator(Validator::each(Validator::one_of(&["archive", "restore"]))),
        );

        assert!(validate(&schema, &json!({"event_types": ["archive"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"event_types": ["archive", "deploy"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("event_types.1".to_string()));
    }

    #[test]
    fn test_sibling_validators() {
        let schema = Schema::v0()
            .with_attribute("external_dependencies_enabled", Attribute::optional_bool())
            .with_attribute(
                "external_dependencies_patterns",
                Attribute::optional_string_list()
                    .with_validator(Validator::also_requires("external_dependencies_enabled")),
            )
            .with_attribute(
                "include_all_projects",
                Attribute::optional_bool().with_validator(Validator::conflicts_with("project_key")),
            )
            .with_attribute("project_key", Attribute::optional_string());

        let diagnostics = validate(
            &schema,
            &json!({
                "external_dependencies_patterns": ["**/github.com/**"],
                "include_all_projects": true,
                "project_key": "proj",
            }),
        );
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_validate_nested_block_list() {
        let schema = Schema::v0().with_block(
            "handler",
            NestedBlock::list(Block::new().with_attribute("url", Attribute::required_string()))
                .with_min_items(1),
        );

        assert!(validate(&schema, &json!({"handler": [{"url": "https://example.com"}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"handler": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(&schema, &json!({"handler": [{"url": 5}]}));
        assert_eq!(diagnostics[0].attribute, Some("handler.0.url".to_string()));
    }

    #[test]
    fn test_validate_nested_block_single() {
        let schema = Schema::v0().with_block(
            "search_criteria",
            NestedBlock::single(
                Block::new().with_attribute("created_before_in_months", Attribute::optional_int64()),
            ),
        );

        assert!(validate(&schema, &json!({})).is_empty());
        let diagnostics =
            validate(&schema, &json!({"search_criteria": {"created_before_in_months": "x"}}));
        assert_eq!(
            diagnostics[0].attribute,
            Some("search_criteria.created_before_in_months".to_string())
        );
    }

    #[test]
    fn test_validate_multiple_errors_accumulate() {
        let schema = Schema::v0()
            .with_attribute("key", Attribute::required_string())
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute("duration_in_minutes", Attribute::required_int64());

        let diagnostics = validate(
            &schema,
            &json!({"key": 1, "enabled": "yes"}),
        );
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_result_helpers() {
        let schema = Schema::v0().with_attribute("key", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"key": "k"})));
        assert!(validate_result(&schema, &json!({"key": "k"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("key", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
