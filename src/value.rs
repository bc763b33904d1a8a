//! Tri-state attribute values.
//!
//! Every attribute exchanged with the host is either unknown (not yet
//! computed), null (absent) or a concrete value. On the JSON boundary null is
//! `null`, a concrete value is its plain JSON encoding, and unknown is the
//! sentinel string [`UNKNOWN_VALUE`].

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Sentinel string the host uses to encode an unknown value.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// An attribute value that may be unknown, null, or known.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tristate<T> {
    /// Not resolved yet; only valid during planning.
    Unknown,
    /// Absent.
    #[default]
    Null,
    /// A concrete value.
    Known(T),
}

impl<T> Tristate<T> {
    /// Returns true if the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if the value is known.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Borrow the concrete value, if any.
    pub fn as_known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Take the concrete value, if any.
    pub fn known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Map the concrete value, keeping unknown and null as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tristate<U> {
        match self {
            Self::Unknown => Tristate::Unknown,
            Self::Null => Tristate::Null,
            Self::Known(v) => Tristate::Known(f(v)),
        }
    }

    /// Unknown becomes null; everything else is unchanged.
    pub fn resolve(self) -> Self {
        match self {
            Self::Unknown => Self::Null,
            other => other,
        }
    }
}

impl<T: Clone> Tristate<T> {
    /// The concrete value, or `default` when unknown or null.
    pub fn value_or(&self, default: T) -> T {
        self.as_known().cloned().unwrap_or(default)
    }
}

impl<T: Default + Clone> Tristate<T> {
    /// The concrete value, or `T::default()` when unknown or null.
    pub fn value_or_default(&self) -> T {
        self.as_known().cloned().unwrap_or_default()
    }
}

impl<T> From<Option<T>> for Tristate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Known(v),
            None => Self::Null,
        }
    }
}

impl<T: Serialize> Serialize for Tristate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unknown => serializer.serialize_str(UNKNOWN_VALUE),
            Self::Null => serializer.serialize_none(),
            Self::Known(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tristate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match raw {
            Value::Null => Ok(Self::Null),
            Value::String(ref s) if s == UNKNOWN_VALUE => Ok(Self::Unknown),
            other => serde_json::from_value(other)
                .map(Self::Known)
                .map_err(D::Error::custom),
        }
    }
}

/// Returns true if the JSON value is the unknown sentinel.
pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNKNOWN_VALUE)
}

/// The unknown sentinel as a JSON value.
pub fn unknown() -> Value {
    Value::String(UNKNOWN_VALUE.to_string())
}

/// Replace every unknown sentinel in `value` with null, recursively.
pub fn resolve_unknowns(value: &mut Value) {
    if is_unknown(value) {
        *value = Value::Null;
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(resolve_unknowns),
        Value::Object(map) => map.values_mut().for_each(resolve_unknowns),
        _ => {}
    }
}

/// Reorder `fresh` so that elements also present in `prior` keep the prior
/// order. Elements only present in `fresh` follow, in their original order.
///
/// Remote systems often return sets in their own order; keeping the
/// configured order avoids spurious diffs.
pub fn reorder_like<T, K: PartialEq>(prior: &[T], fresh: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut remaining: Vec<Option<T>> = fresh.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for p in prior {
        let wanted = key(p);
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|f| key(f) == wanted))
        {
            ordered.extend(slot.take());
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Model {
        name: Tristate<String>,
        count: Tristate<i64>,
        tags: Tristate<Vec<String>>,
    }

    #[test]
    fn test_decode_tristate_fields() {
        let model: Model = serde_json::from_value(json!({
            "name": "repo",
            "count": UNKNOWN_VALUE,
        }))
        .unwrap();

        assert_eq!(model.name, Tristate::Known("repo".to_string()));
        assert!(model.count.is_unknown());
        assert!(model.tags.is_null());
    }

    #[test]
    fn test_encode_tristate_fields() {
        let model = Model {
            name: Tristate::Null,
            count: Tristate::Unknown,
            tags: Tristate::Known(vec!["a".into()]),
        };
        assert_eq!(
            serde_json::to_value(&model).unwrap(),
            json!({"name": null, "count": UNKNOWN_VALUE, "tags": ["a"]})
        );
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let result: Result<Model, _> = serde_json::from_value(json!({"count": "seven"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_helpers() {
        let known: Tristate<i64> = Some(3).into();
        assert_eq!(known.value_or(9), 3);
        assert_eq!(Tristate::<i64>::Unknown.value_or(9), 9);
        assert!(!Tristate::<bool>::Null.value_or_default());
        assert!(Tristate::<i64>::Unknown.resolve().is_null());
        assert_eq!(known.map(|v| v * 2), Tristate::Known(6));
    }

    #[test]
    fn test_resolve_unknowns_recurses() {
        let mut value = json!({
            "a": UNKNOWN_VALUE,
            "b": [UNKNOWN_VALUE, "kept"],
            "c": {"d": UNKNOWN_VALUE},
        });
        resolve_unknowns(&mut value);
        assert_eq!(value, json!({"a": null, "b": [null, "kept"], "c": {"d": null}}));
    }

    #[test]
    fn test_reorder_like_keeps_prior_order() {
        let prior = vec!["c", "a", "b"];
        let fresh = vec!["a", "b", "d", "c"];
        let ordered = reorder_like(&prior, fresh, |s| *s);
        assert_eq!(ordered, vec!["c", "a", "b", "d"]);
    }
}
