//! `artifactory_property_set`: named groups of properties with predefined
//! values.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::resource::{Descriptor, Endpoints, Resource};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema, Validator};
use crate::value::{reorder_like, Tristate};

/// Type name.
pub const TYPE_NAME: &str = "artifactory_property_set";

const ENDPOINTS: Endpoints = Endpoints::new(
    "artifactory/api/propertysets",
    "artifactory/api/propertysets/{name}",
);

/// Persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySetState {
    /// Property set name.
    pub name: Tristate<String>,
    /// Whether the set is visible in the UI.
    pub visible: Tristate<bool>,
    /// Properties in the set.
    pub property: Tristate<Vec<PropertyState>>,
}

/// One `property` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyState {
    /// Property name.
    pub name: Tristate<String>,
    /// Allowed values.
    pub predefined_value: Tristate<Vec<PredefinedValueState>>,
    /// Only predefined values may be used.
    pub closed_predefined_values: Tristate<bool>,
    /// More than one value may be selected.
    pub multiple_choice: Tristate<bool>,
}

/// One `predefined_value` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredefinedValueState {
    /// The predefined value.
    pub name: Tristate<String>,
    /// Selected by default.
    pub default_value: Tristate<bool>,
}

/// Request and response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySetBody {
    name: String,
    visible: bool,
    properties: Vec<PropertyBody>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PropertyBody {
    name: String,
    predefined_values: Vec<PredefinedValueBody>,
    closed_predefined_values: bool,
    multiple_choice: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PredefinedValueBody {
    name: String,
    default_value: bool,
}

/// The property set resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertySet;

fn schema() -> Schema {
    let predefined_value = Block::new()
        .with_attribute(
            "name",
            Attribute::required_string().with_validator(Validator::length_at_least(1)),
        )
        .with_attribute(
            "default_value",
            Attribute::required_bool().with_description("Whether the value is selected by default in the UI."),
        );

    let property = Block::new()
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_validator(Validator::length_at_least(1))
                .with_validator(Validator::matches(
                    r"^[^\s]+$",
                    "Property name cannot contain whitespace",
                )),
        )
        .with_attribute("closed_predefined_values", Attribute::defaulted_bool(false))
        .with_attribute("multiple_choice", Attribute::defaulted_bool(false))
        .with_block("predefined_value", NestedBlock::set(predefined_value).with_min_items(1));

    Schema::v0()
        .with_description("Provides an Artifactory Property Set resource.")
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::length_at_least(1))
                .with_validator(Validator::matches(
                    r"^[a-zA-Z][a-zA-Z0-9_\-.]*$",
                    "Must start with a letter and contain only letters, digits, '-', '_' and '.'",
                )),
        )
        .with_attribute(
            "visible",
            Attribute::defaulted_bool(false)
                .with_description("Defines if the list visible and assignable to the repository or artifact."),
        )
        .with_block("property", NestedBlock::set(property).with_min_items(1))
}

impl Resource for PropertySet {
    type State = PropertySetState;
    type Request = PropertySetBody;
    type Response = PropertySetBody;
    type Created = serde::de::IgnoredAny;

    fn descriptor(&self) -> Descriptor {
        Descriptor::new(TYPE_NAME, schema(), ENDPOINTS)
    }

    fn key(&self, state: &PropertySetState) -> Option<String> {
        state.name.as_known().cloned()
    }

    fn state_from_import_id(&self, id: &str) -> Result<PropertySetState, ProviderError> {
        Ok(PropertySetState {
            name: Tristate::Known(id.to_string()),
            ..Default::default()
        })
    }

    fn validate(&self, state: &PropertySetState) -> Vec<Diagnostic> {
        state
            .property
            .as_known()
            .into_iter()
            .flatten()
            .enumerate()
            .filter(|(_, p)| {
                p.closed_predefined_values.as_known() == Some(&false)
                    && p.multiple_choice.as_known() == Some(&true)
            })
            .map(|(i, _)| {
                Diagnostic::error(
                    "Setting closed_predefined_values to 'false' and multiple_choice to 'true' disables multiple_choice",
                )
                .with_attribute(format!("property.{}.multiple_choice", i))
            })
            .collect()
    }

    fn to_wire(&self, state: &PropertySetState) -> Result<PropertySetBody, ProviderError> {
        let properties = state
            .property
            .as_known()
            .into_iter()
            .flatten()
            .map(|p| PropertyBody {
                name: p.name.value_or_default(),
                predefined_values: p
                    .predefined_value
                    .as_known()
                    .into_iter()
                    .flatten()
                    .map(|v| PredefinedValueBody {
                        name: v.name.value_or_default(),
                        default_value: v.default_value.value_or_default(),
                    })
                    .collect(),
                closed_predefined_values: p.closed_predefined_values.value_or_default(),
                multiple_choice: p.multiple_choice.value_or_default(),
            })
            .collect();

        Ok(PropertySetBody {
            name: state.name.value_or_default(),
            visible: state.visible.value_or_default(),
            properties,
        })
    }

    fn from_wire(&self, prior: &PropertySetState, wire: PropertySetBody) -> PropertySetState {
        let prior_properties = prior.property.as_known().map(Vec::as_slice).unwrap_or_default();

        let properties: Vec<PropertyState> = wire
            .properties
            .into_iter()
            .map(|p| {
                let prior_values = prior_properties
                    .iter()
                    .find(|prior| prior.name.as_known() == Some(&p.name))
                    .and_then(|prior| prior.predefined_value.as_known())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let values = p
                    .predefined_values
                    .into_iter()
                    .map(|v| PredefinedValueState {
                        name: Tristate::Known(v.name),
                        default_value: Tristate::Known(v.default_value),
                    })
                    .collect();

                PropertyState {
                    name: Tristate::Known(p.name),
                    predefined_value: Tristate::Known(reorder_like(prior_values, values, |v| {
                        v.name.clone()
                    })),
                    closed_predefined_values: Tristate::Known(p.closed_predefined_values),
                    multiple_choice: Tristate::Known(p.multiple_choice),
                }
            })
            .collect();

        PropertySetState {
            name: Tristate::Known(wire.name),
            visible: Tristate::Known(wire.visible),
            property: Tristate::Known(reorder_like(prior_properties, properties, |p| {
                p.name.clone()
            })),
        }
    }
}
