//! Field-level diffing
//!
//! [`diff_resource`] compares a canonical desired state against a canonical
//! actual state and reports one [`FieldDiff`] per field that differs, tagged
//! with the operation that would remedy it.

use super::canonicalize::values_equivalent;
use crate::error::{DclError, Result};
use crate::resource::model::is_unset;
use crate::resource::schema::{FieldDef, OperationSelector};
use crate::resource::Resource;
use serde_json::{Map, Value};
use std::fmt;

/// Dotted path of a (possibly nested) field, e.g. `routingConfig.routingMode`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldName {
    parts: Vec<String>,
}

impl FieldName {
    pub fn new(name: &str) -> Self {
        Self {
            parts: vec![name.to_string()],
        }
    }

    pub fn add_nest(&self, name: &str) -> Self {
        let mut parts = self.parts.clone();
        parts.push(name.to_string());
        Self { parts }
    }

    /// Name of the top-level field this path starts at
    pub fn top_level(&self) -> &str {
        self.parts.first().map(|s| s.as_str()).unwrap_or("")
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

/// One differing field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field_name: FieldName,
    pub desired: Value,
    pub actual: Value,
    pub resulting_operation: OperationSelector,
}

impl FieldDiff {
    pub fn requires_recreate(&self) -> bool {
        self.resulting_operation == OperationSelector::Recreate
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Desired: {} Actual: {} Operations: [{}]",
            self.field_name, self.desired, self.actual, self.resulting_operation
        )
    }
}

/// Diff two states of the same kind.
///
/// Output-only and ignored fields are skipped, as are fields the desired
/// state leaves empty: those are not managed.
pub fn diff_resource(desired: &Resource, actual: &Resource) -> Result<Vec<FieldDiff>> {
    if desired.kind != actual.kind {
        return Err(DclError::Validation(format!(
            "cannot diff {} against {}",
            desired.kind, actual.kind
        )));
    }
    let def = desired.def()?;
    let mut diffs = Vec::new();
    diff_fields(
        &def.fields,
        &desired.fields,
        &actual.fields,
        None,
        None,
        &mut diffs,
    );
    Ok(diffs)
}

fn diff_fields(
    fields: &[FieldDef],
    desired: &Map<String, Value>,
    actual: &Map<String, Value>,
    parent_name: Option<&FieldName>,
    parent_selector: Option<&OperationSelector>,
    diffs: &mut Vec<FieldDiff>,
) {
    for field in fields {
        if field.output_only || field.ignore || is_unset(desired, &field.name) {
            continue;
        }
        let field_name = match parent_name {
            Some(parent) => parent.add_nest(&field.name),
            None => FieldName::new(&field.name),
        };
        let selector = field.selector(parent_selector);
        let d = desired.get(&field.name).unwrap_or(&Value::Null);
        let a = actual.get(&field.name).unwrap_or(&Value::Null);

        if let (Value::Object(d_nested), Value::Object(a_nested)) = (d, a) {
            if !field.fields.is_empty() {
                diff_fields(
                    &field.fields,
                    d_nested,
                    a_nested,
                    Some(&field_name),
                    Some(&selector),
                    diffs,
                );
                continue;
            }
        }

        if !values_equivalent(field, d, a) {
            diffs.push(FieldDiff {
                field_name,
                desired: d.clone(),
                actual: a.clone(),
                resulting_operation: selector,
            });
        }
    }
}
