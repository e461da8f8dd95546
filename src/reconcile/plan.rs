//! Operation planning
//!
//! Field diffs are grouped by the operation that fixes them, checked against
//! the caller's lifecycle directives, and turned into an ordered list of API
//! calls.

use super::diff::FieldDiff;
use super::options::{has_lifecycle_param, LifecycleParam};
use crate::error::{DclError, Result};
use crate::resource::schema::{OperationSelector, ResourceDef};
use crate::resource::Resource;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Field diffs that one operation resolves
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDiff {
    /// Top-level fields touched, in diff order without duplicates
    pub field_names: Vec<String>,
    pub requires_recreate: bool,
    pub update_op: Option<String>,
    pub field_diffs: Vec<FieldDiff>,
}

impl fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.update_op {
            Some(op) => write!(f, "{} [{}]", op, self.field_names.join(", ")),
            None => write!(f, "Recreate [{}]", self.field_names.join(", ")),
        }
    }
}

/// One API call of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOperation {
    Create,
    Delete,
    Update {
        name: String,
        field_diffs: Vec<FieldDiff>,
    },
}

impl fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
            Self::Update { name, .. } => write!(f, "update:{}", name),
        }
    }
}

/// Result of the read and planning half of apply
#[derive(Debug, Clone)]
pub struct Plan {
    /// Canonical initial state; `None` when the resource does not exist
    pub initial: Option<Resource>,
    /// Canonical desired state
    pub desired: Resource,
    pub diffs: Vec<FieldDiff>,
    pub operations: Vec<ApiOperation>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.desired.kind,
            "resource": self.desired.identity(),
            "exists": self.initial.is_some(),
            "diffs": self.diffs.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "operations": self.operations.iter().map(|o| o.to_string()).collect::<Vec<_>>(),
        })
    }
}

/// Group field diffs by operation: recreation first, then update operations
/// in the order the schema declares them
pub fn convert_field_diffs(def: &ResourceDef, field_diffs: &[FieldDiff]) -> Result<Vec<ResourceDiff>> {
    let mut grouped: BTreeMap<usize, ResourceDiff> = BTreeMap::new();

    for diff in field_diffs {
        let (order, update_op) = match &diff.resulting_operation {
            OperationSelector::Recreate => (0, None),
            OperationSelector::Update(name) => {
                let Some(idx) = def.update_operation_index(name) else {
                    return Err(DclError::Schema(format!(
                        "{}: field {} names unknown update operation {}",
                        def.kind, diff.field_name, name
                    )));
                };
                (idx + 1, Some(name.clone()))
            },
        };
        let entry = grouped.entry(order).or_insert_with(|| ResourceDiff {
            field_names: Vec::new(),
            requires_recreate: update_op.is_none(),
            update_op,
            field_diffs: Vec::new(),
        });
        let top = diff.field_name.top_level().to_string();
        if !entry.field_names.contains(&top) {
            entry.field_names.push(top);
        }
        entry.field_diffs.push(diff.clone());
    }

    Ok(grouped.into_values().collect())
}

/// Turn grouped diffs into API calls, honoring lifecycle directives
pub fn plan_operations(
    initial: Option<&Resource>,
    desired: &Resource,
    diffs: &[ResourceDiff],
    lifecycle: &[LifecycleParam],
) -> Result<Vec<ApiOperation>> {
    if initial.is_none() {
        if has_lifecycle_param(lifecycle, LifecycleParam::BlockCreation) {
            return Err(DclError::ApplyInfeasible(format!(
                "creation of {} blocked by lifecycle params",
                desired.identity()
            )));
        }
        return Ok(vec![ApiOperation::Create]);
    }
    if has_lifecycle_param(lifecycle, LifecycleParam::BlockAcquire) {
        return Err(DclError::ApplyInfeasible(format!(
            "{} already exists; apply blocked by lifecycle params",
            desired.identity()
        )));
    }

    let mut recreate = false;
    for diff in diffs {
        if diff.requires_recreate && has_lifecycle_param(lifecycle, LifecycleParam::BlockDestruction) {
            return Err(DclError::ApplyInfeasible(format!(
                "infeasible update: ({}) would require recreation",
                diff
            )));
        }
        if has_lifecycle_param(lifecycle, LifecycleParam::BlockModification) {
            return Err(DclError::ApplyInfeasible(format!(
                "modification blocked, diff ({}) unresolvable",
                diff
            )));
        }
        recreate |= diff.requires_recreate;
    }

    if recreate {
        return Ok(vec![ApiOperation::Delete, ApiOperation::Create]);
    }
    Ok(diffs
        .iter()
        .filter_map(|d| {
            d.update_op.as_ref().map(|name| ApiOperation::Update {
                name: name.clone(),
                field_diffs: d.field_diffs.clone(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::diff::FieldName;
    use crate::resource::get_resource;

    fn diff(name: &str, op: OperationSelector) -> FieldDiff {
        FieldDiff {
            field_name: FieldName::new(name),
            desired: json!(1),
            actual: json!(2),
            resulting_operation: op,
        }
    }

    fn update(name: &str) -> OperationSelector {
        OperationSelector::Update(name.to_string())
    }

    fn subnetwork() -> Resource {
        Resource::new("compute.Subnetwork").with("name", "s")
    }

    #[test]
    fn test_grouping_orders_recreate_then_schema_order() {
        let def = get_resource("compute.Subnetwork").unwrap();
        let diffs = vec![
            diff("role", update("update")),
            diff("ipCidrRange", update("expandIpCidrRange")),
            diff("description", OperationSelector::Recreate),
            diff("logConfig", update("update")),
        ];
        let grouped = convert_field_diffs(def, &diffs).unwrap();
        assert_eq!(grouped.len(), 3);
        assert!(grouped[0].requires_recreate);
        assert_eq!(grouped[1].update_op.as_deref(), Some("expandIpCidrRange"));
        assert_eq!(grouped[2].update_op.as_deref(), Some("update"));
        assert_eq!(grouped[2].field_names, vec!["role", "logConfig"]);
    }

    #[test]
    fn test_unknown_operation_is_schema_error() {
        let def = get_resource("compute.Subnetwork").unwrap();
        let result = convert_field_diffs(def, &[diff("role", update("nope"))]);
        assert!(matches!(result, Err(DclError::Schema(_))));
    }

    #[test]
    fn test_missing_resource_is_created() {
        let ops = plan_operations(None, &subnetwork(), &[], &[]).unwrap();
        assert_eq!(ops, vec![ApiOperation::Create]);

        let blocked = plan_operations(None, &subnetwork(), &[], &[LifecycleParam::BlockCreation]);
        assert!(matches!(blocked, Err(DclError::ApplyInfeasible(_))));
    }

    #[test]
    fn test_existing_resource_with_block_acquire() {
        let initial = subnetwork();
        let result = plan_operations(
            Some(&initial),
            &subnetwork(),
            &[],
            &[LifecycleParam::BlockAcquire],
        );
        assert!(matches!(result, Err(DclError::ApplyInfeasible(_))));
    }

    #[test]
    fn test_recreate_plans_delete_then_create() {
        let def = get_resource("compute.Subnetwork").unwrap();
        let grouped = convert_field_diffs(
            def,
            &[
                diff("description", OperationSelector::Recreate),
                diff("role", update("update")),
            ],
        )
        .unwrap();
        let initial = subnetwork();
        let ops = plan_operations(Some(&initial), &subnetwork(), &grouped, &[]).unwrap();
        assert_eq!(ops, vec![ApiOperation::Delete, ApiOperation::Create]);

        let blocked = plan_operations(
            Some(&initial),
            &subnetwork(),
            &grouped,
            &[LifecycleParam::BlockDestruction],
        );
        assert!(matches!(blocked, Err(DclError::ApplyInfeasible(_))));
    }

    #[test]
    fn test_updates_and_block_modification() {
        let def = get_resource("compute.Subnetwork").unwrap();
        let grouped = convert_field_diffs(def, &[diff("role", update("update"))]).unwrap();
        let initial = subnetwork();
        let ops = plan_operations(Some(&initial), &subnetwork(), &grouped, &[]).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].to_string(), "update:update");

        let blocked = plan_operations(
            Some(&initial),
            &subnetwork(),
            &grouped,
            &[LifecycleParam::BlockModification],
        );
        assert!(matches!(blocked, Err(DclError::ApplyInfeasible(_))));
    }

    #[test]
    fn test_no_diffs_is_noop() {
        let initial = subnetwork();
        let ops = plan_operations(Some(&initial), &subnetwork(), &[], &[]).unwrap();
        assert!(ops.is_empty());
    }
}
