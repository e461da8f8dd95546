//! Resource Registry - Load resource schemas from JSON
//!
//! This module loads all resource schemas from embedded JSON files and
//! provides lookup functions for the reconciler.

use super::schema::{FieldDef, FieldType, OperationSelector, ResourceDef};
use crate::error::{DclError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/network.json"),
    include_str!("../resources/load_balancing.json"),
    include_str!("../resources/instance.json"),
];

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

impl ResourceConfig {
    /// Parse one schema document, stamping each definition with its kind
    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: ResourceConfig = serde_json::from_str(content)?;
        for (kind, def) in config.resources.iter_mut() {
            def.kind = kind.clone();
        }
        Ok(config)
    }
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig::default();

        for content in RESOURCE_FILES {
            let partial = ResourceConfig::from_json(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource schema by kind
pub fn get_resource(kind: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(kind)
}

/// Get a resource schema by kind, or a schema error naming the kind
pub fn require_resource(kind: &str) -> Result<&'static ResourceDef> {
    get_resource(kind).ok_or_else(|| DclError::Schema(format!("unknown resource kind: {}", kind)))
}

/// Get all resource kinds, sorted
pub fn get_all_resource_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    kinds.sort_unstable();
    kinds
}

/// Check a schema for internal consistency
pub fn validate_resource_def(def: &ResourceDef) -> Result<()> {
    fn check_fields(
        def: &ResourceDef,
        fields: &[FieldDef],
        path: &str,
        in_array: bool,
    ) -> Result<()> {
        for field in fields {
            if in_array && field.operation.is_some() {
                return Err(DclError::Schema(format!(
                    "{}: field {}{} is inside an array; the array's operation applies",
                    def.kind, path, field.name
                )));
            }
            if let Some(OperationSelector::Update(name)) = &field.operation {
                if def.update_operation(name).is_none() {
                    return Err(DclError::Schema(format!(
                        "{}: field {}{} names unknown update operation {}",
                        def.kind, path, field.name, name
                    )));
                }
            }
            check_fields(
                def,
                &field.fields,
                &format!("{}{}.", path, field.name),
                in_array || field.field_type == FieldType::Array,
            )?;
        }
        Ok(())
    }

    check_fields(def, &def.fields, "", false)?;

    for op in &def.update_operations {
        for name in &op.fields {
            if def.field(name).is_none() {
                return Err(DclError::Schema(format!(
                    "{}: update operation {} sends unknown field {}",
                    def.kind, op.name, name
                )));
            }
        }
        if let Some(body_field) = &op.body_field {
            if !op.fields.contains(body_field) {
                return Err(DclError::Schema(format!(
                    "{}: update operation {} body field {} is not one of its fields",
                    def.kind, op.name, body_field
                )));
            }
        }
    }

    for param in &def.parameters {
        if def.field(param).is_none() {
            return Err(DclError::Schema(format!(
                "{}: unknown scope parameter {}",
                def.kind, param
            )));
        }
    }

    Ok(())
}

/// Check every registered schema
pub fn validate_registry() -> Result<()> {
    for def in get_registry().resources.values() {
        validate_resource_def(def)?;
    }
    Ok(())
}
