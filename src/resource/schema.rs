//! Resource schema types
//!
//! A [`ResourceDef`] describes one resource kind: where its REST endpoints
//! live, which fields it has, how each field is compared, and which API
//! operation fixes a difference in that field. The reconciler never looks at
//! a resource kind directly; everything it knows comes from these types.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Wire type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Enum,
    /// A link to another resource, compared by self-link or name
    Reference,
    Object,
    Array,
    Map,
}

/// Custom equivalence rules for string fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// "80" and "80-80" name the same port range
    PortRange,
    CaseInsensitive,
}

/// What it takes to change a field on an existing resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub enum OperationSelector {
    /// The field is immutable: delete and create the resource
    Recreate,
    /// The named update operation changes the field in place
    Update(String),
}

impl From<String> for OperationSelector {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("recreate") {
            Self::Recreate
        } else {
            Self::Update(s)
        }
    }
}

impl fmt::Display for OperationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recreate => write!(f, "Recreate"),
            Self::Update(name) => write!(f, "{}", name),
        }
    }
}

/// One field of a resource (or of a nested object)
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// JSON key
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Set by the server only; never diffed or sent
    #[serde(default)]
    pub output_only: bool,
    /// Sent on create but never diffed; the read-back value is replaced
    /// by the desired one
    #[serde(default)]
    pub ignore: bool,
    /// Redacted when the resource is displayed or logged
    #[serde(default)]
    pub sensitive: bool,
    /// Part of the URL, not of request bodies
    #[serde(default)]
    pub parameter: bool,
    /// Arrays compared without regard to order
    #[serde(default)]
    pub set: bool,
    /// Applied to the desired state when the user leaves the field empty
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub comparison: Option<Comparison>,
    /// Element type for arrays and maps
    #[serde(default)]
    pub item_type: Option<FieldType>,
    /// Nested fields for objects and arrays of objects
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub operation: Option<OperationSelector>,
}

impl FieldDef {
    /// Selector for this field, inheriting `parent` when unset
    pub fn selector(&self, parent: Option<&OperationSelector>) -> OperationSelector {
        self.operation
            .clone()
            .or_else(|| parent.cloned())
            .unwrap_or(OperationSelector::Recreate)
    }
}

/// One URL variant, used when the `when` field is set on the resource
#[derive(Debug, Clone, Deserialize)]
pub struct UrlVariant {
    #[serde(default)]
    pub when: Option<String>,
    pub template: String,
}

/// A URL template, optionally chosen among variants
/// (regional vs. global endpoints of the same kind)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UrlTemplate {
    Single(String),
    Variants(Vec<UrlVariant>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlSet {
    pub get: UrlTemplate,
    #[serde(default)]
    pub list: Option<UrlTemplate>,
    pub create: UrlTemplate,
    pub delete: UrlTemplate,
}

/// How a mutating call reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStyle {
    /// Returns a Compute Engine operation to poll
    #[default]
    Compute,
    /// Completes synchronously and returns the resource
    None,
}

/// Copy a value from the current raw state into an update request
/// (fingerprints guard against concurrent modification)
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintCopy {
    /// Dot path in the raw state read from the API
    pub from: String,
    /// Dot path in the request body
    pub to: String,
}

/// A named in-place update call
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOperationDef {
    pub name: String,
    #[serde(default = "default_update_method")]
    pub method: String,
    pub url: UrlTemplate,
    /// Top-level fields copied from the desired state into the body
    pub fields: Vec<String>,
    /// Send this field's value as the whole body (setTags takes a bare Tags object)
    #[serde(default)]
    pub body_field: Option<String>,
    #[serde(default)]
    pub fingerprint: Vec<FingerprintCopy>,
    /// Append `updateMask` naming the changed fields
    #[serde(default)]
    pub update_mask: bool,
}

fn default_update_method() -> String {
    "PATCH".to_string()
}

fn default_delete_method() -> String {
    "DELETE".to_string()
}

fn default_list_items_path() -> String {
    "items".to_string()
}

fn default_max_page() -> u32 {
    500
}

/// Schema of one resource kind
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// Registry key, e.g. `compute.Network`; filled in by the registry
    #[serde(default)]
    pub kind: String,
    pub display_name: String,
    pub base_path: String,
    pub urls: UrlSet,
    #[serde(default = "default_delete_method")]
    pub delete_method: String,
    #[serde(default)]
    pub operation: OperationStyle,
    /// Scope parameters required to list resources of this kind
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default = "default_list_items_path")]
    pub list_items_path: String,
    #[serde(default)]
    pub page_size_param: Option<String>,
    #[serde(default = "default_max_page")]
    pub max_page: u32,
    /// HTTP statuses other than 404 that mean the resource does not exist
    #[serde(default)]
    pub not_found_codes: Vec<u16>,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub update_operations: Vec<UpdateOperationDef>,
}

impl ResourceDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn update_operation(&self, name: &str) -> Option<&UpdateOperationDef> {
        self.update_operations.iter().find(|op| op.name == name)
    }

    /// Position of an update operation in declaration order (planning order)
    pub fn update_operation_index(&self, name: &str) -> Option<usize> {
        self.update_operations.iter().position(|op| op.name == name)
    }

    pub fn delete_method(&self) -> Method {
        parse_method(&self.delete_method)
    }

    /// Fields that identify a resource in URLs
    pub fn parameter_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.parameter)
    }
}

impl UpdateOperationDef {
    pub fn method(&self) -> Method {
        parse_method(&self.method)
    }
}

fn parse_method(method: &str) -> Method {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).unwrap_or(Method::PATCH)
}
