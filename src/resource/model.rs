//! Resource model
//!
//! A [`Resource`] is one cloud resource of a registered kind, carried as the
//! JSON object the REST API speaks. Its schema ([`ResourceDef`]) decides how
//! it is validated, marshalled and compared.

use super::registry::require_resource;
use super::schema::{FieldDef, FieldType, ResourceDef};
use crate::error::{DclError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One resource: its kind plus its JSON fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Null, empty string, empty array and empty object all count as "unset"
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.values().all(is_empty_value),
        _ => false,
    }
}

/// Whether a field is unset in a JSON object
pub fn is_unset(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).map(is_empty_value).unwrap_or(true)
}

impl Resource {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub fn is_unset(&self, name: &str) -> bool {
        is_unset(&self.fields, name)
    }

    /// Schema for this resource's kind
    pub fn def(&self) -> Result<&'static ResourceDef> {
        require_resource(&self.kind)
    }

    /// Short human-readable identity for log lines and errors
    pub fn identity(&self) -> String {
        let name = self
            .fields
            .get("name")
            .or_else(|| self.fields.get("priority"))
            .map(value_to_plain_string)
            .unwrap_or_else(|| "<unnamed>".to_string());
        format!("{} {}", self.kind, name)
    }

    /// Check required fields and enum values against the schema
    pub fn validate(&self) -> Result<()> {
        let def = self.def()?;
        validate_fields(&def.fields, &self.fields, "")
            .map_err(|msg| DclError::Validation(format!("{}: {}", self.identity(), msg)))
    }

    /// Check that the scope parameters needed to list this kind are set
    pub fn validate_parameters(&self) -> Result<()> {
        let def = self.def()?;
        for param in &def.parameters {
            if self.is_unset(param) {
                return Err(DclError::Validation(format!(
                    "{}: required parameter {} is not set",
                    self.kind, param
                )));
            }
        }
        Ok(())
    }

    /// JSON request body for create calls: output-only, parameter and null
    /// fields are dropped
    pub fn to_request_body(&self) -> Result<Value> {
        let def = self.def()?;
        Ok(Value::Object(marshal_fields(&def.fields, &self.fields, true)))
    }

    /// Build a resource from an API response, keeping the request's scope
    /// parameters (the API does not echo them back in a usable form)
    pub fn from_response(value: Value, request: &Resource) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(DclError::Validation(format!(
                "{}: expected a JSON object in response",
                request.identity()
            )));
        };
        // The API's own type tag ("compute#network") would shadow ours
        fields.remove("kind");
        let mut resource = Resource {
            kind: request.kind.clone(),
            fields,
        };
        let def = request.def()?;
        for param in def.parameter_fields() {
            match request.fields.get(&param.name) {
                Some(value) if !is_empty_value(value) => {
                    resource.fields.insert(param.name.clone(), value.clone());
                },
                _ => {},
            }
        }
        Ok(resource)
    }
}

/// Placeholder for write-only fields (shared secrets) in log output
const REDACTED: &str = "<redacted>";

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shown = self.clone();
        if let Some(def) = super::registry::get_resource(&self.kind) {
            for field in def.fields.iter().filter(|f| f.sensitive) {
                if let Some(value) = shown.fields.get_mut(&field.name) {
                    *value = Value::String(REDACTED.to_string());
                }
            }
        }
        match serde_json::to_string(&shown) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{}", self.identity()),
        }
    }
}

/// Render a scalar without JSON quoting
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn validate_fields(
    fields: &[FieldDef],
    values: &Map<String, Value>,
    path: &str,
) -> std::result::Result<(), String> {
    for field in fields {
        let full_name = format!("{}{}", path, field.name);
        let value = values.get(&field.name);
        let unset = value.map(is_empty_value).unwrap_or(true);

        if field.required && !field.output_only && unset {
            return Err(format!("required field {} is not set", full_name));
        }
        let Some(value) = value else { continue };
        if unset {
            continue;
        }

        if field.field_type == FieldType::Enum && !field.enum_values.is_empty() {
            let Some(s) = value.as_str() else {
                return Err(format!("field {} must be a string enum", full_name));
            };
            if !field.enum_values.iter().any(|allowed| allowed == s) {
                return Err(format!(
                    "field {} has invalid value {:?}; expected one of {}",
                    full_name,
                    s,
                    field.enum_values.join(", ")
                ));
            }
        }

        if field.fields.is_empty() {
            continue;
        }
        match value {
            Value::Object(nested) => {
                validate_fields(&field.fields, nested, &format!("{}.", full_name))?;
            },
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Object(nested) = item {
                        validate_fields(&field.fields, nested, &format!("{}[{}].", full_name, i))?;
                    }
                }
            },
            _ => {},
        }
    }
    Ok(())
}

fn marshal_fields(fields: &[FieldDef], values: &Map<String, Value>, top: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in values {
        if value.is_null() {
            continue;
        }
        let field = fields.iter().find(|f| &f.name == key);
        match field {
            Some(f) if f.output_only => continue,
            Some(f) if top && f.parameter => continue,
            Some(f) if !f.fields.is_empty() => {
                out.insert(key.clone(), marshal_nested(f, value));
            },
            _ => {
                out.insert(key.clone(), value.clone());
            },
        }
    }
    out
}

fn marshal_nested(field: &FieldDef, value: &Value) -> Value {
    match value {
        Value::Object(nested) => Value::Object(marshal_fields(&field.fields, nested, false)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(nested) => {
                        Value::Object(marshal_fields(&field.fields, nested, false))
                    },
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn network() -> Resource {
        Resource::new("compute.Network")
            .with("project", "my-project")
            .with("name", "net-1")
            .with("autoCreateSubnetworks", false)
            .with("selfLink", "https://example/net-1")
            .with("description", Value::Null)
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({"a": null, "b": ""})));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!({"a": 1})));
    }

    #[test]
    fn test_validate_required_field() {
        let r = Resource::new("compute.Network").with("project", "my-project");
        match r.validate() {
            Err(DclError::Validation(msg)) => assert!(msg.contains("name")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(network().validate().is_ok());
    }

    #[test]
    fn test_validate_nested_enum() {
        let r = network().with("routingConfig", json!({"routingMode": "SIDEWAYS"}));
        match r.validate() {
            Err(DclError::Validation(msg)) => {
                assert!(msg.contains("routingConfig.routingMode"), "{}", msg)
            },
            other => panic!("unexpected: {:?}", other),
        }
        let ok = network().with("routingConfig", json!({"routingMode": "GLOBAL"}));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_request_body_drops_output_only_parameters_and_nulls() {
        let body = network().to_request_body().unwrap();
        assert_eq!(
            body,
            json!({"name": "net-1", "autoCreateSubnetworks": false})
        );
    }

    #[test]
    fn test_request_body_drops_nested_output_only() {
        let r = Resource::new("compute.Instance")
            .with("project", "p")
            .with("zone", "us-central1-a")
            .with("name", "vm")
            .with(
                "networkInterfaces",
                json!([{"name": "nic0", "network": "global/networks/default"}]),
            );
        let body = r.to_request_body().unwrap();
        assert_eq!(
            body,
            json!({"name": "vm", "networkInterfaces": [{"network": "global/networks/default"}]})
        );
    }

    #[test]
    fn test_from_response_keeps_request_parameters() {
        let request = network();
        let response = json!({"kind": "compute#network", "name": "net-1", "mtu": 1460, "project": "ignored"});
        let r = Resource::from_response(response, &request).unwrap();
        assert_eq!(r.get_str("project"), Some("my-project"));
        assert_eq!(r.get("mtu"), Some(&json!(1460)));
        assert_eq!(r.kind, "compute.Network");
        assert!(r.get("kind").is_none());
    }

    #[test]
    fn test_manifest_style_round_trip() {
        let r: Resource = serde_json::from_value(json!({
            "kind": "compute.Network",
            "project": "my-project",
            "name": "net-1"
        }))
        .unwrap();
        assert_eq!(r.kind, "compute.Network");
        assert_eq!(r.get_str("name"), Some("net-1"));
        assert_eq!(r.identity(), "compute.Network net-1");
    }

    #[test]
    fn test_display_redacts_secrets() {
        let r = Resource::new("compute.VpnTunnel")
            .with("name", "t")
            .with("sharedSecret", "hunter2");
        let shown = r.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
        assert_eq!(r.get_str("sharedSecret"), Some("hunter2"));
    }

    #[test]
    fn test_display_shows_ignored_but_not_sensitive_fields() {
        let r = Resource::new("compute.Instance")
            .with("name", "vm")
            .with("disks", json!([{"boot": true, "initializeParams": {"diskSizeGb": 10}}]));
        let shown = r.to_string();
        assert!(shown.contains("diskSizeGb"));
        assert!(!shown.contains("<redacted>"));
    }

    #[test]
    fn test_request_body_keeps_ignored_fields() {
        let r = Resource::new("compute.Instance")
            .with("project", "p")
            .with("zone", "us-central1-a")
            .with("name", "vm")
            .with(
                "disks",
                json!([{"boot": true, "initializeParams": {"sourceImage": "projects/debian-cloud/global/images/family/debian-12"}}]),
            );
        let body = r.to_request_body().unwrap();
        assert_eq!(
            body["disks"][0]["initializeParams"]["sourceImage"],
            json!("projects/debian-cloud/global/images/family/debian-12")
        );
        assert!(body.get("zone").is_none());
    }

    #[test]
    fn test_validate_parameters() {
        let r = Resource::new("compute.Subnetwork").with("project", "p");
        assert!(r.validate_parameters().is_err());
        let r = r.with("region", "us-central1");
        assert!(r.validate_parameters().is_ok());
    }
}
