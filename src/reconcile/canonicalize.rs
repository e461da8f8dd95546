//! Canonicalization
//!
//! Before two states are diffed, values that mean the same thing are brought
//! into the same form: a bare network name and its full self-link, `"80"` and
//! `"80-80"`, a missing boolean and `false`, an integer and its decimal string
//! encoding. Field-level rules come from the resource schema.

use crate::error::Result;
use crate::resource::model::{is_empty_value, is_unset};
use crate::resource::schema::{Comparison, FieldDef, FieldType};
use crate::resource::url::self_links_equivalent;
use crate::resource::Resource;
use serde_json::{Map, Value};

/// Merge the desired state with the observed initial state.
///
/// Schema defaults are applied to empty desired fields first. Without an
/// initial state that is all; otherwise each field takes the initial value
/// when the user left it empty or when both values are equivalent, so that
/// only real differences survive into the diff.
pub fn canonicalize_desired_state(
    raw_desired: &Resource,
    raw_initial: Option<&Resource>,
) -> Result<Resource> {
    let def = raw_desired.def()?;
    let mut desired = raw_desired.clone();
    apply_defaults(&def.fields, &mut desired.fields);

    let Some(initial) = raw_initial else {
        return Ok(desired);
    };
    canonicalize_desired_fields(&def.fields, &mut desired.fields, &initial.fields);
    Ok(desired)
}

/// The initial state is used as read
pub fn canonicalize_initial_state(raw_initial: &Resource, _raw_desired: &Resource) -> Resource {
    raw_initial.clone()
}

/// Bring a freshly read state into the desired state's form
pub fn canonicalize_new_state(raw_new: &Resource, raw_desired: &Resource) -> Result<Resource> {
    let def = raw_desired.def()?;
    let mut new_state = raw_new.clone();
    canonicalize_new_fields(&def.fields, &mut new_state.fields, &raw_desired.fields, true);
    Ok(new_state)
}

fn apply_defaults(fields: &[FieldDef], values: &mut Map<String, Value>) {
    for field in fields {
        if let Some(default) = &field.default {
            if is_unset(values, &field.name) {
                values.insert(field.name.clone(), default.clone());
            }
        }
        if field.fields.is_empty() {
            continue;
        }
        match values.get_mut(&field.name) {
            Some(Value::Object(nested)) => apply_defaults(&field.fields, nested),
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::Object(nested) = item {
                        apply_defaults(&field.fields, nested);
                    }
                }
            },
            _ => {},
        }
    }
}

fn canonicalize_desired_fields(
    fields: &[FieldDef],
    desired: &mut Map<String, Value>,
    initial: &Map<String, Value>,
) {
    for field in fields {
        let initial_value = initial.get(&field.name);

        if field.output_only {
            if let Some(v) = initial_value {
                desired.insert(field.name.clone(), v.clone());
            }
            continue;
        }
        if field.ignore {
            continue;
        }
        let Some(initial_value) = initial_value.filter(|v| !is_empty_value(v)) else {
            continue;
        };
        if is_unset(desired, &field.name) {
            desired.insert(field.name.clone(), initial_value.clone());
            continue;
        }
        let Some(desired_value) = desired.get_mut(&field.name) else {
            continue;
        };
        if let (Value::Object(d), Value::Object(i)) = (&mut *desired_value, initial_value) {
            if !field.fields.is_empty() {
                canonicalize_desired_fields(&field.fields, d, i);
                continue;
            }
        }
        if values_equivalent(field, desired_value, initial_value) {
            *desired_value = initial_value.clone();
        }
    }
}

fn canonicalize_new_fields(
    fields: &[FieldDef],
    new_state: &mut Map<String, Value>,
    desired: &Map<String, Value>,
    top_level: bool,
) {
    for field in fields {
        let desired_value = desired.get(&field.name);

        if top_level && field.parameter {
            if let Some(d) = desired_value {
                new_state.insert(field.name.clone(), d.clone());
            }
            continue;
        }
        if field.ignore {
            if let Some(d) = desired_value {
                new_state.insert(field.name.clone(), d.clone());
            }
            continue;
        }

        let new_unset = is_unset(new_state, &field.name);
        let desired_unset = is_unset(desired, &field.name);
        if new_unset && desired_unset {
            if let Some(d) = desired_value {
                new_state.insert(field.name.clone(), d.clone());
            }
            continue;
        }
        if field.output_only || desired_unset || new_unset {
            continue;
        }
        let (Some(desired_value), Some(new_value)) =
            (desired_value, new_state.get_mut(&field.name))
        else {
            continue;
        };
        if let (Value::Object(n), Value::Object(d)) = (&mut *new_value, desired_value) {
            if !field.fields.is_empty() {
                canonicalize_new_fields(&field.fields, n, d, false);
                continue;
            }
        }
        if values_equivalent(field, desired_value, new_value) {
            *new_value = desired_value.clone();
        }
    }
}

/// Whether `desired` and `actual` mean the same thing for `field`
pub fn values_equivalent(field: &FieldDef, desired: &Value, actual: &Value) -> bool {
    if field.field_type == FieldType::Boolean {
        return bool_value(desired) == bool_value(actual);
    }
    match (is_empty_value(desired), is_empty_value(actual)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {},
    }
    match (desired, actual) {
        (Value::Array(d), Value::Array(a)) => arrays_equivalent(field, d, a),
        (Value::Object(d), Value::Object(a)) if !field.fields.is_empty() => {
            objects_equivalent(&field.fields, d, a)
        },
        (Value::Object(d), Value::Object(a)) => maps_equivalent(field, d, a),
        _ => scalars_equivalent(field.field_type, field.comparison, desired, actual),
    }
}

/// Booleans: missing counts as false
fn bool_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Numbers arrive either as JSON numbers or as decimal strings (int64)
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Port ranges: "80" is the same range as "80-80"
pub fn port_ranges_equivalent(a: &str, b: &str) -> bool {
    fn normalize(s: &str) -> (String, String) {
        let s = s.trim();
        match s.split_once('-') {
            Some((lo, hi)) => (lo.trim().to_string(), hi.trim().to_string()),
            None => (s.to_string(), s.to_string()),
        }
    }
    a == b || normalize(a) == normalize(b)
}

fn scalars_equivalent(
    field_type: FieldType,
    comparison: Option<Comparison>,
    desired: &Value,
    actual: &Value,
) -> bool {
    if let (Some(d), Some(a)) = (desired.as_str(), actual.as_str()) {
        match comparison {
            Some(Comparison::PortRange) => return port_ranges_equivalent(d, a),
            Some(Comparison::CaseInsensitive) => return d.eq_ignore_ascii_case(a),
            None => {},
        }
    }
    match field_type {
        FieldType::Boolean => bool_value(desired) == bool_value(actual),
        FieldType::Integer => match (integer_value(desired), integer_value(actual)) {
            (Some(d), Some(a)) => d == a,
            _ => numbers_equivalent(desired, actual),
        },
        FieldType::Number => numbers_equivalent(desired, actual),
        FieldType::Reference => match (desired.as_str(), actual.as_str()) {
            (Some(d), Some(a)) => self_links_equivalent(d, a),
            _ => desired == actual,
        },
        _ => desired == actual,
    }
}

fn numbers_equivalent(desired: &Value, actual: &Value) -> bool {
    match (number_value(desired), number_value(actual)) {
        (Some(d), Some(a)) => d == a,
        _ => desired == actual,
    }
}

fn items_equivalent(field: &FieldDef, desired: &Value, actual: &Value) -> bool {
    if let (Value::Object(d), Value::Object(a)) = (desired, actual) {
        if !field.fields.is_empty() {
            return objects_equivalent(&field.fields, d, a);
        }
    }
    scalars_equivalent(
        field.item_type.unwrap_or_default(),
        field.comparison,
        desired,
        actual,
    )
}

fn arrays_equivalent(field: &FieldDef, desired: &[Value], actual: &[Value]) -> bool {
    if desired.len() != actual.len() {
        return false;
    }
    if !field.set {
        return desired
            .iter()
            .zip(actual)
            .all(|(d, a)| items_equivalent(field, d, a));
    }
    let mut used = vec![false; actual.len()];
    desired.iter().all(|d| {
        let found = actual
            .iter()
            .enumerate()
            .find(|(i, a)| !used[*i] && items_equivalent(field, d, a))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            },
            None => false,
        }
    })
}

/// Objects with a schema compare field by field; fields the desired side
/// leaves empty are not compared
fn objects_equivalent(
    fields: &[FieldDef],
    desired: &Map<String, Value>,
    actual: &Map<String, Value>,
) -> bool {
    for field in fields {
        if field.output_only || field.ignore || is_unset(desired, &field.name) {
            continue;
        }
        let d = desired.get(&field.name).unwrap_or(&Value::Null);
        let a = actual.get(&field.name).unwrap_or(&Value::Null);
        if !values_equivalent(field, d, a) {
            return false;
        }
    }
    desired
        .iter()
        .filter(|(k, _)| !fields.iter().any(|f| &f.name == *k))
        .all(|(k, v)| is_empty_value(v) || actual.get(k) == Some(v))
}

/// Free-form maps (labels) compare key by key
fn maps_equivalent(field: &FieldDef, desired: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    let item_type = field.item_type.unwrap_or_default();
    let keys = desired.keys().chain(actual.keys());
    for key in keys {
        let d = desired.get(key).unwrap_or(&Value::Null);
        let a = actual.get(key).unwrap_or(&Value::Null);
        if is_empty_value(d) && is_empty_value(a) {
            continue;
        }
        if !scalars_equivalent(item_type, None, d, a) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::diff::diff_resource;
    use crate::resource::get_resource;
    use serde_json::json;

    fn field(kind: &str, name: &str) -> &'static FieldDef {
        get_resource(kind).unwrap().field(name).unwrap()
    }

    #[test]
    fn test_port_ranges() {
        assert!(port_ranges_equivalent("80", "80-80"));
        assert!(port_ranges_equivalent("80-80", "80"));
        assert!(port_ranges_equivalent("8080-8090", "8080-8090"));
        assert!(!port_ranges_equivalent("80", "80-81"));
        let port_range = field("compute.ForwardingRule", "portRange");
        assert!(values_equivalent(port_range, &json!("443"), &json!("443-443")));
    }

    #[test]
    fn test_boolean_missing_is_false() {
        let f = field("compute.Network", "autoCreateSubnetworks");
        assert!(values_equivalent(f, &json!(false), &Value::Null));
        assert!(!values_equivalent(f, &json!(true), &Value::Null));
    }

    #[test]
    fn test_integer_accepts_decimal_strings() {
        let f = field("compute.Network", "mtu");
        assert!(values_equivalent(f, &json!(1460), &json!("1460")));
        assert!(!values_equivalent(f, &json!(1500), &json!("1460")));
    }

    #[test]
    fn test_reference_by_name_or_self_link() {
        let f = field("compute.Subnetwork", "network");
        assert!(values_equivalent(
            f,
            &json!("default"),
            &json!("https://www.googleapis.com/compute/v1/projects/p/global/networks/default")
        ));
        assert!(values_equivalent(
            f,
            &json!("projects/p/global/networks/default"),
            &json!("https://www.googleapis.com/compute/v1/projects/p/global/networks/default")
        ));
        assert!(!values_equivalent(f, &json!("other"), &json!("projects/p/global/networks/default")));
    }

    #[test]
    fn test_set_arrays_ignore_order() {
        let f = field("compute.Route", "tags");
        assert!(values_equivalent(f, &json!(["a", "b"]), &json!(["b", "a"])));
        assert!(!values_equivalent(f, &json!(["a", "a"]), &json!(["a", "b"])));

        let ordered = field("compute.FirewallPolicyRule", "targetResources");
        assert!(!values_equivalent(ordered, &json!(["a", "b"]), &json!(["b", "a"])));
    }

    #[test]
    fn test_empty_values_are_equivalent() {
        let f = field("compute.Network", "description");
        assert!(values_equivalent(f, &json!(""), &Value::Null));
        let labels = field("compute.Instance", "labels");
        assert!(values_equivalent(labels, &json!({}), &Value::Null));
        assert!(values_equivalent(labels, &json!({"env": "prod"}), &json!({"env": "prod"})));
        assert!(!values_equivalent(labels, &json!({"env": "prod"}), &json!({"env": "dev"})));
        assert!(!values_equivalent(labels, &json!({"env": "prod"}), &json!({"env": "prod", "x": "y"})));
    }

    #[test]
    fn test_desired_without_initial_gets_defaults() {
        let raw = Resource::new("compute.Network")
            .with("project", "p")
            .with("name", "n");
        let desired = canonicalize_desired_state(&raw, None).unwrap();
        assert_eq!(desired.get("autoCreateSubnetworks"), Some(&json!(true)));
        assert_eq!(desired.get_str("name"), Some("n"));
    }

    #[test]
    fn test_desired_takes_initial_form_when_equivalent() {
        let raw = Resource::new("compute.Subnetwork")
            .with("project", "p")
            .with("region", "us-central1")
            .with("name", "s")
            .with("network", "default")
            .with("ipCidrRange", "10.0.0.0/24");
        let link = "https://www.googleapis.com/compute/v1/projects/p/global/networks/default";
        let initial = raw
            .clone()
            .with("network", link)
            .with("purpose", "PRIVATE")
            .with("fingerprint", "abc")
            .with("ipCidrRange", "10.0.0.0/16");
        let desired = canonicalize_desired_state(&raw, Some(&initial)).unwrap();
        assert_eq!(desired.get_str("network"), Some(link));
        assert_eq!(desired.get_str("purpose"), Some("PRIVATE"));
        assert_eq!(desired.get_str("fingerprint"), Some("abc"));
        assert_eq!(desired.get_str("ipCidrRange"), Some("10.0.0.0/24"));
    }

    #[test]
    fn test_desired_nested_objects_recurse() {
        let raw = Resource::new("compute.Instance")
            .with("project", "p")
            .with("zone", "z")
            .with("name", "vm")
            .with("tags", json!({"items": ["b", "a"]}));
        let initial = raw
            .clone()
            .with("tags", json!({"items": ["a", "b"], "fingerprint": "f1"}));
        let desired = canonicalize_desired_state(&raw, Some(&initial)).unwrap();
        assert_eq!(
            desired.get("tags"),
            Some(&json!({"items": ["a", "b"], "fingerprint": "f1"}))
        );
    }

    #[test]
    fn test_new_state_takes_desired_form() {
        let desired = Resource::new("compute.Subnetwork")
            .with("project", "projects/p")
            .with("region", "us-central1")
            .with("name", "s")
            .with("network", "default")
            .with("description", "");
        let link = "https://www.googleapis.com/compute/v1/projects/p/global/networks/default";
        let raw_new = Resource::new("compute.Subnetwork")
            .with("project", "p")
            .with("region", "https://www.googleapis.com/compute/v1/projects/p/regions/us-central1")
            .with("name", "s")
            .with("network", link)
            .with("gatewayAddress", "10.0.0.1");
        let new_state = canonicalize_new_state(&raw_new, &desired).unwrap();
        assert_eq!(new_state.get_str("network"), Some("default"));
        assert_eq!(new_state.get_str("project"), Some("projects/p"));
        assert_eq!(new_state.get_str("region"), Some("us-central1"));
        assert_eq!(new_state.get_str("description"), Some(""));
        assert_eq!(new_state.get_str("gatewayAddress"), Some("10.0.0.1"));
    }

    #[test]
    fn test_new_state_keeps_desired_ignored_fields() {
        let disks = json!([{
            "boot": true,
            "autoDelete": true,
            "initializeParams": {"sourceImage": "projects/debian-cloud/global/images/family/debian-12"}
        }]);
        let desired = Resource::new("compute.Instance")
            .with("project", "p")
            .with("zone", "us-central1-a")
            .with("name", "vm")
            .with("disks", disks.clone());
        // Reads report the attached disk, never how it was initialized
        let raw_new = Resource::new("compute.Instance")
            .with("name", "vm")
            .with(
                "disks",
                json!([{"boot": true, "autoDelete": true, "deviceName": "persistent-disk-0", "type": "PERSISTENT"}]),
            );
        let new_state = canonicalize_new_state(&raw_new, &desired).unwrap();
        assert_eq!(new_state.get("disks"), Some(&disks));

        let secret = Resource::new("compute.VpnTunnel")
            .with("project", "p")
            .with("region", "us-central1")
            .with("name", "t")
            .with("sharedSecret", "s3cret");
        let read = Resource::new("compute.VpnTunnel")
            .with("name", "t")
            .with("sharedSecretHash", "abc");
        let new_state = canonicalize_new_state(&read, &secret).unwrap();
        assert_eq!(new_state.get_str("sharedSecret"), Some("s3cret"));
        assert!(diff_resource(&secret, &new_state).unwrap().is_empty());
    }

    #[test]
    fn test_initial_state_is_unchanged() {
        let initial = Resource::new("compute.Network").with("name", "n");
        let desired = Resource::new("compute.Network").with("name", "m");
        assert_eq!(canonicalize_initial_state(&initial, &desired), initial);
    }
}
