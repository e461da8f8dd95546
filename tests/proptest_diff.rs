//! Property-based tests using proptest
//!
//! These tests check the comparison rules the diff relies on, using
//! randomized resources and field values.

use gdcl::reconcile::canonicalize::{port_ranges_equivalent, values_equivalent};
use gdcl::reconcile::diff::diff_resource;
use gdcl::resource::url::{self_link_to_name, self_links_equivalent};
use gdcl::resource::{get_resource, Resource};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Generate an arbitrary VPC network in the shape a user would declare it
fn arb_network() -> impl Strategy<Value = Resource> {
    (
        "[a-z][a-z0-9-]{0,30}",                  // name
        "[a-z][a-z0-9-]{4,20}",                  // project
        any::<bool>(),                           // autoCreateSubnetworks
        prop::option::of(1300i64..8897),         // mtu
        prop::option::of("[a-zA-Z0-9 ]{0,40}"),  // description
        prop::option::of(prop_oneof!["REGIONAL", "GLOBAL"]),
    )
        .prop_map(|(name, project, auto, mtu, description, routing_mode)| {
            let mut r = Resource::new("compute.Network")
                .with("name", name)
                .with("project", project)
                .with("autoCreateSubnetworks", auto);
            if let Some(mtu) = mtu {
                r.set("mtu", mtu);
            }
            if let Some(description) = description {
                r.set("description", description);
            }
            if let Some(mode) = routing_mode {
                r.set("routingConfig", json!({"routingMode": mode}));
            }
            r
        })
}

fn arb_port_range() -> impl Strategy<Value = (u16, u16)> {
    (1u16..65535).prop_flat_map(|start| (Just(start), start..=65535))
}

proptest! {
    /// A resource never differs from itself
    #[test]
    fn diff_with_self_is_empty(network in arb_network()) {
        let diffs = diff_resource(&network, &network).unwrap();
        prop_assert!(diffs.is_empty(), "unexpected diffs: {:?}", diffs);
    }

    /// Fields missing from the desired state are never reported
    #[test]
    fn unset_desired_fields_are_unmanaged(network in arb_network(), mtu in 1300i64..8897) {
        let mut desired = Resource::new("compute.Network");
        for name in ["name", "project", "autoCreateSubnetworks"] {
            if let Some(value) = network.get(name) {
                desired.set(name, value.clone());
            }
        }
        let actual = network.with("mtu", mtu).with("selfLink", "https://example.test/x");
        let diffs = diff_resource(&desired, &actual).unwrap();
        prop_assert!(diffs.is_empty(), "unexpected diffs: {:?}", diffs);
    }

    /// Changing a managed field yields exactly one diff for it
    #[test]
    fn changed_mtu_is_one_diff(network in arb_network(), mtu in 1300i64..8897) {
        let actual = network.clone().with("mtu", mtu);
        let desired = network.with("mtu", mtu + 1);
        let diffs = diff_resource(&desired, &actual).unwrap();
        prop_assert_eq!(diffs.len(), 1);
        prop_assert_eq!(diffs[0].field_name.to_string(), "mtu");
        prop_assert!(!diffs[0].requires_recreate());
    }

    /// "80" and "80-80" name the same port range
    #[test]
    fn single_port_matches_degenerate_range(port in 1u16..=65535) {
        let single = port.to_string();
        let range = format!("{}-{}", port, port);
        prop_assert!(port_ranges_equivalent(&single, &range));
        prop_assert!(port_ranges_equivalent(&range, &single));
    }

    #[test]
    fn port_range_equivalence_is_reflexive_and_symmetric(
        (a_start, a_end) in arb_port_range(),
        (b_start, b_end) in arb_port_range(),
    ) {
        let a = format!("{}-{}", a_start, a_end);
        let b = format!("{}-{}", b_start, b_end);
        prop_assert!(port_ranges_equivalent(&a, &a));
        prop_assert_eq!(port_ranges_equivalent(&a, &b), port_ranges_equivalent(&b, &a));
        prop_assert_eq!(
            port_ranges_equivalent(&a, &b),
            a_start == b_start && a_end == b_end
        );
    }

    /// A bare name matches any self link ending in that name
    #[test]
    fn bare_name_matches_self_link(
        project in "[a-z][a-z0-9-]{4,20}",
        name in "[a-z][a-z0-9-]{0,30}",
    ) {
        let link = format!(
            "https://www.googleapis.com/compute/v1/projects/{}/global/networks/{}",
            project, name
        );
        prop_assert_eq!(self_link_to_name(&link), name.as_str());
        prop_assert!(self_links_equivalent(&name, &link));
        prop_assert!(self_links_equivalent(&link, &name));
        let other = format!("{}-other", name);
        prop_assert!(!self_links_equivalent(&other, &link));
    }

    /// Zone- or global-relative paths match the full self link they abbreviate
    #[test]
    fn partial_reference_matches_self_link(
        project in "[a-z][a-z0-9-]{4,20}",
        zone in "[a-z]{2,8}-[a-z]{2,8}[0-9]-[a-c]",
        name in "[a-z][a-z0-9-]{0,30}",
        other_zone in "[a-z]{2,8}-[a-z]{2,8}[0-9]-[d-f]",
    ) {
        let machine_type = format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/machineTypes/{}",
            project, zone, name
        );
        let partial = format!("zones/{}/machineTypes/{}", zone, name);
        prop_assert!(self_links_equivalent(&partial, &machine_type));
        prop_assert!(self_links_equivalent(&machine_type, &partial));
        let elsewhere = format!("zones/{}/machineTypes/{}", other_zone, name);
        prop_assert!(!self_links_equivalent(&elsewhere, &machine_type));

        let network = format!(
            "https://www.googleapis.com/compute/v1/projects/{}/global/networks/{}",
            project, name
        );
        let same = format!("global/networks/{}", name);
        prop_assert!(self_links_equivalent(&same, &network));
        let different = format!("global/networks/x{}", name);
        prop_assert!(!self_links_equivalent(&different, &network));
    }

    /// Set-valued arrays compare without regard to order
    #[test]
    fn set_arrays_ignore_order(
        ports in prop::collection::hash_set("[0-9]{1,5}", 0..8),
        shift in 0usize..8,
    ) {
        let def = get_resource("compute.ForwardingRule").unwrap();
        let field = def.field("ports").unwrap();

        let ordered: Vec<Value> = ports.iter().map(|p| json!(p)).collect();
        let mut rotated = ordered.clone();
        if !rotated.is_empty() {
            let len = rotated.len();
            rotated.rotate_left(shift % len);
        }

        prop_assert!(values_equivalent(field, &json!(ordered), &json!(rotated)));

        let mut extra = rotated.clone();
        extra.push(json!("not-a-port"));
        prop_assert!(!values_equivalent(field, &json!(ordered), &json!(extra)));
    }

    /// Manifest-style JSON survives a trip through Resource unchanged
    #[test]
    fn resource_serde_preserves_fields(network in arb_network()) {
        let value = serde_json::to_value(&network).unwrap();
        prop_assert_eq!(value["kind"].as_str(), Some("compute.Network"));
        let back: Resource = serde_json::from_value(value).unwrap();
        prop_assert_eq!(back.fields, network.fields);
    }
}
