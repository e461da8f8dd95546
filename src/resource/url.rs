//! URL templating and resource reference helpers
//!
//! Schema URLs are templates such as
//! `projects/{{project}}/regions/{{region}}/subnetworks/{{name}}`. Each
//! placeholder is filled from the resource's fields after reducing self-links
//! to their trailing name.

use super::model::{value_to_plain_string, Resource};
use super::schema::UrlTemplate;
use crate::error::{DclError, Result};
use serde_json::Value;
use url::Url;

/// Marker that starts the project-relative part of a Compute self-link
const RELATIVE_MARKER: &str = "projects/";

/// Reduce a self-link (or relative link) to its trailing name
/// e.g., "https://www.googleapis.com/compute/v1/projects/p/global/networks/default" -> "default"
pub fn self_link_to_name(link: &str) -> &str {
    link.trim_end_matches('/').rsplit('/').next().unwrap_or(link)
}

/// Strip scheme, host and API version from a self-link, leaving
/// `projects/...`; other strings are returned unchanged
pub fn relative_self_link(link: &str) -> &str {
    if link.starts_with(RELATIVE_MARKER) {
        return link;
    }
    match link.find(&format!("/{}", RELATIVE_MARKER)) {
        Some(idx) => &link[idx + 1..],
        None => link,
    }
}

/// Whether two resource references point at the same resource.
/// A bare name or a partial path such as `zones/z/machineTypes/e2-small`
/// matches any link ending in it on a `/` boundary.
pub fn self_links_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let a = relative_self_link(a).trim_matches('/');
    let b = relative_self_link(b).trim_matches('/');
    a == b || is_link_suffix(a, b) || is_link_suffix(b, a)
}

/// `short` is a whole-segment suffix of `long`
fn is_link_suffix(long: &str, short: &str) -> bool {
    !short.is_empty()
        && long.len() > short.len()
        && long.ends_with(short)
        && long.as_bytes()[long.len() - short.len() - 1] == b'/'
}

/// Fill every `{{field}}` placeholder in `template` from `resource`
pub fn render(template: &str, resource: &Resource) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(DclError::Schema(format!(
                "unterminated placeholder in URL template {}",
                template
            )));
        };
        let field = after[..end].trim();
        let value = placeholder_value(resource, field).ok_or_else(|| {
            DclError::Validation(format!(
                "{}: field {} is required to build URL {}",
                resource.identity(),
                field,
                template
            ))
        })?;
        out.push_str(&urlencoding::encode(&value));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn placeholder_value(resource: &Resource, field: &str) -> Option<String> {
    let value = resource.get(field)?;
    let text = match value {
        Value::String(s) => self_link_to_name(s).to_string(),
        Value::Number(_) | Value::Bool(_) => value_to_plain_string(value),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Render the first applicable variant of a URL template
pub fn resolve_url(template: &UrlTemplate, resource: &Resource) -> Result<String> {
    match template {
        UrlTemplate::Single(t) => render(t, resource),
        UrlTemplate::Variants(variants) => {
            let chosen = variants.iter().find(|v| match &v.when {
                Some(field) => !resource.is_unset(field),
                None => true,
            });
            match chosen {
                Some(v) => render(&v.template, resource),
                None => Err(DclError::Validation(format!(
                    "{}: no URL variant applies",
                    resource.identity()
                ))),
            }
        },
    }
}

/// Join a relative path onto the schema base path (or its override)
pub fn join_base(base: &str, base_override: Option<&str>, path: &str) -> String {
    let base = base_override.unwrap_or(base);
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Append query parameters, keeping any already in the URL
pub fn add_query_params(url: &str, params: &[(&str, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok(url.to_string());
    }
    let mut parsed = Url::parse(url)?;
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::schema::UrlVariant;

    const NETWORK_LINK: &str =
        "https://www.googleapis.com/compute/v1/projects/my-project/global/networks/default";

    #[test]
    fn test_self_link_to_name() {
        assert_eq!(self_link_to_name(NETWORK_LINK), "default");
        assert_eq!(self_link_to_name("default"), "default");
        assert_eq!(self_link_to_name("projects/p/zones/us-east1-b/"), "us-east1-b");
    }

    #[test]
    fn test_relative_self_link() {
        assert_eq!(
            relative_self_link(NETWORK_LINK),
            "projects/my-project/global/networks/default"
        );
        assert_eq!(
            relative_self_link("projects/p/global/networks/n"),
            "projects/p/global/networks/n"
        );
        assert_eq!(relative_self_link("default"), "default");
    }

    #[test]
    fn test_self_links_equivalent() {
        assert!(self_links_equivalent(
            NETWORK_LINK,
            "projects/my-project/global/networks/default"
        ));
        assert!(self_links_equivalent(NETWORK_LINK, "default"));
        assert!(self_links_equivalent("default", NETWORK_LINK));
        assert!(!self_links_equivalent(NETWORK_LINK, "other"));
        assert!(!self_links_equivalent(
            NETWORK_LINK,
            "projects/other-project/global/networks/default"
        ));
    }

    #[test]
    fn test_partial_references_match_full_links() {
        assert!(self_links_equivalent(NETWORK_LINK, "global/networks/default"));
        assert!(self_links_equivalent("global/networks/default", NETWORK_LINK));
        let machine_type = "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-small";
        assert!(self_links_equivalent(
            "zones/us-central1-a/machineTypes/e2-small",
            machine_type
        ));
        assert!(self_links_equivalent(machine_type, "e2-small"));
        assert!(!self_links_equivalent(
            "zones/us-east1-b/machineTypes/e2-small",
            machine_type
        ));
        // suffixes must start on a segment boundary
        assert!(!self_links_equivalent("small", machine_type));
        assert!(!self_links_equivalent("ault", NETWORK_LINK));
        assert!(!self_links_equivalent("", NETWORK_LINK));
    }

    #[test]
    fn test_render_fills_and_encodes() {
        let r = Resource::new("compute.Network")
            .with("project", "projects/my project")
            .with("name", "net-1");
        let url = render("projects/{{project}}/global/networks/{{ name }}", &r).unwrap();
        assert_eq!(url, "projects/my%20project/global/networks/net-1");
    }

    #[test]
    fn test_render_numbers_and_bools() {
        let r = Resource::new("compute.FirewallPolicyRule")
            .with("firewallPolicy", "123")
            .with("priority", 1000)
            .with("deletionProtection", false);
        assert_eq!(
            render("p/{{firewallPolicy}}/getRule?priority={{priority}}", &r).unwrap(),
            "p/123/getRule?priority=1000"
        );
        assert_eq!(
            render("x?deletionProtection={{deletionProtection}}", &r).unwrap(),
            "x?deletionProtection=false"
        );
    }

    #[test]
    fn test_render_missing_field_is_error() {
        let r = Resource::new("compute.Network").with("name", "n");
        assert!(matches!(
            render("projects/{{project}}/global/networks/{{name}}", &r),
            Err(DclError::Validation(_))
        ));
        assert!(matches!(
            render("projects/{{project", &r),
            Err(DclError::Schema(_))
        ));
    }

    #[test]
    fn test_resolve_url_variants() {
        let template = UrlTemplate::Variants(vec![
            UrlVariant {
                when: Some("location".to_string()),
                template: "projects/{{project}}/regions/{{location}}/forwardingRules".to_string(),
            },
            UrlVariant {
                when: None,
                template: "projects/{{project}}/global/forwardingRules".to_string(),
            },
        ]);
        let global = Resource::new("compute.ForwardingRule").with("project", "p");
        assert_eq!(
            resolve_url(&template, &global).unwrap(),
            "projects/p/global/forwardingRules"
        );
        let regional = global.clone().with("location", "us-central1");
        assert_eq!(
            resolve_url(&template, &regional).unwrap(),
            "projects/p/regions/us-central1/forwardingRules"
        );
    }

    #[test]
    fn test_join_base() {
        assert_eq!(
            join_base("https://www.googleapis.com/compute/v1/", None, "projects/p"),
            "https://www.googleapis.com/compute/v1/projects/p"
        );
        assert_eq!(
            join_base(
                "https://www.googleapis.com/compute/v1/",
                Some("http://127.0.0.1:8080"),
                "/projects/p"
            ),
            "http://127.0.0.1:8080/projects/p"
        );
    }

    #[test]
    fn test_add_query_params() {
        let url = add_query_params(
            "https://example.com/things?priority=10",
            &[("pageToken", "a b".to_string()), ("maxResults", "5".to_string())],
        )
        .unwrap();
        assert_eq!(
            url,
            "https://example.com/things?priority=10&pageToken=a+b&maxResults=5"
        );
        assert_eq!(
            add_query_params("https://example.com/x", &[]).unwrap(),
            "https://example.com/x"
        );
    }
}
