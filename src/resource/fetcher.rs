//! Resource Fetcher
//!
//! Lists resources of one kind page by page and provides the dot-path JSON
//! helpers used for list item paths and fingerprints.

use super::model::Resource;
use super::schema::ResourceDef;
use super::url::{add_query_params, join_base, resolve_url};
use crate::error::{DclError, Result};
use crate::gcp::client::GcpClient;
use serde_json::{Map, Value};
use tracing::debug;

/// One page of listed resources plus what is needed to fetch the next one
#[derive(Debug, Clone)]
pub struct ResourceList {
    pub kind: String,
    pub items: Vec<Resource>,
    pub next_token: Option<String>,
    pub page_size: u32,
    /// Resource carrying the scope parameters (project, region, ...)
    scope: Resource,
}

impl ResourceList {
    pub fn has_next(&self) -> bool {
        self.next_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Replace `items` with the next page
    pub async fn next(&mut self, client: &GcpClient) -> Result<()> {
        let Some(token) = self.next_token.clone().filter(|t| !t.is_empty()) else {
            return Err(DclError::Validation(format!(
                "no next page for {} list",
                self.kind
            )));
        };
        let def = self.scope.def()?;
        let (items, next_token) =
            fetch_page(client, def, &self.scope, Some(&token), self.page_size).await?;
        self.items = items;
        self.next_token = next_token;
        Ok(())
    }
}

/// Fetch the first page of resources in `scope`
pub async fn fetch_list(client: &GcpClient, scope: &Resource, page_size: u32) -> Result<ResourceList> {
    let def = scope.def()?;
    scope.validate_parameters()?;
    let page_size = if page_size == 0 {
        def.max_page
    } else {
        page_size.min(def.max_page)
    };
    let (items, next_token) = fetch_page(client, def, scope, None, page_size).await?;
    Ok(ResourceList {
        kind: def.kind.clone(),
        items,
        next_token,
        page_size,
        scope: scope.clone(),
    })
}

/// Fetch all resources in `scope` (auto-paginate)
pub async fn fetch_all(client: &GcpClient, scope: &Resource) -> Result<Vec<Resource>> {
    let mut list = fetch_list(client, scope, 0).await?;
    let mut all_items = std::mem::take(&mut list.items);
    while list.has_next() {
        list.next(client).await?;
        all_items.append(&mut list.items);
    }
    Ok(all_items)
}

/// Fetch one page of resources
pub async fn fetch_page(
    client: &GcpClient,
    def: &ResourceDef,
    scope: &Resource,
    page_token: Option<&str>,
    page_size: u32,
) -> Result<(Vec<Resource>, Option<String>)> {
    let Some(list_template) = &def.urls.list else {
        return Err(DclError::Schema(format!("{} cannot be listed", def.kind)));
    };
    let path = resolve_url(list_template, scope)?;
    let url = join_base(&def.base_path, client.config.base_path.as_deref(), &path);

    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(param) = &def.page_size_param {
        params.push((param.as_str(), page_size.to_string()));
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }
    let url = add_query_params(&url, &params)?;

    let response = client.get(&url).await?;
    let items = match get_map_entry(&response, &def.list_items_path) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    debug!("Listed {} {} items", items.len(), def.kind);

    let resources = items
        .into_iter()
        .map(|item| Resource::from_response(item, scope))
        .collect::<Result<Vec<_>>>()?;

    let next_token = response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok((resources, next_token))
}

/// Look up a value by dot-notation path; numeric segments index arrays
pub fn get_map_entry<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for part in path.split('.') {
        current = match (current, part.parse::<usize>()) {
            (Value::Array(items), Ok(idx)) => items.get(idx)?,
            _ => current.get(part)?,
        };
    }
    Some(current)
}

/// Set a value by dot-notation path, creating intermediate objects
pub fn set_map_entry(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = map;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else { return };
        current = next;
    }
}

/// Extract a value from JSON using a dot-notation path, rendered for display
pub fn extract_json_value(item: &Value, path: &str) -> String {
    match get_map_entry(item, path) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(arr)) => format!("[{} items]", arr.len()),
        Some(Value::Object(_)) => "[object]".to_string(),
    }
}
