//! Resource abstraction layer
//!
//! This module provides a data-driven approach to managing GCP resources.
//! Resource schemas are loaded from JSON files at compile time, so a new
//! resource kind needs a schema document, not code.
//!
//! # Architecture
//!
//! - [`schema`] - Types describing a resource kind (URLs, fields, update operations)
//! - [`registry`] - Loads and caches resource schemas from embedded JSON
//! - [`model`] - The [`Resource`] value: validation and request marshalling
//! - [`url`] - URL templates and self-link normalization
//! - [`fetcher`] - Paginated listing and JSON path helpers
//!
//! # Resource Schemas
//!
//! Schemas live in JSON files under `src/resources/`:
//! - `network.json` - VPC networks, subnetworks, routes, VPN tunnels
//! - `load_balancing.json` - Forwarding rules, firewall policy rules
//! - `instance.json` - VM instances
//!
//! # Example
//!
//! ```ignore
//! use gdcl::resource::{fetch_all, Resource};
//! use gdcl::gcp::client::GcpClient;
//!
//! async fn list_networks(client: &GcpClient) -> gdcl::error::Result<Vec<Resource>> {
//!     let scope = Resource::new("compute.Network").with("project", "my-project");
//!     fetch_all(client, &scope).await
//! }
//! ```

pub mod fetcher;
pub mod model;
pub mod registry;
pub mod schema;
pub mod url;

pub use fetcher::{
    extract_json_value, fetch_all, fetch_list, get_map_entry, set_map_entry, ResourceList,
};
pub use model::{is_empty_value, Resource};
pub use registry::{get_all_resource_kinds, get_registry, get_resource, require_resource};
pub use schema::{FieldDef, FieldType, OperationSelector, ResourceDef};
