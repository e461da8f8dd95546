//! Operation execution
//!
//! Runs planned [`ApiOperation`]s against the REST API and waits for the
//! long-running operations they start.

use super::diff::FieldDiff;
use super::plan::ApiOperation;
use crate::error::{DclError, Result};
use crate::gcp::client::GcpClient;
use crate::gcp::operations::ComputeOperation;
use crate::resource::schema::{OperationStyle, ResourceDef, UpdateOperationDef, UrlTemplate};
use crate::resource::url::{add_query_params, join_base, resolve_url};
use crate::resource::{get_map_entry, set_map_entry, Resource};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Full URL for one of a resource's templates
pub fn resource_url(
    client: &GcpClient,
    def: &ResourceDef,
    template: &UrlTemplate,
    resource: &Resource,
) -> Result<String> {
    let path = resolve_url(template, resource)?;
    Ok(join_base(
        &def.base_path,
        client.config.base_path.as_deref(),
        &path,
    ))
}

/// Read the raw JSON state of a resource. Statuses the schema lists in
/// `not_found_codes` are reported as [`DclError::NotFound`].
pub async fn get_raw(client: &GcpClient, resource: &Resource) -> Result<Value> {
    let def = resource.def()?;
    let url = resource_url(client, def, &def.urls.get, resource)?;
    client
        .get(&url)
        .await
        .map_err(|e| as_not_found(def, e))
}

fn as_not_found(def: &ResourceDef, err: DclError) -> DclError {
    match err {
        DclError::Api { status, message } if def.not_found_codes.contains(&status) => {
            debug!("{} read returned {}; treating as not found", def.kind, status);
            DclError::NotFound(message)
        },
        other => other,
    }
}

/// Read a resource, keeping the request's scope parameters
pub async fn get_state(client: &GcpClient, resource: &Resource) -> Result<Resource> {
    let raw = get_raw(client, resource).await?;
    Resource::from_response(raw, resource)
}

/// Wait for the long-running operation a mutating call returned
async fn wait_for_operation(client: &GcpClient, def: &ResourceDef, response: &Value) -> Result<()> {
    if def.operation == OperationStyle::None {
        return Ok(());
    }
    let op = ComputeOperation::from_value(response)?;
    let op = op.wait(client, &def.base_path).await?;
    debug!("Operation {} done", op.name);
    Ok(())
}

/// Run one planned operation. Returns the first response of a create
/// for kinds that answer synchronously.
pub async fn execute(
    client: &GcpClient,
    op: &ApiOperation,
    desired: &Resource,
) -> Result<Option<Value>> {
    match op {
        ApiOperation::Create => create(client, desired).await,
        ApiOperation::Delete => delete(client, desired).await.map(|_| None),
        ApiOperation::Update { name, field_diffs } => {
            update(client, desired, name, field_diffs).await.map(|_| None)
        },
    }
}

/// POST the desired state to the create URL, wait, then confirm with a GET
pub async fn create(client: &GcpClient, desired: &Resource) -> Result<Option<Value>> {
    info!("Attempting to create {}", desired.identity());
    let def = desired.def()?;
    let url = resource_url(client, def, &def.urls.create, desired)?;
    let body = desired.to_request_body()?;

    let response = client.post(&url, Some(&body)).await?;
    if let Err(e) = wait_for_operation(client, def, &response).await {
        warn!("Creation of {} failed after waiting for operation: {}", desired.identity(), e);
        return Err(e);
    }
    let first_response = match def.operation {
        OperationStyle::None => Some(response),
        OperationStyle::Compute => None,
    };

    if let Err(e) = get_raw(client, desired).await {
        warn!("Get after create of {} returned error: {}", desired.identity(), e);
        return Err(e);
    }
    Ok(first_response)
}

/// Run a named in-place update
pub async fn update(
    client: &GcpClient,
    desired: &Resource,
    op_name: &str,
    field_diffs: &[FieldDiff],
) -> Result<()> {
    let def = desired.def()?;
    let op = def.update_operation(op_name).ok_or_else(|| {
        DclError::Schema(format!("{}: unknown update operation {}", def.kind, op_name))
    })?;

    // Fingerprints come from the live resource
    let raw = get_raw(client, desired).await?;
    let body = update_body(desired, op, &raw)?;

    let mut url = resource_url(client, def, &op.url, desired)?;
    if op.update_mask {
        url = add_query_params(&url, &[("updateMask", update_mask(field_diffs))])?;
    }

    info!("Performing {} on {}", op.name, desired.identity());
    debug!("Update body: {}", body);
    let body = if body.as_object().is_some_and(|m| m.is_empty()) {
        None
    } else {
        Some(&body)
    };
    let response = client.request(op.method(), &url, body).await?;
    wait_for_operation(client, def, &response).await
}

/// Request body for an update operation
pub fn update_body(desired: &Resource, op: &UpdateOperationDef, raw_current: &Value) -> Result<Value> {
    let mut partial = Resource::new(&desired.kind);
    for name in &op.fields {
        if let Some(value) = desired.get(name) {
            partial.set(name, value.clone());
        }
    }
    let mut body = partial.to_request_body()?;

    if let Some(body_field) = &op.body_field {
        body = match body.get(body_field) {
            Some(Value::Object(inner)) => Value::Object(inner.clone()),
            _ => Value::Object(Map::new()),
        };
    }

    if let Value::Object(map) = &mut body {
        for copy in &op.fingerprint {
            if let Some(value) = get_map_entry(raw_current, &copy.from) {
                set_map_entry(map, &copy.to, value.clone());
            }
        }
    }
    Ok(body)
}

/// Comma-separated top-level fields changed by an update
pub fn update_mask(field_diffs: &[FieldDiff]) -> String {
    let mut fields: Vec<&str> = Vec::new();
    for diff in field_diffs {
        let top = diff.field_name.top_level();
        if !fields.contains(&top) {
            fields.push(top);
        }
    }
    fields.join(",")
}

/// Delete a resource and wait until reads stop returning it.
/// A resource that is already gone counts as deleted.
pub async fn delete(client: &GcpClient, resource: &Resource) -> Result<()> {
    let current = match get_state(client, resource).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => {
            info!("{} not found, nothing to delete", resource.identity());
            return Ok(());
        },
        Err(e) => {
            warn!("Get before delete of {} failed: {}", resource.identity(), e);
            return Err(e);
        },
    };

    let def = resource.def()?;
    let url = resource_url(client, def, &def.urls.delete, &current)?;
    info!("Deleting {}", resource.identity());
    let response = client.request(def.delete_method(), &url, None).await?;
    wait_for_operation(client, def, &response).await?;

    // Reads can briefly return a deleted resource
    let retries = client.config.delete_confirm_retries;
    for attempt in 0..=retries {
        match get_raw(client, &current).await {
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
            Ok(_) if attempt == retries => break,
            Ok(_) => {
                debug!("{} still readable after delete (attempt {})", resource.identity(), attempt + 1);
                tokio::time::sleep(client.config.poll_interval).await;
            },
        }
    }
    Err(DclError::NotDeleted(resource.identity()))
}

/// HTTP method and URL a plan step would use, for dry-run output
pub fn describe(client: &GcpClient, op: &ApiOperation, desired: &Resource) -> Result<(Method, String)> {
    let def = desired.def()?;
    match op {
        ApiOperation::Create => Ok((Method::POST, resource_url(client, def, &def.urls.create, desired)?)),
        ApiOperation::Delete => Ok((
            def.delete_method(),
            resource_url(client, def, &def.urls.delete, desired)?,
        )),
        ApiOperation::Update { name, .. } => {
            let op = def.update_operation(name).ok_or_else(|| {
                DclError::Schema(format!("{}: unknown update operation {}", def.kind, name))
            })?;
            Ok((op.method(), resource_url(client, def, &op.url, desired)?))
        },
    }
}
