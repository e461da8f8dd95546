//! Reconciler entry points
//!
//! [`Reconciler::apply`] runs the whole loop for one resource:
//!
//! 1. validate the raw desired state
//! 2. read the raw initial state (a missing resource means "create")
//! 3. canonicalize both states and diff them
//! 4. group diffs by operation, check lifecycle directives, plan
//! 5. execute the plan
//! 6. read the new state and diff it against the desired state again; any
//!    remaining difference is reported as [`DclError::DiffAfterApply`]

use super::actuate::{self, execute, get_state};
use super::canonicalize::{
    canonicalize_desired_state, canonicalize_initial_state, canonicalize_new_state,
};
use super::diff::diff_resource;
use super::options::{fetch_lifecycle_params, fetch_state_hint, ApplyOption};
use super::plan::{convert_field_diffs, plan_operations, ApiOperation, Plan};
use crate::error::{DclError, Result};
use crate::gcp::client::GcpClient;
use crate::gcp::retry::retry;
use crate::resource::{fetch_list, Resource, ResourceList};
use serde_json::Value;
use std::future::Future;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Converges resources to their declared state
#[derive(Clone)]
pub struct Reconciler {
    client: GcpClient,
}

impl Reconciler {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GcpClient {
        &self.client
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.client.config.timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DclError::Timeout(timeout)),
        }
    }

    /// Converge the resource to `raw_desired` and return its new state.
    /// The whole call is re-run when the API reports a conflict.
    pub async fn apply(&self, raw_desired: &Resource, opts: &[ApplyOption]) -> Result<Resource> {
        let span = info_span!(
            "apply",
            request_id = %Uuid::new_v4(),
            resource = %raw_desired.identity()
        );
        let policy = self.client.config.retry;
        self.with_timeout(retry(&policy, DclError::is_conflict, |attempt| async move {
            if attempt > 0 {
                info!("Retrying apply after conflict (attempt {})", attempt + 1);
            }
            self.apply_once(raw_desired, opts).await
        }))
        .instrument(span)
        .await
    }

    /// Read, diff and plan without changing anything
    pub async fn plan(&self, raw_desired: &Resource, opts: &[ApplyOption]) -> Result<Plan> {
        let span = info_span!(
            "plan",
            request_id = %Uuid::new_v4(),
            resource = %raw_desired.identity()
        );
        self.with_timeout(async {
            raw_desired.validate()?;
            self.plan_inner(raw_desired, opts).await
        })
        .instrument(span)
        .await
    }

    /// Read a resource, canonicalized against the request
    pub async fn get(&self, resource: &Resource) -> Result<Resource> {
        let span = info_span!(
            "get",
            request_id = %Uuid::new_v4(),
            resource = %resource.identity()
        );
        self.with_timeout(async {
            let raw = get_state(&self.client, resource).await?;
            canonicalize_new_state(&raw, resource)
        })
        .instrument(span)
        .await
    }

    /// Delete a resource; a missing resource is not an error
    pub async fn delete(&self, resource: &Resource) -> Result<()> {
        let span = info_span!(
            "delete",
            request_id = %Uuid::new_v4(),
            resource = %resource.identity()
        );
        self.with_timeout(actuate::delete(&self.client, resource))
            .instrument(span)
            .await
    }

    /// First page of resources in `scope` (a resource carrying the kind's
    /// scope parameters)
    pub async fn list(&self, scope: &Resource) -> Result<ResourceList> {
        self.list_with_max_results(scope, 0).await
    }

    pub async fn list_with_max_results(&self, scope: &Resource, max_results: u32) -> Result<ResourceList> {
        let span = info_span!("list", request_id = %Uuid::new_v4(), kind = %scope.kind);
        self.with_timeout(fetch_list(&self.client, scope, max_results))
            .instrument(span)
            .await
    }

    /// Delete every resource in `scope` accepted by `filter`. Failures do
    /// not stop the sweep; all of them are returned together.
    pub async fn delete_all<F>(&self, scope: &Resource, filter: F) -> Result<()>
    where
        F: Fn(&Resource) -> bool,
    {
        let span = info_span!("delete_all", request_id = %Uuid::new_v4(), kind = %scope.kind);
        async {
            let mut list = self.list(scope).await?;
            let mut errors = Vec::new();
            loop {
                for resource in list.items.iter().filter(|r| filter(*r)) {
                    if let Err(e) = self.delete(resource).await {
                        warn!("Failed to delete {}: {}", resource.identity(), e);
                        errors.push(e.to_string());
                    }
                }
                if !list.has_next() {
                    break;
                }
                list.next(&self.client).await?;
            }
            if errors.is_empty() {
                Ok(())
            } else {
                Err(DclError::Multiple(errors))
            }
        }
        .instrument(span)
        .await
    }

    async fn apply_once(&self, raw_desired: &Resource, opts: &[ApplyOption]) -> Result<Resource> {
        info!("Beginning apply");
        info!("User specified desired state: {}", raw_desired);
        raw_desired.validate()?;

        let plan = self.plan_inner(raw_desired, opts).await?;

        let mut first_response = None;
        for op in &plan.operations {
            info!("Performing operation {}", op);
            match execute(&self.client, op, &plan.desired).await {
                Ok(response) => {
                    if matches!(op, ApiOperation::Create) {
                        first_response = response;
                    }
                },
                Err(e) => {
                    info!("Failed operation {}: {}", op, e);
                    return Err(e);
                },
            }
            info!("Finished operation {}", op);
        }

        self.verify(&plan.desired, raw_desired, first_response).await
    }

    async fn plan_inner(&self, raw_desired: &Resource, opts: &[ApplyOption]) -> Result<Plan> {
        let def = raw_desired.def()?;

        let fetch_state = match fetch_state_hint(opts) {
            Some(hint) if hint.kind == raw_desired.kind => hint,
            Some(hint) => {
                warn!(
                    "Initial state hint was of the wrong kind; expected {}, got {}",
                    raw_desired.kind, hint.kind
                );
                raw_desired
            },
            None => raw_desired,
        };

        info!("Fetching initial state");
        let raw_initial = match get_state(&self.client, fetch_state).await {
            Ok(state) => Some(state),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Failed to retrieve whether {} exists: {}", raw_desired.identity(), e);
                return Err(e);
            },
        };

        let (initial, desired, diffs) = match raw_initial {
            None => {
                info!("Found that {} does not exist", raw_desired.identity());
                (None, canonicalize_desired_state(raw_desired, None)?, Vec::new())
            },
            Some(raw_initial) => {
                info!("Found initial state: {}", raw_initial);
                let initial = canonicalize_initial_state(&raw_initial, raw_desired);
                let desired = canonicalize_desired_state(raw_desired, Some(&raw_initial))?;
                info!("Canonicalized desired state: {}", desired);
                let diffs = diff_resource(&desired, &initial)?;
                (Some(initial), desired, diffs)
            },
        };

        let resource_diffs = convert_field_diffs(def, &diffs)?;
        let lifecycle = fetch_lifecycle_params(opts);
        let operations = plan_operations(initial.as_ref(), &desired, &resource_diffs, &lifecycle)?;
        info!(
            "Created plan: [{}]",
            operations
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Plan {
            initial,
            desired,
            diffs,
            operations,
        })
    }

    /// Re-read the resource and check that it converged
    async fn verify(
        &self,
        desired: &Resource,
        raw_desired: &Resource,
        first_response: Option<Value>,
    ) -> Result<Resource> {
        info!("Retrieving raw new state");
        let mut raw_new = get_state(&self.client, desired).await?;

        if let Some(response) = first_response {
            info!("Merging first response of create into new state");
            let full = Resource::from_response(response, raw_desired)?;
            raw_new = canonicalize_new_state(&raw_new, &full)?;
        }

        let new_state = canonicalize_new_state(&raw_new, raw_desired)?;
        info!("Created canonical new state: {}", new_state);

        let new_desired = canonicalize_desired_state(raw_desired, Some(&new_state))?;
        let diffs = diff_resource(&new_desired, &new_state)?;
        if diffs.is_empty() {
            info!("No diffs found. Apply was successful.");
            return Ok(new_state);
        }

        let messages: Vec<String> = diffs.iter().map(|d| d.to_string()).collect();
        info!("Found diffs after apply: {}", messages.join("; "));
        Err(DclError::DiffAfterApply {
            diffs: messages,
            new_state: Box::new(new_state),
        })
    }
}
