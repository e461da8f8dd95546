//! Declarative reconciliation
//!
//! - [`canonicalize`] - Normalizes desired, initial and new states before diffing
//! - [`diff`] - Field-level diffs tagged with the operation that fixes them
//! - [`plan`] - Groups diffs into API operations under lifecycle directives
//! - [`actuate`] - Executes create / update / delete calls
//! - [`apply`] - [`Reconciler`], the public entry points

pub mod actuate;
pub mod apply;
pub mod canonicalize;
pub mod diff;
pub mod options;
pub mod plan;

pub use apply::Reconciler;
pub use diff::{FieldDiff, FieldName};
pub use options::{ApplyOption, LifecycleParam};
pub use plan::{ApiOperation, Plan, ResourceDiff};
