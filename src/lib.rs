//! gdcl - declarative resource client for Google Cloud
//!
//! Resources are described by JSON schemas embedded in the crate. A
//! [`reconcile::Reconciler`] reads the live state of a resource, diffs it
//! against the declared state, and creates, updates or recreates the resource
//! until the two agree.

pub mod config;
pub mod error;
pub mod gcp;
pub mod manifest;
pub mod reconcile;
pub mod resource;

pub use error::{DclError, Result};
pub use reconcile::{ApplyOption, LifecycleParam, Reconciler};
pub use resource::Resource;
