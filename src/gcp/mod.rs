//! GCP API interaction module
//!
//! This module provides the plumbing for talking to Google Cloud REST APIs:
//! authentication, HTTP transport, retries and long-running operations.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operations`] - Polling of Compute Engine long-running operations
//! - [`retry`] - Exponential backoff for transient failures
//!
//! # Example
//!
//! ```ignore
//! use gdcl::gcp::client::{ClientConfig, GcpClient};
//!
//! async fn example() -> gdcl::Result<()> {
//!     let client = GcpClient::new(ClientConfig::default()).await?;
//!     let network = client
//!         .get("https://compute.googleapis.com/compute/v1/projects/my-project/global/networks/default")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operations;
pub mod retry;
