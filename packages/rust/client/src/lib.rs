//! HTTP client for the Atlassian site and organization admin APIs.
//!
//! This crate provides:
//! - [`AtlassianClient`]: one method per endpoint the export reads
//! - [`models`]: wire shapes for the responses that are not plain user objects

mod client;
pub mod models;

pub use client::AtlassianClient;
pub use models::{Group, ProductAccess, ProjectRole};
