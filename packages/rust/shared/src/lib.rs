//! Shared types, error model, and configuration for accessreport.
//!
//! This crate is the foundation depended on by all other accessreport crates.
//! It provides:
//! - [`AccessReportError`]: the unified error type
//! - Domain types ([`UserProfile`], [`UserRecord`], [`LastActive`], [`Variant`], [`Column`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdminConfig, AdminCredentials, AppConfig, ExportConfig, HttpConfig, HttpPolicy, Overrides,
    Settings, SiteConfig, SiteCredentials, config_dir, config_file_path, init_config, load_config,
    load_config_from, millis, validate_project_key,
};
pub use error::{AccessReportError, Result};
pub use types::{
    Column, LastActive, LastActiveScope, NOT_AVAILABLE, UserProfile, UserRecord, Variant,
};
