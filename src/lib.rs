//! StoreOps - E-commerce Operations Back Office
//!
//! Self-hosted back office for teams running shops across several
//! marketplaces.
//!
//! ## Features
//! - Platform and shop management (multi-tenant)
//! - User accounts with admin / operator roles
//! - Data tables: admin-defined field schemas with JSON row storage
//! - Spreadsheet import with append/overwrite modes and skip/abort strategies
//! - Sales dashboards
//! - Menu and system setting configuration
//! - Operation audit log

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod import;
pub mod models;
pub mod state;

pub use config::Config;
pub use state::AppState;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreOpsError {
    #[error("Schema error: {0}")]
    Schema(#[from] domain::aggregates::SchemaError),

    #[error("Import error: {0}")]
    Import(#[from] import::ImportError),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreOpsError>;
