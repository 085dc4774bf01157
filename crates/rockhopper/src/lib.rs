//! # rockhopper: SQL schema migration engine
//!
//! Discovers versioned migration scripts, determines which have been applied
//! for each logical package of migrations, and drives the database forward
//! or backward in a controlled, resumable way, recording every transition in
//! a bookkeeping table.
//!
//! The moving parts:
//! - `parser` - annotated SQL script parser producing up/down statement
//!   streams
//! - `migration` - catalog values, the version-ordered slice and the
//!   per-package map
//! - `registry` - process-wide registration of compiled migrations
//! - `loader` - filesystem discovery merged with the registry
//! - `dialect` - statement templates for the supported SQL flavors
//! - `db` - database handle and version bookkeeping store
//! - `runner` - up / down / redo / align execution engine
//! - `dumper` - compiles SQL migrations into Rust source files

pub mod config;
pub mod console;
pub mod db;
pub mod dialect;
pub mod dumper;
pub mod error;
pub mod loader;
pub mod migration;
pub mod parser;
pub mod registry;
pub mod runner;

// Error handling
pub use error::{
    CatalogError, ExecutionError, ParseError, RockhopperError, RockhopperResult, StoreError,
};

// Configuration
pub use config::Config;

// Script parsing
pub use parser::{Direction, MigrationParser, ScriptChunk, Statement};

// Catalog
pub use loader::{file_numeric_component, SqlMigrationLoader};
pub use migration::{
    Migration, MigrationHandler, MigrationHandlerFuture, MigrationMap, MigrationRecord,
    MigrationSlice, DEFAULT_PACKAGE_NAME,
};
pub use registry::{add_migration, global_registry, MigrationRegistry, RegistryKey};

// Database handle and store
pub use db::{
    cast_driver_name, DB, CORE_PACKAGE_NAME, DEFAULT_TABLE_NAME, LEGACY_GOOSE_TABLE_NAME,
    VERSION_ROCKHOPPER_V1,
};
pub use dialect::{load_dialect, SqlDialect};

// Execution engine
pub use runner::{align, down, down_by_steps, redo, up, up_by_steps};

// Code generation
pub use dumper::MigrationDumper;
