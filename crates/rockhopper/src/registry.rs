//! Registry for migrations defined in code
//!
//! Compiled migration files register themselves here at program start.
//! The registry is an explicit object so tests can build and reset their
//! own instances; a process-wide default backs the generated
//! `register_migrations` glue.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::{RockhopperError, RockhopperResult};
use crate::loader::file_numeric_component;
use crate::migration::{Migration, MigrationHandler};

/// Identity of a registered migration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub package: String,
    pub version: i64,
}

/// Process-wide default registry used by generated migration modules
static GLOBAL_REGISTRY: Lazy<Mutex<MigrationRegistry>> =
    Lazy::new(|| Mutex::new(MigrationRegistry::new()));

/// Mapping from `(package, version)` to programmatic migrations
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: HashMap<RegistryKey, Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            migrations: HashMap::new(),
        }
    }

    /// Register a migration under `(package, version)` where the version is
    /// extracted from the source filename. A key collision is an error.
    pub fn add(
        &mut self,
        package: &str,
        source: &str,
        up: MigrationHandler,
        down: MigrationHandler,
    ) -> RockhopperResult<()> {
        let version = file_numeric_component(source)?;

        let key = RegistryKey {
            package: package.to_string(),
            version,
        };

        if let Some(existing) = self.migrations.get(&key) {
            return Err(RockhopperError::Registry(format!(
                "failed to add migration {:?}: version conflicts with {:?}",
                source, existing.source
            )));
        }

        let migration = Migration {
            version,
            package: package.to_string(),
            source: source.to_string(),
            registered: true,
            use_tx: true,
            up_fn: Some(up),
            down_fn: Some(down),
            ..Migration::default()
        };

        self.migrations.insert(key, migration);
        Ok(())
    }

    /// Snapshot of every registered migration, in no particular order; the
    /// loader sorts the combined catalog.
    pub fn entries(&self) -> Vec<Migration> {
        self.migrations.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Drop every registration. Tests use this between cases.
    pub fn reset(&mut self) {
        self.migrations.clear();
    }
}

/// The process-wide registry backing generated migration modules
pub fn global_registry() -> &'static Mutex<MigrationRegistry> {
    &GLOBAL_REGISTRY
}

/// Register a migration into the process-wide registry.
///
/// A key collision here is fatal: two compiled migration files claim the
/// same `(package, version)` and the program cannot continue.
pub fn add_migration(package: &str, source: &str, up: MigrationHandler, down: MigrationHandler) {
    GLOBAL_REGISTRY
        .lock()
        .expect("migration registry lock poisoned")
        .add(package, source, up, down)
        .unwrap_or_else(|err| panic!("{}", err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationHandlerFuture;
    use sqlx::AnyConnection;
    use std::sync::Arc;

    fn noop(_conn: &mut AnyConnection) -> MigrationHandlerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn noop_handler() -> MigrationHandler {
        Arc::new(noop)
    }

    #[test]
    fn test_add_and_entries() {
        let mut registry = MigrationRegistry::new();
        registry
            .add(
                "app1",
                "app1_20240116231513_create_table_2.rs",
                noop_handler(),
                noop_handler(),
            )
            .unwrap();

        let entries = registry.entries();
        assert_eq!(entries.len(), 1);

        let m = &entries[0];
        assert_eq!(m.version, 20240116231513);
        assert_eq!(m.package, "app1");
        assert!(m.registered);
        assert!(m.use_tx);
        assert!(m.up_fn.is_some());
        assert!(m.down_fn.is_some());
        assert!(m.up_statements.is_empty());
    }

    #[test]
    fn test_conflict_is_rejected() {
        let mut registry = MigrationRegistry::new();
        registry
            .add("main", "20240101000001_a.rs", noop_handler(), noop_handler())
            .unwrap();

        let err = registry
            .add("main", "20240101000001_b.rs", noop_handler(), noop_handler())
            .unwrap_err();
        assert!(matches!(err, RockhopperError::Registry(_)));

        // same version under another package is a distinct key
        registry
            .add("app1", "20240101000001_c.rs", noop_handler(), noop_handler())
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut registry = MigrationRegistry::new();
        registry
            .add("main", "20240101000001_a.rs", noop_handler(), noop_handler())
            .unwrap();

        registry.reset();
        assert!(registry.is_empty());
    }
}
