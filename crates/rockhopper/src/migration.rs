//! Migration values, the version-ordered catalog slice and the per-package map
//!
//! A [`MigrationSlice`] is the catalog representation: a vector kept sorted
//! by version, where chain adjacency is index adjacency. `head`/`tail` are
//! the chain ends and `next`/`previous` are `i + 1` / `i - 1`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::AnyConnection;

use crate::error::{CatalogError, RockhopperError, RockhopperResult};
use crate::parser::Statement;

/// Package assigned to migrations that carry no explicit package
pub const DEFAULT_PACKAGE_NAME: &str = "main";

/// Future returned by a registered migration handler
pub type MigrationHandlerFuture<'c> =
    Pin<Box<dyn Future<Output = RockhopperResult<()>> + Send + 'c>>;

/// Handler used by migrations registered from code instead of SQL files.
/// It receives the executor the engine selected (a bare connection or one
/// inside the per-migration transaction).
pub type MigrationHandler =
    Arc<dyn for<'c> Fn(&'c mut AnyConnection) -> MigrationHandlerFuture<'c> + Send + Sync>;

/// One row of the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: i64,
    pub package: String,
    pub version_id: i64,
    pub is_applied: bool,
    pub time: DateTime<Utc>,
}

/// One ordered schema migration step
#[derive(Clone)]
pub struct Migration {
    /// Positive version number extracted from the source filename
    pub version: i64,
    /// Chain this migration belongs to
    pub package: String,
    /// Human label parsed from the filename
    pub name: String,
    /// Path of the source file, for logs
    pub source: String,

    pub up_statements: Vec<Statement>,
    pub down_statements: Vec<Statement>,

    /// Run the whole up or down inside one transaction
    pub use_tx: bool,
    /// Came from the code registry instead of an SQL file
    pub registered: bool,

    /// Handlers used in place of the statement lists for registered
    /// migrations
    pub up_fn: Option<MigrationHandler>,
    pub down_fn: Option<MigrationHandler>,

    /// Latest bookkeeping row observed for this migration
    pub record: Option<MigrationRecord>,
}

impl Default for Migration {
    fn default() -> Self {
        Self {
            version: 0,
            package: DEFAULT_PACKAGE_NAME.to_string(),
            name: String::new(),
            source: String::new(),
            up_statements: Vec::new(),
            down_statements: Vec::new(),
            use_tx: true,
            registered: false,
            up_fn: None,
            down_fn: None,
            record: None,
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("package", &self.package)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("up_statements", &self.up_statements.len())
            .field("down_statements", &self.down_statements.len())
            .field("use_tx", &self.use_tx)
            .field("registered", &self.registered)
            .finish()
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Version-ordered sequence of migrations forming one or more chains
#[derive(Debug, Clone, Default)]
pub struct MigrationSlice(Vec<Migration>);

impl MigrationSlice {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, migration: Migration) {
        self.0.push(migration);
    }

    /// Sort by version and validate the catalog invariants. Equal versions
    /// are a fatal load-time error.
    pub fn sort_and_connect(mut self) -> RockhopperResult<Self> {
        self.0.sort_by_key(|m| m.version);

        for pair in self.0.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(RockhopperError::Catalog(CatalogError::DuplicateVersion {
                    version: pair[0].version,
                    first: pair[0].source.clone(),
                    second: pair[1].source.clone(),
                }));
            }
        }

        Ok(self)
    }

    /// Index of the migration carrying the given version
    pub fn find_index(&self, version: i64) -> Option<usize> {
        self.0.iter().position(|m| m.version == version)
    }

    /// First migration of the chain
    pub fn head(&self) -> Option<&Migration> {
        self.0.first()
    }

    /// Last migration of the chain
    pub fn tail(&self) -> Option<&Migration> {
        self.0.last()
    }

    /// Successor in chain order, `None` at the tail
    pub fn next_of(&self, index: usize) -> Option<&Migration> {
        self.0.get(index + 1)
    }

    /// Predecessor in chain order, `None` at the head
    pub fn previous_of(&self, index: usize) -> Option<&Migration> {
        index.checked_sub(1).and_then(|i| self.0.get(i))
    }

    /// Group into one slice per package. Each sub-slice keeps the global
    /// version order of its members.
    pub fn map_by_package(&self) -> MigrationMap {
        let mut map: BTreeMap<String, MigrationSlice> = BTreeMap::new();
        for migration in &self.0 {
            map.entry(migration.package.clone())
                .or_default()
                .push(migration.clone());
        }

        MigrationMap(map)
    }
}

impl From<Vec<Migration>> for MigrationSlice {
    fn from(migrations: Vec<Migration>) -> Self {
        Self(migrations)
    }
}

impl Deref for MigrationSlice {
    type Target = [Migration];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MigrationSlice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for MigrationSlice {
    type Item = Migration;
    type IntoIter = std::vec::IntoIter<Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Per-package migration chains
#[derive(Debug, Clone, Default)]
pub struct MigrationMap(BTreeMap<String, MigrationSlice>);

impl MigrationMap {
    /// Keep only the listed packages
    pub fn filter_packages(mut self, allowed: &[String]) -> Self {
        if allowed.is_empty() {
            return self;
        }

        self.0.retain(|package, _| allowed.contains(package));
        self
    }

    /// Sort and link every per-package chain
    pub fn sort_and_connect(self) -> RockhopperResult<Self> {
        let mut map = BTreeMap::new();
        for (package, slice) in self.0 {
            map.insert(package, slice.sort_and_connect()?);
        }

        Ok(Self(map))
    }
}

impl Deref for MigrationMap {
    type Target = BTreeMap<String, MigrationSlice>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MigrationMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for MigrationMap {
    type Item = (String, MigrationSlice);
    type IntoIter = std::collections::btree_map::IntoIter<String, MigrationSlice>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
