//! Catalog loader
//!
//! Discovers `*.sql` migration scripts under one or more directories, parses
//! them, merges in the registered programmatic migrations and produces the
//! sorted, linked catalog.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::error::{CatalogError, RockhopperError, RockhopperResult};
use crate::migration::{Migration, MigrationSlice, DEFAULT_PACKAGE_NAME};
use crate::parser::MigrationParser;
use crate::registry::{global_registry, MigrationRegistry};

/// Extracts the numeric version component from a migration filename.
///
/// Filenames follow `<VERSION>_<name>.<ext>` where `<VERSION>` is a run of
/// digits; an optional `<pkg>_` prefix in front of the version is tolerated.
/// `.sql` names are scripts, `.rs` names are emitted code.
pub fn file_numeric_component(name: &str) -> Result<i64, CatalogError> {
    let path = Path::new(name);
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CatalogError::BadFilename(name.to_string()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("sql") | Some("rs") => {}
        _ => return Err(CatalogError::BadFilename(name.to_string())),
    }

    let stem = base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base);

    for segment in stem.split('_') {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            let version: i64 = segment
                .parse()
                .map_err(|_| CatalogError::BadFilename(name.to_string()))?;

            if version <= 0 {
                return Err(CatalogError::BadFilename(name.to_string()));
            }

            return Ok(version);
        }
    }

    Err(CatalogError::BadFilename(name.to_string()))
}

/// The "description" portion of a migration filename: everything after the
/// version component, with the extension stripped.
fn migration_name(base: &str) -> String {
    let stem = base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base);

    let mut segments = stem.split('_');
    for segment in segments.by_ref() {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
    }

    segments.collect::<Vec<_>>().join("_")
}

/// Loads SQL migration scripts and merges them with registered migrations
#[derive(Debug, Default)]
pub struct SqlMigrationLoader {
    parser: MigrationParser,
    default_package: Option<String>,
    include_packages: Vec<String>,
    registry_entries: Option<Vec<Migration>>,
}

impl SqlMigrationLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            include_packages: config.packages.clone(),
            ..Self::default()
        }
    }

    /// Package assigned to scripts without a `-- @package` annotation.
    /// Falls back to `"main"` when unset.
    pub fn with_default_package(mut self, package: impl Into<String>) -> Self {
        self.default_package = Some(package.into());
        self
    }

    /// Keep only migrations belonging to the listed packages
    pub fn with_include_packages(mut self, packages: Vec<String>) -> Self {
        self.include_packages = packages;
        self
    }

    /// Merge entries from the given registry instead of the process-wide one
    pub fn with_registry(mut self, registry: &MigrationRegistry) -> Self {
        self.registry_entries = Some(registry.entries());
        self
    }

    /// Load every migration under the given directories plus the registry,
    /// returning the sorted and linked catalog.
    pub fn load<P: AsRef<Path>>(&self, dirs: &[P]) -> RockhopperResult<MigrationSlice> {
        let mut migrations = MigrationSlice::new();

        for dir in dirs {
            self.load_dir(dir.as_ref(), &mut migrations)?;
        }

        let registered = match &self.registry_entries {
            Some(entries) => entries.clone(),
            None => global_registry()
                .lock()
                .expect("migration registry lock poisoned")
                .entries(),
        };

        for migration in registered {
            migrations.push(migration);
        }

        let migrations = migrations.sort_and_connect()?;

        if self.include_packages.is_empty() {
            return Ok(migrations);
        }

        let allowed = &self.include_packages;
        let filtered: Vec<Migration> = migrations
            .into_iter()
            .filter(|m| allowed.contains(&m.package))
            .collect();

        Ok(MigrationSlice::from(filtered))
    }

    fn load_dir(&self, dir: &Path, migrations: &mut MigrationSlice) -> RockhopperResult<()> {
        if !dir.is_dir() {
            return Err(RockhopperError::Catalog(CatalogError::MissingDirectory(
                dir.display().to_string(),
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| {
                RockhopperError::Io(format!(
                    "failed to read migrations directory {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "sql"))
            .collect();

        // deterministic discovery order regardless of the filesystem
        files.sort();

        for file in files {
            migrations.push(self.read_source(&file)?);
        }

        Ok(())
    }

    fn read_source(&self, path: &Path) -> RockhopperResult<Migration> {
        let source = path.display().to_string();
        let base = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&source)
            .to_string();

        let version = file_numeric_component(&source)?;

        let file = fs::File::open(path).map_err(|e| {
            RockhopperError::Io(format!("failed to open migration script {}: {}", source, e))
        })?;

        let mut chunk = self.parser.parse(BufReader::new(file)).map_err(|e| {
            tracing::error!(source = %source, "failed to parse migration script");
            RockhopperError::Parse(e)
        })?;

        for stmt in chunk.up_stmts.iter_mut().chain(chunk.down_stmts.iter_mut()) {
            stmt.file = source.clone();
        }

        let package = chunk
            .package
            .take()
            .or_else(|| self.default_package.clone())
            .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string());

        debug!(source = %source, version, package = %package, "loaded migration script");

        Ok(Migration {
            version,
            package,
            name: migration_name(&base),
            source,
            up_statements: chunk.up_stmts,
            down_statements: chunk.down_stmts,
            use_tx: chunk.use_tx,
            ..Migration::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationHandlerFuture;
    use sqlx::AnyConnection;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn basic_script() -> &'static str {
        "-- +up\nCREATE TABLE a(id INT);\n-- +down\nDROP TABLE a;\n"
    }

    #[test]
    fn test_file_numeric_component() {
        assert_eq!(
            file_numeric_component("20200721225616_trades.sql").unwrap(),
            20200721225616
        );
        assert_eq!(
            file_numeric_component("migrations/20200721225616_trades.sql").unwrap(),
            20200721225616
        );
        // package prefix in front of the version is tolerated
        assert_eq!(
            file_numeric_component("app1_20240116231513_create_table_2.rs").unwrap(),
            20240116231513
        );
        // legacy short versions
        assert_eq!(file_numeric_component("3_add_index.sql").unwrap(), 3);

        assert!(file_numeric_component("notes.txt").is_err());
        assert!(file_numeric_component("no_version_here.sql").is_err());
        assert!(file_numeric_component("0_zero.sql").is_err());
    }

    #[test]
    fn test_migration_name() {
        assert_eq!(migration_name("20200721225616_trades.sql"), "trades");
        assert_eq!(
            migration_name("app1_20240116231513_create_table_2.sql"),
            "create_table_2"
        );
    }

    #[test]
    fn test_load_sorts_and_links() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "20240101000002_b.sql", basic_script());
        write_script(dir.path(), "20240101000001_a.sql", basic_script());
        write_script(dir.path(), "README.md", "not a migration");

        let loader = SqlMigrationLoader::new().with_registry(&MigrationRegistry::new());
        let migrations = loader.load(&[dir.path()]).unwrap();

        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 20240101000001);
        assert_eq!(migrations[0].name, "a");
        assert_eq!(migrations[0].package, "main");
        assert_eq!(migrations[1].version, 20240101000002);
        assert_eq!(migrations[0].up_statements.len(), 1);
        assert!(migrations[0].up_statements[0].file.ends_with("_a.sql"));
    }

    #[test]
    fn test_load_missing_directory() {
        let loader = SqlMigrationLoader::new().with_registry(&MigrationRegistry::new());
        let err = loader.load(&["does/not/exist"]).unwrap_err();
        assert!(matches!(
            err,
            RockhopperError::Catalog(CatalogError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = TempDir::new().unwrap();
        let loader = SqlMigrationLoader::new().with_registry(&MigrationRegistry::new());
        let migrations = loader.load(&[dir.path()]).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_bad_filename() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "create_table.sql", basic_script());

        let loader = SqlMigrationLoader::new().with_registry(&MigrationRegistry::new());
        let err = loader.load(&[dir.path()]).unwrap_err();
        assert!(matches!(
            err,
            RockhopperError::Catalog(CatalogError::BadFilename(_))
        ));
    }

    #[test]
    fn test_load_duplicate_version() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "20240101000001_a.sql", basic_script());
        write_script(dir.path(), "app1_20240101000001_b.sql", basic_script());

        let loader = SqlMigrationLoader::new().with_registry(&MigrationRegistry::new());
        let err = loader.load(&[dir.path()]).unwrap_err();
        assert!(matches!(
            err,
            RockhopperError::Catalog(CatalogError::DuplicateVersion { .. })
        ));
    }

    #[test]
    fn test_package_annotation_and_default() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "20240101000001_a.sql",
            "-- @package trading\n-- +up\nSELECT 1;\n",
        );
        write_script(dir.path(), "20240101000002_b.sql", basic_script());

        let loader = SqlMigrationLoader::new()
            .with_default_package("accounting")
            .with_registry(&MigrationRegistry::new());
        let migrations = loader.load(&[dir.path()]).unwrap();

        assert_eq!(migrations[0].package, "trading");
        assert_eq!(migrations[1].package, "accounting");
    }

    #[test]
    fn test_registry_merge_and_allow_list() {
        fn noop(_conn: &mut AnyConnection) -> MigrationHandlerFuture<'_> {
            Box::pin(async { Ok(()) })
        }

        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "20240101000001_a.sql", basic_script());

        let mut registry = MigrationRegistry::new();
        registry
            .add(
                "app1",
                "app1_20240101000002_b.rs",
                Arc::new(noop),
                Arc::new(noop),
            )
            .unwrap();

        let loader = SqlMigrationLoader::new().with_registry(&registry);
        let migrations = loader.load(&[dir.path()]).unwrap();
        assert_eq!(migrations.len(), 2);
        assert!(migrations[1].registered);

        let loader = SqlMigrationLoader::new()
            .with_registry(&registry)
            .with_include_packages(vec!["app1".to_string()]);
        let migrations = loader.load(&[dir.path()]).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].package, "app1");
    }
}
