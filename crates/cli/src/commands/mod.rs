pub mod align;
pub mod compile;
pub mod create;
pub mod down;
pub mod redo;
pub mod status;
pub mod up;

use rockhopper::{Config, MigrationMap, SqlMigrationLoader};

/// Load the catalog and group it into per-package chains, honoring the
/// configured package allow-list
pub fn load_migration_map(config: &Config) -> anyhow::Result<MigrationMap> {
    let loader = SqlMigrationLoader::from_config(config);
    let migrations = loader.load(&config.migrations_dirs)?;

    for m in migrations.iter() {
        tracing::debug!(package = %m.package, version = m.version, source = %m.source, "loaded migration");
    }

    let map = migrations
        .map_by_package()
        .filter_packages(&config.packages)
        .sort_and_connect()?;

    Ok(map)
}
