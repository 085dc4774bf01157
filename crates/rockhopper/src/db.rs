//! Database handle and version bookkeeping store
//!
//! [`DB`] owns the connection pool, the selected dialect and the bookkeeping
//! table name. `touch` idempotently creates the table, upgrading a legacy
//! `goose_db_version` table when one is found. Every apply or rollback is
//! recorded by appending a row; rows are never updated in place, so the
//! newest row per `(package, version)` is authoritative.

use std::collections::HashSet;
use std::sync::Once;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool, Row};
use tracing::{debug, warn};

use crate::config::Config;
use crate::dialect::{load_dialect, SqlDialect};
use crate::error::{RockhopperError, RockhopperResult, StoreError};
use crate::migration::{MigrationRecord, MigrationSlice};

/// Default bookkeeping table name
pub const DEFAULT_TABLE_NAME: &str = "rockhopper_versions";

/// Bookkeeping table used by the legacy goose tool
pub const LEGACY_GOOSE_TABLE_NAME: &str = "goose_db_version";

/// Package reserved for the bookkeeping table's own schema version
pub const CORE_PACKAGE_NAME: &str = "rockhopper";

pub const VERSION_GOOSE: i64 = 0;
pub const VERSION_ROCKHOPPER_V1: i64 = 1;

static INSTALL_DRIVERS: Once = Once::new();

/// Normalize a driver name to the wire-level driver that serves it while
/// the dialect stays distinct for SQL generation
pub fn cast_driver_name(driver: &str) -> &str {
    match driver {
        "mssql" => "sqlserver",
        "redshift" => "postgres",
        "tidb" => "mysql",
        "sqlite3" => "sqlite",
        other => other,
    }
}

fn normalize_dsn(driver: &str, dsn: &str) -> String {
    if driver == "sqlite" && !dsn.starts_with("sqlite") {
        if dsn == ":memory:" {
            return "sqlite::memory:".to_string();
        }
        return format!("sqlite://{}", dsn);
    }

    dsn.to_string()
}

/// Open database handle with the dialect injected into every store and
/// engine operation
pub struct DB {
    pool: AnyPool,
    driver_name: String,
    dialect: Box<dyn SqlDialect>,
    table_name: String,
}

impl std::fmt::Debug for DB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DB")
            .field("driver_name", &self.driver_name)
            .field("dialect", &self.dialect.name())
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl DB {
    /// Open a connection pool for the given driver.
    ///
    /// The pool is capped at one connection: operations run one at a time
    /// against one handle, and in-memory sqlite databases stay coherent.
    pub fn open(
        driver: &str,
        dialect: Box<dyn SqlDialect>,
        dsn: &str,
        table_name: &str,
    ) -> RockhopperResult<Self> {
        let driver = cast_driver_name(driver).to_string();

        match driver.as_str() {
            "postgres" | "mysql" | "sqlite" => {}
            _ => return Err(StoreError::UnsupportedDriver(driver).into()),
        }

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect_lazy(&normalize_dsn(&driver, dsn))
            .map_err(|e| RockhopperError::Database(format!("failed to open {}: {}", driver, e)))?;

        Ok(Self {
            pool,
            driver_name: driver,
            dialect,
            table_name: table_name.to_string(),
        })
    }

    pub fn open_with_config(config: &Config) -> RockhopperResult<Self> {
        let dialect = load_dialect(config.dialect_name())?;

        if config.dsn.is_empty() {
            return Err(RockhopperError::Configuration(
                "dsn is not defined".to_string(),
            ));
        }

        let table_name = if config.table_name.is_empty() {
            DEFAULT_TABLE_NAME
        } else {
            &config.table_name
        };

        Self::open(&config.driver, dialect, &config.dsn, table_name)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Idempotently create or upgrade the bookkeeping table
    pub async fn touch(&self) -> RockhopperResult<()> {
        let tables = self.get_table_names().await?;

        if tables.iter().any(|t| t == &self.table_name) {
            // verify the core version row, repairing it when absent
            let core_version = self.query_latest_version(CORE_PACKAGE_NAME).await?;
            if core_version == VERSION_GOOSE {
                let mut conn = self.pool.acquire().await?;
                self.insert_version(&mut conn, CORE_PACKAGE_NAME, "", VERSION_ROCKHOPPER_V1, true)
                    .await?;
            }
            return Ok(());
        }

        if tables.iter().any(|t| t == LEGACY_GOOSE_TABLE_NAME) {
            debug!(
                legacy = LEGACY_GOOSE_TABLE_NAME,
                table = %self.table_name,
                "upgrading legacy version table"
            );
            return self.migrate_legacy_table().await;
        }

        let mut tx = self.pool.begin().await?;
        let create = self.dialect.create_version_table_sql(&self.table_name);
        sqlx::query(&create).execute(&mut *tx).await?;
        self.insert_version(&mut tx, CORE_PACKAGE_NAME, "", VERSION_ROCKHOPPER_V1, true)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Move the legacy goose bookkeeping rows into the new table, inside
    /// one transaction
    async fn migrate_legacy_table(&self) -> RockhopperResult<()> {
        let statements = self
            .dialect
            .legacy_upgrade_sql(LEGACY_GOOSE_TABLE_NAME, &self.table_name);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::LegacyUpgradeFailed(e.to_string()))?;

        let result = async {
            for sql in &statements {
                sqlx::query(sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| format!("{}: {}", sql, e))?;
            }

            self.insert_version(&mut tx, CORE_PACKAGE_NAME, "", VERSION_ROCKHOPPER_V1, true)
                .await
                .map_err(|e| e.to_string())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::LegacyUpgradeFailed(e.to_string()))?;
                Ok(())
            }
            Err(message) => {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "failed to roll back legacy upgrade transaction");
                }
                Err(StoreError::LegacyUpgradeFailed(message).into())
            }
        }
    }

    pub async fn get_table_names(&self) -> RockhopperResult<Vec<String>> {
        let sql = self.dialect.get_table_names_sql();
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>(0)?);
        }

        Ok(names)
    }

    /// Append one bookkeeping row. `applied = true` records an apply,
    /// `applied = false` a rollback.
    pub async fn insert_version(
        &self,
        conn: &mut AnyConnection,
        package: &str,
        source_file: &str,
        version: i64,
        applied: bool,
    ) -> RockhopperResult<()> {
        let sql = self.dialect.insert_version_sql(&self.table_name);
        sqlx::query(&sql)
            .bind(package)
            .bind(source_file)
            .bind(version)
            .bind(applied)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                RockhopperError::Database(format!("failed to insert migration record: {}", e))
            })?;

        Ok(())
    }

    /// Delete every bookkeeping row of `(package, version)`
    pub async fn delete_version(
        &self,
        conn: &mut AnyConnection,
        package: &str,
        version: i64,
    ) -> RockhopperResult<()> {
        let sql = self.dialect.delete_version_sql(&self.table_name);
        sqlx::query(&sql)
            .bind(package)
            .bind(version)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                RockhopperError::Database(format!("failed to delete migration record: {}", e))
            })?;

        Ok(())
    }

    /// Latest applied version for a package, `0` when none exists.
    /// Versions whose newest row is a rollback do not count.
    pub async fn query_latest_version(&self, package: &str) -> RockhopperResult<i64> {
        let sql = self.dialect.select_last_version_sql(&self.table_name);
        let row = sqlx::query(&sql)
            .bind(package)
            .bind(package)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<Option<i64>, _>(0)?.unwrap_or(0))
    }

    /// Latest bookkeeping row for `(package, version)`, if any
    pub async fn find_migration(
        &self,
        package: &str,
        version: i64,
    ) -> RockhopperResult<Option<MigrationRecord>> {
        let sql = self.dialect.migration_sql(&self.table_name);
        let row = sqlx::query(&sql)
            .bind(package)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        Ok(Some(MigrationRecord {
            id: row.try_get(0)?,
            package: package.to_string(),
            version_id: version,
            is_applied: row.try_get::<i64, _>(2)? != 0,
            time: parse_timestamp(&row.try_get::<String, _>(1)?)?,
        }))
    }

    /// All bookkeeping rows for a package, newest first
    pub async fn load_migration_records_by_package(
        &self,
        package: &str,
    ) -> RockhopperResult<Vec<MigrationRecord>> {
        let sql = self.dialect.query_versions_sql(&self.table_name);
        let rows = sqlx::query(&sql).bind(package).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(MigrationRecord {
                id: row.try_get(0)?,
                package: row.try_get(1)?,
                version_id: row.try_get(2)?,
                is_applied: row.try_get::<i64, _>(3)? != 0,
                time: parse_timestamp(&row.try_get::<String, _>(4)?)?,
            });
        }

        Ok(records)
    }

    /// Walk the bookkeeping rows of the chain's package, newest first, and
    /// return the chain position of the last applied migration.
    ///
    /// A version whose newest row is a rollback is marked to be skipped, so
    /// an applied-then-rolled-back version is never treated as current.
    /// Also caches the found record on the catalog node.
    pub async fn find_last_applied_migration(
        &self,
        migrations: &mut MigrationSlice,
    ) -> RockhopperResult<Option<(usize, MigrationRecord)>> {
        let package = match migrations.head() {
            Some(m) => m.package.clone(),
            None => return Ok(None),
        };

        let records = self.load_migration_records_by_package(&package).await?;

        let mut skip: HashSet<i64> = HashSet::new();
        for record in records {
            if skip.contains(&record.version_id) {
                continue;
            }

            if !record.is_applied {
                skip.insert(record.version_id);
                continue;
            }

            match migrations.find_index(record.version_id) {
                Some(index) => {
                    migrations[index].record = Some(record.clone());
                    return Ok(Some((index, record)));
                }
                None => {
                    debug!(
                        package = %package,
                        version = record.version_id,
                        "applied version is not present in the catalog"
                    );
                }
            }
        }

        Ok(None)
    }
}

/// Parse the textual timestamps the dialect templates emit
fn parse_timestamp(s: &str) -> RockhopperResult<DateTime<Utc>> {
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(t.and_utc());
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }

    Err(RockhopperError::Database(format!(
        "unparseable bookkeeping timestamp {:?}",
        s
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_driver_name() {
        assert_eq!(cast_driver_name("mssql"), "sqlserver");
        assert_eq!(cast_driver_name("redshift"), "postgres");
        assert_eq!(cast_driver_name("tidb"), "mysql");
        assert_eq!(cast_driver_name("sqlite3"), "sqlite");
        assert_eq!(cast_driver_name("mysql"), "mysql");
    }

    #[test]
    fn test_normalize_dsn() {
        assert_eq!(normalize_dsn("sqlite", ":memory:"), "sqlite::memory:");
        assert_eq!(normalize_dsn("sqlite", "data/app.db"), "sqlite://data/app.db");
        assert_eq!(normalize_dsn("sqlite", "sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_dsn("postgres", "postgres://localhost/app"),
            "postgres://localhost/app"
        );
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-01-01 12:00:00").is_ok());
        assert!(parse_timestamp("2024-01-01 12:00:00.123456").is_ok());
        assert!(parse_timestamp("2024-01-01T12:00:00Z").is_ok());
        assert!(parse_timestamp("whenever").is_err());
    }

    #[test]
    fn test_open_unsupported_driver() {
        let dialect = load_dialect("mssql").unwrap();
        let err = DB::open("mssql", dialect, "sqlserver://localhost", DEFAULT_TABLE_NAME)
            .unwrap_err();
        assert!(matches!(
            err,
            RockhopperError::Store(StoreError::UnsupportedDriver(_))
        ));
    }

    #[test]
    fn test_open_with_config_requires_dsn() {
        let config = Config {
            driver: "sqlite".to_string(),
            ..Config::default()
        };

        let err = DB::open_with_config(&config).unwrap_err();
        assert!(matches!(err, RockhopperError::Configuration(_)));
    }
}
