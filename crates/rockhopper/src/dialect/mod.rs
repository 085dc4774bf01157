//! SQL dialect adapters
//!
//! Every SQL difference of the supported flavors is factored into the
//! [`SqlDialect`] statement templates. Placeholder styles: `?` for MySQL,
//! SQLite and TiDB, `$N` for Postgres and Redshift, `@pN` for SQL Server.
//!
//! Row-returning templates keep a fixed column convention so the store can
//! decode them through the sqlx `Any` driver:
//!
//! - `query_versions_sql`: `(id, package, version_id, is_applied, tstamp)`
//!   descending by id, bound to `(package)`; `is_applied` is cast to an
//!   integer and `tstamp` to text where the native types would not decode.
//! - `migration_sql`: `(id, tstamp, is_applied)` for the latest row, bound
//!   to `(package, version_id)`.
//! - `select_last_version_sql`: `MAX(version_id)` over versions whose
//!   newest row is applied, bound to `(package, package)`.
//! - `insert_version_sql`: bound to
//!   `(package, source_file, version_id, is_applied)`.
//! - `delete_version_sql`: bound to `(package, version_id)`.

mod mysql;
mod postgres;
mod redshift;
mod sqlite;
mod sqlserver;
mod tidb;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use redshift::RedshiftDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;
pub use tidb::TiDbDialect;

use crate::error::StoreError;

/// Statement templates for one SQL flavor
pub trait SqlDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// List user-visible table names
    fn get_table_names_sql(&self) -> String;

    /// Create the bookkeeping table
    fn create_version_table_sql(&self, table: &str) -> String;

    /// Insert one bookkeeping row
    fn insert_version_sql(&self, table: &str) -> String;

    /// Delete bookkeeping rows by `(package, version_id)`
    fn delete_version_sql(&self, table: &str) -> String;

    /// Latest applied version for a package, skipping rolled-back versions
    fn select_last_version_sql(&self, table: &str) -> String;

    /// All bookkeeping rows for a package, newest first
    fn query_versions_sql(&self, table: &str) -> String;

    /// Latest bookkeeping row for `(package, version_id)`
    fn migration_sql(&self, table: &str) -> String;

    /// Statement sequence migrating the legacy `goose_db_version` table,
    /// executed inside one transaction by the store
    fn legacy_upgrade_sql(&self, legacy_table: &str, table: &str) -> Vec<String>;
}

/// Look up a dialect by name
pub fn load_dialect(name: &str) -> Result<Box<dyn SqlDialect>, StoreError> {
    match name {
        "postgres" => Ok(Box::new(PostgresDialect)),
        "mysql" => Ok(Box::new(MySqlDialect)),
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDialect)),
        "mssql" | "sqlserver" => Ok(Box::new(SqlServerDialect)),
        "redshift" => Ok(Box::new(RedshiftDialect)),
        "tidb" => Ok(Box::new(TiDbDialect)),
        _ => Err(StoreError::UnsupportedDialect(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "rockhopper_versions";

    fn all_dialects() -> Vec<Box<dyn SqlDialect>> {
        ["postgres", "mysql", "sqlite3", "mssql", "redshift", "tidb"]
            .iter()
            .map(|name| load_dialect(name).unwrap())
            .collect()
    }

    #[test]
    fn test_load_dialect() {
        assert_eq!(load_dialect("postgres").unwrap().name(), "postgres");
        assert_eq!(load_dialect("sqlite").unwrap().name(), "sqlite");
        assert_eq!(load_dialect("sqlite3").unwrap().name(), "sqlite");
        assert_eq!(load_dialect("mssql").unwrap().name(), "sqlserver");
        assert!(matches!(
            load_dialect("oracle"),
            Err(StoreError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_placeholder_styles() {
        let insert = PostgresDialect.insert_version_sql(TABLE);
        assert!(insert.contains("$1") && insert.contains("$4"));

        let insert = RedshiftDialect.insert_version_sql(TABLE);
        assert!(insert.contains("$1"));

        let insert = MySqlDialect.insert_version_sql(TABLE);
        assert!(insert.contains('?') && !insert.contains('$'));

        let insert = SqliteDialect.insert_version_sql(TABLE);
        assert!(insert.contains('?'));

        let insert = TiDbDialect.insert_version_sql(TABLE);
        assert!(insert.contains('?'));

        let insert = SqlServerDialect.insert_version_sql(TABLE);
        assert!(insert.contains("@p1") && insert.contains("@p4"));
    }

    #[test]
    fn test_templates_name_the_table() {
        for dialect in all_dialects() {
            assert!(dialect.create_version_table_sql(TABLE).contains(TABLE));
            assert!(dialect.insert_version_sql(TABLE).contains(TABLE));
            assert!(dialect.delete_version_sql(TABLE).contains(TABLE));
            assert!(dialect.select_last_version_sql(TABLE).contains(TABLE));
            assert!(dialect.query_versions_sql(TABLE).contains(TABLE));
            assert!(dialect.migration_sql(TABLE).contains(TABLE));
        }
    }

    #[test]
    fn test_latest_version_skips_rolled_back_rows() {
        for dialect in all_dialects() {
            let sql = dialect.select_last_version_sql(TABLE);
            assert!(sql.contains("MAX(version_id)"), "{}", dialect.name());
            assert!(sql.contains("GROUP BY version_id"), "{}", dialect.name());
        }
    }

    #[test]
    fn test_sqlserver_latest_row_uses_window() {
        let sql = SqlServerDialect.migration_sql(TABLE);
        assert!(sql.contains("ROW_NUMBER()"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_legacy_upgrade_shapes() {
        // rename + add-column path
        for name in ["mysql", "postgres", "tidb"] {
            let dialect = load_dialect(name).unwrap();
            let stmts = dialect.legacy_upgrade_sql("goose_db_version", TABLE);
            assert!(
                stmts.iter().any(|s| s.contains("RENAME")),
                "{} should rename the legacy table",
                name
            );
            assert!(stmts.iter().any(|s| s.contains("ADD COLUMN package")));
        }

        // copy + drop path
        for name in ["sqlite3", "mssql", "redshift"] {
            let dialect = load_dialect(name).unwrap();
            let stmts = dialect.legacy_upgrade_sql("goose_db_version", TABLE);
            assert!(
                stmts.iter().any(|s| s.contains("DROP TABLE goose_db_version")),
                "{} should drop the legacy table",
                name
            );
            assert!(stmts.iter().any(|s| s.contains("SELECT")));
        }
    }
}
