use super::SqlDialect;

pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn get_table_names_sql(&self) -> String {
        "SELECT name FROM sys.tables".to_string()
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\n\
             \x20   id INT NOT NULL IDENTITY(1,1) PRIMARY KEY,\n\
             \x20   package VARCHAR(128) NOT NULL DEFAULT 'main',\n\
             \x20   source_file VARCHAR(255) NOT NULL DEFAULT '',\n\
             \x20   version_id BIGINT NOT NULL,\n\
             \x20   is_applied BIT NOT NULL,\n\
             \x20   tstamp DATETIME NULL DEFAULT CURRENT_TIMESTAMP\n\
             )",
            table
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (package, source_file, version_id, is_applied) \
             VALUES (@p1, @p2, @p3, @p4)",
            table
        )
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!(
            "DELETE FROM {} WHERE package = @p1 AND version_id = @p2",
            table
        )
    }

    fn select_last_version_sql(&self, table: &str) -> String {
        format!(
            "SELECT MAX(version_id) FROM {} \
             WHERE package = @p1 AND is_applied = 1 \
             AND id IN (SELECT MAX(id) FROM {} WHERE package = @p2 GROUP BY version_id)",
            table, table
        )
    }

    fn query_versions_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, package, version_id, CAST(is_applied AS INT), \
             CONVERT(VARCHAR(23), tstamp, 121) \
             FROM {} WHERE package = @p1 ORDER BY id DESC",
            table
        )
    }

    // no LIMIT on SQL Server; pick the latest row through a windowed CTE
    fn migration_sql(&self, table: &str) -> String {
        format!(
            "WITH migrations AS (\n\
             \x20   SELECT id, CONVERT(VARCHAR(23), tstamp, 121) AS tstamp,\n\
             \x20          CAST(is_applied AS INT) AS is_applied,\n\
             \x20          ROW_NUMBER() OVER (ORDER BY tstamp DESC, id DESC) AS row_number\n\
             \x20   FROM {}\n\
             \x20   WHERE package = @p1 AND version_id = @p2\n\
             )\n\
             SELECT id, tstamp, is_applied FROM migrations WHERE row_number = 1",
            table
        )
    }

    fn legacy_upgrade_sql(&self, legacy_table: &str, table: &str) -> Vec<String> {
        vec![
            self.create_version_table_sql(table),
            format!("SET IDENTITY_INSERT {} ON", table),
            format!(
                "INSERT INTO {} (id, package, source_file, version_id, is_applied, tstamp) \
                 SELECT id, 'main', '', version_id, is_applied, tstamp FROM {}",
                table, legacy_table
            ),
            format!("SET IDENTITY_INSERT {} OFF", table),
            format!("DROP TABLE {}", legacy_table),
        ]
    }
}
