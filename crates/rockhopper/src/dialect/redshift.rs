use super::SqlDialect;

pub struct RedshiftDialect;

impl SqlDialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn get_table_names_sql(&self) -> String {
        "SELECT DISTINCT tablename FROM PG_TABLE_DEF WHERE schemaname = 'public'".to_string()
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\n\
             \x20   id INTEGER NOT NULL identity(1, 1),\n\
             \x20   package VARCHAR(128) NOT NULL DEFAULT 'main',\n\
             \x20   source_file VARCHAR(255) NOT NULL DEFAULT '',\n\
             \x20   version_id BIGINT NOT NULL,\n\
             \x20   is_applied BOOLEAN NOT NULL,\n\
             \x20   tstamp TIMESTAMP NULL DEFAULT sysdate,\n\
             \x20   PRIMARY KEY(id)\n\
             )",
            table
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (package, source_file, version_id, is_applied) VALUES ($1, $2, $3, $4)",
            table
        )
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!("DELETE FROM {} WHERE package = $1 AND version_id = $2", table)
    }

    fn select_last_version_sql(&self, table: &str) -> String {
        format!(
            "SELECT MAX(version_id) FROM {} \
             WHERE package = $1 AND is_applied = TRUE \
             AND id IN (SELECT MAX(id) FROM {} WHERE package = $2 GROUP BY version_id)",
            table, table
        )
    }

    fn query_versions_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, package, version_id, is_applied::int, tstamp::text FROM {} \
             WHERE package = $1 ORDER BY id DESC",
            table
        )
    }

    fn migration_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, tstamp::text, is_applied::int FROM {} \
             WHERE package = $1 AND version_id = $2 ORDER BY tstamp DESC, id DESC LIMIT 1",
            table
        )
    }

    // identity columns cannot take explicit values on INSERT, so the copy
    // preserves row order instead of row ids
    fn legacy_upgrade_sql(&self, legacy_table: &str, table: &str) -> Vec<String> {
        vec![
            self.create_version_table_sql(table),
            format!(
                "INSERT INTO {} (package, source_file, version_id, is_applied, tstamp) \
                 SELECT 'main', '', version_id, is_applied, tstamp FROM {} ORDER BY id",
                table, legacy_table
            ),
            format!("DROP TABLE {}", legacy_table),
        ]
    }
}
