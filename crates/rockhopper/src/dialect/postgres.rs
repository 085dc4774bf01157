use super::SqlDialect;

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn get_table_names_sql(&self) -> String {
        "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = current_schema()".to_string()
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             \x20   id serial NOT NULL,\n\
             \x20   package VARCHAR(128) NOT NULL DEFAULT 'main',\n\
             \x20   source_file VARCHAR(255) NOT NULL DEFAULT '',\n\
             \x20   version_id bigint NOT NULL,\n\
             \x20   is_applied boolean NOT NULL,\n\
             \x20   tstamp timestamp NULL DEFAULT now(),\n\
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

    fn legacy_upgrade_sql(&self, legacy_table: &str, table: &str) -> Vec<String> {
        vec![
            format!(
                "ALTER TABLE {} ADD COLUMN package VARCHAR(128) NOT NULL DEFAULT 'main'",
                legacy_table
            ),
            format!(
                "ALTER TABLE {} ADD COLUMN source_file VARCHAR(255) NOT NULL DEFAULT ''",
                legacy_table
            ),
            format!("ALTER TABLE {} RENAME TO {}", legacy_table, table),
        ]
    }
}
