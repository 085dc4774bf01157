use super::SqlDialect;

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get_table_names_sql(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table'".to_string()
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             \x20   id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
             \x20   package TEXT NOT NULL DEFAULT 'main',\n\
             \x20   source_file TEXT NOT NULL DEFAULT '',\n\
             \x20   version_id INTEGER NOT NULL,\n\
             \x20   is_applied INTEGER NOT NULL,\n\
             \x20   tstamp TIMESTAMP DEFAULT (datetime('now'))\n\
             )",
            table
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (package, source_file, version_id, is_applied) VALUES (?, ?, ?, ?)",
            table
        )
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!("DELETE FROM {} WHERE package = ? AND version_id = ?", table)
    }

    fn select_last_version_sql(&self, table: &str) -> String {
        format!(
            "SELECT MAX(version_id) FROM {} \
             WHERE package = ? AND is_applied = 1 \
             AND id IN (SELECT MAX(id) FROM {} WHERE package = ? GROUP BY version_id)",
            table, table
        )
    }

    fn query_versions_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, package, version_id, is_applied, tstamp FROM {} \
             WHERE package = ? ORDER BY id DESC",
            table
        )
    }

    fn migration_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, tstamp, is_applied FROM {} \
             WHERE package = ? AND version_id = ? ORDER BY tstamp DESC, id DESC LIMIT 1",
            table
        )
    }

    fn legacy_upgrade_sql(&self, legacy_table: &str, table: &str) -> Vec<String> {
        vec![
            self.create_version_table_sql(table),
            format!(
                "INSERT INTO {} (id, package, source_file, version_id, is_applied, tstamp) \
                 SELECT id, 'main', '', version_id, is_applied, tstamp FROM {}",
                table, legacy_table
            ),
            format!("DROP TABLE {}", legacy_table),
        ]
    }
}
