//! Compiles SQL migrations into Rust source files
//!
//! Each migration script becomes a module holding an `up`/`down` handler
//! pair with the statements embedded as string literals, plus a generated
//! `mod.rs` exposing `register_migrations`, which the embedding program
//! calls once at start to load the compiled migrations into a
//! [`MigrationRegistry`](crate::registry::MigrationRegistry).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RockhopperError, RockhopperResult};
use crate::migration::{Migration, MigrationSlice};
use crate::parser::Statement;

/// Renders migrations into a directory of Rust sources
#[derive(Debug)]
pub struct MigrationDumper {
    dir: PathBuf,
}

impl MigrationDumper {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Render the registry glue plus one module per migration
    pub fn dump(&self, migrations: &MigrationSlice) -> RockhopperResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            RockhopperError::Io(format!(
                "failed to create output directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        self.dump_api(migrations)?;

        for migration in migrations.iter() {
            self.dump_migration(migration)?;
        }

        Ok(())
    }

    /// Write the generated `mod.rs` with the module list and
    /// `register_migrations`
    pub fn dump_api(&self, migrations: &MigrationSlice) -> RockhopperResult<()> {
        let mut out = String::new();

        out.push_str("//! Generated migration registry glue. Do not edit; regenerate instead.\n\n");
        out.push_str("use std::sync::Arc;\n\nuse rockhopper::MigrationRegistry;\n\n");

        for migration in migrations.iter() {
            let _ = writeln!(out, "mod {};", module_name(migration));
        }

        out.push_str(
            "\n/// Register every compiled migration. Call once at program start.\n\
             pub fn register_migrations(registry: &mut MigrationRegistry) {\n",
        );

        for migration in migrations.iter() {
            let module = module_name(migration);
            let _ = writeln!(
                out,
                "    registry\n\
                 \x20       .add(\n\
                 \x20           {package},\n\
                 \x20           {module}::SOURCE,\n\
                 \x20           Arc::new({module}::up),\n\
                 \x20           Arc::new({module}::down),\n\
                 \x20       )\n\
                 \x20       .expect(\"conflicting compiled migration\");",
                package = quote_str(&migration.package),
                module = module,
            );
        }

        out.push_str("}\n");

        self.write_file("mod.rs", &out)
    }

    /// Write one generated migration module
    pub fn dump_migration(&self, migration: &Migration) -> RockhopperResult<()> {
        let base = Path::new(&migration.source)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&migration.source);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "//! Generated from `{}` by `rockhopper compile`. Do not edit;\n\
             //! regenerate instead.\n\n\
             use sqlx::AnyConnection;\n\n\
             use rockhopper::MigrationHandlerFuture;\n\n\
             pub const SOURCE: &str = {};\n",
            base,
            quote_str(base),
        );

        render_handler(&mut out, "up", &migration.up_statements);
        out.push('\n');
        render_handler(&mut out, "down", &migration.down_statements);

        self.write_file(&format!("{}.rs", module_name(migration)), &out)
    }

    fn write_file(&self, name: &str, contents: &str) -> RockhopperResult<()> {
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|e| {
            RockhopperError::Io(format!("failed to write {}: {}", path.display(), e))
        })
    }
}

fn render_handler(out: &mut String, direction: &str, statements: &[Statement]) {
    let _ = writeln!(
        out,
        "pub fn {}(conn: &mut AnyConnection) -> MigrationHandlerFuture<'_> {{\n\
         \x20   Box::pin(async move {{",
        direction
    );

    for stmt in statements {
        let _ = writeln!(
            out,
            "        sqlx::query({})\n\
             \x20           .execute(&mut *conn)\n\
             \x20           .await?;",
            quote_str(&stmt.sql)
        );
    }

    if statements.is_empty() {
        let _ = writeln!(out, "        let _ = conn;");
    }

    out.push_str("        Ok(())\n    })\n}\n");
}

/// Module identifier for a migration: `m<version>_<name>`, sanitized
fn module_name(migration: &Migration) -> String {
    let mut name = String::with_capacity(migration.name.len());
    for c in migration.name.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else {
            name.push('_');
        }
    }

    if name.is_empty() {
        format!("m{}", migration.version)
    } else {
        format!("m{}_{}", migration.version, name)
    }
}

/// Render a string as a Rust string literal
fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Direction;
    use tempfile::TempDir;

    fn sample_migration() -> Migration {
        Migration {
            version: 20240101000001,
            package: "main".to_string(),
            name: "create_users".to_string(),
            source: "migrations/20240101000001_create_users.sql".to_string(),
            up_statements: vec![Statement::new(
                Direction::Up,
                "CREATE TABLE users (\n    name VARCHAR(32) DEFAULT 'anon'\n);",
            )],
            down_statements: vec![Statement::new(Direction::Down, "DROP TABLE users;")],
            ..Migration::default()
        }
    }

    #[test]
    fn test_quote_str() {
        assert_eq!(quote_str("a\"b"), r#""a\"b""#);
        assert_eq!(quote_str("a\nb"), r#""a\nb""#);
        assert_eq!(quote_str(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn test_module_name() {
        let m = sample_migration();
        assert_eq!(module_name(&m), "m20240101000001_create_users");

        let unnamed = Migration {
            version: 3,
            name: String::new(),
            ..Migration::default()
        };
        assert_eq!(module_name(&unnamed), "m3");
    }

    #[test]
    fn test_dump_renders_modules_and_glue() {
        let dir = TempDir::new().unwrap();
        let migrations = MigrationSlice::from(vec![sample_migration()])
            .sort_and_connect()
            .unwrap();

        MigrationDumper::new(dir.path()).dump(&migrations).unwrap();

        let glue = fs::read_to_string(dir.path().join("mod.rs")).unwrap();
        assert!(glue.contains("mod m20240101000001_create_users;"));
        assert!(glue.contains("pub fn register_migrations(registry: &mut MigrationRegistry)"));
        assert!(glue.contains("Arc::new(m20240101000001_create_users::up)"));

        let module = fs::read_to_string(
            dir.path().join("m20240101000001_create_users.rs"),
        )
        .unwrap();
        assert!(module.contains("pub const SOURCE: &str = \"20240101000001_create_users.sql\";"));
        assert!(module.contains("pub fn up(conn: &mut AnyConnection)"));
        assert!(module.contains("CREATE TABLE users (\\n"));
        assert!(module.contains("pub fn down(conn: &mut AnyConnection)"));
    }
}
