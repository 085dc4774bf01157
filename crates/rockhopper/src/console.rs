//! Terminal output for migration runs
//!
//! Prints the per-migration banner and the per-statement progress line.

use std::time::Duration;

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::migration::Migration;

const PREVIEW_WIDTH: usize = 60;

static SQL_COMMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--.*$").expect("sql comment pattern"));

static WHITESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\r\n]+").expect("whitespace pattern"));

/// Direction label for the migration banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    Upgrading,
    Downgrading,
}

impl MigrationAction {
    fn label(&self) -> &'static str {
        match self {
            MigrationAction::Upgrading => "UPGRADING",
            MigrationAction::Downgrading => "DOWNGRADING",
        }
    }

    fn arrows(&self) -> &'static str {
        match self {
            MigrationAction::Upgrading => "\u{21E1}\u{21E1}",
            MigrationAction::Downgrading => "\u{21E3}\u{21E3}",
        }
    }
}

/// Print the per-migration banner line
pub fn describe_migration(action: MigrationAction, migration: &Migration) {
    let line = format!(
        "{} {:<12} {:<6} >> {:<28} ({} upgrade statements / {} downgrade statements) {}",
        action.arrows(),
        action.label(),
        migration.package,
        migration.version,
        migration.up_statements.len(),
        migration.down_statements.len(),
        action.arrows(),
    );

    match action {
        MigrationAction::Upgrading => println!("{}", line.black().on_bright_green()),
        MigrationAction::Downgrading => println!("{}", line.black().on_bright_cyan()),
    }
}

/// Print the per-statement progress line
pub fn print_statement(sql: &str, ok: bool, duration: Duration) {
    let status = if ok {
        "[  OK  ]".green().bold()
    } else {
        "[FAILED]".red().bold()
    };

    println!(
        "EXECUTING: {}   {}  ---- {:?}",
        preview_sql(sql).dimmed(),
        status,
        duration
    );
}

/// Strip SQL comment lines and blank lines
pub fn clean_sql(sql: &str) -> String {
    let without_comments = SQL_COMMENT_PATTERN.replace_all(sql, "");
    without_comments
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Compress a statement into one fixed-width line for the progress banner
pub fn preview_sql(sql: &str) -> String {
    let s = WHITESPACE_PATTERN.replace_all(sql, " ").trim().to_string();

    if s.len() <= PREVIEW_WIDTH {
        return format!("{:<width$}", s, width = PREVIEW_WIDTH);
    }

    // cut on a word boundary when one lands close to the edge
    let mut cut = PREVIEW_WIDTH;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &s[..cut];
    match head.rfind(' ') {
        Some(idx) if idx > PREVIEW_WIDTH * 2 / 3 => {
            format!("{:<width$}", format!("{}...", &head[..idx]), width = PREVIEW_WIDTH)
        }
        _ => head.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_sql() {
        let sql = "-- a comment\nCREATE TABLE a(id INT);\n\n-- another\nDROP TABLE a;";
        assert_eq!(clean_sql(sql), "CREATE TABLE a(id INT);\nDROP TABLE a;");
    }

    #[test]
    fn test_preview_pads_short_sql() {
        let preview = preview_sql("SELECT 1;");
        assert_eq!(preview.len(), PREVIEW_WIDTH);
        assert!(preview.starts_with("SELECT 1;"));
    }

    #[test]
    fn test_preview_truncates_long_sql() {
        let sql = "CREATE TABLE trades (id INTEGER PRIMARY KEY, exchange VARCHAR(24) NOT NULL, symbol VARCHAR(20) NOT NULL)";
        let preview = preview_sql(sql);
        assert!(preview.len() <= PREVIEW_WIDTH);
    }

    #[test]
    fn test_preview_collapses_newlines() {
        let preview = preview_sql("SELECT\n  1;");
        assert!(preview.starts_with("SELECT 1;"));
    }
}
