//! Migration script parser
//!
//! Parses an annotated SQL migration script into an ordered pair of up and
//! down statement streams plus execution flags. Annotations are SQL comments
//! beginning with `--`:
//!
//! - `-- +up` / `-- +down` open the respective sections
//! - `-- +begin` / `-- +end` delimit a multi-statement block
//! - `-- !txn` disables per-migration transaction wrapping
//! - `-- @package NAME` assigns the script to a named package
//!
//! The legacy `-- +goose Up` / `-- +goose Down` forms are accepted as
//! aliases. Unrecognized annotations are plain comments.

use std::io::BufRead;
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Line buffers must fit a whole SQL statement line, so they are sized
/// generously and recycled across parses.
const SCAN_BUF_SIZE: usize = 4 * 1024 * 1024;

const MAX_POOLED_BUFFERS: usize = 8;

static BUF_POOL: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn get_buf() -> String {
    BUF_POOL
        .lock()
        .expect("buffer pool lock poisoned")
        .pop()
        .unwrap_or_else(|| String::with_capacity(SCAN_BUF_SIZE))
}

fn put_buf(mut buf: String) {
    buf.clear();
    let mut pool = BUF_POOL.lock().expect("buffer pool lock poisoned");
    if pool.len() < MAX_POOLED_BUFFERS {
        pool.push(buf);
    }
}

static PACKAGE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@package\s+(\S+)").expect("package annotation pattern"));

/// Direction of a single statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// One executable SQL statement extracted from a migration script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub direction: Direction,
    pub sql: String,
    /// Line in the source file where the statement starts
    #[serde(default)]
    pub line: usize,
    /// Source file path, filled in by the loader
    #[serde(default)]
    pub file: String,
    /// Wall-clock runtime observed after execution
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl Statement {
    pub fn new(direction: Direction, sql: impl Into<String>) -> Self {
        Self {
            direction,
            sql: sql.into(),
            line: 0,
            file: String::new(),
            duration: None,
        }
    }
}

/// The parsed form of one migration script
#[derive(Debug, Clone, Default)]
pub struct ScriptChunk {
    pub up_stmts: Vec<Statement>,
    pub down_stmts: Vec<Statement>,
    /// Whether the whole up or down runs inside one transaction
    pub use_tx: bool,
    /// Package override from a `-- @package` annotation
    pub package: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Start,
    Up,
    UpStatementBegin,
    UpStatementEnd,
    Down,
    DownStatementBegin,
    DownStatementEnd,
}

/// Hand-written line-oriented state machine over an annotated SQL script
#[derive(Debug, Default)]
pub struct MigrationParser;

impl MigrationParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, data: &str) -> Result<ScriptChunk, ParseError> {
        self.parse(data.as_bytes())
    }

    pub fn parse_bytes(&self, data: &[u8]) -> Result<ScriptChunk, ParseError> {
        self.parse(data)
    }

    pub fn parse<R: BufRead>(&self, mut reader: R) -> Result<ScriptChunk, ParseError> {
        let mut chunk = ScriptChunk {
            use_tx: true,
            ..ScriptChunk::default()
        };

        let mut buf = get_buf();
        let mut line_buf = get_buf();

        let result = self.parse_inner(&mut reader, &mut chunk, &mut buf, &mut line_buf);

        put_buf(line_buf);
        put_buf(buf);

        result.map(|_| chunk)
    }

    fn parse_inner<R: BufRead>(
        &self,
        reader: &mut R,
        chunk: &mut ScriptChunk,
        buf: &mut String,
        line_buf: &mut String,
    ) -> Result<(), ParseError> {
        let mut state = ParserState::Start;
        let mut line_no = 0usize;
        let mut stmt_line = 0usize;

        loop {
            line_buf.clear();
            let n = reader
                .read_line(line_buf)
                .map_err(|e| ParseError::Io(e.to_string()))?;
            if n == 0 {
                break;
            }

            line_no += 1;
            let line = line_buf.trim_end_matches(['\n', '\r']);

            let mut is_end = false;
            if let Some(rest) = line.strip_prefix("--") {
                // rewrite the legacy `+goose Up` style to `+up`
                let cmd = rest.trim().replace("+goose ", "+").to_lowercase();

                if cmd.starts_with("@package") {
                    let name = match_package_name(line)
                        .ok_or_else(|| ParseError::BadPackageAnnotation(line.to_string()))?;
                    chunk.package = Some(name);
                    continue;
                }

                match cmd.as_str() {
                    "+up" => {
                        match state {
                            ParserState::Start => state = ParserState::Up,
                            _ => return Err(ParseError::DuplicateUp),
                        }
                        continue;
                    }

                    "+down" => {
                        match state {
                            ParserState::Up | ParserState::UpStatementEnd => {
                                state = ParserState::Down
                            }
                            _ => {
                                return Err(ParseError::OutOfOrder(
                                    "'-- +down' must follow a '-- +up' annotation".to_string(),
                                ))
                            }
                        }
                        continue;
                    }

                    "+begin" => {
                        match state {
                            ParserState::Up | ParserState::UpStatementEnd => {
                                state = ParserState::UpStatementBegin
                            }
                            ParserState::Down | ParserState::DownStatementEnd => {
                                state = ParserState::DownStatementBegin
                            }
                            _ => {
                                return Err(ParseError::OutOfOrder(
                                    "'-- +begin' must follow a '-- +up' or '-- +down' annotation"
                                        .to_string(),
                                ))
                            }
                        }
                        continue;
                    }

                    "+end" => {
                        match state {
                            ParserState::UpStatementBegin => state = ParserState::UpStatementEnd,
                            ParserState::DownStatementBegin => {
                                state = ParserState::DownStatementEnd
                            }
                            _ => {
                                return Err(ParseError::OutOfOrder(
                                    "'-- +end' must follow a '-- +begin' annotation".to_string(),
                                ))
                            }
                        }

                        is_end = true;
                    }

                    "!txn" => {
                        chunk.use_tx = false;
                        continue;
                    }

                    // plain comment
                    _ => continue,
                }
            }

            if line.trim().is_empty() {
                continue;
            }

            if !is_end {
                if buf.is_empty() {
                    stmt_line = line_no;
                }
                buf.push_str(line);
                buf.push('\n');
            }

            match state {
                ParserState::Up => {
                    if ends_with_semicolon(line) {
                        chunk.up_stmts.push(flush_statement(
                            Direction::Up,
                            buf,
                            stmt_line,
                        ));
                    }
                }

                ParserState::Down => {
                    if ends_with_semicolon(line) {
                        chunk.down_stmts.push(flush_statement(
                            Direction::Down,
                            buf,
                            stmt_line,
                        ));
                    }
                }

                ParserState::UpStatementEnd => {
                    chunk
                        .up_stmts
                        .push(flush_statement(Direction::Up, buf, stmt_line));
                    state = ParserState::Up;
                }

                ParserState::DownStatementEnd => {
                    chunk
                        .down_stmts
                        .push(flush_statement(Direction::Down, buf, stmt_line));
                    state = ParserState::Down;
                }

                _ => {}
            }
        }

        match state {
            ParserState::Start => return Err(ParseError::MissingUp),
            ParserState::UpStatementBegin | ParserState::DownStatementBegin => {
                return Err(ParseError::UnclosedBlock)
            }
            _ => {}
        }

        let remaining = buf.trim();
        if !remaining.is_empty() {
            return Err(ParseError::TrailingUnterminatedSQL(remaining.to_string()));
        }

        Ok(())
    }
}

fn flush_statement(direction: Direction, buf: &mut String, line: usize) -> Statement {
    let mut stmt = Statement::new(direction, buf.trim());
    stmt.line = line;
    buf.clear();
    stmt
}

/// A line ends a statement iff its last word, ignoring a trailing `--`
/// comment tail, ends with a semicolon.
fn ends_with_semicolon(line: &str) -> bool {
    let mut prev = "";
    for word in line.split_whitespace() {
        if word.starts_with("--") {
            break;
        }
        prev = word;
    }

    prev.ends_with(';')
}

fn match_package_name(line: &str) -> Option<String> {
    PACKAGE_NAME_PATTERN
        .captures(line)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<ScriptChunk, ParseError> {
        MigrationParser::new().parse_str(input)
    }

    #[test]
    fn test_up_and_down() {
        let chunk = parse(
            "-- +up\n\
             CREATE TABLE a(id INT);\n\
             CREATE TABLE b(id INT);\n\
             -- +down\n\
             DROP TABLE b;\n\
             DROP TABLE a;\n",
        )
        .unwrap();

        assert_eq!(chunk.up_stmts.len(), 2);
        assert_eq!(chunk.down_stmts.len(), 2);
        assert_eq!(chunk.up_stmts[0].sql, "CREATE TABLE a(id INT);");
        assert_eq!(chunk.up_stmts[0].direction, Direction::Up);
        assert_eq!(chunk.down_stmts[1].sql, "DROP TABLE a;");
        assert_eq!(chunk.down_stmts[1].direction, Direction::Down);
        assert!(chunk.use_tx);
        assert!(chunk.package.is_none());
    }

    #[test]
    fn test_multiline_statement() {
        let chunk = parse(
            "-- +up\n\
             CREATE TABLE trades\n\
             (\n\
                 id INTEGER PRIMARY KEY,\n\
                 price DECIMAL(16, 8) NOT NULL\n\
             );\n\
             -- +down\n\
             DROP TABLE trades;\n",
        )
        .unwrap();

        assert_eq!(chunk.up_stmts.len(), 1);
        assert!(chunk.up_stmts[0].sql.starts_with("CREATE TABLE trades"));
        assert!(chunk.up_stmts[0].sql.ends_with(");"));
        assert_eq!(chunk.up_stmts[0].line, 2);
    }

    #[test]
    fn test_statement_begin_end() {
        let chunk = parse(
            "-- +up\n\
             -- +begin\n\
             CREATE TRIGGER t AFTER INSERT ON a BEGIN\n\
                 UPDATE a SET n = n + 1;\n\
             END;\n\
             -- +end\n\
             -- +down\n\
             DROP TRIGGER t;\n",
        )
        .unwrap();

        assert_eq!(chunk.up_stmts.len(), 1);
        assert!(chunk.up_stmts[0].sql.contains("UPDATE a SET n = n + 1;"));
        assert_eq!(chunk.down_stmts.len(), 1);
    }

    #[test]
    fn test_goose_compatibility() {
        let chunk = parse(
            "-- +goose Up\n\
             SELECT 1;\n\
             -- +goose Down\n\
             SELECT 2;\n",
        )
        .unwrap();

        assert_eq!(chunk.up_stmts.len(), 1);
        assert_eq!(chunk.down_stmts.len(), 1);
    }

    #[test]
    fn test_txn_annotation() {
        let chunk = parse("-- !txn\n-- +up\nSELECT 1;\n").unwrap();
        assert!(!chunk.use_tx);
    }

    #[test]
    fn test_package_annotation() {
        let chunk = parse("-- @package trading\n-- +up\nSELECT 1;\n").unwrap();
        assert_eq!(chunk.package.as_deref(), Some("trading"));
    }

    #[test]
    fn test_unknown_annotations_are_comments() {
        let chunk = parse(
            "-- vim: set ft=sql:\n\
             -- +up\n\
             -- +future-directive\n\
             SELECT 1;\n",
        )
        .unwrap();

        assert_eq!(chunk.up_stmts.len(), 1);
    }

    #[test]
    fn test_trailing_comment_after_semicolon() {
        let chunk = parse("-- +up\nSELECT 1; -- the answer\n").unwrap();
        assert_eq!(chunk.up_stmts.len(), 1);
    }

    #[test]
    fn test_duplicate_up() {
        let err = parse("-- +up\nSELECT 1;\n-- +up\n").unwrap_err();
        assert_eq!(err, ParseError::DuplicateUp);
    }

    #[test]
    fn test_down_before_up() {
        let err = parse("-- +down\nSELECT 1;\n").unwrap_err();
        assert!(matches!(err, ParseError::OutOfOrder(_)));
    }

    #[test]
    fn test_end_without_begin() {
        let err = parse("-- +up\n-- +end\n").unwrap_err();
        assert!(matches!(err, ParseError::OutOfOrder(_)));
    }

    #[test]
    fn test_missing_up() {
        let err = parse("SELECT 1;\n").unwrap_err();
        assert_eq!(err, ParseError::MissingUp);

        let err = parse("").unwrap_err();
        assert_eq!(err, ParseError::MissingUp);
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("-- +up\n-- +begin\nSELECT 1;\n").unwrap_err();
        assert_eq!(err, ParseError::UnclosedBlock);
    }

    #[test]
    fn test_unterminated_sql() {
        let err = parse("-- +up\nSELECT 1\n").unwrap_err();
        match err {
            ParseError::TrailingUnterminatedSQL(sql) => assert_eq!(sql, "SELECT 1"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bad_package_annotation() {
        let err = parse("-- @package\n-- +up\nSELECT 1;\n").unwrap_err();
        assert!(matches!(err, ParseError::BadPackageAnnotation(_)));
    }

    #[test]
    fn test_ends_with_semicolon() {
        assert!(ends_with_semicolon("SELECT 1;"));
        assert!(ends_with_semicolon("SELECT 1; -- trailing comment"));
        assert!(!ends_with_semicolon("SELECT 1"));
        assert!(!ends_with_semicolon("SELECT 1 -- ;"));
        assert!(!ends_with_semicolon(""));
    }

    #[test]
    fn test_match_package_name() {
        assert_eq!(match_package_name("@package main").as_deref(), Some("main"));
        assert_eq!(
            match_package_name("-- @package main").as_deref(),
            Some("main")
        );
        assert_eq!(
            match_package_name("-- @package github.com/c9s/bbgo").as_deref(),
            Some("github.com/c9s/bbgo")
        );
        assert_eq!(match_package_name("-- @package"), None);
    }
}
