//! Error types for the migration engine
//!
//! Provides error handling for script parsing, catalog loading,
//! version bookkeeping and migration execution.

use std::fmt;

/// Result type alias for migration operations
pub type RockhopperResult<T> = Result<T, RockhopperError>;

/// Error types for migration engine operations
#[derive(Debug, Clone)]
pub enum RockhopperError {
    /// Migration script parse error
    Parse(ParseError),
    /// Catalog loading error
    Catalog(CatalogError),
    /// Bookkeeping store error
    Store(StoreError),
    /// Migration execution error
    Execution(ExecutionError),
    /// Registry conflict at registration time
    Registry(String),
    /// Database connection or query error
    Database(String),
    /// Configuration error
    Configuration(String),
    /// Filesystem error
    Io(String),
}

impl fmt::Display for RockhopperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RockhopperError::Parse(err) => write!(f, "parse error: {}", err),
            RockhopperError::Catalog(err) => write!(f, "catalog error: {}", err),
            RockhopperError::Store(err) => write!(f, "store error: {}", err),
            RockhopperError::Execution(err) => write!(f, "execution error: {}", err),
            RockhopperError::Registry(msg) => write!(f, "registry error: {}", msg),
            RockhopperError::Database(msg) => write!(f, "database error: {}", msg),
            RockhopperError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            RockhopperError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for RockhopperError {}

impl From<sqlx::Error> for RockhopperError {
    fn from(err: sqlx::Error) -> Self {
        RockhopperError::Database(err.to_string())
    }
}

impl From<std::io::Error> for RockhopperError {
    fn from(err: std::io::Error) -> Self {
        RockhopperError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for RockhopperError {
    fn from(err: serde_yaml::Error) -> Self {
        RockhopperError::Configuration(err.to_string())
    }
}

/// Error kinds produced by the migration script parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A second `-- +up` annotation was found
    DuplicateUp,
    /// `+down`, `+begin` or `+end` appeared in a state that forbids it
    OutOfOrder(String),
    /// EOF reached without any `-- +up` annotation
    MissingUp,
    /// EOF reached inside a `-- +begin` block
    UnclosedBlock,
    /// The line buffer held SQL without a terminating semicolon at EOF
    TrailingUnterminatedSQL(String),
    /// Malformed `-- @package` annotation
    BadPackageAnnotation(String),
    /// Read error from the underlying source
    Io(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::DuplicateUp => {
                write!(f, "duplicate '-- +up' annotation")
            }
            ParseError::OutOfOrder(msg) => write!(f, "out of order annotation: {}", msg),
            ParseError::MissingUp => {
                write!(f, "migration script must start with a '-- +up' annotation")
            }
            ParseError::UnclosedBlock => write!(f, "missing '-- +end' annotation"),
            ParseError::TrailingUnterminatedSQL(sql) => {
                write!(f, "unfinished SQL query {:?}: missing semicolon?", sql)
            }
            ParseError::BadPackageAnnotation(line) => {
                write!(f, "incorrect package annotation: {:?}", line)
            }
            ParseError::Io(msg) => write!(f, "failed to read migration script: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for RockhopperError {
    fn from(err: ParseError) -> Self {
        RockhopperError::Parse(err)
    }
}

/// Error kinds produced while building the migration catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Filename carries no usable numeric version component
    BadFilename(String),
    /// Two migrations share the same version
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },
    /// A configured migrations directory does not exist
    MissingDirectory(String),
    /// The requested version is not present in the catalog
    VersionNotFound(i64),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::BadFilename(name) => {
                write!(f, "invalid migration filename {:?}", name)
            }
            CatalogError::DuplicateVersion {
                version,
                first,
                second,
            } => write!(
                f,
                "duplicate migration version {} detected: {} and {}",
                version, first, second
            ),
            CatalogError::MissingDirectory(dir) => {
                write!(f, "{} directory does not exist", dir)
            }
            CatalogError::VersionNotFound(version) => {
                write!(f, "version {} not found", version)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<CatalogError> for RockhopperError {
    fn from(err: CatalogError) -> Self {
        RockhopperError::Catalog(err)
    }
}

/// Error kinds produced by the bookkeeping store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Driver is not connectable through this build
    UnsupportedDriver(String),
    /// Dialect name is unknown
    UnsupportedDialect(String),
    /// No applied migration record exists
    NoCurrentVersion,
    /// The legacy version table could not be upgraded
    LegacyUpgradeFailed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnsupportedDriver(driver) => write!(f, "unsupported driver {:?}", driver),
            StoreError::UnsupportedDialect(dialect) => {
                write!(f, "unknown dialect {:?}", dialect)
            }
            StoreError::NoCurrentVersion => write!(f, "no current version found"),
            StoreError::LegacyUpgradeFailed(msg) => {
                write!(f, "failed to upgrade the legacy version table: {}", msg)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for RockhopperError {
    fn from(err: StoreError) -> Self {
        RockhopperError::Store(err)
    }
}

/// Execution failure wrapping the migration version, its source path and
/// the offending SQL alongside the driver error
#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub version: i64,
    pub source: String,
    pub sql: String,
    pub message: String,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keep the one-line form short; the full SQL goes to debug logs only
        write!(
            f,
            "migration {} ({}) failed: {}",
            self.version, self.source, self.message
        )
    }
}

impl std::error::Error for ExecutionError {}

impl From<ExecutionError> for RockhopperError {
    fn from(err: ExecutionError) -> Self {
        RockhopperError::Execution(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RockhopperError::from(ParseError::MissingUp);
        assert!(err.to_string().contains("+up"));

        let err = RockhopperError::from(CatalogError::DuplicateVersion {
            version: 20240101000001,
            first: "a.sql".to_string(),
            second: "b.sql".to_string(),
        });
        assert!(err.to_string().contains("20240101000001"));
    }

    #[test]
    fn test_execution_error_omits_sql() {
        let err = ExecutionError {
            version: 42,
            source: "42_add_index.sql".to_string(),
            sql: "CREATE INDEX idx_a ON a(id);".to_string(),
            message: "syntax error".to_string(),
        };

        let line = err.to_string();
        assert!(line.contains("42_add_index.sql"));
        assert!(!line.contains("CREATE INDEX"));
    }
}
