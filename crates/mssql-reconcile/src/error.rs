//! Error types for the reconciliation library.

use thiserror::Error;

use crate::core::schema::DataType;
use crate::orchestrator::RunReport;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection, pool, and query failures.
pub const EXIT_STORE_ERROR: u8 = 2;
/// Exit code for metadata discovery failures.
pub const EXIT_METADATA_ERROR: u8 = 3;
/// Exit code for key generation failures that escaped row isolation.
pub const EXIT_KEY_ERROR: u8 = 4;
/// Exit code for cursor persistence failures.
pub const EXIT_CURSOR_ERROR: u8 = 5;
/// Exit code for a cancelled run.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for serialization errors.
pub const EXIT_SERIALIZATION_ERROR: u8 = 8;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    Store(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Table metadata discovery failed
    #[error("Metadata discovery failed: {0}")]
    Metadata(String),

    /// Cursor settings table error
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// No unused key value was found within the attempt budget
    #[error(
        "Unique key for {table}.{column} could not be generated within {attempts} tries. \
         The last key tried was '{last_attempt}'."
    )]
    KeyGeneration {
        table: String,
        column: String,
        attempts: usize,
        last_attempt: String,
    },

    /// A colliding key has a type no replacement can be generated for
    #[error("Cannot generate a replacement key for {table}.{column} of type {data_type}")]
    UnsupportedKeyType {
        table: String,
        column: String,
        data_type: DataType,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// A fatal error stopped the run; the report gathered so far is kept.
    #[error("Reconciliation aborted after {} differences: {source}", .report.differences_found)]
    RunAborted {
        report: Box<RunReport>,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ReconcileError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Metadata error
    pub fn metadata(message: impl Into<String>) -> Self {
        ReconcileError::Metadata(message.into())
    }

    /// Create a KeyGeneration error
    pub fn key_generation(
        table: impl Into<String>,
        column: impl Into<String>,
        attempts: usize,
        last_attempt: impl Into<String>,
    ) -> Self {
        ReconcileError::KeyGeneration {
            table: table.into(),
            column: column.into(),
            attempts,
            last_attempt: last_attempt.into(),
        }
    }

    /// Whether this error only affects the row being reconciled.
    ///
    /// Row-scoped failures are reported and skipped; everything else ends the run.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            ReconcileError::KeyGeneration { .. } | ReconcileError::UnsupportedKeyType { .. }
        )
    }

    /// The report accumulated before the run was aborted, if any.
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            ReconcileError::RunAborted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconcileError::Config(_) | ReconcileError::Yaml(_) => EXIT_CONFIG_ERROR,
            ReconcileError::Store(_) | ReconcileError::Pool { .. } => EXIT_STORE_ERROR,
            ReconcileError::Metadata(_) => EXIT_METADATA_ERROR,
            ReconcileError::KeyGeneration { .. } | ReconcileError::UnsupportedKeyType { .. } => {
                EXIT_KEY_ERROR
            }
            ReconcileError::Cursor(_) => EXIT_CURSOR_ERROR,
            ReconcileError::Cancelled => EXIT_CANCELLED,
            ReconcileError::Io(_) => EXIT_IO_ERROR,
            ReconcileError::Json(_) => EXIT_SERIALIZATION_ERROR,
            ReconcileError::RunAborted { source, .. } => source.exit_code(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
