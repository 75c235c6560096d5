use crate::record::FieldRole;
use thiserror::Error;

/// Convenience result type for the canonicalization engine.
pub type ConvectorResult<T> = Result<T, ConvectorError>;

/// Error type shared by field mapping, filtering, projection and the record readers.
///
/// Everything except [`ConvectorError::MalformedRecord`] is fatal for the run: it is raised while
/// a source is being planned, before any record is streamed.
#[derive(Debug, Error)]
pub enum ConvectorError {
    /// Invalid configuration (unknown filter field/operator, reserved retained name, ...).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An explicit role override names a field the source does not have.
    #[error("configuration error: {role} override names field '{field}', which is absent from {origin}")]
    UnknownOverrideField {
        role: FieldRole,
        field: String,
        origin: String,
    },

    /// Ordering operator applied to a non-numeric literal.
    #[error("filter type error in '{predicate}': ordering operators need a numeric value, got '{value}'")]
    FilterType { predicate: String, value: String },

    /// Output schema selector is not one of `default` / `chat_completion`.
    #[error("unsupported output schema '{schema}' (expected one of: default, chat_completion)")]
    SchemaProjection { schema: String },

    /// A single raw record could not be turned into a mapping. Skipped and counted.
    #[error("malformed record in {origin} at line {line}: {message}")]
    MalformedRecord {
        origin: String,
        line: u64,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl ConvectorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// True when the pipeline may skip the offending record and keep streaming.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConvectorError::MalformedRecord { .. })
    }
}
