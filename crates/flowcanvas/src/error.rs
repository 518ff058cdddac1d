//! Import error types
//!
//! Errors surfaced by the parse → extract → layout pipeline.

/// Plain result alias for import operations (backward-compatible).
pub type ImportResult<T> = Result<T, ImportError>;

/// Error-stack–backed result alias for import operations.
pub type ImportReport<T> = ::std::result::Result<T, error_stack::Report<ImportError>>;

/// Extension trait to convert [`ImportResult<T>`] into [`ImportReport<T>`].
pub trait IntoImportReport<T> {
    /// Wrap the error in an `error_stack::Report`.
    fn into_report(self) -> ImportReport<T>;
}

impl<T> IntoImportReport<T> for ImportResult<T> {
    #[inline]
    fn into_report(self) -> ImportReport<T> {
        self.map_err(error_stack::Report::new)
    }
}

/// Errors that can occur while importing a workflow from source text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("unknown layout algorithm: '{0}'")]
    UnknownAlgorithm(String),
}

impl ImportError {
    /// Shorthand for a [`ImportError::Parse`] at a known location.
    pub fn parse(line: u32, column: u32, message: impl Into<String>) -> Self {
        ImportError::Parse {
            line,
            column,
            message: message.into(),
        }
    }
}
