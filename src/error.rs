//! Compiler errors.
//!
//! No error is caught and recovered inside the compiler: every failure
//! aborts the compile and propagates to the caller, carrying the offending
//! clause rendered into the message. Each variant maps to a stable machine
//! tag via [`CompileError::code`].

use crate::model::{FieldId, TableId};

/// Errors that can occur during compilation or result post-processing.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A clause appeared in a position no dispatcher handles.
    #[error("unknown clause: {0}")]
    UnknownClause(String),

    /// A legal clause with an illegal shape.
    #[error("invalid query: {reason} (at {clause})")]
    InvalidQuery { reason: String, clause: String },

    /// A temporal unit outside the closed enum, or one that has no meaning
    /// in the position it was used.
    #[error("unsupported temporal unit `{unit}` in {context}")]
    UnsupportedUnit { unit: String, context: String },

    /// The resolver returned nothing for a field id.
    #[error("no field found with id {0}")]
    FieldResolution(FieldId),

    /// The resolver returned nothing for a table id.
    #[error("no table found with id {0}")]
    TableResolution(TableId),

    /// Result rows contained columns the compile did not predict. Detected
    /// after execution; indicates a compiler bug, not a user error.
    #[error("unexpected columns in query results: {}", .0.join(", "))]
    UnexpectedColumns(Vec<String>),

    /// An emitted stage failed the internal schema check. Indicates a
    /// compiler bug.
    #[error("malformed pipeline stage: {0}")]
    PipelineSchema(String),

    /// A native query was not parseable as JSON after constructor encoding.
    #[error("native query is not valid JSON: {0}")]
    NativeParse(#[from] serde_json::Error),

    /// A constructor form had arguments its decoder rejects.
    #[error("invalid {constructor} constructor: {reason}")]
    InvalidConstructor { constructor: String, reason: String },
}

impl CompileError {
    /// Stable machine tag for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::UnknownClause(_) => "unknown-clause",
            CompileError::InvalidQuery { .. }
            | CompileError::NativeParse(_)
            | CompileError::InvalidConstructor { .. } => "invalid-query",
            CompileError::UnsupportedUnit { .. } => "unsupported-unit",
            CompileError::FieldResolution(_) => "field-resolution-failure",
            CompileError::TableResolution(_) => "table-resolution-failure",
            CompileError::UnexpectedColumns(_) => "unexpected-columns",
            CompileError::PipelineSchema(_) => "pipeline-schema-violation",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>, clause: &impl std::fmt::Debug) -> Self {
        CompileError::InvalidQuery {
            reason: reason.into(),
            clause: format!("{clause:?}"),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
