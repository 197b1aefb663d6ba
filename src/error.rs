//! Typed error boundaries for each subsystem, per the error-kind table.
//!
//! Arithmetic and matcher failures (`TypeMismatch`, `DivisionByZero`) are
//! deliberately *not* part of these enums: the evaluator never propagates
//! them as errors, it substitutes `Datum::Null` or `false` and continues.

use thiserror::Error;

/// Failures from the in-memory store's writer/reader contract (C3).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("parent object does not exist")]
    ParentMissing,
    #[error("object not found")]
    NotFound,
}

/// A positioned, human-readable parse failure (C5).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (at {position})")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError { message: message.into(), position }
    }
}

/// Semantic analysis failure (C6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AnalyzeError(pub String);

/// Malformed or oversize wire frames (C9).
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed header")]
    MalformedHeader,
    #[error("body exceeds maximum frame size ({0} bytes)")]
    OversizeBody(usize),
    #[error("unexpected end of body")]
    Truncated,
    #[error("invalid UTF-8 in body")]
    InvalidUtf8,
    #[error("unknown datum type tag {0}")]
    UnknownDatumTag(u32),
    #[error("unknown object kind {0}")]
    UnknownObjectKind(u32),
}

/// Top-level query error surfaced to a client as a wire ERROR reply.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("object not found")]
    NotFound,
    #[error("{0}")]
    Unsupported(String),
}

/// Per-connection fatal condition: IO failures close the connection, they
/// do not propagate to the rest of the server.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
