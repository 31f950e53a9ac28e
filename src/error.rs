//! The compiler's single error type.
//!
//! Every fallible stage -- lexing, parsing, module loading, type checking,
//! code generation -- returns `Result<T, CompileError>`. There is no local
//! recovery and no partial output: the first error aborts the pipeline.

use std::fmt;

/// A compile-time failure, carrying a human-readable message and, where
/// known, the 1-based source line that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub line: Option<usize>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        CompileError {
            message: message.into(),
            line: None,
        }
    }

    pub fn at(message: impl Into<String>, line: usize) -> Self {
        CompileError {
            message: message.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {}", self.message, line),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<fmt::Error> for CompileError {
    fn from(_: fmt::Error) -> Self {
        CompileError::new("internal error formatting generated output")
    }
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        CompileError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
