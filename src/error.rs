// Runtime error taxonomy shared by the registry, built-ins and evaluator

use thiserror::Error;

use crate::signature::Arity;
use crate::transpiler::CompileError;

/// Errors raised while dispatching projectors or manipulating tokens.
///
/// Every variant aborts the enclosing mapping evaluation and propagates to
/// the caller of [`crate::evaluator::Evaluator::execute`] unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown projector: {0}")]
    UnknownProjector(String),

    #[error("{name}: expected {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: Arity,
        actual: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("target conflict on {target}: {reason}")]
    TargetConflict { target: String, reason: String },

    #[error("projector {0} is already registered")]
    DuplicateName(String),
}

/// Either phase's error, for callers that compile and execute in one go.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Coarse grouping of [`EngineError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Resolving or invoking a projector failed.
    Dispatch,
    /// A token operation failed during evaluation.
    Data,
    /// The registry rejected a registration.
    Registry,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::UnknownProjector(_)
            | EngineError::ArityMismatch { .. }
            | EngineError::TypeMismatch(_) => ErrorClass::Dispatch,
            EngineError::FieldNotFound(_)
            | EngineError::IndexOutOfRange { .. }
            | EngineError::InvalidOperation(_)
            | EngineError::TargetConflict { .. } => ErrorClass::Data,
            EngineError::DuplicateName(_) => ErrorClass::Registry,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidOperation(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        EngineError::TypeMismatch(msg.into())
    }
}
