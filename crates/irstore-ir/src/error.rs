use irstore_core::UniquerError;
use thiserror::Error;

use crate::ContextId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("Attribute class not registered: {0}")]
    UnregisteredAttribute(String),

    #[error("Type class not registered: {0}")]
    UnregisteredType(String),

    #[error("Invalid dialect id: {0}")]
    InvalidDialectId(u32),

    #[error("Invalid dialect namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("Kind {kind} of dialect '{dialect}' is already claimed by {existing}")]
    KindConflict {
        dialect: String,
        kind: u32,
        existing: String,
    },

    #[error("Class {0} must be registered with at least one kind")]
    EmptyKindSet(String),

    #[error("Kind {kind} is not registered for {class}")]
    KindMismatch { class: String, kind: u32 },

    #[error("Handle belongs to context {found}, expected context {expected}")]
    ForeignContext { expected: ContextId, found: ContextId },

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Type of {0} has already been resolved")]
    TypeAlreadyResolved(String),

    #[error("Attribute {0} does not defer its type")]
    NotDeferred(String),

    #[error("Uniquer error: {0}")]
    Uniquer(#[from] UniquerError),
}

pub type Result<T> = std::result::Result<T, IrError>;
