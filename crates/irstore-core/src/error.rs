use thiserror::Error;

use crate::ClassId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UniquerError {
    #[error("Storage class already registered: {0}")]
    AlreadyRegistered(ClassId),

    #[error("Storage class not registered: {0}")]
    NotRegistered(ClassId),

    #[error("Storage class {0} is registered as a singleton")]
    SingletonClass(ClassId),

    #[error("Storage class {0} is registered as parametric")]
    ParametricClass(ClassId),
}

pub type Result<T> = std::result::Result<T, UniquerError>;
