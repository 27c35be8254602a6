use ripple_core::error::{
    Error as CoreError, ErrorClass, ErrorOrigin as CoreErrorOrigin, HookError, InternalError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<HookError> for Error {
    fn from(err: HookError) -> Self {
        Self::new(ErrorKind::Hook, ErrorOrigin::Hook, err.message)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        Self::new(err.class.into(), err.origin.into(), err.message)
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Hook(err) => err.into(),
            CoreError::Internal(err) => err.into(),
        }
    }
}

///
/// ErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Raised by a hook container; the engine aborted the phase.
    Hook,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Internal => Self::Internal,
            ErrorClass::Conflict => Self::Conflict,
            ErrorClass::Unsupported => Self::Unsupported,
            ErrorClass::InvariantViolation => Self::InvariantViolation,
        }
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Schema,
    Registry,
    Traversal,
    Diff,
    Dispatch,
    Loader,
    Hook,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Schema => Self::Schema,
            CoreErrorOrigin::Registry => Self::Registry,
            CoreErrorOrigin::Traversal => Self::Traversal,
            CoreErrorOrigin::Diff => Self::Diff,
            CoreErrorOrigin::Dispatch => Self::Dispatch,
            CoreErrorOrigin::Loader => Self::Loader,
        }
    }
}
