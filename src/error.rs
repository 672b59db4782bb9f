use crate::pager::PageType;
use std::sync::Arc;
use thiserror::Error;

/// The failures a caller may want to tell apart. They travel inside an [`anyhow::Error`] and can
/// be recovered with `downcast_ref::<StorageError>()`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("expected a {expected:?} page, but got a {actual:?} page")]
    TypeMismatch {
        expected: PageType,
        actual: PageType,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed: {source}")]
    OperationFailed {
        operation: &'static str,
        #[source]
        source: Arc<StorageError>,
    },

    #[error("storage is corrupted: {0}")]
    Corrupted(String),

    #[error("storage version {0} is not supported")]
    UnsupportedVersion(i32),

    #[error("page storage is already closed")]
    Closed,
}

impl StorageError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}
