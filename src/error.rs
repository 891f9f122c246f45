use std::error::Error as StdError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by cgroup operations.
///
/// Every operation fails synchronously to its immediate caller; nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction input was rejected before the host was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The parameter key is not part of the controller's catalog.
    #[error("parameter {key:?} is not valid for controller {controller}")]
    InvalidParameter { controller: String, key: String },

    /// The value failed the parameter's range or format check.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The operation requires a state the handle is not in, or the
    /// underlying path vanished.
    #[error("{0}")]
    NotFound(String),

    /// The host filesystem or kernel rejected the operation.
    #[error("{context}")]
    Resource {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl Error {
    pub(crate) fn resource<S, E>(context: S, source: E) -> Self
    where
        S: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Error::Resource {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn resource_msg<S: Into<String>>(context: S) -> Self {
        Error::Resource {
            context: context.into(),
            source: None,
        }
    }
}
