//! Driver status codes.

use thiserror::Error;

/// Non-success statuses returned by a codec driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HdiError {
    /// Generic driver failure.
    #[error("driver call failed")]
    Failure,

    /// The driver rejected an argument.
    #[error("invalid parameter")]
    InvalidParam,

    /// The parameter or command is not supported by this component.
    #[error("not supported")]
    NotSupported,

    /// The driver could not allocate memory.
    #[error("out of memory")]
    OutOfMemory,

    /// The command is not legal in the component's current state.
    #[error("invalid component state")]
    InvalidState,

    /// Every instance slot for this component name is in use.
    #[error("instance limit reached")]
    InstanceLimit,

    /// The component or its service is gone.
    #[error("component is dead")]
    Dead,

    /// A surface operation did not complete in time.
    #[error("timed out")]
    Timeout,
}

/// Result alias for driver calls.
pub type HdiResult<T = ()> = Result<T, HdiError>;
