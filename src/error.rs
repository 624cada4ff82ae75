//! Error type returned by every codec operation.

use thiserror::Error;

/// Failure kinds reported by [`crate::HCodec`] operations and through
/// [`crate::CodecCallback::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CodecError {
    /// Out of memory while allocating a buffer or parameter.
    #[error("no memory")]
    NoMemory,

    /// The operation is not allowed in the current configuration.
    #[error("invalid operation")]
    InvalidOperation,

    /// An argument, format key or buffer id is invalid.
    #[error("invalid value")]
    InvalidVal,

    /// Internal failure, driver failure or timeout.
    #[error("unknown error")]
    Unknown,

    /// The driver service died.
    #[error("service died")]
    ServiceDied,

    /// The operation is not legal in the current state or for the buffer's
    /// current owner.
    #[error("invalid state")]
    InvalidState,

    /// The codec does not support the operation.
    #[error("unsupported")]
    Unsupported,
}

impl CodecError {
    /// Integer code reported to clients. `0` is reserved for success.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NoMemory => 1,
            Self::InvalidOperation => 2,
            Self::InvalidVal => 3,
            Self::Unknown => 4,
            Self::ServiceDied => 5,
            Self::InvalidState => 6,
            Self::Unsupported => 7,
        }
    }
}

/// Result alias used throughout the crate.
pub type CodecResult<T = ()> = Result<T, CodecError>;

/// Code of a result: `0` on success, [`CodecError::code`] otherwise.
#[must_use]
pub fn result_code(result: &CodecResult) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_nonzero() {
        let all = [
            CodecError::NoMemory,
            CodecError::InvalidOperation,
            CodecError::InvalidVal,
            CodecError::Unknown,
            CodecError::ServiceDied,
            CodecError::InvalidState,
            CodecError::Unsupported,
        ];
        let mut codes: Vec<i32> = all.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_result_code() {
        assert_eq!(result_code(&Ok(())), 0);
        assert_eq!(result_code(&Err(CodecError::InvalidState)), 6);
    }
}
