use thiserror::Error;

/// Result codes returned by every entry point of the library.
///
/// No panics or rich error trees cross the public boundary; every failure
/// collapses into one of these codes, each with a stable negative integer
/// mapping for logging and FFI-style interop.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum HcError {
    #[error("Invalid argument")]
    InvalidArg,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Unspecified failure")]
    Fail,
    #[error("Buffer too small")]
    BufferTooSmall,
    #[error("Library not initialized")]
    NotInitialized,
    #[error("Feature not present on this platform")]
    FeatureNotPresent,
    #[error("Perform already called on this handle")]
    PerformAlreadyCalled,
    #[error("Already initialized")]
    AlreadyInitialized,
    #[error("Connect already called on this handle")]
    ConnectAlreadyCalled,
    #[error("Operation not valid in the current state")]
    InvalidState,
    #[error("Result not yet available")]
    Pending,
    #[error("Operation canceled")]
    Canceled,
    #[error("Network error")]
    NetworkError,
    #[error("Attempt timed out")]
    Timeout,
}

/// Convenience alias used throughout the crate.
pub type HcResult<T> = Result<T, HcError>;

impl HcError {
    pub fn as_i32(&self) -> i32 {
        match self {
            HcError::InvalidArg => -1,
            HcError::OutOfMemory => -2,
            HcError::Fail => -3,
            HcError::BufferTooSmall => -4,
            HcError::NotInitialized => -5,
            HcError::FeatureNotPresent => -6,
            HcError::PerformAlreadyCalled => -7,
            HcError::AlreadyInitialized => -8,
            HcError::ConnectAlreadyCalled => -9,
            HcError::InvalidState => -10,
            HcError::Pending => -11,
            HcError::Canceled => -12,
            HcError::NetworkError => -13,
            HcError::Timeout => -14,
        }
    }
}

impl From<i32> for HcError {
    fn from(code: i32) -> Self {
        match code {
            -1 => HcError::InvalidArg,
            -2 => HcError::OutOfMemory,
            -4 => HcError::BufferTooSmall,
            -5 => HcError::NotInitialized,
            -6 => HcError::FeatureNotPresent,
            -7 => HcError::PerformAlreadyCalled,
            -8 => HcError::AlreadyInitialized,
            -9 => HcError::ConnectAlreadyCalled,
            -10 => HcError::InvalidState,
            -11 => HcError::Pending,
            -12 => HcError::Canceled,
            -13 => HcError::NetworkError,
            -14 => HcError::Timeout,
            _ => HcError::Fail,
        }
    }
}
