//! Error types for signing and verification operations.
//!
//! Every failure the workflow can produce is a variant of [`SignError`].
//! Device and transport failures are never retried; the operator re-invokes
//! the tool. Decode and length errors carry the file they came from so that
//! "wrong file" can be told apart from "corrupted file".

use std::path::PathBuf;

use crate::device::DeviceError;

/// Stable numeric codes for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// No token found on any candidate port
    DeviceNotFound = 1000,
    /// Wrong or absent signer app and token not in firmware mode
    WrongApplication = 1001,
    /// Loading the signer app failed
    LoadFailed = 1002,
    /// Transport/link layer error
    Transport = 2000,
    /// Operation interrupted by a signal
    Interrupted = 2001,
    /// Session operation issued in the wrong state
    InvalidState = 2002,
    /// Malformed envelope or hex file
    Decode = 3000,
    /// Decoded record has the wrong size
    LengthMismatch = 3001,
    /// Refused to overwrite an existing file
    FileExists = 4000,
    /// Operator declined to overwrite an existing file
    Aborted = 4001,
    /// File I/O failure
    Io = 4002,
    /// USS could not be obtained
    Secret = 4003,
    /// Signature returned by the token does not verify
    SelfVerificationFailed = 5000,
    /// Offline verification did not validate
    VerificationFailed = 5001,
    /// Supplied public key differs from the token's key
    IdentityMismatch = 5002,
    /// Payload exceeds the signer app's maximum
    MessageTooLarge = 6000,
}

/// Error type for all tkey-sign operations.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// No usable token was found.
    #[error("no TKey found: {0}")]
    DeviceNotFound(String),

    /// The token runs another app and is not in firmware mode.
    #[error("no TKey on the serial port, or it's running wrong app (and is not in firmware mode)")]
    WrongApplication,

    /// Loading the signer app onto the token failed.
    #[error("couldn't load signer: {0}")]
    LoadFailed(String),

    /// A device call failed at the transport level.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Device operation that failed
        operation: &'static str,
        /// Underlying device error
        #[source]
        source: DeviceError,
    },

    /// The operation was cancelled by an interrupt or termination signal.
    #[error("interrupted")]
    Interrupted,

    /// A session operation was called before the session reached the
    /// required state.
    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        /// Requested operation
        operation: &'static str,
        /// Current session state
        state: String,
    },

    /// A key or signature file could not be decoded.
    #[error("could not decode {file}: {reason}")]
    Decode {
        /// File being decoded
        file: String,
        /// What went wrong
        reason: String,
    },

    /// A decoded record does not have the expected fixed size.
    #[error("invalid length of {what} in {file}. Expected {expected} bytes, got {actual} bytes")]
    LengthMismatch {
        /// Record kind ("public key", "signature")
        what: &'static str,
        /// File being decoded
        file: String,
        /// Required size in bytes
        expected: usize,
        /// Decoded size in bytes
        actual: usize,
    },

    /// The target file exists and overwriting was not allowed.
    #[error("file {} exists", .0.display())]
    FileExists(PathBuf),

    /// The operator answered anything but "y" to the overwrite prompt.
    #[error("aborted")]
    Aborted,

    /// Reading or writing a file failed.
    #[error("could not access {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The USS could not be read.
    #[error("could not read USS: {0}")]
    Secret(String),

    /// The token produced a signature that does not verify.
    #[error("signature FAILED verification")]
    SelfVerificationFailed,

    /// Offline verification rejected the signature.
    #[error("signature not valid: {0}")]
    VerificationFailed(String),

    /// A public key supplied by the operator differs from the token's key.
    #[error("public key mismatch: expected {expected}, TKey reports {actual}")]
    IdentityMismatch {
        /// Hex of the supplied key
        expected: String,
        /// Hex of the key reported by the token
        actual: String,
    },

    /// The payload is larger than the signer app accepts.
    #[error("message too long ({size} bytes), max is {max} bytes")]
    MessageTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Maximum accepted size in bytes
        max: usize,
    },
}

impl SignError {
    /// Get the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            Self::WrongApplication => ErrorCode::WrongApplication,
            Self::LoadFailed(_) => ErrorCode::LoadFailed,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Interrupted => ErrorCode::Interrupted,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::LengthMismatch { .. } => ErrorCode::LengthMismatch,
            Self::FileExists(_) => ErrorCode::FileExists,
            Self::Aborted => ErrorCode::Aborted,
            Self::Io { .. } => ErrorCode::Io,
            Self::Secret(_) => ErrorCode::Secret,
            Self::SelfVerificationFailed => ErrorCode::SelfVerificationFailed,
            Self::VerificationFailed(_) => ErrorCode::VerificationFailed,
            Self::IdentityMismatch { .. } => ErrorCode::IdentityMismatch,
            Self::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
        }
    }

    /// Process exit status for this error.
    ///
    /// Every failure, including a signal-driven teardown, exits with
    /// [`FAILURE_EXIT_CODE`].
    pub fn exit_code(&self) -> i32 {
        FAILURE_EXIT_CODE
    }

    /// True for errors caused by a malformed input file rather than by a
    /// signature that fails to verify.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::LengthMismatch { .. })
    }

    /// Create a transport error for the given device operation.
    pub fn transport(operation: &'static str, source: DeviceError) -> Self {
        Self::Transport { operation, source }
    }

    /// Create a decode error for the given file.
    pub fn decode(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Exit status used for every failed operation, including interrupts.
pub const FAILURE_EXIT_CODE: i32 = 1;
