//! Unified error handling for neuroforge
//!
//! Every fallible operation in the crate returns [`NeuroResult`]. Variants
//! carry the context needed to act on them (operand names, sizes, device
//! status strings, compiler logs). Nothing here is retried by the crate;
//! the `category()` split tells callers whether to fix their input or give
//! up on the device.

use std::fmt;

/// Unified error type for neuroforge
#[derive(Debug, thiserror::Error)]
pub enum NeuroError {
    // ========== Configuration Errors ==========
    /// Host data length does not match a buffer's element count
    #[error("size mismatch for {operand}: expected {expected} elements, got {actual}")]
    SizeMismatch {
        operand: String,
        expected: usize,
        actual: usize,
    },

    /// Invalid layer or network configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Snapshot element access outside the buffer shape
    #[error("index ({row}, {col}) out of range for {width}x{height} buffer")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },

    // ========== Device Errors ==========
    /// Runtime could not be loaded, or no usable device/stream
    #[error("device context creation failed: {0}")]
    ContextCreation(String),

    /// Device refused an allocation
    #[error("allocation of {bytes} bytes for {operand} failed: {message}")]
    Allocation {
        operand: String,
        bytes: usize,
        message: String,
    },

    /// Runtime compilation of a device program failed
    #[error("compilation of program '{program}' failed:\n{log}")]
    KernelCompilation { program: String, log: String },

    /// A kernel argument could not be bound or marshalled
    #[error("argument '{parameter}' of kernel '{kernel}': {reason}")]
    ArgumentBinding {
        kernel: String,
        parameter: String,
        reason: String,
    },

    /// Submitting work to the device failed
    #[error("{operation} failed: {message}")]
    Dispatch { operation: String, message: String },

    /// Waiting on the device failed
    #[error("synchronization failed: {0}")]
    Synchronization(String),

    /// The execution sequence saw an earlier failure and must be discarded
    #[error("execution sequence is in a failed state")]
    SequenceFailed,

    // ========== Internal Errors ==========
    /// Lock poisoned (indicates a bug or a panic on another thread)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl NeuroError {
    /// Shorthand for a [`NeuroError::SizeMismatch`]
    pub fn size_mismatch(operand: impl Into<String>, expected: usize, actual: usize) -> Self {
        NeuroError::SizeMismatch {
            operand: operand.into(),
            expected,
            actual,
        }
    }

    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            NeuroError::SizeMismatch { .. }
            | NeuroError::Configuration(_)
            | NeuroError::IndexOutOfRange { .. }
            | NeuroError::ArgumentBinding { .. } => ErrorCategory::Configuration,

            NeuroError::ContextCreation(_)
            | NeuroError::Allocation { .. }
            | NeuroError::KernelCompilation { .. }
            | NeuroError::Dispatch { .. }
            | NeuroError::Synchronization(_)
            | NeuroError::SequenceFailed => ErrorCategory::Device,

            NeuroError::LockPoisoned(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is caused by caller input
    pub fn is_configuration_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Configuration)
    }

    /// Check if the device or runtime reported the failure
    pub fn is_device_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Device)
    }
}

/// Error category for handling decisions
///
/// - Configuration: fix the input and try again with a fresh sequence
/// - Device: the accelerator or runtime failed; discard the sequence
/// - Internal: indicates a bug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid shapes, counts, bindings or options
    Configuration,
    /// HIP runtime, compiler or device failure
    Device,
    /// Indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Device => write!(f, "Device"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for NeuroError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        NeuroError::LockPoisoned(err.to_string())
    }
}

/// Helper type alias for Results using NeuroError
pub type NeuroResult<T> = std::result::Result<T, NeuroError>;
