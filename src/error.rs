use crate::Precision;

/// Main library error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// WebGPU request device errors.
    #[error(transparent)]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),

    /// WebGPU buffer async errors.
    #[error(transparent)]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),

    /// Receiver returned None.
    #[error("receiver returned None")]
    ReceiverReturnedNone,

    /// The requested adapter index is out of range.
    #[error("Invalid device index: {0}")]
    InvalidDevice(i64),

    /// The selected adapter cannot run the requested precision.
    #[error("This device does not support the {0} precision!")]
    UnsupportedPrecision(Precision),

    /// A kernel needs shader features that the device was not created with.
    #[error("{precision} kernels need {missing:?} which the device does not provide")]
    MissingFeatures {
        precision: Precision,
        missing: wgpu::Features,
    },

    /// Dimension mismatch.
    #[error("dimension mismatch in binary operator {op}: {lhs:?} {rhs:?}")]
    DimensionMismatchBinaryOp {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    /// Kernels process columns in pairs so every dimension has to be even.
    #[error("odd dimension in {op}: {dims:?}")]
    OddDimension { op: &'static str, dims: Vec<usize> },

    /// The same (size, precision) pair was measured twice.
    #[error("duplicate result for {precision} at n={size}")]
    DuplicateResult { size: usize, precision: Precision },
}

impl Error {
    /// Configuration errors that are reported as a plain message before exiting.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::InvalidDevice(_) | Self::UnsupportedPrecision(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
