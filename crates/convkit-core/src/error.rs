use crate::shape::Shape;

/// All errors that can occur within convkit.
///
/// One error type is shared by the whole workspace. Variants fall into three
/// families reported by [`Error::kind`]: shape problems the caller must fix,
/// allocation failures, and invalid convolution parameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors (e.g. a gradient that does not
    /// match the forward output).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch for {what}: expected rank {expected}, got {got}")]
    RankMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Input and weight disagree on the number of input channels.
    #[error("channel mismatch: input has {input} channels, weight expects {weight}")]
    ChannelMismatch { input: usize, weight: usize },

    /// The kernel does not fit inside the padded input, so the output would be empty.
    #[error("kernel {kernel} larger than padded input {padded} along {axis}")]
    KernelTooLarge {
        axis: &'static str,
        kernel: usize,
        padded: usize,
    },

    /// A tensor dimension that must be non-zero is zero.
    #[error("{what} has a zero-sized dimension: {shape}")]
    EmptyDimension { what: &'static str, shape: Shape },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Narrow/slice operation out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Stride or padding outside its valid range.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: i64 },

    /// A buffer could not be reserved.
    #[error("allocation failure: could not reserve {elems} elements ({bytes} bytes)")]
    AllocationFailure { elems: usize, bytes: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or inconsistent tensor shapes. Caller-fixable, never retried.
    ShapeMismatch,
    /// Resource exhaustion. Surfaced to the caller as-is.
    AllocationFailure,
    /// Non-positive stride or negative padding.
    InvalidParameter,
    Other,
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ShapeMismatch { .. }
            | Error::RankMismatch { .. }
            | Error::ChannelMismatch { .. }
            | Error::KernelTooLarge { .. }
            | Error::EmptyDimension { .. }
            | Error::DimOutOfRange { .. }
            | Error::NarrowOutOfBounds { .. }
            | Error::ElementCountMismatch { .. } => ErrorKind::ShapeMismatch,
            Error::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::Msg(_) => ErrorKind::Other,
        }
    }
}

/// Convenience Result type used throughout convkit.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
