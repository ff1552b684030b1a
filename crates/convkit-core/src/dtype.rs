use std::fmt;
use std::iter::Sum;

use num_traits::{Float, NumCast};

// DType — Floating-point element types
//
// The convolution engine computes in the element type of its operands and
// never converts across the call boundary: an f32 forward produces f32
// output, accumulated in f32. Only the two IEEE types a host framework
// hands to a convolution kernel are supported:
//
//   F32  — 32-bit float, the default workhorse
//   F64  — 64-bit float, used for gradient checking

/// Runtime tag for the element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// Element — bridge between Rust float types and DType
//
// Kernels are generic over `T: Element`, so the same code path serves both
// precisions and the compiler monomorphizes each one.

/// Trait implemented by the Rust types that can be stored in a tensor.
pub trait Element:
    Float + NumCast + Sum + Send + Sync + fmt::Debug + fmt::Display + 'static
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert from f64. Used for constants and initialization only.
    fn from_f64(v: f64) -> Self;

    /// Widen to f64. Used for reporting and tests only.
    fn into_f64(self) -> f64;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
    fn from_f64(v: f64) -> Self {
        v
    }
    fn into_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(format!("{}", DType::F64), "f64");
    }
}
