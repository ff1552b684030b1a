use std::fmt;

use crate::error::{Error, Result};

// Shape — N-dimensional extents of a tensor
//
// Convolution works almost exclusively on rank-4 shapes:
//   - input:  [N, C_in, H, W]
//   - weight: [C_out, C_in, kH, kW]
//   - output: [N, C_out, H_out, W_out]
//
// Other ranks still show up around the kernels:
//   - Scalar: Shape([])       — 0 dimensions, 1 element
//   - Matrix: Shape([3, 4])   — a flattened weight, 12 elements
//
// The shape determines:
//   1. How many elements a tensor holds (product of all dims, saturating)
//   2. The default row-major strides, which is all the kernels need once a
//      tensor has been made contiguous
//   3. Whether two operands agree (`dims4`, equality in gradient checks)

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 4 for NCHW).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero dimension gives 0.
    ///
    /// Saturates at `usize::MAX`, a count no allocation can satisfy, so an
    /// absurd shape fails in the allocator with `AllocationFailure` instead
    /// of wrapping.
    pub fn elem_count(&self) -> usize {
        if self.0.contains(&0) {
            return 0;
        }
        self.0.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Compute the contiguous (row-major / C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension, or `DimOutOfRange`.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    /// The four extents of a rank-4 shape, or `RankMismatch` naming `what`.
    pub fn dims4(&self, what: &'static str) -> Result<[usize; 4]> {
        match self.0.as_slice() {
            &[a, b, c, d] => Ok([a, b, c, d]),
            _ => Err(Error::RankMismatch {
                what,
                expected: 4,
                got: self.rank(),
            }),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<[usize; 4]> for Shape {
    fn from(d: [usize; 4]) -> Self {
        Shape(d.to_vec())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert!(s.stride_contiguous().is_empty());
    }

    #[test]
    fn test_nchw_strides() {
        let s = Shape::from((2, 3, 4, 5));
        assert_eq!(s.stride_contiguous(), vec![60, 20, 5, 1]);
        assert_eq!(s.elem_count(), 120);
    }

    #[test]
    fn test_zero_dim_has_no_elements() {
        assert_eq!(Shape::from((0, 3)).elem_count(), 0);
        assert_eq!(Shape::from((usize::MAX, 2, 0)).elem_count(), 0);
    }

    #[test]
    fn test_huge_shape_saturates() {
        assert_eq!(Shape::from((usize::MAX, 2)).elem_count(), usize::MAX);
    }

    #[test]
    fn test_dims4() {
        assert_eq!(Shape::from((1, 2, 3, 4)).dims4("input").unwrap(), [1, 2, 3, 4]);
        let err = Shape::from((2, 3)).dims4("weight").unwrap_err();
        assert!(matches!(
            err,
            Error::RankMismatch {
                what: "weight",
                expected: 4,
                got: 2
            }
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::from((3, 4))), "[3, 4]");
    }
}
