use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — shape + strides + offset
//
// The convolution kernels only ever read row-major NCHW buffers. Callers,
// however, often hold views: an NHWC image permuted to NCHW, a channel slice
// of a larger activation, a transposed weight. Layout records how such a view
// maps onto its storage so the tensor can be materialized into row-major
// order right before it reaches a kernel, and left untouched when it already
// is row-major.
//
// KEY CONCEPTS:
//
// 1. **Strides**: elements to skip in flat storage to move one step along a
//    dimension. A row-major [N, C, H, W] tensor has strides [C*H*W, H*W, W, 1].
//
// 2. **Permute**: reorder shape and strides together, no data movement.
//    NHWC [1, 4, 4, 3] has strides [48, 12, 3, 1]; permute(&[0, 3, 1, 2])
//    gives NCHW [1, 3, 4, 4] with strides [48, 1, 12, 3].
//
// 3. **Narrow**: shrink one extent and advance the offset by
//    `start * stride[dim]`. Same storage, same strides.
//
// 4. **Contiguity**: row-major strides *and* offset 0. Only then can the
//    kernels borrow the buffer as a plain slice; anything else is packed
//    first by `Tensor::contiguous`.

/// Layout describes how a tensor's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Storage index of the first logical element. Non-zero only for views
    /// produced by `narrow`.
    offset: usize,
}

impl Layout {
    /// Row-major layout for `shape`, starting at offset 0.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Layout with explicit strides and offset, for views over existing storage.
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    /// Logical shape of the view.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Per-dimension step in flat storage.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Storage index where the view starts.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of logical elements (not the size of the underlying storage).
    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// True when strides are row-major for the shape and the view starts at 0.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == self.shape.stride_contiguous()
    }

    /// Swap two dimensions without moving data.
    ///
    /// `[2, 3]` with strides `[3, 1]` becomes `[3, 2]` with strides `[1, 3]`.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim0 >= rank || dim1 >= rank {
            return Err(Error::DimOutOfRange {
                dim: dim0.max(dim1),
                rank,
            });
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.swap(dim0, dim1);
        strides.swap(dim0, dim1);
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// Reorder dimensions: new dim `i` is old dim `order[i]`.
    ///
    /// `permute(&[0, 3, 1, 2])` turns an NHWC view into NCHW.
    pub fn permute(&self, order: &[usize]) -> Result<Layout> {
        let rank = self.rank();
        if order.len() != rank {
            return Err(Error::RankMismatch {
                what: "permutation",
                expected: rank,
                got: order.len(),
            });
        }
        let mut seen = vec![false; rank];
        for &d in order {
            if d >= rank {
                return Err(Error::DimOutOfRange { dim: d, rank });
            }
            if seen[d] {
                crate::bail!("permutation {:?} repeats dimension {}", order, d);
            }
            seen[d] = true;
        }
        let dims = order.iter().map(|&d| self.dims()[d]).collect();
        let strides = order.iter().map(|&d| self.strides[d]).collect();
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// View of `len` entries along `dim`, starting at `start`.
    ///
    /// Fails with `NarrowOutOfBounds` when `start + len` exceeds the extent.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let dim_size = self.dims()[dim];
        if start + len > dim_size {
            return Err(Error::NarrowOutOfBounds {
                dim,
                start,
                len,
                dim_size,
            });
        }
        let mut dims = self.dims().to_vec();
        dims[dim] = len;
        let offset = self.offset + start * self.strides[dim];
        Ok(Layout::new(Shape::new(dims), self.strides.clone(), offset))
    }

    /// Storage index of a multi-dimensional index.
    ///
    /// `offset + Σ index[i] * stride[i]`. The index is not bounds-checked here;
    /// `Tensor::get` does that.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        self.offset
            + index
                .iter()
                .zip(&self.strides)
                .map(|(&i, &s)| i * s)
                .sum::<usize>()
    }

    /// Storage indices of every element, in logical row-major order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

/// Iterator that yields flat storage indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    /// Storage index of `current`, updated incrementally.
    flat: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            flat: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    // Rightmost dimension first; carries rewind the flat index.
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            self.flat += self.strides[i];
            if self.current[i] < self.dims[i] {
                return;
            }
            self.flat -= self.current[i] * self.strides[i];
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
