use std::fmt;
use std::sync::Arc;

use rand::distributions::uniform::SampleUniform;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::alloc;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// Tensor — dense n-dimensional array handed to and returned by the kernels
//
// MEMORY MODEL:
//
//   The element buffer lives behind an Arc, so cloning a Tensor is O(1) and
//   views (transpose, permute, narrow) share storage with their source. The
//   buffer is never mutated after construction: kernels always allocate a
//   fresh output, and a tensor captured in a SavedContext stays valid no
//   matter what the caller does with its own handle.
//
// CONTIGUITY:
//
//   Kernels require row-major NCHW. `contiguous()` returns the tensor itself
//   when its layout already is row-major, and a packed copy otherwise.

struct TensorInner<T: Element> {
    storage: Arc<Vec<T>>,
    layout: Layout,
}

/// An n-dimensional array of `f32` or `f64` values.
///
/// # Example
/// ```ignore
/// let x = Tensor::<f32>::ones((1, 1, 4, 4))?;
/// let w = Tensor::<f32>::ones((1, 1, 2, 2))?;
/// let y = conv2d_forward(&x, &w, ConvParams::default())?; // [1, 1, 3, 3], all 4.0
/// ```
pub struct Tensor<T: Element> {
    inner: Arc<TensorInner<T>>,
}

impl<T: Element> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, contiguous={})",
            self.shape(),
            self.dtype(),
            self.is_contiguous()
        )
    }
}

impl<T: Element> Tensor<T> {
    // Internal constructors

    /// Wrap a buffer already known to hold `shape.elem_count()` row-major elements.
    pub(crate) fn from_parts(data: Vec<T>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.elem_count());
        Tensor {
            inner: Arc::new(TensorInner {
                storage: Arc::new(data),
                layout: Layout::contiguous(shape),
            }),
        }
    }

    fn view(&self, layout: Layout) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                storage: Arc::clone(&self.inner.storage),
                layout,
            }),
        }
    }

    // Creation

    /// Create a row-major tensor from a flat buffer.
    pub fn from_vec(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self::from_parts(data, shape))
    }

    /// Create a tensor from a flat slice (copied).
    pub fn from_slice(data: &[T], shape: impl Into<Shape>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Tensor filled with a constant value.
    pub fn full(shape: impl Into<Shape>, val: T) -> Result<Self> {
        let shape = shape.into();
        let data = alloc::try_filled(shape.elem_count(), val)?;
        Ok(Self::from_parts(data, shape))
    }

    pub fn zeros(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, T::zero())
    }

    pub fn ones(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, T::one())
    }

    /// Tensor with values drawn from U(low, high).
    pub fn rand_uniform<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        low: T,
        high: T,
        rng: &mut R,
    ) -> Result<Self>
    where
        T: SampleUniform,
    {
        if !(low < high) {
            crate::bail!("rand_uniform: empty range [{}, {})", low, high);
        }
        let shape = shape.into();
        let dist = Uniform::new(low, high);
        let mut data = alloc::try_filled(shape.elem_count(), T::zero())?;
        for v in data.iter_mut() {
            *v = dist.sample(rng);
        }
        Ok(Self::from_parts(data, shape))
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether two tensors are views of the same buffer.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    /// Borrow the elements in row-major order, if the layout allows it.
    pub fn as_slice(&self) -> Option<&[T]> {
        if self.is_contiguous() {
            Some(&self.inner.storage[..self.elem_count()])
        } else {
            None
        }
    }

    /// Copy the elements out in logical row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        match self.as_slice() {
            Some(s) => s.to_vec(),
            None => {
                let storage = &self.inner.storage;
                self.inner
                    .layout
                    .strided_indices()
                    .map(|i| storage[i])
                    .collect()
            }
        }
    }

    /// Read a single element.
    pub fn get(&self, index: &[usize]) -> Result<T> {
        if index.len() != self.rank() {
            return Err(Error::RankMismatch {
                what: "index",
                expected: self.rank(),
                got: index.len(),
            });
        }
        for (dim, (&i, &size)) in index.iter().zip(self.dims()).enumerate() {
            if i >= size {
                return Err(Error::NarrowOutOfBounds {
                    dim,
                    start: i,
                    len: 1,
                    dim_size: size,
                });
            }
        }
        Ok(self.inner.storage[self.inner.layout.flat_index(index)])
    }

    /// Sum of all elements.
    pub fn sum_all(&self) -> T {
        match self.as_slice() {
            Some(s) => s.iter().copied().sum(),
            None => self.to_vec().into_iter().sum(),
        }
    }

    // Views

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        Ok(self.view(self.inner.layout.transpose(dim0, dim1)?))
    }

    pub fn permute(&self, order: &[usize]) -> Result<Self> {
        Ok(self.view(self.inner.layout.permute(order)?))
    }

    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        Ok(self.view(self.inner.layout.narrow(dim, start, len)?))
    }

    /// Row-major version of this tensor. Shares storage when already row-major.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let mut data = alloc::try_filled(self.elem_count(), T::zero())?;
        let storage = &self.inner.storage;
        for (dst, src) in data.iter_mut().zip(self.inner.layout.strided_indices()) {
            *dst = storage[src];
        }
        Ok(Self::from_parts(data, self.shape().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_vec_checks_count() {
        let err = Tensor::<f32>::from_vec(vec![1.0; 5], (2, 3)).unwrap_err();
        assert!(matches!(
            err,
            Error::ElementCountMismatch {
                expected: 6,
                got: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_full_and_sum() {
        let t = Tensor::<f64>::full((2, 3), 0.5).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F64);
        assert_eq!(t.sum_all(), 3.0);
    }

    #[test]
    fn test_transpose_then_contiguous() {
        let t = Tensor::<f32>::from_vec(vec![0., 1., 2., 3., 4., 5.], (2, 3)).unwrap();
        let tt = t.transpose(0, 1).unwrap();
        assert!(!tt.is_contiguous());
        assert!(tt.as_slice().is_none());
        assert!(tt.shares_storage(&t));

        let packed = tt.contiguous().unwrap();
        assert!(packed.is_contiguous());
        assert!(!packed.shares_storage(&t));
        assert_eq!(packed.to_vec(), vec![0., 3., 1., 4., 2., 5.]);
        assert_eq!(packed.get(&[2, 1]).unwrap(), 5.0);
    }

    #[test]
    fn test_contiguous_is_free_when_row_major() {
        let t = Tensor::<f32>::zeros((1, 2, 3, 3)).unwrap();
        let c = t.contiguous().unwrap();
        assert!(c.shares_storage(&t));
    }

    #[test]
    fn test_narrow_leading_dim() {
        let t = Tensor::<f32>::from_vec((0..12).map(|v| v as f32).collect(), (3, 4)).unwrap();
        // starts at offset 0: still row-major, borrowed in place
        let first = t.narrow(0, 0, 1).unwrap();
        assert!(first.is_contiguous());
        assert_eq!(first.as_slice().unwrap(), &[0., 1., 2., 3.]);

        // non-zero offset: a strided view, packed on read
        let last = t.narrow(0, 2, 1).unwrap();
        assert!(!last.is_contiguous());
        assert!(last.as_slice().is_none());
        assert!(last.shares_storage(&t));
        assert_eq!(last.to_vec(), vec![8., 9., 10., 11.]);
        let packed = last.contiguous().unwrap();
        assert!(!packed.shares_storage(&t));
        assert_eq!(packed.as_slice().unwrap(), &[8., 9., 10., 11.]);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let t = Tensor::<f32>::zeros((2, 2)).unwrap();
        assert!(t.get(&[2, 0]).is_err());
        assert!(t.get(&[0]).is_err());
    }

    #[test]
    fn test_rand_uniform_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::<f64>::rand_uniform((4, 4), -1.0, 1.0, &mut rng).unwrap();
        assert!(t.to_vec().iter().all(|v| (-1.0..1.0).contains(v)));
        assert!(Tensor::<f64>::rand_uniform(3, 1.0, 1.0, &mut rng).is_err());
    }
}
