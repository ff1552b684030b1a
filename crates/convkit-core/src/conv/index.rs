// Shared index mapping between output and input coordinates
//
// Along one spatial axis, output position `o` with kernel tap `k` reads
//
//     i = o * stride + k - pad
//
// and the read is a padding zero unless 0 <= i < extent. Every kernel in this
// crate (direct and im2col, forward and backward) resolves coordinates only
// through `AxisMap::source` or its inverse `AxisMap::target`, so the padding
// and stride handling of the backward pass is by construction the adjoint of
// the forward pass.

/// Affine output-to-input mapping along one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMap {
    stride: usize,
    pad: usize,
    extent: usize,
}

impl AxisMap {
    pub fn new(stride: usize, pad: usize, extent: usize) -> Self {
        debug_assert!(stride > 0);
        AxisMap { stride, pad, extent }
    }

    /// Input coordinate read by output `out` at kernel tap `k`, or `None` in
    /// the padding.
    #[inline]
    pub fn source(&self, out: usize, k: usize) -> Option<usize> {
        (out * self.stride + k)
            .checked_sub(self.pad)
            .filter(|&i| i < self.extent)
    }

    /// The output coordinate whose tap `k` reads input `input`, if one exists
    /// among `0..out_extent`.
    ///
    /// Inverse of [`AxisMap::source`]: `target(i, k, n) == Some(o)` exactly
    /// when `source(o, k) == Some(i)` and `o < n`.
    #[inline]
    pub fn target(&self, input: usize, k: usize, out_extent: usize) -> Option<usize> {
        if input >= self.extent {
            return None;
        }
        let shifted = (input + self.pad).checked_sub(k)?;
        if shifted % self.stride != 0 {
            return None;
        }
        let out = shifted / self.stride;
        (out < out_extent).then_some(out)
    }
}
