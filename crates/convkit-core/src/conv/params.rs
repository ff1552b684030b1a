use crate::error::{Error, Result};
use crate::shape::Shape;

use super::index::AxisMap;

// ConvParams & ConvGeometry
//
// OUTPUT SIZE FORMULA:
//
//   H_out = floor((H + 2*padding_h - kernel_h) / stride_h) + 1
//   W_out = floor((W + 2*padding_w - kernel_w) / stride_w) + 1
//
// ConvParams is the per-layer constant (stride, padding). ConvGeometry is the
// per-call bundle of every extent, derived from the operand shapes and
// validated once, before any buffer is allocated.

/// Stride and zero-padding of a 2D convolution, as `[height, width]` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvParams {
    stride: [usize; 2],
    padding: [usize; 2],
}

impl Default for ConvParams {
    /// Stride 1, no padding.
    fn default() -> Self {
        ConvParams {
            stride: [1, 1],
            padding: [0, 0],
        }
    }
}

impl ConvParams {
    /// Rejects a zero stride with `InvalidParameter`.
    pub fn new(stride: [usize; 2], padding: [usize; 2]) -> Result<Self> {
        for (name, s) in [("stride_h", stride[0]), ("stride_w", stride[1])] {
            if s == 0 {
                return Err(Error::InvalidParameter { name, value: 0 });
            }
        }
        Ok(ConvParams { stride, padding })
    }

    /// Build from signed integers as a host framework passes them.
    ///
    /// Non-positive strides and negative paddings are `InvalidParameter`.
    pub fn from_signed(stride: [i64; 2], padding: [i64; 2]) -> Result<Self> {
        let positive = |name: &'static str, value: i64| {
            if value > 0 {
                usize::try_from(value).map_err(|_| Error::InvalidParameter { name, value })
            } else {
                Err(Error::InvalidParameter { name, value })
            }
        };
        let non_negative = |name: &'static str, value: i64| {
            usize::try_from(value).map_err(|_| Error::InvalidParameter { name, value })
        };
        Self::new(
            [positive("stride_h", stride[0])?, positive("stride_w", stride[1])?],
            [
                non_negative("pad_h", padding[0])?,
                non_negative("pad_w", padding[1])?,
            ],
        )
    }

    /// Same stride and padding along both axes.
    pub fn square(stride: usize, padding: usize) -> Result<Self> {
        Self::new([stride, stride], [padding, padding])
    }

    pub fn stride(&self) -> [usize; 2] {
        self.stride
    }

    pub fn padding(&self) -> [usize; 2] {
        self.padding
    }

    /// Output extent along one axis, or `KernelTooLarge` when it would be empty.
    ///
    /// A padded extent that does not fit in `usize` describes an output no
    /// buffer can hold, so it is reported as `AllocationFailure`.
    pub fn output_extent(
        &self,
        axis: usize,
        input: usize,
        kernel: usize,
    ) -> Result<usize> {
        let padded = self.padding[axis]
            .checked_mul(2)
            .and_then(|p| p.checked_add(input))
            .ok_or(Error::AllocationFailure {
                elems: usize::MAX,
                bytes: usize::MAX,
            })?;
        if kernel > padded {
            return Err(Error::KernelTooLarge {
                axis: if axis == 0 { "height" } else { "width" },
                kernel,
                padded,
            });
        }
        Ok((padded - kernel) / self.stride[axis] + 1)
    }
}

/// Every extent of one convolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub n: usize,
    pub c_in: usize,
    pub h: usize,
    pub w: usize,
    pub c_out: usize,
    pub kh: usize,
    pub kw: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub params: ConvParams,
}

impl ConvGeometry {
    /// Derive the geometry from input `[N, C_in, H, W]` and weight
    /// `[C_out, C_in, kH, kW]` shapes.
    pub fn infer(input: &Shape, weight: &Shape, params: ConvParams) -> Result<Self> {
        let [n, c_in, h, w] = input.dims4("conv2d input")?;
        let [c_out, wc_in, kh, kw] = weight.dims4("conv2d weight")?;

        if c_in != wc_in {
            return Err(Error::ChannelMismatch {
                input: c_in,
                weight: wc_in,
            });
        }
        if input.elem_count() == 0 {
            return Err(Error::EmptyDimension {
                what: "conv2d input",
                shape: input.clone(),
            });
        }
        if weight.elem_count() == 0 {
            return Err(Error::EmptyDimension {
                what: "conv2d weight",
                shape: weight.clone(),
            });
        }

        let out_h = params.output_extent(0, h, kh)?;
        let out_w = params.output_extent(1, w, kw)?;

        // Output and im2col column buffers must be addressable before any
        // index arithmetic runs over them.
        let addressable =
            |dims: &[usize]| dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if addressable(&[n, c_out, out_h, out_w]).is_none()
            || addressable(&[c_in, kh, kw, out_h, out_w]).is_none()
        {
            return Err(Error::AllocationFailure {
                elems: usize::MAX,
                bytes: usize::MAX,
            });
        }

        Ok(ConvGeometry {
            n,
            c_in,
            h,
            w,
            c_out,
            kh,
            kw,
            out_h,
            out_w,
            params,
        })
    }

    pub fn input_shape(&self) -> Shape {
        Shape::from((self.n, self.c_in, self.h, self.w))
    }

    pub fn weight_shape(&self) -> Shape {
        Shape::from((self.c_out, self.c_in, self.kh, self.kw))
    }

    pub fn output_shape(&self) -> Shape {
        Shape::from((self.n, self.c_out, self.out_h, self.out_w))
    }

    /// Index mapping along the height axis.
    pub fn rows(&self) -> AxisMap {
        AxisMap::new(self.params.stride[0], self.params.padding[0], self.h)
    }

    /// Index mapping along the width axis.
    pub fn cols(&self) -> AxisMap {
        AxisMap::new(self.params.stride[1], self.params.padding[1], self.w)
    }

    /// Multiply-accumulates performed by one forward pass, saturating at
    /// `usize::MAX`.
    pub fn macs(&self) -> usize {
        [self.c_out, self.out_h, self.out_w, self.c_in, self.kh, self.kw]
            .iter()
            .fold(self.n, |acc, &d| acc.saturating_mul(d))
    }

    pub(crate) fn in_plane(&self) -> usize {
        self.h * self.w
    }

    pub(crate) fn out_plane(&self) -> usize {
        self.out_h * self.out_w
    }

    pub(crate) fn kernel_plane(&self) -> usize {
        self.kh * self.kw
    }
}
