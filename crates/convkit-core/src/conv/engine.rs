use std::sync::Arc;

use crate::alloc;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

use super::config::{ConvAlgorithm, ConvConfig};
use super::params::{ConvGeometry, ConvParams};
use super::{direct, im2col};

// Conv2dEngine — validation, layout normalisation and dispatch
//
// Every call follows the same sequence:
//   1. derive and validate the ConvGeometry (no allocation yet)
//   2. make operands row-major (free when they already are)
//   3. allocate the result buffers, reporting exhaustion as AllocationFailure
//   4. run the chosen kernel, serially or fanned out over rayon
//
// The engine holds no per-call state. Cloning it shares the optional
// dedicated thread pool.

/// Forward/backward entry points with an explicit [`ConvConfig`].
#[derive(Debug, Clone, Default)]
pub struct Conv2dEngine {
    config: ConvConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Conv2dEngine {
    /// Create an engine. When `config.num_threads` is set, a dedicated pool
    /// is built; if that fails the global pool is used.
    pub fn new(config: ConvConfig) -> Self {
        let pool = config.num_threads.and_then(|n| {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("convkit-{}", i))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    log::warn!("conv2d: could not build {}-thread pool ({}), using global pool", n, e);
                    None
                }
            }
        });
        Conv2dEngine { config, pool }
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    /// Run `f` inside the dedicated pool, if any.
    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    fn plan(&self, geom: &ConvGeometry) -> (ConvAlgorithm, bool) {
        (
            self.config.algorithm.resolve(geom),
            self.config.runs_parallel(geom),
        )
    }

    /// 2D convolution forward pass.
    ///
    /// - `input`:  `[N, C_in, H, W]`
    /// - `weight`: `[C_out, C_in, kH, kW]`
    ///
    /// Returns `[N, C_out, H_out, W_out]` with
    /// `H_out = (H + 2*pH - kH) / sH + 1` (and likewise for width).
    pub fn forward<T: Element>(
        &self,
        input: &Tensor<T>,
        weight: &Tensor<T>,
        params: ConvParams,
    ) -> Result<Tensor<T>> {
        let geom = ConvGeometry::infer(input.shape(), weight.shape(), params)?;
        let (algorithm, parallel) = self.plan(&geom);
        log::debug!(
            "conv2d forward: input {} weight {} -> {} ({}, {}, {} macs)",
            input.shape(),
            weight.shape(),
            geom.output_shape(),
            algorithm,
            if parallel { "parallel" } else { "serial" },
            geom.macs()
        );

        let input = input.contiguous()?;
        let weight = weight.contiguous()?;
        let x = row_major(&input)?;
        let w = row_major(&weight)?;

        let out_shape = geom.output_shape();
        let mut out = alloc::try_filled(out_shape.elem_count(), T::zero())?;
        self.install(|| match algorithm {
            ConvAlgorithm::Im2col => im2col::forward(&geom, x, w, &mut out, parallel),
            ConvAlgorithm::Direct | ConvAlgorithm::Auto => {
                direct::forward(&geom, x, w, &mut out, parallel);
                Ok(())
            }
        })?;

        Ok(Tensor::from_parts(out, out_shape))
    }

    /// 2D convolution backward pass.
    ///
    /// `grad_output` must have exactly the shape `forward` returns for the
    /// same `(input, weight, params)`. Returns `(grad_input, grad_weight)`
    /// shaped like `input` and `weight`.
    pub fn backward<T: Element>(
        &self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
        weight: &Tensor<T>,
        params: ConvParams,
    ) -> Result<(Tensor<T>, Tensor<T>)> {
        let geom = ConvGeometry::infer(input.shape(), weight.shape(), params)?;
        let expected = geom.output_shape();
        if grad_output.shape() != &expected {
            return Err(Error::ShapeMismatch {
                expected,
                got: grad_output.shape().clone(),
            });
        }
        let (algorithm, parallel) = self.plan(&geom);
        log::debug!(
            "conv2d backward: input {} weight {} grad_output {} ({}, {})",
            input.shape(),
            weight.shape(),
            grad_output.shape(),
            algorithm,
            if parallel { "parallel" } else { "serial" }
        );

        let input = input.contiguous()?;
        let weight = weight.contiguous()?;
        let grad_output = grad_output.contiguous()?;
        let x = row_major(&input)?;
        let w = row_major(&weight)?;
        let gy = row_major(&grad_output)?;

        let mut grad_input = alloc::try_filled(input.elem_count(), T::zero())?;
        let grad_weight = self.install(|| -> Result<Vec<T>> {
            match algorithm {
                ConvAlgorithm::Im2col => {
                    im2col::backward_input(&geom, gy, w, &mut grad_input, parallel)?;
                    im2col::backward_weight(&geom, x, gy, parallel)
                }
                ConvAlgorithm::Direct | ConvAlgorithm::Auto => {
                    let mut gw = alloc::try_filled(weight.elem_count(), T::zero())?;
                    direct::backward_input(&geom, gy, w, &mut grad_input, parallel);
                    direct::backward_weight(&geom, x, gy, &mut gw, parallel);
                    Ok(gw)
                }
            }
        })?;

        Ok((
            Tensor::from_parts(grad_input, geom.input_shape()),
            Tensor::from_parts(grad_weight, geom.weight_shape()),
        ))
    }
}

fn row_major<T: Element>(t: &Tensor<T>) -> Result<&[T]> {
    t.as_slice()
        .ok_or_else(|| Error::msg(format!("conv2d: {:?} is not row-major", t)))
}
