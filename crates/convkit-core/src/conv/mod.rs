//! 2D convolution kernel engine.
//!
//! Single-group, unbiased, undilated NCHW convolution with its exact
//! adjoints. Forward and backward share one index mapping ([`AxisMap`]),
//! two kernel families ([`ConvAlgorithm::Direct`], [`ConvAlgorithm::Im2col`])
//! and rayon data parallelism.
//!
//! The free functions use a default [`Conv2dEngine`]; build an engine with a
//! [`ConvConfig`] to choose the algorithm or thread pool.

mod config;
mod direct;
mod engine;
mod function;
mod im2col;
mod index;
mod params;

pub use config::{ConvAlgorithm, ConvConfig};
pub use engine::Conv2dEngine;
pub use function::{Conv2dFunction, Conv2dGrads, SavedContext};
pub use index::AxisMap;
pub use params::{ConvGeometry, ConvParams};

use crate::dtype::Element;
use crate::error::Result;
use crate::tensor::Tensor;

/// `output = conv2d(input, weight)` with the default engine.
pub fn conv2d_forward<T: Element>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    params: ConvParams,
) -> Result<Tensor<T>> {
    Conv2dEngine::default().forward(input, weight, params)
}

/// `(grad_input, grad_weight)` of [`conv2d_forward`] with the default engine.
pub fn conv2d_backward<T: Element>(
    input: &Tensor<T>,
    grad_output: &Tensor<T>,
    weight: &Tensor<T>,
    params: ConvParams,
) -> Result<(Tensor<T>, Tensor<T>)> {
    Conv2dEngine::default().backward(input, grad_output, weight, params)
}
