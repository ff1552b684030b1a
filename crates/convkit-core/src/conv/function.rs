// Conv2dFunction — pairing one forward with its backward
//
// A host autograd graph records a convolution as one differentiable node:
// forward runs now, backward runs later with the upstream gradient. The
// tensors backward needs (input and weight) are captured in a SavedContext.
// `SavedContext::backward` takes `self` by value, so a context can be spent
// exactly once and its tensors are released as soon as the gradients exist.
// Stride and padding are not differentiable and get no gradient.

use crate::dtype::Element;
use crate::error::Result;
use crate::shape::Shape;
use crate::tensor::Tensor;

use super::engine::Conv2dEngine;
use super::params::ConvParams;

/// Gradients produced by one backward pass.
#[derive(Debug, Clone)]
pub struct Conv2dGrads<T: Element> {
    /// Same shape as the forward input.
    pub grad_input: Tensor<T>,
    /// Same shape as the weight.
    pub grad_weight: Tensor<T>,
}

/// Everything a backward pass needs from its forward pass.
#[derive(Debug)]
pub struct SavedContext<T: Element> {
    input: Tensor<T>,
    weight: Tensor<T>,
    params: ConvParams,
    output_shape: Shape,
    engine: Conv2dEngine,
}

impl<T: Element> SavedContext<T> {
    pub fn input(&self) -> &Tensor<T> {
        &self.input
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    pub fn params(&self) -> ConvParams {
        self.params
    }

    /// Shape the upstream gradient must have.
    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    /// Consume the context and compute `(grad_input, grad_weight)`.
    pub fn backward(self, grad_output: &Tensor<T>) -> Result<Conv2dGrads<T>> {
        let (grad_input, grad_weight) =
            self.engine
                .backward(&self.input, grad_output, &self.weight, self.params)?;
        Ok(Conv2dGrads {
            grad_input,
            grad_weight,
        })
    }
}

/// Differentiable 2D convolution: forward now, backward through the returned context.
pub struct Conv2dFunction;

impl Conv2dFunction {
    /// Run forward with the default engine.
    pub fn apply<T: Element>(
        input: &Tensor<T>,
        weight: &Tensor<T>,
        params: ConvParams,
    ) -> Result<(Tensor<T>, SavedContext<T>)> {
        Self::forward(&Conv2dEngine::default(), input, weight, params)
    }

    /// Run forward on `engine` and save what backward needs.
    ///
    /// Operands are stored row-major, so the paired backward does not repeat
    /// a layout copy.
    pub fn forward<T: Element>(
        engine: &Conv2dEngine,
        input: &Tensor<T>,
        weight: &Tensor<T>,
        params: ConvParams,
    ) -> Result<(Tensor<T>, SavedContext<T>)> {
        let input = input.contiguous()?;
        let weight = weight.contiguous()?;
        let output = engine.forward(&input, &weight, params)?;
        let ctx = SavedContext {
            output_shape: output.shape().clone(),
            input,
            weight,
            params,
            engine: engine.clone(),
        };
        Ok((output, ctx))
    }
}
