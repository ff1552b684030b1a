// Conv2d — 2D convolution layer
//
// Applies C_out learnable filters to an input of shape [N, C_in, H, W],
// producing [N, C_out, H_out, W_out]. There is no bias term, no dilation and
// no grouping.
//
// WEIGHT INITIALIZATION:
//
//   Kaiming uniform with a = sqrt(5) over fan_in = C_in * kH * kW, which is
//   U(-k, k) with k = sqrt(1 / fan_in).
//
// TRAINING:
//
//   forward_train() returns the output together with a SavedContext; hand the
//   context and the upstream gradient to backward() to get the input and
//   weight gradients. Applying them is up to the host optimizer.

use rand::distributions::uniform::SampleUniform;
use rand::Rng;

use convkit_core::{
    Conv2dEngine, Conv2dFunction, Conv2dGrads, ConvConfig, ConvParams, Element, Error, Result,
    SavedContext, Shape, Tensor,
};

use crate::init::{self, FanMode};
use crate::module::Module;

/// 2D convolutional layer.
///
/// # Examples
/// ```ignore
/// let conv = Conv2d::<f32>::new(1, 16, [3, 3], [1, 1], [1, 1])?;
/// let x = Tensor::<f32>::ones((4, 1, 28, 28))?;
/// let y = conv.forward(&x)?; // [4, 16, 28, 28]
/// ```
#[derive(Debug, Clone)]
pub struct Conv2d<T: Element> {
    /// Convolution filters: [C_out, C_in, kH, kW]
    weight: Tensor<T>,
    params: ConvParams,
    engine: Conv2dEngine,
}

impl<T: Element + SampleUniform> Conv2d<T> {
    /// Create a layer with Kaiming-uniform weights drawn from the thread RNG.
    ///
    /// # Arguments
    /// - `in_channels`:  number of input channels (C_in)
    /// - `out_channels`: number of filters (C_out)
    /// - `kernel_size`:  `[kH, kW]`
    /// - `stride`:       `[sH, sW]`, both at least 1
    /// - `padding`:      `[pH, pW]` zero-padding added to both sides
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Self> {
        Self::with_rng(
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            &mut rand::thread_rng(),
        )
    }

    /// Like [`Conv2d::new`] with an explicit RNG, for reproducible weights.
    pub fn with_rng<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        rng: &mut R,
    ) -> Result<Self> {
        let params = ConvParams::new(stride, padding)?;
        let [kh, kw] = kernel_size;
        let shape = Shape::from((out_channels, in_channels, kh, kw));
        let weight = init::kaiming_uniform(shape, 5f64.sqrt(), FanMode::FanIn, rng)?;
        Ok(Conv2d {
            weight,
            params,
            engine: Conv2dEngine::default(),
        })
    }

    /// Redraw the weights from Kaiming uniform (a = sqrt(5)).
    pub fn reset_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.weight = init::kaiming_uniform(
            self.weight.shape().clone(),
            5f64.sqrt(),
            FanMode::FanIn,
            rng,
        )?;
        Ok(())
    }
}

impl<T: Element> Conv2d<T> {
    /// Create a layer from an existing weight tensor (e.g. for loading).
    pub fn from_tensors(weight: Tensor<T>, params: ConvParams) -> Result<Self> {
        weight.shape().dims4("Conv2d weight")?;
        Ok(Conv2d {
            weight,
            params,
            engine: Conv2dEngine::default(),
        })
    }

    /// Run this layer's convolutions on an engine built from `config`.
    pub fn with_config(mut self, config: ConvConfig) -> Self {
        self.engine = Conv2dEngine::new(config);
        self
    }

    pub fn in_channels(&self) -> usize {
        self.weight.dims()[1]
    }
    pub fn out_channels(&self) -> usize {
        self.weight.dims()[0]
    }
    pub fn kernel_size(&self) -> [usize; 2] {
        [self.weight.dims()[2], self.weight.dims()[3]]
    }
    pub fn stride(&self) -> [usize; 2] {
        self.params.stride()
    }
    pub fn padding(&self) -> [usize; 2] {
        self.params.padding()
    }
    pub fn params(&self) -> ConvParams {
        self.params
    }
    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    /// Replace the weight, e.g. after an optimizer step. The shape must not change.
    pub fn set_weight(&mut self, weight: Tensor<T>) -> Result<()> {
        if weight.shape() != self.weight.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.weight.shape().clone(),
                got: weight.shape().clone(),
            });
        }
        self.weight = weight;
        Ok(())
    }

    /// Forward pass that keeps what backward needs.
    pub fn forward_train(&self, x: &Tensor<T>) -> Result<(Tensor<T>, SavedContext<T>)> {
        Conv2dFunction::forward(&self.engine, x, &self.weight, self.params)
    }

    /// Gradients for the forward pass that produced `ctx`.
    pub fn backward(
        &self,
        ctx: SavedContext<T>,
        grad_output: &Tensor<T>,
    ) -> Result<Conv2dGrads<T>> {
        ctx.backward(grad_output)
    }
}

impl<T: Element> Module<T> for Conv2d<T> {
    /// Input:  `[N, C_in, H, W]`
    /// Output: `[N, C_out, H_out, W_out]`
    fn forward(&self, x: &Tensor<T>) -> Result<Tensor<T>> {
        self.engine.forward(x, &self.weight, self.params)
    }

    fn parameters(&self) -> Vec<Tensor<T>> {
        vec![self.weight.clone()]
    }

    fn named_parameters(&self) -> Vec<(String, Tensor<T>)> {
        vec![("weight".to_string(), self.weight.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_layer_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let conv = Conv2d::<f32>::with_rng(3, 8, [3, 3], [2, 2], [1, 1], &mut rng).unwrap();
        assert_eq!(conv.weight().dims(), &[8, 3, 3, 3]);
        assert_eq!(conv.in_channels(), 3);
        assert_eq!(conv.out_channels(), 8);
        assert_eq!(conv.kernel_size(), [3, 3]);
        assert_eq!(conv.num_parameters(), 8 * 27);
        assert_eq!(conv.named_parameters()[0].0, "weight");
    }

    #[test]
    fn test_zero_stride_rejected() {
        assert!(Conv2d::<f32>::new(1, 1, [3, 3], [0, 1], [0, 0]).is_err());
    }

    #[test]
    fn test_set_weight_checks_shape() {
        let mut conv = Conv2d::<f64>::new(2, 2, [1, 1], [1, 1], [0, 0]).unwrap();
        assert!(conv.set_weight(Tensor::zeros((2, 2, 3, 3)).unwrap()).is_err());
        conv.set_weight(Tensor::zeros((2, 2, 1, 1)).unwrap()).unwrap();
        assert_eq!(conv.weight().sum_all(), 0.0);
    }

    #[test]
    fn test_reset_parameters_changes_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut conv = Conv2d::<f64>::with_rng(2, 2, [3, 3], [1, 1], [0, 0], &mut rng).unwrap();
        let before = conv.weight().to_vec();
        conv.reset_parameters(&mut rng).unwrap();
        assert_ne!(before, conv.weight().to_vec());
    }
}
