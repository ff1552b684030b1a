// Module trait — the interface a layer exposes to a host training loop
//
// A layer is a plain struct owning its parameters. forward() computes the
// output; parameters() hands the trainable tensors to whatever optimizer the
// host uses. Layers are generic over the element type, so the same layer
// definition runs in f32 or f64.

use convkit_core::{Element, Result, Tensor};

/// The trait every layer implements.
pub trait Module<T: Element> {
    /// Compute the output tensor from the input tensor.
    fn forward(&self, x: &Tensor<T>) -> Result<Tensor<T>>;

    /// All trainable parameters of this module.
    fn parameters(&self) -> Vec<Tensor<T>>;

    /// Total number of scalar parameters in this module.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.elem_count()).sum()
    }

    /// Parameters with human-readable names.
    ///
    /// The default uses positional indices (`param_0`, `param_1`, …).
    fn named_parameters(&self) -> Vec<(String, Tensor<T>)> {
        self.parameters()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (format!("param_{i}"), p))
            .collect()
    }
}
