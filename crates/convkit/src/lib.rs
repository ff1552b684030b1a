//! # convkit
//!
//! 2D convolution forward and backward kernels with a small tensor runtime.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use convkit::prelude::*;
//!
//! # fn main() -> convkit::Result<()> {
//! let x = Tensor::<f32>::ones((1, 1, 4, 4))?;
//! let w = Tensor::<f32>::ones((1, 1, 2, 2))?;
//! let y = conv2d_forward(&x, &w, ConvParams::default())?;
//! assert_eq!(y.dims(), &[1, 1, 3, 3]);
//! assert!(y.to_vec().iter().all(|&v| v == 4.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `convkit-core` | Tensor, Shape, Layout, DType, Error, the conv engine |
//! | `convkit-nn` | Module trait, Conv2d layer, initializers |

/// Re-export core types.
pub use convkit_core::{
    conv, conv2d_backward, conv2d_forward, Conv2dEngine, Conv2dFunction, Conv2dGrads,
    ConvAlgorithm, ConvConfig, ConvGeometry, ConvParams, DType, Element, Error, ErrorKind, Layout,
    Result, SavedContext, Shape, Tensor,
};

/// Re-export neural network modules.
pub mod nn {
    pub use convkit_nn::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{Conv2d, Module};
    pub use crate::{
        conv2d_backward, conv2d_forward, Conv2dEngine, Conv2dFunction, Conv2dGrads,
        ConvAlgorithm, ConvConfig, ConvParams, DType, ErrorKind, SavedContext, Shape, Tensor,
    };
}
