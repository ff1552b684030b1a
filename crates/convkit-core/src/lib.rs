//! # convkit-core
//!
//! Tensor primitives and the 2D convolution kernel engine for convkit.
//!
//! This crate provides:
//! - [`Tensor`] — dense n-dimensional `f32`/`f64` array with cheap views
//! - [`Shape`] / [`Layout`] — extents, strides and memory layout
//! - [`DType`] / [`Element`] — supported element types
//! - [`conv`] — forward/backward 2D convolution, its config and saved context
//! - [`Error`] — the single error type, classified by [`ErrorKind`]

mod alloc;
pub mod conv;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;
pub mod tensor;

pub use conv::{
    conv2d_backward, conv2d_forward, Conv2dEngine, Conv2dFunction, Conv2dGrads, ConvAlgorithm,
    ConvConfig, ConvGeometry, ConvParams, SavedContext,
};
pub use dtype::{DType, Element};
pub use error::{Error, ErrorKind, Result};
pub use layout::Layout;
pub use shape::Shape;
pub use tensor::Tensor;
