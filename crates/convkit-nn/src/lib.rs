//! # convkit-nn
//!
//! Layer-level wrapper around the convkit convolution engine.
//!
//! 1. **Module trait** — every layer implements `forward()` and `parameters()`
//! 2. **Conv2d** — unbiased 2D convolution with Kaiming-uniform weights and a
//!    training path that pairs forward with backward through a saved context
//! 3. **init** — parameter initializers (uniform, Kaiming uniform)

pub mod conv;
pub mod init;
pub mod module;

pub use conv::Conv2d;
pub use init::FanMode;
pub use module::Module;
