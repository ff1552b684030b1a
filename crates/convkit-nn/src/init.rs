// nn::init — Parameter initialization
//
//   uniform(shape, low, high)        — U(low, high)
//   kaiming_uniform(shape, a, mode)  — He uniform, U(-bound, bound) with
//                                      bound = sqrt(6 / ((1 + a²) · fan))
//
// Every initializer draws from a caller-supplied `Rng`, so a seeded StdRng
// gives reproducible weights.

use rand::distributions::uniform::SampleUniform;
use rand::Rng;

use convkit_core::{Element, Error, Result, Shape, Tensor};

/// Fan computation mode for Kaiming initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanMode {
    /// Use fan_in. Preserves variance in the forward pass.
    #[default]
    FanIn,
    /// Use fan_out. Preserves variance in the backward pass.
    FanOut,
}

/// Compute (fan_in, fan_out) from a shape.
///
/// - For 1-D: fan_in = fan_out = dims[0]
/// - For 2-D: fan_in = dims[1], fan_out = dims[0]
/// - For 3-D+: fan_in = dims[1] * product(dims[2..]),
///   fan_out = dims[0] * product(dims[2..])
///   (dims[0]=out_channels, dims[1]=in_channels, rest=kernel)
pub fn compute_fans(shape: &Shape) -> (f64, f64) {
    let dims = shape.dims();
    match dims.len() {
        0 => (1.0, 1.0),
        1 => (dims[0] as f64, dims[0] as f64),
        2 => (dims[1] as f64, dims[0] as f64),
        _ => {
            let receptive_field: usize = dims[2..].iter().product();
            let fan_in = dims[1] as f64 * receptive_field as f64;
            let fan_out = dims[0] as f64 * receptive_field as f64;
            (fan_in, fan_out)
        }
    }
}

/// Tensor drawn from U(low, high).
pub fn uniform<T, R>(shape: impl Into<Shape>, low: f64, high: f64, rng: &mut R) -> Result<Tensor<T>>
where
    T: Element + SampleUniform,
    R: Rng + ?Sized,
{
    Tensor::rand_uniform(shape, T::from_f64(low), T::from_f64(high), rng)
}

/// Kaiming (He) uniform initialization.
///
/// - `a`: negative slope of the rectifier that follows the layer
/// - `mode`: which fan preserves variance
pub fn kaiming_uniform<T, R>(
    shape: impl Into<Shape>,
    a: f64,
    mode: FanMode,
    rng: &mut R,
) -> Result<Tensor<T>>
where
    T: Element + SampleUniform,
    R: Rng + ?Sized,
{
    let shape = shape.into();
    let (fan_in, fan_out) = compute_fans(&shape);
    let fan = match mode {
        FanMode::FanIn => fan_in,
        FanMode::FanOut => fan_out,
    };
    if fan <= 0.0 {
        return Err(Error::EmptyDimension {
            what: "kaiming_uniform",
            shape,
        });
    }
    let gain_sq = 2.0 / (1.0 + a * a);
    let bound = (3.0 * gain_sq / fan).sqrt();
    log::trace!("kaiming_uniform {}: fan {} bound {}", shape, fan, bound);
    uniform(shape, -bound, bound, rng)
}
