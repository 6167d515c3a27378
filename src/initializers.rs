use crate::WeightPrecision;
use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Samples a parameter array uniformly from (-1/sqrt(fan_in), 1/sqrt(fan_in)).
///
/// This is the default initialization scheme pytorch applies to linear and
/// convolution layers (for convolutions, fan_in is input channels times
/// kernel area), so freshly constructed models start from the same weight
/// distribution as their python counterparts.
pub fn uniform_fan_in<D, Sh>(shape: Sh, fan_in: usize) -> Array<WeightPrecision, D>
where
    D: Dimension,
    Sh: ShapeBuilder<Dim = D>,
{
    debug_assert!(fan_in > 0, "fan_in of 0 passed");
    let bound = 1.0 / (fan_in as WeightPrecision).sqrt();
    Array::random(shape, Uniform::new(-bound, bound))
}
