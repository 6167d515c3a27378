//! This module provides the necessary activation functions for our neural
//! networks, namely ReLU, tanh and softmax.
//!
//! All activation functions are exposed as a layer as well as a free function
use ndarray::*;

use crate::ImagePrecision;

/// Relu implementation
pub fn relu<D: Dimension>(data: &Array<ImagePrecision, D>) -> Array<ImagePrecision, D> {
    data.mapv(|x| if x > 0. { x } else { 0. })
}

/// Tanh implementation
pub fn tanh<D: Dimension>(data: &Array<ImagePrecision, D>) -> Array<ImagePrecision, D> {
    data.mapv(|x| x.tanh())
}

/// Softmax over the class axis of a batch of scores, (batch, classes).
/// Every row of the result is a probability distribution (sums to 1).
/// The row maximum is subtracted before exponentiating, so large scores
/// don't overflow to infinity.
pub fn softmax(scores: &Array2<ImagePrecision>) -> Array2<ImagePrecision> {
    let mut out = scores.to_owned();
    for mut row in out.rows_mut() {
        let max = row
            .iter()
            .cloned()
            .fold(ImagePrecision::NEG_INFINITY, ImagePrecision::max);
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }
    out
}

/// Relu implementation as a layer.
pub struct ReluLayer {}

impl ReluLayer {
    pub fn new() -> Self {
        Self {}
    }

    pub fn activate<D: Dimension>(
        &self,
        x: &Array<ImagePrecision, D>,
    ) -> Array<ImagePrecision, D> {
        x.map(|a| a.max(0.0))
    }
}

/// Tanh implementation as a layer.
pub struct TanhLayer {}

impl TanhLayer {
    pub fn new() -> Self {
        Self {}
    }

    pub fn activate<D: Dimension>(
        &self,
        x: &Array<ImagePrecision, D>,
    ) -> Array<ImagePrecision, D> {
        tanh(x)
    }
}

/// Softmax implementation as a layer.
pub struct SoftmaxLayer {}

impl SoftmaxLayer {
    pub fn new() -> Self {
        Self {}
    }

    pub fn activate(&self, x: &Array2<ImagePrecision>) -> Array2<ImagePrecision> {
        softmax(x)
    }
}
