use crate::{ImagePrecision, WeightPrecision};
use ndarray::{Array1, Array2};

/// Rust implementation of a feed forward layer.
/// The weight matrix shall have dimension (in that order)
/// input units x output units (to comply with the order in which pytorch
/// weights are saved, transposed).
pub struct FeedforwardLayer {
    weights: Array2<WeightPrecision>,
    bias: Array1<WeightPrecision>,
    input_dimension: usize,
    output_dimension: usize,
}

impl FeedforwardLayer {
    pub fn new(weights: Array2<WeightPrecision>, bias: Array1<WeightPrecision>) -> FeedforwardLayer {
        let input_dimension = weights.nrows();
        let output_dimension = weights.ncols();

        debug_assert_eq!(
            bias.len(),
            output_dimension,
            "Bias needs one entry per output unit"
        );

        FeedforwardLayer {
            weights,
            bias,
            input_dimension,
            output_dimension,
        }
    }

    /// Affine transformation of a batch of flattened activations,
    /// (batch, input units) -> (batch, output units).
    /// The bias is broadcast over the batch dimension.
    pub fn forward_pass(&self, data: &Array2<ImagePrecision>) -> Array2<ImagePrecision> {
        data.dot(&self.weights) + &self.bias
    }

    pub fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    pub fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    /// Weight entries plus one bias entry per output unit.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}
