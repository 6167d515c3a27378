//! Neural network architectures for handwritten digit classification.
//!
//! Defines three small classifiers over 28x28 grayscale images (LeNet-5,
//! a parameter-matched multilayer perceptron and a regularized LeNet-5
//! variant), composed from the layer primitives in the sibling modules.
//! Training loops, data loading and checkpointing are the business of the
//! calling harness; this crate only provides the forward transformations.

pub mod activation_functions;
pub mod convolutions;
pub mod dropout;
pub mod fully_connected;
pub mod initializers;
pub mod models;
pub mod pooling;

use ndarray::Array4;

pub type WeightPrecision = f32;
pub type ImagePrecision = f32;

/// Convolution kernels have dimension (in that order)
/// output channels x input channels x kernel height x kernel width
/// (to comply with the order in which pytorch weights are saved).
pub type ConvKernel = Array4<WeightPrecision>;
