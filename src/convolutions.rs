use crate::{models::FeatureMap, ConvKernel, WeightPrecision};
use convolutions_rs::convolutions::ConvolutionLayer;
use ndarray::Array1;

pub use convolutions_rs::Padding;

/// Rust implementation of a convolutional layer with bias.
/// The kernel shall have dimension (in that order)
/// output channels x input channels x kernel height x kernel width
/// (to comply with the order in which pytorch weights are saved).
///
/// The actual convolution arithmetic (im2col) is delegated to the
/// convolutions-rs crate; this layer tracks the parameter shapes so that
/// models can report their learnable parameter counts.
pub struct Conv2dLayer {
    conv: ConvolutionLayer<WeightPrecision>,
    num_input_channels: usize,
    num_output_channels: usize,
    num_parameters: usize,
}

impl Conv2dLayer {
    pub fn new(
        kernel: ConvKernel,
        bias: Array1<WeightPrecision>,
        stride: usize,
        padding: Padding,
    ) -> Conv2dLayer {
        debug_assert!(stride > 0, "Stride of 0 passed");
        debug_assert_eq!(
            kernel.dim().0,
            bias.len(),
            "Bias needs one entry per output channel"
        );

        let num_output_channels = kernel.dim().0;
        let num_input_channels = kernel.dim().1;
        let num_parameters = kernel.len() + bias.len();

        Conv2dLayer {
            conv: ConvolutionLayer::new(kernel, Some(bias), stride, padding),
            num_input_channels,
            num_output_channels,
            num_parameters,
        }
    }

    /// Performs a convolution on the given image data using this layers parameters.
    /// We expect the data in Pytorch layout (channels, height, width).
    pub fn convolve(&self, image: &FeatureMap) -> FeatureMap {
        self.conv.convolve(image)
    }

    pub fn num_input_channels(&self) -> usize {
        self.num_input_channels
    }

    pub fn num_output_channels(&self) -> usize {
        self.num_output_channels
    }

    /// Kernel entries plus one bias entry per output channel.
    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_conv_with_bias() {
        let kernel = Array::from_shape_vec((1, 1, 2, 2), vec![0., 1., -1., 0.]).unwrap();
        let bias = array![1.];
        let conv_layer = Conv2dLayer::new(kernel, bias, 1, Padding::Valid);

        let test_img = array![[[0., 1., 0.], [0., 0., 0.], [-1., 0., 0.]]];
        let convolved_image = conv_layer.convolve(&test_img);

        assert_eq!(convolved_image, array![[[2., 1.], [2., 1.]]]);
    }

    #[test]
    fn test_conv_output_shape_same_padding() {
        let kernel: ConvKernel = Array::zeros((6, 1, 5, 5));
        let conv_layer = Conv2dLayer::new(kernel, Array::zeros(6), 1, Padding::Same);

        let out = conv_layer.convolve(&Array::zeros((1, 28, 28)));
        assert_eq!(out.dim(), (6, 28, 28));
    }

    #[test]
    fn test_conv_output_shape_valid_padding() {
        let kernel: ConvKernel = Array::zeros((16, 6, 5, 5));
        let conv_layer = Conv2dLayer::new(kernel, Array::zeros(16), 1, Padding::Valid);

        let out = conv_layer.convolve(&Array::zeros((6, 14, 14)));
        assert_eq!(out.dim(), (16, 10, 10));
    }

    #[test]
    fn test_parameter_count() {
        let kernel: ConvKernel = Array::zeros((6, 1, 5, 5));
        let conv_layer = Conv2dLayer::new(kernel, Array::zeros(6), 1, Padding::Same);

        assert_eq!(conv_layer.num_input_channels(), 1);
        assert_eq!(conv_layer.num_output_channels(), 6);
        assert_eq!(conv_layer.num_parameters(), 156);
    }
}
