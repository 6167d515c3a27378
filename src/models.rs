use crate::activation_functions::{relu, softmax, tanh};
use crate::convolutions::{Conv2dLayer, Padding};
use crate::dropout::{DropoutLayer, SpatialDropoutLayer};
use crate::fully_connected::FeedforwardLayer;
use crate::initializers::uniform_fan_in;
use crate::pooling::{AveragePoolingLayer, MaxPoolingLayer};
use crate::ImagePrecision;
use log::debug;
use ndarray::{Array1, Array2, Array3, Array4};
use thiserror::Error;

/// Per-sample activations in Pytorch layout (channels, height, width).
pub type FeatureMap = Array3<ImagePrecision>;
/// A batch of input images, (batch, channels, height, width).
pub type ImageBatch = Array4<ImagePrecision>;
/// A batch of class distributions, (batch, classes). Rows sum to 1.
pub type ClassProbabilities = Array2<ImagePrecision>;

pub const IMAGE_CHANNELS: usize = 1;
pub const IMAGE_HEIGHT: usize = 28;
pub const IMAGE_WIDTH: usize = 28;
pub const NUM_CLASSES: usize = 10;

const FLATTENED_IMAGE: usize = IMAGE_CHANNELS * IMAGE_HEIGHT * IMAGE_WIDTH;
/// Feature size after the second pooling stage of the LeNet variants,
/// 16 channels of 5x5 maps.
const LENET_FEATURES: usize = 16 * 5 * 5;

type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Expected input images of shape (batch, 1, 28, 28), got {got:?}")]
    InputShapeMismatch { got: Vec<usize> },
    #[error("Could not flatten activations:\n {0}")]
    ReshapeError(#[from] ndarray::ShapeError),
}

/// General model trait for the digit classifiers.
///
/// Models own their parameters (allocated and initialized at construction)
/// and expose a single batched forward transformation. Everything else,
/// training loop, loss, optimization and checkpointing, happens in the
/// calling harness.
pub trait ClassificationModel {
    /// Forward transformation of a batch of images, (batch, 1, 28, 28)
    /// -> (batch, 10). Rows of the output are class probabilities.
    fn forward_pass(&self, input: &ImageBatch) -> ModelResult<ClassProbabilities>;

    /// Total number of learnable parameters of the model.
    fn num_parameters(&self) -> usize;

    /// Switches between training mode (dropout active, stochastic) and
    /// evaluation mode (dropout disabled, deterministic). Models start
    /// out in training mode.
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;
}

fn check_input_shape(input: &ImageBatch) -> ModelResult<()> {
    let (_, channels, height, width) = input.dim();
    if channels != IMAGE_CHANNELS || height != IMAGE_HEIGHT || width != IMAGE_WIDTH {
        return Err(ModelError::InputShapeMismatch {
            got: input.shape().to_vec(),
        });
    }
    Ok(())
}

/// LeNet-5 as described in LeCun et al., 1998,
/// http://yann.lecun.com/exdb/publis/pdf/lecun-98.pdf, adapted to 28x28
/// inputs by padding the first convolution. Tanh activations, average
/// pooling, softmax output. 61,706 learnable parameters.
pub struct LeNet5 {
    /// 5x5conv,1,6 with same padding, 156 parameters
    conv1: Conv2dLayer,
    pool1: AveragePoolingLayer,
    /// 5x5conv,1,16, 2,416 parameters
    conv2: Conv2dLayer,
    pool2: AveragePoolingLayer,
    /// 400 -> 120, 48,120 parameters
    fc1: FeedforwardLayer,
    /// 120 -> 84, 10,164 parameters
    fc2: FeedforwardLayer,
    /// 84 -> 10, 850 parameters
    fc3: FeedforwardLayer,
    training: bool,
}

impl LeNet5 {
    pub fn new() -> LeNet5 {
        let model = LeNet5 {
            conv1: Conv2dLayer::new(
                uniform_fan_in((6, 1, 5, 5), 25),
                uniform_fan_in(6, 25),
                1,
                Padding::Same,
            ),
            pool1: AveragePoolingLayer::new(2, 2),
            conv2: Conv2dLayer::new(
                uniform_fan_in((16, 6, 5, 5), 150),
                uniform_fan_in(16, 150),
                1,
                Padding::Valid,
            ),
            pool2: AveragePoolingLayer::new(2, 2),
            fc1: FeedforwardLayer::new(
                uniform_fan_in((LENET_FEATURES, 120), LENET_FEATURES),
                uniform_fan_in(120, LENET_FEATURES),
            ),
            fc2: FeedforwardLayer::new(uniform_fan_in((120, 84), 120), uniform_fan_in(84, 120)),
            fc3: FeedforwardLayer::new(
                uniform_fan_in((84, NUM_CLASSES), 84),
                uniform_fan_in(NUM_CLASSES, 84),
            ),
            training: true,
        };
        debug!(
            "constructed LeNet-5 with {} learnable parameters",
            model.num_parameters()
        );
        model
    }

    /// Convolutional feature extraction on a single image, returns the
    /// flattened 400-dimensional feature vector.
    fn features(&self, image: &FeatureMap) -> ModelResult<Array1<ImagePrecision>> {
        let x = self.pool1.forward_pass(&tanh(&self.conv1.convolve(image)));
        let x = self.pool2.forward_pass(&tanh(&self.conv2.convolve(&x)));
        Ok(x.into_shape(LENET_FEATURES)?)
    }
}

impl ClassificationModel for LeNet5 {
    fn forward_pass(&self, input: &ImageBatch) -> ModelResult<ClassProbabilities> {
        check_input_shape(input)?;

        let batch_size = input.dim().0;
        let mut flat = Array2::zeros((batch_size, LENET_FEATURES));
        for (i, image) in input.outer_iter().enumerate() {
            flat.row_mut(i).assign(&self.features(&image.to_owned())?);
        }

        let x = tanh(&self.fc1.forward_pass(&flat));
        let x = tanh(&self.fc2.forward_pass(&x));
        Ok(softmax(&self.fc3.forward_pass(&x)))
    }

    fn num_parameters(&self) -> usize {
        self.conv1.num_parameters()
            + self.conv2.num_parameters()
            + self.fc1.num_parameters()
            + self.fc2.num_parameters()
            + self.fc3.num_parameters()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

/// Widths of the hidden [linear -> dropout -> relu] blocks. Chosen so the
/// total parameter count (61,720) matches LeNet-5 and accuracy
/// comparisons between the two stay meaningful.
const MLP_WIDTHS: [usize; 8] = [FLATTENED_IMAGE, 64, 64, 64, 32, 16, 16, NUM_CLASSES];

struct DropoutBlock {
    linear: FeedforwardLayer,
    dropout: DropoutLayer,
}

/// Fully-connected classifier, parameter-matched to LeNet-5.
/// Seven [linear -> dropout -> relu] blocks followed by a
/// [linear -> softmax] output block.
pub struct CustomMLP {
    hidden: Vec<DropoutBlock>,
    /// 10 -> 10, 110 parameters
    output: FeedforwardLayer,
    training: bool,
}

impl CustomMLP {
    pub fn new() -> CustomMLP {
        let hidden = MLP_WIDTHS
            .windows(2)
            .map(|w| DropoutBlock {
                linear: FeedforwardLayer::new(
                    uniform_fan_in((w[0], w[1]), w[0]),
                    uniform_fan_in(w[1], w[0]),
                ),
                dropout: DropoutLayer::new(0.5),
            })
            .collect();
        let model = CustomMLP {
            hidden,
            output: FeedforwardLayer::new(
                uniform_fan_in((NUM_CLASSES, NUM_CLASSES), NUM_CLASSES),
                uniform_fan_in(NUM_CLASSES, NUM_CLASSES),
            ),
            training: true,
        };
        debug!(
            "constructed MLP with {} learnable parameters",
            model.num_parameters()
        );
        model
    }

    /// Forward transformation on images that are already flattened,
    /// (batch, 784) -> (batch, 10).
    pub fn forward_flat(&self, flat: &Array2<ImagePrecision>) -> ModelResult<ClassProbabilities> {
        if flat.ncols() != FLATTENED_IMAGE {
            return Err(ModelError::InputShapeMismatch {
                got: flat.shape().to_vec(),
            });
        }

        let mut x = flat.to_owned();
        for block in &self.hidden {
            x = relu(&block.dropout.forward_pass(&block.linear.forward_pass(&x)));
        }
        Ok(softmax(&self.output.forward_pass(&x)))
    }
}

impl ClassificationModel for CustomMLP {
    fn forward_pass(&self, input: &ImageBatch) -> ModelResult<ClassProbabilities> {
        check_input_shape(input)?;

        let batch_size = input.dim().0;
        let flat = input.to_owned().into_shape((batch_size, FLATTENED_IMAGE))?;
        self.forward_flat(&flat)
    }

    fn num_parameters(&self) -> usize {
        self.hidden
            .iter()
            .map(|block| block.linear.num_parameters())
            .sum::<usize>()
            + self.output.num_parameters()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        for block in &mut self.hidden {
            block.dropout.set_training(training);
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

/// LeNet-5 with regularization against overfitting: relu activations,
/// spatial dropout after each convolution, element dropout after each
/// hidden fully-connected layer, max pooling instead of average pooling.
/// Same 61,706 learnable parameters as plain LeNet-5, dropout has none.
pub struct RegularizedLeNet5 {
    /// 5x5conv,1,6 with same padding, 156 parameters
    conv1: Conv2dLayer,
    drop1: SpatialDropoutLayer,
    pool1: MaxPoolingLayer,
    /// 5x5conv,1,16, 2,416 parameters
    conv2: Conv2dLayer,
    drop2: SpatialDropoutLayer,
    pool2: MaxPoolingLayer,
    /// 400 -> 120, 48,120 parameters
    fc1: FeedforwardLayer,
    drop3: DropoutLayer,
    /// 120 -> 84, 10,164 parameters
    fc2: FeedforwardLayer,
    drop4: DropoutLayer,
    /// 84 -> 10, 850 parameters
    fc3: FeedforwardLayer,
    training: bool,
}

impl RegularizedLeNet5 {
    pub fn new() -> RegularizedLeNet5 {
        let model = RegularizedLeNet5 {
            conv1: Conv2dLayer::new(
                uniform_fan_in((6, 1, 5, 5), 25),
                uniform_fan_in(6, 25),
                1,
                Padding::Same,
            ),
            drop1: SpatialDropoutLayer::new(0.5),
            pool1: MaxPoolingLayer::new(2, 2),
            conv2: Conv2dLayer::new(
                uniform_fan_in((16, 6, 5, 5), 150),
                uniform_fan_in(16, 150),
                1,
                Padding::Valid,
            ),
            drop2: SpatialDropoutLayer::new(0.5),
            pool2: MaxPoolingLayer::new(2, 2),
            fc1: FeedforwardLayer::new(
                uniform_fan_in((LENET_FEATURES, 120), LENET_FEATURES),
                uniform_fan_in(120, LENET_FEATURES),
            ),
            drop3: DropoutLayer::new(0.5),
            fc2: FeedforwardLayer::new(uniform_fan_in((120, 84), 120), uniform_fan_in(84, 120)),
            drop4: DropoutLayer::new(0.5),
            fc3: FeedforwardLayer::new(
                uniform_fan_in((84, NUM_CLASSES), 84),
                uniform_fan_in(NUM_CLASSES, 84),
            ),
            training: true,
        };
        debug!(
            "constructed regularized LeNet-5 with {} learnable parameters",
            model.num_parameters()
        );
        model
    }

    /// Convolutional feature extraction on a single image, returns the
    /// flattened 400-dimensional feature vector.
    fn features(&self, image: &FeatureMap) -> ModelResult<Array1<ImagePrecision>> {
        let x = self
            .pool1
            .forward_pass(&self.drop1.forward_pass(&relu(&self.conv1.convolve(image))));
        let x = self
            .pool2
            .forward_pass(&self.drop2.forward_pass(&relu(&self.conv2.convolve(&x))));
        Ok(x.into_shape(LENET_FEATURES)?)
    }
}

impl ClassificationModel for RegularizedLeNet5 {
    fn forward_pass(&self, input: &ImageBatch) -> ModelResult<ClassProbabilities> {
        check_input_shape(input)?;

        let batch_size = input.dim().0;
        let mut flat = Array2::zeros((batch_size, LENET_FEATURES));
        for (i, image) in input.outer_iter().enumerate() {
            flat.row_mut(i).assign(&self.features(&image.to_owned())?);
        }

        let x = self.drop3.forward_pass(&relu(&self.fc1.forward_pass(&flat)));
        let x = self.drop4.forward_pass(&relu(&self.fc2.forward_pass(&x)));
        Ok(softmax(&self.fc3.forward_pass(&x)))
    }

    fn num_parameters(&self) -> usize {
        self.conv1.num_parameters()
            + self.conv2.num_parameters()
            + self.fc1.num_parameters()
            + self.fc2.num_parameters()
            + self.fc3.num_parameters()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.drop1.set_training(training);
        self.drop2.set_training(training);
        self.drop3.set_training(training);
        self.drop4.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_rows_sum_to_one(output: &ClassProbabilities) {
        for row in output.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
    }

    /// A fixed non-trivial batch of two images.
    fn test_batch() -> ImageBatch {
        Array4::from_shape_fn((2, 1, 28, 28), |(b, _, i, j)| {
            (b + 1) as ImagePrecision * (i as ImagePrecision - j as ImagePrecision) / 28.
        })
    }

    #[test]
    fn test_lenet5_parameter_count() {
        // 156 + 2,416 + 48,120 + 10,164 + 850
        assert_eq!(LeNet5::new().num_parameters(), 61_706);
    }

    #[test]
    fn test_custom_mlp_parameter_count() {
        // 50,240 + 4,160 + 4,160 + 2,080 + 528 + 272 + 170 + 110
        assert_eq!(CustomMLP::new().num_parameters(), 61_720);
    }

    #[test]
    fn test_regularized_lenet5_parameter_count() {
        assert_eq!(RegularizedLeNet5::new().num_parameters(), 61_706);
    }

    #[test]
    fn test_lenet5_forward_on_zero_batch() {
        let mut model = LeNet5::new();
        model.set_training(false);

        let input = Array4::zeros((4, 1, 28, 28));
        let output = model.forward_pass(&input).unwrap();

        assert_eq!(output.dim(), (4, 10));
        assert!(output.iter().all(|p| p.is_finite()));
        assert_rows_sum_to_one(&output);
    }

    #[test]
    fn test_lenet5_evaluation_is_deterministic() {
        let mut model = LeNet5::new();
        model.set_training(false);

        let input = test_batch();
        let first = model.forward_pass(&input).unwrap();
        let second = model.forward_pass(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_mlp_forward() {
        let mut model = CustomMLP::new();
        model.set_training(false);

        let output = model.forward_pass(&test_batch()).unwrap();
        assert_eq!(output.dim(), (2, 10));
        assert_rows_sum_to_one(&output);
    }

    #[test]
    fn test_custom_mlp_forward_flat() {
        let mut model = CustomMLP::new();
        model.set_training(false);

        let flat = Array2::ones((3, 784));
        let output = model.forward_flat(&flat).unwrap();
        assert_eq!(output.dim(), (3, 10));
        assert_rows_sum_to_one(&output);

        // Forward pass on the 4d batch is just flatten + forward_flat
        let images = Array4::ones((3, 1, 28, 28));
        assert_eq!(model.forward_pass(&images).unwrap(), output);
    }

    #[test]
    fn test_custom_mlp_evaluation_is_deterministic() {
        let mut model = CustomMLP::new();
        model.set_training(false);

        let input = test_batch();
        let first = model.forward_pass(&input).unwrap();
        let second = model.forward_pass(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_mlp_training_mode_is_stochastic() {
        let model = CustomMLP::new();
        assert!(model.is_training());

        let input = test_batch();
        let first = model.forward_pass(&input).unwrap();
        let second = model.forward_pass(&input).unwrap();

        // Different dropout masks, different outputs. Shape and
        // normalization still hold, the softmax is applied last.
        assert_ne!(first, second);
        assert_eq!(first.dim(), (2, 10));
        assert_rows_sum_to_one(&first);
        assert_rows_sum_to_one(&second);
    }

    #[test]
    fn test_regularized_lenet5_forward() {
        let mut model = RegularizedLeNet5::new();
        model.set_training(false);

        let output = model.forward_pass(&test_batch()).unwrap();
        assert_eq!(output.dim(), (2, 10));
        assert!(output.iter().all(|p| p.is_finite()));
        assert_rows_sum_to_one(&output);
    }

    #[test]
    fn test_regularized_lenet5_training_mode_stays_normalized() {
        let model = RegularizedLeNet5::new();

        let output = model.forward_pass(&test_batch()).unwrap();
        assert_eq!(output.dim(), (2, 10));
        assert_rows_sum_to_one(&output);
    }

    #[test]
    fn test_empty_batch() {
        let mut model = LeNet5::new();
        model.set_training(false);

        let output = model.forward_pass(&Array4::zeros((0, 1, 28, 28))).unwrap();
        assert_eq!(output.dim(), (0, 10));
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let input = Array4::zeros((2, 3, 32, 32));

        assert!(matches!(
            LeNet5::new().forward_pass(&input),
            Err(ModelError::InputShapeMismatch { .. })
        ));
        assert!(matches!(
            CustomMLP::new().forward_pass(&input),
            Err(ModelError::InputShapeMismatch { .. })
        ));
        assert!(matches!(
            RegularizedLeNet5::new().forward_pass(&input),
            Err(ModelError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_forward_flat_rejects_wrong_width() {
        let model = CustomMLP::new();
        let flat = Array2::zeros((2, 100));
        assert!(matches!(
            model.forward_flat(&flat),
            Err(ModelError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_mode_switching() {
        let mut model = RegularizedLeNet5::new();
        assert!(model.is_training());

        model.set_training(false);
        assert!(!model.is_training());

        model.set_training(true);
        assert!(model.is_training());
    }
}
