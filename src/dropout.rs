//! Dropout regularization (Srivastava et al., 2014,
//! https://jmlr.org/papers/v15/srivastava14a.html) in the inverted
//! formulation: kept activations are scaled by 1/(1 - rate) during
//! training, so evaluation mode is a plain identity and needs no
//! rescaling.
use crate::models::FeatureMap;
use crate::ImagePrecision;
use ndarray::{Array, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// Element-wise dropout. Every activation is zeroed independently with
/// probability `rate` while the layer is in training mode.
///
/// The RNG sits behind a RefCell so that the forward pass can stay &self
/// like the other layers.
pub struct DropoutLayer {
    rate: f32,
    training: bool,
    rng: RefCell<StdRng>,
}

impl DropoutLayer {
    pub fn new(rate: f32) -> DropoutLayer {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0, 1)"
        );
        DropoutLayer {
            rate,
            training: true,
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Stochastically zeroes activations in training mode, identity in
    /// evaluation mode.
    pub fn forward_pass<D: Dimension>(
        &self,
        data: &Array<ImagePrecision, D>,
    ) -> Array<ImagePrecision, D> {
        if !self.training {
            return data.clone();
        }
        let scale = 1.0 / (1.0 - self.rate);
        let mut rng = self.rng.borrow_mut();
        data.mapv(|x| {
            if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                x * scale
            }
        })
    }
}

/// Spatial (2d) dropout. Instead of single activations, whole channels of
/// a feature map in (channels, height, width) layout are zeroed, which
/// regularizes better when neighbouring pixels are strongly correlated.
pub struct SpatialDropoutLayer {
    rate: f32,
    training: bool,
    rng: RefCell<StdRng>,
}

impl SpatialDropoutLayer {
    pub fn new(rate: f32) -> SpatialDropoutLayer {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0, 1)"
        );
        SpatialDropoutLayer {
            rate,
            training: true,
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Zeroes whole channels in training mode, identity in evaluation mode.
    pub fn forward_pass(&self, data: &FeatureMap) -> FeatureMap {
        if !self.training {
            return data.clone();
        }
        let scale = 1.0 / (1.0 - self.rate);
        let mut rng = self.rng.borrow_mut();
        let mut out = data.clone();
        for mut channel in out.outer_iter_mut() {
            if rng.gen::<f32>() < self.rate {
                channel.fill(0.0);
            } else {
                channel.mapv_inplace(|x| x * scale);
            }
        }
        out
    }
}
