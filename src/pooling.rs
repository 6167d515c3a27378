//! Spatial downsampling by averaging or taking the maximum over
//! non-overlapping windows. Both variants are exposed as a layer as well
//! as a free function.
use crate::models::FeatureMap;
use crate::ImagePrecision;
use ndarray::*;

/// Implementation base for both pooling variants. The window reduction
/// is the only thing that differs between them.
/// Output extents are floored, so trailing rows/columns that do not fill
/// a whole window are discarded.
fn pool_base<F>(image: &FeatureMap, kernel_size: usize, stride: usize, reduce: F) -> FeatureMap
where
    F: Fn(ArrayView2<ImagePrecision>) -> ImagePrecision,
{
    debug_assert!(stride > 0, "Stride of 0 passed");
    debug_assert!(kernel_size > 0, "Kernel size of 0 passed");

    let (channels, height, width) = image.dim();
    let out_height = (height - kernel_size) / stride + 1;
    let out_width = (width - kernel_size) / stride + 1;

    let mut pooled: FeatureMap = Array::zeros((channels, out_height, out_width));
    for c in 0..channels {
        for i in 0..out_height {
            for j in 0..out_width {
                let window = image.slice(s![
                    c,
                    i * stride..i * stride + kernel_size,
                    j * stride..j * stride + kernel_size
                ]);
                pooled[[c, i, j]] = reduce(window);
            }
        }
    }
    pooled
}

/// Average pooling over (kernel_size x kernel_size) windows.
/// We expect the data in Pytorch layout (channels, height, width).
pub fn avg_pool2d(image: &FeatureMap, kernel_size: usize, stride: usize) -> FeatureMap {
    let window_area = (kernel_size * kernel_size) as ImagePrecision;
    pool_base(image, kernel_size, stride, |w| w.sum() / window_area)
}

/// Max pooling over (kernel_size x kernel_size) windows.
/// We expect the data in Pytorch layout (channels, height, width).
pub fn max_pool2d(image: &FeatureMap, kernel_size: usize, stride: usize) -> FeatureMap {
    pool_base(image, kernel_size, stride, |w| {
        w.fold(ImagePrecision::NEG_INFINITY, |m, &v| m.max(v))
    })
}

/// Average pooling as a layer.
pub struct AveragePoolingLayer {
    kernel_size: usize,
    stride: usize,
}

impl AveragePoolingLayer {
    pub fn new(kernel_size: usize, stride: usize) -> Self {
        Self {
            kernel_size,
            stride,
        }
    }

    pub fn forward_pass(&self, x: &FeatureMap) -> FeatureMap {
        avg_pool2d(x, self.kernel_size, self.stride)
    }
}

/// Max pooling as a layer.
pub struct MaxPoolingLayer {
    kernel_size: usize,
    stride: usize,
}

impl MaxPoolingLayer {
    pub fn new(kernel_size: usize, stride: usize) -> Self {
        Self {
            kernel_size,
            stride,
        }
    }

    pub fn forward_pass(&self, x: &FeatureMap) -> FeatureMap {
        max_pool2d(x, self.kernel_size, self.stride)
    }
}
