//! InceptionV3 feature extractor
//!
//! The standard InceptionV3 network without its classification top, laid out
//! exactly like the ImageNet reference so converted weights map one-to-one:
//!
//! ```text
//! stem:    conv 3x3/2 -> conv 3x3 -> conv 3x3 -> maxpool 3x3/2
//!          -> conv 1x1 -> conv 3x3 -> maxpool 3x3/2
//! mixed0-2 InceptionA (pool features 32, 64, 64)      -> 288 channels
//! mixed3   InceptionB (grid reduction)                -> 768 channels
//! mixed4-7 InceptionC (7x7 channels 128, 160, 160, 192)
//! mixed8   InceptionD (grid reduction)                -> 1280 channels
//! mixed9-10 InceptionE                                -> 2048 channels
//! ```
//!
//! A 224x224 input yields a `[batch, 2048, 5, 5]` feature map.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Channels of the final feature map
pub const FEATURE_CHANNELS: usize = 2048;

/// Batch-norm epsilon of the reference network
const BN_EPSILON: f64 = 1e-3;

/// Conv (no bias) -> BatchNorm -> ReLU, the building block of every branch
#[derive(Module, Debug)]
pub struct BasicConv2d<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> BasicConv2d<B> {
    /// Stride 1, `same` padding
    pub fn new(in_channels: usize, out_channels: usize, kernel: [usize; 2], device: &B::Device) -> Self {
        Self::build(in_channels, out_channels, kernel, 1, PaddingConfig2d::Same, device)
    }

    /// Stride 1, no padding
    pub fn valid(in_channels: usize, out_channels: usize, kernel: [usize; 2], device: &B::Device) -> Self {
        Self::build(in_channels, out_channels, kernel, 1, PaddingConfig2d::Valid, device)
    }

    /// Stride 2, no padding (grid reduction)
    pub fn strided(in_channels: usize, out_channels: usize, kernel: [usize; 2], device: &B::Device) -> Self {
        Self::build(in_channels, out_channels, kernel, 2, PaddingConfig2d::Valid, device)
    }

    fn build(
        in_channels: usize,
        out_channels: usize,
        kernel: [usize; 2],
        stride: usize,
        padding: PaddingConfig2d,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], kernel)
            .with_stride([stride, stride])
            .with_padding(padding)
            .with_bias(false)
            .init(device);

        let bn = BatchNormConfig::new(out_channels)
            .with_epsilon(BN_EPSILON)
            .init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

fn max_pool_3x3_s2() -> MaxPool2d {
    MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init()
}

/// 3x3 average pool, stride 1, `same` padding that excludes padded cells
fn avg_pool_3x3_same() -> AvgPool2d {
    AvgPool2dConfig::new([3, 3])
        .with_strides([1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_count_include_pad(false)
        .init()
}

/// 35x35 block (mixed0-2)
#[derive(Module, Debug)]
pub struct InceptionA<B: Backend> {
    branch1x1: BasicConv2d<B>,
    branch5x5_1: BasicConv2d<B>,
    branch5x5_2: BasicConv2d<B>,
    branch3x3dbl_1: BasicConv2d<B>,
    branch3x3dbl_2: BasicConv2d<B>,
    branch3x3dbl_3: BasicConv2d<B>,
    pool: AvgPool2d,
    branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionA<B> {
    pub fn new(in_channels: usize, pool_features: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: BasicConv2d::new(in_channels, 64, [1, 1], device),
            branch5x5_1: BasicConv2d::new(in_channels, 48, [1, 1], device),
            branch5x5_2: BasicConv2d::new(48, 64, [5, 5], device),
            branch3x3dbl_1: BasicConv2d::new(in_channels, 64, [1, 1], device),
            branch3x3dbl_2: BasicConv2d::new(64, 96, [3, 3], device),
            branch3x3dbl_3: BasicConv2d::new(96, 96, [3, 3], device),
            pool: avg_pool_3x3_same(),
            branch_pool: BasicConv2d::new(in_channels, pool_features, [1, 1], device),
        }
    }

    /// Output channels for a given pool feature count
    pub fn out_channels(pool_features: usize) -> usize {
        64 + 64 + 96 + pool_features
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b5 = self.branch5x5_1.forward(x.clone());
        let b5 = self.branch5x5_2.forward(b5);

        let b3 = self.branch3x3dbl_1.forward(x.clone());
        let b3 = self.branch3x3dbl_2.forward(b3);
        let b3 = self.branch3x3dbl_3.forward(b3);

        let bp = self.branch_pool.forward(self.pool.forward(x));

        Tensor::cat(vec![b1, b5, b3, bp], 1)
    }
}

/// 35x35 -> 17x17 grid reduction (mixed3)
#[derive(Module, Debug)]
pub struct InceptionB<B: Backend> {
    branch3x3: BasicConv2d<B>,
    branch3x3dbl_1: BasicConv2d<B>,
    branch3x3dbl_2: BasicConv2d<B>,
    branch3x3dbl_3: BasicConv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionB<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch3x3: BasicConv2d::strided(in_channels, 384, [3, 3], device),
            branch3x3dbl_1: BasicConv2d::new(in_channels, 64, [1, 1], device),
            branch3x3dbl_2: BasicConv2d::new(64, 96, [3, 3], device),
            branch3x3dbl_3: BasicConv2d::strided(96, 96, [3, 3], device),
            pool: max_pool_3x3_s2(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3.forward(x.clone());

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = self.branch3x3dbl_3.forward(bd);

        let bp = self.pool.forward(x);

        Tensor::cat(vec![b3, bd, bp], 1)
    }
}

/// 17x17 block with factorized 7x7 convolutions (mixed4-7)
#[derive(Module, Debug)]
pub struct InceptionC<B: Backend> {
    branch1x1: BasicConv2d<B>,
    branch7x7_1: BasicConv2d<B>,
    branch7x7_2: BasicConv2d<B>,
    branch7x7_3: BasicConv2d<B>,
    branch7x7dbl_1: BasicConv2d<B>,
    branch7x7dbl_2: BasicConv2d<B>,
    branch7x7dbl_3: BasicConv2d<B>,
    branch7x7dbl_4: BasicConv2d<B>,
    branch7x7dbl_5: BasicConv2d<B>,
    pool: AvgPool2d,
    branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionC<B> {
    pub fn new(in_channels: usize, channels_7x7: usize, device: &B::Device) -> Self {
        let c7 = channels_7x7;
        Self {
            branch1x1: BasicConv2d::new(in_channels, 192, [1, 1], device),
            branch7x7_1: BasicConv2d::new(in_channels, c7, [1, 1], device),
            branch7x7_2: BasicConv2d::new(c7, c7, [1, 7], device),
            branch7x7_3: BasicConv2d::new(c7, 192, [7, 1], device),
            branch7x7dbl_1: BasicConv2d::new(in_channels, c7, [1, 1], device),
            branch7x7dbl_2: BasicConv2d::new(c7, c7, [7, 1], device),
            branch7x7dbl_3: BasicConv2d::new(c7, c7, [1, 7], device),
            branch7x7dbl_4: BasicConv2d::new(c7, c7, [7, 1], device),
            branch7x7dbl_5: BasicConv2d::new(c7, 192, [1, 7], device),
            pool: avg_pool_3x3_same(),
            branch_pool: BasicConv2d::new(in_channels, 192, [1, 1], device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b7 = self.branch7x7_1.forward(x.clone());
        let b7 = self.branch7x7_2.forward(b7);
        let b7 = self.branch7x7_3.forward(b7);

        let bd = self.branch7x7dbl_1.forward(x.clone());
        let bd = self.branch7x7dbl_2.forward(bd);
        let bd = self.branch7x7dbl_3.forward(bd);
        let bd = self.branch7x7dbl_4.forward(bd);
        let bd = self.branch7x7dbl_5.forward(bd);

        let bp = self.branch_pool.forward(self.pool.forward(x));

        Tensor::cat(vec![b1, b7, bd, bp], 1)
    }
}

/// 17x17 -> 8x8 grid reduction (mixed8)
#[derive(Module, Debug)]
pub struct InceptionD<B: Backend> {
    branch3x3_1: BasicConv2d<B>,
    branch3x3_2: BasicConv2d<B>,
    branch7x7x3_1: BasicConv2d<B>,
    branch7x7x3_2: BasicConv2d<B>,
    branch7x7x3_3: BasicConv2d<B>,
    branch7x7x3_4: BasicConv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionD<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch3x3_1: BasicConv2d::new(in_channels, 192, [1, 1], device),
            branch3x3_2: BasicConv2d::strided(192, 320, [3, 3], device),
            branch7x7x3_1: BasicConv2d::new(in_channels, 192, [1, 1], device),
            branch7x7x3_2: BasicConv2d::new(192, 192, [1, 7], device),
            branch7x7x3_3: BasicConv2d::new(192, 192, [7, 1], device),
            branch7x7x3_4: BasicConv2d::strided(192, 192, [3, 3], device),
            pool: max_pool_3x3_s2(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = self.branch3x3_2.forward(b3);

        let b7 = self.branch7x7x3_1.forward(x.clone());
        let b7 = self.branch7x7x3_2.forward(b7);
        let b7 = self.branch7x7x3_3.forward(b7);
        let b7 = self.branch7x7x3_4.forward(b7);

        let bp = self.pool.forward(x);

        Tensor::cat(vec![b3, b7, bp], 1)
    }
}

/// 8x8 block with expanded filter banks (mixed9-10)
#[derive(Module, Debug)]
pub struct InceptionE<B: Backend> {
    branch1x1: BasicConv2d<B>,
    branch3x3_1: BasicConv2d<B>,
    branch3x3_2a: BasicConv2d<B>,
    branch3x3_2b: BasicConv2d<B>,
    branch3x3dbl_1: BasicConv2d<B>,
    branch3x3dbl_2: BasicConv2d<B>,
    branch3x3dbl_3a: BasicConv2d<B>,
    branch3x3dbl_3b: BasicConv2d<B>,
    pool: AvgPool2d,
    branch_pool: BasicConv2d<B>,
}

impl<B: Backend> InceptionE<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: BasicConv2d::new(in_channels, 320, [1, 1], device),
            branch3x3_1: BasicConv2d::new(in_channels, 384, [1, 1], device),
            branch3x3_2a: BasicConv2d::new(384, 384, [1, 3], device),
            branch3x3_2b: BasicConv2d::new(384, 384, [3, 1], device),
            branch3x3dbl_1: BasicConv2d::new(in_channels, 448, [1, 1], device),
            branch3x3dbl_2: BasicConv2d::new(448, 384, [3, 3], device),
            branch3x3dbl_3a: BasicConv2d::new(384, 384, [1, 3], device),
            branch3x3dbl_3b: BasicConv2d::new(384, 384, [3, 1], device),
            pool: avg_pool_3x3_same(),
            branch_pool: BasicConv2d::new(in_channels, 192, [1, 1], device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = Tensor::cat(
            vec![
                self.branch3x3_2a.forward(b3.clone()),
                self.branch3x3_2b.forward(b3),
            ],
            1,
        );

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = Tensor::cat(
            vec![
                self.branch3x3dbl_3a.forward(bd.clone()),
                self.branch3x3dbl_3b.forward(bd),
            ],
            1,
        );

        let bp = self.branch_pool.forward(self.pool.forward(x));

        Tensor::cat(vec![b1, b3, bd, bp], 1)
    }
}

/// InceptionV3 backbone (no top)
#[derive(Module, Debug)]
pub struct InceptionV3<B: Backend> {
    // Stem
    pub conv1a: BasicConv2d<B>,
    pub conv2a: BasicConv2d<B>,
    pub conv2b: BasicConv2d<B>,
    pub pool1: MaxPool2d,
    pub conv3b: BasicConv2d<B>,
    pub conv4a: BasicConv2d<B>,
    pub pool2: MaxPool2d,

    // Inception blocks
    pub mixed0: InceptionA<B>,
    pub mixed1: InceptionA<B>,
    pub mixed2: InceptionA<B>,
    pub mixed3: InceptionB<B>,
    pub mixed4: InceptionC<B>,
    pub mixed5: InceptionC<B>,
    pub mixed6: InceptionC<B>,
    pub mixed7: InceptionC<B>,
    pub mixed8: InceptionD<B>,
    pub mixed9: InceptionE<B>,
    pub mixed10: InceptionE<B>,
}

impl<B: Backend> InceptionV3<B> {
    /// Create a randomly initialized backbone
    pub fn new(device: &B::Device) -> Self {
        let a0 = InceptionA::<B>::out_channels(32); // 256
        let a1 = InceptionA::<B>::out_channels(64); // 288

        Self {
            conv1a: BasicConv2d::strided(3, 32, [3, 3], device),
            conv2a: BasicConv2d::valid(32, 32, [3, 3], device),
            conv2b: BasicConv2d::new(32, 64, [3, 3], device),
            pool1: max_pool_3x3_s2(),
            conv3b: BasicConv2d::valid(64, 80, [1, 1], device),
            conv4a: BasicConv2d::valid(80, 192, [3, 3], device),
            pool2: max_pool_3x3_s2(),

            mixed0: InceptionA::new(192, 32, device),
            mixed1: InceptionA::new(a0, 64, device),
            mixed2: InceptionA::new(a1, 64, device),
            mixed3: InceptionB::new(a1, device), // 288 -> 768
            mixed4: InceptionC::new(768, 128, device),
            mixed5: InceptionC::new(768, 160, device),
            mixed6: InceptionC::new(768, 160, device),
            mixed7: InceptionC::new(768, 192, device),
            mixed8: InceptionD::new(768, device), // 768 -> 1280
            mixed9: InceptionE::new(1280, device),
            mixed10: InceptionE::new(FEATURE_CHANNELS, device),
        }
    }

    /// Extract the feature map
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width], height and width >= 75
    ///
    /// # Returns
    /// * Feature map of shape [batch_size, 2048, h', w']
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1a.forward(x);
        let x = self.conv2a.forward(x);
        let x = self.conv2b.forward(x);
        let x = self.pool1.forward(x);
        let x = self.conv3b.forward(x);
        let x = self.conv4a.forward(x);
        let x = self.pool2.forward(x);

        let x = self.mixed0.forward(x);
        let x = self.mixed1.forward(x);
        let x = self.mixed2.forward(x);
        let x = self.mixed3.forward(x);
        let x = self.mixed4.forward(x);
        let x = self.mixed5.forward(x);
        let x = self.mixed6.forward(x);
        let x = self.mixed7.forward(x);
        let x = self.mixed8.forward(x);
        let x = self.mixed9.forward(x);
        self.mixed10.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_inception_a_channels() {
        let device = Default::default();
        let block = InceptionA::<TestBackend>::new(192, 32, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 192, 9, 9], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, InceptionA::<TestBackend>::out_channels(32), 9, 9]);
    }

    #[test]
    fn test_reduction_blocks_halve_grid() {
        let device = Default::default();

        let b = InceptionB::<TestBackend>::new(288, &device);
        let out = b.forward(Tensor::zeros([1, 288, 7, 7], &device));
        assert_eq!(out.dims(), [1, 768, 3, 3]);

        let d = InceptionD::<TestBackend>::new(768, &device);
        let out = d.forward(Tensor::zeros([1, 768, 7, 7], &device));
        assert_eq!(out.dims(), [1, 1280, 3, 3]);
    }

    #[test]
    fn test_backbone_output_shape_small_input() {
        let device = Default::default();
        let backbone = InceptionV3::<TestBackend>::new(&device);

        // Smallest input the architecture accepts keeps the test fast
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 75, 75], &device);
        let output = backbone.forward(input);

        assert_eq!(output.dims(), [1, FEATURE_CHANNELS, 1, 1]);
    }
}
