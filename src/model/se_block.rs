//! Squeeze-and-Excitation channel attention
//!
//! squeeze: global average per channel `[B, C, H, W] -> [B, C]`
//! excite:  dense C -> C/ratio (ReLU) -> dense C/ratio -> C (sigmoid), no biases
//! scale:   feature map multiplied channel-wise by the gate

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

/// Configuration for the squeeze-and-excitation block
#[derive(Config, Debug)]
pub struct SqueezeExcitationConfig {
    /// Channels of the incoming feature map
    pub channels: usize,

    /// Bottleneck reduction ratio
    #[config(default = "16")]
    pub ratio: usize,
}

impl SqueezeExcitationConfig {
    /// Width of the bottleneck layer
    pub fn reduced_channels(&self) -> usize {
        (self.channels / self.ratio.max(1)).max(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SqueezeExcitation<B> {
        let reduced = self.reduced_channels();
        SqueezeExcitation {
            squeeze: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: LinearConfig::new(self.channels, reduced)
                .with_bias(false)
                .init(device),
            expand: LinearConfig::new(reduced, self.channels)
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pub squeeze: AdaptiveAvgPool2d,
    pub reduce: Linear<B>,
    pub expand: Linear<B>,
    pub relu: Relu,
}

impl<B: Backend> SqueezeExcitation<B> {
    /// Per-channel gate in `(0, 1)`, shape `[B, C]`
    pub fn gate(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, _, _] = x.dims();
        let s = self.squeeze.forward(x).reshape([batch_size, channels]);
        let s = self.relu.forward(self.reduce.forward(s));
        sigmoid(self.expand.forward(s))
    }

    /// Rescale the feature map channel-wise by the learned gate
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, channels, _, _] = x.dims();
        let gate = self.gate(x.clone()).reshape([batch_size, channels, 1, 1]);
        x.mul(gate)
    }
}
