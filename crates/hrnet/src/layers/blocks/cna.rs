//! # `CNA2d` - square conv, norm, then activation.
//!
//! Every activated conv in the backbone is a [`CNA2d`]: the stem, the
//! residual blocks, the branch transitions and the downsampling fuse steps.
//!
//! Residual blocks merge their shortcut between the norm and the activation,
//! through [`CNA2d::forward_residual`].
//!
//! [`CNA2dPolicy`] carries the norm/act choice of a whole model, and stamps
//! out per-layer [`CNA2dConfig`]s with the norm width matched to the conv.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::blocks::square_conv2d_config;
use bimm_contracts::{
    assert_shape_contract, assert_shape_contract_periodically, unpack_shape_contract,
};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// Model-wide norm/act choice for [`CNA2d`] layers.
#[derive(Config, Debug)]
pub struct CNA2dPolicy {
    /// Norm config; the width is overwritten per layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// Activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl CNA2dPolicy {
    /// A [`CNA2dConfig`] around a bias-free ``kernel x kernel`` conv.
    ///
    /// See [`square_conv2d_config`] for the padding rule.
    pub fn square(
        &self,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> CNA2dConfig {
        CNA2dConfig::new(square_conv2d_config(
            in_channels,
            out_channels,
            kernel_size,
            stride,
        ))
        .with_normalization(self.normalization.clone().with_num_features(out_channels))
        .with_activation(self.activation.clone())
    }
}

/// [`CNA2d`] Meta.
pub trait CNA2dMeta {
    /// Conv input width.
    fn in_channels(&self) -> usize;

    /// Conv output width; also the norm width.
    fn out_channels(&self) -> usize;

    /// Conv stride, applied to both spatial dims.
    fn stride(&self) -> usize;
}

/// [`CNA2d`] Config.
#[derive(Config, Debug)]
pub struct CNA2dConfig {
    /// The conv; expected to be square with a square stride.
    pub conv: Conv2dConfig,

    /// Norm config; resized to the conv output at init.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// Activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl CNA2dMeta for CNA2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }
}

impl CNA2dConfig {
    /// Initialize a [`CNA2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA2d<B> {
        let width = self.out_channels();
        CNA2d {
            conv: self.conv.init(device),
            norm: self.normalization.with_num_features(width).init(device),
            act: self.activation.init(device),
        }
    }
}

/// ``act(norm(conv(x)))``.
#[derive(Module, Debug)]
pub struct CNA2d<B: Backend> {
    /// Conv layer.
    pub conv: Conv2d<B>,

    /// Norm layer.
    pub norm: Normalization<B>,

    /// Activation layer.
    pub act: Activation<B>,
}

impl<B: Backend> CNA2dMeta for CNA2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.dims()[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.dims()[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }
}

impl<B: Backend> CNA2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, out_height*stride, out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv_norm(input);
        self.act.forward(x)
    }

    /// Forward Pass with a residual merged before the activation.
    ///
    /// ``act(norm(conv(input)) + residual)``
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, out_height*stride, out_width*stride]``.
    /// - `residual`: ``[batch, out_channels, out_height, out_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward_residual(
        &self,
        input: Tensor<B, 4>,
        residual: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv_norm(input);

        let [batch, out_height, out_width] = unpack_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &["batch", "out_height", "out_width"],
            &[("out_channels", self.out_channels())]
        );
        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &residual,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        self.act.forward(x + residual)
    }

    fn conv_norm(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        let x = self.norm.forward(self.conv.forward(input));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::GroupNormConfig;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_policy_square() {
        let policy = CNA2dPolicy::new()
            .with_normalization(GroupNormConfig::new(2, 0).into())
            .with_activation(ActivationConfig::Gelu);

        let config = policy.square(6, 10, 3, 2);
        assert_eq!(config.in_channels(), 6);
        assert_eq!(config.out_channels(), 10);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.conv.kernel_size, [3, 3]);
        assert_eq!(config.normalization.num_features(), 10);
        assert!(matches!(config.activation, ActivationConfig::Gelu));
    }

    #[test]
    fn test_forward_matches_layers() {
        let device = Default::default();

        let layer: CNA2d<B> = CNA2dPolicy::new().square(3, 5, 3, 2).init(&device);
        assert_eq!(layer.in_channels(), 3);
        assert_eq!(layer.out_channels(), 5);
        assert_eq!(layer.stride(), 2);
        assert_eq!(layer.norm.num_features(), 5);

        let input = Tensor::random([2, 3, 6, 4], Distribution::Default, &device);
        let output = layer.forward(input.clone());
        assert_eq!(output.dims(), [2, 5, 3, 2]);

        let expected = layer
            .act
            .forward(layer.norm.forward(layer.conv.forward(input)));
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_forward_residual_adds_before_activation() {
        let device = Default::default();

        let layer: CNA2d<B> = CNA2dPolicy::new().square(4, 4, 1, 1).init(&device);

        let input = Tensor::random([1, 4, 3, 3], Distribution::Default, &device);
        // Large negative residual; ReLU after the add zeroes everything.
        let residual = Tensor::full([1, 4, 3, 3], -1.0e3, &device);

        let output = layer.forward_residual(input.clone(), residual.clone());
        output
            .to_data()
            .assert_eq(&Tensor::<B, 4>::zeros([1, 4, 3, 3], &device).to_data(), true);

        let residual = Tensor::random([1, 4, 3, 3], Distribution::Default, &device);
        let output = layer.forward_residual(input.clone(), residual.clone());
        let expected = layer
            .act
            .forward(layer.norm.forward(layer.conv.forward(input)) + residual);
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    #[should_panic]
    fn test_forward_residual_shape_mismatch() {
        let device = Default::default();

        let layer: CNA2d<B> = CNA2dPolicy::new().square(2, 4, 3, 2).init(&device);
        layer.forward_residual(
            Tensor::zeros([1, 2, 8, 8], &device),
            Tensor::zeros([1, 4, 8, 8], &device),
        );
    }

    #[test]
    #[should_panic]
    fn test_rejects_indivisible_input() {
        let device = Default::default();

        let layer: CNA2d<B> = CNA2dPolicy::new().square(2, 4, 3, 2).init(&device);
        layer.forward(Tensor::zeros([1, 2, 7, 8], &device));
    }
}
