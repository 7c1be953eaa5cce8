//! # `ConvNorm2d` - square conv then norm, no activation.
//!
//! Used wherever the output is summed before it is activated:
//! residual shortcut projections and the cross-branch fuse paths.

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::blocks::square_conv2d_config;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`ConvNorm2d`] Meta.
pub trait ConvNorm2dMeta {
    /// Conv input width.
    fn in_channels(&self) -> usize;

    /// Conv output width.
    fn out_channels(&self) -> usize;

    /// Conv stride, applied to both spatial dims.
    fn stride(&self) -> usize;
}

/// [`ConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct ConvNorm2dConfig {
    /// The conv; expected to be square with a square stride.
    pub conv: Conv2dConfig,

    /// Norm config; resized to the conv output at init.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,
}

impl ConvNorm2dMeta for ConvNorm2dConfig {
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

impl ConvNorm2dConfig {
    /// A bias-free ``kernel x kernel`` conv followed by `normalization`.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        normalization: &NormalizationConfig,
    ) -> Self {
        Self::new(square_conv2d_config(
            in_channels,
            out_channels,
            kernel_size,
            stride,
        ))
        .with_normalization(normalization.clone())
    }

    /// Initialize a [`ConvNorm2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvNorm2d<B> {
        let width = self.out_channels();
        ConvNorm2d {
            conv: self.conv.init(device),
            norm: self.normalization.with_num_features(width).init(device),
        }
    }
}

/// ``norm(conv(x))``.
#[derive(Module, Debug)]
pub struct ConvNorm2d<B: Backend> {
    /// Conv layer.
    pub conv: Conv2d<B>,

    /// Norm layer.
    pub norm: Normalization<B>,
}

impl<B: Backend> ConvNorm2dMeta for ConvNorm2d<B> {
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

impl<B: Backend> ConvNorm2d<B> {
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
    use burn::nn::InstanceNormConfig;
    use burn::tensor::Distribution;

    #[test]
    fn test_square() {
        let norm: NormalizationConfig = InstanceNormConfig::new(0).into();
        let config = ConvNorm2dConfig::square(8, 16, 1, 2, &norm);

        assert_eq!(config.in_channels(), 8);
        assert_eq!(config.out_channels(), 16);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.conv.kernel_size, [1, 1]);
        assert!(!config.conv.bias);
        assert!(matches!(
            config.normalization,
            NormalizationConfig::Instance(_)
        ));
    }

    #[test]
    fn test_forward_has_no_activation() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvNorm2d<B> =
            ConvNorm2dConfig::square(3, 6, 3, 2, &NormalizationConfig::default()).init(&device);
        assert_eq!(layer.in_channels(), 3);
        assert_eq!(layer.out_channels(), 6);
        assert_eq!(layer.norm.num_features(), 6);

        let input = Tensor::random([2, 3, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        let output = layer.forward(input.clone());
        assert_eq!(output.dims(), [2, 6, 2, 4]);

        let expected = layer.norm.forward(layer.conv.forward(input));
        output.to_data().assert_eq(&expected.to_data(), true);

        // Zero-mean input through a bias-free conv keeps negative outputs.
        assert!(output.min().into_scalar() < 0.0);
    }
}
