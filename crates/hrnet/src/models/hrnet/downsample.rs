//! # Residual Shortcut Projection
//!
//! [`Downsample`] is the ``1x1 conv + norm`` projection used on the
//! identity path of [`super::basic_block::BasicBlock`] and
//! [`super::bottleneck::Bottleneck`] when the block changes
//! channel width or resolution.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::hrnet::util::stride_div_output_resolution;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Downsample`] Meta trait.
pub trait DownsampleMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the downsample layer.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`Downsample`] configuration.
#[derive(Config, Debug)]
pub struct DownsampleConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    pub stride: usize,

    /// The [`NormalizationConfig`].
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,
}

impl DownsampleMeta for DownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl DownsampleConfig {
    /// Build the config of an optional shortcut projection.
    ///
    /// Returns `None` when the identity shortcut already matches,
    /// i.e. ``stride == 1 && in_channels == out_channels``.
    pub fn for_shortcut(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        norm: &NormalizationConfig,
    ) -> Option<Self> {
        if stride != 1 || in_channels != out_channels {
            Some(
                Self::new(in_channels, out_channels)
                    .with_stride(stride)
                    .with_norm(norm.clone()),
            )
        } else {
            None
        }
    }

    /// Initialize a [`Downsample`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Downsample<B> {
        Downsample {
            conv_norm: ConvNorm2dConfig::square(
                self.in_channels,
                self.out_channels,
                1,
                self.stride,
                &self.norm,
            )
            .init(device),
        }
    }
}

/// ``1x1 conv + norm`` shortcut projection.
///
/// Maps ``[batch, in_channels, in_height, in_width]`` to
/// ``[batch, out_channels, in_height / stride, in_width / stride]`` tensors.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: ConvNorm2d<B>,
}

impl<B: Backend> DownsampleMeta for Downsample<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm.stride()
    }
}

impl<B: Backend> Downsample<B> {
    /// Forward pass.
    ///
    /// The embedded [`ConvNorm2d`] enforces the shape contract.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.conv_norm.forward(input)
    }
}
