//! # Bottleneck Block
//!
//! [`Bottleneck`] is the ``1x1 -> 3x3 -> 1x1`` residual unit of the
//! first (single branch) HRNet stage.
//!
//! [`BottleneckMeta`] defines a common meta API for [`Bottleneck`]
//! and [`BottleneckConfig`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dMeta, CNA2dPolicy};
use crate::models::hrnet::downsample::{Downsample, DownsampleConfig};
use crate::models::hrnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Default expansion factor for [`Bottleneck`].
pub const BOTTLENECK_DEFAULT_EXPANSION_FACTOR: usize = 4;

/// [`Bottleneck`] Meta trait.
pub trait BottleneckMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The internal (pinched) feature planes.
    fn planes(&self) -> usize;

    /// Control factor for `out_planes()`.
    fn expansion_factor(&self) -> usize;

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * expansion_factor``
    fn out_planes(&self) -> usize {
        self.planes() * self.expansion_factor()
    }

    /// The stride of the 3x3 convolution.
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

/// [`Bottleneck`] Config.
///
/// Implements [`BottleneckMeta`].
#[derive(Config, Debug)]
pub struct BottleneckConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The internal channel width.
    pub planes: usize,

    /// Control factor for `out_planes()`.
    #[config(default = "BOTTLENECK_DEFAULT_EXPANSION_FACTOR")]
    pub expansion_factor: usize,

    /// The stride of the 3x3 conv.
    #[config(default = 1)]
    pub stride: usize,

    /// The norm config; feature sizes are matched per layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BottleneckMeta for BottleneckConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BottleneckConfig {
    /// Initialize a [`Bottleneck`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Bottleneck<B> {
        let in_planes = self.in_planes();
        let planes = self.planes();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let cna_policy = CNA2dPolicy::new()
            .with_normalization(self.normalization.clone())
            .with_activation(self.activation.clone());

        let downsample =
            DownsampleConfig::for_shortcut(in_planes, out_planes, stride, &self.normalization);

        Bottleneck {
            expansion_factor: self.expansion_factor,
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna_policy
                .square(in_planes, planes, 1, 1)
                .init(device),
            cna2: cna_policy
                .square(planes, planes, 3, stride)
                .init(device),
            cna3: cna_policy
                .square(planes, out_planes, 1, 1)
                .init(device),
        }
    }
}

/// Bottleneck residual block.
///
/// Implements [`BottleneckMeta`].
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    /// Expansion factor.
    pub expansion_factor: usize,

    /// Optional shortcut projection.
    pub downsample: Option<Downsample<B>>,

    /// ``1x1`` reduce layer.
    pub cna1: CNA2d<B>,
    /// ``3x3`` spatial layer.
    pub cna2: CNA2d<B>,
    /// ``1x1`` expand layer; the shortcut merges before its activation.
    pub cna3: CNA2d<B>,
}

impl<B: Backend> BottleneckMeta for Bottleneck<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna1.out_channels()
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn out_planes(&self) -> usize {
        self.cna3.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna2.stride()
    }
}

impl<B: Backend> Bottleneck<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);
        let x = self.cna3.forward_residual(x, identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        x
    }
}
