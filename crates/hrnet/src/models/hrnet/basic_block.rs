//! # Basic Block
//!
//! [`BasicBlock`] is the residual unit repeated inside every HRNet branch.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dMeta, CNA2dPolicy};
use crate::models::hrnet::downsample::{Downsample, DownsampleConfig};
use crate::models::hrnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// The basic block has an expansion factor of 1.
    fn planes(&self) -> usize;

    /// The stride of the first convolution.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: \
    ///   ``[in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
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

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the first conv.
    #[config(default = 1)]
    pub stride: usize,

    /// The norm config; feature sizes are matched per layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let cna_policy = CNA2dPolicy::new()
            .with_normalization(self.normalization.clone())
            .with_activation(self.activation.clone());

        let downsample = DownsampleConfig::for_shortcut(
            self.in_planes,
            self.planes,
            self.stride,
            &self.normalization,
        );

        BasicBlock {
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna_policy
                .square(self.in_planes, self.planes, 3, self.stride)
                .init(device),
            cna2: cna_policy
                .square(self.planes, self.planes, 3, 1)
                .init(device),
        }
    }
}

/// Basic residual block.
///
/// ```text
/// act(norm2(conv2(act(norm1(conv1(x))))) + shortcut(x))
/// ```
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Optional shortcut projection.
    pub downsample: Option<Downsample<B>>,

    /// First Conv/Norm/Act Block.
    pub cna1: CNA2d<B>,

    /// Second Conv/Norm/Act Block; the shortcut merges before its activation.
    pub cna2: CNA2d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna1.stride()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, planes, out_height, out_width]`` tensor.
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
        let x = self.cna2.forward_residual(x, identity);

        assert_shape_contract_periodically!(
            ["batch", "planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("planes", self.planes()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.planes(), 32);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);
        assert!(matches!(config.activation, ActivationConfig::Relu));

        let config = config
            .with_stride(2)
            .with_activation(ActivationConfig::Sigmoid);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
        assert!(matches!(config.activation, ActivationConfig::Sigmoid));
    }

    #[test]
    #[should_panic(expected = "7 !~ height_in=(height_out*stride)")]
    fn test_output_resolution_panic() {
        let config = BasicBlockConfig::new(16, 32).with_stride(2);
        config.output_resolution([7, 7]);
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);
        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.planes(), 4);
        assert_eq!(block.stride(), 1);
        assert!(block.downsample.is_none());

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 8).init(&device);
        assert!(block.downsample.is_some());
    }

    #[test]
    fn test_basic_block_forward_identity_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);

        let input = Tensor::ones([2, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "planes", "height", "width"],
            &output,
            &[("batch", 2), ("planes", 4), ("height", 8), ("width", 8)],
        );

        // Post-activation ReLU output.
        let min = output.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_basic_block_forward_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 6).with_stride(2).init(&device);
        let [out_height, out_width] = block.output_resolution([8, 4]);

        let output = block.forward(Tensor::ones([1, 2, 8, 4], &device));

        assert_shape_contract!(
            ["batch", "planes", "height", "width"],
            &output,
            &[
                ("batch", 1),
                ("planes", 6),
                ("height", out_height),
                ("width", out_width)
            ],
        );
    }

    fn expected_forward<B: Backend>(
        block: &BasicBlock<B>,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let shortcut = match &block.downsample {
            Some(downsample) => downsample.conv_norm.norm.forward(
                downsample.conv_norm.conv.forward(input.clone()),
            ),
            None => input.clone(),
        };
        let x = block.cna1.forward(input);
        let x = block.cna2.norm.forward(block.cna2.conv.forward(x));
        block.cna2.act.forward(x + shortcut)
    }

    #[test]
    fn test_basic_block_forward_values() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);
        let input = Tensor::random([2, 4, 6, 6], Distribution::Normal(0.0, 1.0), &device);
        block
            .forward(input.clone())
            .to_data()
            .assert_eq(&expected_forward(&block, input).to_data(), true);

        let block: BasicBlock<B> = BasicBlockConfig::new(3, 6).with_stride(2).init(&device);
        let input = Tensor::random([2, 3, 6, 4], Distribution::Normal(0.0, 1.0), &device);
        block
            .forward(input.clone())
            .to_data()
            .assert_eq(&expected_forward(&block, input).to_data(), true);
    }
}
