//! # HRNet Input Stem
//!
//! Two ``3x3 / stride 2`` conv/norm/act layers;
//! reducing the input resolution by 4.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dMeta, CNA2dPolicy};
use crate::models::hrnet::util::stride_div_output_resolution;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Spatial reduction of the [`Stem`].
pub const STEM_STRIDE: usize = 4;

/// [`Stem`] Meta trait.
pub trait StemMeta {
    /// The number of input (image) channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of [`STEM_STRIDE`].
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, STEM_STRIDE)
    }
}

/// [`Stem`] Config.
#[derive(Config, Debug)]
pub struct StemConfig {
    /// The number of input (image) channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// The number of output channels.
    #[config(default = 64)]
    pub out_channels: usize,

    /// The norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl Default for StemConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StemMeta for StemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl StemConfig {
    /// Initialize a [`Stem`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Stem<B> {
        let cna_policy = CNA2dPolicy::new()
            .with_normalization(self.normalization)
            .with_activation(self.activation);

        Stem {
            cna1: cna_policy
                .square(self.in_channels, self.out_channels, 3, 2)
                .init(device),
            cna2: cna_policy
                .square(self.out_channels, self.out_channels, 3, 2)
                .init(device),
        }
    }
}

/// HRNet input stem.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    /// First reduction layer.
    pub cna1: CNA2d<B>,

    /// Second reduction layer.
    pub cna2: CNA2d<B>,
}

impl<B: Backend> StemMeta for Stem<B> {
    fn in_channels(&self) -> usize {
        self.cna1.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.cna2.out_channels()
    }
}

impl<B: Backend> Stem<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height=out_height*4, width=out_width*4]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.cna1.forward(input);
        self.cna2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_stem() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = StemConfig::new().with_out_channels(8);
        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.out_channels(), 8);
        assert_eq!(config.output_resolution([32, 16]), [8, 4]);

        let stem: Stem<B> = config.init(&device);
        assert_eq!(stem.in_channels(), 3);
        assert_eq!(stem.out_channels(), 8);

        let output = stem.forward(Tensor::zeros([2, 3, 32, 16], &device));
        assert_eq!(output.dims(), [2, 8, 8, 4]);
    }
}
