//! # Cross-Resolution Fuse Paths
//!
//! A [`FusePath`] carries branch `j` of a stage module onto the
//! resolution and width of output branch `i`:
//!
//! * ``i == j`` - [`FusePath::Identity`].
//! * ``i < j`` - [`FusePath::Up`]; ``1x1 conv + norm``, then bilinear
//!   upsampling by ``2^(j-i)``; see [`upsample_bilinear`].
//! * ``i > j`` - [`FusePath::Down`]; ``i-j-1`` ``3x3 / stride 2`` conv/norm/act
//!   layers at the source width, then a ``3x3 / stride 2`` conv/norm
//!   to the target width.
//!
//! None of the paths apply a trailing activation; the stage module
//! activates the sum.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dMeta, CNA2dPolicy};
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::hrnet::util::{branch_channels, branch_stride};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`FusePath`] Config.
#[derive(Config, Debug)]
pub struct FusePathConfig {
    /// Base channel width; branch `k` has ``base_channels * 2^k`` channels.
    pub base_channels: usize,

    /// The source branch index.
    pub from_branch: usize,

    /// The target branch index.
    pub to_branch: usize,

    /// The norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config; used between repeated downsample steps.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl FusePathConfig {
    /// The channel width of the source branch.
    pub fn in_channels(&self) -> usize {
        branch_channels(self.base_channels, self.from_branch)
    }

    /// The channel width of the target branch.
    pub fn out_channels(&self) -> usize {
        branch_channels(self.base_channels, self.to_branch)
    }

    /// Initialize a [`FusePath`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FusePath<B> {
        let in_channels = self.in_channels();
        let out_channels = self.out_channels();

        match self.from_branch.cmp(&self.to_branch) {
            std::cmp::Ordering::Equal => FusePath::Identity(IdentityFuse),
            std::cmp::Ordering::Greater => {
                FusePath::Up(UpsampleFuse {
                    scale_factor: branch_stride(self.from_branch - self.to_branch),
                    projection: ConvNorm2dConfig::square(
                        in_channels,
                        out_channels,
                        1,
                        1,
                        &self.normalization,
                    )
                    .init(device),
                })
            }
            std::cmp::Ordering::Less => {
                let cna_policy = CNA2dPolicy::new()
                    .with_normalization(self.normalization.clone())
                    .with_activation(self.activation.clone());

                let steps = self.to_branch - self.from_branch;

                FusePath::Down(DownsampleFuse {
                    head: (0..steps - 1)
                        .map(|_| {
                            cna_policy
                                .square(in_channels, in_channels, 3, 2)
                                .init(device)
                        })
                        .collect(),
                    tail: ConvNorm2dConfig::square(
                        in_channels,
                        out_channels,
                        3,
                        2,
                        &self.normalization,
                    )
                    .init(device),
                })
            }
        }
    }
}

/// Bilinear upsampling by an integer factor, sampling at pixel centres.
///
/// Output pixel `o` reads source coordinate ``(o + 0.5) / scale_factor - 0.5``,
/// clamped to the edge pixels (the ``align_corners=False`` convention).
///
/// # Arguments
///
/// - `input`: ``[batch, channels, height, width]``.
/// - `scale_factor`: the integer upsampling factor; ``>= 1``.
///
/// # Returns
///
/// A ``[batch, channels, height*scale_factor, width*scale_factor]`` tensor.
pub fn upsample_bilinear<B: Backend>(
    input: Tensor<B, 4>,
    scale_factor: usize,
) -> Tensor<B, 4> {
    assert!(scale_factor >= 1, "scale_factor must be >= 1");
    if scale_factor == 1 {
        return input;
    }
    let x = upsample_linear_dim(input, 2, scale_factor);
    upsample_linear_dim(x, 3, scale_factor)
}

/// Centre-sampled linear upsampling along one spatial dim.
///
/// Output ``q*scale + p`` blends two neighbouring source pixels with a weight
/// that depends only on the phase `p`; so each phase is a weighted sum of two
/// shifted slices of the edge-replicated input, and the phases are interleaved.
fn upsample_linear_dim<B: Backend>(
    input: Tensor<B, 4>,
    dim: usize,
    scale: usize,
) -> Tensor<B, 4> {
    let size = input.dims()[dim];

    // padded[k + 1] == input[k]; edges replicated.
    let padded = Tensor::cat(
        vec![
            input.clone().narrow(dim, 0, 1),
            input.clone(),
            input.narrow(dim, size - 1, 1),
        ],
        dim,
    );

    let phases: Vec<Tensor<B, 4>> = (0..scale)
        .map(|phase| {
            let offset = (phase as f64 + 0.5) / scale as f64 - 0.5;
            let start = if offset < 0.0 { 0 } else { 1 };
            let frac = offset - offset.floor();

            let lo = padded.clone().narrow(dim, start, size);
            let hi = padded.clone().narrow(dim, start + 1, size);
            lo.mul_scalar(1.0 - frac) + hi.mul_scalar(frac)
        })
        .collect();

    let x: Tensor<B, 5> = Tensor::stack(phases, dim + 1);
    x.flatten(dim, dim + 1)
}

/// Pass-through fuse path.
#[derive(Module, Clone, Debug, Default)]
pub struct IdentityFuse;

/// Lower-to-higher resolution fuse path.
#[derive(Module, Debug)]
pub struct UpsampleFuse<B: Backend> {
    /// Spatial upsampling factor; ``2^(j-i)``.
    pub scale_factor: usize,

    /// ``1x1`` width projection.
    pub projection: ConvNorm2d<B>,
}

impl<B: Backend> UpsampleFuse<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, height*scale_factor, width*scale_factor]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.projection.in_channels())]
        );

        let x = self.projection.forward(input);
        let x = upsample_bilinear(x, self.scale_factor);

        assert_shape_contract_periodically!(
            [
                "batch",
                "out_channels",
                "out_height" = "height" * "scale",
                "out_width" = "width" * "scale"
            ],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.projection.out_channels()),
                ("height", height),
                ("width", width),
                ("scale", self.scale_factor),
            ]
        );

        x
    }
}

/// Higher-to-lower resolution fuse path.
#[derive(Module, Debug)]
pub struct DownsampleFuse<B: Backend> {
    /// Width-preserving ``3x3 / stride 2`` conv/norm/act steps.
    pub head: Vec<CNA2d<B>>,

    /// Final ``3x3 / stride 2`` conv/norm to the target width.
    pub tail: ConvNorm2d<B>,
}

impl<B: Backend> DownsampleFuse<B> {
    /// The total spatial reduction; ``2^(i-j)``.
    pub fn stride(&self) -> usize {
        self.head
            .iter()
            .fold(self.tail.stride(), |acc, layer| acc * layer.stride())
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height=out_height*stride, width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self
            .head
            .iter()
            .fold(input, |x, layer| layer.forward(x));
        self.tail.forward(x)
    }
}

/// A single ``branch j -> output i`` fuse path.
#[derive(Module, Debug)]
pub enum FusePath<B: Backend> {
    /// Same-branch path.
    Identity(IdentityFuse),

    /// Upsampling path.
    Up(UpsampleFuse<B>),

    /// Downsampling path.
    Down(DownsampleFuse<B>),
}

impl<B: Backend> FusePath<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            FusePath::Identity(_) => input,
            FusePath::Up(path) => path.forward(input),
            FusePath::Down(path) => path.forward(input),
        }
    }
}
