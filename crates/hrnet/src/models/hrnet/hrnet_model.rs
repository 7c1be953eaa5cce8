//! # `HighResolutionNet` Backbone
//!
//! ```text
//! image [B, 3, H, W]
//!   -> stem                       [B, 64, H/4, W/4]
//!   -> layer1 (bottlenecks)       [B, 256, H/4, W/4]   == low_level
//!   -> transition1 -> stage2      [c, 2c]
//!   -> transition2 -> stage3      [c, 2c, 4c]
//!   -> transition3 -> stage4      [c]                  == features
//! ```
//!
//! Branch `i` runs at ``H/(4*2^i), W/(4*2^i)`` with ``c*2^i`` channels;
//! the last module of the last stage fuses everything into branch 0.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::hrnet::bottleneck::{
    BOTTLENECK_DEFAULT_EXPANSION_FACTOR, Bottleneck, BottleneckConfig, BottleneckMeta,
};
use crate::models::hrnet::stage_module::{
    STAGE_MODULE_DEFAULT_BRANCH_BLOCKS, StageModule, StageModuleConfig, StageModuleMeta,
};
use crate::models::hrnet::stem::{STEM_STRIDE, Stem, StemConfig, StemMeta};
use crate::models::hrnet::transition::{Transition, TransitionConfig};
use crate::models::hrnet::util::{branch_channels_list, branch_stride};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`HighResolutionNet`] Meta trait.
pub trait HighResolutionNetMeta {
    /// The number of input (image) channels.
    fn in_channels(&self) -> usize;

    /// Base channel width; the width of branch 0 and of the fused output.
    fn base_channels(&self) -> usize;

    /// The width of the low-level (stage 1) feature map.
    fn low_level_channels(&self) -> usize;

    /// The number of parallel branches in the last stage.
    fn num_branches(&self) -> usize;

    /// The width of the fused output.
    fn out_channels(&self) -> usize {
        self.base_channels()
    }

    /// The largest spatial reduction of any branch.
    ///
    /// Input resolutions must be multiples of this.
    fn max_stride(&self) -> usize {
        STEM_STRIDE * branch_stride(self.num_branches() - 1)
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// Both outputs run at ``input / 4``.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of [`Self::max_stride`].
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let [grid_height, grid_width] = unpack_shape_contract!(
            [
                "height" = "grid_height" * "max_stride",
                "width" = "grid_width" * "max_stride"
            ],
            &input_resolution,
            &["grid_height", "grid_width"],
            &[("max_stride", self.max_stride())]
        );
        let scale = self.max_stride() / STEM_STRIDE;
        [grid_height * scale, grid_width * scale]
    }
}

/// [`HighResolutionNet`] Config.
///
/// Implements [`HighResolutionNetMeta`].
#[derive(Config, Debug)]
pub struct HighResolutionNetConfig {
    /// Base channel width ``c``; branch `i` has ``c * 2^i`` channels.
    pub base_channels: usize,

    /// The number of input (image) channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Stem width; also the bottleneck width of stage 1.
    #[config(default = 64)]
    pub stem_channels: usize,

    /// The number of [`Bottleneck`] blocks in stage 1.
    #[config(default = 4)]
    pub layer1_blocks: usize,

    /// The number of [`StageModule`]s in each multi-branch stage.
    ///
    /// Stage `k` (counting from 0) has ``k + 2`` branches.
    #[config(default = "vec![1, 4, 3]")]
    pub stage_modules: Vec<usize>,

    /// The number of basic blocks per branch in each [`StageModule`].
    #[config(default = "STAGE_MODULE_DEFAULT_BRANCH_BLOCKS")]
    pub branch_blocks: usize,

    /// Fuse the final stage module into branch 0 only.
    ///
    /// When disabled, the final module keeps every branch;
    /// see [`HighResolutionNet::forward_branches`].
    #[config(default = true)]
    pub fuse_final: bool,

    /// The norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl HighResolutionNetMeta for HighResolutionNetConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn base_channels(&self) -> usize {
        self.base_channels
    }

    fn low_level_channels(&self) -> usize {
        self.stem_channels * BOTTLENECK_DEFAULT_EXPANSION_FACTOR
    }

    fn num_branches(&self) -> usize {
        self.stage_modules.len() + 1
    }
}

impl HighResolutionNetConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        let widths = [
            ("base_channels", self.base_channels),
            ("in_channels", self.in_channels),
            ("stem_channels", self.stem_channels),
            ("layer1_blocks", self.layer1_blocks),
            ("branch_blocks", self.branch_blocks),
        ];
        for (name, value) in widths {
            if value == 0 {
                return Err(format!("{name} must be >= 1"));
            }
        }
        if self.stage_modules.is_empty() {
            return Err("stage_modules is empty".to_string());
        }
        if let Some(stage) = self.stage_modules.iter().position(|&m| m == 0) {
            return Err(format!(
                "stage_modules[{stage}] must be >= 1: {:?}",
                self.stage_modules
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// The [`TransitionConfig`]s, one per multi-branch stage.
    pub fn transition_configs(&self) -> Vec<TransitionConfig> {
        (0..self.stage_modules.len())
            .map(|stage| {
                let in_channels = if stage == 0 {
                    vec![self.low_level_channels()]
                } else {
                    branch_channels_list(self.base_channels, stage + 1)
                };
                TransitionConfig::new(
                    in_channels,
                    branch_channels_list(self.base_channels, stage + 2),
                )
                .with_normalization(self.normalization.clone())
                .with_activation(self.activation.clone())
            })
            .collect()
    }

    /// The [`StageModuleConfig`]s, grouped by stage.
    ///
    /// Every module keeps all of its branches,
    /// except the final module, which only outputs branch 0 when `fuse_final` is set.
    pub fn stage_configs(&self) -> Vec<Vec<StageModuleConfig>> {
        let num_stages = self.stage_modules.len();
        self.stage_modules
            .iter()
            .enumerate()
            .map(|(stage, &num_modules)| {
                let num_branches = stage + 2;
                (0..num_modules)
                    .map(|idx| {
                        let is_final = stage + 1 == num_stages && idx + 1 == num_modules;
                        let output_branches = if is_final && self.fuse_final {
                            1
                        } else {
                            num_branches
                        };
                        StageModuleConfig::new(num_branches, output_branches, self.base_channels)
                            .with_branch_blocks(self.branch_blocks)
                            .with_normalization(self.normalization.clone())
                            .with_activation(self.activation.clone())
                    })
                    .collect()
            })
            .collect()
    }

    /// Initialize a [`HighResolutionNet`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> HighResolutionNet<B> {
        self.expect_valid();

        tracing::debug!(
            base_channels = self.base_channels,
            stem_channels = self.stem_channels,
            stage_modules = ?self.stage_modules,
            branch_blocks = self.branch_blocks,
            "initializing HighResolutionNet"
        );

        let stem = StemConfig::new()
            .with_in_channels(self.in_channels)
            .with_out_channels(self.stem_channels)
            .with_normalization(self.normalization.clone())
            .with_activation(self.activation.clone())
            .init(device);

        let layer1 = (0..self.layer1_blocks)
            .map(|idx| {
                let in_planes = if idx == 0 {
                    self.stem_channels
                } else {
                    self.low_level_channels()
                };
                BottleneckConfig::new(in_planes, self.stem_channels)
                    .with_normalization(self.normalization.clone())
                    .with_activation(self.activation.clone())
                    .init(device)
            })
            .collect();

        let transitions = self
            .transition_configs()
            .into_iter()
            .map(|cfg| cfg.init(device))
            .collect();

        let stages = self
            .stage_configs()
            .into_iter()
            .map(|modules| Stage {
                modules: modules.into_iter().map(|cfg| cfg.init(device)).collect(),
            })
            .collect();

        HighResolutionNet {
            stem,
            layer1,
            transitions,
            stages,
        }
    }
}

/// A multi-branch stage; a sequence of [`StageModule`]s.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    /// The stage modules.
    pub modules: Vec<StageModule<B>>,
}

impl<B: Backend> Stage<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        inputs: Vec<Tensor<B, 4>>,
    ) -> Vec<Tensor<B, 4>> {
        self.modules
            .iter()
            .fold(inputs, |xs, module| module.forward(xs))
    }
}

/// HRNet backbone.
///
/// Implements [`HighResolutionNetMeta`].
#[derive(Module, Debug)]
pub struct HighResolutionNet<B: Backend> {
    /// Input stem; ``/4``.
    pub stem: Stem<B>,

    /// Stage 1 bottlenecks.
    pub layer1: Vec<Bottleneck<B>>,

    /// Branch transitions; one before each multi-branch stage.
    pub transitions: Vec<Transition<B>>,

    /// Multi-branch stages.
    pub stages: Vec<Stage<B>>,
}

impl<B: Backend> HighResolutionNetMeta for HighResolutionNet<B> {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn base_channels(&self) -> usize {
        self.stages[0].modules[0].base_channels()
    }

    fn low_level_channels(&self) -> usize {
        match self.layer1.last() {
            Some(block) => block.out_planes(),
            None => self.stem.out_channels(),
        }
    }

    fn num_branches(&self) -> usize {
        self.stages.len() + 1
    }
}

impl<B: Backend> HighResolutionNet<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``;
    ///   `height` and `width` must be multiples of [`HighResolutionNetMeta::max_stride`].
    ///
    /// # Returns
    ///
    /// A ``(low_level, features)`` pair:
    /// - `low_level`: ``[batch, low_level_channels, height/4, width/4]``.
    /// - `features`: ``[batch, base_channels, height/4, width/4]``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let (low_level, mut branches) = self.forward_branches(input);
        (low_level, branches.swap_remove(0))
    }

    /// Forward Pass, returning every output of the last stage.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// The low-level feature map, and the branch outputs of the final stage module;
    /// output `i` is ``[batch, base_channels*2^i, height/(4*2^i), width/(4*2^i)]``.
    pub fn forward_branches(
        &self,
        input: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Vec<Tensor<B, 4>>) {
        let [batch, grid_height, grid_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "height" = "grid_height" * "max_stride",
                "width" = "grid_width" * "max_stride"
            ],
            &input,
            &["batch", "grid_height", "grid_width"],
            &[
                ("in_channels", self.in_channels()),
                ("max_stride", self.max_stride())
            ]
        );
        let scale = self.max_stride() / STEM_STRIDE;
        let [out_height, out_width] = [grid_height * scale, grid_width * scale];

        let x = self.stem.forward(input);
        let x = self.layer1.iter().fold(x, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "low_level_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("low_level_channels", self.low_level_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let low_level = x.clone();

        let branches = self
            .transitions
            .iter()
            .zip(self.stages.iter())
            .fold(vec![x], |xs, (transition, stage)| {
                stage.forward(transition.forward(xs))
            });

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &branches[0],
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        (low_level, branches)
    }
}
