//! # HRNet Stage Module
//!
//! A [`StageModule`] runs `input_branches` parallel resolution branches,
//! each a sequence of [`BasicBlock`]s at width ``base_channels * 2^i``;
//! then fuses every branch into each of `output_branches` outputs:
//!
//! ```text
//! y_i = act( sum_j fuse[i][j](branch_j(x_j)) )
//! ```
//!
//! See [`crate::models::hrnet::fuse`] for the per-pair fuse paths.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::hrnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::hrnet::fuse::{FusePath, FusePathConfig};
use crate::models::hrnet::util::{branch_channels, branch_channels_list, branch_stride};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Default number of [`BasicBlock`]s per branch.
pub const STAGE_MODULE_DEFAULT_BRANCH_BLOCKS: usize = 4;

/// [`StageModule`] Meta trait.
pub trait StageModuleMeta {
    /// The number of input branches.
    fn input_branches(&self) -> usize;

    /// The number of output branches.
    fn output_branches(&self) -> usize;

    /// Base channel width; the width of branch 0.
    fn base_channels(&self) -> usize;

    /// The channel widths of the input branches.
    fn in_channels(&self) -> Vec<usize> {
        branch_channels_list(self.base_channels(), self.input_branches())
    }

    /// The channel widths of the output branches.
    fn out_channels(&self) -> Vec<usize> {
        branch_channels_list(self.base_channels(), self.output_branches())
    }
}

/// [`StageModule`] Config.
///
/// Implements [`StageModuleMeta`].
#[derive(Config, Debug)]
pub struct StageModuleConfig {
    /// The number of input branches.
    pub input_branches: usize,

    /// The number of output branches.
    pub output_branches: usize,

    /// Base channel width; branch `i` has ``base_channels * 2^i`` channels.
    pub base_channels: usize,

    /// The number of [`BasicBlock`]s per branch.
    #[config(default = "STAGE_MODULE_DEFAULT_BRANCH_BLOCKS")]
    pub branch_blocks: usize,

    /// The norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl StageModuleMeta for StageModuleConfig {
    fn input_branches(&self) -> usize {
        self.input_branches
    }

    fn output_branches(&self) -> usize {
        self.output_branches
    }

    fn base_channels(&self) -> usize {
        self.base_channels
    }
}

impl StageModuleConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.input_branches == 0 {
            return Err("input_branches must be >= 1".to_string());
        }
        if self.output_branches == 0 {
            return Err("output_branches must be >= 1".to_string());
        }
        if self.base_channels == 0 {
            return Err("base_channels must be >= 1".to_string());
        }
        if self.branch_blocks == 0 {
            return Err("branch_blocks must be >= 1".to_string());
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`StageModule`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> StageModule<B> {
        self.expect_valid();

        let branches = (0..self.input_branches)
            .map(|branch| {
                let width = branch_channels(self.base_channels, branch);
                StageBranch {
                    blocks: (0..self.branch_blocks)
                        .map(|_| {
                            BasicBlockConfig::new(width, width)
                                .with_normalization(self.normalization.clone())
                                .with_activation(self.activation.clone())
                                .init(device)
                        })
                        .collect(),
                }
            })
            .collect();

        let fuse_layers = (0..self.output_branches)
            .map(|to_branch| FuseRow {
                paths: (0..self.input_branches)
                    .map(|from_branch| {
                        FusePathConfig::new(self.base_channels, from_branch, to_branch)
                            .with_normalization(self.normalization.clone())
                            .with_activation(self.activation.clone())
                            .init(device)
                    })
                    .collect(),
            })
            .collect();

        StageModule {
            base_channels: self.base_channels,
            branches,
            fuse_layers,
            act: self.activation.init(device),
        }
    }
}

/// A single resolution branch; a sequence of [`BasicBlock`]s.
#[derive(Module, Debug)]
pub struct StageBranch<B: Backend> {
    /// The residual blocks.
    pub blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> StageBranch<B> {
    /// The channel width of the branch.
    pub fn channels(&self) -> usize {
        self.blocks[0].in_planes()
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }
}

/// The fuse paths feeding a single output branch; one per input branch.
#[derive(Module, Debug)]
pub struct FuseRow<B: Backend> {
    /// Paths, indexed by source branch.
    pub paths: Vec<FusePath<B>>,
}

/// Multi-branch, multi-resolution stage module.
///
/// Implements [`StageModuleMeta`].
#[derive(Module, Debug)]
pub struct StageModule<B: Backend> {
    /// Base channel width.
    pub base_channels: usize,

    /// Per-branch residual sequences.
    pub branches: Vec<StageBranch<B>>,

    /// Fuse paths; indexed ``[output][input]``.
    pub fuse_layers: Vec<FuseRow<B>>,

    /// Activation applied to each fused sum.
    pub act: Activation<B>,
}

impl<B: Backend> StageModuleMeta for StageModule<B> {
    fn input_branches(&self) -> usize {
        self.branches.len()
    }

    fn output_branches(&self) -> usize {
        self.fuse_layers.len()
    }

    fn base_channels(&self) -> usize {
        self.base_channels
    }
}

impl<B: Backend> StageModule<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `inputs`: `input_branches` tensors;
    ///   input `i` is ``[batch, base_channels*2^i, height/2^i, width/2^i]``.
    ///
    /// # Returns
    ///
    /// `output_branches` tensors;
    /// output `i` is ``[batch, base_channels*2^i, height/2^i, width/2^i]``.
    ///
    /// # Panics
    ///
    /// If the number of inputs or any input shape does not match.
    pub fn forward(
        &self,
        inputs: Vec<Tensor<B, 4>>,
    ) -> Vec<Tensor<B, 4>> {
        assert_eq!(
            inputs.len(),
            self.input_branches(),
            "StageModule expected {} inputs, got {}",
            self.input_branches(),
            inputs.len(),
        );

        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &inputs[0],
            &["batch", "height", "width"],
            &[("channels", self.base_channels)]
        );
        for (idx, input) in inputs.iter().enumerate().skip(1) {
            let stride = branch_stride(idx);
            assert_shape_contract_periodically!(
                ["batch", "channels", "branch_height", "branch_width"],
                input,
                &[
                    ("batch", batch),
                    ("channels", branch_channels(self.base_channels, idx)),
                    ("branch_height", height / stride),
                    ("branch_width", width / stride),
                ]
            );
        }

        let xs: Vec<Tensor<B, 4>> = self
            .branches
            .iter()
            .zip(inputs)
            .map(|(branch, x)| branch.forward(x))
            .collect();

        self.fuse_layers
            .iter()
            .map(|row| {
                let fused = row
                    .paths
                    .iter()
                    .zip(xs.iter())
                    .map(|(path, x)| path.forward(x.clone()))
                    .reduce(|acc, x| acc + x)
                    .expect("a stage module has at least one input branch");
                self.act.forward(fused)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_stage_module_config() {
        let config = StageModuleConfig::new(3, 3, 18);
        assert_eq!(config.branch_blocks, 4);
        assert_eq!(config.in_channels(), vec![18, 36, 72]);
        assert_eq!(config.out_channels(), vec![18, 36, 72]);

        let config = StageModuleConfig::new(4, 1, 32);
        assert_eq!(config.out_channels(), vec![32]);

        assert!(StageModuleConfig::new(0, 1, 8).try_validate().is_err());
        assert!(StageModuleConfig::new(2, 0, 8).try_validate().is_err());
        assert!(StageModuleConfig::new(2, 2, 0).try_validate().is_err());
        assert!(
            StageModuleConfig::new(2, 2, 8)
                .with_branch_blocks(0)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    fn test_stage_module_topology() {
        let device = Default::default();

        let module: StageModule<B> = StageModuleConfig::new(3, 2, 4)
            .with_branch_blocks(2)
            .init(&device);

        assert_eq!(module.input_branches(), 3);
        assert_eq!(module.output_branches(), 2);
        assert_eq!(module.in_channels(), vec![4, 8, 16]);
        assert_eq!(module.out_channels(), vec![4, 8]);

        for (idx, branch) in module.branches.iter().enumerate() {
            assert_eq!(branch.blocks.len(), 2);
            assert_eq!(branch.channels(), 4 << idx);
        }

        assert_eq!(module.fuse_layers.len(), 2);
        for (to_branch, row) in module.fuse_layers.iter().enumerate() {
            assert_eq!(row.paths.len(), 3);
            for (from_branch, path) in row.paths.iter().enumerate() {
                match path {
                    FusePath::Identity(_) => assert_eq!(from_branch, to_branch),
                    FusePath::Up(_) => assert!(from_branch > to_branch),
                    FusePath::Down(_) => assert!(from_branch < to_branch),
                }
            }
        }
    }

    #[test]
    fn test_stage_module_forward() {
        let device = Default::default();

        let module: StageModule<B> = StageModuleConfig::new(3, 3, 4)
            .with_branch_blocks(1)
            .init(&device);

        let inputs = vec![
            Tensor::ones([2, 4, 16, 8], &device),
            Tensor::ones([2, 8, 8, 4], &device),
            Tensor::ones([2, 16, 4, 2], &device),
        ];

        let outputs = module.forward(inputs);
        assert_eq!(outputs.len(), 3);
        for (idx, output) in outputs.iter().enumerate() {
            assert_shape_contract!(
                ["batch", "channels", "height", "width"],
                output,
                &[
                    ("batch", 2),
                    ("channels", 4 << idx),
                    ("height", 16 >> idx),
                    ("width", 8 >> idx)
                ],
            );

            // Fused sums are activated.
            assert!(output.clone().min().into_scalar() >= 0.0);
        }
    }

    #[test]
    fn test_stage_module_forward_single_output() {
        let device = Default::default();

        let module: StageModule<B> = StageModuleConfig::new(2, 1, 4)
            .with_branch_blocks(1)
            .init(&device);

        let outputs = module.forward(vec![
            Tensor::zeros([1, 4, 8, 8], &device),
            Tensor::zeros([1, 8, 4, 4], &device),
        ]);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].dims(), [1, 4, 8, 8]);
    }

    #[test]
    #[should_panic(expected = "StageModule expected 2 inputs, got 1")]
    fn test_stage_module_forward_arity() {
        let device = Default::default();

        let module: StageModule<B> = StageModuleConfig::new(2, 2, 4)
            .with_branch_blocks(1)
            .init(&device);

        module.forward(vec![Tensor::zeros([1, 4, 8, 8], &device)]);
    }

    #[test]
    fn test_stage_module_forward_values() {
        let device = Default::default();

        let module: StageModule<B> = StageModuleConfig::new(3, 3, 2)
            .with_branch_blocks(1)
            .init(&device);

        let inputs: Vec<Tensor<B, 4>> = (0..3)
            .map(|idx| {
                Tensor::random(
                    [1, 2 << idx, 8 >> idx, 4 >> idx],
                    Distribution::Normal(0.0, 1.0),
                    &device,
                )
            })
            .collect();

        let branch_outputs: Vec<Tensor<B, 4>> = module
            .branches
            .iter()
            .zip(inputs.iter())
            .map(|(branch, x)| branch.forward(x.clone()))
            .collect();

        let outputs = module.forward(inputs);
        assert_eq!(outputs.len(), 3);

        for (to_branch, output) in outputs.iter().enumerate() {
            let row = &module.fuse_layers[to_branch];
            let mut sum = row.paths[0].forward(branch_outputs[0].clone());
            for from_branch in 1..3 {
                sum = sum + row.paths[from_branch].forward(branch_outputs[from_branch].clone());
            }
            let expected = module.act.forward(sum);

            output.to_data().assert_eq(&expected.to_data(), true);
        }
    }
}
