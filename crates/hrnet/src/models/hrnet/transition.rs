//! # Branch Transitions
//!
//! A [`Transition`] maps the outputs of one stage onto the inputs of the next,
//! adding lower resolution branches:
//!
//! * an existing branch with unchanged width passes through untouched;
//! * an existing branch whose width changes gets a ``3x3 / stride 1`` conv/norm/act;
//! * a new branch is derived from the *last* (lowest resolution) input only,
//!   through one ``3x3 / stride 2`` conv/norm/act per added resolution step.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta, CNA2dPolicy};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Transition`] Meta trait.
pub trait TransitionMeta {
    /// The channel widths of the input branches.
    fn in_channels(&self) -> Vec<usize>;

    /// The channel widths of the output branches.
    fn out_channels(&self) -> Vec<usize>;

    /// The number of input branches.
    fn num_inputs(&self) -> usize {
        self.in_channels().len()
    }

    /// The number of output branches.
    fn num_outputs(&self) -> usize {
        self.out_channels().len()
    }
}

/// [`Transition`] Config.
#[derive(Config, Debug)]
pub struct TransitionConfig {
    /// The channel widths of the input branches.
    pub in_channels: Vec<usize>,

    /// The channel widths of the output branches.
    pub out_channels: Vec<usize>,

    /// The norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl TransitionMeta for TransitionConfig {
    fn in_channels(&self) -> Vec<usize> {
        self.in_channels.clone()
    }

    fn out_channels(&self) -> Vec<usize> {
        self.out_channels.clone()
    }
}

impl TransitionConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels.is_empty() {
            return Err("in_channels is empty".to_string());
        }
        if self.out_channels.len() < self.in_channels.len() {
            return Err(format!(
                "out_channels.len() ({}) < in_channels.len() ({})",
                self.out_channels.len(),
                self.in_channels.len(),
            ));
        }
        if let Some(idx) = self
            .in_channels
            .iter()
            .chain(self.out_channels.iter())
            .position(|&c| c == 0)
        {
            return Err(format!("zero channel width at position {idx}\n{self:#?}"));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Build the layer configs for each output path.
    ///
    /// An empty path is an identity.
    pub fn path_configs(&self) -> Vec<Vec<CNA2dConfig>> {
        let cna_policy = CNA2dPolicy::new()
            .with_normalization(self.normalization.clone())
            .with_activation(self.activation.clone());

        let num_inputs = self.in_channels.len();
        let last_in = self.in_channels[num_inputs - 1];

        self.out_channels
            .iter()
            .enumerate()
            .map(|(idx, &out)| {
                if idx < num_inputs {
                    let inc = self.in_channels[idx];
                    if inc == out {
                        vec![]
                    } else {
                        vec![cna_policy.square(inc, out, 3, 1)]
                    }
                } else {
                    let steps = idx + 1 - num_inputs;
                    (0..steps)
                        .map(|step| {
                            let target = if step + 1 == steps { out } else { last_in };
                            cna_policy.square(last_in, target, 3, 2)
                        })
                        .collect()
                }
            })
            .collect()
    }

    /// Initialize a [`Transition`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Transition<B> {
        self.expect_valid();

        let num_inputs = self.in_channels.len();
        Transition {
            num_inputs,
            paths: self
                .path_configs()
                .into_iter()
                .enumerate()
                .map(|(idx, layers)| TransitionPath {
                    in_channels: self.in_channels[idx.min(num_inputs - 1)],
                    layers: layers.into_iter().map(|cfg| cfg.init(device)).collect(),
                })
                .collect(),
        }
    }
}

/// A single output path of a [`Transition`].
///
/// An empty path is an identity.
#[derive(Module, Debug)]
pub struct TransitionPath<B: Backend> {
    /// The channel width of the source branch.
    pub in_channels: usize,

    /// Sequenced conv/norm/act layers.
    pub layers: Vec<CNA2d<B>>,
}

impl<B: Backend> TransitionPath<B> {
    /// The channel width of the produced branch.
    pub fn out_channels(&self) -> usize {
        match self.layers.last() {
            Some(layer) => layer.out_channels(),
            None => self.in_channels,
        }
    }

    /// Is this path an identity?
    pub fn is_identity(&self) -> bool {
        self.layers.is_empty()
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.layers
            .iter()
            .fold(input, |x, layer| layer.forward(x))
    }
}

/// Stage-to-stage branch transition.
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    /// The number of input branches.
    pub num_inputs: usize,

    /// One path per output branch.
    pub paths: Vec<TransitionPath<B>>,
}

impl<B: Backend> TransitionMeta for Transition<B> {
    fn in_channels(&self) -> Vec<usize> {
        self.paths[..self.num_inputs]
            .iter()
            .map(|path| path.in_channels)
            .collect()
    }

    fn out_channels(&self) -> Vec<usize> {
        self.paths.iter().map(|path| path.out_channels()).collect()
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }
}

impl<B: Backend> Transition<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `inputs`: one ``[batch, in_channels[i], height_i, width_i]`` tensor per input branch.
    ///
    /// # Returns
    ///
    /// One ``[batch, out_channels[i], height_i, width_i]`` tensor per output branch;
    /// new branches halve the resolution of the last input once per step.
    ///
    /// # Panics
    ///
    /// If the number of inputs does not match the number of input branches.
    pub fn forward(
        &self,
        inputs: Vec<Tensor<B, 4>>,
    ) -> Vec<Tensor<B, 4>> {
        assert_eq!(
            inputs.len(),
            self.num_inputs(),
            "Transition expected {} inputs, got {}",
            self.num_inputs(),
            inputs.len(),
        );

        let last = inputs.len() - 1;
        self.paths
            .iter()
            .enumerate()
            .map(|(idx, path)| path.forward(inputs[idx.min(last)].clone()))
            .collect()
    }
}
