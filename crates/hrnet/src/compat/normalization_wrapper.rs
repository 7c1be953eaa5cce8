//! # Channel Normalization
//!
//! HRNet normalizes every conv output over its channel dim. Which norm is a
//! model-wide choice, so configs carry a [`NormalizationConfig`] whose width
//! is a placeholder; each layer calls [`NormalizationConfig::with_num_features`]
//! with its own conv width before init.
//!
//! Supported: [`BatchNorm`] (the default), [`GroupNorm`], [`InstanceNorm`].

use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Config.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// Batch statistics; ``momentum = 0.1``, ``epsilon = 1e-5``.
    Batch(BatchNormConfig),

    /// Per-sample statistics over channel groups.
    Group(GroupNormConfig),

    /// Per-sample, per-channel statistics.
    Instance(InstanceNormConfig),
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        BatchNormConfig::new(0).into()
    }
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// The configured channel width.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(config) => config.num_features,
            Self::Group(config) => config.num_channels,
            Self::Instance(config) => config.num_channels,
        }
    }

    /// The same norm, resized to `num_features` channels.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            Self::Batch(mut config) => {
                config.num_features = num_features;
                config.into()
            }
            Self::Group(mut config) => {
                config.num_channels = num_features;
                config.into()
            }
            Self::Instance(mut config) => {
                config.num_channels = num_features;
                config.into()
            }
        }
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            Self::Batch(config) => Normalization::Batch(config.init(device)),
            Self::Group(config) => Normalization::Group(config.init(device)),
            Self::Instance(config) => Normalization::Instance(config.init(device)),
        }
    }
}

/// A channel norm layer, selected by [`NormalizationConfig`].
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// ``BatchNorm<2>``; image feature maps.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),

    /// [`InstanceNorm`] layer.
    Instance(InstanceNorm<B>),
}

impl<B: Backend> Normalization<B> {
    /// The normalized channel width.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(norm) => norm.gamma.dims()[0],
            Self::Group(norm) => norm.num_channels,
            Self::Instance(norm) => norm.num_channels,
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Batch(norm) => norm.forward(input),
            Self::Group(norm) => norm.forward(input),
            Self::Instance(norm) => norm.forward(input),
        }
    }
}
