//! # Activations
//!
//! The backbone applies one activation everywhere it activates: after each
//! conv/norm pair, after each residual merge, and after each fused sum.
//! [`ActivationConfig`] selects it; ReLU is the default.

use burn::nn::{Gelu, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig, Relu, Sigmoid, Tanh};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Activation`] Config.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum ActivationConfig {
    /// ``max(x, 0)``.
    Relu,

    /// ``max(x, 0) + slope * min(x, 0)``.
    LeakyRelu(LeakyReluConfig),

    /// Leaky ReLU with learned slopes.
    PRelu(PReluConfig),

    /// Gaussian error linear unit.
    Gelu,

    /// Logistic sigmoid.
    Sigmoid,

    /// Hyperbolic tangent.
    Tanh,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Relu
    }
}

impl From<LeakyReluConfig> for ActivationConfig {
    fn from(config: LeakyReluConfig) -> Self {
        Self::LeakyRelu(config)
    }
}

impl From<PReluConfig> for ActivationConfig {
    fn from(config: PReluConfig) -> Self {
        Self::PRelu(config)
    }
}

impl ActivationConfig {
    /// Initialize an [`Activation`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Activation<B> {
        match self {
            Self::Relu => Activation::Relu(Relu),
            Self::LeakyRelu(config) => Activation::LeakyRelu(config.init()),
            Self::PRelu(config) => Activation::PRelu(config.init(device)),
            Self::Gelu => Activation::Gelu(Gelu),
            Self::Sigmoid => Activation::Sigmoid(Sigmoid),
            Self::Tanh => Activation::Tanh(Tanh),
        }
    }
}

/// An activation layer, selected by [`ActivationConfig`].
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Activation<B: Backend> {
    /// [`Relu`] layer.
    Relu(Relu),

    /// [`LeakyRelu`] layer.
    LeakyRelu(LeakyRelu),

    /// [`PRelu`] layer; the only variant with parameters.
    PRelu(PRelu<B>),

    /// [`Gelu`] layer.
    Gelu(Gelu),

    /// [`Sigmoid`] layer.
    Sigmoid(Sigmoid),

    /// [`Tanh`] layer.
    Tanh(Tanh),
}

impl<B: Backend> Activation<B> {
    /// Forward Pass; elementwise, any rank.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Relu(act) => act.forward(input),
            Self::LeakyRelu(act) => act.forward(input),
            Self::PRelu(act) => act.forward(input),
            Self::Gelu(act) => act.forward(input),
            Self::Sigmoid(act) => act.forward(input),
            Self::Tanh(act) => act.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_relu_values() {
        let device = Default::default();

        let act: Activation<B> = ActivationConfig::default().init(&device);
        assert!(matches!(act, Activation::Relu(_)));

        let input: Tensor<B, 4> = Tensor::from_data([[[[-2.0, -0.5], [0.0, 3.0]]]], &device);
        let expected: Tensor<B, 4> = Tensor::from_data([[[[0.0, 0.0], [0.0, 3.0]]]], &device);
        act.forward(input)
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_leaky_relu_values() {
        let device = Default::default();

        let config: ActivationConfig = LeakyReluConfig::new().with_negative_slope(0.25).into();
        let act: Activation<B> = config.init(&device);

        let input: Tensor<B, 2> = Tensor::from_data([[-4.0, 2.0]], &device);
        let expected: Tensor<B, 2> = Tensor::from_data([[-1.0, 2.0]], &device);
        act.forward(input)
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_wrapped_layers_match() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::random([2, 3, 4, 4], Distribution::Default, &device);

        let cases: Vec<(ActivationConfig, Tensor<B, 4>)> = vec![
            (ActivationConfig::Gelu, Gelu.forward(input.clone())),
            (ActivationConfig::Sigmoid, Sigmoid.forward(input.clone())),
            (ActivationConfig::Tanh, Tanh.forward(input.clone())),
            (
                PReluConfig::new().into(),
                PReluConfig::new().init(&device).forward(input.clone()),
            ),
        ];

        for (config, expected) in cases {
            config
                .init::<B>(&device)
                .forward(input.clone())
                .to_data()
                .assert_eq(&expected.to_data(), true);
        }
    }
}
