#![warn(missing_docs)]
//!# hrnet - `HRNet` Backbones for Burn
//!
//! ## Notable Components
//!
//! * [`compat`] - config-selectable layer wrappers.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks::cna`] - ``Conv2d + Norm + Act`` block.
//!   * [`layers::blocks::conv_norm`] - ``Conv2d + Norm`` block.
//! * [`models`] - complete model families.
//!   * [`models::hrnet`] - `HRNet` backbones.
//!     * [`models::hrnet::hrnet_backbone`] - named backbone factory.
//! * [`utility`] - misc support.
//!   * [`utility::prefabs`] - well-known config pre-fabs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use burn::backend::NdArray;
//! use burn::prelude::Tensor;
//! use hrnet::models::hrnet::hrnet_backbone;
//!
//! type B = NdArray<f32>;
//! let device = Default::default();
//!
//! let model = hrnet_backbone::<B>("hrnet_w32", &device).unwrap();
//! let (low_level, features) = model.forward(Tensor::zeros([1, 3, 256, 192], &device));
//!
//! assert_eq!(low_level.dims(), [1, 256, 64, 48]);
//! assert_eq!(features.dims(), [1, 32, 64, 48]);
//! ```

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod layers;
pub mod models;
pub mod utility;
