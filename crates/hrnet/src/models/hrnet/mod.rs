//! # `HRNet` - High-Resolution Network backbones.
//!
//! * [`hrnet_backbone`] - build a named backbone.
//! * [`hrnet_model::HighResolutionNet`] - the backbone module.
//! * [`hrnet_model::HighResolutionNetConfig`] - the backbone config.
//! * [`stage_module::StageModule`] - multi-branch residual + fuse unit.
//! * [`prefabs`] - the well-known widths; `hrnet_w18`, `hrnet_w32`, `hrnet_w48`.

use crate::models::hrnet::hrnet_model::HighResolutionNet;
use crate::models::hrnet::prefabs::{lookup_prefab, prefab_names};
use anyhow::bail;
use burn::prelude::Backend;

pub mod basic_block;
pub mod bottleneck;
pub mod downsample;
pub mod fuse;
pub mod hrnet_model;
pub mod prefabs;
pub mod stage_module;
pub mod stem;
pub mod transition;
pub mod util;

/// Build a named [`HighResolutionNet`] backbone.
///
/// # Arguments
///
/// - `model_type`: one of `hrnet_w18`, `hrnet_w32`, `hrnet_w48`.
/// - `device`: the device to initialize the weights on.
///
/// # Returns
///
/// The initialized backbone; or an error naming the known variants.
pub fn hrnet_backbone<B: Backend>(
    model_type: &str,
    device: &B::Device,
) -> anyhow::Result<HighResolutionNet<B>> {
    let Some(prefab) = lookup_prefab(model_type) else {
        bail!(
            "unknown HRNet model type {model_type:?}; expected one of {:?}",
            prefab_names()
        );
    };

    tracing::debug!(model_type, description = %prefab.description, "building HRNet backbone");

    let config = prefab.new_config();
    config.try_validate().map_err(anyhow::Error::msg)?;

    Ok(config.init(device))
}
