//! # Model Families
//!
//! * [`hrnet`] - `HRNet` backbones.

pub mod hrnet;
