//! # Compat Wrappers
//!
//! Config-selectable wrappers over ``burn::nn`` layer families.

pub mod activation_wrapper;
pub mod normalization_wrapper;
