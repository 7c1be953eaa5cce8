//! Common low-level modules for building backbone layers in Burn.
pub mod blocks;
