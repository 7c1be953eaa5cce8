//! # Utilities

pub mod prefabs;
