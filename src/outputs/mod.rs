//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: stage result files and per-item article tables

pub mod json;
