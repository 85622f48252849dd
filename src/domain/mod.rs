//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measurement and model enums (`Measurement`, `ModelKind`) and fit records
//! - qubit traces and the per-qubit summary (`QubitTrace`, `Qubit`)
//! - resonator traces and the per-resonator record (`ResonatorTrace`, `Resonator`)

pub mod qubit;
pub mod resonator;
pub mod types;

pub use qubit::*;
pub use resonator::*;
pub use types::*;
