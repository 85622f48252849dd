//! Input/output helpers.
//!
//! - container file format with additive save (`container`)
//! - qubit and resonator records on top of it (`records`)
//! - per-trace acquisition files (`trace`)
//! - delimited instrument exports: PPMS, XRD (`delimited`)
//! - simulation lookup tables (`simulation`)
//! - result exports (CSV) (`export`)

pub mod container;
pub mod delimited;
pub mod export;
pub mod records;
pub mod simulation;
pub mod trace;

pub use container::{AttrValue, Dataset, DatasetValues, Group, read_container, save_merged, write_container};
pub use export::*;
pub use records::*;
pub use trace::*;
