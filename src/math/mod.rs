//! Numerical building blocks: least squares, bounded Levenberg-Marquardt,
//! spectra, summary statistics and uncertainty propagation.

pub mod lm;
pub mod ols;
pub mod spectrum;
pub mod stats;
pub mod uncertain;

pub use lm::{LmOptions, Minimized, Param, ParamEstimate, minimize};
pub use ols::*;
pub use uncertain::Measured;
