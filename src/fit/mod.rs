//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - derive initial guesses and bounds from each trace
//! - run the bounded least-squares fit and attach the result
//! - fit batches of traces in parallel, logging the ones that are skipped

pub mod batch;
pub mod fitter;
pub mod guess;

pub use batch::*;
pub use fitter::*;
pub use guess::*;
