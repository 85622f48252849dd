//! Closed-form fit models.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! stay generic.

pub mod hanger;
pub mod model;

pub use hanger::{HangerParams, s21, s21_grid};
pub use model::*;
