//! Synthetic data generation (demo datasets and test fixtures).

pub mod synthetic;
