//! `betata` library crate: analysis of superconducting qubit and resonator
//! measurements.
//!
//! The binary (`betata`) is a thin wrapper around this library so that:
//!
//! - fitting and aggregation are testable without spawning processes
//! - modules are reusable from other tools and notebooks

pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
