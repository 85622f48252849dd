//! Shared domain types.
//!
//! These types are kept small and cloneable so they can be:
//!
//! - used in-memory during fitting
//! - written to / read from device containers
//! - handed to the plot and report layers without conversion

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::math::{Minimized, ParamEstimate};

/// Qubit measurement categories handled by the decay fitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Measurement {
    /// Energy relaxation: excited-state population decays to equilibrium.
    T1,
    /// Hahn-echo dephasing: population recovers towards 1/2.
    T2e,
    /// Ramsey dephasing: damped oscillation from detuning.
    T2r,
}

impl Measurement {
    /// Group / dataset prefix used in device containers.
    pub fn key(self) -> &'static str {
        match self {
            Measurement::T1 => "t1",
            Measurement::T2e => "t2e",
            Measurement::T2r => "t2r",
        }
    }

    /// Human-readable label for titles and logs.
    pub fn label(self) -> &'static str {
        match self {
            Measurement::T1 => "T1",
            Measurement::T2e => "T2E",
            Measurement::T2r => "T2R",
        }
    }

    /// Fit model used for traces of this category.
    pub fn model_kind(self) -> ModelKind {
        match self {
            Measurement::T1 => ModelKind::Decay,
            Measurement::T2e => ModelKind::Recovery,
            Measurement::T2r => ModelKind::DampedCosine,
        }
    }

    /// Name of the time-constant parameter in fit results.
    pub fn time_constant(self) -> &'static str {
        match self {
            Measurement::T1 => "T1",
            Measurement::T2e => "T2E",
            Measurement::T2r => "T2R",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Concrete closed-form model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// `A exp(-x/T) + B`
    Decay,
    /// `A (1 - exp(-x/T)) + B`
    Recovery,
    /// `exp(-x/T) sum_k A_k cos(2 pi f_k x) + B`
    DampedCosine,
    /// `A cos(2 pi f x + phi) + B`
    Cosine,
    /// Hanger-coupled resonator transmission (complex-valued).
    Hanger,
    /// `1 / (p tan_d_surf + p_sub tan_d_sub)`
    LossTangent,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Decay => "exponential decay",
            ModelKind::Recovery => "exponential recovery",
            ModelKind::DampedCosine => "damped multi-tone cosine",
            ModelKind::Cosine => "cosine",
            ModelKind::Hanger => "hanger resonator",
            ModelKind::LossTangent => "TLS loss tangent",
        }
    }
}

/// Why a trace was left without a fit.
///
/// These are recoverable: batch code logs them and moves on to the next trace.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The magnitude spectrum has no local maximum to seed a tone from.
    NoSpectralPeaks,
    /// The trace violates the fit contract (length, ordering, finiteness).
    InvalidTrace(String),
    /// The optimizer could not evaluate the model.
    Numerical(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSpectralPeaks => write!(f, "found no FFT peaks"),
            SkipReason::InvalidTrace(msg) => write!(f, "invalid trace: {msg}"),
            SkipReason::Numerical(msg) => write!(f, "numerical failure: {msg}"),
        }
    }
}

/// A fit attached to a trace: which model, and what the optimizer returned.
#[derive(Debug, Clone)]
pub struct FitRecord {
    pub model: ModelKind,
    pub result: Minimized,
}

impl FitRecord {
    pub fn param(&self, name: &str) -> Option<&ParamEstimate> {
        self.result.get(name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.result.value(name)
    }

    /// Standard error, `None` when the fit did not yield a covariance.
    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.result.stderr(name)
    }

    /// Parameters named `prefix` followed by a tone index (`A0`, `A1`, ...),
    /// in index order.
    pub fn indexed(&self, prefix: &str) -> Vec<&ParamEstimate> {
        self.result
            .params
            .iter()
            .filter(|p| {
                p.name
                    .strip_prefix(prefix)
                    .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            })
            .collect()
    }
}
