//! Effective qubit temperature from a readout-population measurement (RPM).
//!
//! The e-f Rabi amplitude measured with the qubit prepared in `|g>` (`A_g`)
//! and in `|e>` (`A_e`) gives the thermal population ratio `A_g / A_e`, so
//!
//! ```text
//! T = f_q / (k_B ln(A_g / A_e))      k_B in Hz/K
//! ```

use crate::domain::{FitRecord, ModelKind, RpmTrace};
use crate::error::AppError;
use crate::fit::{fit_curve, guess_cosine};
use crate::math::{LmOptions, Measured};

/// Boltzmann constant in Hz/K (CODATA 2018).
pub const BOLTZMANN_HZ_PER_K: f64 = 2.083_661_912e10;

#[derive(Debug, Clone)]
pub struct RpmFit {
    pub ground: FitRecord,
    pub excited: FitRecord,
    pub a_g: Measured,
    pub a_e: Measured,
    pub temperature: Measured,
}

fn amplitude(record: &FitRecord, label: &str, source: &str) -> Result<Measured, AppError> {
    let value = record
        .value("A")
        .ok_or_else(|| AppError::new(4, format!("{source}: {label} fit has no amplitude.")))?;
    let err = record.stderr("A").ok_or_else(|| {
        AppError::new(4, format!("{source}: {label} amplitude has no standard error."))
    })?;
    Ok(Measured::new(value, err))
}

pub fn qubit_temperature(a_g: Measured, a_e: Measured, f_q: f64) -> Measured {
    (a_g / a_e).ln().scale(BOLTZMANN_HZ_PER_K).recip().scale(f_q)
}

/// Fit both Rabi traces and derive the qubit temperature.
pub fn fit_rpm(trace: &RpmTrace, lm: &LmOptions) -> Result<RpmFit, AppError> {
    let fit_one = |y: &[f64], label: &str| -> Result<FitRecord, AppError> {
        let params = guess_cosine(&trace.amplitude, y);
        fit_curve(ModelKind::Cosine, &params, &trace.amplitude, y, None, lm)
            .map_err(|e| AppError::new(4, format!("{}: {label} fit failed: {e}", trace.source)))
    };
    let ground = fit_one(&trace.magnitude_g, "ground")?;
    let excited = fit_one(&trace.magnitude_e, "excited")?;
    let a_g = amplitude(&ground, "ground", &trace.source)?;
    let a_e = amplitude(&excited, "excited", &trace.source)?;
    if a_e.value <= 0.0 || a_g.value <= a_e.value {
        return Err(AppError::new(
            4,
            format!(
                "{}: need A_g > A_e > 0 for a temperature (A_g = {:.3e}, A_e = {:.3e}).",
                trace.source, a_g.value, a_e.value
            ),
        ));
    }
    let temperature = qubit_temperature(a_g, a_e, trace.qubit_frequency);
    log::info!(
        "{}: qubit temperature {:.2} mK",
        trace.qubit_name,
        temperature.scale(1e3)
    );
    Ok(RpmFit {
        ground,
        excited,
        a_g,
        a_e,
        temperature,
    })
}

/// `2 (s - mean(s)) / (max(ref) - min(ref))`, for plotting both traces on
/// the ground-state scale.
pub fn signal_norm(signal: &[f64], reference: &[f64]) -> Vec<f64> {
    let m = crate::math::stats::mean(signal).unwrap_or(0.0);
    let span = crate::math::stats::finite_range(reference)
        .map(|(lo, hi)| hi - lo)
        .filter(|s| *s > 0.0)
        .unwrap_or(1.0);
    signal.iter().map(|v| 2.0 * (v - m) / span).collect()
}
