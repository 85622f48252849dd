//! Single-trace fitting.
//!
//! Given:
//! - an independent axis `x_i` (delay, drive amplitude, participation ratio)
//! - observed values `y_i`
//! - optional weights `w_i` (inverse measurement uncertainty)
//! - a parameter set with initial guesses and bounds
//!
//! we minimize `sum (w_i (model(x_i) - y_i))^2` with bounded
//! Levenberg-Marquardt and return a [`FitRecord`]. Failures that only concern
//! one trace come back as a [`SkipReason`] so batch callers can log and
//! continue.

use crate::domain::{FitRecord, Measurement, ModelKind, QubitTrace, SkipReason};
use crate::fit::guess::{ToneOptions, guess_damped_cosine, guess_decay, guess_recovery};
use crate::math::stats::is_strictly_increasing;
use crate::math::{LmOptions, Param, minimize};
use crate::models::predict;

/// Options shared by every qubit-trace fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitOptions {
    pub tones: ToneOptions,
    pub lm: LmOptions,
}

/// Check the fit contract: matching lengths, strictly increasing finite `x`,
/// finite `y`, and at least one more sample than free parameters.
pub fn validate_samples(x: &[f64], y: &[f64], n_free: usize) -> Result<(), SkipReason> {
    if x.len() != y.len() {
        return Err(SkipReason::InvalidTrace(format!(
            "x has {} samples but y has {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < n_free + 1 {
        return Err(SkipReason::InvalidTrace(format!(
            "{} samples for {n_free} free parameters",
            x.len()
        )));
    }
    if !is_strictly_increasing(x) {
        return Err(SkipReason::InvalidTrace(
            "independent axis is not strictly increasing".to_string(),
        ));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(SkipReason::InvalidTrace("non-finite sample values".to_string()));
    }
    Ok(())
}

/// Fit a real-valued model to `(x, y)`.
pub fn fit_curve(
    model: ModelKind,
    params: &[Param],
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
    lm: &LmOptions,
) -> Result<FitRecord, SkipReason> {
    let n_free = params.iter().filter(|p| p.vary).count();
    validate_samples(x, y, n_free)?;
    if let Some(w) = weights {
        if w.len() != x.len() || w.iter().any(|v| !v.is_finite()) {
            return Err(SkipReason::InvalidTrace("weights do not match samples".to_string()));
        }
    }

    let residual = |p: &[f64]| -> Vec<f64> {
        x.iter()
            .zip(y)
            .enumerate()
            .map(|(i, (&xi, &yi))| {
                let model_y = predict(model, xi, p).unwrap_or(f64::NAN);
                let w = weights.map_or(1.0, |w| w[i]);
                w * (model_y - yi)
            })
            .collect()
    };

    let result = minimize(params, residual, lm).map_err(|e| SkipReason::Numerical(e.to_string()))?;
    let record = FitRecord { model, result };
    log::debug!("{}", crate::report::fit_report(&record));
    if !record.result.converged {
        log::info!(
            "{} fit did not converge after {} iterations; standard errors unset.",
            model.display_name(),
            record.result.iterations
        );
    }
    Ok(record)
}

/// Initial parameters for a qubit trace of the given category.
pub fn initial_params(trace: &QubitTrace, tones: &ToneOptions) -> Result<Vec<Param>, SkipReason> {
    let name = trace.measurement.time_constant();
    let (x, y) = (&trace.tau, &trace.population);
    Ok(match trace.measurement {
        Measurement::T1 => guess_decay(x, y, name),
        Measurement::T2e => guess_recovery(x, y, name),
        Measurement::T2r => guess_damped_cosine(x, y, name, tones)?.params,
    })
}

/// Fit one qubit trace and attach the result to it.
///
/// On failure the trace keeps no fit and records why it was skipped.
pub fn fit_qubit_trace(trace: &mut QubitTrace, opts: &FitOptions) -> Result<(), SkipReason> {
    let outcome = initial_params(trace, &opts.tones).and_then(|params| {
        fit_curve(
            trace.measurement.model_kind(),
            &params,
            &trace.tau,
            &trace.population,
            None,
            &opts.lm,
        )
    });
    match outcome {
        Ok(record) => {
            trace.fit = Some(record);
            trace.skipped = None;
            Ok(())
        }
        Err(reason) => {
            trace.fit = None;
            trace.skipped = Some(reason.clone());
            Err(reason)
        }
    }
}
