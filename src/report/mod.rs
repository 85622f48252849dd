//! Reporting utilities: fit residuals and formatted terminal output.

use crate::domain::FitRecord;
use crate::error::AppError;
use crate::models::predict;

pub mod format;

pub use format::*;

/// Residual summary of a fitted trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub rms: f64,
    pub max_abs: f64,
}

/// `y - model(x)` for every sample of a real-valued fit.
pub fn fit_residuals(record: &FitRecord, x: &[f64], y: &[f64]) -> Result<Vec<f64>, AppError> {
    let params = record.result.values();
    let mut out = Vec::with_capacity(x.len());
    for (&xi, &yi) in x.iter().zip(y) {
        let y_fit = predict(record.model, xi, &params).unwrap_or(f64::NAN);
        if !y_fit.is_finite() {
            return Err(AppError::new(4, "Non-finite model prediction during residual computation."));
        }
        out.push(yi - y_fit);
    }
    Ok(out)
}

pub fn residual_stats(residuals: &[f64]) -> Option<ResidualStats> {
    if residuals.is_empty() {
        return None;
    }
    let rms = (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt();
    let max_abs = residuals.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
    Some(ResidualStats { rms, max_abs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticTrace, synthesize};
    use crate::domain::Measurement;
    use crate::fit::{FitOptions, fit_qubit_trace};

    #[test]
    fn residuals_of_a_good_fit_are_noise_sized() {
        let truth = SyntheticTrace::decay(0.8, 30e-6, 0.1);
        let mut trace = synthesize(Measurement::T1, &truth, 101, 150e-6, 0.01, 3);
        fit_qubit_trace(&mut trace, &FitOptions::default()).unwrap();
        let record = trace.fit.as_ref().unwrap();

        let r = fit_residuals(record, &trace.tau, &trace.population).unwrap();
        assert_eq!(r.len(), 101);
        let stats = residual_stats(&r).unwrap();
        assert!(stats.rms < 0.02, "rms {}", stats.rms);
        assert!(stats.max_abs >= stats.rms);
    }

    #[test]
    fn empty_residuals_have_no_stats() {
        assert!(residual_stats(&[]).is_none());
    }
}
