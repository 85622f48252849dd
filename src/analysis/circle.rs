//! Resonator S21 circle fit (hanger geometry).
//!
//! Steps for one sweep:
//!
//! 1. remove the cable delay: `S21 * exp(-i 2 pi f tau)`
//! 2. estimate the off-resonant background from the outer edges of the sweep
//! 3. divide by it, which puts the off-resonant point at `1 + 0i`
//! 4. algebraic (Kasa) circle fit for a first look at diameter and rotation
//! 5. bounded LM on stacked real/imaginary residuals of the hanger model
//!
//! `Qi` and its error are derived from the fitted `Ql`, `|Qc|` and `phi`,
//! with the covariance between them taken into account.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::domain::{FitRecord, ModelKind, ResonatorTrace, SkipReason, internal_q};
use crate::fit::validate_samples;
use crate::math::stats::argmax;
use crate::math::{LmOptions, Param, minimize, solve_least_squares};
use crate::models::{HangerParams, s21};

/// Options for [`fit_trace`].
#[derive(Debug, Clone, Copy)]
pub struct CircleFitOptions {
    /// Fraction of samples on each end used for the background estimate.
    pub edge_fraction: f64,
    pub lm: LmOptions,
}

impl Default for CircleFitOptions {
    fn default() -> Self {
        Self {
            edge_fraction: 0.05,
            lm: LmOptions::default(),
        }
    }
}

/// Circle in the complex plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Complex64,
    pub radius: f64,
}

/// Algebraic circle fit: least squares of `x^2 + y^2 + D x + E y + F = 0`.
pub fn fit_circle(points: &[Complex64]) -> Option<Circle> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len();
    let centroid: Complex64 = points.iter().sum::<Complex64>() / n as f64;
    if points.iter().all(|z| (z - centroid).norm() < 1e-12) {
        return None;
    }
    let a = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => points[i].re,
        1 => points[i].im,
        _ => 1.0,
    });
    let b = DVector::from_iterator(n, points.iter().map(|z| -z.norm_sqr()));
    let sol = solve_least_squares(&a, &b)?;
    let center = Complex64::new(-sol[0] / 2.0, -sol[1] / 2.0);
    let r2 = center.norm_sqr() - sol[2];
    (r2.is_finite() && r2 > 0.0).then(|| Circle {
        center,
        radius: r2.sqrt(),
    })
}

/// Delay-corrected sweep.
pub fn remove_delay(frequency: &[f64], s21_raw: &[Complex64], tau: f64) -> Vec<Complex64> {
    frequency
        .iter()
        .zip(s21_raw)
        .map(|(&f, &z)| z * Complex64::from_polar(1.0, -2.0 * PI * f * tau))
        .collect()
}

/// Mean of the outer `edge_fraction` of samples on both ends.
pub fn edge_background(s21: &[Complex64], edge_fraction: f64) -> Option<Complex64> {
    let n = s21.len();
    if n == 0 {
        return None;
    }
    let k = ((n as f64 * edge_fraction).ceil() as usize).clamp(1, n.div_ceil(2));
    let edges = s21[..k].iter().chain(&s21[n - k..]);
    let sum: Complex64 = edges.sum();
    Some(sum / (2 * k) as f64)
}

/// Canonical sweep of a fitted trace (delay removed, background divided out).
pub fn canonical_s21(trace: &ResonatorTrace) -> Option<Vec<Complex64>> {
    let bg = Complex64::from_polar(trace.fit.background_amp?, trace.fit.background_phase?);
    let no_delay = remove_delay(&trace.frequency, &trace.s21, trace.tau.unwrap_or(0.0));
    Some(no_delay.into_iter().map(|z| z / bg).collect())
}

/// Initial hanger parameters from the canonical sweep and its circle.
fn initial_params(frequency: &[f64], canonical: &[Complex64], circle: &Circle) -> Option<[Param; 4]> {
    let depth: Vec<f64> = canonical.iter().map(|z| (Complex64::new(1.0, 0.0) - z).norm()).collect();
    let i_res = argmax(&depth)?;
    let fr0 = frequency[i_res];
    let half_power = depth[i_res] / 2f64.sqrt();
    let above: Vec<f64> = frequency
        .iter()
        .zip(&depth)
        .filter(|(_, d)| **d >= half_power)
        .map(|(f, _)| *f)
        .collect();
    let step = (frequency[frequency.len() - 1] - frequency[0]) / (frequency.len() - 1) as f64;
    let width = match (above.first(), above.last()) {
        (Some(lo), Some(hi)) if hi > lo => hi - lo,
        _ => step,
    };
    let ql0 = fr0 / width;
    let diameter = 2.0 * circle.radius;
    let phi0 = (Complex64::new(1.0, 0.0) - circle.center).arg();

    let f_lo = frequency[0];
    let f_hi = frequency[frequency.len() - 1];
    Some([
        Param::new("fr", fr0).with_bounds(f_lo, f_hi),
        Param::new("Ql", ql0).with_min(0.0),
        Param::new("absQc", ql0 / diameter).with_min(0.0),
        Param::new("phi", phi0).with_bounds(-PI, PI),
    ])
}

/// Standard error of `Qi` by linear propagation with parameter correlations.
fn qi_stderr(record: &FitRecord, p: &HangerParams) -> Option<f64> {
    let qi = p.qi();
    let grads = [
        ("Ql", qi * qi / (p.ql * p.ql)),
        ("absQc", -qi * qi * p.phi.cos() / (p.abs_qc * p.abs_qc)),
        ("phi", -qi * qi * p.phi.sin() / p.abs_qc),
    ];
    let mut var = 0.0;
    for (a, ga) in grads {
        let ea = record.param(a)?;
        let sa = ea.stderr?;
        for (b, gb) in grads {
            let sb = record.stderr(b)?;
            let rho = if a == b { 1.0 } else { ea.correl.get(b).copied().unwrap_or(0.0) };
            var += ga * gb * rho * sa * sb;
        }
    }
    (var.is_finite() && var >= 0.0).then(|| var.sqrt())
}

/// Circle-fit one raw sweep and attach the results to the trace.
pub fn fit_trace(trace: &mut ResonatorTrace, opts: &CircleFitOptions) -> Result<HangerParams, SkipReason> {
    let magnitude: Vec<f64> = trace.s21.iter().map(|z| z.norm()).collect();
    if magnitude.len() != trace.frequency.len() {
        return Err(SkipReason::InvalidTrace(format!(
            "{} frequencies but {} S21 samples",
            trace.frequency.len(),
            magnitude.len()
        )));
    }
    validate_samples(&trace.frequency, &magnitude, 4)?;

    let tau = trace.tau.unwrap_or(0.0);
    let no_delay = remove_delay(&trace.frequency, &trace.s21, tau);
    let background = edge_background(&no_delay, opts.edge_fraction)
        .filter(|bg| bg.norm() > 0.0 && bg.norm().is_finite())
        .ok_or_else(|| SkipReason::Numerical("off-resonant background vanishes".to_string()))?;
    let canonical: Vec<Complex64> = no_delay.iter().map(|z| z / background).collect();

    let circle = fit_circle(&canonical)
        .filter(|c| c.radius > 1e-9)
        .ok_or_else(|| SkipReason::Numerical("circle fit found no resonance".to_string()))?;
    let params = initial_params(&trace.frequency, &canonical, &circle)
        .ok_or_else(|| SkipReason::Numerical("no initial guess for the hanger fit".to_string()))?;

    let frequency = &trace.frequency;
    let residual = |p: &[f64]| -> Vec<f64> {
        let Some(hp) = HangerParams::from_slice(p) else {
            return vec![f64::NAN; 2 * frequency.len()];
        };
        let mut r = Vec::with_capacity(2 * frequency.len());
        for (&f, z) in frequency.iter().zip(&canonical) {
            let d = s21(f, &hp) - z;
            r.push(d.re);
            r.push(d.im);
        }
        r
    };
    let result = minimize(&params, residual, &opts.lm).map_err(|e| SkipReason::Numerical(e.to_string()))?;
    let record = FitRecord {
        model: ModelKind::Hanger,
        result,
    };
    log::debug!("{}\n{}", trace.tag(), crate::report::fit_report(&record));

    let values = record.result.values();
    let hp = HangerParams::from_slice(&values)
        .ok_or_else(|| SkipReason::Numerical("hanger fit returned too few parameters".to_string()))?;

    let fit = &mut trace.fit;
    fit.background_amp = Some(background.norm());
    fit.background_phase = Some(background.arg());
    fit.fr = Some(hp.fr);
    fit.fr_err = record.stderr("fr");
    fit.ql = Some(hp.ql);
    fit.ql_err = record.stderr("Ql");
    fit.abs_qc = Some(hp.abs_qc);
    fit.abs_qc_err = record.stderr("absQc");
    fit.phi = Some(hp.phi);
    fit.phi_err = record.stderr("phi");
    fit.qi = Some(internal_q(hp.ql, hp.abs_qc, hp.phi));
    fit.qi_err = qi_stderr(&record, &hp);
    if !record.result.converged {
        log::info!("{}: hanger fit did not converge; standard errors unset.", trace.tag());
    }
    Ok(hp)
}
