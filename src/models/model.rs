//! Closed-form model evaluation.
//!
//! Parameter vectors follow a fixed order per model kind:
//!
//! - decay / recovery: `[A, T, B]`
//! - damped cosine:    `[T, B, A0, f0, A1, f1, ...]`
//! - cosine:           `[A, f, phi, B]`
//! - loss tangent:     `[tan_d_surf, tan_d_sub, p_sub]` with `x` the surface
//!   participation ratio
//!
//! The hanger resonator is complex-valued and lives in [`super::hanger`].

use std::f64::consts::PI;

use crate::domain::ModelKind;

/// `A exp(-x/T) + B`
pub fn decay(x: f64, a: f64, t: f64, b: f64) -> f64 {
    a * (-x / t).exp() + b
}

/// `A (1 - exp(-x/T)) + B`
pub fn recovery(x: f64, a: f64, t: f64, b: f64) -> f64 {
    a * (1.0 - (-x / t).exp()) + b
}

/// `exp(-x/T) sum_k A_k cos(2 pi f_k x) + B`, tones given as `[A0, f0, A1, f1, ...]`.
pub fn damped_cosine(x: f64, t: f64, b: f64, tones: &[f64]) -> f64 {
    let sum: f64 = tones
        .chunks_exact(2)
        .map(|tone| tone[0] * (2.0 * PI * tone[1] * x).cos())
        .sum();
    (-x / t).exp() * sum + b
}

/// `A cos(2 pi f x + phi) + B`
pub fn cosine(x: f64, a: f64, f: f64, phi: f64, b: f64) -> f64 {
    a * (2.0 * PI * f * x + phi).cos() + b
}

/// `1 / (p tan_d_surf + p_sub tan_d_sub)`
pub fn loss_tangent(p: f64, tan_d_surf: f64, tan_d_sub: f64, p_sub: f64) -> f64 {
    1.0 / (p * tan_d_surf + p_sub * tan_d_sub)
}

/// Number of parameters for a damped cosine with `tones` frequency components.
pub fn damped_cosine_len(tones: usize) -> usize {
    2 + 2 * tones
}

/// Predict `y(x)` for a real-valued model kind.
///
/// Returns `None` for the hanger model or when `params` is too short.
pub fn predict(model: ModelKind, x: f64, params: &[f64]) -> Option<f64> {
    match (model, params) {
        (ModelKind::Decay, [a, t, b, ..]) => Some(decay(x, *a, *t, *b)),
        (ModelKind::Recovery, [a, t, b, ..]) => Some(recovery(x, *a, *t, *b)),
        (ModelKind::DampedCosine, [t, b, tones @ ..]) => Some(damped_cosine(x, *t, *b, tones)),
        (ModelKind::Cosine, [a, f, phi, b, ..]) => Some(cosine(x, *a, *f, *phi, *b)),
        (ModelKind::LossTangent, [surf, sub, p_sub, ..]) => Some(loss_tangent(x, *surf, *sub, *p_sub)),
        _ => None,
    }
}

/// Evaluate a model over a grid; unsupported models yield NaN.
pub fn predict_grid(model: ModelKind, xs: &[f64], params: &[f64]) -> Vec<f64> {
    xs.iter()
        .map(|&x| predict(model, x, params).unwrap_or(f64::NAN))
        .collect()
}
