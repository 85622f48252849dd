//! Two-level-system loss tangent across devices.
//!
//! Each resonator contributes its low-power, low-temperature `Q_TLS0` and its
//! simulated metal-substrate participation `p_ms`. We fit
//!
//! ```text
//! Q_TLS0 = 1 / (p_ms tan_d_surf + p_sub tan_d_sub)
//! ```
//!
//! weighted by `1/Q_err`, with the substrate term fixed.

use crate::domain::{FitRecord, ModelKind, Resonator};
use crate::error::AppError;
use crate::math::{LmOptions, Measured, Param, minimize};
use crate::models::predict;

/// Alpha-tantalum surface loss tangent (literature reference line).
pub const ALPHA_TA_TAN_DELTA: Measured = Measured {
    value: 8.1e-4,
    std: 0.6e-4,
};

/// Sapphire bulk loss tangent.
pub const SAPPHIRE_TAN_DELTA: Measured = Measured {
    value: 1.3e-7,
    std: 0.2e-7,
};

#[derive(Debug, Clone, Copy)]
pub struct TlsOptions {
    /// Samples with `stderr / value >= rejection_threshold` are dropped.
    pub rejection_threshold: f64,
    /// Keep only films strictly inside `(min, max)` (m).
    pub thickness_window: Option<(f64, f64)>,
    pub tan_delta_surf_init: f64,
    pub tan_delta_sub: f64,
    pub p_sub: f64,
    pub lm: LmOptions,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            rejection_threshold: 0.75,
            thickness_window: None,
            tan_delta_surf_init: 1e-3,
            tan_delta_sub: SAPPHIRE_TAN_DELTA.value,
            p_sub: 0.90,
            lm: LmOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsSample {
    pub name: String,
    pub p_ms: f64,
    pub q_tls0: f64,
    pub q_tls0_err: f64,
}

/// True when a `Q_TLS0` estimate is too uncertain to use.
pub fn is_rejected(value: f64, stderr: Option<f64>, threshold: f64) -> bool {
    match stderr {
        Some(err) if err.is_finite() && value.is_finite() && value != 0.0 => (err / value).abs() >= threshold,
        _ => true,
    }
}

/// Resonators that pass the thickness window and the rejection rule.
///
/// Devices without a `Q_TLS0` fit are ignored silently; the others that are
/// dropped are logged with the reason.
pub fn collect_samples(resonators: &[Resonator], opts: &TlsOptions) -> Vec<TlsSample> {
    let mut samples = Vec::new();
    for r in resonators {
        let Some((q, q_err)) = r.q_tls0() else {
            continue;
        };
        if let Some((lo, hi)) = opts.thickness_window {
            if !r.film_thickness.is_some_and(|t| lo < t && t < hi) {
                log::debug!("{}: film thickness outside ({lo:e}, {hi:e}) m.", r.name);
                continue;
            }
        }
        if is_rejected(q, q_err, opts.rejection_threshold) {
            log::info!("{}: Q_TLS0 rejected (relative error at or above {}).", r.name, opts.rejection_threshold);
            continue;
        }
        let Some(p_ms) = r.p_ms else {
            log::warn!("{}: no simulated p_ms; left out of the loss-tangent fit.", r.name);
            continue;
        };
        samples.push(TlsSample {
            name: r.name.clone(),
            p_ms,
            q_tls0: q,
            q_tls0_err: q_err.unwrap_or(f64::NAN),
        });
    }
    samples.sort_by(|a, b| a.p_ms.total_cmp(&b.p_ms));
    samples
}

#[derive(Debug, Clone)]
pub struct TlsFit {
    pub tan_delta_surf: f64,
    pub tan_delta_surf_err: Option<f64>,
    pub record: FitRecord,
}

pub fn fit_loss_tangent(samples: &[TlsSample], opts: &TlsOptions) -> Result<TlsFit, AppError> {
    if samples.len() < 2 {
        return Err(AppError::new(
            3,
            format!("Loss-tangent fit needs at least 2 accepted devices, got {}.", samples.len()),
        ));
    }
    if samples.iter().any(|s| !(s.q_tls0_err.is_finite() && s.q_tls0_err > 0.0)) {
        return Err(AppError::new(2, "Loss-tangent samples need positive, finite errors."));
    }
    let params = [
        Param::new("tan_delta_surf", opts.tan_delta_surf_init),
        Param::new("tan_delta_sub", opts.tan_delta_sub).fixed(),
        Param::new("p_sub", opts.p_sub).fixed(),
    ];

    // devices may share a p_ms, so this is not a curve fit over a sorted axis
    let residual = |p: &[f64]| -> Vec<f64> {
        samples
            .iter()
            .map(|s| {
                let m = predict(ModelKind::LossTangent, s.p_ms, p).unwrap_or(f64::NAN);
                (m - s.q_tls0) / s.q_tls0_err
            })
            .collect()
    };
    let result = minimize(&params, residual, &opts.lm)?;
    Ok(finish(FitRecord {
        model: ModelKind::LossTangent,
        result,
    }))
}

fn finish(record: FitRecord) -> TlsFit {
    log::debug!("{}", crate::report::fit_report(&record));
    TlsFit {
        tan_delta_surf: record.value("tan_delta_surf").unwrap_or(f64::NAN),
        tan_delta_surf_err: record.stderr("tan_delta_surf"),
        record,
    }
}

/// `Q_TLS0` of a pure surface loss: `1 / (p tan_d)`.
pub fn surface_limited_q(p_ms: f64, tan_delta: f64) -> f64 {
    1.0 / (p_ms * tan_delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoredParam;
    use crate::models::loss_tangent;
    use std::collections::BTreeMap;

    fn device(name: &str, p_ms: f64, q: f64, q_err: Option<f64>, thickness: f64) -> Resonator {
        let mut r = Resonator::new(name);
        r.p_ms = Some(p_ms);
        r.film_thickness = Some(thickness);
        let mut params = BTreeMap::new();
        params.insert(
            "Q_TLS0".to_string(),
            StoredParam {
                value: Some(q),
                stderr: q_err,
                correl: BTreeMap::new(),
            },
        );
        r.qpt_fit_params = Some(params);
        r
    }

    #[test]
    fn rejection_boundary_is_inclusive() {
        assert!(is_rejected(1e6, Some(7.5e5), 0.75));
        assert!(!is_rejected(1e6, Some(7.49e5), 0.75));
        assert!(is_rejected(1e6, None, 0.75));
        assert!(is_rejected(1e6, Some(f64::NAN), 0.75));
    }

    #[test]
    fn samples_respect_thickness_window_and_rejection() {
        let resonators = vec![
            device("R1_F1_5p0", 1e-4, 1e6, Some(1e5), 200e-9),
            device("R2_F1_5p1", 2e-4, 1e6, Some(7.5e5), 200e-9),
            device("R3_F2_5p2", 3e-4, 1e6, Some(1e5), 50e-9),
            Resonator::new("R4_F2_5p3"),
        ];
        let opts = TlsOptions {
            thickness_window: Some((90e-9, 500e-9)),
            ..Default::default()
        };
        let names: Vec<String> = collect_samples(&resonators, &opts).into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["R1_F1_5p0"]);

        let all = collect_samples(&resonators, &TlsOptions::default());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn recovers_surface_loss_tangent() {
        let tan_surf = 2e-3;
        let opts = TlsOptions::default();
        let samples: Vec<TlsSample> = [1e-4, 2e-4, 4e-4, 8e-4, 1.6e-3]
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let q = loss_tangent(p, tan_surf, opts.tan_delta_sub, opts.p_sub);
                TlsSample {
                    name: format!("R{i}"),
                    p_ms: p,
                    q_tls0: q,
                    q_tls0_err: 0.05 * q,
                }
            })
            .collect();
        let fit = fit_loss_tangent(&samples, &opts).unwrap();
        assert!((fit.tan_delta_surf / tan_surf - 1.0).abs() < 1e-6);
        assert_eq!(fit.record.value("p_sub"), Some(0.90));
        assert!(fit.record.stderr("tan_delta_sub").is_none());
    }

    #[test]
    fn one_device_is_not_enough() {
        let s = TlsSample {
            name: "R1".to_string(),
            p_ms: 1e-4,
            q_tls0: 1e6,
            q_tls0_err: 1e5,
        };
        assert_eq!(fit_loss_tangent(&[s], &TlsOptions::default()).unwrap_err().exit_code(), 3);
    }
}
