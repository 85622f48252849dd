//! Kinetic inductance from the shift of the bare resonance frequency.
//!
//! ```text
//! alpha = 1 - (fr_bare / fr_geom)^2
//! L_kin = L_geom alpha / (1 - alpha)
//! ```
//!
//! `fr_bare` is the mean fitted `fr` of the non-excluded sweeps taken cold
//! (<= 15 mK) at moderate power (-50 to -40 dBm).

use crate::domain::{Resonator, ResonatorTrace};
use crate::error::AppError;
use crate::math::Measured;
use crate::math::stats::mean;

pub const FR_BARE_MAX_TEMPERATURE: f64 = 15e-3;
pub const FR_BARE_MIN_POWER: f64 = -50.0;
pub const FR_BARE_MAX_POWER: f64 = -40.0;

pub fn find_fr_bare(traces: &[ResonatorTrace]) -> Option<f64> {
    let frs: Vec<f64> = traces
        .iter()
        .filter(|t| !t.is_excluded())
        .filter(|t| t.temperature.is_some_and(|temp| temp <= FR_BARE_MAX_TEMPERATURE))
        .filter(|t| {
            t.power
                .is_some_and(|p| (FR_BARE_MIN_POWER..=FR_BARE_MAX_POWER).contains(&p))
        })
        .filter_map(|t| t.fit.fr)
        .filter(|fr| fr.is_finite())
        .collect();
    mean(&frs)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KineticResult {
    pub fr_bare: f64,
    pub alpha: Measured,
    pub l_kin: Measured,
}

/// Compute and store `fr_bare`; `alpha_bare` and `L_kin` are derived from it.
pub fn apply_kinetic(resonator: &mut Resonator, traces: &[ResonatorTrace]) -> Result<KineticResult, AppError> {
    if resonator.fr_geom.is_none() {
        return Err(AppError::new(2, format!("{}: fr_geom is unset.", resonator.name)));
    }
    if resonator.l_geom.is_none() {
        return Err(AppError::new(2, format!("{}: l_geom is unset.", resonator.name)));
    }
    let fr_bare = find_fr_bare(traces).ok_or_else(|| {
        AppError::new(
            3,
            format!(
                "{}: no fitted sweep at <= {} mK and {}..{} dBm.",
                resonator.name,
                FR_BARE_MAX_TEMPERATURE * 1e3,
                FR_BARE_MIN_POWER,
                FR_BARE_MAX_POWER
            ),
        )
    })?;
    resonator.fr_bare = Some(fr_bare);

    let (Some(alpha), Some(l_kin)) = (resonator.alpha_bare(), resonator.l_kin()) else {
        return Err(AppError::new(4, format!("{}: kinetic inductance is undefined.", resonator.name)));
    };
    log::info!("{}: alpha = {alpha}, L_kin = {} nH", resonator.name, l_kin.scale(1e9));
    Ok(KineticResult { fr_bare, alpha, l_kin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResonatorFit;

    fn sweep(power: f64, temperature: f64, fr: f64, excluded: bool) -> ResonatorTrace {
        ResonatorTrace {
            power: Some(power),
            temperature: Some(temperature),
            fit: ResonatorFit {
                fr: Some(fr),
                ..Default::default()
            },
            is_excluded: Some(excluded),
            ..Default::default()
        }
    }

    #[test]
    fn fr_bare_uses_cold_moderate_power_sweeps() {
        let traces = vec![
            sweep(-40.0, 0.012, 5.0e9, false),
            sweep(-50.0, 0.015, 5.2e9, false),
            sweep(-30.0, 0.012, 9.9e9, false),
            sweep(-45.0, 0.050, 9.9e9, false),
            sweep(-45.0, 0.012, 9.9e9, true),
        ];
        assert_eq!(find_fr_bare(&traces), Some(5.1e9));
        assert_eq!(find_fr_bare(&traces[2..4]), None);
    }

    #[test]
    fn alpha_and_kinetic_inductance_with_uncertainty() {
        let mut r = Resonator::new("R1_F1_5p0");
        r.fr_geom = Some(6.0e9);
        r.l_geom = Some(2.0e-9);
        let traces = vec![sweep(-45.0, 0.010, 4.8e9, false)];
        let res = apply_kinetic(&mut r, &traces).unwrap();

        // alpha = 1 - 0.64
        assert!((res.alpha.value - 0.36).abs() < 1e-12);
        // L_kin = 2 nH * 0.36 / 0.64
        assert!((res.l_kin.value - 1.125e-9).abs() < 1e-20);
        // d alpha = 2 r^2 sqrt(0.05^2 + 1e-5^2)
        let expected = 2.0 * 0.64 * (0.05f64.powi(2) + 1e-10).sqrt();
        assert!((res.alpha.std - expected).abs() < 1e-9);
        assert_eq!(r.fr_bare, Some(4.8e9));
        assert_eq!(r.alpha_bare(), Some(res.alpha));
        assert!(res.l_kin.std > 0.0);
    }

    #[test]
    fn missing_simulation_is_an_input_error() {
        let mut r = Resonator::new("R1_F1_5p0");
        assert_eq!(apply_kinetic(&mut r, &[]).unwrap_err().exit_code(), 2);
        r.fr_geom = Some(6e9);
        r.l_geom = Some(2e-9);
        assert_eq!(apply_kinetic(&mut r, &[]).unwrap_err().exit_code(), 3);
    }
}
