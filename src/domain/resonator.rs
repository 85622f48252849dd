//! Resonator traces (S21 sweeps) and the per-resonator record.

use std::collections::BTreeMap;

use num_complex::Complex64;

use crate::math::Measured;

/// Relative uncertainty assigned to simulated `fr_geom` and `L_geom`.
pub const SIM_UNCERTAINTY: f64 = 0.05;
/// Relative uncertainty assigned to the measured `fr_bare`.
pub const FR_BARE_UNCERTAINTY: f64 = 1e-5;

/// One S21 frequency sweep at a fixed power and temperature.
///
/// Raw fields come from the acquisition file; fitted fields are filled in by
/// the circle fit.
#[derive(Debug, Clone, Default)]
pub struct ResonatorTrace {
    /// File stem, also the group name under `traces` in the resonator file.
    pub filename: String,
    pub resonator_name: String,
    /// Assigned after loading: power decreasing, then temperature increasing.
    pub id: Option<usize>,

    pub frequency: Vec<f64>,
    pub s21: Vec<Complex64>,
    /// Mean of the logged mixing-chamber temperatures (K).
    pub temperature: Option<f64>,
    pub temperature_err: Option<f64>,
    /// Output power at the VNA (dBm).
    pub power: Option<f64>,
    /// Cable delay (s).
    pub tau: Option<f64>,

    pub fit: ResonatorFit,
    pub is_excluded: Option<bool>,
}

/// Circle-fit outputs of one trace.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResonatorFit {
    pub background_amp: Option<f64>,
    pub background_phase: Option<f64>,
    pub fr: Option<f64>,
    pub fr_err: Option<f64>,
    pub qi: Option<f64>,
    pub qi_err: Option<f64>,
    pub ql: Option<f64>,
    pub ql_err: Option<f64>,
    pub abs_qc: Option<f64>,
    pub abs_qc_err: Option<f64>,
    pub phi: Option<f64>,
    pub phi_err: Option<f64>,
}

impl ResonatorTrace {
    pub fn is_excluded(&self) -> bool {
        self.is_excluded.unwrap_or(false)
    }

    pub fn tag(&self) -> String {
        match self.id {
            Some(id) => format!("S21Trace#{id}"),
            None => format!("S21Trace({})", self.filename),
        }
    }
}

/// Stored fit parameter: `{value, stderr, correl}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredParam {
    pub value: Option<f64>,
    pub stderr: Option<f64>,
    pub correl: BTreeMap<String, f64>,
}

/// Design, simulation and analysis record of one resonator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resonator {
    pub name: String,
    /// `cpw` or `le` (lumped element).
    pub kind: Option<String>,
    pub design_name: Option<String>,
    pub cooldown_name: Option<String>,
    pub film_thickness: Option<f64>,

    /// CPW: center-conductor to ground gap. LE: capacitor-pad spacing.
    pub pitch: Option<f64>,
    /// CPW: center conductor. LE: inductor.
    pub length: Option<f64>,
    pub width: Option<f64>,

    /// Simulated frequency and inductance with geometric inductance only.
    pub fr_geom: Option<f64>,
    pub l_geom: Option<f64>,

    /// Simulated participation ratios.
    pub p_ms: Option<f64>,
    pub p_ma: Option<f64>,
    pub p_sa: Option<f64>,
    pub p_sub: Option<f64>,

    /// Total attenuation of the input line (dB).
    pub line_attenuation: Option<f64>,

    /// Mean measured resonance frequency of the cold, moderate-power sweeps.
    pub fr_bare: Option<f64>,

    /// Power/temperature sweep fit (`Q_TLS0`, `delta_QP0`, ...).
    pub qpt_fit_params: Option<BTreeMap<String, StoredParam>>,
    pub qpt_fit_trace_ids: Option<Vec<i64>>,
}

impl Resonator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Film label embedded in the name (`R70_F11_5p59` -> `F11`).
    pub fn film_id(&self) -> Option<&str> {
        self.name.split('_').nth(1)
    }

    /// Kinetic-inductance fraction `1 - (fr_bare / fr_geom)^2`.
    pub fn alpha_bare(&self) -> Option<Measured> {
        let fr_geom = Measured::with_relative(self.fr_geom?, SIM_UNCERTAINTY);
        let fr_bare = Measured::with_relative(self.fr_bare?, FR_BARE_UNCERTAINTY);
        Some(1.0 - (fr_bare / fr_geom).powi(2))
    }

    /// Kinetic inductance `L_geom alpha / (1 - alpha)`.
    pub fn l_kin(&self) -> Option<Measured> {
        let l_geom = Measured::with_relative(self.l_geom?, SIM_UNCERTAINTY);
        let alpha = self.alpha_bare()?;
        Some(l_geom * alpha.map(|a| a / (1.0 - a), |a| 1.0 / ((1.0 - a) * (1.0 - a))))
    }

    /// `Q_TLS0` from the power/temperature sweep fit, with its standard error.
    pub fn q_tls0(&self) -> Option<(f64, Option<f64>)> {
        let p = self.qpt_fit_params.as_ref()?.get("Q_TLS0")?;
        Some((p.value?, p.stderr))
    }
}

/// Internal quality factor `1 / (1/Ql - cos(phi)/|Qc|)`.
pub fn internal_q(ql: f64, abs_qc: f64, phi: f64) -> f64 {
    1.0 / (1.0 / ql - phi.cos() / abs_qc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn film_id_is_second_token() {
        assert_eq!(Resonator::new("R70_F11_5p59").film_id(), Some("F11"));
        assert_eq!(Resonator::new("R70").film_id(), None);
    }

    #[test]
    fn internal_q_matches_symmetric_case() {
        // phi = 0: 1/Qi = 1/Ql - 1/Qc
        let qi = internal_q(5e4, 1e5, 0.0);
        assert!((qi - 1e5).abs() < 1e-6);
    }

    #[test]
    fn kinetic_quantities_follow_current_fields() {
        let mut r = Resonator::new("R1_F1_5p0");
        r.fr_bare = Some(4.8e9);
        assert!(r.alpha_bare().is_none());
        r.fr_geom = Some(6.0e9);
        assert!((r.alpha_bare().unwrap().value - 0.36).abs() < 1e-12);
        assert!(r.l_kin().is_none());
        r.l_geom = Some(2.0e-9);
        assert!((r.l_kin().unwrap().value - 1.125e-9).abs() < 1e-20);

        // new simulation: 1 - (4.8 / 5)^2
        r.fr_geom = Some(5.0e9);
        assert!((r.alpha_bare().unwrap().value - 0.0784).abs() < 1e-12);
    }

    #[test]
    fn q_tls0_requires_value() {
        let mut r = Resonator::new("R1_F1_5p0");
        assert!(r.q_tls0().is_none());
        let mut params = BTreeMap::new();
        params.insert(
            "Q_TLS0".to_string(),
            StoredParam {
                value: Some(2e6),
                stderr: None,
                ..Default::default()
            },
        );
        r.qpt_fit_params = Some(params);
        assert_eq!(r.q_tls0(), Some((2e6, None)));
    }
}
