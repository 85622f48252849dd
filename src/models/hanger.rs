//! Hanger-coupled resonator transmission in the canonical frame.
//!
//! After cable delay and background removal the off-resonant transmission is
//! `1`, and the resonance traces a circle of diameter `Ql/|Qc|`:
//!
//! ```text
//! S21(f) = 1 - (Ql/|Qc|) e^{i phi} / (1 + 2i Ql (f/fr - 1))
//! ```
//!
//! `phi` rotates the circle to account for impedance mismatch.

use num_complex::Complex64;

/// Hanger parameters in fit order `[fr, Ql, absQc, phi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HangerParams {
    pub fr: f64,
    pub ql: f64,
    pub abs_qc: f64,
    pub phi: f64,
}

impl HangerParams {
    pub fn from_slice(p: &[f64]) -> Option<Self> {
        match p {
            [fr, ql, abs_qc, phi, ..] => Some(Self {
                fr: *fr,
                ql: *ql,
                abs_qc: *abs_qc,
                phi: *phi,
            }),
            _ => None,
        }
    }

    /// Internal quality factor implied by the loaded and coupling Q.
    pub fn qi(&self) -> f64 {
        crate::domain::internal_q(self.ql, self.abs_qc, self.phi)
    }
}

/// Canonical-frame transmission at frequency `f`.
pub fn s21(f: f64, p: &HangerParams) -> Complex64 {
    let numerator = Complex64::from_polar(p.ql / p.abs_qc, p.phi);
    let denominator = Complex64::new(1.0, 2.0 * p.ql * (f / p.fr - 1.0));
    Complex64::new(1.0, 0.0) - numerator / denominator
}

pub fn s21_grid(freqs: &[f64], p: &HangerParams) -> Vec<Complex64> {
    freqs.iter().map(|&f| s21(f, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resonance_is_circle_diameter_away_from_one() {
        let p = HangerParams {
            fr: 5e9,
            ql: 2e4,
            abs_qc: 4e4,
            phi: 0.0,
        };
        let z = s21(5e9, &p);
        assert!((z.re - 0.5).abs() < 1e-12);
        assert!(z.im.abs() < 1e-12);

        let far = s21(6e9, &p);
        assert!((far - Complex64::new(1.0, 0.0)).norm() < 1e-3);
    }

    #[test]
    fn qi_from_params() {
        let p = HangerParams::from_slice(&[5e9, 2e4, 4e4, 0.0]).unwrap();
        assert!((p.qi() - 4e4).abs() < 1e-6);
        assert!(HangerParams::from_slice(&[1.0]).is_none());
    }
}
