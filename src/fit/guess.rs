//! Data-driven initial guesses and bounds for each model kind.
//!
//! Guesses are deterministic functions of the trace, so re-running a fit on
//! the same file always starts from the same point.

use std::f64::consts::{E, PI};

use crate::domain::SkipReason;
use crate::math::spectrum::{Spectrum, dft, fftfreq, find_peaks, positive_spectrum};
use crate::math::stats::{argmin_abs_diff, finite_range};
use crate::math::Param;

/// Tone-detection settings for damped multi-tone fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneOptions {
    /// Keep spectral peaks at or above `threshold * max peak`.
    pub threshold: f64,
    /// Maximum number of tones to fit.
    pub max_tones: usize,
    /// Upper bound for every tone frequency (Hz).
    pub f_max: f64,
}

impl Default for ToneOptions {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_tones: 4,
            f_max: 1e6,
        }
    }
}

/// Initial decay time for Ramsey fits (s).
pub const RAMSEY_T_INIT: f64 = 50e-6;
/// Lower bound on the Ramsey decay time (s).
pub const RAMSEY_T_MIN: f64 = 1e-9;

/// Seed for a damped multi-tone fit, plus the spectrum it was derived from.
#[derive(Debug, Clone)]
pub struct ToneGuess {
    pub params: Vec<Param>,
    pub spectrum: Spectrum,
    /// Indices into `spectrum` of the tones that seeded the fit.
    pub peaks: Vec<usize>,
}

/// `A exp(-x/T) + B`: start from the endpoints and the `1/e` crossing.
///
/// Returns `[A, <t_name>, B]`.
pub fn guess_decay(x: &[f64], y: &[f64], t_name: &str) -> Vec<Param> {
    let (first, last) = endpoints(y);
    let a0 = first - last;
    let b0 = last;
    let t0 = crossing(x, y, a0 / E + b0);
    vec![
        Param::new("A", a0).with_bounds(0.0, 1.0),
        Param::new(t_name, t0).with_min(0.0),
        Param::new("B", b0).with_bounds(0.0, 1.0),
    ]
}

/// `A (1 - exp(-x/T)) + B`: start from the endpoints and the `1 - 1/e` crossing.
///
/// Returns `[A, <t_name>, B]`.
pub fn guess_recovery(x: &[f64], y: &[f64], t_name: &str) -> Vec<Param> {
    let (first, last) = endpoints(y);
    let a0 = last - first;
    let b0 = first;
    let t0 = crossing(x, y, a0 * (1.0 - 1.0 / E) + b0);
    vec![
        Param::new("A", a0).with_bounds(0.0, 0.5),
        Param::new(t_name, t0).with_min(0.0),
        Param::new("B", b0).with_bounds(0.0, 0.5),
    ]
}

/// Seed a damped multi-tone fit from the magnitude spectrum.
///
/// Returns `[<t_name>, B, A0, f0, A1, f1, ...]`. Fails with
/// [`SkipReason::NoSpectralPeaks`] when the spectrum has no local maximum.
pub fn guess_damped_cosine(
    x: &[f64],
    y: &[f64],
    t_name: &str,
    opts: &ToneOptions,
) -> Result<ToneGuess, SkipReason> {
    if x.len() < 2 {
        return Err(SkipReason::InvalidTrace("need at least two samples".to_string()));
    }
    let dt = x[1] - x[0];
    let spectrum = positive_spectrum(y, dt);
    let peaks = find_peaks(&spectrum.amplitudes);
    let main = peaks
        .iter()
        .map(|&i| spectrum.amplitudes[i])
        .fold(f64::NEG_INFINITY, f64::max);
    if peaks.is_empty() || !main.is_finite() {
        return Err(SkipReason::NoSpectralPeaks);
    }

    let good: Vec<usize> = peaks
        .into_iter()
        .filter(|&i| spectrum.amplitudes[i] >= opts.threshold * main)
        .take(opts.max_tones.max(1))
        .collect();
    let total: f64 = good.iter().map(|&i| spectrum.amplitudes[i]).sum();

    let mut params = vec![
        Param::new(t_name, RAMSEY_T_INIT).with_min(RAMSEY_T_MIN),
        Param::new("B", 0.5).with_bounds(-1.0, 1.0),
    ];
    for (k, &i) in good.iter().enumerate() {
        params.push(Param::new(format!("A{k}"), spectrum.amplitudes[i] / total).with_bounds(-1.0, 1.0));
        params.push(Param::new(format!("f{k}"), spectrum.freqs[i]).with_bounds(0.0, opts.f_max));
    }

    Ok(ToneGuess {
        params,
        spectrum,
        peaks: good,
    })
}

/// `A cos(2 pi f x + phi) + B`: peak-to-peak amplitude and dominant frequency.
///
/// Returns `[A, f, phi, B]`.
pub fn guess_cosine(x: &[f64], y: &[f64]) -> Vec<Param> {
    let a0 = finite_range(y).map(|(lo, hi)| (hi - lo).abs()).unwrap_or(0.0);
    let f0 = dominant_frequency(x, y).unwrap_or(0.0);
    vec![
        Param::new("A", a0).with_min(0.0),
        Param::new("f", f0).with_min(0.0),
        Param::new("phi", 0.0).with_bounds(-PI, PI),
        Param::new("B", 0.0),
    ]
}

/// `|f|` of the strongest non-DC bin of the full DFT.
fn dominant_frequency(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 || y.len() < 2 {
        return None;
    }
    let m = y.iter().sum::<f64>() / y.len() as f64;
    let centered: Vec<f64> = y.iter().map(|v| v - m).collect();
    let transform = dft(&centered);
    let freqs = fftfreq(y.len(), x[1] - x[0]);
    let mut best: Option<(usize, f64)> = None;
    for (k, c) in transform.iter().enumerate().skip(1) {
        let amp = c.norm();
        if best.is_none_or(|(_, b)| amp > b) {
            best = Some((k, amp));
        }
    }
    best.map(|(k, _)| freqs[k].abs())
}

fn endpoints(y: &[f64]) -> (f64, f64) {
    match (y.first(), y.last()) {
        (Some(a), Some(b)) => (*a, *b),
        _ => (f64::NAN, f64::NAN),
    }
}

fn crossing(x: &[f64], y: &[f64], level: f64) -> f64 {
    argmin_abs_diff(y, level)
        .and_then(|i| x.get(i).copied())
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::stats::linspace;

    #[test]
    fn decay_guess_lands_within_one_sample_of_tau() {
        let t1 = 30e-6;
        let x = linspace(0.0, 150e-6, 76);
        let y: Vec<f64> = x.iter().map(|v| 0.85 * (-v / t1).exp() + 0.05).collect();
        let p = guess_decay(&x, &y, "T1");
        let spacing = x[1] - x[0];
        assert!((p[1].value - t1).abs() <= spacing, "{}", p[1].value);
        assert_eq!(p[1].name, "T1");
        assert!((p[0].value - (y[0] - y[75])).abs() < 1e-12);
        assert_eq!(p[0].max, 1.0);
    }

    #[test]
    fn recovery_guess_uses_complementary_crossing() {
        let t2 = 12e-6;
        let x = linspace(0.0, 80e-6, 81);
        let y: Vec<f64> = x.iter().map(|v| 0.45 * (1.0 - (-v / t2).exp()) + 0.02).collect();
        let p = guess_recovery(&x, &y, "T2E");
        assert!((p[1].value - t2).abs() <= x[1] - x[0]);
        assert!((p[2].value - 0.02).abs() < 1e-12);
        assert_eq!(p[0].max, 0.5);
    }

    #[test]
    fn two_tone_signal_seeds_two_tones() {
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.5e-6).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&t| {
                (-t / 200e-6).exp()
                    * (0.3 * (2.0 * PI * 100e3 * t).cos() + 0.1 * (2.0 * PI * 250e3 * t).cos())
                    + 0.5
            })
            .collect();
        let guess = guess_damped_cosine(&x, &y, "T2R", &ToneOptions::default()).unwrap();
        assert_eq!(guess.peaks.len(), 2);
        let names: Vec<&str> = guess.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["T2R", "B", "A0", "f0", "A1", "f1"]);
        assert!((guess.params[3].value - 100e3).abs() < 1.0);
        assert!((guess.params[5].value - 250e3).abs() < 1.0);
        let amp_sum = guess.params[2].value + guess.params[4].value;
        assert!((amp_sum - 1.0).abs() < 1e-12);
        assert!(guess.params[2].value > guess.params[4].value);
    }

    #[test]
    fn tone_cap_limits_seeds() {
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.5e-6).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&t| 0.3 * (2.0 * PI * 100e3 * t).cos() + 0.25 * (2.0 * PI * 250e3 * t).cos())
            .collect();
        let opts = ToneOptions {
            max_tones: 1,
            ..Default::default()
        };
        let guess = guess_damped_cosine(&x, &y, "T2R", &opts).unwrap();
        assert_eq!(guess.params.len(), 4);
        assert!((guess.params[3].value - 100e3).abs() < 1.0);
        assert!((guess.params[2].value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flat_trace_has_no_tones() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 1e-6).collect();
        let y = vec![0.5; 50];
        let err = guess_damped_cosine(&x, &y, "T2R", &ToneOptions::default()).unwrap_err();
        assert_eq!(err, SkipReason::NoSpectralPeaks);
    }

    #[test]
    fn cosine_guess_finds_drive_period() {
        let x = linspace(0.0, 1.0, 51);
        let y: Vec<f64> = x.iter().map(|v| 0.2 * (2.0 * PI * 2.0 * v).cos() + 1.0).collect();
        let p = guess_cosine(&x, &y);
        assert!((p[0].value - 0.4).abs() < 1e-2);
        // 51 samples over 1.0 -> bins spaced by 1/(51*0.02) = 0.98
        assert!((p[1].value - 2.0).abs() < 0.5);
        assert_eq!(p[2].value, 0.0);
    }
}
