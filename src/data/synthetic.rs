//! Seeded synthetic traces.
//!
//! Used by the `simulate` command to produce a self-contained demo dataset and
//! by the tests. The same seed always produces the same samples.

use chrono::{Duration, NaiveDateTime};
use num_complex::Complex64;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Measurement, QubitTrace, ResonatorTrace, RpmTrace};
use crate::math::stats::linspace;
use crate::models::{HangerParams, cosine, damped_cosine, decay, recovery, s21};

/// Ground-truth curve used to generate a qubit trace.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticTrace {
    Decay { a: f64, t: f64, b: f64 },
    Recovery { a: f64, t: f64, b: f64 },
    /// Tones as `(amplitude, frequency)`.
    Ramsey { t: f64, b: f64, tones: Vec<(f64, f64)> },
}

impl SyntheticTrace {
    pub fn decay(a: f64, t: f64, b: f64) -> Self {
        Self::Decay { a, t, b }
    }

    pub fn recovery(a: f64, t: f64, b: f64) -> Self {
        Self::Recovery { a, t, b }
    }

    pub fn ramsey(t: f64, b: f64, tones: Vec<(f64, f64)>) -> Self {
        Self::Ramsey { t, b, tones }
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Decay { a, t, b } => decay(x, *a, *t, *b),
            Self::Recovery { a, t, b } => recovery(x, *a, *t, *b),
            Self::Ramsey { t, b, tones } => {
                let flat: Vec<f64> = tones.iter().flat_map(|(a, f)| [*a, *f]).collect();
                damped_cosine(x, *t, *b, &flat)
            }
        }
    }
}

/// Zero-mean Gaussian noise; a non-positive or non-finite spread is silent.
struct Noise(Option<Normal<f64>>);

impl Noise {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        self.0.as_ref().map_or(0.0, |d| d.sample(rng))
    }
}

fn noise(sd: f64) -> Noise {
    Noise((sd.is_finite() && sd > 0.0).then(|| Normal::new(0.0, sd).ok()).flatten())
}

fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Sample `truth` on `n` evenly spaced delays in `[0, x_max]` with Gaussian noise.
pub fn synthesize(
    measurement: Measurement,
    truth: &SyntheticTrace,
    n: usize,
    x_max: f64,
    noise_sd: f64,
    seed: u64,
) -> QubitTrace {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = noise(noise_sd);
    let tau = linspace(0.0, x_max, n);
    let population = tau.iter().map(|&x| truth.eval(x) + dist.sample(&mut rng)).collect();

    QubitTrace {
        measurement,
        source: format!("synthetic_{}_{seed}", measurement.key()),
        qubit_name: "Qsim".to_string(),
        qubit_frequency: Some(4.5e9),
        readout_frequency: Some(7.2e9),
        repetitions: Some(1000),
        timestamp: epoch() + Duration::minutes(seed as i64),
        id: None,
        tau,
        population,
        fit: None,
        skipped: None,
    }
}

/// A repeated measurement of one qubit: `count` traces, 20 minutes apart,
/// with the time constant jittered by `spread` (relative, 1 sigma).
pub fn synthesize_series(
    measurement: Measurement,
    truth: &SyntheticTrace,
    count: usize,
    spread: f64,
    seed: u64,
) -> Vec<QubitTrace> {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = noise(spread);
    let start = epoch() + Duration::days(20_000);
    (0..count)
        .map(|i| {
            let factor = (1.0 + jitter.sample(&mut rng)).max(0.2);
            let sample_truth = match truth {
                SyntheticTrace::Decay { a, t, b } => SyntheticTrace::decay(*a, t * factor, *b),
                SyntheticTrace::Recovery { a, t, b } => SyntheticTrace::recovery(*a, t * factor, *b),
                SyntheticTrace::Ramsey { t, b, tones } => SyntheticTrace::ramsey(t * factor, *b, tones.clone()),
            };
            let t_nominal = match truth {
                SyntheticTrace::Decay { t, .. }
                | SyntheticTrace::Recovery { t, .. }
                | SyntheticTrace::Ramsey { t, .. } => *t,
            };
            let sample_seed = seed + 1 + i as u64;
            let mut trace =
                synthesize(measurement, &sample_truth, 101, 5.0 * t_nominal, 0.015, sample_seed);
            trace.timestamp = start + Duration::minutes(20 * i as i64);
            trace.source = format!(
                "{}_{}",
                trace.timestamp.format("%Y-%m-%d_%H-%M-%S"),
                measurement.key()
            );
            trace
        })
        .collect()
}

/// Readout-population measurement with ground/excited amplitudes `a_g`, `a_e`.
pub fn synthesize_rpm(qubit_frequency: f64, a_g: f64, a_e: f64, seed: u64) -> RpmTrace {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = noise(2e-4);
    let amplitude = linspace(0.0, 1.0, 61);
    let offset = 0.01;
    let magnitude_g = amplitude
        .iter()
        .map(|&x| cosine(x, a_g, 1.0, 0.0, offset) + dist.sample(&mut rng))
        .collect();
    let magnitude_e = amplitude
        .iter()
        .map(|&x| cosine(x, a_e, 1.0, 0.0, offset) + dist.sample(&mut rng))
        .collect();
    RpmTrace {
        source: format!("synthetic_rpm_{seed}"),
        qubit_name: "Qsim".to_string(),
        qubit_frequency,
        repetitions: Some(1000),
        amplitude,
        magnitude_g,
        magnitude_e,
    }
}

/// Environment of a synthetic S21 sweep: cable delay and off-resonant background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct S21Environment {
    pub tau: f64,
    pub background_amp: f64,
    pub background_phase: f64,
    pub noise_sd: f64,
}

/// S21 sweep of `n` points across `span_linewidths * fr/Ql` around resonance.
pub fn synthesize_s21(
    params: &HangerParams,
    env: &S21Environment,
    n: usize,
    span_linewidths: f64,
    seed: u64,
) -> ResonatorTrace {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = noise(env.noise_sd);
    let half_span = 0.5 * span_linewidths * params.fr / params.ql;
    let frequency = linspace(params.fr - half_span, params.fr + half_span, n);
    let background = Complex64::from_polar(env.background_amp, env.background_phase);
    let s21_raw = frequency
        .iter()
        .map(|&f| {
            let delay = Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI * f * env.tau);
            let clean = background * s21(f, params) * delay;
            clean + Complex64::new(dist.sample(&mut rng), dist.sample(&mut rng))
        })
        .collect();

    ResonatorTrace {
        filename: format!("synthetic_s21_{seed}"),
        resonator_name: "Rsim".to_string(),
        frequency,
        s21: s21_raw,
        temperature: Some(0.012),
        temperature_err: Some(0.0002),
        power: Some(-45.0),
        tau: Some(env.tau),
        ..Default::default()
    }
}
