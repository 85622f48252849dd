//! Qubit traces and the per-qubit summary record.

use chrono::NaiveDateTime;

use crate::domain::{FitRecord, Measurement, SkipReason};

/// Timestamp layout used by the acquisition software.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One population-versus-delay measurement (T1, T2 echo or T2 Ramsey).
#[derive(Debug, Clone)]
pub struct QubitTrace {
    pub measurement: Measurement,
    /// File stem the trace was loaded from.
    pub source: String,
    pub qubit_name: String,
    pub qubit_frequency: Option<f64>,
    pub readout_frequency: Option<f64>,
    pub repetitions: Option<i64>,
    pub timestamp: NaiveDateTime,
    /// Assigned after loading, by increasing timestamp.
    pub id: Option<usize>,
    /// Delay between preparation and readout (seconds).
    pub tau: Vec<f64>,
    /// Excited-state population.
    pub population: Vec<f64>,

    pub fit: Option<FitRecord>,
    pub skipped: Option<SkipReason>,
}

impl QubitTrace {
    /// Best-fit time constant, if the trace was fitted.
    pub fn time_constant(&self) -> Option<f64> {
        self.fit
            .as_ref()
            .and_then(|f| f.value(self.measurement.time_constant()))
    }

    pub fn time_constant_err(&self) -> Option<f64> {
        self.fit
            .as_ref()
            .and_then(|f| f.stderr(self.measurement.time_constant()))
    }

    /// Short label for logs: `T1Trace#3`.
    pub fn tag(&self) -> String {
        match self.id {
            Some(id) => format!("{}Trace#{id}", self.measurement.label()),
            None => format!("{}Trace({})", self.measurement.label(), self.source),
        }
    }
}

/// Readout-population measurement: e-f Rabi oscillations with the qubit
/// prepared in the ground and excited state.
#[derive(Debug, Clone)]
pub struct RpmTrace {
    pub source: String,
    pub qubit_name: String,
    pub qubit_frequency: f64,
    pub repetitions: Option<i64>,
    /// Drive amplitude of the e-f pulse (arbitrary units).
    pub amplitude: Vec<f64>,
    /// Mean readout magnitude `|I + iQ|` over repetitions, ground-state prep.
    pub magnitude_g: Vec<f64>,
    /// Same, excited-state prep.
    pub magnitude_e: Vec<f64>,
}

/// Per-trace fit results of one measurement category, aligned by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoherenceSeries {
    pub value: Vec<f64>,
    pub value_err: Vec<f64>,
    /// Elapsed seconds since the first trace of the collection.
    pub timestamp: Vec<f64>,
    pub trace_id: Vec<i64>,
    pub a: Vec<f64>,
    pub a_err: Vec<f64>,
    pub b: Vec<f64>,
    pub b_err: Vec<f64>,
    pub is_excluded: Vec<bool>,
}

impl CoherenceSeries {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Values of traces that count towards statistics.
    pub fn included_values(&self) -> Vec<f64> {
        self.value
            .iter()
            .zip(&self.is_excluded)
            .filter(|(v, excluded)| !**excluded && v.is_finite())
            .map(|(v, _)| *v)
            .collect()
    }
}

/// Design parameters and coherence summary of one qubit.
///
/// Every field except the name may be unset; unset fields are never written
/// over values already stored on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Qubit {
    pub name: String,
    pub design_name: Option<String>,

    pub f_q: Option<f64>,
    pub f_r: Option<f64>,
    pub chi: Option<f64>,
    pub kappa: Option<f64>,
    pub ej: Option<f64>,
    pub ec: Option<f64>,

    pub t1: Option<CoherenceSeries>,
    pub t1_avg: Option<f64>,
    pub t1_avg_err: Option<f64>,

    pub t2r_avg: Option<f64>,
    pub t2r_avg_err: Option<f64>,

    pub t2e: Option<CoherenceSeries>,
    pub t2e_avg: Option<f64>,
    pub t2e_avg_err: Option<f64>,
}

impl Qubit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Qubit-resonator detuning `|f_r - f_q|`.
    pub fn delta(&self) -> Option<f64> {
        Some((self.f_r? - self.f_q?).abs())
    }

    /// Quality factor `2 pi f_q T1_avg`.
    pub fn q_avg(&self) -> Option<f64> {
        Some(2.0 * std::f64::consts::PI * self.f_q? * self.t1_avg?)
    }

    pub fn q_avg_err(&self) -> Option<f64> {
        Some(2.0 * std::f64::consts::PI * self.f_q? * self.t1_avg_err?)
    }

    pub fn series(&self, measurement: Measurement) -> Option<&CoherenceSeries> {
        match measurement {
            Measurement::T1 => self.t1.as_ref(),
            Measurement::T2e => self.t2e.as_ref(),
            Measurement::T2r => None,
        }
    }

    /// Store aggregated results for one measurement category.
    ///
    /// T2 Ramsey keeps only the average and spread.
    pub fn set_summary(
        &mut self,
        measurement: Measurement,
        series: Option<CoherenceSeries>,
        avg: Option<f64>,
        avg_err: Option<f64>,
    ) {
        match measurement {
            Measurement::T1 => {
                self.t1 = series;
                self.t1_avg = avg;
                self.t1_avg_err = avg_err;
            }
            Measurement::T2e => {
                self.t2e = series;
                self.t2e_avg = avg;
                self.t2e_avg_err = avg_err;
            }
            Measurement::T2r => {
                self.t2r_avg = avg;
                self.t2r_avg_err = avg_err;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_quantities_need_primary_fields() {
        let mut q = Qubit::new("Q6_4p69");
        assert!(q.delta().is_none());
        assert!(q.q_avg().is_none());

        q.f_q = Some(4.69e9);
        q.f_r = Some(7.1e9);
        q.t1_avg = Some(100e-6);
        assert!((q.delta().unwrap() - 2.41e9).abs() < 1.0);
        let expected = 2.0 * std::f64::consts::PI * 4.69e9 * 100e-6;
        assert!((q.q_avg().unwrap() - expected).abs() < 1e-6);
        assert!(q.q_avg_err().is_none());
    }

    #[test]
    fn included_values_skip_flagged_and_nan() {
        let s = CoherenceSeries {
            value: vec![1.0, f64::NAN, 3.0, 4.0],
            is_excluded: vec![false, false, true, false],
            ..Default::default()
        };
        assert_eq!(s.included_values(), vec![1.0, 4.0]);
    }

    #[test]
    fn t2r_summary_has_no_series() {
        let mut q = Qubit::new("Q1");
        q.set_summary(Measurement::T2r, None, Some(20e-6), Some(2e-6));
        assert_eq!(q.t2r_avg, Some(20e-6));
        assert!(q.series(Measurement::T2r).is_none());
    }
}
