//! Per-qubit aggregation of fitted coherence traces.
//!
//! Traces are aligned by id. Every trace keeps its slot in the stored arrays;
//! traces that were skipped, produced a non-finite time constant or were
//! excluded by the operator are flagged and left out of the statistics.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::domain::{CoherenceSeries, Measurement, Qubit, QubitTrace};
use crate::error::AppError;
use crate::math::stats::{argmax, mean, std_dev};

/// Mean and population standard deviation of the included traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std: f64,
    pub included: usize,
    pub total: usize,
}

fn nan_or(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

/// Build the aligned series for `traces`, ordered by trace id.
///
/// `exclude` lists trace ids the operator rejected.
pub fn build_series(traces: &[QubitTrace], exclude: &[usize]) -> CoherenceSeries {
    let mut ordered: Vec<&QubitTrace> = traces.iter().collect();
    ordered.sort_by_key(|t| (t.id.unwrap_or(usize::MAX), t.timestamp));
    let start = ordered.first().map(|t| t.timestamp);

    let mut s = CoherenceSeries::default();
    for (pos, t) in ordered.iter().enumerate() {
        let fit = t.fit.as_ref();
        let value = nan_or(t.time_constant());
        let elapsed = start.map_or(0.0, |s0| (t.timestamp - s0).num_milliseconds().abs() as f64 / 1e3);
        let id = t.id.unwrap_or(pos);

        s.value.push(value);
        s.value_err.push(nan_or(t.time_constant_err()));
        s.timestamp.push(elapsed);
        s.trace_id.push(id as i64);
        s.a.push(nan_or(fit.and_then(|f| f.value("A"))));
        s.a_err.push(nan_or(fit.and_then(|f| f.stderr("A"))));
        s.b.push(nan_or(fit.and_then(|f| f.value("B"))));
        s.b_err.push(nan_or(fit.and_then(|f| f.stderr("B"))));
        s.is_excluded
            .push(t.skipped.is_some() || fit.is_none() || !value.is_finite() || exclude.contains(&id));
    }
    s
}

pub fn series_stats(series: &CoherenceSeries) -> Result<SeriesStats, AppError> {
    let included = series.included_values();
    let (Some(m), Some(sd)) = (mean(&included), std_dev(&included)) else {
        return Err(AppError::new(
            3,
            format!("No usable traces to aggregate ({} stored, all excluded).", series.len()),
        ));
    };
    Ok(SeriesStats {
        mean: m,
        std: sd,
        included: included.len(),
        total: series.len(),
    })
}

/// Aggregate fitted traces of one category into `qubit`.
///
/// T2 Ramsey keeps only the average and spread; T1 and T2 echo store the
/// full series.
pub fn aggregate_qubit(
    qubit: &mut Qubit,
    measurement: Measurement,
    traces: &[QubitTrace],
    exclude: &[usize],
) -> Result<SeriesStats, AppError> {
    let series = build_series(traces, exclude);
    let stats = series_stats(&series)?;
    log::info!(
        "{} {}: {} of {} traces included, mean {:.3e} s, std {:.3e} s.",
        qubit.name,
        measurement,
        stats.included,
        stats.total,
        stats.mean,
        stats.std
    );
    if qubit.f_q.is_none() {
        qubit.f_q = traces.iter().find_map(|t| t.qubit_frequency);
    }
    let stored = (measurement != Measurement::T2r).then_some(series);
    qubit.set_summary(measurement, stored, Some(stats.mean), Some(stats.std));
    Ok(stats)
}

/// Indices of a seeded random subsample of `values` for display.
///
/// The largest finite value is always kept; indices come back in increasing
/// order. `count` at or above the length returns every index.
pub fn subsample(values: &[f64], count: usize, seed: u64) -> Vec<usize> {
    if count >= values.len() {
        return (0..values.len()).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let keep = argmax(values);
    let pool: Vec<usize> = (0..values.len()).filter(|i| Some(*i) != keep).collect();
    let take = count.saturating_sub(usize::from(keep.is_some()));
    let mut picked: Vec<usize> = pool.choose_multiple(&mut rng, take).copied().collect();
    picked.extend(keep);
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticTrace, synthesize_series};
    use crate::domain::SkipReason;
    use crate::fit::{FitOptions, fit_qubit_traces};

    fn fitted_series(n: usize) -> Vec<QubitTrace> {
        let truth = SyntheticTrace::decay(0.8, 40e-6, 0.1);
        let mut traces = synthesize_series(Measurement::T1, &truth, n, 0.05, 21);
        for (i, t) in traces.iter_mut().enumerate() {
            t.id = Some(i);
        }
        fit_qubit_traces(&mut traces, &FitOptions::default());
        traces
    }

    #[test]
    fn mean_and_population_std_over_included() {
        let traces = fitted_series(4);
        let series = build_series(&traces, &[]);
        let values: Vec<f64> = traces.iter().map(|t| t.time_constant().unwrap()).collect();
        let m = values.iter().sum::<f64>() / 4.0;
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / 4.0;

        let stats = series_stats(&series).unwrap();
        assert!((stats.mean - m).abs() < 1e-15);
        assert!((stats.std - var.sqrt()).abs() < 1e-15);
        assert_eq!(series.timestamp, vec![0.0, 1200.0, 2400.0, 3600.0]);
        assert_eq!(series.trace_id, vec![0, 1, 2, 3]);
    }

    #[test]
    fn skipped_and_excluded_traces_stay_flagged() {
        let mut traces = fitted_series(4);
        traces[1].fit = None;
        traces[1].skipped = Some(SkipReason::NoSpectralPeaks);
        let series = build_series(&traces, &[3]);

        assert_eq!(series.len(), 4);
        assert_eq!(series.is_excluded, vec![false, true, false, true]);
        assert!(series.value[1].is_nan());
        let stats = series_stats(&series).unwrap();
        assert_eq!(stats.included, 2);
    }

    #[test]
    fn nothing_to_aggregate_is_insufficient_data() {
        let traces = fitted_series(2);
        let series = build_series(&traces, &[0, 1]);
        assert_eq!(series_stats(&series).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn ramsey_keeps_only_average() {
        let traces = fitted_series(3);
        let mut q = Qubit::new("Qsim");
        aggregate_qubit(&mut q, Measurement::T2r, &traces, &[]).unwrap();
        assert!(q.t2r_avg.is_some());
        assert!(q.t1.is_none());

        aggregate_qubit(&mut q, Measurement::T1, &traces, &[]).unwrap();
        assert_eq!(q.t1.as_ref().unwrap().len(), 3);
        assert_eq!(q.f_q, Some(4.5e9));
    }

    #[test]
    fn subsample_is_seeded_sorted_and_keeps_max() {
        let values: Vec<f64> = (0..50).map(|i| ((i * 37) % 50) as f64).collect();
        let max_idx = values.iter().position(|v| *v == 49.0).unwrap();
        let a = subsample(&values, 10, 4);
        let b = subsample(&values, 10, 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.contains(&max_idx));
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(subsample(&values, 60, 4).len(), 50);
    }
}
