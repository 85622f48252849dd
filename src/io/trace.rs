//! Per-trace input containers written by the acquisition software.
//!
//! Qubit traces (`T1`, `T2E`, `T2R`):
//! attrs `qubit_name`, `qubit_frequency`, `readout_frequency`, `repetitions`,
//! `timestamp` (`%Y-%m-%d %H:%M:%S`); datasets `tau`, `population`.
//!
//! RPM traces: attrs `qubit_name`, `qubit_frequency`, `repetitions`; datasets
//! `amplitude` and the 2-D (repetition x amplitude) `I_g`, `Q_g`, `I_e`, `Q_e`.
//!
//! S21 traces: attrs `resonator_name`, `power`, `tau`; datasets `frequency`,
//! `s21real`, `s21imag`, `temperature` (mixing-chamber log during the sweep).

use std::path::Path;

use chrono::NaiveDateTime;
use num_complex::Complex64;

use crate::domain::{Measurement, QubitTrace, ResonatorTrace, RpmTrace, TIMESTAMP_FORMAT};
use crate::error::AppError;
use crate::io::container::{Dataset, Group, read_container, write_container};
use crate::io::records::container_files;
use crate::math::stats::{mean, std_dev};

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn required_f64s(g: &Group, path: &Path, key: &str) -> Result<Vec<f64>, AppError> {
    g.f64s(key).ok_or_else(|| AppError::missing_field(path, key))
}

fn required_str<'a>(g: &'a Group, path: &Path, key: &str) -> Result<&'a str, AppError> {
    g.attr_str(key).ok_or_else(|| AppError::missing_field(path, key))
}

/// Column means of a 2-D dataset of `sqrt(I^2 + Q^2)`.
fn mean_magnitude(i: &Dataset, q: &Dataset, path: &Path, label: &str) -> Result<Vec<f64>, AppError> {
    let (Some(i_rows), Some(q_rows)) = (i.rows(), q.rows()) else {
        return Err(AppError::new(2, format!("'{}': {label} is not numeric.", path.display())));
    };
    if i.shape != q.shape || i_rows.is_empty() {
        return Err(AppError::new(
            2,
            format!("'{}': {label} I/Q shapes differ or are empty.", path.display()),
        ));
    }
    let cols = i_rows[0].len();
    let mut out = vec![0.0; cols];
    for (ri, rq) in i_rows.iter().zip(&q_rows) {
        for (k, (a, b)) in ri.iter().zip(rq).enumerate() {
            out[k] += a.hypot(*b);
        }
    }
    let n = i_rows.len() as f64;
    Ok(out.into_iter().map(|v| v / n).collect())
}

pub fn load_qubit_trace(path: &Path, measurement: Measurement) -> Result<QubitTrace, AppError> {
    let g = read_container(path)?;
    let stamp = required_str(&g, path, "timestamp")?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).map_err(|e| {
        AppError::new(2, format!("'{}': bad timestamp `{stamp}`: {e}", path.display()))
    })?;
    let tau = required_f64s(&g, path, "tau")?;
    let population = required_f64s(&g, path, "population")?;
    if tau.len() != population.len() {
        return Err(AppError::new(
            2,
            format!(
                "'{}': tau has {} samples but population has {}.",
                path.display(),
                tau.len(),
                population.len()
            ),
        ));
    }

    Ok(QubitTrace {
        measurement,
        source: file_stem(path),
        qubit_name: required_str(&g, path, "qubit_name")?.to_string(),
        qubit_frequency: g.attr_f64("qubit_frequency"),
        readout_frequency: g.attr_f64("readout_frequency"),
        repetitions: g.attr_i64("repetitions"),
        timestamp,
        id: None,
        tau,
        population,
        fit: None,
        skipped: None,
    })
}

/// Load every qubit trace in `folder`; ids follow increasing timestamp.
pub fn load_qubit_traces(folder: &Path, measurement: Measurement) -> Result<Vec<QubitTrace>, AppError> {
    let mut traces = container_files(folder)?
        .iter()
        .map(|p| load_qubit_trace(p, measurement))
        .collect::<Result<Vec<_>, _>>()?;
    traces.sort_by_key(|t| t.timestamp);
    for (i, t) in traces.iter_mut().enumerate() {
        t.id = Some(i);
    }
    log::info!("Loaded {} {} traces from '{}'.", traces.len(), measurement, folder.display());
    Ok(traces)
}

pub fn load_rpm_trace(path: &Path) -> Result<RpmTrace, AppError> {
    let g = read_container(path)?;
    let amplitude = required_f64s(&g, path, "amplitude")?;
    let dataset = |key: &str| g.dataset(key).ok_or_else(|| AppError::missing_field(path, key));
    let magnitude_g = mean_magnitude(dataset("I_g")?, dataset("Q_g")?, path, "ground")?;
    let magnitude_e = mean_magnitude(dataset("I_e")?, dataset("Q_e")?, path, "excited")?;
    if magnitude_g.len() != amplitude.len() || magnitude_e.len() != amplitude.len() {
        return Err(AppError::new(
            2,
            format!("'{}': I/Q columns do not match the amplitude sweep.", path.display()),
        ));
    }
    Ok(RpmTrace {
        source: file_stem(path),
        qubit_name: required_str(&g, path, "qubit_name")?.to_string(),
        qubit_frequency: g
            .attr_f64("qubit_frequency")
            .ok_or_else(|| AppError::missing_field(path, "qubit_frequency"))?,
        repetitions: g.attr_i64("repetitions"),
        amplitude,
        magnitude_g,
        magnitude_e,
    })
}

pub fn load_raw_s21_trace(path: &Path) -> Result<ResonatorTrace, AppError> {
    let g = read_container(path)?;
    let frequency = required_f64s(&g, path, "frequency")?;
    let re = required_f64s(&g, path, "s21real")?;
    let im = required_f64s(&g, path, "s21imag")?;
    if re.len() != frequency.len() || im.len() != frequency.len() {
        return Err(AppError::new(
            2,
            format!("'{}': S21 arrays do not match the frequency axis.", path.display()),
        ));
    }
    let temperature = g.f64s("temperature").unwrap_or_default();

    Ok(ResonatorTrace {
        filename: file_stem(path),
        resonator_name: required_str(&g, path, "resonator_name")?.to_string(),
        id: None,
        frequency,
        s21: re.into_iter().zip(im).map(|(r, i)| Complex64::new(r, i)).collect(),
        temperature: mean(&temperature),
        temperature_err: std_dev(&temperature),
        power: g.attr_f64("power"),
        tau: g.attr_f64("tau"),
        ..Default::default()
    })
}

/// Decreasing power, then increasing temperature; unset values sort last.
pub fn sort_resonator_traces(traces: &mut [ResonatorTrace]) {
    traces.sort_by(|a, b| {
        let pa = a.power.map_or(f64::INFINITY, |p| -p);
        let pb = b.power.map_or(f64::INFINITY, |p| -p);
        let ta = a.temperature.unwrap_or(f64::INFINITY);
        let tb = b.temperature.unwrap_or(f64::INFINITY);
        pa.total_cmp(&pb).then(ta.total_cmp(&tb))
    });
    for (i, t) in traces.iter_mut().enumerate() {
        t.id = Some(i);
    }
}

pub fn load_raw_s21_traces(folder: &Path) -> Result<Vec<ResonatorTrace>, AppError> {
    let mut traces = container_files(folder)?
        .iter()
        .map(|p| load_raw_s21_trace(p))
        .collect::<Result<Vec<_>, _>>()?;
    sort_resonator_traces(&mut traces);
    log::info!("Loaded {} S21 traces from '{}'.", traces.len(), folder.display());
    Ok(traces)
}

pub fn write_qubit_trace(path: &Path, trace: &QubitTrace) -> Result<(), AppError> {
    let mut g = Group::default();
    g.set_attr("qubit_name", trace.qubit_name.as_str());
    g.set_attr("qubit_frequency", trace.qubit_frequency);
    g.set_attr("readout_frequency", trace.readout_frequency);
    g.set_attr("repetitions", trace.repetitions);
    g.set_attr("timestamp", trace.timestamp.format(TIMESTAMP_FORMAT).to_string());
    g.set_f64s("tau", trace.tau.clone());
    g.set_f64s("population", trace.population.clone());
    write_container(path, &g)
}

/// Write an RPM trace as a single-repetition I/Q record (`Q = 0`).
pub fn write_rpm_trace(path: &Path, trace: &RpmTrace) -> Result<(), AppError> {
    let cols = trace.amplitude.len();
    let mut g = Group::default();
    g.set_attr("qubit_name", trace.qubit_name.as_str());
    g.set_attr("qubit_frequency", trace.qubit_frequency);
    g.set_attr("repetitions", trace.repetitions);
    g.set_f64s("amplitude", trace.amplitude.clone());
    g.set_dataset("I_g", Dataset::matrix(1, cols, trace.magnitude_g.clone())?);
    g.set_dataset("Q_g", Dataset::matrix(1, cols, vec![0.0; cols])?);
    g.set_dataset("I_e", Dataset::matrix(1, cols, trace.magnitude_e.clone())?);
    g.set_dataset("Q_e", Dataset::matrix(1, cols, vec![0.0; cols])?);
    write_container(path, &g)
}

pub fn write_raw_s21_trace(path: &Path, trace: &ResonatorTrace) -> Result<(), AppError> {
    let mut g = Group::default();
    g.set_attr("resonator_name", trace.resonator_name.as_str());
    g.set_attr("power", trace.power);
    g.set_attr("tau", trace.tau);
    g.set_f64s("frequency", trace.frequency.clone());
    g.set_f64s("s21real", trace.s21.iter().map(|c| c.re).collect());
    g.set_f64s("s21imag", trace.s21.iter().map(|c| c.im).collect());
    if let Some(t) = trace.temperature {
        g.set_f64s("temperature", vec![t]);
    }
    write_container(path, &g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticTrace, synthesize_series};

    #[test]
    fn qubit_traces_get_ids_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let truth = SyntheticTrace::decay(0.8, 30e-6, 0.1);
        let series = synthesize_series(Measurement::T1, &truth, 3, 0.05, 2);
        // file names sort in reverse time order
        for (i, t) in series.iter().enumerate() {
            write_qubit_trace(&dir.path().join(format!("{}.json", 9 - i)), t).unwrap();
        }

        let loaded = load_qubit_traces(dir.path(), Measurement::T1).unwrap();
        assert_eq!(loaded.len(), 3);
        for (i, t) in loaded.iter().enumerate() {
            assert_eq!(t.id, Some(i));
            assert_eq!(t.timestamp, series[i].timestamp);
            assert_eq!(t.population, series[i].population);
        }
    }

    #[test]
    fn missing_population_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let mut g = Group::default();
        g.set_attr("qubit_name", "Q1");
        g.set_attr("timestamp", "2025-01-01 10:00:00");
        g.set_f64s("tau", vec![0.0, 1.0]);
        write_container(&path, &g).unwrap();

        let err = load_qubit_trace(&path, Measurement::T1).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("population"));
    }

    #[test]
    fn rpm_magnitude_is_mean_over_repetitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpm.json");
        let mut g = Group::default();
        g.set_attr("qubit_name", "Q6");
        g.set_attr("qubit_frequency", 4.69e9);
        g.set_f64s("amplitude", vec![0.0, 0.5]);
        g.set_dataset("I_g", Dataset::matrix(2, 2, vec![3.0, 0.0, 0.0, 1.0]).unwrap());
        g.set_dataset("Q_g", Dataset::matrix(2, 2, vec![4.0, 1.0, 2.0, 0.0]).unwrap());
        g.set_dataset("I_e", Dataset::matrix(2, 2, vec![1.0; 4]).unwrap());
        g.set_dataset("Q_e", Dataset::matrix(2, 2, vec![0.0; 4]).unwrap());
        write_container(&path, &g).unwrap();

        let t = load_rpm_trace(&path).unwrap();
        assert_eq!(t.magnitude_g, vec![3.5, 1.0]);
        assert_eq!(t.magnitude_e, vec![1.0, 1.0]);
    }

    #[test]
    fn s21_traces_sort_by_power_then_temperature() {
        let mk = |name: &str, power: f64, temperature: f64| ResonatorTrace {
            filename: name.to_string(),
            power: Some(power),
            temperature: Some(temperature),
            ..Default::default()
        };
        let mut traces = vec![
            mk("a", -60.0, 0.010),
            mk("b", -40.0, 0.100),
            mk("c", -40.0, 0.012),
            mk("d", -80.0, 0.010),
        ];
        sort_resonator_traces(&mut traces);
        let order: Vec<&str> = traces.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(order, ["c", "b", "a", "d"]);
        assert_eq!(traces[3].id, Some(3));
    }

    #[test]
    fn s21_temperature_log_reduces_to_mean_and_spread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s21.json");
        let mut g = Group::default();
        g.set_attr("resonator_name", "R1");
        g.set_attr("power", -45.0);
        g.set_f64s("frequency", vec![1.0, 2.0]);
        g.set_f64s("s21real", vec![1.0, 0.5]);
        g.set_f64s("s21imag", vec![0.0, 0.1]);
        g.set_f64s("temperature", vec![0.010, 0.014]);
        write_container(&path, &g).unwrap();

        let t = load_raw_s21_trace(&path).unwrap();
        assert!((t.temperature.unwrap() - 0.012).abs() < 1e-15);
        assert!((t.temperature_err.unwrap() - 0.002).abs() < 1e-15);
        assert!(t.tau.is_none());
        assert_eq!(t.s21[1], Complex64::new(0.5, 0.1));
    }
}
