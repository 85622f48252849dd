//! Export per-trace fit results to CSV.
//!
//! One row per trace, skipped traces included with empty fit columns, so the
//! file lines up with the trace folder.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{QubitTrace, ResonatorTrace};
use crate::error::AppError;

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.10e}")).unwrap_or_default()
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| AppError::file(dir, "create directory", e))?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::file(path, "create export CSV", e))
}

/// Write `id,source,timestamp,<T>,<T>_err,A,A_err,B,B_err,redchi,status`.
pub fn write_qubit_results_csv(path: &Path, traces: &[QubitTrace]) -> Result<(), AppError> {
    let mut file = create(path)?;
    let write_err = |e: std::io::Error| AppError::file(path, "write export CSV", e);

    let t_name = traces
        .first()
        .map(|t| t.measurement.time_constant())
        .unwrap_or("T");
    writeln!(
        file,
        "id,source,timestamp,{t_name},{t_name}_err,A,A_err,B,B_err,redchi,status"
    )
    .map_err(write_err)?;

    for t in traces {
        let fit = t.fit.as_ref();
        let status = match &t.skipped {
            Some(reason) => format!("skipped: {reason}"),
            None if fit.is_some_and(|f| !f.result.converged) => "not converged".to_string(),
            None => "ok".to_string(),
        };
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},\"{}\"",
            t.id.map(|i| i.to_string()).unwrap_or_default(),
            t.source,
            t.timestamp,
            opt(t.time_constant()),
            opt(t.time_constant_err()),
            opt(fit.and_then(|f| f.value("A"))),
            opt(fit.and_then(|f| f.stderr("A"))),
            opt(fit.and_then(|f| f.value("B"))),
            opt(fit.and_then(|f| f.stderr("B"))),
            opt(fit.map(|f| f.result.redchi)),
            status,
        )
        .map_err(write_err)?;
    }
    file.flush().map_err(write_err)
}

/// Write the hanger-fit results of resonator traces.
pub fn write_resonator_results_csv(path: &Path, traces: &[ResonatorTrace]) -> Result<(), AppError> {
    let mut file = create(path)?;
    let write_err = |e: std::io::Error| AppError::file(path, "write export CSV", e);

    writeln!(
        file,
        "id,filename,power_dBm,temperature_K,fr,fr_err,Ql,Ql_err,absQc,absQc_err,phi,phi_err,Qi,Qi_err,is_excluded"
    )
    .map_err(write_err)?;
    for t in traces {
        let f = &t.fit;
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            t.id.map(|i| i.to_string()).unwrap_or_default(),
            t.filename,
            opt(t.power),
            opt(t.temperature),
            opt(f.fr),
            opt(f.fr_err),
            opt(f.ql),
            opt(f.ql_err),
            opt(f.abs_qc),
            opt(f.abs_qc_err),
            opt(f.phi),
            opt(f.phi_err),
            opt(f.qi),
            opt(f.qi_err),
            t.is_excluded(),
        )
        .map_err(write_err)?;
    }
    file.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Measurement, SkipReason};
    use crate::data::synthetic::{SyntheticTrace, synthesize};

    #[test]
    fn skipped_traces_keep_their_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/t2r.csv");
        let mut trace = synthesize(Measurement::T2r, &SyntheticTrace::ramsey(20e-6, 0.5, vec![]), 20, 40e-6, 0.0, 1);
        trace.id = Some(0);
        trace.skipped = Some(SkipReason::NoSpectralPeaks);
        write_qubit_results_csv(&path, &[trace]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,source,timestamp,T2R,T2R_err"));
        assert!(lines[1].starts_with("0,"));
        assert!(lines[1].ends_with("\"skipped: found no FFT peaks\""));
    }

    #[test]
    fn resonator_rows_have_all_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s21.csv");
        let trace = ResonatorTrace {
            filename: "a".to_string(),
            id: Some(2),
            ..Default::default()
        };
        write_resonator_results_csv(&path, &[trace]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row.split(',').count(), 15);
        assert!(row.ends_with(",false"));
    }
}
