//! Formatted terminal output: fit reports, trace tables and device summaries.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::analysis::{KineticResult, RpmFit, SeriesStats, TlsFit, TlsSample};
use crate::domain::{FitRecord, Measurement, Qubit, QubitTrace, Resonator, ResonatorTrace};
use crate::fit::BatchSummary;

/// Correlations below this magnitude are left out of [`fit_report`].
pub const MIN_REPORTED_CORREL: f64 = 0.1;

/// Multi-line report of one fit, laid out like lmfit's `fit_report`.
pub fn fit_report(record: &FitRecord) -> String {
    let r = &record.result;
    let mut out = String::new();

    out.push_str("[[Model]]\n");
    out.push_str(&format!("    {}\n", record.model.display_name()));
    out.push_str("[[Fit Statistics]]\n");
    out.push_str("    # fitting method   = leastsq\n");
    out.push_str(&format!("    # function evals   = {}\n", r.nfev));
    out.push_str(&format!("    # data points      = {}\n", r.ndata));
    out.push_str(&format!("    # variables        = {}\n", r.nvarys));
    out.push_str(&format!("    chi-square         = {}\n", fmt_g(r.chisqr)));
    out.push_str(&format!("    reduced chi-square = {}\n", fmt_g(r.redchi)));
    if !r.converged {
        out.push_str(&format!("##  Warning: {}\n", r.message));
    }

    out.push_str("[[Variables]]\n");
    let width = r.params.iter().map(|p| p.name.len()).max().unwrap_or(0) + 1;
    for p in &r.params {
        let label = format!("{}:", p.name);
        let line = if !p.vary {
            format!("    {label:<width$} {} (fixed)", fmt_g(p.value), width = width)
        } else {
            match p.stderr {
                Some(err) => {
                    let pct = if p.value != 0.0 {
                        format!(" ({:.2}%)", (err / p.value).abs() * 100.0)
                    } else {
                        String::new()
                    };
                    format!(
                        "    {label:<width$} {} +/- {}{pct} (init = {})",
                        fmt_g(p.value),
                        fmt_g(err),
                        fmt_g(p.init),
                        width = width
                    )
                }
                None => format!(
                    "    {label:<width$} {} +/- None (init = {})",
                    fmt_g(p.value),
                    fmt_g(p.init),
                    width = width
                ),
            }
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let mut pairs: Vec<(String, String, f64)> = Vec::new();
    for (i, p) in r.params.iter().enumerate() {
        for q in &r.params[i + 1..] {
            if let Some(&c) = p.correl.get(&q.name) {
                if c.abs() >= MIN_REPORTED_CORREL {
                    pairs.push((p.name.clone(), q.name.clone(), c));
                }
            }
        }
    }
    if !pairs.is_empty() {
        pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
        out.push_str(&format!(
            "[[Correlations]] (unreported correlations are < {MIN_REPORTED_CORREL:.3})\n"
        ));
        for (a, b, c) in pairs {
            out.push_str(&format!("    C({a}, {b}) = {c:+.4}\n"));
        }
    }
    out
}

/// Per-trace table of a fitted qubit batch.
pub fn format_qubit_traces(measurement: Measurement, traces: &[QubitTrace]) -> String {
    let t = measurement.time_constant();
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>4} {:<28} {:>12} {:>12} {:>12} {:<10}",
            "id",
            "source",
            format!("{t} (us)"),
            "err (us)",
            "redchi",
            "status"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<4} {:-<28} {:-<12} {:-<12} {:-<12} {:-<10}", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for tr in traces {
        let status = match (&tr.skipped, &tr.fit) {
            (Some(_), _) => "skipped",
            (None, Some(f)) if !f.result.converged => "no-conv",
            (None, Some(_)) => "ok",
            (None, None) => "-",
        };
        out.push_str(
            format!(
                "{:>4} {:<28} {:>12} {:>12} {:>12} {:<10}",
                tr.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                truncate(&tr.source, 28),
                fmt_scaled(tr.time_constant(), 1e6),
                fmt_scaled(tr.time_constant_err(), 1e6),
                fmt_opt(tr.fit.as_ref().map(|f| f.result.redchi)),
                status
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// One-line batch outcome plus the skipped traces with their reasons.
pub fn format_batch(summary: &BatchSummary) -> String {
    let mut out = format!(
        "Fitted: {} | skipped: {}\n",
        summary.fitted,
        summary.skipped.len()
    );
    for (tag, reason) in &summary.skipped {
        out.push_str(&format!("  (skipped {tag}) {reason}\n"));
    }
    out
}

pub fn format_series_stats(measurement: Measurement, stats: &SeriesStats) -> String {
    format!(
        "{}: {:.3} +- {:.3} us ({} of {} traces)\n",
        measurement.label(),
        stats.mean * 1e6,
        stats.std * 1e6,
        stats.included,
        stats.total
    )
}

/// Summary of a qubit record; unset fields print as `-`.
pub fn format_qubit_summary(q: &Qubit) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Qubit {} ===\n", q.name));
    if let Some(design) = &q.design_name {
        out.push_str(&format!("Design: {design}\n"));
    }
    out.push_str(&format!(
        "f_q: {} GHz | f_r: {} GHz | delta: {} MHz\n",
        fmt_scaled(q.f_q, 1e-9),
        fmt_scaled(q.f_r, 1e-9),
        fmt_scaled(q.delta(), 1e-6)
    ));
    out.push_str(&format!(
        "T1:  {} +- {} us | Q: {} +- {}\n",
        fmt_scaled(q.t1_avg, 1e6),
        fmt_scaled(q.t1_avg_err, 1e6),
        fmt_opt(q.q_avg()),
        fmt_opt(q.q_avg_err())
    ));
    out.push_str(&format!(
        "T2E: {} +- {} us\n",
        fmt_scaled(q.t2e_avg, 1e6),
        fmt_scaled(q.t2e_avg_err, 1e6)
    ));
    out.push_str(&format!(
        "T2R: {} +- {} us\n",
        fmt_scaled(q.t2r_avg, 1e6),
        fmt_scaled(q.t2r_avg_err, 1e6)
    ));
    out
}

pub fn format_rpm(fit: &RpmFit, qubit_name: &str) -> String {
    format!(
        "=== RPM {qubit_name} ===\nA_g: {:.4e} +- {:.2e}\nA_e: {:.4e} +- {:.2e}\nT_qubit: {:.2} mK\n",
        fit.a_g.value,
        fit.a_g.std,
        fit.a_e.value,
        fit.a_e.std,
        fit.temperature.scale(1e3)
    )
}

/// Summary of a resonator record; unset fields print as `-`.
pub fn format_resonator_summary(r: &Resonator) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Resonator {} ===\n", r.name));
    if let Some(design) = &r.design_name {
        out.push_str(&format!("Design: {design}\n"));
    }
    out.push_str(&format!(
        "pitch: {} um | thickness: {} nm | length: {} um\n",
        fmt_scaled(r.pitch, 1e6),
        fmt_scaled(r.film_thickness, 1e9),
        fmt_scaled(r.length, 1e6)
    ));
    out.push_str(&format!(
        "p_ms: {} | p_sub: {} | fr_geom: {} GHz | L_geom: {} nH\n",
        fmt_opt(r.p_ms),
        fmt_opt(r.p_sub),
        fmt_scaled(r.fr_geom, 1e-9),
        fmt_scaled(r.l_geom, 1e9)
    ));
    let alpha = r.alpha_bare();
    let l_kin = r.l_kin();
    out.push_str(&format!(
        "fr_bare: {} GHz | alpha: {} +- {} | L_kin: {} +- {} nH\n",
        fmt_scaled(r.fr_bare, 1e-9),
        fmt_opt(alpha.map(|a| a.value)),
        fmt_opt(alpha.map(|a| a.std)),
        fmt_scaled(l_kin.map(|l| l.value), 1e9),
        fmt_scaled(l_kin.map(|l| l.std), 1e9)
    ));
    let (q, q_err) = r.q_tls0().map_or((None, None), |(v, e)| (Some(v), e));
    out.push_str(&format!("Q_TLS0: {} +- {}\n", fmt_opt(q), fmt_opt(q_err)));
    out
}

/// Per-sweep table of circle-fit results.
pub fn format_resonator_traces(traces: &[ResonatorTrace]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>4} {:>8} {:>8} {:>14} {:>12} {:>12} {:>12} {:<4}",
            "id", "P (dBm)", "T (mK)", "fr (GHz)", "Qi", "Ql", "|Qc|", "excl"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<4} {:-<8} {:-<8} {:-<14} {:-<12} {:-<12} {:-<12} {:-<4}",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for t in traces {
        let f = &t.fit;
        out.push_str(
            format!(
                "{:>4} {:>8} {:>8} {:>14} {:>12} {:>12} {:>12} {:<4}",
                t.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                t.power.map_or_else(|| "-".to_string(), |p| format!("{p:.1}")),
                t.temperature.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v * 1e3)),
                f.fr.map_or_else(|| "-".to_string(), |v| format!("{:.9}", v * 1e-9)),
                fmt_opt(f.qi),
                fmt_opt(f.ql),
                fmt_opt(f.abs_qc),
                if t.is_excluded() { "x" } else { "" }
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

pub fn format_kinetic(name: &str, k: &KineticResult) -> String {
    format!(
        "=== Kinetic inductance {name} ===\nfr_bare: {:.6} GHz\nalpha: {:.4}\nL_kin: {:.4} nH\n",
        k.fr_bare * 1e-9,
        k.alpha,
        k.l_kin.scale(1e9)
    )
}

pub fn format_tls_summary(samples: &[TlsSample], fit: &TlsFit) -> String {
    let mut out = String::new();
    out.push_str("=== TLS loss tangent ===\n");
    out.push_str(format!("{:<20} {:>12} {:>12} {:>12}", "resonator", "p_ms", "Q_TLS0", "err").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<20} {:-<12} {:-<12} {:-<12}", "", "", "", "").trim_end());
    out.push('\n');
    for s in samples {
        out.push_str(
            format!(
                "{:<20} {:>12.4e} {:>12.4e} {:>12.4e}",
                truncate(&s.name, 20),
                s.p_ms,
                s.q_tls0,
                s.q_tls0_err
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out.push_str(&format!(
        "\ntan_delta_surf: {} +- {}\n",
        fmt_g(fit.tan_delta_surf),
        fit.tan_delta_surf_err.map_or_else(|| "None".to_string(), fmt_g)
    ));
    out
}

/// Compact float formatting similar to `%g` with five significant digits.
fn fmt_g(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let a = v.abs();
    if a != 0.0 && !(1e-4..1e5).contains(&a) {
        format!("{v:.5e}")
    } else {
        let s = format!("{v:.5}");
        let s = s.trim_end_matches('0').trim_end_matches('.');
        if s.is_empty() || s == "-" { "0".to_string() } else { s.to_string() }
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.4e}"))
}

fn fmt_scaled(v: Option<f64>, k: f64) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{:.3}", x * k))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::math::{LmOptions, Param, minimize};

    #[test]
    fn resonator_summary_marks_unset_fields() {
        let mut r = Resonator::new("R70_F11_5p59");
        r.pitch = Some(10e-6);
        let txt = format_resonator_summary(&r);
        assert!(txt.starts_with("=== Resonator R70_F11_5p59 ===\n"));
        assert!(txt.contains("pitch: 10.000 um | thickness: - nm"));
        assert!(txt.contains("Q_TLS0: - +- -"));
    }

    fn line_fit() -> FitRecord {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0 + 0.01 * (v * 1.7).sin()).collect();
        let params = [Param::new("m", 1.0), Param::new("c", 0.0), Param::new("k", 3.0).fixed()];
        let result = minimize(
            &params,
            |p| x.iter().zip(&y).map(|(xi, yi)| p[0] * xi + p[1] - yi).collect(),
            &LmOptions::default(),
        )
        .unwrap();
        FitRecord {
            model: ModelKind::Decay,
            result,
        }
    }

    #[test]
    fn report_lists_sections_and_fixed_params() {
        let report = fit_report(&line_fit());
        assert!(report.starts_with("[[Model]]\n    exponential decay\n"));
        assert!(report.contains("# data points      = 20"));
        assert!(report.contains("# variables        = 2"));
        assert!(report.contains("    k: 3 (fixed)"));
        assert!(report.contains("    m: "));
        assert!(report.contains("+/-"));
        assert!(report.contains("C(m, c) = "));
    }

    #[test]
    fn compact_float_format() {
        assert_eq!(fmt_g(0.5), "0.5");
        assert_eq!(fmt_g(0.0), "0");
        assert_eq!(fmt_g(3.0), "3");
        assert_eq!(fmt_g(2.5e-6), "2.50000e-6");
    }

    #[test]
    fn unset_qubit_fields_print_as_dash() {
        let mut q = Qubit::new("Q6_4p69");
        q.f_q = Some(4.69e9);
        let s = format_qubit_summary(&q);
        assert!(s.contains("f_q: 4.690 GHz | f_r: - GHz | delta: - MHz"));
        assert!(s.contains("T1:  - +- - us"));
    }

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
