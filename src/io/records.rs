//! Device records (qubit and resonator summaries) on top of the container.
//!
//! Schema, qubit file:
//!
//! ```text
//! /                  name, design_name, f_q, f_r, chi, kappa, Ej, Ec,
//!                    t1_avg(_err), t2r_avg(_err), t2e_avg(_err)
//! /t1, /t2e          {p}, {p}_err, {p}_timestamp, {p}_trace_id,
//!                    {p}_A(_err), {p}_B(_err), {p}_is_excluded
//! ```
//!
//! Schema, resonator file:
//!
//! ```text
//! /                  name, type, design_name, cooldown_name, film_thickness,
//!                    pitch, length, width, fr_geom, l_geom, p_ms, p_ma, p_sa,
//!                    p_sub, line_attenuation, fr_bare; dataset
//!                    qpt_fit_trace_ids
//! /qpt_fit_params/K  value, stderr; /correl: other -> coefficient
//! /traces/<file>     fitted trace attributes
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::{
    CoherenceSeries, Measurement, Qubit, Resonator, ResonatorFit, ResonatorTrace, StoredParam,
};
use crate::error::AppError;
use crate::io::container::{AttrValue, Group, read_container, save_merged};

const QUBIT_SERIES: [Measurement; 2] = [Measurement::T1, Measurement::T2e];

/// Encode a qubit summary. Unset fields become `empty`; unset series are
/// omitted so stored arrays are kept.
pub fn qubit_to_group(q: &Qubit) -> Group {
    let mut g = Group::default();
    g.set_attr("name", q.name.as_str());
    g.set_attr("design_name", q.design_name.clone());
    g.set_attr("f_q", q.f_q);
    g.set_attr("f_r", q.f_r);
    g.set_attr("chi", q.chi);
    g.set_attr("kappa", q.kappa);
    g.set_attr("Ej", q.ej);
    g.set_attr("Ec", q.ec);
    g.set_attr("t1_avg", q.t1_avg);
    g.set_attr("t1_avg_err", q.t1_avg_err);
    g.set_attr("t2r_avg", q.t2r_avg);
    g.set_attr("t2r_avg_err", q.t2r_avg_err);
    g.set_attr("t2e_avg", q.t2e_avg);
    g.set_attr("t2e_avg_err", q.t2e_avg_err);

    for m in QUBIT_SERIES {
        if let Some(series) = q.series(m) {
            *g.require_group(m.key()) = series_to_group(m.key(), series);
        }
    }
    g
}

fn series_to_group(p: &str, s: &CoherenceSeries) -> Group {
    let mut g = Group::default();
    g.set_f64s(p, s.value.clone());
    g.set_f64s(&format!("{p}_err"), s.value_err.clone());
    g.set_f64s(&format!("{p}_timestamp"), s.timestamp.clone());
    g.set_i64s(&format!("{p}_trace_id"), s.trace_id.clone());
    g.set_f64s(&format!("{p}_A"), s.a.clone());
    g.set_f64s(&format!("{p}_A_err"), s.a_err.clone());
    g.set_f64s(&format!("{p}_B"), s.b.clone());
    g.set_f64s(&format!("{p}_B_err"), s.b_err.clone());
    g.set_bools(&format!("{p}_is_excluded"), s.is_excluded.clone());
    g
}

fn series_from_group(p: &str, g: &Group) -> Option<CoherenceSeries> {
    let value = g.f64s(p)?;
    let n = value.len();
    let floats = |key: String| g.f64s(&key).unwrap_or_else(|| vec![f64::NAN; n]);
    Some(CoherenceSeries {
        value_err: floats(format!("{p}_err")),
        timestamp: floats(format!("{p}_timestamp")),
        trace_id: g
            .i64s(&format!("{p}_trace_id"))
            .unwrap_or_else(|| (0..n as i64).collect()),
        a: floats(format!("{p}_A")),
        a_err: floats(format!("{p}_A_err")),
        b: floats(format!("{p}_B")),
        b_err: floats(format!("{p}_B_err")),
        is_excluded: g
            .bools(&format!("{p}_is_excluded"))
            .unwrap_or_else(|| vec![false; n]),
        value,
    })
}

/// Decode a qubit summary; `name` is required.
pub fn qubit_from_group(g: &Group, path: &Path) -> Result<Qubit, AppError> {
    let name = g
        .attr_str("name")
        .ok_or_else(|| AppError::missing_field(path, "name"))?;
    Ok(Qubit {
        name: name.to_string(),
        design_name: g.attr_str("design_name").map(str::to_string),
        f_q: g.attr_f64("f_q"),
        f_r: g.attr_f64("f_r"),
        chi: g.attr_f64("chi"),
        kappa: g.attr_f64("kappa"),
        ej: g.attr_f64("Ej"),
        ec: g.attr_f64("Ec"),
        t1: g.group("t1").and_then(|s| series_from_group("t1", s)),
        t1_avg: g.attr_f64("t1_avg"),
        t1_avg_err: g.attr_f64("t1_avg_err"),
        t2r_avg: g.attr_f64("t2r_avg"),
        t2r_avg_err: g.attr_f64("t2r_avg_err"),
        t2e: g.group("t2e").and_then(|s| series_from_group("t2e", s)),
        t2e_avg: g.attr_f64("t2e_avg"),
        t2e_avg_err: g.attr_f64("t2e_avg_err"),
    })
}

pub fn save_qubit(path: &Path, q: &Qubit) -> Result<(), AppError> {
    save_merged(path, qubit_to_group(q))
}

pub fn load_qubit(path: &Path) -> Result<Qubit, AppError> {
    qubit_from_group(&read_container(path)?, path)
}

/// Container files (`*.json`) in `folder`, sorted by name.
pub fn container_files(folder: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries =
        std::fs::read_dir(folder).map_err(|e| AppError::file(folder, "list folder", e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn load_qubits(folder: &Path) -> Result<Vec<Qubit>, AppError> {
    container_files(folder)?.iter().map(|p| load_qubit(p)).collect()
}

fn stored_params_to_group(params: &BTreeMap<String, StoredParam>) -> Group {
    let mut g = Group::default();
    for (name, p) in params {
        let child = g.require_group(name);
        child.set_attr("value", p.value);
        child.set_attr("stderr", p.stderr);
        if !p.correl.is_empty() {
            let correl = child.require_group("correl");
            for (other, c) in &p.correl {
                correl.set_attr(other, *c);
            }
        }
    }
    g
}

fn stored_params_from_group(g: &Group) -> BTreeMap<String, StoredParam> {
    g.groups
        .iter()
        .map(|(name, child)| {
            let correl = child
                .group("correl")
                .map(|c| {
                    c.attrs
                        .keys()
                        .filter_map(|k| c.attr_f64(k).map(|v| (k.clone(), v)))
                        .collect()
                })
                .unwrap_or_default();
            let param = StoredParam {
                value: child.attr_f64("value"),
                stderr: child.attr_f64("stderr"),
                correl,
            };
            (name.clone(), param)
        })
        .collect()
}

/// Encode a resonator record (without traces).
pub fn resonator_to_group(r: &Resonator) -> Group {
    let mut g = Group::default();
    g.set_attr("name", r.name.as_str());
    g.set_attr("type", r.kind.clone());
    g.set_attr("design_name", r.design_name.clone());
    g.set_attr("cooldown_name", r.cooldown_name.clone());
    g.set_attr("film_thickness", r.film_thickness);
    g.set_attr("pitch", r.pitch);
    g.set_attr("length", r.length);
    g.set_attr("width", r.width);
    g.set_attr("fr_geom", r.fr_geom);
    g.set_attr("l_geom", r.l_geom);
    g.set_attr("p_ms", r.p_ms);
    g.set_attr("p_ma", r.p_ma);
    g.set_attr("p_sa", r.p_sa);
    g.set_attr("p_sub", r.p_sub);
    g.set_attr("line_attenuation", r.line_attenuation);
    g.set_attr("fr_bare", r.fr_bare);
    if let Some(params) = &r.qpt_fit_params {
        *g.require_group("qpt_fit_params") = stored_params_to_group(params);
    }
    if let Some(ids) = &r.qpt_fit_trace_ids {
        g.set_i64s("qpt_fit_trace_ids", ids.clone());
    }
    g
}

pub fn resonator_from_group(g: &Group, path: &Path) -> Result<Resonator, AppError> {
    let name = g
        .attr_str("name")
        .ok_or_else(|| AppError::missing_field(path, "name"))?;
    Ok(Resonator {
        name: name.to_string(),
        kind: g.attr_str("type").map(str::to_string),
        design_name: g.attr_str("design_name").map(str::to_string),
        cooldown_name: g.attr_str("cooldown_name").map(str::to_string),
        film_thickness: g.attr_f64("film_thickness"),
        pitch: g.attr_f64("pitch"),
        length: g.attr_f64("length"),
        width: g.attr_f64("width"),
        fr_geom: g.attr_f64("fr_geom"),
        l_geom: g.attr_f64("l_geom"),
        p_ms: g.attr_f64("p_ms"),
        p_ma: g.attr_f64("p_ma"),
        p_sa: g.attr_f64("p_sa"),
        p_sub: g.attr_f64("p_sub"),
        line_attenuation: g.attr_f64("line_attenuation"),
        fr_bare: g.attr_f64("fr_bare"),
        qpt_fit_params: g.group("qpt_fit_params").map(stored_params_from_group),
        qpt_fit_trace_ids: g.i64s("qpt_fit_trace_ids"),
    })
}

/// Fit outputs are written as a unit: an unavailable value is stored as NaN
/// (`null`), so a re-fit replaces every value and error an earlier fit left.
fn set_fit_attr(g: &mut Group, key: &str, value: Option<f64>) {
    g.set_attr(key, value.unwrap_or(f64::NAN));
}

fn fit_attr(g: &Group, key: &str) -> Option<f64> {
    g.attr_f64(key).filter(|v| v.is_finite())
}

/// Fitted-trace attributes (raw arrays are not stored in the device file).
pub fn fitted_trace_to_group(t: &ResonatorTrace) -> Group {
    let mut g = Group::default();
    let f = &t.fit;
    g.set_attr("resonator_name", t.resonator_name.as_str());
    g.set_attr("id", t.id.map(|i| i as i64));
    g.set_attr("temperature", t.temperature);
    g.set_attr("temperature_err", t.temperature_err);
    g.set_attr("power", t.power);
    g.set_attr("tau", t.tau);
    set_fit_attr(&mut g, "background_amp", f.background_amp);
    set_fit_attr(&mut g, "background_phase", f.background_phase);
    set_fit_attr(&mut g, "fr", f.fr);
    set_fit_attr(&mut g, "fr_err", f.fr_err);
    set_fit_attr(&mut g, "Qi", f.qi);
    set_fit_attr(&mut g, "Qi_err", f.qi_err);
    set_fit_attr(&mut g, "Ql", f.ql);
    set_fit_attr(&mut g, "Ql_err", f.ql_err);
    set_fit_attr(&mut g, "absQc", f.abs_qc);
    set_fit_attr(&mut g, "absQc_err", f.abs_qc_err);
    set_fit_attr(&mut g, "phi", f.phi);
    set_fit_attr(&mut g, "phi_err", f.phi_err);
    g.set_attr("is_excluded", t.is_excluded);
    g
}

pub fn fitted_trace_from_group(filename: &str, g: &Group) -> ResonatorTrace {
    ResonatorTrace {
        filename: filename.to_string(),
        resonator_name: g.attr_str("resonator_name").unwrap_or_default().to_string(),
        id: g.attr_i64("id").and_then(|i| usize::try_from(i).ok()),
        temperature: g.attr_f64("temperature"),
        temperature_err: g.attr_f64("temperature_err"),
        power: g.attr_f64("power"),
        tau: g.attr_f64("tau"),
        fit: ResonatorFit {
            background_amp: fit_attr(g, "background_amp"),
            background_phase: fit_attr(g, "background_phase"),
            fr: fit_attr(g, "fr"),
            fr_err: fit_attr(g, "fr_err"),
            qi: fit_attr(g, "Qi"),
            qi_err: fit_attr(g, "Qi_err"),
            ql: fit_attr(g, "Ql"),
            ql_err: fit_attr(g, "Ql_err"),
            abs_qc: fit_attr(g, "absQc"),
            abs_qc_err: fit_attr(g, "absQc_err"),
            phi: fit_attr(g, "phi"),
            phi_err: fit_attr(g, "phi_err"),
        },
        is_excluded: g.attr_bool("is_excluded"),
        ..Default::default()
    }
}

pub fn save_resonator(path: &Path, r: &Resonator) -> Result<(), AppError> {
    save_merged(path, resonator_to_group(r))
}

/// Save fitted traces under `/traces/<filename>`.
pub fn save_fitted_traces(path: &Path, traces: &[ResonatorTrace]) -> Result<(), AppError> {
    let mut root = Group::default();
    let group = root.require_group("traces");
    for t in traces {
        *group.require_group(&t.filename) = fitted_trace_to_group(t);
    }
    save_merged(path, root)
}

/// Load a resonator record and its fitted traces (sorted by id).
pub fn load_resonator(path: &Path) -> Result<(Resonator, Vec<ResonatorTrace>), AppError> {
    let root = read_container(path)?;
    let resonator = resonator_from_group(&root, path)?;
    let mut traces: Vec<ResonatorTrace> = root
        .group("traces")
        .map(|g| {
            g.groups
                .iter()
                .map(|(name, child)| fitted_trace_from_group(name, child))
                .collect()
        })
        .unwrap_or_default();
    traces.sort_by_key(|t| t.id.unwrap_or(usize::MAX));
    Ok((resonator, traces))
}

pub fn load_resonators(folder: &Path) -> Result<Vec<(Resonator, Vec<ResonatorTrace>)>, AppError> {
    container_files(folder)?.iter().map(|p| load_resonator(p)).collect()
}

/// Mark trace ids as excluded in an existing resonator file.
pub fn set_excluded(path: &Path, ids: &[usize]) -> Result<usize, AppError> {
    let (_, traces) = load_resonator(path)?;
    let mut root = Group::default();
    let group = root.require_group("traces");
    let mut changed = 0;
    for t in traces {
        if let Some(id) = t.id {
            let excluded = ids.contains(&id);
            group
                .require_group(&t.filename)
                .set_attr("is_excluded", AttrValue::Bool(excluded));
            changed += usize::from(excluded);
        }
    }
    save_merged(path, root)?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::container::read_container;

    fn sample_qubit() -> Qubit {
        let mut q = Qubit::new("Q6_4p69");
        q.design_name = Some("xmon_v3".to_string());
        q.f_q = Some(4.690_123e9);
        q.chi = None;
        q.t1 = Some(CoherenceSeries {
            value: vec![40e-6, 42.5e-6],
            value_err: vec![1e-6, 1.2e-6],
            timestamp: vec![0.0, 1200.0],
            trace_id: vec![0, 1],
            a: vec![0.8, 0.79],
            a_err: vec![0.01, 0.01],
            b: vec![0.1, 0.11],
            b_err: vec![0.005, 0.006],
            is_excluded: vec![false, true],
        });
        q.t1_avg = Some(40e-6);
        q
    }

    #[test]
    fn qubit_round_trip_keeps_unset_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Q6.json");
        let q = sample_qubit();
        save_qubit(&path, &q).unwrap();

        let back = load_qubit(&path).unwrap();
        assert_eq!(back, q);
        assert!(back.chi.is_none());
        assert!(back.t2e.is_none());
        assert_eq!(back.f_q.unwrap().to_bits(), 4.690_123e9f64.to_bits());
    }

    #[test]
    fn partial_qubit_save_keeps_stored_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Q6.json");
        save_qubit(&path, &sample_qubit()).unwrap();

        let mut update = Qubit::new("Q6_4p69");
        update.t2r_avg = Some(18e-6);
        save_qubit(&path, &update).unwrap();

        let back = load_qubit(&path).unwrap();
        assert_eq!(back.t2r_avg, Some(18e-6));
        assert_eq!(back.f_q, Some(4.690_123e9));
        assert_eq!(back.t1.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn missing_name_is_an_input_error() {
        let err = qubit_from_group(&Group::default(), Path::new("x.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn resonator_and_traces_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R70_F11_5p59.json");

        let mut r = Resonator::new("R70_F11_5p59");
        r.kind = Some("cpw".to_string());
        r.film_thickness = Some(200e-9);
        r.p_ms = Some(4.2e-4);
        let mut params = BTreeMap::new();
        let mut correl = BTreeMap::new();
        correl.insert("delta_QP0".to_string(), -0.31);
        params.insert(
            "Q_TLS0".to_string(),
            StoredParam {
                value: Some(1.5e6),
                stderr: Some(2e5),
                correl,
            },
        );
        r.qpt_fit_params = Some(params);
        r.qpt_fit_trace_ids = Some(vec![0, 1, 4]);
        save_resonator(&path, &r).unwrap();

        let trace = ResonatorTrace {
            filename: "2025-01-10_R70_m40dBm".to_string(),
            resonator_name: r.name.clone(),
            id: Some(3),
            power: Some(-40.0),
            temperature: Some(0.012),
            fit: ResonatorFit {
                fr: Some(5.59e9),
                qi: Some(1.2e6),
                ..Default::default()
            },
            is_excluded: Some(false),
            ..Default::default()
        };
        save_fitted_traces(&path, &[trace]).unwrap();

        let (back, traces) = load_resonator(&path).unwrap();
        assert_eq!(back, r);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].id, Some(3));
        assert_eq!(traces[0].fit.fr, Some(5.59e9));
        assert!(traces[0].fit.ql.is_none());

        let raw = read_container(&path).unwrap();
        let correl = raw.group("qpt_fit_params").unwrap().group("Q_TLS0").unwrap().group("correl");
        assert_eq!(correl.unwrap().attr_f64("delta_QP0"), Some(-0.31));
    }

    #[test]
    fn refit_without_errors_clears_stored_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R1_F1_5p0.json");
        save_resonator(&path, &Resonator::new("R1_F1_5p0")).unwrap();
        let mut trace = ResonatorTrace {
            filename: "sweep0".to_string(),
            id: Some(0),
            fit: ResonatorFit {
                fr: Some(5.0e9),
                fr_err: Some(1e3),
                qi: Some(1e6),
                qi_err: Some(5e4),
                ..Default::default()
            },
            is_excluded: Some(true),
            ..Default::default()
        };
        save_fitted_traces(&path, std::slice::from_ref(&trace)).unwrap();

        trace.fit = ResonatorFit {
            fr: Some(5.1e9),
            qi: Some(2e6),
            ..Default::default()
        };
        trace.is_excluded = None;
        save_fitted_traces(&path, &[trace]).unwrap();

        let (_, back) = load_resonator(&path).unwrap();
        let fit = back[0].fit;
        assert_eq!(fit.fr, Some(5.1e9));
        assert_eq!(fit.fr_err, None);
        assert_eq!(fit.qi, Some(2e6));
        assert_eq!(fit.qi_err, None);
        // not part of the fit: kept from the first save
        assert_eq!(back[0].is_excluded, Some(true));
    }

    #[test]
    fn kinetic_fraction_tracks_refreshed_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R1_F1_5p0.json");
        let mut r = Resonator::new("R1_F1_5p0");
        r.fr_geom = Some(6.0e9);
        r.l_geom = Some(2.0e-9);
        r.fr_bare = Some(4.8e9);
        save_resonator(&path, &r).unwrap();

        let mut refreshed = Resonator::new("R1_F1_5p0");
        refreshed.fr_geom = Some(5.0e9);
        save_resonator(&path, &refreshed).unwrap();

        let (back, _) = load_resonator(&path).unwrap();
        assert_eq!(back.fr_bare, Some(4.8e9));
        assert!((back.alpha_bare().unwrap().value - 0.0784).abs() < 1e-12);
    }

    #[test]
    fn exclusion_flags_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R1_F1_5p0.json");
        save_resonator(&path, &Resonator::new("R1_F1_5p0")).unwrap();
        let traces: Vec<ResonatorTrace> = (0..3)
            .map(|i| ResonatorTrace {
                filename: format!("t{i}"),
                id: Some(i),
                ..Default::default()
            })
            .collect();
        save_fitted_traces(&path, &traces).unwrap();

        assert_eq!(set_excluded(&path, &[1]).unwrap(), 1);
        let (_, back) = load_resonator(&path).unwrap();
        let flags: Vec<bool> = back.iter().map(ResonatorTrace::is_excluded).collect();
        assert_eq!(flags, vec![false, true, false]);
    }
}
