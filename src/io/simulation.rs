//! Simulation tables keyed by resonator pitch.
//!
//! - `spr_sim.csv`: surface participation ratios and conductor width
//! - `<film_id>_inductance_sim.csv`: geometric resonance frequency and
//!   inductance, one row per (pitch, sheet inductance)
//!
//! Rows are matched on `round(pitch * 1e6)`; exactly one row must match.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::Resonator;
use crate::error::AppError;

pub const SPR_TABLE: &str = "spr_sim.csv";

#[derive(Debug, Clone, Deserialize)]
struct SprRow {
    #[serde(rename = "pitch (um)")]
    pitch_um: f64,
    #[serde(rename = "width (um)")]
    width_um: f64,
    p_ms: f64,
    p_ma: f64,
    p_sa: f64,
    p_sub: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct InductanceRow {
    #[serde(rename = "pitch (um)")]
    pitch_um: f64,
    #[serde(rename = "l_s (pH/sq)")]
    l_s: f64,
    #[serde(rename = "fr_geom (GHz)")]
    fr_geom_ghz: f64,
    #[serde(rename = "l (nH)")]
    l_nh: f64,
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, AppError> {
    let file = File::open(path).map_err(|e| AppError::file(path, "open simulation table", e))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| AppError::file(path, "parse simulation table", e))
}

fn pitch_um(r: &Resonator, path: &Path) -> Result<f64, AppError> {
    r.pitch
        .map(|p| (p * 1e6).round())
        .ok_or_else(|| AppError::new(2, format!("{}: pitch is required to look up '{}'.", r.name, path.display())))
}

fn single<T>(mut rows: Vec<T>, path: &Path, key: f64) -> Result<T, AppError> {
    match rows.len() {
        1 => Ok(rows.remove(0)),
        n => Err(AppError::new(
            2,
            format!("'{}': expected one row for pitch {key} um, found {n}.", path.display()),
        )),
    }
}

/// Fill width and participation ratios from `spr_sim.csv` in `folder`.
pub fn add_spr_metadata(r: &mut Resonator, folder: &Path) -> Result<(), AppError> {
    let path = folder.join(SPR_TABLE);
    let key = pitch_um(r, &path)?;
    let rows: Vec<SprRow> = read_rows::<SprRow>(&path)?
        .into_iter()
        .filter(|row| row.pitch_um == key)
        .collect();
    let row = single(rows, &path, key)?;
    r.width = Some(row.width_um * 1e-6);
    r.p_ms = Some(row.p_ms);
    r.p_ma = Some(row.p_ma);
    r.p_sa = Some(row.p_sa);
    r.p_sub = Some(row.p_sub);
    Ok(())
}

pub fn inductance_table(r: &Resonator, folder: &Path) -> Result<PathBuf, AppError> {
    let film = r.film_id().ok_or_else(|| {
        AppError::new(2, format!("{}: name has no film id (expected `R<n>_<film>_<freq>`).", r.name))
    })?;
    Ok(folder.join(format!("{film}_inductance_sim.csv")))
}

/// Fill `fr_geom` and `l_geom` from the zero-sheet-inductance row.
pub fn add_inductance_metadata(r: &mut Resonator, folder: &Path) -> Result<(), AppError> {
    let path = inductance_table(r, folder)?;
    let key = pitch_um(r, &path)?;
    let rows: Vec<InductanceRow> = read_rows::<InductanceRow>(&path)?
        .into_iter()
        .filter(|row| row.pitch_um == key && row.l_s == 0.0)
        .collect();
    let row = single(rows, &path, key)?;
    r.fr_geom = Some(row.fr_geom_ghz * 1e9);
    r.l_geom = Some(row.l_nh * 1e-9);
    Ok(())
}
