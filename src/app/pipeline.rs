//! Shared analysis workflows behind the CLI handlers.
//!
//! Each workflow runs load -> fit -> aggregate -> persist and returns what it
//! computed; printing and figures are left to [`crate::app`].

use std::path::Path;

use crate::analysis::circle::CircleFitOptions;
use crate::analysis::kinetic::{KineticResult, apply_kinetic};
use crate::analysis::tls::{TlsFit, TlsOptions, TlsSample, collect_samples, fit_loss_tangent};
use crate::analysis::{SeriesStats, aggregate_qubit};
use crate::domain::{Measurement, Qubit, QubitTrace, Resonator, ResonatorTrace};
use crate::error::AppError;
use crate::fit::{BatchSummary, FitOptions, fit_qubit_traces, fit_resonator_traces};
use crate::io::simulation::{add_inductance_metadata, add_spr_metadata};
use crate::io::{
    load_qubit, load_qubit_traces, load_raw_s21_traces, load_resonator, load_resonators, save_fitted_traces,
    save_qubit, save_resonator,
};

/// Outputs of one qubit coherence run.
#[derive(Debug, Clone)]
pub struct QubitRun {
    pub qubit: Qubit,
    pub traces: Vec<QubitTrace>,
    pub batch: BatchSummary,
    pub stats: SeriesStats,
}

/// Fit every trace in `trace_dir`, aggregate into the qubit record at
/// `device` (created when missing) and save it additively.
pub fn run_qubit_fit(
    name: &str,
    measurement: Measurement,
    trace_dir: &Path,
    device: &Path,
    exclude: &[usize],
    opts: &FitOptions,
) -> Result<QubitRun, AppError> {
    let mut traces = load_qubit_traces(trace_dir, measurement)?;
    if traces.is_empty() {
        return Err(AppError::new(
            3,
            format!("No {measurement} traces in '{}'.", trace_dir.display()),
        ));
    }
    let batch = fit_qubit_traces(&mut traces, opts);

    let mut qubit = if device.exists() {
        load_qubit(device)?
    } else {
        Qubit::new(name)
    };
    let stats = aggregate_qubit(&mut qubit, measurement, &traces, exclude)?;
    save_qubit(device, &qubit)?;
    log::info!("Saved {} to '{}'.", qubit.name, device.display());

    Ok(QubitRun {
        qubit,
        traces,
        batch,
        stats,
    })
}

/// Design values supplied on the command line; unset fields keep what the
/// record already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResonatorDesign {
    /// m
    pub pitch: Option<f64>,
    /// m
    pub film_thickness: Option<f64>,
    /// m
    pub length: Option<f64>,
}

/// Outputs of one resonator circle-fit run.
#[derive(Debug, Clone)]
pub struct ResonatorRun {
    pub resonator: Resonator,
    pub traces: Vec<ResonatorTrace>,
    pub batch: BatchSummary,
}

pub fn run_s21_fit(
    name: &str,
    trace_dir: &Path,
    device: &Path,
    sim_dir: &Path,
    design: &ResonatorDesign,
    exclude: &[usize],
    opts: &CircleFitOptions,
) -> Result<ResonatorRun, AppError> {
    let mut traces = load_raw_s21_traces(trace_dir)?;
    if traces.is_empty() {
        return Err(AppError::new(3, format!("No S21 traces in '{}'.", trace_dir.display())));
    }
    let batch = fit_resonator_traces(&mut traces, opts);
    if !exclude.is_empty() {
        for t in &mut traces {
            t.is_excluded = Some(t.id.is_some_and(|id| exclude.contains(&id)));
        }
    }

    let mut resonator = if device.exists() {
        load_resonator(device)?.0
    } else {
        Resonator::new(name)
    };
    resonator.pitch = design.pitch.or(resonator.pitch);
    resonator.film_thickness = design.film_thickness.or(resonator.film_thickness);
    resonator.length = design.length.or(resonator.length);

    if resonator.pitch.is_some() && sim_dir.is_dir() {
        add_spr_metadata(&mut resonator, sim_dir)?;
        add_inductance_metadata(&mut resonator, sim_dir)?;
    } else {
        log::info!("{}: no pitch or simulation folder; simulated metadata left unset.", resonator.name);
    }

    save_resonator(device, &resonator)?;
    save_fitted_traces(device, &traces)?;
    log::info!("Saved {} with {} sweeps to '{}'.", resonator.name, traces.len(), device.display());

    Ok(ResonatorRun {
        resonator,
        traces,
        batch,
    })
}

/// Kinetic inductance from the stored fitted sweeps; the record is updated.
pub fn run_kinetic(device: &Path) -> Result<(Resonator, KineticResult), AppError> {
    let (mut resonator, traces) = load_resonator(device)?;
    let result = apply_kinetic(&mut resonator, &traces)?;
    save_resonator(device, &resonator)?;
    Ok((resonator, result))
}

/// Loss-tangent fit across every resonator record in `folder`.
pub fn run_tls(folder: &Path, opts: &TlsOptions) -> Result<(Vec<TlsSample>, TlsFit), AppError> {
    let resonators: Vec<Resonator> = load_resonators(folder)?.into_iter().map(|(r, _)| r).collect();
    log::info!("Loaded {} resonator records from '{}'.", resonators.len(), folder.display());
    let samples = collect_samples(&resonators, opts);
    let fit = fit_loss_tangent(&samples, opts)?;
    Ok((samples, fit))
}
