//! Command-line parsing for the `betata` analysis tool.
//!
//! Argument parsing and dispatch stay separate from the fitting and analysis
//! code; handlers live in [`crate::app`].

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::analysis::circle::CircleFitOptions;
use crate::analysis::tls::TlsOptions;
use crate::fit::{FitOptions, ToneOptions};
use crate::io::delimited::{HallBar, PPMS_FULL_RANGE_T_MAX};
use crate::plot::PlotFormat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "betata", version, about = "Superconducting qubit and resonator characterization")]
pub struct Cli {
    /// More log output (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit T1 decays of one qubit and update its summary file.
    #[command(name = "fit-t1")]
    FitT1(QubitFitArgs),
    /// Fit T2 echo recoveries of one qubit and update its summary file.
    #[command(name = "fit-t2e")]
    FitT2e(QubitFitArgs),
    /// Fit T2 Ramsey oscillations of one qubit and update its summary file.
    #[command(name = "fit-t2r")]
    FitT2r(QubitFitArgs),
    /// Effective qubit temperature from a readout-population measurement.
    Rpm(RpmArgs),
    /// Circle-fit the S21 sweeps of one resonator.
    #[command(name = "fit-s21")]
    FitS21(S21Args),
    /// Kinetic inductance of a circle-fitted resonator.
    Kinetic(KineticArgs),
    /// Surface loss tangent across resonators.
    Tls(TlsArgs),
    /// Resistivity versus temperature from PPMS exports.
    Ppms(PpmsArgs),
    /// XRD scan with tantalum reference peaks.
    Xrd(XrdArgs),
    /// Write synthetic trace containers.
    Simulate(SimulateArgs),
    /// Print a qubit or resonator summary file.
    Show(ShowArgs),
}

/// Figure and terminal output options.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Figure format (PNG figures carry no text).
    #[arg(long, value_enum, default_value_t = PlotFormat::Svg)]
    pub format: PlotFormat,

    /// Do not write figures.
    #[arg(long)]
    pub no_plots: bool,

    /// Figure folder (default: `$BETATA_OUT_DIR/plots/<name>`).
    #[arg(long, value_name = "DIR")]
    pub plot_dir: Option<PathBuf>,

    /// Print an ASCII quick-look of every trace.
    #[arg(long)]
    pub ascii: bool,

    /// Quick-look width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Quick-look height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct QubitFitArgs {
    /// Qubit name, e.g. `Q6_4p69`.
    pub name: String,

    /// Trace folder (default: `$BETATA_DATA_DIR/<name>/<t1|t2e|t2r>`).
    #[arg(long, value_name = "DIR")]
    pub traces: Option<PathBuf>,

    /// Qubit summary file (default: `$BETATA_OUT_DIR/qubits/<name>.json`).
    #[arg(long, value_name = "JSON")]
    pub device: Option<PathBuf>,

    /// Trace ids left out of the statistics (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<usize>,

    /// Keep Ramsey spectral peaks at or above this fraction of the largest.
    #[arg(long, default_value_t = 0.3)]
    pub tone_threshold: f64,

    /// Maximum number of Ramsey tones.
    #[arg(long, default_value_t = 4)]
    pub max_tones: usize,

    /// Upper bound of every Ramsey tone frequency (Hz).
    #[arg(long, default_value_t = 1e6)]
    pub f_max: f64,

    /// Export per-trace results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl QubitFitArgs {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            tones: ToneOptions {
                threshold: self.tone_threshold,
                max_tones: self.max_tones,
                f_max: self.f_max,
            },
            ..FitOptions::default()
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct RpmArgs {
    /// RPM trace container.
    pub file: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct S21Args {
    /// Resonator name, e.g. `R70_F11_5p59` (the film id is the second token).
    pub name: String,

    /// Sweep folder (default: `$BETATA_DATA_DIR/<name>/s21`).
    #[arg(long, value_name = "DIR")]
    pub traces: Option<PathBuf>,

    /// Resonator summary file (default: `$BETATA_OUT_DIR/resonators/<name>.json`).
    #[arg(long, value_name = "JSON")]
    pub device: Option<PathBuf>,

    /// Simulation tables (default: `$BETATA_DATA_DIR/simulation`).
    #[arg(long, value_name = "DIR")]
    pub sim_dir: Option<PathBuf>,

    /// Center-conductor pitch (um); stored and used for simulation lookups.
    #[arg(long)]
    pub pitch: Option<f64>,

    /// Film thickness (nm).
    #[arg(long)]
    pub film_thickness: Option<f64>,

    /// Resonator length (um).
    #[arg(long)]
    pub length: Option<f64>,

    /// Sweep ids flagged as excluded (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<usize>,

    /// Fraction of samples on each end used for the background.
    #[arg(long, default_value_t = 0.05)]
    pub edge_fraction: f64,

    /// Export per-sweep results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl S21Args {
    pub fn circle_options(&self) -> CircleFitOptions {
        CircleFitOptions {
            edge_fraction: self.edge_fraction,
            ..CircleFitOptions::default()
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct KineticArgs {
    /// Resonator name.
    pub name: String,

    /// Resonator summary file (default: `$BETATA_OUT_DIR/resonators/<name>.json`).
    #[arg(long, value_name = "JSON")]
    pub device: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TlsArgs {
    /// Folder of resonator summary files (default: `$BETATA_OUT_DIR/resonators`).
    #[arg(long, value_name = "DIR")]
    pub devices: Option<PathBuf>,

    /// Reject Q_TLS0 estimates whose relative error is at or above this.
    #[arg(long, default_value_t = 0.75)]
    pub rejection_threshold: f64,

    /// Keep films thicker than this (nm).
    #[arg(long, requires = "thickness_max")]
    pub thickness_min: Option<f64>,

    /// Keep films thinner than this (nm).
    #[arg(long, requires = "thickness_min")]
    pub thickness_max: Option<f64>,

    /// Substrate loss tangent (held fixed).
    #[arg(long)]
    pub tan_delta_sub: Option<f64>,

    /// Substrate participation (held fixed).
    #[arg(long)]
    pub p_sub: Option<f64>,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl TlsArgs {
    pub fn tls_options(&self) -> TlsOptions {
        let defaults = TlsOptions::default();
        TlsOptions {
            rejection_threshold: self.rejection_threshold,
            thickness_window: self.thickness_min.zip(self.thickness_max).map(|(lo, hi)| (lo * 1e-9, hi * 1e-9)),
            tan_delta_sub: self.tan_delta_sub.unwrap_or(defaults.tan_delta_sub),
            p_sub: self.p_sub.unwrap_or(defaults.p_sub),
            ..defaults
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct PpmsArgs {
    /// Sample name used in titles and file names.
    pub sample: String,

    /// Full-range (cool-down) export.
    #[arg(long, value_name = "CSV")]
    pub full_range: PathBuf,

    /// Low-temperature export.
    #[arg(long, value_name = "CSV")]
    pub low_temp: PathBuf,

    /// Full-range samples are kept below this temperature (K).
    #[arg(long, default_value_t = PPMS_FULL_RANGE_T_MAX)]
    pub t_max: f64,

    /// Film thickness (nm).
    #[arg(long, default_value_t = 240.0)]
    pub thickness: f64,

    /// Hall-bar length (um).
    #[arg(long, default_value_t = 370.0)]
    pub length: f64,

    /// Hall-bar width (um).
    #[arg(long, default_value_t = 25.0)]
    pub bar_width: f64,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl PpmsArgs {
    pub fn hall_bar(&self) -> HallBar {
        HallBar {
            thickness: self.thickness * 1e-9,
            length: self.length * 1e-6,
            width: self.bar_width * 1e-6,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct XrdArgs {
    /// Sample name used in titles and file names.
    pub sample: String,

    /// XRD export.
    pub file: PathBuf,

    /// Crop the scan to this 2-theta window (deg).
    #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
    pub crop: Option<Vec<f64>>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SimulateKind {
    T1,
    T2e,
    T2r,
    Rpm,
    S21,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[arg(value_enum)]
    pub kind: SimulateKind,

    /// Device name written into every trace.
    #[arg(long, default_value = "Qsim")]
    pub name: String,

    /// Output folder (default: `$BETATA_DATA_DIR/<name>/<kind>`).
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Number of traces (S21: number of powers).
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Qubit or resonator summary file.
    pub file: PathBuf,
}
