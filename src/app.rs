//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main:
//! - parses CLI arguments and sets up logging
//! - resolves folders from the environment
//! - runs the analysis workflows in [`pipeline`]
//! - prints reports, writes figures and optional exports

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::analysis::build_series;
use crate::analysis::temperature::fit_rpm;
use crate::cli::{
    Cli, Command, KineticArgs, OutputArgs, PpmsArgs, QubitFitArgs, RpmArgs, S21Args, ShowArgs, SimulateArgs,
    SimulateKind, TlsArgs, XrdArgs,
};
use crate::config::Config;
use crate::data::synthetic::{
    S21Environment, SyntheticTrace, synthesize_rpm, synthesize_s21, synthesize_series,
};
use crate::domain::Measurement;
use crate::error::AppError;
use crate::io::container::read_container;
use crate::io::delimited::{TANTALUM_PEAKS, combine_sweeps, read_ppms, read_xrd, to_resistivity};
use crate::io::{
    load_qubit, load_resonator, load_rpm_trace, write_qubit_results_csv, write_qubit_trace, write_raw_s21_trace,
    write_resonator_results_csv, write_rpm_trace,
};
use crate::math::LmOptions;
use crate::models::HangerParams;
use crate::plot::{
    CircleFigure, PpmsFigure, QubitTraceFigure, RpmFigure, TimelineFigure, TlsFigure, XrdFigure,
    render_qubit_trace, render_s21_magnitude, render_xy, save,
};
use crate::report;

pub mod pipeline;

/// Entry point for the `betata` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::from_env();

    match cli.command {
        Command::FitT1(args) => handle_qubit_fit(&config, Measurement::T1, &args),
        Command::FitT2e(args) => handle_qubit_fit(&config, Measurement::T2e, &args),
        Command::FitT2r(args) => handle_qubit_fit(&config, Measurement::T2r, &args),
        Command::Rpm(args) => handle_rpm(&config, &args),
        Command::FitS21(args) => handle_s21(&config, &args),
        Command::Kinetic(args) => handle_kinetic(&config, &args),
        Command::Tls(args) => handle_tls(&config, &args),
        Command::Ppms(args) => handle_ppms(&config, &args),
        Command::Xrd(args) => handle_xrd(&config, &args),
        Command::Simulate(args) => handle_simulate(&config, &args),
        Command::Show(args) => handle_show(&args),
    }
}

/// `RUST_LOG` wins over the `-v` count.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn figure_dir(config: &Config, output: &OutputArgs, name: &str) -> PathBuf {
    output.plot_dir.clone().unwrap_or_else(|| config.plot_dir(name))
}

fn figure_path(dir: &Path, output: &OutputArgs, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.{}", output.format.extension()))
}

fn handle_qubit_fit(config: &Config, measurement: Measurement, args: &QubitFitArgs) -> Result<(), AppError> {
    let trace_dir = args
        .traces
        .clone()
        .unwrap_or_else(|| config.trace_dir(&args.name, measurement.key()));
    let device = args.device.clone().unwrap_or_else(|| config.qubit_file(&args.name));
    let run = pipeline::run_qubit_fit(
        &args.name,
        measurement,
        &trace_dir,
        &device,
        &args.exclude,
        &args.fit_options(),
    )?;

    println!("{}", report::format_qubit_traces(measurement, &run.traces));
    println!("{}", report::format_batch(&run.batch));
    println!("{}", report::format_series_stats(measurement, &run.stats));
    println!("{}", report::format_qubit_summary(&run.qubit));

    if args.output.ascii {
        for t in &run.traces {
            println!("{}", t.tag());
            println!("{}", render_qubit_trace(t, args.output.width, args.output.height));
        }
    }
    if let Some(path) = &args.export {
        write_qubit_results_csv(path, &run.traces)?;
        log::info!("Exported {} rows to '{}'.", run.traces.len(), path.display());
    }

    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, &args.name);
        for t in &run.traces {
            let stem = format!("{}_{}", measurement.key(), t.source);
            save(&QubitTraceFigure { trace: t }, &figure_path(&dir, &args.output, &stem))?;
        }
        let series = build_series(&run.traces, &args.exclude);
        let timeline = TimelineFigure {
            qubit_name: &run.qubit.name,
            measurement,
            series: &series,
        };
        let stem = format!("{}_timeline", measurement.key());
        save(&timeline, &figure_path(&dir, &args.output, &stem))?;
    }
    Ok(())
}

fn handle_rpm(config: &Config, args: &RpmArgs) -> Result<(), AppError> {
    let trace = load_rpm_trace(&args.file)?;
    let fit = fit_rpm(&trace, &LmOptions::default())?;
    println!("{}", report::format_rpm(&fit, &trace.qubit_name));

    if args.output.ascii {
        let points: Vec<(f64, f64)> = trace.amplitude.iter().copied().zip(trace.magnitude_g.iter().copied()).collect();
        println!("{}", render_xy(&points, None, "amplitude", args.output.width, args.output.height));
    }
    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, &trace.qubit_name);
        let fig = RpmFigure {
            trace: &trace,
            fit: Some(&fit),
        };
        save(&fig, &figure_path(&dir, &args.output, &format!("rpm_{}", trace.source)))?;
    }
    Ok(())
}

fn handle_s21(config: &Config, args: &S21Args) -> Result<(), AppError> {
    let trace_dir = args.traces.clone().unwrap_or_else(|| config.trace_dir(&args.name, "s21"));
    let device = args.device.clone().unwrap_or_else(|| config.resonator_file(&args.name));
    let sim_dir = args.sim_dir.clone().unwrap_or_else(|| config.simulation_dir());
    let design = pipeline::ResonatorDesign {
        pitch: args.pitch.map(|p| p * 1e-6),
        film_thickness: args.film_thickness.map(|t| t * 1e-9),
        length: args.length.map(|l| l * 1e-6),
    };
    let run = pipeline::run_s21_fit(
        &args.name,
        &trace_dir,
        &device,
        &sim_dir,
        &design,
        &args.exclude,
        &args.circle_options(),
    )?;

    println!("{}", report::format_resonator_traces(&run.traces));
    println!("{}", report::format_batch(&run.batch));
    println!("{}", report::format_resonator_summary(&run.resonator));

    if args.output.ascii {
        for t in &run.traces {
            println!("{}", t.tag());
            println!("{}", render_s21_magnitude(t, args.output.width, args.output.height));
        }
    }
    if let Some(path) = &args.export {
        write_resonator_results_csv(path, &run.traces)?;
        log::info!("Exported {} rows to '{}'.", run.traces.len(), path.display());
    }
    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, &args.name);
        for t in &run.traces {
            let stem = format!("s21_{}", t.filename);
            save(&CircleFigure { trace: t }, &figure_path(&dir, &args.output, &stem))?;
        }
    }
    Ok(())
}

fn handle_kinetic(config: &Config, args: &KineticArgs) -> Result<(), AppError> {
    let device = args.device.clone().unwrap_or_else(|| config.resonator_file(&args.name));
    let (resonator, result) = pipeline::run_kinetic(&device)?;
    println!("{}", report::format_kinetic(&resonator.name, &result));
    Ok(())
}

fn handle_tls(config: &Config, args: &TlsArgs) -> Result<(), AppError> {
    let folder = args.devices.clone().unwrap_or_else(|| config.resonator_dir());
    let opts = args.tls_options();
    let (samples, fit) = pipeline::run_tls(&folder, &opts)?;
    println!("{}", report::format_tls_summary(&samples, &fit));

    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, "tls");
        let fig = TlsFigure {
            samples: &samples,
            fit: Some(&fit),
            opts: &opts,
        };
        save(&fig, &figure_path(&dir, &args.output, "q_tls0_vs_p_ms"))?;
    }
    Ok(())
}

fn handle_ppms(config: &Config, args: &PpmsArgs) -> Result<(), AppError> {
    let full = read_ppms(&args.full_range)?;
    let low = read_ppms(&args.low_temp)?;
    let sweep = combine_sweeps(&full, &low, args.t_max);
    if sweep.is_empty() {
        return Err(AppError::new(3, "No PPMS samples after combining the sweeps."));
    }
    let curve = to_resistivity(&sweep, &args.hall_bar());
    println!(
        "{}: {} samples, rho = {:.4} uOhm cm at {:.3} K",
        args.sample,
        curve.temperature.len(),
        curve.resistivity[0],
        curve.temperature[0]
    );

    if args.output.ascii {
        let points: Vec<(f64, f64)> = curve.temperature.iter().copied().zip(curve.resistivity.iter().copied()).collect();
        println!("{}", render_xy(&points, None, "T_K", args.output.width, args.output.height));
    }
    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, &args.sample);
        let fig = PpmsFigure {
            sample: &args.sample,
            curve: &curve,
        };
        save(&fig, &figure_path(&dir, &args.output, "ppms_resistivity"))?;
    }
    Ok(())
}

fn handle_xrd(config: &Config, args: &XrdArgs) -> Result<(), AppError> {
    let mut scan = read_xrd(&args.file)?;
    if let Some([lo, hi]) = args.crop.as_deref() {
        scan = scan.crop(*lo, *hi);
    }
    if scan.angle.is_empty() {
        return Err(AppError::new(3, format!("'{}': no XRD samples to show.", args.file.display())));
    }
    let peaks: Vec<_> = TANTALUM_PEAKS
        .iter()
        .filter_map(|(label, lo, hi)| scan.find_peak(label, *lo, *hi))
        .collect();
    for p in &peaks {
        println!("{:<12} 2theta = {:.3} deg, intensity = {:.1}", p.label, p.location, p.intensity);
    }
    if peaks.is_empty() {
        log::warn!("{}: no tantalum reference peak inside the scan.", args.sample);
    }

    if args.output.ascii {
        let points: Vec<(f64, f64)> = scan.angle.iter().copied().zip(scan.intensity.iter().copied()).collect();
        println!("{}", render_xy(&points, None, "2theta", args.output.width, args.output.height));
    }
    if !args.output.no_plots {
        let dir = figure_dir(config, &args.output, &args.sample);
        let fig = XrdFigure {
            sample: &args.sample,
            scan: &scan,
            peaks: &peaks,
        };
        save(&fig, &figure_path(&dir, &args.output, "xrd"))?;
    }
    Ok(())
}

fn simulated_qubit_truth(measurement: Measurement) -> SyntheticTrace {
    match measurement {
        Measurement::T1 => SyntheticTrace::decay(0.8, 30e-6, 0.1),
        Measurement::T2e => SyntheticTrace::recovery(0.4, 20e-6, 0.05),
        Measurement::T2r => SyntheticTrace::ramsey(25e-6, 0.5, vec![(0.4, 120e3)]),
    }
}

fn handle_simulate(config: &Config, args: &SimulateArgs) -> Result<(), AppError> {
    let key = match args.kind {
        SimulateKind::T1 => "t1",
        SimulateKind::T2e => "t2e",
        SimulateKind::T2r => "t2r",
        SimulateKind::Rpm => "rpm",
        SimulateKind::S21 => "s21",
    };
    let out = args.out.clone().unwrap_or_else(|| config.trace_dir(&args.name, key));
    std::fs::create_dir_all(&out).map_err(|e| AppError::file(&out, "create", e))?;

    match args.kind {
        SimulateKind::T1 | SimulateKind::T2e | SimulateKind::T2r => {
            let measurement = match args.kind {
                SimulateKind::T1 => Measurement::T1,
                SimulateKind::T2e => Measurement::T2e,
                _ => Measurement::T2r,
            };
            let truth = simulated_qubit_truth(measurement);
            for mut t in synthesize_series(measurement, &truth, args.count, 0.1, args.seed) {
                t.qubit_name = args.name.clone();
                write_qubit_trace(&out.join(format!("{}.json", t.source)), &t)?;
            }
        }
        SimulateKind::Rpm => {
            for i in 0..args.count as u64 {
                let mut t = synthesize_rpm(4.69e9, 0.02, 0.001, args.seed + i);
                t.qubit_name = args.name.clone();
                write_rpm_trace(&out.join(format!("{}.json", t.source)), &t)?;
            }
        }
        SimulateKind::S21 => {
            let params = HangerParams {
                fr: 5.59e9,
                ql: 2e5,
                abs_qc: 3e5,
                phi: 0.2,
            };
            let env = S21Environment {
                tau: 45e-9,
                background_amp: 0.3,
                background_phase: 0.5,
                noise_sd: 1e-4,
            };
            for i in 0..args.count as u64 {
                let mut t = synthesize_s21(&params, &env, 401, 40.0, args.seed + i);
                t.resonator_name = args.name.clone();
                t.power = Some(-20.0 - 5.0 * i as f64);
                write_raw_s21_trace(&out.join(format!("{}.json", t.filename)), &t)?;
            }
        }
    }
    println!("Wrote {} {key} traces to '{}'.", args.count, out.display());
    Ok(())
}

fn handle_show(args: &ShowArgs) -> Result<(), AppError> {
    let root = read_container(&args.file)?;
    let is_resonator = root.groups.contains_key("traces") || root.attrs.contains_key("pitch");
    if is_resonator {
        let (resonator, traces) = load_resonator(&args.file)?;
        println!("{}", report::format_resonator_summary(&resonator));
        if !traces.is_empty() {
            println!("{}", report::format_resonator_traces(&traces));
        }
    } else {
        let qubit = load_qubit(&args.file)?;
        println!("{}", report::format_qubit_summary(&qubit));
    }
    Ok(())
}
