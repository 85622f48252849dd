//! Device-level analysis built on top of the trace fits.

pub mod aggregate;
pub mod circle;
pub mod kinetic;
pub mod temperature;
pub mod tls;

pub use aggregate::{SeriesStats, aggregate_qubit, build_series, series_stats, subsample};
pub use circle::{CircleFitOptions, fit_trace};
pub use kinetic::{KineticResult, apply_kinetic};
pub use temperature::{RpmFit, fit_rpm, qubit_temperature};
pub use tls::{TlsFit, TlsOptions, TlsSample, collect_samples, fit_loss_tangent};
