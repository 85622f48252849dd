//! Figures rendered with `plotters`, plus the terminal quick-look.
//!
//! Every figure implements [`Figure`] once, generic over the drawing backend;
//! [`save`] picks SVG or PNG from the output file extension.
//!
//! plotters is built without a font engine. SVG carries text as `<text>`
//! elements; the bitmap backend cannot rasterize glyphs, so PNG figures are
//! drawn with [`TextMode::Off`] (series and guides only).

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;

use crate::error::AppError;

pub mod ascii;
pub mod material;
pub mod qubit;
pub mod resonator;
pub mod style;

pub use ascii::*;
pub use material::{PpmsFigure, XrdFigure};
pub use qubit::{QubitTraceFigure, RpmFigure, TimelineFigure};
pub use resonator::{CircleFigure, TlsFigure};

pub type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Whether the backend can draw captions, tick labels and annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    On,
    Off,
}

impl TextMode {
    pub fn on(self) -> bool {
        self == TextMode::On
    }
}

/// A figure that can be drawn onto any plotters backend.
pub trait Figure {
    fn size(&self) -> (u32, u32) {
        style::FIGURE_SIZE
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB>;
}

/// Margins, caption and label areas shared by every chart.
pub(crate) fn frame<DB: DrawingBackend>(builder: &mut ChartBuilder<'_, '_, DB>, caption: &str, text: TextMode) {
    builder.margin(style::MARGIN);
    if text.on() {
        builder
            .caption(caption, (style::FONT, style::CAPTION_SIZE))
            .x_label_area_size(style::X_LABEL_AREA)
            .y_label_area_size(style::Y_LABEL_AREA);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotFormat {
    Svg,
    Png,
}

impl PlotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PlotFormat::Svg => "svg",
            PlotFormat::Png => "png",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("svg") => Ok(PlotFormat::Svg),
            Some("png") => Ok(PlotFormat::Png),
            _ => Err(AppError::new(
                2,
                format!("Unsupported plot format for {} (use .svg or .png).", path.display()),
            )),
        }
    }
}

/// Render `figure` to `path`, creating the parent directory if needed.
pub fn save<F: Figure>(figure: &F, path: &Path) -> Result<(), AppError> {
    let format = PlotFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::file(parent, "create", e))?;
    }
    let size = figure.size();
    let outcome = match format {
        PlotFormat::Svg => render(SVGBackend::new(path, size).into_drawing_area(), figure, TextMode::On),
        PlotFormat::Png => {
            log::debug!("{}: PNG output carries no text.", path.display());
            render(BitMapBackend::new(path, size).into_drawing_area(), figure, TextMode::Off)
        }
    };
    outcome.map_err(|msg| AppError::new(4, format!("Failed to render {}: {msg}", path.display())))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn render<DB: DrawingBackend, F: Figure>(
    root: DrawingArea<DB, Shift>,
    figure: &F,
    text: TextMode,
) -> Result<(), String> {
    root.fill(&WHITE).map_err(|e| e.to_string())?;
    figure.draw(&root, text).map_err(|e| e.to_string())?;
    root.present().map_err(|e| e.to_string())
}

/// Vertical error bars as path segments with short caps.
pub(crate) fn error_bars(
    x: &[f64],
    y: &[f64],
    err: &[f64],
    cap: f64,
    color: RGBColor,
) -> Vec<PathElement<(f64, f64)>> {
    let mut out = Vec::new();
    for ((&xi, &yi), &ei) in x.iter().zip(y).zip(err) {
        if !(xi.is_finite() && yi.is_finite() && ei.is_finite()) {
            continue;
        }
        let (lo, hi) = (yi - ei, yi + ei);
        out.push(PathElement::new(vec![(xi, lo), (xi, hi)], color));
        out.push(PathElement::new(vec![(xi - cap, lo), (xi + cap, lo)], color));
        out.push(PathElement::new(vec![(xi - cap, hi), (xi + cap, hi)], color));
    }
    out
}
