//! Shared figure styling: palette, fonts, marker and line sizes.

use plotters::style::RGBColor;

pub const FIGURE_SIZE: (u32, u32) = (1000, 700);
/// Two stacked panels (trace plus spectrum).
pub const TALL_FIGURE_SIZE: (u32, u32) = (1000, 1100);
pub const SQUARE_FIGURE_SIZE: (u32, u32) = (850, 850);

pub const FONT: &str = "sans-serif";
pub const CAPTION_SIZE: u32 = 22;
pub const LABEL_SIZE: u32 = 15;
pub const ANNOTATION_SIZE: u32 = 14;

pub const MARGIN: u32 = 15;
pub const X_LABEL_AREA: u32 = 45;
pub const Y_LABEL_AREA: u32 = 80;

pub const MARKER_SIZE: u32 = 3;
pub const LINE_WIDTH: u32 = 2;
pub const ERROR_BAR_CAP: f64 = 0.004;

pub const DATA: RGBColor = RGBColor(31, 119, 180);
pub const FIT: RGBColor = RGBColor(214, 39, 40);
pub const SECONDARY: RGBColor = RGBColor(255, 127, 14);
pub const ACCENT: RGBColor = RGBColor(44, 160, 44);
pub const GUIDE: RGBColor = RGBColor(110, 110, 110);
pub const EXCLUDED: RGBColor = RGBColor(190, 190, 190);

/// Axis range padded by `frac` of its span; a zero span widens to `+-1` around
/// the value (or `[0, 1]` when nothing is finite).
pub fn padded_range<'a>(values: impl IntoIterator<Item = &'a f64>, frac: f64) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    if span <= 0.0 {
        let w = if lo != 0.0 { lo.abs() * 0.1 } else { 1.0 };
        return (lo - w, hi + w);
    }
    (lo - frac * span, hi + frac * span)
}

/// Positive range for a log axis, widened by `factor` on each side.
pub fn log_range<'a>(values: impl IntoIterator<Item = &'a f64>, factor: f64) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite() && **v > 0.0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (1.0, 10.0);
    }
    (lo / factor, hi * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_range_handles_flat_and_empty_input() {
        assert_eq!(padded_range(&[0.0, 10.0], 0.1), (-1.0, 11.0));
        assert_eq!(padded_range(&[10.0, 10.0], 0.1), (9.0, 11.0));
        assert_eq!(padded_range(&[f64::NAN], 0.1), (0.0, 1.0));
    }

    #[test]
    fn log_range_ignores_non_positive() {
        assert_eq!(log_range(&[-1.0, 0.0, 10.0, 100.0], 2.0), (5.0, 200.0));
    }
}
