//! Qubit figures: single traces with their fit, coherence timelines and RPM.

use std::f64::consts::E;

use plotters::coord::Shift;
use plotters::coord::ranged1d::ValueFormatter;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::analysis::aggregate::subsample;
use crate::analysis::temperature::{RpmFit, signal_norm};
use crate::domain::{CoherenceSeries, Measurement, ModelKind, QubitTrace, RpmTrace, TIMESTAMP_FORMAT};
use crate::math::spectrum::positive_spectrum;
use crate::math::stats::{linspace, mean, std_dev};
use crate::models::predict_grid;
use crate::plot::style::{self, log_range, padded_range};
use crate::plot::{DrawResult, Figure, TextMode, frame};

/// Points of the dense fitted-curve grid.
pub const CURVE_POINTS: usize = 1001;
/// Samples shown on a timeline; the full series stays in the statistics.
pub const TIMELINE_POINTS: usize = 400;
pub const TIMELINE_SEED: u64 = 4;

/// One T1, T2 echo or T2 Ramsey trace with its fit.
///
/// Ramsey traces get a second panel with the magnitude spectrum and the
/// fitted tone frequencies.
pub struct QubitTraceFigure<'a> {
    pub trace: &'a QubitTrace,
}

impl QubitTraceFigure<'_> {
    pub fn title(&self) -> String {
        let t = self.trace;
        let id = t.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let head = format!("{} #{id}", t.timestamp.format(TIMESTAMP_FORMAT));
        match (t.time_constant(), t.time_constant_err()) {
            (Some(v), Some(e)) => format!(
                "{head}   {} = {:.2} ± {:.2} μs",
                t.measurement.label(),
                v * 1e6,
                e * 1e6
            ),
            (Some(v), None) => format!("{head}   {} = {:.2} μs", t.measurement.label(), v * 1e6),
            _ => format!("{head}   (no fit)"),
        }
    }

    /// T1 and T2 echo delays span decades and are drawn on a log axis.
    fn log_delay_axis(&self) -> bool {
        matches!(self.trace.measurement, Measurement::T1 | Measurement::T2e)
    }

    fn fitted_curve(&self, log_x: bool) -> Vec<(f64, f64)> {
        let t = self.trace;
        let Some(fit) = &t.fit else {
            return Vec::new();
        };
        let x_max = t.tau.iter().copied().fold(0.0, f64::max);
        let xs = if log_x {
            let x_min = t.tau.iter().copied().filter(|x| *x > 0.0).fold(f64::INFINITY, f64::min);
            if x_min >= x_max {
                return Vec::new();
            }
            linspace(x_min.ln(), x_max.ln(), CURVE_POINTS)
                .into_iter()
                .map(f64::exp)
                .collect()
        } else {
            linspace(0.0, x_max, CURVE_POINTS)
        };
        let ys = predict_grid(fit.model, &xs, &fit.result.values());
        xs.into_iter()
            .zip(ys)
            .filter(|(_, y)| y.is_finite())
            .map(|(x, y)| (x * 1e6, y))
            .collect()
    }

    /// Horizontal level at the `1/e` (decay) or `1 - 1/e` (recovery) point
    /// and the fitted time constant, both in plot units.
    fn guides(&self) -> Option<(f64, f64)> {
        let fit = self.trace.fit.as_ref()?;
        let a = fit.value("A")?;
        let b = fit.value("B")?;
        let t = self.trace.time_constant()?;
        let level = match fit.model {
            ModelKind::Decay => a / E + b,
            ModelKind::Recovery => a * (1.0 - 1.0 / E) + b,
            _ => return None,
        };
        Some((level, t * 1e6))
    }

    fn draw_trace<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let t = self.trace;
        let log_x = self.log_delay_axis();
        let points: Vec<(f64, f64)> = t
            .tau
            .iter()
            .zip(&t.population)
            .map(|(&x, &y)| (x * 1e6, y))
            .filter(|(x, _)| !log_x || *x > 0.0)
            .collect();
        let curve = self.fitted_curve(log_x);
        let y_range = padded_range(points.iter().chain(&curve).map(|p| &p.1), 0.05);

        let mut builder = ChartBuilder::on(area);
        frame(&mut builder, &self.title(), text);
        if log_x {
            let x_range = log_range(points.iter().map(|p| &p.0), 1.2);
            let mut chart = builder.build_cartesian_2d((x_range.0..x_range.1).log_scale(), y_range.0..y_range.1)?;
            self.draw_trace_series(&mut chart, x_range, y_range, &points, curve, text)
        } else {
            let x_range = padded_range(points.iter().map(|p| &p.0), 0.02);
            let mut chart = builder.build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
            self.draw_trace_series(&mut chart, x_range, y_range, &points, curve, text)
        }
    }

    fn draw_trace_series<DB, X>(
        &self,
        chart: &mut ChartContext<'_, DB, Cartesian2d<X, RangedCoordf64>>,
        (x0, x1): (f64, f64),
        (y0, y1): (f64, f64),
        points: &[(f64, f64)],
        curve: Vec<(f64, f64)>,
        text: TextMode,
    ) -> DrawResult<DB>
    where
        DB: DrawingBackend,
        X: Ranged<ValueType = f64> + ValueFormatter<f64>,
    {
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("τ (μs)")
                .y_desc("Excited-state population")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        if let Some((level, tc)) = self.guides() {
            let guide = style::GUIDE.mix(0.6);
            chart.draw_series(std::iter::once(PathElement::new(vec![(x0, level), (x1, level)], guide)))?;
            chart.draw_series(std::iter::once(PathElement::new(vec![(tc, y0), (tc, y1)], guide)))?;
        }
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, style::MARKER_SIZE, style::DATA.filled())),
        )?;
        if !curve.is_empty() {
            chart.draw_series(LineSeries::new(curve, style::FIT.stroke_width(style::LINE_WIDTH)))?;
        }
        Ok(())
    }

    fn draw_spectrum<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let t = self.trace;
        let dt = match t.tau.as_slice() {
            [a, b, ..] => b - a,
            _ => 1.0,
        };
        let spectrum = positive_spectrum(&t.population, dt);
        let points: Vec<(f64, f64)> = spectrum
            .freqs
            .iter()
            .zip(&spectrum.amplitudes)
            .map(|(&f, &a)| (f * 1e-6, a))
            .collect();
        let (x0, x1) = padded_range(points.iter().map(|p| &p.0), 0.02);
        let (_, y1) = padded_range(points.iter().map(|p| &p.1), 0.05);

        let mut builder = ChartBuilder::on(area);
        frame(&mut builder, "Magnitude spectrum", text);
        let mut chart = builder.build_cartesian_2d(x0..x1, 0.0..y1.max(f64::MIN_POSITIVE))?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("Frequency (MHz)")
                .y_desc("|DFT|")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }
        if let Some(fit) = &t.fit {
            for tone in fit.indexed("f") {
                let f = tone.value * 1e-6;
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(f, 0.0), (f, y1)],
                    style::FIT.mix(0.7),
                )))?;
            }
        }
        chart.draw_series(LineSeries::new(points.iter().copied(), &style::DATA))?;
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, style::MARKER_SIZE, style::DATA.filled())),
        )?;
        Ok(())
    }
}

impl Figure for QubitTraceFigure<'_> {
    fn size(&self) -> (u32, u32) {
        match self.trace.measurement {
            Measurement::T2r => style::TALL_FIGURE_SIZE,
            _ => style::FIGURE_SIZE,
        }
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        if self.trace.measurement == Measurement::T2r {
            let panels = root.split_evenly((2, 1));
            self.draw_trace(&panels[0], text)?;
            self.draw_spectrum(&panels[1], text)
        } else {
            self.draw_trace(root, text)
        }
    }
}

/// Coherence time versus elapsed hours with the mean and `mean +- std/2`.
pub struct TimelineFigure<'a> {
    pub qubit_name: &'a str,
    pub measurement: Measurement,
    pub series: &'a CoherenceSeries,
}

impl TimelineFigure<'_> {
    /// `(hours, microseconds)` of the included samples chosen for display.
    pub fn display_points(&self) -> Vec<(f64, f64)> {
        let s = self.series;
        let included: Vec<usize> = (0..s.len())
            .filter(|&i| !s.is_excluded[i] && s.value[i].is_finite())
            .collect();
        let values: Vec<f64> = included.iter().map(|&i| s.value[i]).collect();
        subsample(&values, TIMELINE_POINTS, TIMELINE_SEED)
            .into_iter()
            .map(|k| {
                let i = included[k];
                (s.timestamp[i] / 3600.0, s.value[i] * 1e6)
            })
            .collect()
    }
}

impl Figure for TimelineFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let included: Vec<f64> = self.series.included_values().iter().map(|v| v * 1e6).collect();
        let m = mean(&included).unwrap_or(f64::NAN);
        let sd = std_dev(&included).unwrap_or(f64::NAN);
        let points = self.display_points();

        let (x0, x1) = padded_range(points.iter().map(|p| &p.0), 0.02);
        let (y0, y1) = padded_range(points.iter().map(|p| &p.1), 0.1);
        let caption = format!(
            "{} {}: {:.2} ± {:.2} μs",
            self.qubit_name,
            self.measurement.label(),
            m,
            sd
        );

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &caption, text);
        let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("Time (h)")
                .y_desc(format!("{} (μs)", self.measurement.label()))
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        if m.is_finite() {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x0, m), (x1, m)],
                style::FIT.stroke_width(style::LINE_WIDTH),
            )))?;
            for level in [m - sd / 2.0, m + sd / 2.0] {
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(x0, level), (x1, level)],
                    style::FIT.mix(0.5),
                )))?;
            }
        }
        chart.draw_series(LineSeries::new(points.iter().copied(), style::DATA.mix(0.4)))?;
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, style::MARKER_SIZE, style::DATA.filled())),
        )?;
        Ok(())
    }
}

/// Normalized e-f Rabi traces for ground and excited preparation.
pub struct RpmFigure<'a> {
    pub trace: &'a RpmTrace,
    pub fit: Option<&'a RpmFit>,
}

impl Figure for RpmFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let t = self.trace;
        let reference = &t.magnitude_g;
        let g = signal_norm(&t.magnitude_g, reference);
        let e = signal_norm(&t.magnitude_e, reference);

        let (x0, x1) = padded_range(&t.amplitude, 0.02);
        let (y0, y1) = padded_range(g.iter().chain(&e), 0.1);
        let caption = match self.fit {
            Some(f) => format!("{}: T = {:.1} mK", t.qubit_name, f.temperature.scale(1e3)),
            None => t.qubit_name.clone(),
        };

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &caption, text);
        let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("e-f drive amplitude")
                .y_desc("Normalized signal")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        let prepared = [(&g, style::DATA, "|g>"), (&e, style::SECONDARY, "|e>")];
        for (signal, color, label) in prepared {
            let series = chart.draw_series(
                t.amplitude
                    .iter()
                    .zip(signal.iter())
                    .map(|(&x, &y)| Circle::new((x, y), style::MARKER_SIZE, color.filled())),
            )?;
            if text.on() {
                series
                    .label(label)
                    .legend(move |(x, y)| Circle::new((x, y), style::MARKER_SIZE, color.filled()));
            }
        }

        if let Some(fit) = self.fit {
            let xs = linspace(t.amplitude.first().copied().unwrap_or(0.0), x1, CURVE_POINTS);
            for (record, raw) in [(&fit.ground, &t.magnitude_g), (&fit.excited, &t.magnitude_e)] {
                let model = predict_grid(record.model, &xs, &record.result.values());
                // same offset and scale as the data it overlays
                let m = mean(raw).unwrap_or(0.0);
                let span = crate::math::stats::finite_range(reference)
                    .map(|(lo, hi)| hi - lo)
                    .filter(|s| *s > 0.0)
                    .unwrap_or(1.0);
                let curve: Vec<(f64, f64)> = xs
                    .iter()
                    .zip(model)
                    .filter(|(_, y)| y.is_finite())
                    .map(|(&x, y)| (x, 2.0 * (y - m) / span))
                    .collect();
                chart.draw_series(LineSeries::new(curve, style::FIT.stroke_width(style::LINE_WIDTH)))?;
            }
        }

        if text.on() {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .label_font((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::build_series;
    use crate::data::synthetic::{SyntheticTrace, synthesize, synthesize_series};
    use crate::fit::{FitOptions, fit_qubit_trace, fit_qubit_traces};
    use crate::plot::save;

    fn fitted_t1_series(n: usize) -> CoherenceSeries {
        let truth = SyntheticTrace::decay(0.8, 40e-6, 0.1);
        let mut traces = synthesize_series(Measurement::T1, &truth, n, 0.05, 21);
        for (i, t) in traces.iter_mut().enumerate() {
            t.id = Some(i);
        }
        fit_qubit_traces(&mut traces, &FitOptions::default());
        build_series(&traces, &[])
    }

    #[test]
    fn title_carries_time_constant_in_microseconds() {
        let truth = SyntheticTrace::decay(0.8, 30e-6, 0.1);
        let mut trace = synthesize(Measurement::T1, &truth, 101, 150e-6, 0.01, 3);
        trace.id = Some(7);
        let fig = QubitTraceFigure { trace: &trace };
        assert!(fig.title().ends_with("#7   (no fit)"));

        fit_qubit_trace(&mut trace, &FitOptions::default()).unwrap();
        let fig = QubitTraceFigure { trace: &trace };
        assert!(fig.title().contains("#7   T1 = "));
        assert!(fig.title().ends_with(" μs"));
        let (_, tc) = fig.guides().unwrap();
        assert!((tc - 30.0).abs() < 3.0);
    }

    #[test]
    fn decay_figures_use_a_log_delay_axis() {
        let truth = SyntheticTrace::decay(0.8, 30e-6, 0.1);
        let mut trace = synthesize(Measurement::T1, &truth, 101, 150e-6, 0.01, 3);
        fit_qubit_trace(&mut trace, &FitOptions::default()).unwrap();
        let fig = QubitTraceFigure { trace: &trace };
        assert!(fig.log_delay_axis());

        let curve = fig.fitted_curve(true);
        assert_eq!(curve.len(), CURVE_POINTS);
        assert!(curve[0].0 > 0.0);
        // geometric grid: equal ratios between neighbours
        let r0 = curve[1].0 / curve[0].0;
        let r1 = curve[CURVE_POINTS - 1].0 / curve[CURVE_POINTS - 2].0;
        assert!((r0 - r1).abs() < 1e-9);

        let dir = tempfile::tempdir().unwrap();
        save(&fig, &dir.path().join("t1.svg")).unwrap();
    }

    #[test]
    fn ramsey_figure_renders_two_panels() {
        let truth = SyntheticTrace::ramsey(25e-6, 0.5, vec![(0.4, 120e3)]);
        let mut trace = synthesize(Measurement::T2r, &truth, 151, 75e-6, 0.01, 3);
        fit_qubit_trace(&mut trace, &FitOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2r.svg");
        save(&QubitTraceFigure { trace: &trace }, &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("Magnitude spectrum"));
    }

    #[test]
    fn timeline_shows_only_included_points() {
        let mut series = fitted_t1_series(5);
        series.is_excluded[2] = true;
        let fig = TimelineFigure {
            qubit_name: "Qsim",
            measurement: Measurement::T1,
            series: &series,
        };
        let pts = fig.display_points();
        assert_eq!(pts.len(), 4);
        assert!((pts[1].0 - 1200.0 / 3600.0).abs() < 1e-12);
        assert!(pts.iter().all(|p| (p.0 - 2400.0 / 3600.0).abs() > 1e-9));

        let dir = tempfile::tempdir().unwrap();
        save(&fig, &dir.path().join("timeline.png")).unwrap();
    }
}
