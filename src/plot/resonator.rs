//! Resonator figures: the canonical S21 circle and the TLS loss-tangent plot.

use num_complex::Complex64;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::circle::canonical_s21;
use crate::analysis::tls::{ALPHA_TA_TAN_DELTA, TlsFit, TlsOptions, TlsSample, surface_limited_q};
use crate::domain::ResonatorTrace;
use crate::math::stats::linspace;
use crate::models::{HangerParams, loss_tangent, s21_grid};
use crate::plot::qubit::CURVE_POINTS;
use crate::plot::style::{self, log_range};
use crate::plot::{DrawResult, Figure, TextMode, error_bars, frame};

/// Canonical S21 sweep in the complex plane with the hanger model overlay.
///
/// Unfitted traces are drawn raw.
pub struct CircleFigure<'a> {
    pub trace: &'a ResonatorTrace,
}

impl CircleFigure<'_> {
    pub fn title(&self) -> String {
        let t = self.trace;
        let mut out = format!("{} {}", t.resonator_name, t.tag());
        if let Some(p) = t.power {
            out.push_str(&format!("  P = {p:.0} dBm"));
        }
        if let Some(temp) = t.temperature {
            out.push_str(&format!("  T = {:.1} mK", temp * 1e3));
        }
        if let Some(qi) = t.fit.qi {
            out.push_str(&format!("  Qi = {qi:.3e}"));
        }
        out
    }

    fn hanger(&self) -> Option<HangerParams> {
        let f = &self.trace.fit;
        Some(HangerParams {
            fr: f.fr?,
            ql: f.ql?,
            abs_qc: f.abs_qc?,
            phi: f.phi?,
        })
    }

    fn model_curve(&self) -> Vec<Complex64> {
        let (Some(p), Some(lo), Some(hi)) = (
            self.hanger(),
            self.trace.frequency.first(),
            self.trace.frequency.last(),
        ) else {
            return Vec::new();
        };
        s21_grid(&linspace(*lo, *hi, CURVE_POINTS), &p)
    }
}

/// Square window around every point, so the circle stays round.
fn square_bounds(points: &[Complex64]) -> ((f64, f64), (f64, f64)) {
    let finite = points.iter().filter(|z| z.re.is_finite() && z.im.is_finite());
    let (mut re0, mut re1, mut im0, mut im1) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for z in finite {
        re0 = re0.min(z.re);
        re1 = re1.max(z.re);
        im0 = im0.min(z.im);
        im1 = im1.max(z.im);
    }
    if !re0.is_finite() || !im0.is_finite() {
        return ((-1.0, 1.0), (-1.0, 1.0));
    }
    let half = 0.55 * (re1 - re0).max(im1 - im0).max(1e-12);
    let (cr, ci) = (0.5 * (re0 + re1), 0.5 * (im0 + im1));
    ((cr - half, cr + half), (ci - half, ci + half))
}

impl Figure for CircleFigure<'_> {
    fn size(&self) -> (u32, u32) {
        style::SQUARE_FIGURE_SIZE
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let data = canonical_s21(self.trace).unwrap_or_else(|| self.trace.s21.clone());
        let model = self.model_curve();
        let all: Vec<Complex64> = data.iter().chain(&model).copied().collect();
        let ((x0, x1), (y0, y1)) = square_bounds(&all);

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &self.title(), text);
        let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("Re S21")
                .y_desc("Im S21")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        chart.draw_series(
            data.iter()
                .map(|z| Circle::new((z.re, z.im), style::MARKER_SIZE, style::DATA.filled())),
        )?;
        if !model.is_empty() {
            chart.draw_series(LineSeries::new(
                model.iter().map(|z| (z.re, z.im)),
                style::FIT.stroke_width(style::LINE_WIDTH),
            ))?;
        }
        Ok(())
    }
}

/// `Q_TLS0` against metal-substrate participation on log-log axes.
///
/// Overlays the fitted model, the substrate limit and surface-limited lines
/// for the fitted and the alpha-tantalum loss tangents with `+-err/2` bands.
pub struct TlsFigure<'a> {
    pub samples: &'a [TlsSample],
    pub fit: Option<&'a TlsFit>,
    pub opts: &'a TlsOptions,
}

/// Default window: participation `5e-5..3e-3`, quality factor `1e5..2e7`.
pub const TLS_P_RANGE: (f64, f64) = (0.5e-4, 3e-3);
pub const TLS_Q_RANGE: (f64, f64) = (1e5, 2e7);

impl TlsFigure<'_> {
    fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let p: Vec<f64> = self.samples.iter().map(|s| s.p_ms).collect();
        let q: Vec<f64> = self
            .samples
            .iter()
            .flat_map(|s| [s.q_tls0 + s.q_tls0_err, s.q_tls0])
            .collect();
        let (p0, p1) = log_range(&p, 1.5);
        let (q0, q1) = log_range(&q, 1.5);
        (
            (p0.min(TLS_P_RANGE.0), p1.max(TLS_P_RANGE.1)),
            (q0.min(TLS_Q_RANGE.0), q1.max(TLS_Q_RANGE.1)),
        )
    }
}

fn log_grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    (0..n)
        .map(|i| lo * (hi / lo).powf(i as f64 / (n - 1) as f64))
        .collect()
}

impl Figure for TlsFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let ((x0, x1), (y0, y1)) = self.bounds();
        let grid = log_grid(x0, x1, 200);
        let caption = match self.fit {
            Some(f) => format!(
                "TLS loss tangent: tan δ = {:.3e} ± {}",
                f.tan_delta_surf,
                f.tan_delta_surf_err.map_or_else(|| "n/a".to_string(), |e| format!("{e:.1e}"))
            ),
            None => "TLS loss tangent".to_string(),
        };

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &caption, text);
        let mut chart = builder.build_cartesian_2d((x0..x1).log_scale(), (y0..y1).log_scale())?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("p_MS")
                .y_desc("Q_TLS0")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }
        let clip = |q: f64| q.clamp(y0, y1);

        let bulk = 1.0 / (self.opts.p_sub * self.opts.tan_delta_sub);
        let bulk_series = chart.draw_series(std::iter::once(PathElement::new(
            vec![(x0, clip(bulk)), (x1, clip(bulk))],
            style::GUIDE.stroke_width(style::LINE_WIDTH),
        )))?;
        if text.on() {
            bulk_series
                .label("substrate limit")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style::GUIDE));
        }

        let mut surface_lines = vec![(ALPHA_TA_TAN_DELTA.value, ALPHA_TA_TAN_DELTA.std, style::ACCENT, "α-Ta")];
        if let Some(f) = self.fit {
            surface_lines.push((f.tan_delta_surf, f.tan_delta_surf_err.unwrap_or(0.0), style::SECONDARY, "fit surface"));
        }
        for (tan, err, color, label) in surface_lines {
            if !(tan.is_finite() && tan > 0.0) {
                continue;
            }
            let line = |t: f64| -> Vec<(f64, f64)> {
                grid.iter().map(|&p| (p, clip(surface_limited_q(p, t)))).collect()
            };
            let series = chart.draw_series(LineSeries::new(line(tan), color.stroke_width(style::LINE_WIDTH)))?;
            if text.on() {
                series
                    .label(label)
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            if err > 0.0 {
                for t in [tan - err / 2.0, tan + err / 2.0] {
                    if t > 0.0 {
                        chart.draw_series(LineSeries::new(line(t), color.mix(0.35)))?;
                    }
                }
            }
        }

        if let Some(f) = self.fit {
            let curve: Vec<(f64, f64)> = grid
                .iter()
                .map(|&p| (p, loss_tangent(p, f.tan_delta_surf, self.opts.tan_delta_sub, self.opts.p_sub)))
                .filter(|(_, q)| q.is_finite() && *q > 0.0)
                .map(|(p, q)| (p, clip(q)))
                .collect();
            let series = chart.draw_series(LineSeries::new(curve, style::FIT.stroke_width(style::LINE_WIDTH)))?;
            if text.on() {
                series
                    .label("fit")
                    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style::FIT));
            }
        }

        let p: Vec<f64> = self.samples.iter().map(|s| s.p_ms).collect();
        let q: Vec<f64> = self.samples.iter().map(|s| s.q_tls0).collect();
        // lower bar ends are clipped so they stay on the log axis
        let err: Vec<f64> = self
            .samples
            .iter()
            .map(|s| s.q_tls0_err.min(s.q_tls0 - y0 * 1.0001).max(0.0))
            .collect();
        chart.draw_series(error_bars(&p, &q, &err, 0.0, style::DATA))?;
        chart.draw_series(
            p.iter()
                .zip(&q)
                .map(|(&x, &y)| Circle::new((x, y), style::MARKER_SIZE + 1, style::DATA.filled())),
        )?;

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
    use crate::analysis::circle::{CircleFitOptions, fit_trace};
    use crate::data::synthetic::{S21Environment, synthesize_s21};
    use crate::plot::save;

    #[test]
    fn circle_window_is_square() {
        let pts = [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.5)];
        let ((x0, x1), (y0, y1)) = square_bounds(&pts);
        assert!(((x1 - x0) - (y1 - y0)).abs() < 1e-12);
        assert!(x0 < 0.0 && x1 > 1.0);
    }

    #[test]
    fn fitted_circle_renders_with_model() {
        let p = HangerParams {
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
        let mut trace = synthesize_s21(&p, &env, 401, 40.0, 3);
        fit_trace(&mut trace, &CircleFitOptions::default()).unwrap();
        let fig = CircleFigure { trace: &trace };
        assert_eq!(fig.model_curve().len(), CURVE_POINTS);
        assert!(fig.title().contains("P = -45 dBm"));

        let dir = tempfile::tempdir().unwrap();
        save(&fig, &dir.path().join("circle.svg")).unwrap();
    }

    #[test]
    fn tls_window_covers_defaults_and_data() {
        let samples = vec![TlsSample {
            name: "R1".to_string(),
            p_ms: 1e-5,
            q_tls0: 5e7,
            q_tls0_err: 1e6,
        }];
        let opts = TlsOptions::default();
        let fig = TlsFigure {
            samples: &samples,
            fit: None,
            opts: &opts,
        };
        let ((x0, x1), (y0, y1)) = fig.bounds();
        assert!(x0 < 1e-5 && x1 == TLS_P_RANGE.1);
        assert!(y0 == TLS_Q_RANGE.0 && y1 > 5.1e7);

        let dir = tempfile::tempdir().unwrap();
        save(&fig, &dir.path().join("tls.svg")).unwrap();
    }
}
