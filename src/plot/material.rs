//! Film characterization figures: PPMS resistivity and XRD scans.

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::io::delimited::{RefPeak, ResistivityCurve, XrdScan};
use crate::plot::style::{self, padded_range};
use crate::plot::{DrawResult, Figure, TextMode, error_bars, frame};

/// Resistivity versus temperature with one-sigma error bars.
pub struct PpmsFigure<'a> {
    pub sample: &'a str,
    pub curve: &'a ResistivityCurve,
}

impl Figure for PpmsFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let c = self.curve;
        let (x0, x1) = padded_range(&c.temperature, 0.03);
        let ends: Vec<f64> = c
            .resistivity
            .iter()
            .zip(&c.resistivity_std)
            .flat_map(|(r, s)| [r - s, r + s])
            .collect();
        let (y0, y1) = padded_range(&ends, 0.05);

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &format!("{} resistivity", self.sample), text);
        let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("Temperature (K)")
                .y_desc("ρ (μΩ cm)")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        let cap = style::ERROR_BAR_CAP * (x1 - x0);
        chart.draw_series(error_bars(&c.temperature, &c.resistivity, &c.resistivity_std, cap, style::GUIDE))?;
        chart.draw_series(
            c.temperature
                .iter()
                .zip(&c.resistivity)
                .filter(|(t, r)| t.is_finite() && r.is_finite())
                .map(|(&t, &r)| Circle::new((t, r), style::MARKER_SIZE, style::DATA.filled())),
        )?;
        Ok(())
    }
}

/// Intensity versus 2-theta with labelled reference peaks.
pub struct XrdFigure<'a> {
    pub sample: &'a str,
    pub scan: &'a XrdScan,
    pub peaks: &'a [RefPeak],
}

impl Figure for XrdFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, text: TextMode) -> DrawResult<DB> {
        let s = self.scan;
        let (x0, x1) = padded_range(&s.angle, 0.01);
        let (y0, y1) = padded_range(&s.intensity, 0.12);

        let mut builder = ChartBuilder::on(root);
        frame(&mut builder, &format!("{} XRD", self.sample), text);
        let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
        if text.on() {
            chart
                .configure_mesh()
                .x_desc("2θ (deg)")
                .y_desc("Intensity (counts)")
                .label_style((style::FONT, style::LABEL_SIZE))
                .draw()?;
        }

        chart.draw_series(LineSeries::new(
            s.angle
                .iter()
                .zip(&s.intensity)
                .filter(|(a, i)| a.is_finite() && i.is_finite())
                .map(|(&a, &i)| (a, i)),
            &style::DATA,
        ))?;

        for peak in self.peaks {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(peak.location, y0), (peak.location, peak.intensity)],
                style::FIT.mix(0.5),
            )))?;
            chart.draw_series(std::iter::once(Circle::new(
                (peak.location, peak.intensity),
                style::MARKER_SIZE + 1,
                style::FIT.filled(),
            )))?;
            if text.on() {
                let label = format!("{} {:.2}°", peak.label, peak.location);
                chart.draw_series(std::iter::once(Text::new(
                    label,
                    (peak.location, peak.intensity + 0.03 * (y1 - y0)),
                    (style::FONT, f64::from(style::ANNOTATION_SIZE)).into_font(),
                )))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::save;

    #[test]
    fn xrd_figure_labels_peaks() {
        let angle: Vec<f64> = (0..200).map(|i| 30.0 + 0.05 * f64::from(i)).collect();
        let intensity: Vec<f64> = angle
            .iter()
            .map(|a| 10.0 + 500.0 * (-((a - 38.1) / 0.05f64).powi(2)).exp())
            .collect();
        let scan = XrdScan { angle, intensity };
        let peak = scan.find_peak("a-Ta (110)", 38.0, 38.3).unwrap();
        let fig = XrdFigure {
            sample: "F11",
            scan: &scan,
            peaks: std::slice::from_ref(&peak),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xrd.svg");
        save(&fig, &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("a-Ta (110)"));
    }

    #[test]
    fn ppms_figure_renders_png() {
        let curve = ResistivityCurve {
            temperature: vec![1.0, 2.0, 3.0, 4.0],
            resistivity: vec![10.0, 10.5, 11.0, f64::NAN],
            resistivity_std: vec![0.1, 0.1, 0.2, 0.2],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppms.png");
        save(&PpmsFigure { sample: "F11", curve: &curve }, &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
