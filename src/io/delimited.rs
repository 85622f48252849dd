//! Delimited instrument exports (PPMS resistivity, XRD scans).
//!
//! Both instruments write a free-form preamble, a marker line (`[Data]`), one
//! line of column names and then comma-separated rows. Columns are picked by
//! index; cells that do not parse become NaN.

use std::path::Path;

use crate::error::AppError;
use crate::math::stats::argmin_abs_diff;
use crate::math::Measured;

pub const DATA_MARKER: &str = "[Data]";

/// PPMS columns: temperature (K), resistance (Ohm), resistance std (Ohm).
pub const PPMS_COLUMNS: [usize; 3] = [3, 20, 15];
/// XRD columns: 2-theta (deg), intensity (counts).
pub const XRD_COLUMNS: [usize; 2] = [0, 1];

/// Full-range PPMS data is kept below this temperature (K).
pub const PPMS_FULL_RANGE_T_MAX: f64 = 1.5;

/// Selected columns of a delimited export, one `Vec` per requested index.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    pub names: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// Parse everything after the marker line of `text`.
pub fn parse_delimited(text: &str, marker: &str, columns: &[usize]) -> Result<Columns, String> {
    let mut lines = text.lines();
    if !lines.by_ref().any(|l| l.starts_with(marker)) {
        return Err(format!("marker line `{marker}` not found"));
    }
    let body: Vec<&str> = lines.collect();
    let body = body.join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read column names: {e}"))?
        .clone();
    let names = columns
        .iter()
        .map(|&i| headers.get(i).unwrap_or_default().to_string())
        .collect();

    let mut values = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record.map_err(|e| format!("malformed row: {e}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        for (out, &i) in values.iter_mut().zip(columns) {
            let cell = record.get(i).and_then(|s| s.parse::<f64>().ok());
            out.push(cell.unwrap_or(f64::NAN));
        }
    }
    Ok(Columns { names, values })
}

pub fn read_delimited(path: &Path, marker: &str, columns: &[usize]) -> Result<Columns, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| AppError::file(path, "read", e))?;
    parse_delimited(&text, marker, columns)
        .map_err(|e| AppError::new(2, format!("'{}': {e}", path.display())))
}

/// Hall-bar geometry (m) used to convert resistance to resistivity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HallBar {
    pub thickness: f64,
    pub length: f64,
    pub width: f64,
}

impl Default for HallBar {
    fn default() -> Self {
        Self {
            thickness: 240e-9,
            length: 370e-6,
            width: 25e-6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResistanceSweep {
    pub temperature: Vec<f64>,
    pub resistance: Vec<f64>,
    pub resistance_std: Vec<f64>,
}

impl ResistanceSweep {
    fn from_columns(c: Columns) -> Self {
        let mut it = c.values.into_iter();
        Self {
            temperature: it.next().unwrap_or_default(),
            resistance: it.next().unwrap_or_default(),
            resistance_std: it.next().unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    fn push(&mut self, i: usize, other: &Self) {
        self.temperature.push(other.temperature[i]);
        self.resistance.push(other.resistance[i]);
        self.resistance_std.push(other.resistance_std[i]);
    }
}

pub fn read_ppms(path: &Path) -> Result<ResistanceSweep, AppError> {
    read_delimited(path, DATA_MARKER, &PPMS_COLUMNS).map(ResistanceSweep::from_columns)
}

/// Full-range samples below `t_max` followed by every low-temperature sample,
/// sorted by temperature (NaN temperatures last).
pub fn combine_sweeps(full_range: &ResistanceSweep, low_temp: &ResistanceSweep, t_max: f64) -> ResistanceSweep {
    let mut merged = ResistanceSweep::default();
    for i in (0..full_range.len()).filter(|&i| full_range.temperature[i] < t_max) {
        merged.push(i, full_range);
    }
    for i in 0..low_temp.len() {
        merged.push(i, low_temp);
    }

    let mut order: Vec<usize> = (0..merged.len()).collect();
    order.sort_by(|&a, &b| merged.temperature[a].total_cmp(&merged.temperature[b]));
    let mut sorted = ResistanceSweep::default();
    for i in order {
        sorted.push(i, &merged);
    }
    sorted
}

/// Resistivity in uOhm.cm with propagated standard deviation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResistivityCurve {
    pub temperature: Vec<f64>,
    pub resistivity: Vec<f64>,
    pub resistivity_std: Vec<f64>,
}

pub fn to_resistivity(sweep: &ResistanceSweep, bar: &HallBar) -> ResistivityCurve {
    let factor = bar.thickness * bar.width / bar.length * 1e8;
    let (resistivity, resistivity_std) = sweep
        .resistance
        .iter()
        .zip(&sweep.resistance_std)
        .map(|(&r, &s)| {
            let rho = Measured::new(r, s).scale(factor);
            (rho.value, rho.std)
        })
        .unzip();
    ResistivityCurve {
        temperature: sweep.temperature.clone(),
        resistivity,
        resistivity_std,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrdScan {
    pub angle: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl XrdScan {
    /// Samples between the ones nearest to `lo` and `hi` (right end exclusive).
    pub fn crop(&self, lo: f64, hi: f64) -> XrdScan {
        let (Some(left), Some(right)) = (argmin_abs_diff(&self.angle, lo), argmin_abs_diff(&self.angle, hi))
        else {
            return XrdScan::default();
        };
        let right = right.max(left);
        XrdScan {
            angle: self.angle[left..right].to_vec(),
            intensity: self.intensity[left..right].to_vec(),
        }
    }

    /// Highest sample strictly inside `(lo, hi)`.
    pub fn find_peak(&self, label: &str, lo: f64, hi: f64) -> Option<RefPeak> {
        self.angle
            .iter()
            .zip(&self.intensity)
            .filter(|(a, i)| **a > lo && **a < hi && i.is_finite())
            .fold(None, |best: Option<(f64, f64)>, (&a, &i)| match best {
                Some((_, bi)) if i <= bi => best,
                _ => Some((a, i)),
            })
            .map(|(location, intensity)| RefPeak {
                label: label.to_string(),
                location,
                intensity,
            })
    }
}

/// A labelled diffraction peak.
#[derive(Debug, Clone, PartialEq)]
pub struct RefPeak {
    pub label: String,
    /// 2-theta (deg).
    pub location: f64,
    pub intensity: f64,
}

/// Reference peaks searched for by default: label and 2-theta window.
pub const TANTALUM_PEAKS: [(&str, f64, f64); 2] = [("a-Ta (110)", 38.0, 38.3), ("b-Ta (002)", 33.0, 34.0)];

pub fn read_xrd(path: &Path) -> Result<XrdScan, AppError> {
    let mut it = read_delimited(path, DATA_MARKER, &XRD_COLUMNS)?.values.into_iter();
    Ok(XrdScan {
        angle: it.next().unwrap_or_default(),
        intensity: it.next().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PPMS: &str = "\
[Header]
TITLE,demo
[Data]
c0,c1,c2,Temperature (K),c4
1,x,3,0.80,5
1,x,3,bad,5
1,x,3,2.00,5
";

    #[test]
    fn parses_after_marker_with_nan_for_bad_cells() {
        let cols = parse_delimited(PPMS, DATA_MARKER, &[3, 9]).unwrap();
        assert_eq!(cols.names, ["Temperature (K)", ""]);
        assert_eq!(cols.values[0][0], 0.8);
        assert!(cols.values[0][1].is_nan());
        assert_eq!(cols.values[0][2], 2.0);
        assert!(cols.values[1].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn missing_marker_is_reported() {
        assert!(parse_delimited("a,b\n1,2\n", DATA_MARKER, &[0]).is_err());
    }

    #[test]
    fn sweeps_combine_trim_and_sort() {
        let full = ResistanceSweep {
            temperature: vec![3.0, 1.4, 1.0],
            resistance: vec![30.0, 14.0, 10.0],
            resistance_std: vec![0.3, 0.14, 0.1],
        };
        let low = ResistanceSweep {
            temperature: vec![0.5, 1.2],
            resistance: vec![0.0, 12.0],
            resistance_std: vec![0.01, 0.12],
        };
        let merged = combine_sweeps(&full, &low, PPMS_FULL_RANGE_T_MAX);
        assert_eq!(merged.temperature, vec![0.5, 1.0, 1.2, 1.4]);
        assert_eq!(merged.resistance, vec![0.0, 10.0, 12.0, 14.0]);
    }

    #[test]
    fn resistivity_conversion_scales_value_and_std() {
        let sweep = ResistanceSweep {
            temperature: vec![1.0],
            resistance: vec![100.0],
            resistance_std: vec![2.0],
        };
        let bar = HallBar {
            thickness: 200e-9,
            length: 400e-6,
            width: 20e-6,
        };
        let curve = to_resistivity(&sweep, &bar);
        // 100 * 200e-9 * 20e-6 / 400e-6 * 1e8 = 100
        assert!((curve.resistivity[0] - 100.0).abs() < 1e-9);
        assert!((curve.resistivity_std[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn xrd_crop_and_peak_search() {
        let angle: Vec<f64> = (0..=100).map(|i| 30.0 + 0.1 * i as f64).collect();
        let intensity: Vec<f64> = angle
            .iter()
            .map(|a| 10.0 + 1000.0 * (-((a - 38.1) / 0.05).powi(2)).exp())
            .collect();
        let scan = XrdScan { angle, intensity };

        let cropped = scan.crop(32.0, 34.0);
        assert_eq!(cropped.angle.len(), 20);
        assert!((cropped.angle[0] - 32.0).abs() < 1e-9);

        let peak = scan.find_peak("a-Ta (110)", 38.0, 38.3).unwrap();
        assert!((peak.location - 38.1).abs() < 1e-9);
        assert!(scan.find_peak("none", 50.0, 60.0).is_none());
    }
}
