//! ASCII plotting for terminal output.
//!
//! A fixed-size character grid, kept deterministic so it can be golden-tested.
//!
//! Plot elements:
//! - measured points: `o`
//! - fitted curve: `-` line

use crate::domain::{QubitTrace, ResonatorTrace};
use crate::math::stats::linspace;
use crate::models::predict_grid;

const US: f64 = 1e6;
const GHZ: f64 = 1e-9;

/// Quick-look of a qubit trace against delay (µs), with its fit if present.
pub fn render_qubit_trace(trace: &QubitTrace, width: usize, height: usize) -> String {
    let points: Vec<(f64, f64)> = trace
        .tau
        .iter()
        .zip(&trace.population)
        .map(|(&t, &p)| (t * US, p))
        .collect();

    let curve = trace.fit.as_ref().and_then(|fit| {
        let (_, t_max) = finite_range(trace.tau.iter().copied())?;
        let xs = linspace(0.0, t_max, width.max(10) * 4);
        let ys = predict_grid(fit.model, &xs, &fit.result.values());
        Some(xs.iter().zip(ys).map(|(&x, y)| (x * US, y)).collect::<Vec<_>>())
    });

    render_xy(&points, curve.as_deref(), "tau_us", width, height)
}

/// Quick-look of |S21| against frequency (GHz).
pub fn render_s21_magnitude(trace: &ResonatorTrace, width: usize, height: usize) -> String {
    let points: Vec<(f64, f64)> = trace
        .frequency
        .iter()
        .zip(&trace.s21)
        .map(|(&f, z)| (f * GHZ, z.norm()))
        .collect();
    render_xy(&points, None, "f_GHz", width, height)
}

/// Render points and an optional curve on a `width` x `height` grid.
pub fn render_xy(
    points: &[(f64, f64)],
    curve: Option<&[(f64, f64)]>,
    x_label: &str,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let all = || points.iter().chain(curve.unwrap_or_default());
    let (x_min, x_max) = finite_range(all().map(|p| p.0)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = finite_range(all().map(|p| p.1)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    if let Some(curve) = curve {
        draw_curve(&mut grid, curve, (x_min, x_max), (y_min, y_max));
    }

    for &(x, y) in points {
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = format!("Plot: {x_label}=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.3}, {y_max:.3}]\n");
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo.is_finite() && hi > lo { Some((lo, hi)) } else { None }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y_max is row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_range: (f64, f64), y_range: (f64, f64)) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if !(x.is_finite() && y.is_finite()) {
            prev = None;
            continue;
        }
        let col = map_x(x, x_range.0, x_range.1, width);
        let row = map_y(y, y_range.0, y_range.1, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticTrace, synthesize};
    use crate::domain::Measurement;

    #[test]
    fn plot_golden_snapshot_small() {
        let pts = [(0.0, 0.0), (1.0, 1.0)];
        let txt = render_xy(&pts, Some(&pts), "x", 10, 5);
        let expected = concat!(
            "Plot: x=[0.000, 1.000] | y=[-0.050, 1.050]\n",
            "        -o\n",
            "      --  \n",
            "    --    \n",
            "  --      \n",
            "o-        \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn empty_input_still_draws_a_grid() {
        let txt = render_xy(&[], None, "x", 3, 2);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[1..].iter().all(|l| l.len() == 10 && l.trim().is_empty()));
    }

    #[test]
    fn qubit_trace_uses_microseconds() {
        let truth = SyntheticTrace::decay(0.8, 30e-6, 0.1);
        let trace = synthesize(Measurement::T1, &truth, 51, 150e-6, 0.0, 1);
        let txt = render_qubit_trace(&trace, 40, 10);
        assert!(txt.starts_with("Plot: tau_us=[0.000, 150.000]"), "{txt}");
        assert!(txt.lines().skip(1).any(|row| row.contains('o')));
    }
}
