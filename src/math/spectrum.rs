//! Discrete Fourier magnitude spectrum and local-maximum detection.
//!
//! Traces are short (tens to a few hundred samples), so a direct O(N^2) DFT is
//! plenty. Frequencies follow the `numpy.fft.fftfreq` layout.

use std::f64::consts::PI;

use num_complex::Complex64;

/// Positive-frequency half of a magnitude spectrum.
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    /// Bin frequencies, strictly positive and increasing.
    pub freqs: Vec<f64>,
    /// `|DFT|` at each bin.
    pub amplitudes: Vec<f64>,
}

impl Spectrum {
    /// Frequency spacing between bins.
    pub fn bin_width(&self) -> Option<f64> {
        match self.freqs.as_slice() {
            [a, b, ..] => Some(b - a),
            [a] => Some(*a),
            [] => None,
        }
    }
}

/// Full complex DFT of a real signal.
pub fn dft(signal: &[f64]) -> Vec<Complex64> {
    let n = signal.len();
    (0..n)
        .map(|k| {
            signal
                .iter()
                .enumerate()
                .map(|(j, &v)| {
                    let angle = -2.0 * PI * (k * j % n) as f64 / n as f64;
                    Complex64::from_polar(v, angle)
                })
                .sum()
        })
        .collect()
}

/// Sample frequencies for an `n`-point transform with spacing `dt`.
pub fn fftfreq(n: usize, dt: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * dt);
    let half = n.div_ceil(2);
    (0..n)
        .map(|k| {
            let k = if k < half { k as f64 } else { k as f64 - n as f64 };
            k * scale
        })
        .collect()
}

/// Magnitude spectrum of the mean-subtracted signal, positive bins only.
pub fn positive_spectrum(signal: &[f64], dt: f64) -> Spectrum {
    let n = signal.len();
    if n < 2 || !(dt.is_finite() && dt > 0.0) {
        return Spectrum::default();
    }
    let m = signal.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = signal.iter().map(|v| v - m).collect();
    let transform = dft(&centered);
    let freqs = fftfreq(n, dt);

    let mut out = Spectrum::default();
    for (f, c) in freqs.into_iter().zip(transform) {
        if f > 0.0 {
            out.freqs.push(f);
            out.amplitudes.push(c.norm());
        }
    }
    out
}

/// Indices of local maxima (`scipy.signal.find_peaks` without conditions).
///
/// A flat plateau counts once, at its middle sample (rounded down). The first
/// and last samples are never peaks.
pub fn find_peaks(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let n = values.len();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                let left = i;
                let right = ahead - 1;
                peaks.push((left + right) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fftfreq_matches_numpy_layout() {
        let f = fftfreq(4, 0.25);
        assert_eq!(f, vec![0.0, 1.0, -2.0, -1.0]);
        let f = fftfreq(5, 1.0);
        let expected = [0.0, 0.2, 0.4, -0.4, -0.2];
        for (a, b) in f.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let n = 64;
        let dt = 1e-6;
        let f0 = 8.0 / (n as f64 * dt);
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * f0 * i as f64 * dt).cos())
            .collect();
        let spec = positive_spectrum(&signal, dt);
        // Off-bin amplitudes are rounding noise; only the tone itself matters.
        let peaks: Vec<usize> = find_peaks(&spec.amplitudes)
            .into_iter()
            .filter(|&i| spec.amplitudes[i] > 1e-6)
            .collect();
        assert_eq!(peaks.len(), 1);
        assert!((spec.freqs[peaks[0]] - f0).abs() < 1e-6);
        assert!((spec.amplitudes[peaks[0]] - n as f64 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn find_peaks_handles_plateaus_and_edges() {
        assert_eq!(find_peaks(&[3.0, 1.0, 2.0, 1.0]), vec![2]);
        assert_eq!(find_peaks(&[0.0, 1.0, 1.0, 1.0, 0.0]), vec![2]);
        assert_eq!(find_peaks(&[0.0, 1.0, 1.0, 2.0]), Vec::<usize>::new());
        assert!(find_peaks(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn constant_signal_has_no_peaks() {
        let spec = positive_spectrum(&[0.5; 32], 1e-6);
        assert!(find_peaks(&spec.amplitudes).is_empty());
    }
}
