//! Window functions for spectral analysis.
//!
//! Windowing trades main-lobe width against side-lobe leakage. Hann is the
//! default for the scope FFT; rectangular is there for coherent captures.

use std::f64::consts::PI;

/// Window function selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// No windowing. Best resolution, worst leakage.
    Rectangular,
    /// Hann window. The general-purpose default.
    #[default]
    Hann,
    /// Hamming window.
    Hamming,
    /// Blackman window. Best side-lobe suppression, widest main lobe.
    Blackman,
}

impl WindowFunction {
    /// Window coefficient for sample `i` of an `n`-sample frame.
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        if n < 2 {
            return 1.0;
        }
        let phase = 2.0 * PI * i as f64 / (n - 1) as f64;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowFunction::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
        }
    }

    /// Apply the window, returning the scaled frame.
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        signal
            .iter()
            .enumerate()
            .map(|(i, &x)| x * self.coefficient(i, n))
            .collect()
    }

    /// Mean window coefficient; normalizes FFT magnitudes.
    pub fn coherent_gain(&self, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = (0..n).map(|i| self.coefficient(i, n)).sum();
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangular_passes_through() {
        let signal = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(WindowFunction::Rectangular.apply(&signal), signal);
    }

    #[test]
    fn hann_is_zero_at_edges_and_unity_mid() {
        let signal = vec![1.0; 101];
        let windowed = WindowFunction::Hann.apply(&signal);
        assert!(windowed[0].abs() < 1e-12);
        assert!(windowed[100].abs() < 1e-12);
        assert!((windowed[50] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hamming_keeps_pedestal() {
        let signal = vec![1.0; 100];
        let windowed = WindowFunction::Hamming.apply(&signal);
        assert!((windowed[0] - 0.08).abs() < 0.01);
    }

    #[test]
    fn coherent_gains() {
        assert!((WindowFunction::Rectangular.coherent_gain(1024) - 1.0).abs() < 1e-12);
        assert!((WindowFunction::Hann.coherent_gain(1024) - 0.5).abs() < 0.01);
        assert!((WindowFunction::Hamming.coherent_gain(1024) - 0.54).abs() < 0.01);
    }
}
