//! FFT magnitude/phase extraction and single-bin DFT.
//!
//! The scope FFT path uses a power-of-two radix-2 transform (default 1024
//! points) over the most recent samples; the Bode driver uses the
//! single-bin DFT over an integer number of periods instead, which avoids
//! leakage without windowing.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use super::window::WindowFunction;

/// Default FFT length for the scope display.
pub const DEFAULT_FFT_LEN: usize = 1024;

/// One-sided spectrum: `n/2 + 1` bins from DC to Nyquist.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Amplitude in dB (0 dB = unit amplitude).
    pub magnitude_db: Vec<f64>,
    /// Phase in degrees.
    pub phase_deg: Vec<f64>,
    /// Frequency step between bins (Hz).
    pub bin_hz: f64,
}

impl Spectrum {
    /// Frequency of the largest non-DC bin.
    pub fn peak_frequency(&self) -> Option<f64> {
        let (idx, _) = self
            .magnitude_db
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        Some(idx as f64 * self.bin_hz)
    }
}

/// Largest power of two not exceeding `n` (0 for n == 0).
fn prev_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1usize << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Compute the one-sided spectrum of the most recent samples.
///
/// Uses the largest power-of-two frame that fits, capped at
/// [`DEFAULT_FFT_LEN`].
pub fn fft_spectrum(samples: &[f64], sample_rate: f64, window: WindowFunction) -> Spectrum {
    let n = prev_power_of_two(samples.len()).min(DEFAULT_FFT_LEN);
    if n < 2 {
        return Spectrum {
            magnitude_db: Vec::new(),
            phase_deg: Vec::new(),
            bin_hz: 0.0,
        };
    }

    let frame = &samples[samples.len() - n..];
    let windowed = window.apply(frame);
    let gain = window.coherent_gain(n);

    let mut buffer: Vec<Complex<f64>> = windowed
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let norm = 1.0 / (n as f64 * gain);
    let mut magnitude_db = Vec::with_capacity(n / 2 + 1);
    let mut phase_deg = Vec::with_capacity(n / 2 + 1);
    for (k, value) in buffer.iter().take(n / 2 + 1).enumerate() {
        // One-sided amplitude: interior bins carry both halves.
        let scale = if k == 0 || k == n / 2 { norm } else { 2.0 * norm };
        let amplitude = value.norm() * scale;
        magnitude_db.push(20.0 * amplitude.max(1e-20).log10());
        phase_deg.push(value.arg().to_degrees());
    }

    Spectrum {
        magnitude_db,
        phase_deg,
        bin_hz: sample_rate / n as f64,
    }
}

/// Complex amplitude of `samples` at one frequency.
///
/// Correlates over the largest whole number of periods that fits (taken
/// from the end of the capture, where the circuit is closest to steady
/// state), so no window is needed.
pub fn dft_at(samples: &[f64], sample_rate: f64, frequency: f64) -> Complex<f64> {
    if samples.is_empty() || sample_rate <= 0.0 || frequency <= 0.0 {
        return Complex::new(0.0, 0.0);
    }
    let samples_per_period = sample_rate / frequency;
    let whole_periods = (samples.len() as f64 / samples_per_period).floor();
    let count = if whole_periods >= 1.0 {
        (whole_periods * samples_per_period).round() as usize
    } else {
        samples.len()
    }
    .min(samples.len());

    let frame = &samples[samples.len() - count..];
    let omega = 2.0 * std::f64::consts::PI * frequency / sample_rate;
    let mut acc = Complex::new(0.0, 0.0);
    for (k, &x) in frame.iter().enumerate() {
        let phase = -omega * k as f64;
        acc += Complex::new(phase.cos(), phase.sin()) * x;
    }
    acc * (2.0 / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_finds_sine_peak() {
        let fs = 1024.0;
        let f = 64.0;
        let samples: Vec<f64> = (0..1024)
            .map(|k| (2.0 * std::f64::consts::PI * f * k as f64 / fs).sin())
            .collect();
        let spectrum = fft_spectrum(&samples, fs, WindowFunction::Hann);
        assert_eq!(spectrum.magnitude_db.len(), 513);
        let peak = spectrum.peak_frequency().unwrap();
        assert!((peak - f).abs() <= spectrum.bin_hz, "peak at {peak} Hz");
        // Unit amplitude -> ~0 dB at the peak bin.
        let bin = (f / spectrum.bin_hz).round() as usize;
        assert!(
            spectrum.magnitude_db[bin].abs() < 0.5,
            "peak magnitude {} dB",
            spectrum.magnitude_db[bin]
        );
    }

    #[test]
    fn fft_length_is_power_of_two_cap() {
        let samples = vec![0.0; 3000];
        let spectrum = fft_spectrum(&samples, 1000.0, WindowFunction::Hann);
        // Capped at 1024 -> 513 bins.
        assert_eq!(spectrum.magnitude_db.len(), 513);
    }

    #[test]
    fn dft_amplitude_and_phase_of_sine() {
        let fs = 100e3;
        let f = 1e3;
        let samples: Vec<f64> = (0..5000)
            .map(|k| 2.0 * (2.0 * std::f64::consts::PI * f * k as f64 / fs).sin())
            .collect();
        let x = dft_at(&samples, fs, f);
        assert!((x.norm() - 2.0).abs() < 1e-6, "amplitude {}", x.norm());
        // sin = cos shifted by -90 degrees.
        assert!(
            (x.arg().to_degrees() + 90.0).abs() < 0.1,
            "phase {}",
            x.arg().to_degrees()
        );
    }

    #[test]
    fn dft_of_dc_free_signal_rejects_other_tones() {
        let fs = 100e3;
        let samples: Vec<f64> = (0..10_000)
            .map(|k| (2.0 * std::f64::consts::PI * 2e3 * k as f64 / fs).sin())
            .collect();
        let x = dft_at(&samples, fs, 1e3);
        assert!(x.norm() < 1e-6, "leakage {}", x.norm());
    }

    #[test]
    fn empty_input_is_empty_spectrum() {
        let spectrum = fft_spectrum(&[], 1.0, WindowFunction::Hann);
        assert!(spectrum.magnitude_db.is_empty());
    }
}
