//! Waveform evaluation for time-varying sources.
//!
//! The persisted [`Waveform`] shape lives in `voltaic-core`; this module
//! turns it into instantaneous values. Noise is excluded here because it
//! needs the per-component RNG (see `sources`).

use std::f64::consts::PI;

use voltaic_core::Waveform;
use voltaic_core::component::{SweepConfig, SweepMode, SweepRepeat};

/// Evaluate a deterministic waveform at time `t`.
///
/// For `Noise` this returns the offset only; the random part is drawn by
/// the source instance.
pub fn eval(w: &Waveform, t: f64) -> f64 {
    match *w {
        Waveform::Dc { value } => value,
        Waveform::Sine {
            amplitude,
            frequency,
            phase,
            offset,
        } => offset + amplitude * (2.0 * PI * frequency * t + phase).sin(),
        Waveform::Square {
            amplitude,
            frequency,
            phase,
            offset,
            duty,
            rise,
            fall,
        } => {
            let period = 1.0 / frequency.max(f64::MIN_POSITIVE);
            let mut x = (t + phase / (2.0 * PI * frequency.max(f64::MIN_POSITIVE))) % period;
            if x < 0.0 {
                x += period;
            }
            let duty = duty.clamp(0.01, 0.99);
            let t_high = duty * period;
            let lo = offset - amplitude;
            let hi = offset + amplitude;
            if x < rise.min(t_high) {
                // Rising edge
                lo + (hi - lo) * (x / rise.max(f64::MIN_POSITIVE))
            } else if x < t_high {
                hi
            } else if x < t_high + fall {
                hi + (lo - hi) * ((x - t_high) / fall.max(f64::MIN_POSITIVE))
            } else {
                lo
            }
        }
        Waveform::Triangle {
            amplitude,
            frequency,
            phase,
            offset,
        } => {
            let mut x = (frequency * t + phase / (2.0 * PI)).fract();
            if x < 0.0 {
                x += 1.0;
            }
            let tri = if x < 0.5 {
                4.0 * x - 1.0
            } else {
                3.0 - 4.0 * x
            };
            offset + amplitude * tri
        }
        Waveform::Sawtooth {
            amplitude,
            frequency,
            phase,
            offset,
        } => {
            let mut x = (frequency * t + phase / (2.0 * PI)).fract();
            if x < 0.0 {
                x += 1.0;
            }
            offset + amplitude * (2.0 * x - 1.0)
        }
        Waveform::Noise { offset, .. } => offset,
    }
}

/// Normalized sweep position `s(t)` in [0, 1] for an enabled sweep.
fn sweep_position(cfg: &SweepConfig, t: f64) -> f64 {
    let duration = cfg.duration.max(f64::MIN_POSITIVE);
    let raw = t / duration;
    let s = match cfg.repeat {
        SweepRepeat::Once => raw.clamp(0.0, 1.0),
        SweepRepeat::Repeat => raw.fract(),
        SweepRepeat::Bidirectional => {
            let x = (raw * 0.5).fract() * 2.0;
            if x < 1.0 { x } else { 2.0 - x }
        }
    };
    match cfg.mode {
        SweepMode::Linear | SweepMode::Logarithmic => s,
        SweepMode::Stepped => {
            let steps = cfg.steps.max(1) as f64;
            (s * steps).floor() / steps
        }
    }
}

/// Instantaneous swept value `interp(start, end, s(t))`.
pub fn sweep_value(cfg: &SweepConfig, t: f64) -> f64 {
    let s = sweep_position(cfg, t);
    match cfg.mode {
        SweepMode::Logarithmic => {
            let start = cfg.start.max(f64::MIN_POSITIVE);
            let end = cfg.end.max(f64::MIN_POSITIVE);
            start * (end / start).powf(s)
        }
        _ => cfg.start + (cfg.end - cfg.start) * s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_is_constant() {
        let w = Waveform::Dc { value: 3.3 };
        assert_eq!(eval(&w, 0.0), 3.3);
        assert_eq!(eval(&w, 1.0), 3.3);
    }

    #[test]
    fn sine_peaks_at_quarter_period() {
        let w = Waveform::Sine {
            amplitude: 5.0,
            frequency: 60.0,
            phase: 0.0,
            offset: 0.0,
        };
        let t_peak = 1.0 / (4.0 * 60.0);
        assert!((eval(&w, t_peak) - 5.0).abs() < 1e-9);
        assert!(eval(&w, 0.0).abs() < 1e-9);
    }

    #[test]
    fn square_respects_duty() {
        let w = Waveform::Square {
            amplitude: 2.5,
            frequency: 1000.0,
            phase: 0.0,
            offset: 2.5,
            duty: 0.5,
            rise: 0.0,
            fall: 0.0,
        };
        // First half-period high, second low.
        assert!((eval(&w, 0.1e-3) - 5.0).abs() < 1e-9);
        assert!((eval(&w, 0.6e-3) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn triangle_hits_extremes() {
        let w = Waveform::Triangle {
            amplitude: 1.0,
            frequency: 1.0,
            phase: 0.0,
            offset: 0.0,
        };
        assert!((eval(&w, 0.0) + 1.0).abs() < 1e-9);
        assert!((eval(&w, 0.5) - 1.0).abs() < 1e-9);
        assert!((eval(&w, 1.0) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn sawtooth_ramps() {
        let w = Waveform::Sawtooth {
            amplitude: 1.0,
            frequency: 1.0,
            phase: 0.0,
            offset: 0.0,
        };
        assert!((eval(&w, 0.25) + 0.5).abs() < 1e-9);
        assert!((eval(&w, 0.75) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn linear_sweep_interpolates() {
        let cfg = SweepConfig {
            enabled: true,
            start: 1.0,
            end: 3.0,
            duration: 2.0,
            mode: SweepMode::Linear,
            steps: 10,
            repeat: SweepRepeat::Once,
        };
        assert!((sweep_value(&cfg, 0.0) - 1.0).abs() < 1e-12);
        assert!((sweep_value(&cfg, 1.0) - 2.0).abs() < 1e-12);
        assert!((sweep_value(&cfg, 5.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn log_sweep_is_geometric() {
        let cfg = SweepConfig {
            enabled: true,
            start: 10.0,
            end: 1000.0,
            duration: 1.0,
            mode: SweepMode::Logarithmic,
            steps: 10,
            repeat: SweepRepeat::Once,
        };
        assert!((sweep_value(&cfg, 0.5) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn bidirectional_sweep_triangles() {
        let cfg = SweepConfig {
            enabled: true,
            start: 0.0,
            end: 1.0,
            duration: 1.0,
            mode: SweepMode::Linear,
            steps: 10,
            repeat: SweepRepeat::Bidirectional,
        };
        assert!((sweep_value(&cfg, 1.0) - 1.0).abs() < 1e-12);
        assert!((sweep_value(&cfg, 1.5) - 0.5).abs() < 1e-12);
        assert!(sweep_value(&cfg, 2.0).abs() < 1e-12);
    }
}
