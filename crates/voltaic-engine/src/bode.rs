//! Bode (small-signal AC sweep) driver.
//!
//! For each log-spaced frequency the designated source is retuned, a
//! private simulator runs to steady state (several periods past the
//! circuit's settling), and the transfer function is extracted with a
//! single-bin DFT of output over input. A failed point becomes a NaN row;
//! the batch never aborts.

use std::sync::atomic::Ordering;

use num_complex::Complex;
use voltaic_core::circuit::NodeId;
use voltaic_core::component::{ComponentId, ComponentKind};
use voltaic_core::config::BodeConfig;
use voltaic_core::error::{CoreError, Result};
use voltaic_solver::spectral::dft_at;

use crate::{Engine, Simulator};

/// One row of a Bode plot.
#[derive(Debug, Clone, Copy)]
pub struct BodePoint {
    pub frequency: f64,
    pub magnitude_db: f64,
    pub phase_deg: f64,
}

/// Samples per signal period used for steady-state capture.
const SAMPLES_PER_PERIOD: usize = 64;
/// Periods allowed for settling before measurement.
const SETTLE_PERIODS: f64 = 6.0;
/// Periods measured for the DFT.
const MEASURE_PERIODS: f64 = 8.0;

impl Engine {
    /// Sweep `source` across the configured band and report
    /// `V(output)/V(source)` as magnitude and phase.
    pub fn run_bode(
        &self,
        source: ComponentId,
        output: NodeId,
        cfg: &BodeConfig,
    ) -> Result<Vec<BodePoint>> {
        if cfg.num_points == 0 || cfg.f_start <= 0.0 || cfg.f_stop < cfg.f_start {
            return Err(CoreError::CorruptNetlist(
                "bode: empty or non-positive frequency range".into(),
            ));
        }

        let cancel = self.cancel_flag();
        let base = self.simulator();
        let ratio = cfg.f_stop / cfg.f_start;
        let mut points = Vec::with_capacity(cfg.num_points);

        for k in 0..cfg.num_points {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let s = if cfg.num_points == 1 {
                0.0
            } else {
                k as f64 / (cfg.num_points - 1) as f64
            };
            let frequency = cfg.f_start * ratio.powf(s);

            let point = match bode_point(base, source, output, frequency) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("bode point at {frequency:.3} Hz failed: {e}");
                    BodePoint {
                        frequency,
                        magnitude_db: f64::NAN,
                        phase_deg: f64::NAN,
                    }
                }
            };
            points.push(point);
        }

        Ok(points)
    }
}

fn bode_point(
    base: &Simulator,
    source: ComponentId,
    output: NodeId,
    frequency: f64,
) -> Result<BodePoint> {
    let mut circuit = base.circuit.clone();
    let (in_pos, in_neg) = {
        let comp = circuit.component_mut(source).ok_or_else(|| {
            CoreError::CorruptNetlist(format!("bode: source {} not found", source.as_u32()))
        })?;
        match &mut comp.kind {
            ComponentKind::VoltageSource(p) => p.waveform.set_frequency(frequency),
            _ => {
                return Err(CoreError::CorruptNetlist(
                    "bode: designated component is not a voltage source".into(),
                ));
            }
        }
        (comp.terminals[0], comp.terminals[1])
    };

    let mut config = base.config.clone();
    let dt = (1.0 / (frequency * 200.0)).clamp(1e-12, 1e-3);
    config.dt_init = dt;
    config.dt_min = config.dt_min.min(dt);
    config.dt_max = dt;

    let mut sim = Simulator::from_parts(circuit, config);
    let period = 1.0 / frequency;
    let tstop = (SETTLE_PERIODS + MEASURE_PERIODS) * period;
    let result = sim.run_for(tstop, None)?;

    let row_out = sim.row_of(output);
    let row_in_pos = sim.row_of(in_pos);
    let row_in_neg = sim.row_of(in_neg);

    // Resample the measurement window on a uniform grid so the DFT sees an
    // exact whole number of periods.
    let n = (MEASURE_PERIODS as usize) * SAMPLES_PER_PERIOD;
    let fs = SAMPLES_PER_PERIOD as f64 * frequency;
    let t0 = tstop - MEASURE_PERIODS * period;
    let mut v_out = Vec::with_capacity(n);
    let mut v_in = Vec::with_capacity(n);
    for k in 0..n {
        let t = t0 + k as f64 / fs;
        let sample = |row: Option<usize>| -> f64 {
            row.and_then(|r| result.voltage_at(r, t)).unwrap_or(0.0)
        };
        v_out.push(sample(row_out));
        v_in.push(sample(row_in_pos) - sample(row_in_neg));
    }

    let x_out = dft_at(&v_out, fs, frequency);
    let x_in = dft_at(&v_in, fs, frequency);
    if x_in.norm() < 1e-12 {
        return Err(CoreError::Overflow("bode: input amplitude is zero".into()));
    }

    let h: Complex<f64> = x_out / x_in;
    let mut phase = h.arg().to_degrees();
    if phase > 180.0 {
        phase -= 360.0;
    } else if phase <= -180.0 {
        phase += 360.0;
    }

    Ok(BodePoint {
        frequency,
        magnitude_db: 20.0 * h.norm().max(1e-20).log10(),
        phase_deg: phase,
    })
}
