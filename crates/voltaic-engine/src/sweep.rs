//! Parametric sweep driver.
//!
//! Each sweep point owns a private simulator built from a fresh circuit
//! clone, so no reactive state or operating point leaks between points.
//! Points are embarrassingly parallel and run on a bounded rayon pool;
//! results come back in point order regardless of completion order.

use std::sync::atomic::Ordering;
use std::thread::available_parallelism;

use rayon::prelude::*;
use voltaic_core::circuit::NodeId;
use voltaic_core::component::ComponentId;
use voltaic_core::error::Result;

use crate::{Engine, Simulator};

/// Upper bound on sweep/Monte-Carlo worker threads.
pub(crate) const MAX_WORKERS: usize = 32;

pub(crate) fn worker_count() -> usize {
    available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
}

/// Parametric sweep description.
#[derive(Debug, Clone)]
pub struct SweepSpec {
    /// Component whose primary value is swept.
    pub component: ComponentId,
    pub start: f64,
    pub end: f64,
    pub points: usize,
    /// Log-spaced points instead of linear.
    pub logarithmic: bool,
    /// Simulated duration per point (s).
    pub duration: f64,
    /// Node whose waveform is recorded.
    pub output: NodeId,
}

impl SweepSpec {
    fn values(&self) -> Vec<f64> {
        if self.points == 0 {
            return Vec::new();
        }
        if self.points == 1 {
            return vec![self.start];
        }
        (0..self.points)
            .map(|k| {
                let s = k as f64 / (self.points - 1) as f64;
                if self.logarithmic {
                    let start = self.start.max(f64::MIN_POSITIVE);
                    let end = self.end.max(f64::MIN_POSITIVE);
                    start * (end / start).powf(s)
                } else {
                    self.start + (self.end - self.start) * s
                }
            })
            .collect()
    }
}

/// Recorded waveform of one sweep point.
#[derive(Debug, Clone)]
pub struct SweepWaveform {
    /// Parameter value applied at this point.
    pub value: f64,
    /// `(t, V)` samples of the output node; empty when the point failed
    /// or was cancelled.
    pub samples: Vec<(f64, f64)>,
    pub converged: bool,
}

impl Engine {
    /// Run a parametric sweep. Per-point failures produce empty,
    /// unconverged waveforms; the batch always completes in point order.
    pub fn run_sweep(&self, spec: &SweepSpec) -> Result<Vec<SweepWaveform>> {
        let values = spec.values();
        let cancel = self.cancel_flag();
        let base = self.simulator();

        let run_point = |&value: &f64| -> SweepWaveform {
            if cancel.load(Ordering::Relaxed) {
                return SweepWaveform {
                    value,
                    samples: Vec::new(),
                    converged: false,
                };
            }
            sweep_point(base, spec, value)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count())
            .build();
        let results = match pool {
            Ok(pool) => pool.install(|| values.par_iter().map(run_point).collect()),
            Err(e) => {
                log::warn!("sweep: worker pool unavailable ({e}); running serially");
                values.iter().map(run_point).collect()
            }
        };
        Ok(results)
    }
}

fn sweep_point(base: &Simulator, spec: &SweepSpec, value: f64) -> SweepWaveform {
    let mut circuit = base.circuit.clone();
    if let Some(comp) = circuit.component_mut(spec.component) {
        comp.kind.set_primary_value(value);
    }

    // A fresh simulator guarantees zeroed reactive state and a fresh
    // operating point for every sweep point.
    let mut sim = Simulator::from_parts(circuit, base.config.clone());
    let result = match sim.run_for(spec.duration, None) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("sweep point {value:.3e} failed: {e}");
            return SweepWaveform {
                value,
                samples: Vec::new(),
                converged: false,
            };
        }
    };

    let samples = match sim.row_of(spec.output) {
        Some(row) => result.voltage_waveform(row),
        None => result.points.iter().map(|p| (p.time, 0.0)).collect(),
    };
    SweepWaveform {
        value,
        samples,
        converged: true,
    }
}
