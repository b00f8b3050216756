//! Monte-Carlo tolerance analysis.
//!
//! Every run perturbs each tolerance-enabled component's primary value,
//! simulates a fixed duration on a private simulator clone, and records
//! the target node's final voltage. Run `i` derives its RNG stream from
//! the configured seed and `i` alone, so results are reproducible no
//! matter how the worker pool schedules them. Failed runs contribute NaN
//! and the batch continues.

use std::sync::atomic::Ordering;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use voltaic_core::circuit::{Circuit, NodeId};
use voltaic_core::config::{McDistribution, MonteCarloConfig};
use voltaic_core::error::Result;

use crate::sweep::worker_count;
use crate::{Engine, Simulator};

/// Collected Monte-Carlo output distribution.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Per-run output values in run order (NaN for failed runs).
    pub values: Vec<f64>,
    /// Bin occupancy over `[min, max]`.
    pub counts: Vec<usize>,
    pub min: f64,
    pub max: f64,
}

impl Histogram {
    /// Build a histogram over the finite values.
    pub fn from_values(values: Vec<f64>, bins: usize) -> Self {
        let bins = bins.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let (min, max) = finite.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        );
        let mut counts = vec![0usize; bins];
        if finite.is_empty() {
            return Self {
                values,
                counts,
                min: 0.0,
                max: 0.0,
            };
        }
        let width = (max - min) / bins as f64;
        for &v in &finite {
            let idx = if width > 0.0 {
                (((v - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }
        Self {
            values,
            counts,
            min,
            max,
        }
    }

    /// Mean of the finite values.
    pub fn mean(&self) -> f64 {
        let finite: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        finite.iter().sum::<f64>() / finite.len() as f64
    }

    /// Standard deviation of the finite values.
    pub fn std_dev(&self) -> f64 {
        let finite: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 2 {
            return 0.0;
        }
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (finite.len() - 1) as f64;
        var.sqrt()
    }
}

impl Engine {
    /// Run the configured Monte-Carlo analysis, measuring the final
    /// voltage at `target` after `duration` simulated seconds per run.
    pub fn run_monte_carlo(&self, target: NodeId, duration: f64) -> Result<Histogram> {
        let cfg = self.config().monte_carlo.clone();
        let cancel = self.cancel_flag();
        let base = self.simulator();

        let run = |index: usize| -> f64 {
            if cancel.load(Ordering::Relaxed) {
                return f64::NAN;
            }
            monte_carlo_run(base, &cfg, target, duration, index)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count())
            .build();
        let values: Vec<f64> = match pool {
            Ok(pool) => pool.install(|| (0..cfg.runs).into_par_iter().map(run).collect()),
            Err(e) => {
                log::warn!("monte-carlo: worker pool unavailable ({e}); running serially");
                (0..cfg.runs).map(run).collect()
            }
        };

        Ok(Histogram::from_values(values, cfg.bins))
    }
}

/// Deterministic per-run RNG: the stream depends only on seed and index.
fn run_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

fn perturb(circuit: &mut Circuit, cfg: &MonteCarloConfig, rng: &mut StdRng) {
    let ids: Vec<_> = circuit.component_ids().collect();
    for id in ids {
        let tolerance = circuit
            .component(id)
            .map(|c| c.kind.tolerance())
            .unwrap_or(0.0);
        if tolerance <= 0.0 {
            continue;
        }
        let u: f64 = match cfg.distribution {
            McDistribution::Uniform => rng.gen_range(-1.0..1.0),
            McDistribution::Gaussian => rng.sample(StandardNormal),
        };
        if let Some(comp) = circuit.component_mut(id) {
            comp.kind.scale_primary_value(1.0 + tolerance * u);
        }
    }
}

fn monte_carlo_run(
    base: &Simulator,
    cfg: &MonteCarloConfig,
    target: NodeId,
    duration: f64,
    index: usize,
) -> f64 {
    let mut rng = run_rng(cfg.seed, index);
    let mut circuit = base.circuit.clone();
    perturb(&mut circuit, cfg, &mut rng);

    let mut sim = Simulator::from_parts(circuit, base.config.clone());
    match sim.run_for(duration, None) {
        Ok(result) => match sim.row_of(target) {
            Some(row) => result
                .points
                .last()
                .map(|p| p.solution[row])
                .unwrap_or(f64::NAN),
            None => 0.0,
        },
        Err(e) => {
            log::warn!("monte-carlo run {index} failed: {e}");
            f64::NAN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_bins_cover_range() {
        let h = Histogram::from_values(vec![0.0, 0.5, 1.0, 1.0], 2);
        assert_eq!(h.counts, vec![2, 2]);
        assert_eq!(h.min, 0.0);
        assert_eq!(h.max, 1.0);
    }

    #[test]
    fn identical_values_collapse_to_one_bin() {
        let h = Histogram::from_values(vec![2.5; 10], 8);
        assert_eq!(h.counts[0], 10);
        assert_eq!(h.counts[1..].iter().sum::<usize>(), 0);
    }

    #[test]
    fn nan_runs_are_excluded_from_bins() {
        let h = Histogram::from_values(vec![1.0, f64::NAN, 2.0], 2);
        assert_eq!(h.counts.iter().sum::<usize>(), 2);
        assert_eq!(h.values.len(), 3);
    }

    #[test]
    fn run_rng_is_deterministic_per_index() {
        use rand::RngCore;
        let mut a = run_rng(42, 7);
        let mut b = run_rng(42, 7);
        assert_eq!(a.next_u64(), b.next_u64());
        let mut c = run_rng(42, 8);
        assert_ne!(a.next_u64(), c.next_u64());
    }

    #[test]
    fn statistics() {
        let h = Histogram::from_values(vec![1.0, 2.0, 3.0], 4);
        assert!((h.mean() - 2.0).abs() < 1e-12);
        assert!((h.std_dev() - 1.0).abs() < 1e-12);
    }
}
