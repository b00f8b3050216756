//! Independent source instances.
//!
//! Voltage sources augment the MNA system with a branch row; series
//! resistance is folded into that row. Current sources inject into the
//! node rows directly. Noise sources draw one deterministic sample per
//! accepted step, keyed by component id and step index so a halved and
//! retried step never advances the stream.

use rand::{Rng, SeedableRng, rngs::StdRng};
use voltaic_core::Result;
use voltaic_core::Waveform;
use voltaic_core::component::SweepConfig;
use voltaic_core::mna::MnaSystem;

use crate::stamp::{Stamp, StampContext};
use crate::waveforms;

/// Instantaneous source value with sweep modulation and noise applied.
fn instantaneous_value(
    waveform: &Waveform,
    sweep: Option<&SweepConfig>,
    seed: u64,
    ctx: &StampContext<'_>,
) -> f64 {
    let mut value = match *waveform {
        Waveform::Noise { amplitude, offset } => {
            let mut rng = StdRng::seed_from_u64(seed ^ ctx.step_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            offset + amplitude * rng.gen_range(-1.0..1.0)
        }
        _ => waveforms::eval(waveform, ctx.time),
    };
    if let Some(cfg) = sweep {
        if cfg.enabled {
            // The sweep replaces the waveform amplitude with its
            // interpolated value, preserving the waveform shape.
            let scale = waveforms::sweep_value(cfg, ctx.time);
            let amp = waveform.amplitude();
            if amp.abs() > 0.0 {
                value = value / amp * scale;
            } else {
                value = scale;
            }
        }
    }
    value * ctx.source_scale
}

/// Independent voltage source (DC, AC, or waveform generator).
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub node_pos: Option<usize>,
    pub node_neg: Option<usize>,
    pub branch: usize,
    pub waveform: Waveform,
    pub series_resistance: f64,
    pub sweep: Option<SweepConfig>,
    /// Deterministic noise seed (derived from the component id).
    pub seed: u64,
    /// Value stamped during the last assembly (display/bode reference).
    pub last_value: f64,
}

impl VoltageSource {
    pub fn new(
        waveform: Waveform,
        node_pos: Option<usize>,
        node_neg: Option<usize>,
        branch: usize,
    ) -> Self {
        Self {
            node_pos,
            node_neg,
            branch,
            waveform,
            series_resistance: 0.0,
            sweep: None,
            seed: 0,
            last_value: 0.0,
        }
    }
}

impl Stamp for VoltageSource {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        let v = instantaneous_value(&self.waveform, self.sweep.as_ref(), self.seed, ctx);
        self.last_value = v;
        mna.stamp_voltage_source(self.node_pos, self.node_neg, self.branch, v);
        if self.series_resistance > 0.0 {
            mna.stamp_branch_resistance(self.branch, self.series_resistance);
        }
        Ok(())
    }
}

/// Independent current source. Current flows from `node_pos` through the
/// external circuit into `node_neg`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub node_pos: Option<usize>,
    pub node_neg: Option<usize>,
    pub waveform: Waveform,
    /// Internal shunt resistance (ohm); 0 means ideal.
    pub shunt_resistance: f64,
    pub sweep: Option<SweepConfig>,
    pub seed: u64,
    pub last_value: f64,
}

impl Stamp for CurrentSource {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        let i = instantaneous_value(&self.waveform, self.sweep.as_ref(), self.seed, ctx);
        self.last_value = i;
        // Injected out of the positive terminal.
        mna.stamp_current_source(self.node_neg, self.node_pos, i);
        if self.shunt_resistance > 0.0 {
            mna.stamp_conductance(self.node_pos, self.node_neg, 1.0 / self.shunt_resistance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::IntegrationMethod;
    use nalgebra::dvector;

    fn ctx_at(op: &nalgebra::DVector<f64>, time: f64, step_index: u64) -> StampContext<'_> {
        StampContext {
            time,
            dt: None,
            method: IntegrationMethod::Trapezoidal,
            op_point: op,
            source_scale: 1.0,
            gmin: 1e-12,
            temperature: 300.0,
            light_level: 0.5,
            iteration: 0,
            step_index,
        }
    }

    #[test]
    fn dc_voltage_source_stamp() {
        let op = dvector![0.0, 0.0];
        let mut src = VoltageSource::new(Waveform::Dc { value: 5.0 }, Some(0), None, 0);
        let mut mna = MnaSystem::new(1, 1);
        src.stamp(&mut mna, &ctx_at(&op, 0.0, 0)).unwrap();
        assert_eq!(mna.rhs()[1], 5.0);
        assert_eq!(mna.matrix()[(0, 1)], 1.0);
        assert_eq!(mna.matrix()[(1, 0)], 1.0);
    }

    #[test]
    fn ac_source_tracks_time() {
        let op = dvector![0.0, 0.0];
        let mut src = VoltageSource::new(
            Waveform::Sine {
                amplitude: 5.0,
                frequency: 60.0,
                phase: 0.0,
                offset: 0.0,
            },
            Some(0),
            None,
            0,
        );
        let mut mna = MnaSystem::new(1, 1);
        let t_peak = 1.0 / 240.0;
        src.stamp(&mut mna, &ctx_at(&op, t_peak, 0)).unwrap();
        assert!((mna.rhs()[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn noise_is_deterministic_per_step() {
        let op = dvector![0.0, 0.0];
        let noise = Waveform::Noise {
            amplitude: 1.0,
            offset: 0.0,
        };
        let mut a = VoltageSource::new(noise.clone(), Some(0), None, 0);
        a.seed = 42;
        let mut b = VoltageSource::new(noise, Some(0), None, 0);
        b.seed = 42;

        let mut mna_a = MnaSystem::new(1, 1);
        let mut mna_b = MnaSystem::new(1, 1);
        a.stamp(&mut mna_a, &ctx_at(&op, 0.0, 3)).unwrap();
        b.stamp(&mut mna_b, &ctx_at(&op, 0.0, 3)).unwrap();
        assert_eq!(a.last_value, b.last_value);

        // A different step draws a different sample (overwhelmingly likely).
        let mut mna_c = MnaSystem::new(1, 1);
        b.stamp(&mut mna_c, &ctx_at(&op, 0.0, 4)).unwrap();
        assert_ne!(a.last_value, b.last_value);
    }

    #[test]
    fn source_scale_applies() {
        let op = dvector![0.0, 0.0];
        let mut src = VoltageSource::new(Waveform::Dc { value: 10.0 }, Some(0), None, 0);
        let mut mna = MnaSystem::new(1, 1);
        let ctx = StampContext {
            source_scale: 0.3,
            ..ctx_at(&op, 0.0, 0)
        };
        src.stamp(&mut mna, &ctx).unwrap();
        assert!((mna.rhs()[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn current_source_injects_at_positive_node() {
        let op = dvector![0.0, 0.0];
        let mut src = CurrentSource {
            node_pos: Some(0),
            node_neg: Some(1),
            waveform: Waveform::Dc { value: 2e-3 },
            shunt_resistance: 0.0,
            sweep: None,
            seed: 0,
            last_value: 0.0,
        };
        let mut mna = MnaSystem::new(2, 0);
        src.stamp(&mut mna, &ctx_at(&op, 0.0, 0)).unwrap();
        assert!((mna.rhs()[0] - 2e-3).abs() < 1e-15);
        assert!((mna.rhs()[1] + 2e-3).abs() < 1e-15);
    }
}
