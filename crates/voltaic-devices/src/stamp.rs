//! The stamping contract shared by every device instance.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::mna::MnaSystem;

/// Integration rule used for reactive companion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMethod {
    /// Trapezoidal (second order, A-stable). The default for accuracy.
    #[default]
    Trapezoidal,
    /// Backward Euler (first order, L-stable). Fallback for stiff switching.
    BackwardEuler,
}

/// Per-assembly context handed to every stamp.
///
/// `dt = None` means a DC solve: capacitors open, inductors short, source
/// waveforms evaluated at `time`.
#[derive(Debug)]
pub struct StampContext<'a> {
    /// Current simulation time (s).
    pub time: f64,
    /// Proposed timestep; `None` for DC operating point.
    pub dt: Option<f64>,
    /// Companion-model integration rule for this step.
    pub method: IntegrationMethod,
    /// Current Newton iterate (node voltages then branch currents).
    pub op_point: &'a DVector<f64>,
    /// Independent-source scale in [0, 1] (source stepping).
    pub source_scale: f64,
    /// Conductance to ground added per node this iteration (GMIN ramp).
    pub gmin: f64,
    /// Ambient temperature (K).
    pub temperature: f64,
    /// Normalized ambient light level in [0, 1].
    pub light_level: f64,
    /// Newton iteration counter within the current solve.
    pub iteration: usize,
    /// Accepted-step counter; keys deterministic noise draws.
    pub step_index: u64,
}

impl<'a> StampContext<'a> {
    /// Voltage at a matrix index from the current iterate (ground = 0).
    pub fn voltage(&self, index: Option<usize>) -> f64 {
        index.map(|i| self.op_point[i]).unwrap_or(0.0)
    }

    /// Voltage across a pair of matrix indices.
    pub fn voltage_between(&self, pos: Option<usize>, neg: Option<usize>) -> f64 {
        self.voltage(pos) - self.voltage(neg)
    }

    /// Thermal voltage kT/q at the context temperature.
    pub fn vt(&self) -> f64 {
        const K_OVER_Q: f64 = 8.617_333e-5;
        K_OVER_Q * self.temperature
    }
}

/// MNA stamp contract. Stamps are additive; devices only `+=` into the
/// system. `stamp` takes `&mut self` so nonlinear devices can keep
/// per-iteration limiting memory, which is reset by `begin_step`.
pub trait Stamp {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()>;
}

/// Junction voltage at which limiting engages (V).
pub const JUNCTION_KNEE: f64 = 0.6;

/// Per-iteration junction voltage limiting.
///
/// Inside the conduction region moves are capped at `2*Vt*ln(2)` so the
/// exponential cannot run away between iterations; a jump from reverse
/// bias lands on the knee and crawls from there. Reverse-bias moves are
/// free, the exponential underflows there anyway.
pub fn limit_junction(anchor: &mut f64, v_raw: f64, vt: f64) -> f64 {
    let max_move = 2.0 * vt * (2.0f64).ln();
    let old = *anchor;
    let v = if v_raw <= JUNCTION_KNEE || (v_raw - old).abs() <= max_move {
        v_raw
    } else if old < JUNCTION_KNEE {
        JUNCTION_KNEE
    } else {
        old + max_move * (v_raw - old).signum()
    };
    *anchor = v;
    v
}

/// Exponential with linear extrapolation above the cutoff, so junction
/// stamps stay finite for any iterate.
pub fn exp_lin(x: f64) -> f64 {
    const CUTOFF: f64 = 80.0;
    if x > CUTOFF {
        CUTOFF.exp() * (1.0 + (x - CUTOFF))
    } else {
        x.exp()
    }
}

/// Derivative of [`exp_lin`].
pub fn exp_lin_deriv(x: f64) -> f64 {
    const CUTOFF: f64 = 80.0;
    if x > CUTOFF { CUTOFF.exp() } else { x.exp() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_lin_matches_exp_below_cutoff() {
        for x in [-5.0, 0.0, 10.0, 79.0] {
            assert!((exp_lin(x) - x.exp()).abs() < 1e-9 * x.exp());
        }
    }

    #[test]
    fn exp_lin_is_finite_and_monotonic_above_cutoff() {
        let a = exp_lin(100.0);
        let b = exp_lin(200.0);
        assert!(a.is_finite() && b.is_finite());
        assert!(b > a);
    }

    #[test]
    fn limiting_frees_reverse_moves() {
        let vt = 0.02585;
        let mut anchor = 0.0;
        // A large reverse move passes through untouched.
        assert_eq!(limit_junction(&mut anchor, -7.0, vt), -7.0);
        // A jump into conduction lands on the knee first.
        assert_eq!(limit_junction(&mut anchor, 5.0, vt), JUNCTION_KNEE);
        // Then crawls by at most 2*Vt*ln(2) per iteration.
        let v = limit_junction(&mut anchor, 5.0, vt);
        assert!(v - JUNCTION_KNEE <= 2.0 * vt * (2.0f64).ln() + 1e-12);
    }
}
