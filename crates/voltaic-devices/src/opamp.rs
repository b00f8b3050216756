//! Op-amp: finite-gain model with GBW pole, slew limit, and rail clamp.
//!
//! Terminal order is in+, in-, out. The output is an augmented branch
//! equation with the output resistance folded into the branch row:
//!
//! ```text
//! V_out - R_out*i_br = clip(a*A*(V+ - V-) + (1-a)*v1_prev, Vmin, Vmax)
//! ```
//!
//! where `a = dt/(dt + tau)` discretizes the single open-loop pole at
//! `GBW/A` (a = 1 at DC or when GBW is disabled). The internal state
//! `v1_prev` advances at commit, where the slew limit also applies.
//! Ideal mode stamps a gain of 1e6 with no pole; rails still clamp.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::component::OpAmpParams;
use voltaic_core::mna::MnaSystem;

use crate::passive::voltage_between;
use crate::stamp::{Stamp, StampContext};

const IDEAL_GAIN: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct OpAmp {
    pub in_pos: Option<usize>,
    pub in_neg: Option<usize>,
    pub out: Option<usize>,
    pub branch: usize,
    pub params: OpAmpParams,
    /// Internal single-pole state (V).
    pub v1_prev: f64,
}

impl OpAmp {
    pub fn new(
        params: OpAmpParams,
        in_pos: Option<usize>,
        in_neg: Option<usize>,
        out: Option<usize>,
        branch: usize,
    ) -> Self {
        Self {
            in_pos,
            in_neg,
            out,
            branch,
            params,
            v1_prev: 0.0,
        }
    }

    fn gain(&self) -> f64 {
        if self.params.ideal {
            IDEAL_GAIN
        } else {
            self.params.gain
        }
    }

    /// Pole blend factor for the current step.
    fn alpha(&self, dt: Option<f64>) -> f64 {
        if self.params.ideal || self.params.gbw <= 0.0 {
            return 1.0;
        }
        match dt {
            None => 1.0,
            Some(h) => {
                let tau = self.gain() / (2.0 * std::f64::consts::PI * self.params.gbw);
                h / (h + tau)
            }
        }
    }

    /// Linear (unclamped) target at the current iterate.
    fn target(&self, ctx: &StampContext<'_>) -> f64 {
        let vin = ctx.voltage_between(self.in_pos, self.in_neg);
        let a = self.alpha(ctx.dt);
        a * self.gain() * vin + (1.0 - a) * self.v1_prev
    }

    pub fn reset(&mut self) {
        self.v1_prev = 0.0;
    }

    pub fn commit(&mut self, solution: &DVector<f64>, dt: f64) {
        let vin = voltage_between(solution, self.in_pos, self.in_neg);
        let a = self.alpha(Some(dt));
        let mut v1 = a * self.gain() * vin + (1.0 - a) * self.v1_prev;
        v1 = v1.clamp(self.params.v_min, self.params.v_max);
        if self.params.slew > 0.0 {
            let max_move = self.params.slew * dt;
            let delta = v1 - self.v1_prev;
            if delta.abs() > max_move {
                v1 = self.v1_prev + max_move * delta.signum();
            }
        }
        self.v1_prev = v1;
    }
}

impl Stamp for OpAmp {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        // Input impedance across the differential pair.
        if self.params.r_in > 0.0 {
            mna.stamp_conductance(self.in_pos, self.in_neg, 1.0 / self.params.r_in);
        }

        let br = mna.branch_row(self.branch);
        // Branch current couples into the output node.
        if let Some(o) = self.out {
            mna.matrix_mut()[(o, br)] += 1.0;
        }

        // Branch row: V_out - R_out*i_br = target.
        if let Some(o) = self.out {
            mna.matrix_mut()[(br, o)] += 1.0;
        }
        mna.matrix_mut()[(br, br)] -= self.params.r_out;

        let target = self.target(ctx);
        if target <= self.params.v_min {
            // Clamped at the negative rail.
            mna.rhs_mut()[br] += self.params.v_min;
        } else if target >= self.params.v_max {
            mna.rhs_mut()[br] += self.params.v_max;
        } else {
            // Linear region: move the input-dependent part into the matrix.
            let a = self.alpha(ctx.dt);
            let k = a * self.gain();
            if let Some(p) = self.in_pos {
                mna.matrix_mut()[(br, p)] -= k;
            }
            if let Some(n) = self.in_neg {
                mna.matrix_mut()[(br, n)] += k;
            }
            mna.rhs_mut()[br] += (1.0 - a) * self.v1_prev;
        }
        Ok(())
    }
}
