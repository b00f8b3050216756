//! Level-1 MOSFET: cutoff, triode, and saturation regions with analytic
//! partial derivatives.
//!
//! Terminal order is drain, gate, source. Gate current is zero. PMOS
//! devices evaluate the NMOS equations at negated terminal voltages and
//! negate the drain current; the conductance block is unchanged by the
//! double negation. A drain-source swap handles `Vds < 0` so the model is
//! symmetric.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::component::{MosfetParams, MosfetPolarity, ThermalParams};
use voltaic_core::mna::MnaSystem;

use crate::passive::voltage_between;
use crate::stamp::{Stamp, StampContext};
use crate::thermal::ThermalState;

#[derive(Debug, Clone)]
pub struct Mosfet {
    pub drain: Option<usize>,
    pub gate: Option<usize>,
    pub source: Option<usize>,
    pub params: MosfetParams,
    pub thermal: ThermalState,
    pub power: f64,
}

/// Drain current and partials in the normal (Vds >= 0, NMOS) frame.
struct Operating {
    id: f64,
    gm: f64,
    gds: f64,
}

impl Mosfet {
    pub fn new(
        params: MosfetParams,
        drain: Option<usize>,
        gate: Option<usize>,
        source: Option<usize>,
        ambient: f64,
    ) -> Self {
        Self {
            drain,
            gate,
            source,
            params,
            thermal: ThermalState::new(ThermalParams::default(), ambient),
            power: 0.0,
        }
    }

    fn sign(&self) -> f64 {
        match self.params.polarity {
            MosfetPolarity::Nmos => 1.0,
            MosfetPolarity::Pmos => -1.0,
        }
    }

    /// Level-1 equations for `vgs`, `vds >= 0`.
    fn evaluate(&self, vgs: f64, vds: f64) -> Operating {
        let p = &self.params;
        let beta = p.kp * p.w / p.l;
        let vov = vgs - p.vth;

        if vov <= 0.0 {
            // Cutoff: a whisper of output conductance keeps the matrix
            // well-posed before GMIN kicks in.
            return Operating {
                id: 0.0,
                gm: 0.0,
                gds: 1e-12,
            };
        }

        let lam = 1.0 + p.lambda * vds;
        if vds < vov {
            // Triode
            let id = beta * (vov * vds - 0.5 * vds * vds) * lam;
            let gm = beta * vds * lam;
            let gds = beta * (vov - vds) * lam
                + beta * (vov * vds - 0.5 * vds * vds) * p.lambda;
            Operating { id, gm, gds }
        } else {
            // Saturation
            let id = 0.5 * beta * vov * vov * lam;
            let gm = beta * vov * lam;
            let gds = 0.5 * beta * vov * vov * p.lambda;
            Operating { id, gm, gds }
        }
    }

    /// Compute the iterate in the normal frame, handling polarity and
    /// drain-source inversion. Returns (operating point, drain node,
    /// source node) in the frame used for stamping.
    fn frame(&self, vd: f64, vg: f64, vs: f64) -> (Operating, Option<usize>, Option<usize>, bool) {
        let s = self.sign();
        let (vd_n, vg_n, vs_n) = (s * vd, s * vg, s * vs);
        if vd_n >= vs_n {
            let op = self.evaluate(vg_n - vs_n, vd_n - vs_n);
            (op, self.drain, self.source, false)
        } else {
            // Inverted: swap drain/source roles.
            let op = self.evaluate(vg_n - vd_n, vs_n - vd_n);
            (op, self.source, self.drain, true)
        }
    }

    pub fn commit(&mut self, solution: &DVector<f64>, dt: f64, ambient: f64) {
        let vd = solution_voltage(solution, self.drain);
        let vg = solution_voltage(solution, self.gate);
        let vs = solution_voltage(solution, self.source);
        let (op, _, _, _) = self.frame(vd, vg, vs);
        let vds = voltage_between(solution, self.drain, self.source);
        self.power = (op.id * vds).abs();
        self.thermal.update(self.power, ambient, dt);
    }

    /// Drain current at the given solution (post-solve readout).
    pub fn drain_current(&self, solution: &DVector<f64>) -> f64 {
        let vd = solution_voltage(solution, self.drain);
        let vg = solution_voltage(solution, self.gate);
        let vs = solution_voltage(solution, self.source);
        let (op, _, _, inverted) = self.frame(vd, vg, vs);
        let s = self.sign();
        if inverted { -s * op.id } else { s * op.id }
    }
}

fn solution_voltage(solution: &DVector<f64>, idx: Option<usize>) -> f64 {
    idx.map(|i| solution[i]).unwrap_or(0.0)
}

impl Stamp for Mosfet {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        if self.thermal.failed {
            return Ok(());
        }
        let vd = ctx.voltage(self.drain);
        let vg = ctx.voltage(self.gate);
        let vs = ctx.voltage(self.source);

        let s = self.sign();
        let (op, d_node, s_node, inverted) = self.frame(vd, vg, vs);
        let g_node = self.gate;

        // Normal-frame terminal voltages for the RHS constant.
        let (vd_f, vs_f) = if inverted {
            (s * vs, s * vd)
        } else {
            (s * vd, s * vs)
        };
        let vg_f = s * vg;
        let vgs = vg_f - vs_f;
        let vds = vd_f - vs_f;

        // Linearized drain current in the normal frame:
        // id ~= Ieq + gm*vgs + gds*vds.
        let ieq = op.id - op.gm * vgs - op.gds * vds;

        {
            let m = mna.matrix_mut();
            // Drain row: current leaving = id.
            add(m, d_node, g_node, op.gm);
            add(m, d_node, s_node, -(op.gm + op.gds));
            add(m, d_node, d_node, op.gds);
            // Source row: current leaving = -id.
            add(m, s_node, g_node, -op.gm);
            add(m, s_node, s_node, op.gm + op.gds);
            add(m, s_node, d_node, -op.gds);
        }

        let rhs = mna.rhs_mut();
        if let Some(di) = d_node {
            rhs[di] -= s * ieq;
        }
        if let Some(si) = s_node {
            rhs[si] += s * ieq;
        }
        Ok(())
    }
}

fn add(m: &mut nalgebra::DMatrix<f64>, row: Option<usize>, col: Option<usize>, v: f64) {
    if let (Some(r), Some(c)) = (row, col) {
        m[(r, c)] += v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nmos() -> Mosfet {
        Mosfet::new(
            MosfetParams {
                lambda: 0.0,
                ..Default::default()
            },
            Some(0),
            Some(1),
            Some(2),
            300.0,
        )
    }

    #[test]
    fn cutoff_has_no_current() {
        let m = nmos();
        let op = m.evaluate(0.5, 5.0);
        assert_eq!(op.id, 0.0);
        assert_eq!(op.gm, 0.0);
    }

    #[test]
    fn saturation_current_is_quadratic() {
        let m = nmos();
        // beta = kp*W/L = 2e-4 * 10 = 2e-3; vov = 2 -> id = 0.5*2e-3*4 = 4 mA.
        let op = m.evaluate(3.0, 5.0);
        assert!((op.id - 4e-3).abs() < 1e-9, "id = {}", op.id);
        assert!((op.gm - 4e-3).abs() < 1e-9);
    }

    #[test]
    fn triode_current_matches_formula() {
        let m = nmos();
        // vov = 2, vds = 1: id = beta*(2*1 - 0.5) = 2e-3 * 1.5 = 3 mA.
        let op = m.evaluate(3.0, 1.0);
        assert!((op.id - 3e-3).abs() < 1e-9, "id = {}", op.id);
        // gds = beta*(vov - vds) = 2e-3.
        assert!((op.gds - 2e-3).abs() < 1e-9);
    }

    #[test]
    fn lambda_adds_output_conductance() {
        let m = Mosfet::new(
            MosfetParams {
                lambda: 0.05,
                ..Default::default()
            },
            Some(0),
            Some(1),
            Some(2),
            300.0,
        );
        let op = m.evaluate(3.0, 5.0);
        assert!(op.gds > 1e-5);
    }

    #[test]
    fn regions_join_continuously() {
        let m = nmos();
        let at_edge_triode = m.evaluate(3.0, 2.0 - 1e-9);
        let at_edge_sat = m.evaluate(3.0, 2.0 + 1e-9);
        assert!((at_edge_triode.id - at_edge_sat.id).abs() < 1e-9);
    }
}
