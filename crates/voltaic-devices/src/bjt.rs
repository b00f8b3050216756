//! Bipolar junction transistor: Ebers-Moll with Early effect.
//!
//! Terminal order is collector, base, emitter. PNP devices evaluate the
//! NPN equations at negated junction voltages and negate the resulting
//! currents; the conductance block is identical by symmetry.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::component::{BjtParams, BjtPolarity, ThermalParams};
use voltaic_core::mna::MnaSystem;

use crate::passive::voltage_between;
use crate::stamp::{Stamp, StampContext, exp_lin, exp_lin_deriv, limit_junction};
use crate::thermal::ThermalState;

/// Linearized large-signal state at one iterate.
struct Linearization {
    ic: f64,
    ib: f64,
    /// dIc/dVbe, dIc/dVbc, dIb/dVbe, dIb/dVbc.
    gc_be: f64,
    gc_bc: f64,
    gb_be: f64,
    gb_bc: f64,
}

#[derive(Debug, Clone)]
pub struct Bjt {
    pub collector: Option<usize>,
    pub base: Option<usize>,
    pub emitter: Option<usize>,
    pub params: BjtParams,
    pub thermal: ThermalState,
    vbe_iter: f64,
    vbc_iter: f64,
    pub power: f64,
}

impl Bjt {
    pub fn new(
        params: BjtParams,
        collector: Option<usize>,
        base: Option<usize>,
        emitter: Option<usize>,
        ambient: f64,
    ) -> Self {
        Self {
            collector,
            base,
            emitter,
            params,
            thermal: ThermalState::new(ThermalParams::default(), ambient),
            vbe_iter: 0.0,
            vbc_iter: 0.0,
            power: 0.0,
        }
    }

    fn sign(&self) -> f64 {
        match self.params.polarity {
            BjtPolarity::Npn => 1.0,
            BjtPolarity::Pnp => -1.0,
        }
    }

    /// Ebers-Moll evaluation in the NPN frame.
    fn evaluate(&self, vbe: f64, vbc: f64, vt: f64) -> Linearization {
        let p = &self.params;

        if p.ideal {
            // Ideal mode: Vbe clamps at 0.7 V through a stiff base
            // conductance; Ic mirrors beta*Ib. No Early effect.
            const G_IDEAL: f64 = 1.0;
            const VBE_ON: f64 = 0.7;
            if vbe < 0.5 {
                return Linearization {
                    ic: 0.0,
                    ib: 0.0,
                    gc_be: 0.0,
                    gc_bc: 0.0,
                    gb_be: 0.0,
                    gb_bc: 0.0,
                };
            }
            let ib = G_IDEAL * (vbe - VBE_ON);
            return Linearization {
                ic: p.beta * ib,
                ib,
                gc_be: p.beta * G_IDEAL,
                gc_bc: 0.0,
                gb_be: G_IDEAL,
                gb_bc: 0.0,
            };
        }

        let nf_vt = p.nf * vt;
        let xf = vbe / nf_vt;
        let i_f = p.is * (exp_lin(xf) - 1.0);
        let g_if = p.is / nf_vt * exp_lin_deriv(xf);

        let xr = vbc / vt;
        let i_r = p.is * (exp_lin(xr) - 1.0);
        let g_ir = p.is / vt * exp_lin_deriv(xr);

        // Early effect scales the transport current.
        let (early, d_early_dvbc) = if p.vaf > 0.0 {
            (1.0 - vbc / p.vaf, -1.0 / p.vaf)
        } else {
            (1.0, 0.0)
        };

        let icc = (i_f - i_r) * early;
        let ic = icc - i_r / p.beta_r;
        let ib = i_f / p.beta + i_r / p.beta_r;

        Linearization {
            ic,
            ib,
            gc_be: g_if * early,
            gc_bc: -g_ir * early + (i_f - i_r) * d_early_dvbc - g_ir / p.beta_r,
            gb_be: g_if / p.beta,
            gb_bc: g_ir / p.beta_r,
        }
    }

    pub fn commit(&mut self, solution: &DVector<f64>, dt: f64, ambient: f64, vt: f64) {
        let s = self.sign();
        let vbe = s * voltage_between(solution, self.base, self.emitter);
        let vbc = s * voltage_between(solution, self.base, self.collector);
        self.vbe_iter = vbe;
        self.vbc_iter = vbc;
        let lin = self.evaluate(vbe, vbc, vt);
        let vce = voltage_between(solution, self.collector, self.emitter);
        self.power = (lin.ic * vce).abs() + (lin.ib * 0.7).abs();
        self.thermal.update(self.power, ambient, dt);
    }
}

impl Stamp for Bjt {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        if self.thermal.failed {
            return Ok(());
        }
        let vt = ctx.vt();
        let s = self.sign();

        // Work in the NPN frame: PNP junction voltages are negated.
        let vbe_raw = s * ctx.voltage_between(self.base, self.emitter);
        let vbc_raw = s * ctx.voltage_between(self.base, self.collector);
        let vbe = limit_junction(&mut self.vbe_iter, vbe_raw, vt);
        let vbc = limit_junction(&mut self.vbc_iter, vbc_raw, vt);

        let lin = self.evaluate(vbe, vbc, vt);

        // RHS equivalents in the NPN frame; actual currents flip with `s`,
        // conductances do not (double negation).
        let ieq_c = lin.ic - lin.gc_be * vbe - lin.gc_bc * vbc;
        let ieq_b = lin.ib - lin.gb_be * vbe - lin.gb_bc * vbc;

        // Column contributions: vbe = s*(Vb - Ve), vbc = s*(Vb - Vc). The
        // polarity sign cancels in the conductance block (double negation),
        // so both polarities stamp the same matrix pattern.
        let (c, b, e) = (self.collector, self.base, self.emitter);
        {
            let m = mna.matrix_mut();
            // Collector row: current leaving = Ic(vbe, vbc).
            add(m, c, b, lin.gc_be + lin.gc_bc);
            add(m, c, e, -lin.gc_be);
            add(m, c, c, -lin.gc_bc);
            // Base row: current leaving = Ib(vbe, vbc).
            add(m, b, b, lin.gb_be + lin.gb_bc);
            add(m, b, e, -lin.gb_be);
            add(m, b, c, -lin.gb_bc);
            // Emitter row: current leaving = -(Ic + Ib).
            add(m, e, b, -(lin.gc_be + lin.gc_bc + lin.gb_be + lin.gb_bc));
            add(m, e, e, lin.gc_be + lin.gb_be);
            add(m, e, c, lin.gc_bc + lin.gb_bc);
        }

        // RHS: move the linearization constants across, with the polarity
        // flip applied to the actual currents.
        let rhs = mna.rhs_mut();
        if let Some(ci) = c {
            rhs[ci] -= s * ieq_c;
        }
        if let Some(bi) = b {
            rhs[bi] -= s * ieq_b;
        }
        if let Some(ei) = e {
            rhs[ei] += s * (ieq_c + ieq_b);
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

    #[test]
    fn active_region_currents() {
        let bjt = Bjt::new(BjtParams::default(), Some(0), Some(1), Some(2), 300.0);
        let vt = 8.617_333e-5 * 300.0;
        // Vbe = 0.65, Vbc = -5 (forward active).
        let lin = bjt.evaluate(0.65, -5.0, vt);
        assert!(lin.ic > 0.0);
        assert!(lin.ib > 0.0);
        let beta_measured = lin.ic / lin.ib;
        assert!(
            (beta_measured - 100.0).abs() < 2.0,
            "beta = {beta_measured}"
        );
    }

    #[test]
    fn cutoff_region_currents_vanish() {
        let bjt = Bjt::new(BjtParams::default(), Some(0), Some(1), Some(2), 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let lin = bjt.evaluate(-1.0, -6.0, vt);
        assert!(lin.ic.abs() < 1e-12);
        assert!(lin.ib.abs() < 1e-12);
    }

    #[test]
    fn early_effect_raises_ic_with_vce() {
        let params = BjtParams {
            vaf: 100.0,
            ..Default::default()
        };
        let bjt = Bjt::new(params, Some(0), Some(1), Some(2), 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let low = bjt.evaluate(0.65, -1.0, vt);
        let high = bjt.evaluate(0.65, -10.0, vt);
        assert!(high.ic > low.ic);
    }

    #[test]
    fn ideal_mode_mirrors_beta() {
        let params = BjtParams {
            ideal: true,
            ..Default::default()
        };
        let bjt = Bjt::new(params, Some(0), Some(1), Some(2), 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let lin = bjt.evaluate(0.75, -3.0, vt);
        assert!((lin.ic / lin.ib - 100.0).abs() < 1e-9);
    }
}
