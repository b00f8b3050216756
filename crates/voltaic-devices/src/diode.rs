//! Diode family: generic, Zener, Schottky, LED.
//!
//! Shockley model with an optional reverse-breakdown term:
//!
//! ```text
//! I = Is*(exp(Vd/(n*Vt)) - 1) - Ibv*(exp(-(Vd+BV)/(n*Vt)) - 1)
//! ```
//!
//! Each Newton iteration contributes the conductance `Gd = dI/dVd` at the
//! operating point plus the matching current source. Junction voltage moves
//! are limited per iteration to keep the exponential out of overflow.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::component::{DiodeKind, DiodeParams, ThermalParams};
use voltaic_core::mna::MnaSystem;

use crate::passive::voltage_between;
use crate::stamp::{Stamp, StampContext, exp_lin, exp_lin_deriv, limit_junction};
use crate::thermal::ThermalState;

#[derive(Debug, Clone)]
pub struct Diode {
    pub anode: Option<usize>,
    pub cathode: Option<usize>,
    pub params: DiodeParams,
    pub thermal: ThermalState,
    /// Junction voltage accepted by the previous Newton iteration.
    vd_iter: f64,
    /// Forward current at the last commit (drives LED rendering).
    pub luminous: f64,
    pub power: f64,
}

impl Diode {
    pub fn new(
        params: DiodeParams,
        anode: Option<usize>,
        cathode: Option<usize>,
        ambient: f64,
    ) -> Self {
        Self {
            anode,
            cathode,
            params,
            thermal: ThermalState::new(ThermalParams::default(), ambient),
            vd_iter: 0.0,
            luminous: 0.0,
            power: 0.0,
        }
    }

    /// Limit the junction move per iteration. Forward conduction uses the
    /// shared knee limiter; with a breakdown voltage configured the same
    /// treatment applies mirrored around -BV.
    fn limit(&mut self, vd_raw: f64, vt: f64) -> f64 {
        let vd = if self.params.bv > 0.0 && vd_raw < -self.params.bv {
            let mut mirrored = -(self.vd_iter + self.params.bv);
            let v = -limit_junction(&mut mirrored, -(vd_raw + self.params.bv), vt)
                - self.params.bv;
            self.vd_iter = v;
            v
        } else {
            limit_junction(&mut self.vd_iter, vd_raw, vt)
        };
        vd
    }

    /// Current and conductance at junction voltage `vd`.
    fn evaluate(&self, vd: f64, vt: f64) -> (f64, f64) {
        let nvt = self.params.n * vt;
        let x = vd / nvt;
        let mut i = self.params.is * (exp_lin(x) - 1.0);
        let mut g = self.params.is / nvt * exp_lin_deriv(x);

        if self.params.bv > 0.0 {
            let xb = -(vd + self.params.bv) / nvt;
            i -= self.params.ibv * (exp_lin(xb) - 1.0);
            g += self.params.ibv / nvt * exp_lin_deriv(xb);
        }
        (i, g)
    }

    pub fn commit(&mut self, solution: &DVector<f64>, dt: f64, ambient: f64, vt: f64) {
        let vd = voltage_between(solution, self.anode, self.cathode);
        let (i, _) = self.evaluate(vd, vt);
        self.vd_iter = vd;
        self.power = (i * vd).abs();
        self.luminous = if self.params.kind == DiodeKind::Led {
            i.max(0.0)
        } else {
            0.0
        };
        self.thermal.update(self.power, ambient, dt);
    }
}

impl Stamp for Diode {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        if self.thermal.failed {
            return Ok(());
        }
        let vt = ctx.vt();
        let vd_raw = ctx.voltage_between(self.anode, self.cathode);
        let vd = self.limit(vd_raw, vt);
        let (i, g) = self.evaluate(vd, vt);

        // Linearized branch: I(v) ~= Ieq + Gd*v with Ieq = I(vd) - Gd*vd.
        let ieq = i - g * vd;
        mna.stamp_conductance(self.anode, self.cathode, g);
        // Ieq flows anode -> cathode through the device.
        mna.stamp_current_source(self.anode, self.cathode, ieq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::IntegrationMethod;
    use nalgebra::dvector;

    fn ctx<'a>(op: &'a DVector<f64>) -> StampContext<'a> {
        StampContext {
            time: 0.0,
            dt: None,
            method: IntegrationMethod::Trapezoidal,
            op_point: op,
            source_scale: 1.0,
            gmin: 1e-12,
            temperature: 300.0,
            light_level: 0.5,
            iteration: 0,
            step_index: 0,
        }
    }

    #[test]
    fn forward_drop_near_700mv() {
        // Find Vd such that I = 1 mA; should land in the usual 0.6-0.8 V.
        let d = Diode::new(DiodeParams::default(), Some(0), None, 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let mut lo = 0.0;
        let mut hi = 1.0;
        for _ in 0..60 {
            let mid = 0.5 * (lo + hi);
            let (i, _) = d.evaluate(mid, vt);
            if i < 1e-3 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        assert!(
            (0.6..0.8).contains(&lo),
            "1 mA forward drop {lo} V out of range"
        );
    }

    #[test]
    fn reverse_leakage_is_tiny() {
        let d = Diode::new(DiodeParams::default(), Some(0), None, 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let (i, _) = d.evaluate(-5.0, vt);
        assert!(i < 0.0 && i.abs() < 1e-12);
    }

    #[test]
    fn zener_conducts_past_breakdown() {
        let d = Diode::new(DiodeParams::zener(5.1), Some(0), None, 300.0);
        let vt = 8.617_333e-5 * 300.0;
        let (i_before, _) = d.evaluate(-4.0, vt);
        let (i_after, _) = d.evaluate(-5.6, vt);
        assert!(i_before.abs() <= 1.1e-6);
        assert!(i_after < -1e-3, "breakdown current {i_after}");
    }

    #[test]
    fn limiting_caps_junction_moves() {
        let op = dvector![100.0];
        let mut d = Diode::new(DiodeParams::default(), Some(0), None, 300.0);
        let mut mna = MnaSystem::new(1, 0);
        // An enormous iterate is pulled back to the conduction knee,
        // keeping every stamped entry finite.
        d.stamp(&mut mna, &ctx(&op)).unwrap();
        assert!(mna.matrix()[(0, 0)].is_finite());
        assert!(mna.rhs()[0].is_finite());
        assert!(d.vd_iter <= crate::stamp::JUNCTION_KNEE + 1e-12);

        // From the knee, subsequent moves crawl by at most 2*Vt*ln(2).
        let before = d.vd_iter;
        let mut mna2 = MnaSystem::new(1, 0);
        d.stamp(&mut mna2, &ctx(&op)).unwrap();
        let vt = 8.617_333e-5 * 300.0;
        assert!(d.vd_iter - before <= 2.0 * vt * (2.0f64).ln() + 1e-12);
    }

    #[test]
    fn led_reports_luminous_current() {
        let mut d = Diode::new(DiodeParams::led(), Some(0), None, 300.0);
        let vt = 8.617_333e-5 * 300.0;
        // Drive to a forward voltage that conducts a visible current.
        let solution = dvector![1.9];
        d.commit(&solution, 1e-5, 300.0, vt);
        assert!(d.luminous > 0.0);
    }
}
