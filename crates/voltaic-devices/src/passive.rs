//! Linear passive instances: resistor family, reactive elements with their
//! companion models, switches, relays, and meters.

use nalgebra::DVector;
use voltaic_core::component::{RelayParams, ThermalParams};
use voltaic_core::error::{CoreError, Result};
use voltaic_core::mna::MnaSystem;

use crate::stamp::{IntegrationMethod, Stamp, StampContext};
use crate::thermal::ThermalState;

/// How a resistor-family device derives its effective resistance.
#[derive(Debug, Clone)]
pub enum ResistanceLaw {
    /// Fixed value with a linear temperature coefficient.
    Fixed { tempco: f64, t_nominal: f64 },
    /// Light-dependent: log-interpolates r_dark -> r_light over light level.
    Photo { r_dark: f64, r_light: f64 },
    /// NTC beta model around `t_nominal`.
    Thermo { beta: f64, t_nominal: f64 },
}

/// Resistor, photoresistor, or thermistor bound to matrix indices.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub node_a: Option<usize>,
    pub node_b: Option<usize>,
    /// Nominal resistance (ohm).
    pub resistance: f64,
    pub law: ResistanceLaw,
    pub thermal: ThermalState,
    /// Power dissipated during the last accepted step (W).
    pub power: f64,
}

impl Resistor {
    pub fn fixed(
        node_a: Option<usize>,
        node_b: Option<usize>,
        resistance: f64,
        tempco: f64,
        t_nominal: f64,
        ambient: f64,
    ) -> Self {
        Self {
            node_a,
            node_b,
            resistance,
            law: ResistanceLaw::Fixed { tempco, t_nominal },
            thermal: ThermalState::new(ThermalParams::default(), ambient),
            power: 0.0,
        }
    }

    /// Effective resistance under the given environment.
    pub fn effective_resistance(&self, temperature: f64, light_level: f64) -> f64 {
        match self.law {
            ResistanceLaw::Fixed { tempco, t_nominal } => {
                self.resistance * (1.0 + tempco * (self.thermal.temperature - t_nominal))
            }
            ResistanceLaw::Photo { r_dark, r_light } => {
                let light = light_level.clamp(0.0, 1.0);
                let (lo, hi) = (r_light.max(1e-3), r_dark.max(1e-3));
                // Log interpolation: dark at light 0, bright at light 1.
                hi * (lo / hi).powf(light)
            }
            ResistanceLaw::Thermo { beta, t_nominal } => {
                let t = temperature.max(1.0);
                self.resistance * (beta * (1.0 / t - 1.0 / t_nominal)).exp()
            }
        }
    }

    pub fn commit(&mut self, solution: &DVector<f64>, dt: f64, ambient: f64, light_level: f64) {
        let r_eff = self.effective_resistance(ambient, light_level);
        let dv = voltage_between(solution, self.node_a, self.node_b);
        self.power = if r_eff > 0.0 { dv * dv / r_eff } else { 0.0 };
        self.thermal.update(self.power, ambient, dt);
    }
}

impl Stamp for Resistor {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        if self.thermal.failed {
            return Ok(()); // open circuit
        }
        let r = self.effective_resistance(ctx.temperature, ctx.light_level);
        if r <= 0.0 {
            return Err(CoreError::Singular(
                "zero-resistance resistor short-circuits its nodes".into(),
            ));
        }
        mna.stamp_conductance(self.node_a, self.node_b, 1.0 / r);
        Ok(())
    }
}

/// Capacitor companion model.
///
/// Replaced per step by `Geq` in parallel with `Ieq` chosen by the
/// integration rule: trapezoidal `Geq = 2C/h`, `Ieq = Geq*V_prev + I_prev`;
/// backward Euler `Geq = C/h`, `Ieq = Geq*V_prev`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub node_pos: Option<usize>,
    pub node_neg: Option<usize>,
    pub capacitance: f64,
    /// Parallel leakage resistance (ohm); 0 disables.
    pub leakage: f64,
    pub v_prev: f64,
    pub i_prev: f64,
}

impl Capacitor {
    pub fn new(capacitance: f64, node_pos: Option<usize>, node_neg: Option<usize>) -> Self {
        Self {
            node_pos,
            node_neg,
            capacitance,
            leakage: 0.0,
            v_prev: 0.0,
            i_prev: 0.0,
        }
    }

    /// Seed companion state from a DC operating point.
    pub fn init_from(&mut self, solution: &DVector<f64>) {
        self.v_prev = voltage_between(solution, self.node_pos, self.node_neg);
        self.i_prev = 0.0;
    }

    pub fn reset(&mut self) {
        self.v_prev = 0.0;
        self.i_prev = 0.0;
    }

    pub fn commit(&mut self, solution: &DVector<f64>, h: f64, method: IntegrationMethod) {
        let v_new = voltage_between(solution, self.node_pos, self.node_neg);
        match method {
            IntegrationMethod::BackwardEuler => {
                self.i_prev = self.capacitance / h * (v_new - self.v_prev);
            }
            IntegrationMethod::Trapezoidal => {
                self.i_prev = 2.0 * self.capacitance / h * (v_new - self.v_prev) - self.i_prev;
            }
        }
        self.v_prev = v_new;
    }
}

impl Stamp for Capacitor {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        if self.leakage > 0.0 {
            mna.stamp_conductance(self.node_pos, self.node_neg, 1.0 / self.leakage);
        }
        let Some(h) = ctx.dt else {
            return Ok(()); // open at DC
        };
        let (geq, ieq) = match ctx.method {
            IntegrationMethod::BackwardEuler => {
                let geq = self.capacitance / h;
                (geq, geq * self.v_prev)
            }
            IntegrationMethod::Trapezoidal => {
                let geq = 2.0 * self.capacitance / h;
                (geq, geq * self.v_prev + self.i_prev)
            }
        };
        mna.stamp_conductance(self.node_pos, self.node_neg, geq);
        mna.stamp_current_source(self.node_neg, self.node_pos, ieq);
        Ok(())
    }
}

/// Inductor companion model with winding resistance folded in.
///
/// Keeps its branch variable in every analysis so the matrix order is the
/// same for DC and transient; in transient the branch row is the linear
/// definition `i_br = Geq*(Vp - Vn) + Ieq` while the Norton pair carries
/// the physics through the node rows.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub node_pos: Option<usize>,
    pub node_neg: Option<usize>,
    pub branch: usize,
    pub inductance: f64,
    /// Winding DC resistance (ohm).
    pub dcr: f64,
    /// Saturation current (A); 0 disables derating.
    pub isat: f64,
    pub i_prev: f64,
    pub v_prev: f64,
    last_geq: f64,
    last_ieq: f64,
}

impl Inductor {
    pub fn new(
        inductance: f64,
        node_pos: Option<usize>,
        node_neg: Option<usize>,
        branch: usize,
    ) -> Self {
        Self {
            node_pos,
            node_neg,
            branch,
            inductance,
            dcr: 0.0,
            isat: 0.0,
            i_prev: 0.0,
            v_prev: 0.0,
            last_geq: 0.0,
            last_ieq: 0.0,
        }
    }

    fn effective_inductance(&self) -> f64 {
        if self.isat > 0.0 {
            let x = self.i_prev / self.isat;
            self.inductance / (1.0 + x * x)
        } else {
            self.inductance
        }
    }

    /// Seed companion state from a DC operating point (branch current row).
    pub fn init_from(&mut self, solution: &DVector<f64>, num_node_rows: usize) {
        self.v_prev = voltage_between(solution, self.node_pos, self.node_neg);
        let idx = num_node_rows + self.branch;
        self.i_prev = if idx < solution.len() {
            solution[idx]
        } else {
            0.0
        };
    }

    pub fn reset(&mut self) {
        self.i_prev = 0.0;
        self.v_prev = 0.0;
    }

    pub fn commit(&mut self, solution: &DVector<f64>, _h: f64, _method: IntegrationMethod) {
        let v_new = voltage_between(solution, self.node_pos, self.node_neg);
        self.i_prev = self.last_geq * v_new + self.last_ieq;
        self.v_prev = v_new;
    }
}

impl Stamp for Inductor {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        let Some(h) = ctx.dt else {
            // DC: short circuit (0 V source) with the winding resistance on
            // the branch row.
            mna.stamp_voltage_source(self.node_pos, self.node_neg, self.branch, 0.0);
            if self.dcr > 0.0 {
                mna.stamp_branch_resistance(self.branch, self.dcr);
            }
            return Ok(());
        };

        let l = self.effective_inductance();
        let (geq, ieq) = match ctx.method {
            IntegrationMethod::BackwardEuler => {
                let a = h / l;
                let d = 1.0 + a * self.dcr;
                (a / d, self.i_prev / d)
            }
            IntegrationMethod::Trapezoidal => {
                let a = h / (2.0 * l);
                let d = 1.0 + a * self.dcr;
                (
                    a / d,
                    (self.i_prev * (1.0 - a * self.dcr) + a * self.v_prev) / d,
                )
            }
        };
        self.last_geq = geq;
        self.last_ieq = ieq;

        mna.stamp_conductance(self.node_pos, self.node_neg, geq);
        mna.stamp_current_source(self.node_pos, self.node_neg, ieq);

        // Branch definition: i_br - Geq*(Vp - Vn) = Ieq.
        let br = mna.branch_row(self.branch);
        mna.matrix_mut()[(br, br)] += 1.0;
        if let Some(p) = self.node_pos {
            mna.matrix_mut()[(br, p)] -= geq;
        }
        if let Some(n) = self.node_neg {
            mna.matrix_mut()[(br, n)] += geq;
        }
        mna.rhs_mut()[br] += ieq;
        Ok(())
    }
}

/// Switch / push-button: `R_on` or `R_off` resistor.
#[derive(Debug, Clone)]
pub struct Switch {
    pub node_a: Option<usize>,
    pub node_b: Option<usize>,
    pub closed: bool,
    pub r_on: f64,
    pub r_off: f64,
}

impl Stamp for Switch {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        let r = if self.closed { self.r_on } else { self.r_off };
        mna.stamp_conductance(self.node_a, self.node_b, 1.0 / r.max(1e-12));
        Ok(())
    }
}

/// Relay: resistive coil plus a contact that pulls in above a coil-voltage
/// threshold. The contact state updates at commit, not inside Newton.
#[derive(Debug, Clone)]
pub struct Relay {
    pub coil_p: Option<usize>,
    pub coil_n: Option<usize>,
    pub contact_a: Option<usize>,
    pub contact_b: Option<usize>,
    pub params: RelayParams,
    pub engaged: bool,
}

impl Relay {
    pub fn commit(&mut self, solution: &DVector<f64>) {
        let v_coil = voltage_between(solution, self.coil_p, self.coil_n);
        self.engaged = v_coil.abs() >= self.params.pull_in;
    }
}

impl Stamp for Relay {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        mna.stamp_conductance(
            self.coil_p,
            self.coil_n,
            1.0 / self.params.coil_resistance.max(1e-12),
        );
        let r = if self.engaged {
            self.params.r_on
        } else {
            self.params.r_off
        };
        mna.stamp_conductance(self.contact_a, self.contact_b, 1.0 / r.max(1e-12));
        Ok(())
    }
}

/// Ideal transformer: `V_p = n*V_s`, `i_s = -n*i_p`, coupled through one
/// branch variable carrying the primary current.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub p_pos: Option<usize>,
    pub p_neg: Option<usize>,
    pub s_pos: Option<usize>,
    pub s_neg: Option<usize>,
    pub branch: usize,
    pub turns_ratio: f64,
}

impl Stamp for Transformer {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        let n = self.turns_ratio;
        let br = mna.branch_row(self.branch);
        let m = mna.matrix_mut();
        // Primary current i_br enters p+ and leaves p-; the secondary
        // carries -n*i_br.
        if let Some(p) = self.p_pos {
            m[(p, br)] += 1.0;
            m[(br, p)] += 1.0;
        }
        if let Some(p) = self.p_neg {
            m[(p, br)] -= 1.0;
            m[(br, p)] -= 1.0;
        }
        if let Some(s) = self.s_pos {
            m[(s, br)] -= n;
            m[(br, s)] -= n;
        }
        if let Some(s) = self.s_neg {
            m[(s, br)] += n;
            m[(br, s)] += n;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterKind {
    Voltmeter,
    Ammeter,
}

/// Voltmeter (large parallel resistance) or ammeter (small series
/// resistance). The reading is derived from node voltages after the solve,
/// never from extra MNA rows.
#[derive(Debug, Clone)]
pub struct Meter {
    pub node_a: Option<usize>,
    pub node_b: Option<usize>,
    pub kind: MeterKind,
    pub reading: f64,
}

impl Meter {
    pub const VOLTMETER_RESISTANCE: f64 = 10e6;
    pub const AMMETER_RESISTANCE: f64 = 1e-3;

    fn resistance(&self) -> f64 {
        match self.kind {
            MeterKind::Voltmeter => Self::VOLTMETER_RESISTANCE,
            MeterKind::Ammeter => Self::AMMETER_RESISTANCE,
        }
    }

    pub fn commit(&mut self, solution: &DVector<f64>) {
        let dv = voltage_between(solution, self.node_a, self.node_b);
        self.reading = match self.kind {
            MeterKind::Voltmeter => dv,
            MeterKind::Ammeter => dv / Self::AMMETER_RESISTANCE,
        };
    }
}

impl Stamp for Meter {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        mna.stamp_conductance(self.node_a, self.node_b, 1.0 / self.resistance());
        Ok(())
    }
}

/// Voltage across two matrix indices of a solution vector.
pub fn voltage_between(
    solution: &DVector<f64>,
    pos: Option<usize>,
    neg: Option<usize>,
) -> f64 {
    let vp = pos.map(|i| solution[i]).unwrap_or(0.0);
    let vn = neg.map(|i| solution[i]).unwrap_or(0.0);
    vp - vn
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn ctx_dc(op: &DVector<f64>) -> StampContext<'_> {
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

    fn ctx_tran(op: &DVector<f64>, h: f64, method: IntegrationMethod) -> StampContext<'_> {
        StampContext {
            time: 0.0,
            dt: Some(h),
            method,
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
    fn resistor_stamps_conductance() {
        let op = dvector![0.0, 0.0];
        let mut r = Resistor::fixed(Some(0), Some(1), 1000.0, 0.0, 300.0, 300.0);
        let mut mna = MnaSystem::new(2, 0);
        r.stamp(&mut mna, &ctx_dc(&op)).unwrap();
        assert!((mna.matrix()[(0, 0)] - 1e-3).abs() < 1e-15);
        assert!((mna.matrix()[(0, 1)] + 1e-3).abs() < 1e-15);
    }

    #[test]
    fn zero_resistance_is_singular() {
        let op = dvector![0.0];
        let mut r = Resistor::fixed(Some(0), None, 0.0, 0.0, 300.0, 300.0);
        let mut mna = MnaSystem::new(1, 0);
        assert!(matches!(
            r.stamp(&mut mna, &ctx_dc(&op)),
            Err(CoreError::Singular(_))
        ));
    }

    #[test]
    fn capacitor_be_companion() {
        let op = dvector![0.0];
        let mut cap = Capacitor::new(1e-6, Some(0), None);
        cap.v_prev = 2.5;
        let mut mna = MnaSystem::new(1, 0);
        cap.stamp(&mut mna, &ctx_tran(&op, 1e-6, IntegrationMethod::BackwardEuler))
            .unwrap();
        // Geq = C/h = 1.0; Ieq = Geq * v_prev = 2.5 injected into node_pos.
        assert!((mna.matrix()[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((mna.rhs()[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn capacitor_trap_companion() {
        let op = dvector![0.0];
        let mut cap = Capacitor::new(1e-6, Some(0), None);
        cap.v_prev = 1.0;
        cap.i_prev = 0.5;
        let mut mna = MnaSystem::new(1, 0);
        cap.stamp(&mut mna, &ctx_tran(&op, 1e-6, IntegrationMethod::Trapezoidal))
            .unwrap();
        // Geq = 2C/h = 2.0; Ieq = 2.0*1.0 + 0.5 = 2.5.
        assert!((mna.matrix()[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((mna.rhs()[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn capacitor_is_open_at_dc() {
        let op = dvector![0.0];
        let mut cap = Capacitor::new(1e-6, Some(0), None);
        let mut mna = MnaSystem::new(1, 0);
        cap.stamp(&mut mna, &ctx_dc(&op)).unwrap();
        assert_eq!(mna.matrix()[(0, 0)], 0.0);
    }

    #[test]
    fn inductor_is_short_at_dc() {
        let op = dvector![0.0, 0.0];
        let mut ind = Inductor::new(1e-3, Some(0), None, 0);
        let mut mna = MnaSystem::new(1, 1);
        ind.stamp(&mut mna, &ctx_dc(&op)).unwrap();
        // Branch row enforces V(0) = 0.
        assert_eq!(mna.matrix()[(1, 0)], 1.0);
        assert_eq!(mna.matrix()[(0, 1)], 1.0);
        assert_eq!(mna.rhs()[1], 0.0);
    }

    #[test]
    fn inductor_trap_matches_reference_companion() {
        let op = dvector![0.0, 0.0];
        let mut ind = Inductor::new(1e-3, Some(0), None, 0);
        ind.i_prev = 0.1;
        ind.v_prev = 2.0;
        let h = 1e-6;
        let mut mna = MnaSystem::new(1, 1);
        ind.stamp(&mut mna, &ctx_tran(&op, h, IntegrationMethod::Trapezoidal))
            .unwrap();
        // No DCR: Geq = h/2L, Ieq = i_prev + Geq*v_prev.
        let geq = h / (2.0 * 1e-3);
        let ieq = 0.1 + geq * 2.0;
        assert!((mna.matrix()[(0, 0)] - geq).abs() < 1e-15);
        // Ieq flows pos -> neg: leaves node 0.
        assert!((mna.rhs()[0] + ieq).abs() < 1e-15);
    }

    #[test]
    fn meter_readings() {
        let solution = dvector![5.0, 4.999];
        let mut am = Meter {
            node_a: Some(0),
            node_b: Some(1),
            kind: MeterKind::Ammeter,
            reading: 0.0,
        };
        am.commit(&solution);
        // 1 mV across 1 mOhm = 1 A.
        assert!((am.reading - 1.0).abs() < 1e-6);
    }

    #[test]
    fn relay_engages_above_pull_in() {
        let mut relay = Relay {
            coil_p: Some(0),
            coil_n: None,
            contact_a: Some(1),
            contact_b: None,
            params: RelayParams::default(),
            engaged: false,
        };
        relay.commit(&dvector![5.0, 0.0]);
        assert!(relay.engaged);
        relay.commit(&dvector![1.0, 0.0]);
        assert!(!relay.engaged);
    }
}
