//! Circuit -> device-instance binding.
//!
//! Converts persisted components into matrix-index-bound instances,
//! allocating branch rows (sources, inductors, op-amps, transformers) and
//! internal nodes (ESR/ESL lumps) in component insertion order, so the
//! augmented row order is stable across rebuilds of the same circuit.

use nalgebra::DVector;
use voltaic_core::circuit::Circuit;
use voltaic_core::component::{Component, ComponentKind};
use voltaic_core::config::Environment;
use voltaic_core::error::Result;
use voltaic_core::mna::MnaSystem;
use voltaic_core::topology::NodeMap;

use crate::bjt::Bjt;
use crate::diode::Diode;
use crate::logic::LogicGate;
use crate::mosfet::Mosfet;
use crate::opamp::OpAmp;
use crate::passive::{
    Capacitor, Inductor, Meter, MeterKind, Relay, ResistanceLaw, Resistor, Switch, Transformer,
};
use crate::sources::{CurrentSource, VoltageSource};
use crate::stamp::{Stamp, StampContext};
use crate::thermal::ThermalState;
use crate::wireless::{AntennaRx, AntennaTx};

/// A bound device instance.
#[derive(Debug, Clone)]
pub enum Device {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Switch(Switch),
    Relay(Relay),
    Meter(Meter),
    Transformer(Transformer),
    Diode(Diode),
    Bjt(Bjt),
    Mosfet(Mosfet),
    OpAmp(OpAmp),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    LogicGate(LogicGate),
    AntennaTx(AntennaTx),
    AntennaRx(AntennaRx),
}

impl Stamp for Device {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        match self {
            Device::Resistor(d) => d.stamp(mna, ctx),
            Device::Capacitor(d) => d.stamp(mna, ctx),
            Device::Inductor(d) => d.stamp(mna, ctx),
            Device::Switch(d) => d.stamp(mna, ctx),
            Device::Relay(d) => d.stamp(mna, ctx),
            Device::Meter(d) => d.stamp(mna, ctx),
            Device::Transformer(d) => d.stamp(mna, ctx),
            Device::Diode(d) => d.stamp(mna, ctx),
            Device::Bjt(d) => d.stamp(mna, ctx),
            Device::Mosfet(d) => d.stamp(mna, ctx),
            Device::OpAmp(d) => d.stamp(mna, ctx),
            Device::VoltageSource(d) => d.stamp(mna, ctx),
            Device::CurrentSource(d) => d.stamp(mna, ctx),
            Device::LogicGate(d) => d.stamp(mna, ctx),
            Device::AntennaTx(d) => d.stamp(mna, ctx),
            Device::AntennaRx(d) => d.stamp(mna, ctx),
        }
    }
}

impl Device {
    /// Whether the device requires Newton iteration.
    pub fn is_nonlinear(&self) -> bool {
        matches!(
            self,
            Device::Diode(_) | Device::Bjt(_) | Device::Mosfet(_) | Device::OpAmp(_)
        )
    }

    /// Advance device state after an accepted step.
    pub fn commit(
        &mut self,
        solution: &DVector<f64>,
        dt: f64,
        method: crate::stamp::IntegrationMethod,
        env: &Environment,
    ) {
        const K_OVER_Q: f64 = 8.617_333e-5;
        let vt = K_OVER_Q * env.temperature;
        match self {
            Device::Resistor(d) => d.commit(solution, dt, env.temperature, env.light_level),
            Device::Capacitor(d) => d.commit(solution, dt, method),
            Device::Inductor(d) => d.commit(solution, dt, method),
            Device::Relay(d) => d.commit(solution),
            Device::Meter(d) => d.commit(solution),
            Device::Diode(d) => d.commit(solution, dt, env.temperature, vt),
            Device::Bjt(d) => d.commit(solution, dt, env.temperature, vt),
            Device::Mosfet(d) => d.commit(solution, dt, env.temperature),
            Device::OpAmp(d) => d.commit(solution, dt),
            Device::LogicGate(d) => d.commit(solution),
            _ => {}
        }
    }

    /// Clear all runtime state (sweep/Monte-Carlo point isolation).
    pub fn reset_state(&mut self, env: &Environment) {
        match self {
            Device::Resistor(d) => {
                d.thermal.reset(env.temperature);
                d.power = 0.0;
            }
            Device::Capacitor(d) => d.reset(),
            Device::Inductor(d) => d.reset(),
            Device::Relay(d) => d.engaged = false,
            Device::Diode(d) => {
                d.thermal.reset(env.temperature);
                d.luminous = 0.0;
                d.power = 0.0;
            }
            Device::Bjt(d) => {
                d.thermal.reset(env.temperature);
                d.power = 0.0;
            }
            Device::Mosfet(d) => {
                d.thermal.reset(env.temperature);
                d.power = 0.0;
            }
            Device::OpAmp(d) => d.reset(),
            Device::LogicGate(d) => d.reset(),
            _ => {}
        }
    }

    /// Seed reactive state from a DC operating point.
    pub fn init_from_dc(&mut self, solution: &DVector<f64>, num_node_rows: usize) {
        match self {
            Device::Capacitor(d) => d.init_from(solution),
            Device::Inductor(d) => d.init_from(solution, num_node_rows),
            _ => {}
        }
    }
}

/// Every device of a circuit bound to matrix indices.
#[derive(Debug, Clone)]
pub struct DeviceSet {
    pub devices: Vec<Device>,
    /// KCL rows: non-ground classes plus internal lump nodes.
    pub num_node_rows: usize,
    /// Internal nodes allocated for ESR/ESL lumps.
    pub num_internal: usize,
    /// Branch rows (voltage-defining elements).
    pub num_branches: usize,
    has_nonlinear: bool,
}

impl DeviceSet {
    /// A set with no devices (engine placeholder before the first bind).
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            num_node_rows: 0,
            num_internal: 0,
            num_branches: 0,
            has_nonlinear: false,
        }
    }

    /// Total MNA system order.
    pub fn size(&self) -> usize {
        self.num_node_rows + self.num_branches
    }

    pub fn has_nonlinear(&self) -> bool {
        self.has_nonlinear
    }

    /// Stamp every device into a cleared system.
    pub fn stamp_all(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        for device in &mut self.devices {
            device.stamp(mna, ctx)?;
        }
        Ok(())
    }

    /// Commit reactive/thermal/logic state after an accepted step.
    pub fn commit_step(
        &mut self,
        solution: &DVector<f64>,
        dt: f64,
        method: crate::stamp::IntegrationMethod,
        env: &Environment,
    ) {
        for device in &mut self.devices {
            device.commit(solution, dt, method, env);
        }
    }

    /// Seed reactive state from a DC operating point.
    pub fn init_from_dc(&mut self, solution: &DVector<f64>) {
        let rows = self.num_node_rows;
        for device in &mut self.devices {
            device.init_from_dc(solution, rows);
        }
    }

    /// Reset all runtime state (between sweep/Monte-Carlo points).
    pub fn reset_state(&mut self, env: &Environment) {
        for device in &mut self.devices {
            device.reset_state(env);
        }
    }
}

/// Bind a circuit against its node map.
pub fn bind(circuit: &Circuit, map: &NodeMap, env: &Environment) -> Result<DeviceSet> {
    let mut builder = Binder {
        devices: Vec::new(),
        next_internal: map.num_nonground(),
        next_branch: 0,
        ambient: env.temperature,
    };

    for component in circuit.components() {
        builder.bind_component(component, map)?;
    }

    let has_nonlinear = builder.devices.iter().any(|d| d.is_nonlinear());
    Ok(DeviceSet {
        num_node_rows: builder.next_internal,
        num_internal: builder.next_internal - map.num_nonground(),
        num_branches: builder.next_branch,
        has_nonlinear,
        devices: builder.devices,
    })
}

struct Binder {
    devices: Vec<Device>,
    next_internal: usize,
    next_branch: usize,
    ambient: f64,
}

impl Binder {
    fn internal_node(&mut self) -> Option<usize> {
        let idx = self.next_internal;
        self.next_internal += 1;
        Some(idx)
    }

    fn branch(&mut self) -> usize {
        let idx = self.next_branch;
        self.next_branch += 1;
        idx
    }

    fn bind_component(&mut self, component: &Component, map: &NodeMap) -> Result<()> {
        let t = |i: usize| -> Option<usize> {
            component
                .terminals
                .get(i)
                .and_then(|n| map.matrix_index(*n))
        };
        let seed = (component.id.as_u32() as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;

        match &component.kind {
            ComponentKind::Resistor(p) => {
                self.devices.push(Device::Resistor(Resistor::fixed(
                    t(0),
                    t(1),
                    p.resistance,
                    p.tempco,
                    p.t_nominal,
                    self.ambient,
                )));
            }
            ComponentKind::Photoresistor(p) => {
                self.devices.push(Device::Resistor(Resistor {
                    node_a: t(0),
                    node_b: t(1),
                    resistance: p.r_dark,
                    law: ResistanceLaw::Photo {
                        r_dark: p.r_dark,
                        r_light: p.r_light,
                    },
                    thermal: ThermalState::new(Default::default(), self.ambient),
                    power: 0.0,
                }));
            }
            ComponentKind::Thermistor(p) => {
                self.devices.push(Device::Resistor(Resistor {
                    node_a: t(0),
                    node_b: t(1),
                    resistance: p.r_nominal,
                    law: ResistanceLaw::Thermo {
                        beta: p.beta,
                        t_nominal: p.t_nominal,
                    },
                    thermal: ThermalState::new(Default::default(), self.ambient),
                    power: 0.0,
                }));
            }
            ComponentKind::Capacitor(p) => {
                // ESR and ESL become series lumps through internal nodes:
                // pos -[R_esr]- m1 -[L_esl]- m2 -[C]- neg.
                let mut top = t(0);
                if p.esr > 0.0 {
                    let mid = self.internal_node();
                    self.devices.push(Device::Resistor(Resistor::fixed(
                        top,
                        mid,
                        p.esr,
                        0.0,
                        300.0,
                        self.ambient,
                    )));
                    top = mid;
                }
                if p.esl > 0.0 {
                    let mid = self.internal_node();
                    let branch = self.branch();
                    self.devices
                        .push(Device::Inductor(Inductor::new(p.esl, top, mid, branch)));
                    top = mid;
                }
                let mut cap = Capacitor::new(p.capacitance, top, t(1));
                cap.leakage = p.leakage;
                self.devices.push(Device::Capacitor(cap));
            }
            ComponentKind::Inductor(p) => {
                let branch = self.branch();
                let mut ind = Inductor::new(p.inductance, t(0), t(1), branch);
                ind.dcr = p.dcr;
                ind.isat = p.isat;
                self.devices.push(Device::Inductor(ind));
            }
            ComponentKind::Diode(p) => {
                self.devices.push(Device::Diode(Diode::new(
                    p.clone(),
                    t(0),
                    t(1),
                    self.ambient,
                )));
                if p.cj0 > 0.0 {
                    // Junction capacitance as a parallel lump.
                    self.devices
                        .push(Device::Capacitor(Capacitor::new(p.cj0, t(0), t(1))));
                }
            }
            ComponentKind::Bjt(p) => {
                self.devices.push(Device::Bjt(Bjt::new(
                    p.clone(),
                    t(0),
                    t(1),
                    t(2),
                    self.ambient,
                )));
            }
            ComponentKind::Mosfet(p) => {
                self.devices.push(Device::Mosfet(Mosfet::new(
                    p.clone(),
                    t(0),
                    t(1),
                    t(2),
                    self.ambient,
                )));
            }
            ComponentKind::OpAmp(p) => {
                let branch = self.branch();
                self.devices.push(Device::OpAmp(OpAmp::new(
                    p.clone(),
                    t(0),
                    t(1),
                    t(2),
                    branch,
                )));
            }
            ComponentKind::VoltageSource(p) => {
                let branch = self.branch();
                let mut src = VoltageSource::new(p.waveform.clone(), t(0), t(1), branch);
                src.series_resistance = p.series_resistance;
                src.sweep = p.sweep.clone();
                src.seed = seed;
                self.devices.push(Device::VoltageSource(src));
            }
            ComponentKind::CurrentSource(p) => {
                self.devices.push(Device::CurrentSource(CurrentSource {
                    node_pos: t(0),
                    node_neg: t(1),
                    waveform: p.waveform.clone(),
                    shunt_resistance: p.series_resistance,
                    sweep: p.sweep.clone(),
                    seed,
                    last_value: 0.0,
                }));
            }
            ComponentKind::Switch(p) => {
                self.devices.push(Device::Switch(Switch {
                    node_a: t(0),
                    node_b: t(1),
                    closed: p.closed,
                    r_on: p.r_on,
                    r_off: p.r_off,
                }));
            }
            ComponentKind::Relay(p) => {
                self.devices.push(Device::Relay(Relay {
                    coil_p: t(0),
                    coil_n: t(1),
                    contact_a: t(2),
                    contact_b: t(3),
                    params: p.clone(),
                    engaged: false,
                }));
            }
            ComponentKind::Transformer(p) => {
                let branch = self.branch();
                self.devices.push(Device::Transformer(Transformer {
                    p_pos: t(0),
                    p_neg: t(1),
                    s_pos: t(2),
                    s_neg: t(3),
                    branch,
                    turns_ratio: p.turns_ratio,
                }));
            }
            ComponentKind::LogicGate(p) => {
                let n_in = p.op.num_inputs();
                let inputs = (0..n_in).map(|i| t(i)).collect();
                self.devices.push(Device::LogicGate(LogicGate::new(
                    p.clone(),
                    inputs,
                    t(n_in),
                )));
            }
            ComponentKind::Voltmeter => {
                self.devices.push(Device::Meter(Meter {
                    node_a: t(0),
                    node_b: t(1),
                    kind: MeterKind::Voltmeter,
                    reading: 0.0,
                }));
            }
            ComponentKind::Ammeter => {
                self.devices.push(Device::Meter(Meter {
                    node_a: t(0),
                    node_b: t(1),
                    kind: MeterKind::Ammeter,
                    reading: 0.0,
                }));
            }
            ComponentKind::AntennaTx(p) => {
                self.devices.push(Device::AntennaTx(AntennaTx {
                    node: t(0),
                    reference: t(1),
                    params: p.clone(),
                }));
            }
            ComponentKind::AntennaRx(p) => {
                self.devices.push(Device::AntennaRx(AntennaRx {
                    node: t(0),
                    reference: t(1),
                    params: p.clone(),
                }));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltaic_core::component::{
        CapacitorParams, ComponentKind, InductorParams, ResistorParams, SourceParams,
    };
    use voltaic_core::topology;

    #[test]
    fn branch_allocation_follows_insertion_order() {
        let mut c = Circuit::new();
        let gnd = c.add_node(0.0, 0.0);
        let a = c.add_node(1.0, 0.0);
        let b = c.add_node(2.0, 0.0);
        c.set_ground(gnd).unwrap();
        c.add_component(
            ComponentKind::VoltageSource(SourceParams::dc(5.0)),
            vec![a, gnd],
        )
        .unwrap();
        c.add_component(
            ComponentKind::Inductor(InductorParams::default()),
            vec![a, b],
        )
        .unwrap();
        c.add_component(
            ComponentKind::Resistor(ResistorParams::default()),
            vec![b, gnd],
        )
        .unwrap();

        let map = topology::rebuild(&c).unwrap();
        let set = bind(&c, &map, &Environment::default()).unwrap();

        assert_eq!(set.num_branches, 2);
        assert_eq!(set.num_node_rows, 2);
        assert_eq!(set.size(), 4);
        assert!(!set.has_nonlinear());

        // Source got branch 0, inductor branch 1.
        match (&set.devices[0], &set.devices[1]) {
            (Device::VoltageSource(v), Device::Inductor(l)) => {
                assert_eq!(v.branch, 0);
                assert_eq!(l.branch, 1);
            }
            other => panic!("unexpected binding order: {other:?}"),
        }
    }

    #[test]
    fn esr_allocates_internal_node() {
        let mut c = Circuit::new();
        let gnd = c.add_node(0.0, 0.0);
        let a = c.add_node(1.0, 0.0);
        c.set_ground(gnd).unwrap();
        c.add_component(
            ComponentKind::Capacitor(CapacitorParams {
                capacitance: 1e-6,
                esr: 0.1,
                ..Default::default()
            }),
            vec![a, gnd],
        )
        .unwrap();

        let map = topology::rebuild(&c).unwrap();
        let set = bind(&c, &map, &Environment::default()).unwrap();
        assert_eq!(set.num_internal, 1);
        assert_eq!(set.num_node_rows, 2);
        // ESR resistor plus the capacitor proper.
        assert_eq!(set.devices.len(), 2);
    }

    #[test]
    fn nonlinear_detection() {
        let mut c = Circuit::new();
        let gnd = c.add_node(0.0, 0.0);
        let a = c.add_node(1.0, 0.0);
        c.set_ground(gnd).unwrap();
        c.add_component(
            ComponentKind::Diode(voltaic_core::component::DiodeParams::default()),
            vec![a, gnd],
        )
        .unwrap();
        let map = topology::rebuild(&c).unwrap();
        let set = bind(&c, &map, &Environment::default()).unwrap();
        assert!(set.has_nonlinear());
    }
}
