//! Netlist persistence: bit-exact binary format plus a JSON mirror.
//!
//! Binary layout (all little-endian):
//!
//! ```text
//! magic:    u32 = 0x43495243 ("CIRC")
//! version:  u32 = 1
//! num_components: i32
//! per component:
//!   type: i32
//!   x, y: f32
//!   rotation: i32
//!   label: [u8; 32]           (NUL padded)
//!   props: [u8; 96]           (4 x i32 terminals, 2 x i32 aux, 8 x f64)
//! num_nodes: i32
//! per node: id(i32), x(f32), y(f32), is_ground(u8 padded to 4)
//! num_wires: i32
//! per wire: start_node_id(i32), end_node_id(i32)
//! ```
//!
//! Loading never mutates the caller's circuit: a fresh [`Circuit`] is built
//! and returned only after every structural check passes.

use crate::circuit::{Circuit, Node, NodeId};
use crate::component::{
    AntennaParams, BjtParams, BjtPolarity, CapacitorParams, Component, ComponentId, ComponentKind,
    DiodeKind, DiodeParams, GateOp, InductorParams, LogicFamily, LogicGateParams, MosfetParams,
    MosfetPolarity, OpAmpParams, PhotoresistorParams, RelayParams, ResistorParams, SourceParams,
    SwitchParams, ThermistorParams, TransformerParams, Waveform,
};
use crate::error::{CoreError, Result};

pub const MAGIC: u32 = 0x4349_5243; // "CIRC"
pub const VERSION: u32 = 1;

const LABEL_LEN: usize = 32;
const MAX_TERMINALS: usize = 4;
const NUM_AUX: usize = 2;
const NUM_PARAMS: usize = 8;

// ────────────────────────── writer ──────────────────────────

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn label(&mut self, s: &str) {
        let mut bytes = [0u8; LABEL_LEN];
        for (i, b) in s.bytes().take(LABEL_LEN - 1).enumerate() {
            bytes[i] = b;
        }
        self.buf.extend_from_slice(&bytes);
    }
}

// ────────────────────────── reader ──────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(CoreError::CorruptNetlist(format!(
                "truncated at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(f64::from_le_bytes(a))
    }

    fn label(&mut self) -> Result<String> {
        let b = self.take(LABEL_LEN)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(LABEL_LEN);
        Ok(String::from_utf8_lossy(&b[..end]).into_owned())
    }
}

// ──────────────────── discriminator mapping ────────────────────

fn kind_code(kind: &ComponentKind) -> i32 {
    match kind {
        ComponentKind::Resistor(_) => 0,
        ComponentKind::Capacitor(_) => 1,
        ComponentKind::Inductor(_) => 2,
        ComponentKind::Diode(_) => 3,
        ComponentKind::Bjt(_) => 4,
        ComponentKind::Mosfet(_) => 5,
        ComponentKind::OpAmp(_) => 6,
        ComponentKind::VoltageSource(p) => match p.waveform {
            Waveform::Dc { .. } => 7,
            Waveform::Sine { .. } => 8,
            Waveform::Square { .. } => 9,
            Waveform::Triangle { .. } => 10,
            Waveform::Sawtooth { .. } => 11,
            Waveform::Noise { .. } => 12,
        },
        ComponentKind::CurrentSource(_) => 13,
        ComponentKind::Switch(_) => 14,
        ComponentKind::Relay(_) => 15,
        ComponentKind::Transformer(_) => 16,
        ComponentKind::LogicGate(_) => 17,
        ComponentKind::Voltmeter => 18,
        ComponentKind::Ammeter => 19,
        ComponentKind::Photoresistor(_) => 20,
        ComponentKind::Thermistor(_) => 21,
        ComponentKind::AntennaTx(_) => 22,
        ComponentKind::AntennaRx(_) => 23,
    }
}

fn waveform_code(w: &Waveform) -> i32 {
    match w {
        Waveform::Dc { .. } => 0,
        Waveform::Sine { .. } => 1,
        Waveform::Square { .. } => 2,
        Waveform::Triangle { .. } => 3,
        Waveform::Sawtooth { .. } => 4,
        Waveform::Noise { .. } => 5,
    }
}

fn encode_waveform(w: &Waveform, p: &mut [f64; NUM_PARAMS]) {
    match *w {
        Waveform::Dc { value } => p[0] = value,
        Waveform::Sine {
            amplitude,
            frequency,
            phase,
            offset,
        }
        | Waveform::Triangle {
            amplitude,
            frequency,
            phase,
            offset,
        }
        | Waveform::Sawtooth {
            amplitude,
            frequency,
            phase,
            offset,
        } => {
            p[0] = amplitude;
            p[1] = frequency;
            p[2] = phase;
            p[3] = offset;
        }
        Waveform::Square {
            amplitude,
            frequency,
            phase,
            offset,
            duty,
            rise,
            fall,
        } => {
            p[0] = amplitude;
            p[1] = frequency;
            p[2] = phase;
            p[3] = offset;
            p[4] = duty;
            p[5] = rise;
            p[6] = fall;
        }
        Waveform::Noise { amplitude, offset } => {
            p[0] = amplitude;
            p[3] = offset;
        }
    }
}

fn decode_waveform(code: i32, p: &[f64; NUM_PARAMS]) -> Result<Waveform> {
    Ok(match code {
        0 => Waveform::Dc { value: p[0] },
        1 => Waveform::Sine {
            amplitude: p[0],
            frequency: p[1],
            phase: p[2],
            offset: p[3],
        },
        2 => Waveform::Square {
            amplitude: p[0],
            frequency: p[1],
            phase: p[2],
            offset: p[3],
            duty: p[4],
            rise: p[5],
            fall: p[6],
        },
        3 => Waveform::Triangle {
            amplitude: p[0],
            frequency: p[1],
            phase: p[2],
            offset: p[3],
        },
        4 => Waveform::Sawtooth {
            amplitude: p[0],
            frequency: p[1],
            phase: p[2],
            offset: p[3],
        },
        5 => Waveform::Noise {
            amplitude: p[0],
            offset: p[3],
        },
        _ => {
            return Err(CoreError::CorruptNetlist(format!(
                "unknown waveform code {code}"
            )));
        }
    })
}

fn family_code(f: &LogicFamily) -> i32 {
    match f {
        LogicFamily::Ttl => 0,
        LogicFamily::Cmos5 => 1,
        LogicFamily::Cmos3v3 => 2,
        LogicFamily::Lvcmos => 3,
        LogicFamily::Custom { .. } => 4,
    }
}

/// Encode `kind` into the fixed props union: aux words + parameter slots.
fn encode_props(kind: &ComponentKind) -> ([i32; NUM_AUX], [f64; NUM_PARAMS]) {
    let mut aux = [0i32; NUM_AUX];
    let mut p = [0f64; NUM_PARAMS];
    match kind {
        ComponentKind::Resistor(r) => {
            p[0] = r.resistance;
            p[1] = r.tempco;
            p[2] = r.t_nominal;
            p[3] = r.tolerance;
        }
        ComponentKind::Photoresistor(r) => {
            p[0] = r.r_dark;
            p[1] = r.r_light;
        }
        ComponentKind::Thermistor(r) => {
            p[0] = r.r_nominal;
            p[1] = r.beta;
            p[2] = r.t_nominal;
        }
        ComponentKind::Capacitor(c) => {
            p[0] = c.capacitance;
            p[1] = c.esr;
            p[2] = c.esl;
            p[3] = c.leakage;
            p[4] = c.tolerance;
        }
        ComponentKind::Inductor(l) => {
            p[0] = l.inductance;
            p[1] = l.dcr;
            p[2] = l.isat;
            p[3] = l.tolerance;
        }
        ComponentKind::Diode(d) => {
            aux[0] = match d.kind {
                DiodeKind::Standard => 0,
                DiodeKind::Zener => 1,
                DiodeKind::Schottky => 2,
                DiodeKind::Led => 3,
            };
            p[0] = d.is;
            p[1] = d.n;
            p[2] = d.bv;
            p[3] = d.ibv;
            p[4] = d.cj0;
        }
        ComponentKind::Bjt(b) => {
            aux[0] = match b.polarity {
                BjtPolarity::Npn => 0,
                BjtPolarity::Pnp => 1,
            };
            aux[1] = b.ideal as i32;
            p[0] = b.beta;
            p[1] = b.beta_r;
            p[2] = b.is;
            p[3] = b.vaf;
            p[4] = b.nf;
        }
        ComponentKind::Mosfet(m) => {
            aux[0] = match m.polarity {
                MosfetPolarity::Nmos => 0,
                MosfetPolarity::Pmos => 1,
            };
            p[0] = m.vth;
            p[1] = m.kp;
            p[2] = m.lambda;
            p[3] = m.w;
            p[4] = m.l;
        }
        ComponentKind::OpAmp(o) => {
            aux[1] = o.ideal as i32;
            p[0] = o.gain;
            p[1] = o.gbw;
            p[2] = o.slew;
            p[3] = o.r_in;
            p[4] = o.r_out;
            p[5] = o.v_min;
            p[6] = o.v_max;
        }
        ComponentKind::VoltageSource(s) => {
            encode_waveform(&s.waveform, &mut p);
            p[7] = s.series_resistance;
        }
        ComponentKind::CurrentSource(s) => {
            aux[0] = waveform_code(&s.waveform);
            encode_waveform(&s.waveform, &mut p);
            p[7] = s.series_resistance;
        }
        ComponentKind::Switch(s) => {
            aux[1] = (s.closed as i32) | ((s.momentary as i32) << 1);
            p[0] = s.r_on;
            p[1] = s.r_off;
        }
        ComponentKind::Relay(r) => {
            p[0] = r.coil_resistance;
            p[1] = r.pull_in;
            p[2] = r.r_on;
            p[3] = r.r_off;
        }
        ComponentKind::Transformer(t) => {
            p[0] = t.turns_ratio;
        }
        ComponentKind::LogicGate(g) => {
            aux[0] = match g.op {
                GateOp::Buf => 0,
                GateOp::Not => 1,
                GateOp::And => 2,
                GateOp::Or => 3,
                GateOp::Nand => 4,
                GateOp::Nor => 5,
                GateOp::Xor => 6,
            };
            aux[1] = (g.schmitt as i32) | (family_code(&g.family) << 1);
            if let LogicFamily::Custom {
                v_il,
                v_ih,
                v_ol,
                v_oh,
                r_out,
            } = g.family
            {
                p[0] = v_il;
                p[1] = v_ih;
                p[2] = v_ol;
                p[3] = v_oh;
                p[4] = r_out;
            }
        }
        ComponentKind::Voltmeter | ComponentKind::Ammeter => {}
        ComponentKind::AntennaTx(a) | ComponentKind::AntennaRx(a) => {
            aux[0] = a.channel as i32;
            p[0] = a.r_out;
            p[1] = a.gain;
        }
    }
    (aux, p)
}

fn decode_props(code: i32, aux: [i32; NUM_AUX], p: [f64; NUM_PARAMS]) -> Result<ComponentKind> {
    Ok(match code {
        0 => ComponentKind::Resistor(ResistorParams {
            resistance: p[0],
            tempco: p[1],
            t_nominal: p[2],
            tolerance: p[3],
        }),
        1 => ComponentKind::Capacitor(CapacitorParams {
            capacitance: p[0],
            esr: p[1],
            esl: p[2],
            leakage: p[3],
            tolerance: p[4],
        }),
        2 => ComponentKind::Inductor(InductorParams {
            inductance: p[0],
            dcr: p[1],
            isat: p[2],
            tolerance: p[3],
        }),
        3 => ComponentKind::Diode(DiodeParams {
            kind: match aux[0] {
                0 => DiodeKind::Standard,
                1 => DiodeKind::Zener,
                2 => DiodeKind::Schottky,
                3 => DiodeKind::Led,
                other => {
                    return Err(CoreError::CorruptNetlist(format!(
                        "unknown diode kind {other}"
                    )));
                }
            },
            is: p[0],
            n: p[1],
            bv: p[2],
            ibv: p[3],
            cj0: p[4],
        }),
        4 => ComponentKind::Bjt(BjtParams {
            polarity: if aux[0] == 0 {
                BjtPolarity::Npn
            } else {
                BjtPolarity::Pnp
            },
            beta: p[0],
            beta_r: p[1],
            is: p[2],
            vaf: p[3],
            nf: p[4],
            ideal: aux[1] & 1 != 0,
        }),
        5 => ComponentKind::Mosfet(MosfetParams {
            polarity: if aux[0] == 0 {
                MosfetPolarity::Nmos
            } else {
                MosfetPolarity::Pmos
            },
            vth: p[0],
            kp: p[1],
            lambda: p[2],
            w: p[3],
            l: p[4],
        }),
        6 => ComponentKind::OpAmp(OpAmpParams {
            gain: p[0],
            gbw: p[1],
            slew: p[2],
            r_in: p[3],
            r_out: p[4],
            v_min: p[5],
            v_max: p[6],
            ideal: aux[1] & 1 != 0,
        }),
        7..=12 => ComponentKind::VoltageSource(SourceParams {
            waveform: decode_waveform(code - 7, &p)?,
            series_resistance: p[7],
            tolerance: 0.0,
            sweep: None,
        }),
        13 => ComponentKind::CurrentSource(SourceParams {
            waveform: decode_waveform(aux[0], &p)?,
            series_resistance: p[7],
            tolerance: 0.0,
            sweep: None,
        }),
        14 => ComponentKind::Switch(SwitchParams {
            closed: aux[1] & 1 != 0,
            momentary: aux[1] & 2 != 0,
            r_on: p[0],
            r_off: p[1],
        }),
        15 => ComponentKind::Relay(RelayParams {
            coil_resistance: p[0],
            pull_in: p[1],
            r_on: p[2],
            r_off: p[3],
        }),
        16 => ComponentKind::Transformer(TransformerParams { turns_ratio: p[0] }),
        17 => {
            let op = match aux[0] {
                0 => GateOp::Buf,
                1 => GateOp::Not,
                2 => GateOp::And,
                3 => GateOp::Or,
                4 => GateOp::Nand,
                5 => GateOp::Nor,
                6 => GateOp::Xor,
                other => {
                    return Err(CoreError::CorruptNetlist(format!(
                        "unknown gate op {other}"
                    )));
                }
            };
            let family = match aux[1] >> 1 {
                0 => LogicFamily::Ttl,
                1 => LogicFamily::Cmos5,
                2 => LogicFamily::Cmos3v3,
                3 => LogicFamily::Lvcmos,
                4 => LogicFamily::Custom {
                    v_il: p[0],
                    v_ih: p[1],
                    v_ol: p[2],
                    v_oh: p[3],
                    r_out: p[4],
                },
                other => {
                    return Err(CoreError::CorruptNetlist(format!(
                        "unknown logic family {other}"
                    )));
                }
            };
            ComponentKind::LogicGate(LogicGateParams {
                op,
                family,
                schmitt: aux[1] & 1 != 0,
            })
        }
        18 => ComponentKind::Voltmeter,
        19 => ComponentKind::Ammeter,
        20 => ComponentKind::Photoresistor(PhotoresistorParams {
            r_dark: p[0],
            r_light: p[1],
        }),
        21 => ComponentKind::Thermistor(ThermistorParams {
            r_nominal: p[0],
            beta: p[1],
            t_nominal: p[2],
        }),
        22 => ComponentKind::AntennaTx(AntennaParams {
            channel: aux[0] as u16,
            r_out: p[0],
            gain: p[1],
        }),
        23 => ComponentKind::AntennaRx(AntennaParams {
            channel: aux[0] as u16,
            r_out: p[0],
            gain: p[1],
        }),
        other => {
            return Err(CoreError::CorruptNetlist(format!(
                "unknown component type {other}"
            )));
        }
    })
}

// ────────────────────────── save/load ──────────────────────────

/// Serialize a circuit to the binary `.circ` format.
pub fn save(circuit: &Circuit) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(MAGIC);
    w.u32(VERSION);

    w.i32(circuit.num_components() as i32);
    for comp in circuit.components() {
        w.i32(kind_code(&comp.kind));
        w.f32(comp.position.0);
        w.f32(comp.position.1);
        w.i32(comp.rotation);
        w.label(&comp.label);

        let (aux, params) = encode_props(&comp.kind);
        for slot in 0..MAX_TERMINALS {
            let id = comp
                .terminals
                .get(slot)
                .map(|n| n.as_u32() as i32)
                .unwrap_or(-1);
            w.i32(id);
        }
        for a in aux {
            w.i32(a);
        }
        for v in params {
            w.f64(v);
        }
    }

    w.i32(circuit.num_nodes() as i32);
    for node in circuit.nodes() {
        w.i32(node.id.as_u32() as i32);
        w.f32(node.position.0);
        w.f32(node.position.1);
        w.u32(node.is_ground as u32);
    }

    w.i32(circuit.wires().len() as i32);
    for wire in circuit.wires() {
        w.i32(wire.start.as_u32() as i32);
        w.i32(wire.end.as_u32() as i32);
    }

    w.buf
}

/// Deserialize the binary `.circ` format.
pub fn load(bytes: &[u8]) -> Result<Circuit> {
    let mut r = Reader::new(bytes);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(CoreError::CorruptNetlist(format!(
            "bad magic 0x{magic:08x}"
        )));
    }
    let version = r.u32()?;
    if version > VERSION {
        return Err(CoreError::UnsupportedVersion {
            found: version,
            supported: VERSION,
        });
    }

    let num_components = r.i32()?;
    if num_components < 0 {
        return Err(CoreError::CorruptNetlist("negative component count".into()));
    }

    struct RawComponent {
        kind: ComponentKind,
        terminals: Vec<NodeId>,
        position: (f32, f32),
        rotation: i32,
        label: String,
    }

    let mut raw_components = Vec::with_capacity(num_components as usize);
    for _ in 0..num_components {
        let code = r.i32()?;
        let x = r.f32()?;
        let y = r.f32()?;
        let rotation = r.i32()?;
        let label = r.label()?;

        let mut terminals = Vec::new();
        for _ in 0..MAX_TERMINALS {
            let id = r.i32()?;
            if id >= 0 {
                terminals.push(NodeId(id as u32));
            }
        }
        let mut aux = [0i32; NUM_AUX];
        for a in aux.iter_mut() {
            *a = r.i32()?;
        }
        let mut params = [0f64; NUM_PARAMS];
        for v in params.iter_mut() {
            *v = r.f64()?;
        }
        let kind = decode_props(code, aux, params)?;
        raw_components.push(RawComponent {
            kind,
            terminals,
            position: (x, y),
            rotation,
            label,
        });
    }

    let num_nodes = r.i32()?;
    if num_nodes < 0 {
        return Err(CoreError::CorruptNetlist("negative node count".into()));
    }

    let mut circuit = Circuit::new();
    let mut ground = None;
    for _ in 0..num_nodes {
        let id = r.i32()?;
        if id < 0 {
            return Err(CoreError::CorruptNetlist("negative node id".into()));
        }
        let x = r.f32()?;
        let y = r.f32()?;
        let is_ground = r.u32()? != 0;
        let node_id = NodeId(id as u32);
        if is_ground {
            if ground.is_some() {
                return Err(CoreError::CorruptNetlist(
                    "more than one ground node".into(),
                ));
            }
            ground = Some(node_id);
        }
        circuit.insert_node(Node {
            id: node_id,
            position: (x, y),
            is_ground: false,
            voltage: 0.0,
        });
    }

    for (index, raw) in raw_components.into_iter().enumerate() {
        circuit.insert_component(Component {
            id: ComponentId(index as u32),
            kind: raw.kind,
            terminals: raw.terminals,
            position: raw.position,
            rotation: raw.rotation,
            label: raw.label,
        })?;
    }

    let num_wires = r.i32()?;
    if num_wires < 0 {
        return Err(CoreError::CorruptNetlist("negative wire count".into()));
    }
    for _ in 0..num_wires {
        let start = r.i32()?;
        let end = r.i32()?;
        if start < 0 || end < 0 {
            return Err(CoreError::CorruptNetlist("negative wire endpoint".into()));
        }
        circuit.add_wire(NodeId(start as u32), NodeId(end as u32))?;
    }

    if let Some(g) = ground {
        circuit.set_ground(g)?;
    }

    Ok(circuit)
}

/// Human-readable JSON mirror of the same fields.
pub fn to_json(circuit: &Circuit) -> Result<String> {
    serde_json::to_string_pretty(circuit)
        .map_err(|e| CoreError::CorruptNetlist(format!("json encode: {e}")))
}

/// Parse the JSON mirror.
pub fn from_json(json: &str) -> Result<Circuit> {
    serde_json::from_str(json).map_err(|e| CoreError::CorruptNetlist(format!("json decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, ResistorParams, SourceParams};

    fn sample_circuit() -> Circuit {
        let mut c = Circuit::new();
        let gnd = c.add_node(0.0, 0.0);
        let vin = c.add_node(0.0, 1.0);
        let out = c.add_node(1.0, 1.0);
        c.set_ground(gnd).unwrap();
        c.add_component(
            ComponentKind::VoltageSource(SourceParams::dc(10.0)),
            vec![vin, gnd],
        )
        .unwrap();
        c.add_component(
            ComponentKind::Resistor(ResistorParams {
                resistance: 10e3,
                ..Default::default()
            }),
            vec![vin, out],
        )
        .unwrap();
        c.add_component(
            ComponentKind::Resistor(ResistorParams {
                resistance: 10e3,
                ..Default::default()
            }),
            vec![out, gnd],
        )
        .unwrap();
        c
    }

    fn assert_structurally_equal(a: &Circuit, b: &Circuit) {
        assert_eq!(a.num_nodes(), b.num_nodes());
        assert_eq!(a.num_components(), b.num_components());
        assert_eq!(a.wires().len(), b.wires().len());
        for (ca, cb) in a.components().zip(b.components()) {
            assert_eq!(ca.kind, cb.kind);
            assert_eq!(ca.terminals, cb.terminals);
            assert_eq!(ca.rotation, cb.rotation);
            assert_eq!(ca.label, cb.label);
        }
        for (na, nb) in a.nodes().zip(b.nodes()) {
            assert_eq!(na.id, nb.id);
            assert_eq!(na.is_ground, nb.is_ground);
        }
        assert_eq!(a.ground(), b.ground());
    }

    #[test]
    fn binary_round_trip() {
        let c = sample_circuit();
        let bytes = save(&c);
        let loaded = load(&bytes).unwrap();
        assert_structurally_equal(&c, &loaded);
    }

    #[test]
    fn json_round_trip() {
        let c = sample_circuit();
        let json = to_json(&c).unwrap();
        let loaded = from_json(&json).unwrap();
        assert_structurally_equal(&c, &loaded);
    }

    #[test]
    fn rejects_newer_version() {
        let c = sample_circuit();
        let mut bytes = save(&c);
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            load(&bytes),
            Err(CoreError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let c = sample_circuit();
        let mut bytes = save(&c);
        bytes[0] = 0;
        assert!(matches!(load(&bytes), Err(CoreError::CorruptNetlist(_))));
    }

    #[test]
    fn rejects_truncation() {
        let c = sample_circuit();
        let bytes = save(&c);
        let result = load(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CoreError::CorruptNetlist(_))));
    }

    #[test]
    fn all_kinds_round_trip() {
        use crate::component::*;
        let kinds: Vec<(ComponentKind, usize)> = vec![
            (ComponentKind::Capacitor(CapacitorParams::default()), 2),
            (ComponentKind::Inductor(InductorParams::default()), 2),
            (ComponentKind::Diode(DiodeParams::led()), 2),
            (ComponentKind::Bjt(BjtParams::default()), 3),
            (ComponentKind::Mosfet(MosfetParams::default()), 3),
            (ComponentKind::OpAmp(OpAmpParams::default()), 3),
            (
                ComponentKind::VoltageSource(SourceParams::square(5.0, 1000.0, 2.5)),
                2,
            ),
            (ComponentKind::CurrentSource(SourceParams::dc(1e-3)), 2),
            (ComponentKind::Switch(SwitchParams::default()), 2),
            (ComponentKind::Relay(RelayParams::default()), 4),
            (ComponentKind::Transformer(TransformerParams::default()), 4),
            (
                ComponentKind::LogicGate(LogicGateParams {
                    op: GateOp::Nand,
                    family: LogicFamily::Ttl,
                    schmitt: true,
                }),
                3,
            ),
            (ComponentKind::Voltmeter, 2),
            (ComponentKind::Ammeter, 2),
            (
                ComponentKind::Photoresistor(PhotoresistorParams::default()),
                2,
            ),
            (ComponentKind::Thermistor(ThermistorParams::default()), 2),
            (
                ComponentKind::AntennaTx(AntennaParams {
                    channel: 7,
                    ..Default::default()
                }),
                2,
            ),
            (
                ComponentKind::AntennaRx(AntennaParams {
                    channel: 7,
                    ..Default::default()
                }),
                2,
            ),
        ];

        let mut c = Circuit::new();
        let nodes: Vec<NodeId> = (0..4).map(|i| c.add_node(i as f32, 0.0)).collect();
        c.set_ground(nodes[0]).unwrap();
        for (kind, n_terms) in kinds {
            c.add_component(kind, nodes[..n_terms].to_vec()).unwrap();
        }

        let loaded = load(&save(&c)).unwrap();
        assert_structurally_equal(&c, &loaded);
    }
}
