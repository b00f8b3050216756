//! Component sum type and per-discriminator parameter records.
//!
//! A [`Component`] is a pure value: discriminator plus parameters plus an
//! ordered terminal list referencing nodes by id. Runtime state (integrator
//! state, linearization memory, thermal accumulators) lives in the bound
//! device instances, so cloning a component for clipboard/undo purposes is
//! always safe.

use serde::{Deserialize, Serialize};

use crate::circuit::NodeId;

/// Stable component identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Source/parameter sweep interpolation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepMode {
    #[default]
    Linear,
    Logarithmic,
    Stepped,
}

/// What happens when a sweep reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepRepeat {
    /// Hold the final value.
    #[default]
    Once,
    /// Wrap back to the start.
    Repeat,
    /// Triangle-wave between start and end.
    Bidirectional,
}

/// Time-driven modulation of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
    /// Seconds to traverse start -> end.
    pub duration: f64,
    pub mode: SweepMode,
    /// Step count when `mode` is `Stepped`.
    pub steps: usize,
    pub repeat: SweepRepeat,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 0.0,
            end: 1.0,
            duration: 1.0,
            mode: SweepMode::Linear,
            steps: 10,
            repeat: SweepRepeat::Once,
        }
    }
}

/// Time-dependent source waveform description.
///
/// Evaluation lives in `voltaic-devices`; this is only the persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    Dc {
        value: f64,
    },
    Sine {
        amplitude: f64,
        frequency: f64,
        phase: f64,
        offset: f64,
    },
    Square {
        amplitude: f64,
        frequency: f64,
        phase: f64,
        offset: f64,
        /// Fraction of the period spent high, in (0, 1).
        duty: f64,
        /// Rise time (s); 0 means ideal edges.
        rise: f64,
        /// Fall time (s); 0 means ideal edges.
        fall: f64,
    },
    Triangle {
        amplitude: f64,
        frequency: f64,
        phase: f64,
        offset: f64,
    },
    Sawtooth {
        amplitude: f64,
        frequency: f64,
        phase: f64,
        offset: f64,
    },
    /// Amplitude-scaled pseudo-random sample per step; the stream is seeded
    /// from the component id so runs are reproducible.
    Noise {
        amplitude: f64,
        offset: f64,
    },
}

impl Waveform {
    /// Peak amplitude of the waveform (|DC value| for DC).
    pub fn amplitude(&self) -> f64 {
        match *self {
            Waveform::Dc { value } => value.abs(),
            Waveform::Sine { amplitude, .. }
            | Waveform::Square { amplitude, .. }
            | Waveform::Triangle { amplitude, .. }
            | Waveform::Sawtooth { amplitude, .. }
            | Waveform::Noise { amplitude, .. } => amplitude,
        }
    }

    /// Fundamental frequency, if the waveform is periodic.
    pub fn frequency(&self) -> Option<f64> {
        match *self {
            Waveform::Sine { frequency, .. }
            | Waveform::Square { frequency, .. }
            | Waveform::Triangle { frequency, .. }
            | Waveform::Sawtooth { frequency, .. } => Some(frequency),
            _ => None,
        }
    }

    /// Replace the fundamental frequency (used by the Bode driver).
    pub fn set_frequency(&mut self, f: f64) {
        match self {
            Waveform::Sine { frequency, .. }
            | Waveform::Square { frequency, .. }
            | Waveform::Triangle { frequency, .. }
            | Waveform::Sawtooth { frequency, .. } => *frequency = f,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResistorParams {
    /// Nominal resistance (ohm).
    pub resistance: f64,
    /// Linear temperature coefficient (1/K).
    pub tempco: f64,
    /// Nominal temperature for `resistance` (K).
    pub t_nominal: f64,
    /// Fractional Monte-Carlo tolerance (0 disables perturbation).
    pub tolerance: f64,
}

impl Default for ResistorParams {
    fn default() -> Self {
        Self {
            resistance: 1e3,
            tempco: 0.0,
            t_nominal: 300.0,
            tolerance: 0.0,
        }
    }
}

/// Light-dependent resistor. Resistance interpolates log-linearly between
/// `r_dark` (light 0) and `r_light` (light 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoresistorParams {
    pub r_dark: f64,
    pub r_light: f64,
}

impl Default for PhotoresistorParams {
    fn default() -> Self {
        Self {
            r_dark: 1e6,
            r_light: 1e3,
        }
    }
}

/// NTC thermistor with the usual beta model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermistorParams {
    /// Resistance at `t_nominal` (ohm).
    pub r_nominal: f64,
    /// Beta constant (K).
    pub beta: f64,
    /// Nominal temperature (K).
    pub t_nominal: f64,
}

impl Default for ThermistorParams {
    fn default() -> Self {
        Self {
            r_nominal: 10e3,
            beta: 3950.0,
            t_nominal: 298.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitorParams {
    /// Capacitance (F).
    pub capacitance: f64,
    /// Equivalent series resistance (ohm); 0 disables the series lump.
    pub esr: f64,
    /// Equivalent series inductance (H); 0 disables the series lump.
    pub esl: f64,
    /// Parallel leakage resistance (ohm); 0 disables the parallel lump.
    pub leakage: f64,
    pub tolerance: f64,
}

impl Default for CapacitorParams {
    fn default() -> Self {
        Self {
            capacitance: 1e-6,
            esr: 0.0,
            esl: 0.0,
            leakage: 0.0,
            tolerance: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InductorParams {
    /// Inductance (H).
    pub inductance: f64,
    /// Winding DC resistance (ohm).
    pub dcr: f64,
    /// Saturation current (A); 0 disables saturation derating.
    pub isat: f64,
    pub tolerance: f64,
}

impl Default for InductorParams {
    fn default() -> Self {
        Self {
            inductance: 1e-3,
            dcr: 0.0,
            isat: 0.0,
            tolerance: 0.0,
        }
    }
}

/// Diode flavor; all share the Shockley equation, differing in defaults and
/// in what the host renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiodeKind {
    #[default]
    Standard,
    Zener,
    Schottky,
    Led,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiodeParams {
    pub kind: DiodeKind,
    /// Saturation current (A).
    pub is: f64,
    /// Emission coefficient.
    pub n: f64,
    /// Reverse breakdown voltage (V); 0 disables the breakdown term.
    pub bv: f64,
    /// Breakdown knee current (A).
    pub ibv: f64,
    /// Zero-bias junction capacitance (F); bound as a parallel capacitor.
    pub cj0: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            kind: DiodeKind::Standard,
            is: 1e-14,
            n: 1.0,
            bv: 0.0,
            ibv: 1e-10,
            cj0: 0.0,
        }
    }
}

impl DiodeParams {
    /// Typical 5.1 V Zener.
    pub fn zener(bv: f64) -> Self {
        Self {
            kind: DiodeKind::Zener,
            bv,
            ibv: 1e-6,
            ..Default::default()
        }
    }

    /// Red LED defaults (higher emission coefficient, larger forward drop).
    pub fn led() -> Self {
        Self {
            kind: DiodeKind::Led,
            is: 1e-18,
            n: 1.8,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BjtPolarity {
    #[default]
    Npn,
    Pnp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BjtParams {
    pub polarity: BjtPolarity,
    /// Forward current gain.
    pub beta: f64,
    /// Reverse current gain.
    pub beta_r: f64,
    /// Transport saturation current (A).
    pub is: f64,
    /// Early voltage (V); 0 disables the Early effect.
    pub vaf: f64,
    /// Forward emission coefficient.
    pub nf: f64,
    /// Collapse to the ideal model (Ic = beta*Ib, Vbe = 0.7 V).
    pub ideal: bool,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            polarity: BjtPolarity::Npn,
            beta: 100.0,
            beta_r: 1.0,
            is: 1e-14,
            vaf: 0.0,
            nf: 1.0,
            ideal: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MosfetPolarity {
    #[default]
    Nmos,
    Pmos,
}

/// Level-1 MOSFET parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosfetParams {
    pub polarity: MosfetPolarity,
    /// Threshold voltage (V), positive for both polarities.
    pub vth: f64,
    /// Transconductance parameter (A/V^2).
    pub kp: f64,
    /// Channel-length modulation (1/V).
    pub lambda: f64,
    /// Channel width (m).
    pub w: f64,
    /// Channel length (m).
    pub l: f64,
}

impl Default for MosfetParams {
    fn default() -> Self {
        Self {
            polarity: MosfetPolarity::Nmos,
            vth: 1.0,
            kp: 2e-4,
            lambda: 0.01,
            w: 10e-6,
            l: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpAmpParams {
    /// Open-loop DC gain.
    pub gain: f64,
    /// Gain-bandwidth product (Hz); 0 disables the pole.
    pub gbw: f64,
    /// Slew rate (V/s); 0 disables slew limiting.
    pub slew: f64,
    /// Differential input resistance (ohm).
    pub r_in: f64,
    /// Output resistance (ohm).
    pub r_out: f64,
    /// Negative rail (V).
    pub v_min: f64,
    /// Positive rail (V).
    pub v_max: f64,
    /// Ideal mode: virtual-short behavior via a high-gain (1e6) stamp.
    pub ideal: bool,
}

impl Default for OpAmpParams {
    fn default() -> Self {
        Self {
            gain: 1e5,
            gbw: 1e6,
            slew: 1e6,
            r_in: 10e6,
            r_out: 50.0,
            v_min: -15.0,
            v_max: 15.0,
            ideal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    pub waveform: Waveform,
    /// Internal series resistance (ohm); 0 means ideal.
    pub series_resistance: f64,
    pub tolerance: f64,
    /// Optional time-driven modulation of the waveform amplitude.
    pub sweep: Option<SweepConfig>,
}

impl SourceParams {
    pub fn dc(value: f64) -> Self {
        Self {
            waveform: Waveform::Dc { value },
            series_resistance: 0.0,
            tolerance: 0.0,
            sweep: None,
        }
    }

    pub fn sine(amplitude: f64, frequency: f64) -> Self {
        Self {
            waveform: Waveform::Sine {
                amplitude,
                frequency,
                phase: 0.0,
                offset: 0.0,
            },
            series_resistance: 0.0,
            tolerance: 0.0,
            sweep: None,
        }
    }

    pub fn square(amplitude: f64, frequency: f64, offset: f64) -> Self {
        Self {
            waveform: Waveform::Square {
                amplitude,
                frequency,
                phase: 0.0,
                offset,
                duty: 0.5,
                rise: 0.0,
                fall: 0.0,
            },
            series_resistance: 0.0,
            tolerance: 0.0,
            sweep: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchParams {
    pub closed: bool,
    /// Closed-contact resistance (ohm).
    pub r_on: f64,
    /// Open-contact resistance (ohm).
    pub r_off: f64,
    /// Push-button behavior (host releases on mouse-up).
    pub momentary: bool,
}

impl Default for SwitchParams {
    fn default() -> Self {
        Self {
            closed: false,
            r_on: 1e-3,
            r_off: 1e9,
            momentary: false,
        }
    }
}

/// Relay: coil across terminals 0-1, contact across terminals 2-3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayParams {
    pub coil_resistance: f64,
    /// Coil voltage magnitude that pulls the contact in (V).
    pub pull_in: f64,
    pub r_on: f64,
    pub r_off: f64,
}

impl Default for RelayParams {
    fn default() -> Self {
        Self {
            coil_resistance: 500.0,
            pull_in: 3.0,
            r_on: 1e-3,
            r_off: 1e9,
        }
    }
}

/// Ideal transformer: primary across terminals 0-1, secondary across 2-3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerParams {
    /// Primary:secondary turns ratio.
    pub turns_ratio: f64,
}

impl Default for TransformerParams {
    fn default() -> Self {
        Self { turns_ratio: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOp {
    Buf,
    Not,
    And,
    Or,
    Nand,
    Nor,
    Xor,
}

impl GateOp {
    /// Number of logic inputs.
    pub fn num_inputs(&self) -> usize {
        match self {
            GateOp::Buf | GateOp::Not => 1,
            _ => 2,
        }
    }
}

/// Input threshold / output drive family for the mixed-signal bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicFamily {
    Ttl,
    Cmos5,
    Cmos3v3,
    Lvcmos,
    Custom {
        v_il: f64,
        v_ih: f64,
        v_ol: f64,
        v_oh: f64,
        r_out: f64,
    },
}

impl Default for LogicFamily {
    fn default() -> Self {
        LogicFamily::Cmos5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicGateParams {
    pub op: GateOp,
    pub family: LogicFamily,
    /// Schmitt-trigger inputs: hysteresis between `v_il` and `v_ih`.
    pub schmitt: bool,
}

impl Default for LogicGateParams {
    fn default() -> Self {
        Self {
            op: GateOp::Not,
            family: LogicFamily::default(),
            schmitt: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaParams {
    /// Wireless channel number in the process-wide registry.
    pub channel: u16,
    /// Receiver output resistance (ohm).
    pub r_out: f64,
    /// Path gain applied at the receiver.
    pub gain: f64,
}

impl Default for AntennaParams {
    fn default() -> Self {
        Self {
            channel: 0,
            r_out: 50.0,
            gain: 1.0,
        }
    }
}

/// Thermal sub-model parameters; `None` on a component disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalParams {
    /// Thermal resistance junction-to-ambient (K/W).
    pub rth: f64,
    /// Thermal capacitance (J/K).
    pub cth: f64,
    /// Maximum junction temperature (K).
    pub t_max: f64,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            rth: 100.0,
            cth: 0.01,
            t_max: 423.15,
        }
    }
}

/// Component discriminator with its parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentKind {
    Resistor(ResistorParams),
    Photoresistor(PhotoresistorParams),
    Thermistor(ThermistorParams),
    Capacitor(CapacitorParams),
    Inductor(InductorParams),
    Diode(DiodeParams),
    Bjt(BjtParams),
    Mosfet(MosfetParams),
    OpAmp(OpAmpParams),
    VoltageSource(SourceParams),
    CurrentSource(SourceParams),
    Switch(SwitchParams),
    Relay(RelayParams),
    Transformer(TransformerParams),
    LogicGate(LogicGateParams),
    Voltmeter,
    Ammeter,
    AntennaTx(AntennaParams),
    AntennaRx(AntennaParams),
}

impl ComponentKind {
    /// Number of terminals this discriminator requires.
    pub fn terminal_count(&self) -> usize {
        match self {
            ComponentKind::Bjt(_) | ComponentKind::Mosfet(_) | ComponentKind::OpAmp(_) => 3,
            ComponentKind::Relay(_) | ComponentKind::Transformer(_) => 4,
            ComponentKind::LogicGate(p) => p.op.num_inputs() + 1,
            _ => 2,
        }
    }

    /// Primary value for Monte-Carlo perturbation and parametric sweeps.
    pub fn primary_value(&self) -> Option<f64> {
        match self {
            ComponentKind::Resistor(p) => Some(p.resistance),
            ComponentKind::Capacitor(p) => Some(p.capacitance),
            ComponentKind::Inductor(p) => Some(p.inductance),
            ComponentKind::VoltageSource(p) | ComponentKind::CurrentSource(p) => {
                Some(p.waveform.amplitude())
            }
            _ => None,
        }
    }

    /// Scale the primary value by `factor` (Monte-Carlo / sweep driver).
    pub fn scale_primary_value(&mut self, factor: f64) {
        match self {
            ComponentKind::Resistor(p) => p.resistance *= factor,
            ComponentKind::Capacitor(p) => p.capacitance *= factor,
            ComponentKind::Inductor(p) => p.inductance *= factor,
            ComponentKind::VoltageSource(p) | ComponentKind::CurrentSource(p) => {
                match &mut p.waveform {
                    Waveform::Dc { value } => *value *= factor,
                    Waveform::Sine { amplitude, .. }
                    | Waveform::Square { amplitude, .. }
                    | Waveform::Triangle { amplitude, .. }
                    | Waveform::Sawtooth { amplitude, .. }
                    | Waveform::Noise { amplitude, .. } => *amplitude *= factor,
                }
            }
            _ => {}
        }
    }

    /// Set the primary value directly (parametric sweep driver).
    pub fn set_primary_value(&mut self, value: f64) {
        if let Some(current) = self.primary_value() {
            if current != 0.0 {
                self.scale_primary_value(value / current);
            } else if let ComponentKind::Resistor(p) = self {
                p.resistance = value;
            }
        }
    }

    /// Fractional Monte-Carlo tolerance; 0 means the component is excluded.
    pub fn tolerance(&self) -> f64 {
        match self {
            ComponentKind::Resistor(p) => p.tolerance,
            ComponentKind::Capacitor(p) => p.tolerance,
            ComponentKind::Inductor(p) => p.tolerance,
            ComponentKind::VoltageSource(p) | ComponentKind::CurrentSource(p) => p.tolerance,
            _ => 0.0,
        }
    }
}

/// A placed component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    /// One node id per terminal, in the discriminator's canonical order.
    pub terminals: Vec<NodeId>,
    /// Editor position; opaque to the engine.
    pub position: (f32, f32),
    /// Editor rotation in 90-degree steps; opaque to the engine.
    pub rotation: i32,
    pub label: String,
}
