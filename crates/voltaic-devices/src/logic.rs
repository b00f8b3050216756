//! Mixed-signal bridge: logic gates at the analog boundary.
//!
//! Input thresholds convert node voltages to logic levels per family;
//! Schmitt inputs hold their previous state in the `V_il..V_ih` band.
//! Outputs drive the matrix as a Norton pair through `R_out` toward
//! `V_ol`/`V_oh`. Logic evaluation happens at commit (between steps), so
//! gate state never flips inside a Newton solve; the one-step output delay
//! is the bridge's propagation model.

use nalgebra::DVector;
use voltaic_core::Result;
use voltaic_core::component::{GateOp, LogicFamily, LogicGateParams};
use voltaic_core::mna::MnaSystem;

use crate::stamp::{Stamp, StampContext};

/// Four-valued logic level at the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicLevel {
    Low,
    High,
    /// High impedance: the output drives nothing.
    Z,
    /// Unknown (input between thresholds without hysteresis).
    #[default]
    X,
}

/// Resolved electrical characteristics of a logic family.
#[derive(Debug, Clone, Copy)]
pub struct FamilyLevels {
    pub v_il: f64,
    pub v_ih: f64,
    pub v_ol: f64,
    pub v_oh: f64,
    pub r_out: f64,
}

/// Threshold/drive table for the built-in families.
pub fn family_levels(family: &LogicFamily) -> FamilyLevels {
    match *family {
        LogicFamily::Ttl => FamilyLevels {
            v_il: 0.8,
            v_ih: 2.0,
            v_ol: 0.2,
            v_oh: 3.5,
            r_out: 100.0,
        },
        LogicFamily::Cmos5 => FamilyLevels {
            v_il: 1.5,
            v_ih: 3.5,
            v_ol: 0.05,
            v_oh: 4.95,
            r_out: 200.0,
        },
        LogicFamily::Cmos3v3 => FamilyLevels {
            v_il: 1.0,
            v_ih: 2.3,
            v_ol: 0.05,
            v_oh: 3.25,
            r_out: 200.0,
        },
        LogicFamily::Lvcmos => FamilyLevels {
            v_il: 0.63,
            v_ih: 1.17,
            v_ol: 0.05,
            v_oh: 1.75,
            r_out: 200.0,
        },
        LogicFamily::Custom {
            v_il,
            v_ih,
            v_ol,
            v_oh,
            r_out,
        } => FamilyLevels {
            v_il,
            v_ih,
            v_ol,
            v_oh,
            r_out,
        },
    }
}

/// Convert an analog voltage to a logic level.
///
/// Between the thresholds, a Schmitt input retains `previous`; a plain
/// input reports `X`.
pub fn to_level(v: f64, levels: &FamilyLevels, schmitt: bool, previous: LogicLevel) -> LogicLevel {
    if v < levels.v_il {
        LogicLevel::Low
    } else if v > levels.v_ih {
        LogicLevel::High
    } else if schmitt {
        match previous {
            LogicLevel::Low | LogicLevel::High => previous,
            _ => LogicLevel::X,
        }
    } else {
        LogicLevel::X
    }
}

fn eval_gate(op: GateOp, inputs: &[LogicLevel]) -> LogicLevel {
    use LogicLevel::*;
    let bit = |l: LogicLevel| match l {
        Low => Some(false),
        High => Some(true),
        _ => None,
    };
    let a = bit(inputs[0]);
    match op {
        GateOp::Buf => match a {
            Some(x) => {
                if x {
                    High
                } else {
                    Low
                }
            }
            None => X,
        },
        GateOp::Not => match a {
            Some(x) => {
                if x {
                    Low
                } else {
                    High
                }
            }
            None => X,
        },
        _ => {
            let b = bit(inputs[1]);
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                _ => return X,
            };
            let out = match op {
                GateOp::And => a && b,
                GateOp::Or => a || b,
                GateOp::Nand => !(a && b),
                GateOp::Nor => !(a || b),
                GateOp::Xor => a ^ b,
                GateOp::Buf | GateOp::Not => unreachable!(),
            };
            if out { High } else { Low }
        }
    }
}

/// A bound logic gate instance.
#[derive(Debug, Clone)]
pub struct LogicGate {
    pub inputs: Vec<Option<usize>>,
    pub output: Option<usize>,
    pub params: LogicGateParams,
    /// Per-input hysteresis memory.
    input_state: Vec<LogicLevel>,
    /// Output level driven during the next step.
    out_level: LogicLevel,
}

impl LogicGate {
    pub fn new(params: LogicGateParams, inputs: Vec<Option<usize>>, output: Option<usize>) -> Self {
        let n = inputs.len();
        Self {
            inputs,
            output,
            params,
            input_state: vec![LogicLevel::X; n],
            out_level: LogicLevel::X,
        }
    }

    pub fn reset(&mut self) {
        self.input_state.fill(LogicLevel::X);
        self.out_level = LogicLevel::X;
    }

    /// Sample inputs from the solved step and latch the next output level.
    pub fn commit(&mut self, solution: &DVector<f64>) {
        let levels = family_levels(&self.params.family);
        for (slot, idx) in self.input_state.iter_mut().zip(self.inputs.iter()) {
            let v = idx.map(|i| solution[i]).unwrap_or(0.0);
            *slot = to_level(v, &levels, self.params.schmitt, *slot);
        }
        self.out_level = eval_gate(self.params.op, &self.input_state);
    }

    pub fn output_level(&self) -> LogicLevel {
        self.out_level
    }
}

impl Stamp for LogicGate {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        let levels = family_levels(&self.params.family);
        let v_drive = match self.out_level {
            LogicLevel::Low => levels.v_ol,
            LogicLevel::High => levels.v_oh,
            // Z or X: no drive at all.
            LogicLevel::Z | LogicLevel::X => return Ok(()),
        };
        // Norton form of the output driver: R_out toward the drive level.
        let g = 1.0 / levels.r_out.max(1e-3);
        mna.stamp_conductance(self.output, None, g);
        mna.stamp_current_source(None, self.output, g * v_drive);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltaic_core::component::LogicFamily;

    #[test]
    fn threshold_conversion() {
        let levels = family_levels(&LogicFamily::Cmos5);
        assert_eq!(
            to_level(0.3, &levels, false, LogicLevel::X),
            LogicLevel::Low
        );
        assert_eq!(
            to_level(4.7, &levels, false, LogicLevel::X),
            LogicLevel::High
        );
        assert_eq!(to_level(2.5, &levels, false, LogicLevel::X), LogicLevel::X);
    }

    #[test]
    fn schmitt_holds_between_thresholds() {
        let levels = family_levels(&LogicFamily::Cmos5);
        assert_eq!(
            to_level(2.5, &levels, true, LogicLevel::High),
            LogicLevel::High
        );
        assert_eq!(
            to_level(2.5, &levels, true, LogicLevel::Low),
            LogicLevel::Low
        );
    }

    #[test]
    fn gate_truth_tables() {
        use LogicLevel::*;
        assert_eq!(eval_gate(GateOp::Nand, &[High, High]), Low);
        assert_eq!(eval_gate(GateOp::Nand, &[High, Low]), High);
        assert_eq!(eval_gate(GateOp::Xor, &[High, Low]), High);
        assert_eq!(eval_gate(GateOp::Xor, &[High, High]), Low);
        assert_eq!(eval_gate(GateOp::Not, &[Low]), High);
        assert_eq!(eval_gate(GateOp::Or, &[X, High]), X);
    }

    #[test]
    fn inverter_drives_after_commit() {
        use nalgebra::dvector;
        let mut gate = LogicGate::new(
            LogicGateParams::default(), // NOT, CMOS5
            vec![Some(0)],
            Some(1),
        );
        // Input low -> output drives high next step.
        gate.commit(&dvector![0.2, 0.0]);
        assert_eq!(gate.output_level(), LogicLevel::High);

        let mut mna = MnaSystem::new(2, 0);
        let op = dvector![0.2, 0.0];
        let ctx = StampContext {
            time: 0.0,
            dt: Some(1e-6),
            method: crate::stamp::IntegrationMethod::Trapezoidal,
            op_point: &op,
            source_scale: 1.0,
            gmin: 1e-12,
            temperature: 300.0,
            light_level: 0.5,
            iteration: 0,
            step_index: 0,
        };
        gate.stamp(&mut mna, &ctx).unwrap();
        let g = 1.0 / 200.0;
        assert!((mna.matrix()[(1, 1)] - g).abs() < 1e-12);
        assert!((mna.rhs()[1] - g * 4.95).abs() < 1e-12);
    }

    #[test]
    fn or_gate_with_unknown_input_is_unknown() {
        assert_eq!(
            eval_gate(GateOp::Or, &[LogicLevel::X, LogicLevel::Low]),
            LogicLevel::X
        );
    }
}
