//! Oscilloscope trigger state machine.
//!
//! States cycle idle -> armed -> triggered -> holdoff -> armed. Edge
//! detection compares consecutive samples of the selected channel against
//! the trigger level. Auto mode free-runs after 50 ms without an edge;
//! Single fires once and freezes until re-armed.

use voltaic_core::config::{TriggerConfig, TriggerEdge, TriggerMode};

/// Free-run delay for Auto mode (s).
pub const AUTO_FREERUN_DELAY: f64 = 50e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Armed,
    Triggered,
    Holdoff,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub config: TriggerConfig,
    state: TriggerState,
    previous: Option<f64>,
    /// Time of the last firing.
    fired_at: f64,
    /// Time the trigger was (re-)armed.
    armed_at: f64,
}

impl Trigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::Armed,
            previous: None,
            fired_at: f64::NEG_INFINITY,
            armed_at: 0.0,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Re-arm (after a Single capture, or on host request).
    pub fn arm(&mut self, now: f64) {
        self.state = TriggerState::Armed;
        self.previous = None;
        self.armed_at = now;
    }

    fn edge_detected(&self, prev: f64, now: f64) -> bool {
        let level = self.config.level;
        let rising = prev < level && level <= now;
        let falling = prev > level && level >= now;
        match self.config.edge {
            TriggerEdge::Rising => rising,
            TriggerEdge::Falling => falling,
            TriggerEdge::Either => rising || falling,
        }
    }

    /// Feed one sample of the trigger channel. Returns true when the
    /// trigger fires on this sample.
    pub fn process(&mut self, t: f64, v: f64) -> bool {
        match self.state {
            TriggerState::Idle => {
                self.previous = Some(v);
                false
            }
            TriggerState::Armed => {
                let fired = match self.previous {
                    Some(prev) => self.edge_detected(prev, v),
                    None => false,
                };
                self.previous = Some(v);

                let auto_fired = !fired
                    && self.config.mode == TriggerMode::Auto
                    && t - self.armed_at.max(self.fired_at) > AUTO_FREERUN_DELAY;

                if fired || auto_fired {
                    self.fired_at = t;
                    self.state = TriggerState::Triggered;
                    true
                } else {
                    false
                }
            }
            TriggerState::Triggered => {
                // Momentary state: move into holdoff (or freeze for Single).
                self.previous = Some(v);
                self.state = if self.config.mode == TriggerMode::Single {
                    TriggerState::Idle
                } else {
                    TriggerState::Holdoff
                };
                false
            }
            TriggerState::Holdoff => {
                self.previous = Some(v);
                if t - self.fired_at >= self.config.holdoff {
                    self.state = TriggerState::Armed;
                    self.armed_at = t;
                }
                false
            }
        }
    }

    /// Time of the most recent firing, if any.
    pub fn fired_at(&self) -> Option<f64> {
        if self.fired_at.is_finite() {
            Some(self.fired_at)
        } else {
            None
        }
    }
}
