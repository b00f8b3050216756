//! Process-wide wireless channel registry for antenna pairs.
//!
//! This is the engine's only global state. A transmitter publishes its node
//! voltage to a channel at stamp time; receivers on the same channel stamp
//! a Thevenin drive from the last published value. Contention is one mutex
//! touch per antenna per assembly.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use voltaic_core::Result;
use voltaic_core::component::AntennaParams;
use voltaic_core::mna::MnaSystem;

use crate::stamp::{Stamp, StampContext};

static CHANNELS: LazyLock<Mutex<HashMap<u16, f64>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Publish a value on a channel.
pub fn transmit(channel: u16, value: f64) {
    if let Ok(mut map) = CHANNELS.lock() {
        map.insert(channel, value);
    }
}

/// Last value published on a channel (0 if silent).
pub fn receive(channel: u16) -> f64 {
    CHANNELS
        .lock()
        .ok()
        .and_then(|map| map.get(&channel).copied())
        .unwrap_or(0.0)
}

/// Clear a channel (circuit teardown).
pub fn clear(channel: u16) {
    if let Ok(mut map) = CHANNELS.lock() {
        map.remove(&channel);
    }
}

/// Transmitting antenna: samples its input node into the channel and loads
/// the node lightly so a bare antenna is not a floating island.
#[derive(Debug, Clone)]
pub struct AntennaTx {
    pub node: Option<usize>,
    pub reference: Option<usize>,
    pub params: AntennaParams,
}

impl Stamp for AntennaTx {
    fn stamp(&mut self, mna: &mut MnaSystem, ctx: &StampContext<'_>) -> Result<()> {
        let v = ctx.voltage_between(self.node, self.reference);
        transmit(self.params.channel, v);
        mna.stamp_conductance(self.node, self.reference, 1e-6);
        Ok(())
    }
}

/// Receiving antenna: Thevenin drive from the channel value through
/// `r_out`, scaled by the path gain.
#[derive(Debug, Clone)]
pub struct AntennaRx {
    pub node: Option<usize>,
    pub reference: Option<usize>,
    pub params: AntennaParams,
}

impl Stamp for AntennaRx {
    fn stamp(&mut self, mna: &mut MnaSystem, _ctx: &StampContext<'_>) -> Result<()> {
        let v = receive(self.params.channel) * self.params.gain;
        let g = 1.0 / self.params.r_out.max(1e-3);
        mna.stamp_conductance(self.node, self.reference, g);
        mna.stamp_current_source(self.reference, self.node, g * v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trip() {
        transmit(1000, 2.5);
        assert_eq!(receive(1000), 2.5);
        clear(1000);
        assert_eq!(receive(1000), 0.0);
    }

    #[test]
    fn silent_channel_reads_zero() {
        assert_eq!(receive(1001), 0.0);
    }
}
