//! Circuit container: nodes, wires, components, probes.
//!
//! Nodes are referenced by id everywhere; there are no back-pointers and
//! adjacency is recomputed on demand by the topology pass. The `modified`
//! counter increases on every structural edit so the engine knows when a
//! topology rebuild is due.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentId, ComponentKind};
use crate::error::{CoreError, Result};

/// Maximum number of scope probes.
pub const MAX_PROBES: usize = 8;

/// Stable node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A connection point. Position is editor metadata, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: (f32, f32),
    pub is_ground: bool,
    /// Latest solved voltage (engine output).
    #[serde(default)]
    pub voltage: f64,
}

/// Zero-resistance connection that coalesces its endpoint nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub start: NodeId,
    pub end: NodeId,
    /// Display current from the post-solve propagation pass.
    #[serde(default)]
    pub current: f64,
}

/// Oscilloscope probe attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub node: NodeId,
    pub channel: usize,
    pub color: u32,
    /// Latest sampled voltage.
    #[serde(default)]
    pub voltage: f64,
}

/// The complete circuit value handed to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    nodes: IndexMap<NodeId, Node>,
    wires: Vec<Wire>,
    components: IndexMap<ComponentId, Component>,
    probes: Vec<Probe>,
    ground: Option<NodeId>,
    next_node_id: u32,
    next_component_id: u32,
    /// Monotonically increasing edit counter.
    modified: u64,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node and return its id.
    pub fn add_node(&mut self, x: f32, y: f32) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                position: (x, y),
                is_ground: false,
                voltage: 0.0,
            },
        );
        self.touch();
        id
    }

    /// Insert a node with an explicit id (netlist loader).
    pub fn insert_node(&mut self, node: Node) {
        self.next_node_id = self.next_node_id.max(node.id.0 + 1);
        self.nodes.insert(node.id, node);
        self.touch();
    }

    /// Designate the ground node; clears the flag on any previous ground.
    pub fn set_ground(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(CoreError::CorruptNetlist(format!(
                "ground node {} does not exist",
                id.as_u32()
            )));
        }
        if let Some(prev) = self.ground {
            if let Some(node) = self.nodes.get_mut(&prev) {
                node.is_ground = false;
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_ground = true;
        }
        self.ground = Some(id);
        self.touch();
        Ok(())
    }

    pub fn ground(&self) -> Option<NodeId> {
        self.ground
    }

    /// Add a component; every terminal must reference an existing node.
    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        terminals: Vec<NodeId>,
    ) -> Result<ComponentId> {
        if terminals.len() != kind.terminal_count() {
            return Err(CoreError::CorruptNetlist(format!(
                "component requires {} terminals, got {}",
                kind.terminal_count(),
                terminals.len()
            )));
        }
        for t in &terminals {
            if !self.nodes.contains_key(t) {
                return Err(CoreError::CorruptNetlist(format!(
                    "terminal references missing node {}",
                    t.as_u32()
                )));
            }
        }
        let id = ComponentId(self.next_component_id);
        self.next_component_id += 1;
        self.components.insert(
            id,
            Component {
                id,
                kind,
                terminals,
                position: (0.0, 0.0),
                rotation: 0,
                label: String::new(),
            },
        );
        self.touch();
        Ok(id)
    }

    /// Insert a fully-formed component (netlist loader).
    pub fn insert_component(&mut self, component: Component) -> Result<()> {
        if component.terminals.len() != component.kind.terminal_count() {
            return Err(CoreError::CorruptNetlist(format!(
                "component {} has {} terminals, expected {}",
                component.id.as_u32(),
                component.terminals.len(),
                component.kind.terminal_count()
            )));
        }
        for t in &component.terminals {
            if !self.nodes.contains_key(t) {
                return Err(CoreError::CorruptNetlist(format!(
                    "component {} references missing node {}",
                    component.id.as_u32(),
                    t.as_u32()
                )));
            }
        }
        self.next_component_id = self.next_component_id.max(component.id.0 + 1);
        self.components.insert(component.id, component);
        self.touch();
        Ok(())
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        let removed = self.components.shift_remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn add_wire(&mut self, start: NodeId, end: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&start) || !self.nodes.contains_key(&end) {
            return Err(CoreError::CorruptNetlist(
                "wire endpoint references a missing node".into(),
            ));
        }
        self.wires.push(Wire {
            start,
            end,
            current: 0.0,
        });
        self.touch();
        Ok(())
    }

    /// Attach a probe. At most [`MAX_PROBES`] may exist.
    pub fn add_probe(&mut self, node: NodeId, channel: usize) -> Result<()> {
        if self.probes.len() >= MAX_PROBES {
            return Err(CoreError::CorruptNetlist(format!(
                "at most {MAX_PROBES} probes are supported"
            )));
        }
        if !self.nodes.contains_key(&node) {
            return Err(CoreError::CorruptNetlist(
                "probe references a missing node".into(),
            ));
        }
        self.probes.push(Probe {
            node,
            channel,
            color: channel as u32,
            voltage: 0.0,
        });
        self.touch();
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Largest node id in use; the node map is sized from this.
    pub fn max_node_id(&self) -> u32 {
        self.nodes.keys().map(|n| n.0).max().unwrap_or(0)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn wires_mut(&mut self) -> &mut [Wire] {
        &mut self.wires
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.touch();
        self.components.get_mut(&id)
    }

    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.keys().copied()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut [Probe] {
        &mut self.probes
    }

    /// Edit counter; the engine rebuilds topology when it changes.
    pub fn modified(&self) -> u64 {
        self.modified
    }

    /// Bump the edit counter.
    pub fn touch(&mut self) {
        self.modified += 1;
    }

    /// Write solved voltages back onto nodes and probes.
    pub fn store_voltages<F>(&mut self, voltage_of: F)
    where
        F: Fn(NodeId) -> f64,
    {
        for node in self.nodes.values_mut() {
            node.voltage = voltage_of(node.id);
        }
        for probe in &mut self.probes {
            probe.voltage = voltage_of(probe.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ResistorParams, SourceParams};

    #[test]
    fn modified_counter_tracks_edits() {
        let mut c = Circuit::new();
        let m0 = c.modified();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        assert!(c.modified() > m0);

        let m1 = c.modified();
        c.add_wire(a, b).unwrap();
        assert!(c.modified() > m1);
    }

    #[test]
    fn terminal_validation() {
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let missing = NodeId(999);
        let err = c.add_component(
            ComponentKind::Resistor(ResistorParams::default()),
            vec![a, missing],
        );
        assert!(matches!(err, Err(CoreError::CorruptNetlist(_))));
    }

    #[test]
    fn probe_limit() {
        let mut c = Circuit::new();
        let n = c.add_node(0.0, 0.0);
        for ch in 0..MAX_PROBES {
            c.add_probe(n, ch).unwrap();
        }
        assert!(c.add_probe(n, 8).is_err());
    }

    #[test]
    fn ground_designation_is_exclusive() {
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        c.set_ground(a).unwrap();
        c.set_ground(b).unwrap();
        assert!(!c.node(a).unwrap().is_ground);
        assert!(c.node(b).unwrap().is_ground);
        assert_eq!(c.ground(), Some(b));
    }

    #[test]
    fn voltage_source_component() {
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        let id = c
            .add_component(
                ComponentKind::VoltageSource(SourceParams::dc(5.0)),
                vec![a, b],
            )
            .unwrap();
        assert_eq!(c.component(id).unwrap().terminals.len(), 2);
    }
}
