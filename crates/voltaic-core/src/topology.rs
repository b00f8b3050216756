//! Netlist topology: node coalescing and matrix-row assignment.
//!
//! Wires have zero resistance, so the solver works on equivalence classes
//! of nodes under the wire relation. A union-find pass produces a
//! [`NodeMap`]: class index 0 is reserved for ground and never assembled
//! into the MNA matrix; the remaining classes get dense indices `1..=k`.
//!
//! The wire-current propagation at the bottom of this module is a display
//! helper for the host renderer. It is not a physical KCL solution and the
//! solver never reads it.

use std::collections::HashMap;

use crate::circuit::{Circuit, NodeId};
use crate::component::ComponentKind;
use crate::error::{CoreError, Result};

/// Node-id -> equivalence-class map produced by [`rebuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMap {
    /// Indexed by node id; value is the class index (0 = ground class).
    map: Vec<usize>,
    /// Number of non-ground classes (`k`).
    num_nonground: usize,
}

impl NodeMap {
    /// Class index of a node (0 = ground).
    pub fn class_of(&self, id: NodeId) -> usize {
        self.map.get(id.index()).copied().unwrap_or(0)
    }

    /// MNA matrix row for a node, `None` for the ground class.
    pub fn matrix_index(&self, id: NodeId) -> Option<usize> {
        self.class_of(id).checked_sub(1)
    }

    /// Number of non-ground classes; the node-row count of the matrix.
    pub fn num_nonground(&self) -> usize {
        self.num_nonground
    }

    /// True when both nodes landed in the same class.
    pub fn same_class(&self, a: NodeId, b: NodeId) -> bool {
        self.class_of(a) == self.class_of(b)
    }
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        // Union by size; ties keep the smaller root id so the result is
        // deterministic across rebuilds.
        let (big, small) = if self.size[ra] > self.size[rb] || (self.size[ra] == self.size[rb] && ra < rb)
        {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// Build the node -> matrix-row map for a circuit.
///
/// Rebuilding is idempotent: the map is a pure function of the circuit's
/// nodes, wires, and ground designation.
pub fn rebuild(circuit: &Circuit) -> Result<NodeMap> {
    if circuit.num_nodes() == 0 {
        if circuit.num_components() > 0 {
            return Err(CoreError::DegenerateTopology(
                "circuit has components but no nodes".into(),
            ));
        }
        return Ok(NodeMap {
            map: Vec::new(),
            num_nonground: 0,
        });
    }

    let capacity = circuit.max_node_id() as usize + 1;
    let mut uf = UnionFind::new(capacity);
    for wire in circuit.wires() {
        uf.union(wire.start.index(), wire.end.index());
    }

    // Locate the ground root: user-designated, otherwise the largest class
    // (smallest root id on ties, keeping rebuilds deterministic).
    let ground_root = match circuit.ground() {
        Some(g) => uf.find(g.index()),
        None => {
            let mut best: Option<(usize, usize)> = None; // (size, root)
            for node in circuit.nodes() {
                let root = uf.find(node.id.index());
                let size = uf.size[root];
                let better = match best {
                    None => true,
                    Some((bs, br)) => size > bs || (size == bs && root < br),
                };
                if better {
                    best = Some((size, root));
                }
            }
            best.map(|(_, r)| r).ok_or_else(|| {
                CoreError::DegenerateTopology("no ground class reachable".into())
            })?
        }
    };

    // Assign class indices: ground class 0, others 1..=k in node insertion
    // order of their first member.
    let mut class_of_root: HashMap<usize, usize> = HashMap::new();
    class_of_root.insert(ground_root, 0);
    let mut next = 1usize;
    for node in circuit.nodes() {
        let root = uf.find(node.id.index());
        class_of_root.entry(root).or_insert_with(|| {
            let c = next;
            next += 1;
            c
        });
    }

    let mut map = vec![0usize; capacity];
    for node in circuit.nodes() {
        let root = uf.find(node.id.index());
        map[node.id.index()] = class_of_root[&root];
    }

    Ok(NodeMap {
        map,
        num_nonground: next - 1,
    })
}

/// Thermal voltage used by the display-current diode estimate.
const DISPLAY_VT: f64 = 0.02585;

/// Post-solve wire-current propagation (display helper only).
///
/// Currents through resistive-family components are computed directly from
/// the solved node voltages; the largest magnitude anchors the scale for
/// wires whose current cannot be derived locally. Up to ten passes enforce
/// the KCL sign convention at shared endpoints.
pub fn wire_currents(circuit: &mut Circuit) {
    // Per-endpoint injection from two-terminal resistive components:
    // positive = current flowing out of terminal 0 into terminal 1.
    let mut injection: HashMap<NodeId, f64> = HashMap::new();
    let mut i_circuit = 0.0f64;

    let mut component_currents: Vec<(NodeId, NodeId, f64)> = Vec::new();
    for comp in circuit.components() {
        if comp.terminals.len() != 2 {
            continue;
        }
        let (a, b) = (comp.terminals[0], comp.terminals[1]);
        let va = circuit.node(a).map(|n| n.voltage).unwrap_or(0.0);
        let vb = circuit.node(b).map(|n| n.voltage).unwrap_or(0.0);
        let dv = va - vb;
        let i = match &comp.kind {
            ComponentKind::Resistor(p) => dv / p.resistance.max(1e-12),
            ComponentKind::Photoresistor(p) => dv / p.r_light.max(1e-12).min(p.r_dark),
            ComponentKind::Thermistor(p) => dv / p.r_nominal.max(1e-12),
            ComponentKind::Switch(p) => {
                if p.closed {
                    dv / p.r_on.max(1e-12)
                } else {
                    0.0
                }
            }
            ComponentKind::Diode(p) => {
                let nvt = p.n * DISPLAY_VT;
                let x = (dv / nvt).min(80.0);
                p.is * (x.exp() - 1.0)
            }
            ComponentKind::Ammeter => dv / 1e-3,
            _ => continue,
        };
        if i.is_finite() {
            i_circuit = i_circuit.max(i.abs());
            component_currents.push((a, b, i));
        }
    }

    for (a, b, i) in &component_currents {
        *injection.entry(*a).or_insert(0.0) += i;
        *injection.entry(*b).or_insert(0.0) -= i;
    }

    // Wires incident to each endpoint node.
    let mut incident: HashMap<NodeId, Vec<usize>> = HashMap::new();
    for (idx, wire) in circuit.wires().iter().enumerate() {
        incident.entry(wire.start).or_default().push(idx);
        incident.entry(wire.end).or_default().push(idx);
    }

    let num_wires = circuit.wires().len();
    let mut current: Vec<Option<f64>> = vec![None; num_wires];

    // Propagation: a node with exactly one unknown incident wire determines
    // that wire's current from KCL. Bounded at ten passes; anything still
    // unknown is displayed as zero.
    for _pass in 0..10 {
        let mut progressed = false;
        for (node, wires) in &incident {
            let mut unknown = None;
            // Net inflow from known contributions; component injection is an
            // outflow. Wire current sign: positive flows start -> end.
            let mut known_net = -injection.get(node).copied().unwrap_or(0.0);
            let mut unknown_count = 0;
            for &w in wires {
                let is_start = circuit.wires()[w].start == *node;
                match current[w] {
                    Some(i) => {
                        known_net += if is_start { -i } else { i };
                    }
                    None => {
                        unknown = Some((w, is_start));
                        unknown_count += 1;
                    }
                }
            }
            if unknown_count == 1 {
                if let Some((w, is_start)) = unknown {
                    // The unknown wire must cancel the known net inflow.
                    let i = if is_start { known_net } else { -known_net };
                    current[w] = Some(i);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    // Anything left unknown: fall back to the polarity heuristic against
    // the circuit-wide scale, else zero.
    for (idx, slot) in current.iter_mut().enumerate() {
        if slot.is_none() {
            let wire = &circuit.wires()[idx];
            let touches_injection = injection.contains_key(&wire.start)
                || injection.contains_key(&wire.end);
            *slot = if touches_injection {
                Some(i_circuit)
            } else {
                Some(0.0)
            };
        }
    }

    for (idx, wire) in circuit.wires_mut().iter_mut().enumerate() {
        wire.current = current[idx].unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, ResistorParams};

    fn two_node_circuit() -> (Circuit, NodeId, NodeId) {
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        (c, a, b)
    }

    #[test]
    fn ground_class_is_zero() {
        let (mut c, a, b) = two_node_circuit();
        c.set_ground(b).unwrap();
        let map = rebuild(&c).unwrap();
        assert_eq!(map.class_of(b), 0);
        assert_eq!(map.matrix_index(b), None);
        assert_eq!(map.class_of(a), 1);
        assert_eq!(map.matrix_index(a), Some(0));
        assert_eq!(map.num_nonground(), 1);
    }

    #[test]
    fn wires_coalesce_nodes() {
        let (mut c, a, b) = two_node_circuit();
        let d = c.add_node(2.0, 0.0);
        c.add_wire(a, b).unwrap();
        c.set_ground(d).unwrap();
        let map = rebuild(&c).unwrap();
        assert!(map.same_class(a, b));
        assert_eq!(map.num_nonground(), 1);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let (mut c, a, b) = two_node_circuit();
        let d = c.add_node(2.0, 0.0);
        c.add_wire(a, b).unwrap();
        c.set_ground(d).unwrap();
        let m1 = rebuild(&c).unwrap();
        let m2 = rebuild(&c).unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn redundant_wire_leaves_map_unchanged() {
        let (mut c, a, b) = two_node_circuit();
        let d = c.add_node(2.0, 0.0);
        c.add_wire(a, b).unwrap();
        c.set_ground(d).unwrap();
        let before = rebuild(&c).unwrap();

        // A second wire between already-coalesced endpoints changes nothing.
        c.add_wire(a, b).unwrap();
        let after = rebuild(&c).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn largest_class_promoted_without_ground() {
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        let d = c.add_node(2.0, 0.0);
        let lone = c.add_node(3.0, 0.0);
        c.add_wire(a, b).unwrap();
        c.add_wire(b, d).unwrap();
        let map = rebuild(&c).unwrap();
        // The 3-node class becomes ground.
        assert_eq!(map.class_of(a), 0);
        assert_eq!(map.class_of(d), 0);
        assert_ne!(map.class_of(lone), 0);
    }

    #[test]
    fn empty_circuit_is_fine() {
        let c = Circuit::new();
        let map = rebuild(&c).unwrap();
        assert_eq!(map.num_nonground(), 0);
    }

    #[test]
    fn wire_current_follows_resistor() {
        // a --R(1k)-- b, a --wire-- s, b --wire-- g; V(a)=5, V(b)=0.
        let mut c = Circuit::new();
        let a = c.add_node(0.0, 0.0);
        let b = c.add_node(1.0, 0.0);
        let s = c.add_node(0.0, 1.0);
        let g = c.add_node(1.0, 1.0);
        c.add_component(
            ComponentKind::Resistor(ResistorParams {
                resistance: 1000.0,
                ..Default::default()
            }),
            vec![a, b],
        )
        .unwrap();
        c.add_wire(s, a).unwrap();
        c.add_wire(b, g).unwrap();
        c.node_mut(a).unwrap().voltage = 5.0;
        c.node_mut(s).unwrap().voltage = 5.0;

        wire_currents(&mut c);
        // 5 mA through the resistor must appear on both wires.
        for wire in c.wires() {
            assert!(
                (wire.current.abs() - 0.005).abs() < 1e-12,
                "wire current {} (expected 5 mA)",
                wire.current
            );
        }
    }
}
