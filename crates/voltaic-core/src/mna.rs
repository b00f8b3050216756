//! Dense MNA system matrix and stamp helpers.
//!
//! Unknowns are non-ground node voltages followed by branch currents of
//! voltage-defining elements (sources, inductors, op-amps, transformers),
//! in a stable order fixed at bind time. Row/column indices here are matrix
//! indices; `None` stands for the ground node and is skipped.
//!
//! All stamps are additive. Devices never overwrite entries.

use nalgebra::{DMatrix, DVector};

/// The assembled system `M x = b` for one solve.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Non-ground node (KCL) rows.
    pub num_nodes: usize,
    /// Branch (KVL / definition) rows, placed after the node rows.
    pub num_branches: usize,
    matrix: DMatrix<f64>,
    rhs: DVector<f64>,
}

impl MnaSystem {
    pub fn new(num_nodes: usize, num_branches: usize) -> Self {
        let size = num_nodes + num_branches;
        Self {
            num_nodes,
            num_branches,
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
        }
    }

    pub fn size(&self) -> usize {
        self.num_nodes + self.num_branches
    }

    /// Matrix row index of branch variable `branch`.
    pub fn branch_row(&self, branch: usize) -> usize {
        self.num_nodes + branch
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut DVector<f64> {
        &mut self.rhs
    }

    /// Zero the matrix and RHS for reassembly.
    pub fn clear(&mut self) {
        self.matrix.fill(0.0);
        self.rhs.fill(0.0);
    }

    /// Stamp a conductance `g` between two nodes.
    pub fn stamp_conductance(&mut self, n1: Option<usize>, n2: Option<usize>, g: f64) {
        if let Some(i) = n1 {
            self.matrix[(i, i)] += g;
        }
        if let Some(j) = n2 {
            self.matrix[(j, j)] += g;
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.matrix[(i, j)] -= g;
            self.matrix[(j, i)] -= g;
        }
    }

    /// Stamp a current source driving `i` amps from `n_from` to `n_to`
    /// (through the source), i.e. the current is injected into `n_to`.
    pub fn stamp_current_source(&mut self, n_from: Option<usize>, n_to: Option<usize>, i: f64) {
        if let Some(f) = n_from {
            self.rhs[f] -= i;
        }
        if let Some(t) = n_to {
            self.rhs[t] += i;
        }
    }

    /// Stamp a voltage source `V(n_pos) - V(n_neg) = v` using branch
    /// variable `branch`.
    pub fn stamp_voltage_source(
        &mut self,
        n_pos: Option<usize>,
        n_neg: Option<usize>,
        branch: usize,
        v: f64,
    ) {
        let br = self.branch_row(branch);
        if let Some(i) = n_pos {
            self.matrix[(i, br)] += 1.0;
            self.matrix[(br, i)] += 1.0;
        }
        if let Some(j) = n_neg {
            self.matrix[(j, br)] -= 1.0;
            self.matrix[(br, j)] -= 1.0;
        }
        self.rhs[br] += v;
    }

    /// Fold a series resistance into a voltage-source branch row:
    /// `V(n+) - V(n-) - r*i_br = v`.
    pub fn stamp_branch_resistance(&mut self, branch: usize, r: f64) {
        let br = self.branch_row(branch);
        self.matrix[(br, br)] -= r;
    }

    /// Infinity-norm residual `max|Mx - b|`.
    pub fn residual_inf(&self, x: &DVector<f64>) -> f64 {
        let r = &self.matrix * x - &self.rhs;
        r.amax()
    }
}
