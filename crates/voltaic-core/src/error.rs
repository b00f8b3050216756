//! Engine-wide error taxonomy.
//!
//! Every fallible operation in the core returns [`Result`] with this closed
//! error set. Solver-level failures (`Singular`, `NoConvergence`) are
//! normally recovered inside the transient driver and only surface to the
//! host once step reduction has been exhausted.

use thiserror::Error;

/// Errors surfaced by the simulation core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// The MNA matrix could not be factored even after damping aids.
    #[error("singular matrix: {0}")]
    Singular(String),

    /// Matrix is non-square or RHS size does not match.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Newton iteration failed at the smallest allowed timestep.
    #[error("Newton-Raphson did not converge after {iterations} iterations")]
    NoConvergence { iterations: usize },

    /// The adaptive timestep fell below `dt_min`.
    #[error("timestep {dt:.3e} s fell below the minimum {dt_min:.3e} s")]
    StepTooSmall { dt: f64, dt_min: f64 },

    /// No ground class is reachable; the circuit cannot be indexed.
    #[error("degenerate topology: {0}")]
    DegenerateTopology(String),

    /// A state variable went non-finite despite limiting.
    #[error("numeric overflow in {0}")]
    Overflow(String),

    /// Netlist file format is newer than this engine understands.
    #[error("unsupported netlist version {found} (max supported {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Netlist failed structural checks on load.
    #[error("corrupt netlist: {0}")]
    CorruptNetlist(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
