//! Engine configuration.
//!
//! A single [`SimConfig`] carries every tunable: timestep bounds, solver
//! tolerances and damping aids, scope/trigger settings, analysis ranges, and
//! the ambient environment. Hosts construct one up front and may adjust it
//! between ticks.

use serde::{Deserialize, Serialize};

/// Newton-Raphson solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum Newton iterations per solve.
    pub max_iters: usize,
    /// Absolute voltage convergence tolerance (V).
    pub tol_abs: f64,
    /// Relative convergence tolerance.
    pub tol_rel: f64,
    /// KCL residual tolerance (A), scaled by the RHS magnitude.
    pub tol_kcl: f64,
    /// Initial damping factor applied to Newton updates, in (0, 1].
    pub damping: f64,
    /// Floor conductance added to every node diagonal (S).
    pub gmin: f64,
    /// Enable source stepping for cold DC starts.
    pub source_stepping: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tol_abs: 1e-9,
            tol_rel: 1e-6,
            tol_kcl: 1e-9,
            damping: 1.0,
            gmin: 1e-12,
            source_stepping: true,
        }
    }
}

/// Scope trigger edge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerEdge {
    #[default]
    Rising,
    Falling,
    Either,
}

/// Scope trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Free-run after 50 ms without a trigger.
    #[default]
    Auto,
    /// Wait indefinitely for a trigger.
    Normal,
    /// One shot, then freeze until re-armed.
    Single,
}

/// Scope trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub edge: TriggerEdge,
    /// Probe channel the trigger watches.
    pub channel: usize,
    /// Trigger level (V).
    pub level: f64,
    /// Re-arm suppression interval after a trigger fires (s).
    pub holdoff: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Auto,
            edge: TriggerEdge::Rising,
            channel: 0,
            level: 0.0,
            holdoff: 0.0,
        }
    }
}

/// Oscilloscope display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Time,
    Xy,
    Fft,
}

/// Scope front-end settings carried for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Seconds per horizontal division.
    pub time_div: f64,
    /// Volts per vertical division.
    pub volt_div: f64,
    pub trigger: TriggerConfig,
    pub display_mode: DisplayMode,
    pub fft_on: bool,
    pub cursors_on: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            time_div: 1e-3,
            volt_div: 1.0,
            trigger: TriggerConfig::default(),
            display_mode: DisplayMode::Time,
            fft_on: false,
            cursors_on: false,
        }
    }
}

/// Bode (AC sweep) analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodeConfig {
    /// Start frequency (Hz).
    pub f_start: f64,
    /// Stop frequency (Hz).
    pub f_stop: f64,
    /// Number of log-spaced points.
    pub num_points: usize,
}

impl Default for BodeConfig {
    fn default() -> Self {
        Self {
            f_start: 10.0,
            f_stop: 1e6,
            num_points: 50,
        }
    }
}

/// Monte-Carlo perturbation distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum McDistribution {
    #[default]
    Uniform,
    Gaussian,
}

/// Monte-Carlo analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of runs.
    pub runs: usize,
    pub distribution: McDistribution,
    /// Base RNG seed; run `i` derives its own stream from this.
    pub seed: u64,
    /// Number of histogram bins for the collected output.
    pub bins: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            runs: 100,
            distribution: McDistribution::Uniform,
            seed: 0x5eed,
            bins: 32,
        }
    }
}

/// Ambient environment shared by temperature- and light-sensitive devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Ambient temperature (K).
    pub temperature: f64,
    /// Normalized light level in [0, 1] for photoresistors.
    pub light_level: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            light_level: 0.5,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Initial timestep (s).
    pub dt_init: f64,
    /// Smallest timestep before the driver reports `StepTooSmall` (s).
    pub dt_min: f64,
    /// Largest timestep the driver will grow to (s).
    pub dt_max: f64,
    /// Simulated seconds per wall-clock second.
    pub speed: f64,
    pub solver: SolverConfig,
    pub scope: ScopeConfig,
    pub bode: BodeConfig,
    pub monte_carlo: MonteCarloConfig,
    pub env: Environment,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt_init: 1e-5,
            dt_min: 1e-12,
            dt_max: 1e-3,
            speed: 1.0,
            solver: SolverConfig::default(),
            scope: ScopeConfig::default(),
            bode: BodeConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            env: Environment::default(),
        }
    }
}

impl SimConfig {
    /// Configuration with a fixed timestep (disables adaptive growth).
    pub fn with_fixed_step(dt: f64) -> Self {
        Self {
            dt_init: dt,
            dt_min: dt,
            dt_max: dt,
            ..Default::default()
        }
    }

    /// Override the solver settings.
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }
}
