//! Engine facade for Voltaic.
//!
//! The host constructs an [`Engine`] with a [`SimConfig`], hands it a
//! [`Circuit`], and drives it with [`Engine::step`] from its render loop.
//! Analyses (Bode, parametric sweep, Monte-Carlo) run over private
//! [`Simulator`] clones so they never perturb interactive state.
//!
//! Per accepted step the engine sequences: stamp -> solve -> commit
//! reactive state -> sample probes -> propagate wire currents.

pub mod bode;
pub mod monte_carlo;
pub mod probe;
pub mod sweep;
pub mod trigger;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DVector;
use voltaic_core::circuit::{Circuit, MAX_PROBES, NodeId};
use voltaic_core::config::SimConfig;
use voltaic_core::error::{CoreError, Result};
use voltaic_core::mna::MnaSystem;
use voltaic_core::topology::{self, NodeMap};
use voltaic_devices::bind::{DeviceSet, bind};
use voltaic_devices::stamp::{IntegrationMethod, StampContext};
use voltaic_solver::newton::{Assembly, CircuitStamper, solve_dc};
use voltaic_solver::spectral::{Spectrum, WindowFunction, fft_spectrum};
use voltaic_solver::transient::{
    StepReport, TransientCircuit, TransientDriver, TransientResult, run_transient,
};

use probe::ProbeBuffer;
use trigger::Trigger;

pub use bode::BodePoint;
pub use monte_carlo::Histogram;
pub use sweep::{SweepSpec, SweepWaveform};

/// Result of one host tick.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Simulated time consumed by this tick (s).
    pub advanced_time: f64,
    /// Total Newton iterations across the tick's steps.
    pub iterations_used: usize,
    /// Recovered problems the host should surface (empty when clean).
    pub warnings: Vec<String>,
}

/// Bridges a bound [`DeviceSet`] to the solver traits, threading the
/// ambient environment into every stamp.
struct SimStamper<'a> {
    devices: &'a mut DeviceSet,
    env: &'a voltaic_core::config::Environment,
}

impl CircuitStamper for SimStamper<'_> {
    fn stamp(&mut self, mna: &mut MnaSystem, assembly: &Assembly<'_>) -> Result<()> {
        let ctx = StampContext {
            time: assembly.time,
            dt: assembly.dt,
            method: assembly.method,
            op_point: assembly.op_point,
            source_scale: assembly.source_scale,
            gmin: assembly.gmin,
            temperature: self.env.temperature,
            light_level: self.env.light_level,
            iteration: assembly.iteration,
            step_index: assembly.step_index,
        };
        self.devices.stamp_all(mna, &ctx)
    }

    fn num_node_rows(&self) -> usize {
        self.devices.num_node_rows
    }

    fn num_branches(&self) -> usize {
        self.devices.num_branches
    }

    fn is_nonlinear(&self) -> bool {
        self.devices.has_nonlinear()
    }
}

impl TransientCircuit for SimStamper<'_> {
    fn commit_step(&mut self, solution: &DVector<f64>, dt: f64, method: IntegrationMethod) {
        self.devices.commit_step(solution, dt, method, self.env);
    }

    fn init_from_dc(&mut self, solution: &DVector<f64>) {
        self.devices.init_from_dc(solution);
    }
}

/// One simulation context: circuit, bound devices, and transient state.
///
/// Cloneable so the sweep and Monte-Carlo drivers can hand each worker a
/// private copy with no shared mutable state.
#[derive(Debug, Clone)]
pub(crate) struct Simulator {
    pub circuit: Circuit,
    pub config: SimConfig,
    pub map: NodeMap,
    pub devices: DeviceSet,
    pub driver: TransientDriver,
    topology_version: Option<u64>,
    pub dc_solution: Option<DVector<f64>>,
}

impl Simulator {
    pub fn from_parts(circuit: Circuit, config: SimConfig) -> Self {
        let dt_init = config.dt_init;
        Self {
            circuit,
            config,
            map: NodeMap::default(),
            devices: DeviceSet::empty(),
            driver: TransientDriver::new(0, dt_init),
            topology_version: None,
            dc_solution: None,
        }
    }

    /// Rebuild topology and rebind devices if the circuit changed.
    /// Returns true when a rebuild happened.
    pub fn prepare(&mut self) -> Result<bool> {
        let version = self.circuit.modified();
        if self.topology_version == Some(version) {
            return Ok(false);
        }
        self.map = topology::rebuild(&self.circuit)?;
        self.devices = bind(&self.circuit, &self.map, &self.config.env)?;
        self.driver = TransientDriver::new(self.devices.size(), self.config.dt_init);
        self.dc_solution = None;
        self.topology_version = Some(version);
        Ok(true)
    }

    /// Solve the DC operating point and seed the transient driver.
    pub fn solve_operating_point(&mut self) -> Result<()> {
        let mut stamper = SimStamper {
            devices: &mut self.devices,
            env: &self.config.env,
        };
        let result = solve_dc(&mut stamper, &self.config.solver, 0.0)?;
        self.devices.init_from_dc(&result.solution);
        self.driver.set_initial(result.solution.clone());
        self.dc_solution = Some(result.solution);
        self.write_back();
        Ok(())
    }

    /// Advance one accepted transient step.
    pub fn step_once(&mut self) -> Result<StepReport> {
        let mut stamper = SimStamper {
            devices: &mut self.devices,
            env: &self.config.env,
        };
        let report = self.driver.step(&mut stamper, &self.config)?;
        self.write_back();
        topology::wire_currents(&mut self.circuit);
        Ok(report)
    }

    /// Write solved voltages back onto nodes and probes.
    fn write_back(&mut self) {
        let map = &self.map;
        let solution = self.driver.solution();
        self.circuit.store_voltages(|id| {
            map.matrix_index(id)
                .and_then(|i| solution.get(i).copied())
                .unwrap_or(0.0)
        });
    }

    /// DC then a fixed-duration transient run (analysis drivers).
    pub fn run_for(
        &mut self,
        tstop: f64,
        cancel: Option<&AtomicBool>,
    ) -> Result<TransientResult> {
        self.prepare()?;
        let mut stamper = SimStamper {
            devices: &mut self.devices,
            env: &self.config.env,
        };
        let dc = solve_dc(&mut stamper, &self.config.solver, 0.0)?;
        let mut stamper = SimStamper {
            devices: &mut self.devices,
            env: &self.config.env,
        };
        run_transient(&mut stamper, &self.config, tstop, &dc.solution, cancel)
    }

    /// Matrix row of a circuit node, if it is not in the ground class.
    pub fn row_of(&self, node: NodeId) -> Option<usize> {
        self.map.matrix_index(node)
    }
}

/// The interactive simulation engine.
pub struct Engine {
    sim: Simulator,
    probe_buffers: Vec<ProbeBuffer>,
    trigger: Trigger,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: SimConfig) -> Self {
        let trigger = Trigger::new(config.scope.trigger.clone());
        Self {
            sim: Simulator::from_parts(Circuit::new(), config),
            probe_buffers: (0..MAX_PROBES).map(|_| ProbeBuffer::default()).collect(),
            trigger,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install a circuit; previous probe history is discarded.
    pub fn set_circuit(&mut self, circuit: Circuit) {
        self.sim = Simulator::from_parts(circuit, self.sim.config.clone());
        for buffer in &mut self.probe_buffers {
            buffer.clear();
        }
        self.trigger = Trigger::new(self.sim.config.scope.trigger.clone());
    }

    pub fn circuit(&self) -> &Circuit {
        &self.sim.circuit
    }

    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.sim.circuit
    }

    pub fn config(&self) -> &SimConfig {
        &self.sim.config
    }

    pub fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.sim.config
    }

    /// Current simulation time (s).
    pub fn time(&self) -> f64 {
        self.sim.driver.time
    }

    /// Latest solved voltage of a node.
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        self.sim.circuit.node(node).map(|n| n.voltage).unwrap_or(0.0)
    }

    /// Solve the DC operating point and write voltages back, without
    /// advancing time.
    pub fn run_operating_point(&mut self) -> Result<()> {
        self.sim.prepare()?;
        self.sim.solve_operating_point()
    }

    /// Advance the simulation by one host tick worth of wall-clock time.
    ///
    /// Solver failures that the transient driver could not repair by step
    /// reduction pause the run and come back as warnings; the last
    /// converged state stays in place. Structural errors propagate.
    pub fn step(&mut self, dt_wall: f64) -> Result<StepResult> {
        let mut warnings = Vec::new();

        if self.sim.prepare()? {
            self.trigger = Trigger::new(self.sim.config.scope.trigger.clone());
        }

        if self.sim.dc_solution.is_none() {
            match self.sim.solve_operating_point() {
                Ok(()) => {}
                Err(
                    e @ (CoreError::NoConvergence { .. } | CoreError::Singular(_)),
                ) => {
                    warnings.push(format!("operating point: {e}"));
                    // Start the transient from zero state instead.
                    let size = self.sim.devices.size();
                    self.sim.dc_solution = Some(DVector::zeros(size));
                }
                Err(e) => return Err(e),
            }
        }

        let t_start = self.sim.driver.time;
        let t_target = t_start + dt_wall * self.sim.config.speed;
        let mut iterations = 0usize;

        while self.sim.driver.time < t_target {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            match self.sim.step_once() {
                Ok(report) => {
                    iterations += report.iterations;
                    if report.fell_back_to_be {
                        warnings.push("stiff response: fell back to backward Euler".into());
                    }
                    self.sample_probes();
                }
                Err(
                    e @ (CoreError::StepTooSmall { .. }
                    | CoreError::NoConvergence { .. }
                    | CoreError::Singular(_)),
                ) => {
                    warnings.push(e.to_string());
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(StepResult {
            advanced_time: self.sim.driver.time - t_start,
            iterations_used: iterations,
            warnings,
        })
    }

    fn sample_probes(&mut self) {
        let t = self.sim.driver.time;
        let trigger_channel = self.trigger.config.channel;
        for probe in self.sim.circuit.probes() {
            let v = self
                .sim
                .circuit
                .node(probe.node)
                .map(|n| n.voltage)
                .unwrap_or(0.0);
            if let Some(buffer) = self.probe_buffers.get_mut(probe.channel) {
                buffer.push(t, v);
            }
            if probe.channel == trigger_channel {
                self.trigger.process(t, v);
            }
        }
    }

    /// Chronological `(t, V)` samples of a probe channel.
    pub fn probe_samples(&self, channel: usize) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.probe_buffers
            .get(channel)
            .into_iter()
            .flat_map(|b| b.iter())
    }

    /// Scope FFT of a probe channel (Hann window, default length).
    pub fn probe_spectrum(&self, channel: usize) -> Spectrum {
        let Some(buffer) = self.probe_buffers.get(channel) else {
            return fft_spectrum(&[], 1.0, WindowFunction::Hann);
        };
        let points: Vec<(f64, f64)> = buffer.iter().collect();
        // Estimate the sample rate from the newest interval.
        let fs = if points.len() >= 2 {
            let dt = points[points.len() - 1].0 - points[points.len() - 2].0;
            if dt > 0.0 { 1.0 / dt } else { 1.0 }
        } else {
            1.0
        };
        let samples: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
        fft_spectrum(&samples, fs, WindowFunction::Hann)
    }

    /// Scope trigger state (display front end reads this).
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Re-arm a Single-mode trigger.
    pub fn arm_trigger(&mut self) {
        let now = self.sim.driver.time;
        self.trigger.arm(now);
    }

    /// Request cancellation of step loops and running analyses.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Clear a previous cancellation request.
    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn simulator(&self) -> &Simulator {
        &self.sim
    }
}
