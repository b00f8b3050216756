//! Transient integration driver.
//!
//! Advances simulation time one accepted step at a time: Newton solve at
//! `t + dt`, commit reactive state on success, halve `dt` and retry on
//! non-convergence, grow `dt` by 1.2x after a run of successes. Reactive
//! state evolves only here, never inside a Newton iteration.
//!
//! Stiff switching can make the trapezoidal companion ring; when the
//! dominant component of the step-to-step update alternates sign three
//! steps in a row, the driver falls back to backward Euler.

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DVector;
use voltaic_core::config::SimConfig;
use voltaic_core::error::{CoreError, Result};
use voltaic_devices::IntegrationMethod;

use crate::newton::{CircuitStamper, SolveInputs, solve_newton_raphson};

/// Consecutive successes before the timestep grows.
const GROW_AFTER: u32 = 8;
/// Timestep growth factor.
const GROW_FACTOR: f64 = 1.2;
/// Alternating-sign steps before the BE fallback engages.
const FLIP_LIMIT: u32 = 3;

/// A circuit the transient driver can advance.
pub trait TransientCircuit: CircuitStamper {
    /// Commit reactive/thermal/bridge state after an accepted step.
    fn commit_step(&mut self, solution: &DVector<f64>, dt: f64, method: IntegrationMethod);

    /// Seed reactive state from a DC operating point.
    fn init_from_dc(&mut self, solution: &DVector<f64>);
}

/// Outcome of one accepted step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Simulation time after the step (s).
    pub time: f64,
    /// Step size actually used (s).
    pub dt_used: f64,
    /// Newton iterations of the accepting solve.
    pub iterations: usize,
    /// Integration method used for the step.
    pub method: IntegrationMethod,
    /// Times the step was halved before acceptance.
    pub halvings: u32,
    /// Whether this step triggered the fallback to backward Euler.
    pub fell_back_to_be: bool,
}

/// One timepoint of a recorded run.
#[derive(Debug, Clone)]
pub struct TimePoint {
    pub time: f64,
    pub solution: DVector<f64>,
}

/// A recorded transient run.
#[derive(Debug, Clone)]
pub struct TransientResult {
    pub points: Vec<TimePoint>,
    /// KCL rows in each solution vector (node voltages come first).
    pub num_node_rows: usize,
}

impl TransientResult {
    /// `(t, V)` waveform of one matrix row.
    pub fn voltage_waveform(&self, row: usize) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|tp| (tp.time, tp.solution[row]))
            .collect()
    }

    /// Linear interpolation of one row at an arbitrary time.
    pub fn voltage_at(&self, row: usize, time: f64) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        if time <= self.points[0].time {
            return Some(self.points[0].solution[row]);
        }
        let last = self.points.last()?;
        if time >= last.time {
            return Some(last.solution[row]);
        }
        for pair in self.points.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if time >= a.time && time <= b.time {
                let span = b.time - a.time;
                let alpha = if span > 0.0 { (time - a.time) / span } else { 0.0 };
                return Some(a.solution[row] * (1.0 - alpha) + b.solution[row] * alpha);
            }
        }
        None
    }
}

/// Step-at-a-time transient state machine.
#[derive(Debug, Clone)]
pub struct TransientDriver {
    /// Current simulation time (s).
    pub time: f64,
    /// Current timestep (s).
    pub dt: f64,
    /// Companion-model integration rule in use.
    pub method: IntegrationMethod,
    solution: DVector<f64>,
    step_index: u64,
    success_streak: u32,
    flip_count: u32,
    last_dominant: Option<(usize, f64)>,
}

impl TransientDriver {
    pub fn new(size: usize, dt_init: f64) -> Self {
        Self {
            time: 0.0,
            dt: dt_init,
            method: IntegrationMethod::Trapezoidal,
            solution: DVector::zeros(size),
            step_index: 0,
            success_streak: 0,
            flip_count: 0,
            last_dominant: None,
        }
    }

    /// Last converged solution.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    /// Accepted steps so far.
    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Seed the driver with an initial (usually DC) solution.
    pub fn set_initial(&mut self, solution: DVector<f64>) {
        self.solution = solution;
    }

    /// Advance one accepted step, halving `dt` on Newton failure.
    ///
    /// `NoConvergence` is recovered here via step reduction; only when `dt`
    /// would fall below `dt_min` does the driver surface `StepTooSmall`.
    pub fn step(
        &mut self,
        circuit: &mut dyn TransientCircuit,
        sim: &SimConfig,
    ) -> Result<StepReport> {
        let mut halvings = 0u32;
        loop {
            let inputs = SolveInputs {
                time: self.time + self.dt,
                dt: Some(self.dt),
                method: self.method,
                source_scale: 1.0,
                step_index: self.step_index,
                cold_start: false,
            };
            match solve_newton_raphson(circuit, &sim.solver, inputs, Some(&self.solution)) {
                Ok(result) => {
                    let fell_back = self.note_update(&result.solution);
                    // Commit with the method the solve actually used; the
                    // fallback applies from the next step on.
                    let commit_method = inputs.method;
                    circuit.commit_step(&result.solution, self.dt, commit_method);

                    self.solution = result.solution;
                    self.time += self.dt;
                    self.step_index += 1;
                    self.success_streak += 1;

                    let dt_used = self.dt;
                    if self.success_streak >= GROW_AFTER {
                        self.dt = (self.dt * GROW_FACTOR).min(sim.dt_max);
                        self.success_streak = 0;
                    }

                    return Ok(StepReport {
                        time: self.time,
                        dt_used,
                        iterations: result.iterations,
                        method: commit_method,
                        halvings,
                        fell_back_to_be: fell_back,
                    });
                }
                Err(CoreError::NoConvergence { .. }) => {
                    halvings += 1;
                    self.success_streak = 0;
                    let next_dt = self.dt * 0.5;
                    if next_dt < sim.dt_min {
                        return Err(CoreError::StepTooSmall {
                            dt: next_dt,
                            dt_min: sim.dt_min,
                        });
                    }
                    log::debug!(
                        "step at t={:.3e} failed to converge; halving dt to {:.3e}",
                        self.time,
                        next_dt
                    );
                    self.dt = next_dt;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Track the dominant update component; returns true when this update
    /// triggered the BE fallback.
    fn note_update(&mut self, new_solution: &DVector<f64>) -> bool {
        let delta = new_solution - &self.solution;
        let mut dominant = 0usize;
        let mut magnitude = 0.0f64;
        for (i, v) in delta.iter().enumerate() {
            if v.abs() > magnitude {
                magnitude = v.abs();
                dominant = i;
            }
        }
        if magnitude == 0.0 {
            self.last_dominant = None;
            self.flip_count = 0;
            return false;
        }
        let sign = delta[dominant].signum();
        match self.last_dominant {
            Some((idx, prev_sign)) if idx == dominant && prev_sign * sign < 0.0 => {
                self.flip_count += 1;
            }
            _ => self.flip_count = 0,
        }
        self.last_dominant = Some((dominant, sign));

        if self.flip_count >= FLIP_LIMIT && self.method == IntegrationMethod::Trapezoidal {
            log::debug!(
                "alternating residual on row {dominant}; falling back to backward Euler"
            );
            self.method = IntegrationMethod::BackwardEuler;
            self.flip_count = 0;
            return true;
        }
        false
    }
}

/// Record a fixed-duration run (analyses and the CLI front end).
///
/// The circuit's reactive state is seeded from `dc_solution` before the
/// first step. A set `cancel` flag stops the run between steps and returns
/// the points accumulated so far.
pub fn run_transient(
    circuit: &mut dyn TransientCircuit,
    sim: &SimConfig,
    tstop: f64,
    dc_solution: &DVector<f64>,
    cancel: Option<&AtomicBool>,
) -> Result<TransientResult> {
    circuit.init_from_dc(dc_solution);

    let size = circuit.num_node_rows() + circuit.num_branches();
    let mut driver = TransientDriver::new(size, sim.dt_init);
    let mut initial = DVector::zeros(size);
    for i in 0..size.min(dc_solution.len()) {
        initial[i] = dc_solution[i];
    }
    driver.set_initial(initial);

    let mut result = TransientResult {
        points: Vec::new(),
        num_node_rows: circuit.num_node_rows(),
    };
    result.points.push(TimePoint {
        time: 0.0,
        solution: driver.solution().clone(),
    });

    while driver.time < tstop {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                break;
            }
        }
        // Do not overshoot the stop time.
        if driver.time + driver.dt > tstop {
            let remaining = tstop - driver.time;
            if remaining <= tstop * 1e-12 {
                break;
            }
            driver.dt = remaining;
        }
        driver.step(circuit, sim)?;
        result.points.push(TimePoint {
            time: driver.time,
            solution: driver.solution().clone(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltaic_core::config::SimConfig;
    use voltaic_core::mna::MnaSystem;
    use voltaic_devices::passive::{Capacitor, Inductor};
    use voltaic_devices::stamp::{Stamp, StampContext};

    use crate::newton::Assembly;

    /// V1 -- R -- node1 -- C -- GND, the classic charging circuit.
    struct RcCircuit {
        voltage: f64,
        resistance: f64,
        cap: Capacitor,
    }

    impl RcCircuit {
        fn new(voltage: f64, resistance: f64, capacitance: f64) -> Self {
            Self {
                voltage,
                resistance,
                cap: Capacitor::new(capacitance, Some(1), None),
            }
        }

        fn ctx<'a>(assembly: &'a Assembly<'_>) -> StampContext<'a> {
            StampContext {
                time: assembly.time,
                dt: assembly.dt,
                method: assembly.method,
                op_point: assembly.op_point,
                source_scale: assembly.source_scale,
                gmin: assembly.gmin,
                temperature: 300.0,
                light_level: 0.5,
                iteration: assembly.iteration,
                step_index: assembly.step_index,
            }
        }
    }

    impl CircuitStamper for RcCircuit {
        fn stamp(&mut self, mna: &mut MnaSystem, assembly: &Assembly<'_>) -> Result<()> {
            mna.stamp_voltage_source(Some(0), None, 0, self.voltage * assembly.source_scale);
            mna.stamp_conductance(Some(0), Some(1), 1.0 / self.resistance);
            let ctx = Self::ctx(assembly);
            self.cap.stamp(mna, &ctx)
        }
        fn num_node_rows(&self) -> usize {
            2
        }
        fn num_branches(&self) -> usize {
            1
        }
        fn is_nonlinear(&self) -> bool {
            false
        }
    }

    impl TransientCircuit for RcCircuit {
        fn commit_step(&mut self, solution: &DVector<f64>, dt: f64, method: IntegrationMethod) {
            self.cap.commit(solution, dt, method);
        }
        fn init_from_dc(&mut self, solution: &DVector<f64>) {
            self.cap.init_from(solution);
        }
    }

    #[test]
    fn rc_charging_hits_tau_voltage() {
        // tau = 1k * 1uF = 1 ms; V(tau) = 5*(1 - 1/e) ~ 3.1606 V.
        let mut circuit = RcCircuit::new(5.0, 1000.0, 1e-6);
        let sim = SimConfig::with_fixed_step(10e-6);
        let dc = DVector::from_vec(vec![5.0, 0.0, -0.005]);
        // Start the capacitor discharged: override the DC seed.
        circuit.cap.v_prev = 0.0;

        let result = run_transient(&mut circuit, &sim, 5e-3, &dc, None).unwrap();
        // init_from_dc reseeded from dc (v_prev = 0 there anyway).
        let v_tau = result.voltage_at(1, 1e-3).unwrap();
        let expected = 5.0 * (1.0 - (-1.0f64).exp());
        assert!(
            (v_tau - expected).abs() < 0.05,
            "V(tau) = {v_tau} (expected ~{expected})"
        );

        let v_final = result.points.last().unwrap().solution[1];
        assert!((v_final - 5.0).abs() < 0.05, "V(5tau) = {v_final}");
    }

    #[test]
    fn lc_tank_oscillates_at_resonance() {
        /// Charged capacitor ringing against an inductor.
        struct LcCircuit {
            cap: Capacitor,
            ind: Inductor,
        }

        impl CircuitStamper for LcCircuit {
            fn stamp(&mut self, mna: &mut MnaSystem, assembly: &Assembly<'_>) -> Result<()> {
                let ctx = RcCircuit::ctx(assembly);
                self.cap.stamp(mna, &ctx)?;
                self.ind.stamp(mna, &ctx)
            }
            fn num_node_rows(&self) -> usize {
                1
            }
            fn num_branches(&self) -> usize {
                1
            }
            fn is_nonlinear(&self) -> bool {
                false
            }
        }

        impl TransientCircuit for LcCircuit {
            fn commit_step(
                &mut self,
                solution: &DVector<f64>,
                dt: f64,
                method: IntegrationMethod,
            ) {
                self.cap.commit(solution, dt, method);
                self.ind.commit(solution, dt, method);
            }
            fn init_from_dc(&mut self, solution: &DVector<f64>) {
                self.cap.init_from(solution);
                self.ind.init_from(solution, 1);
            }
        }

        let inductance: f64 = 1e-3;
        let capacitance: f64 = 1e-6;
        let f_expected = 1.0 / (2.0 * std::f64::consts::PI * (inductance * capacitance).sqrt());
        let period = 1.0 / f_expected;

        let mut circuit = LcCircuit {
            cap: Capacitor::new(capacitance, Some(0), None),
            ind: Inductor::new(inductance, Some(0), None, 0),
        };
        let sim = SimConfig::with_fixed_step(period / 100.0);
        // DC seed: cap charged to 5 V, no inductor current.
        let dc = DVector::from_vec(vec![5.0, 0.0]);

        let result = run_transient(&mut circuit, &sim, 3.0 * period, &dc, None).unwrap();

        // Measure the period from positive-to-negative zero crossings.
        let wave = result.voltage_waveform(0);
        let mut crossings = Vec::new();
        for pair in wave.windows(2) {
            let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
            if v0 > 0.0 && v1 <= 0.0 {
                crossings.push(t0 + (0.0 - v0) * (t1 - t0) / (v1 - v0));
            }
        }
        assert!(crossings.len() >= 2, "too few crossings: {}", crossings.len());
        let measured = crossings[1] - crossings[0];
        let error = (measured - period).abs() / period;
        assert!(
            error < 0.05,
            "period {measured:.3e} vs expected {period:.3e} ({:.1}% off)",
            error * 100.0
        );
    }

    #[test]
    fn step_too_small_is_reported() {
        /// A stamper that never converges (residual forced each iteration).
        struct Hostile;
        impl CircuitStamper for Hostile {
            fn stamp(&mut self, mna: &mut MnaSystem, assembly: &Assembly<'_>) -> Result<()> {
                // A conductance that jumps around with the iterate denies
                // Newton any fixed point.
                let v = assembly.op_point[0];
                let g = if v.rem_euclid(0.2) < 0.1 { 1.0 } else { 1e3 };
                mna.stamp_conductance(Some(0), None, g);
                mna.stamp_current_source(None, Some(0), 1.0 + v.sin() * 0.9);
                Ok(())
            }
            fn num_node_rows(&self) -> usize {
                1
            }
            fn num_branches(&self) -> usize {
                0
            }
            fn is_nonlinear(&self) -> bool {
                true
            }
        }
        impl TransientCircuit for Hostile {
            fn commit_step(&mut self, _: &DVector<f64>, _: f64, _: IntegrationMethod) {}
            fn init_from_dc(&mut self, _: &DVector<f64>) {}
        }

        let mut sim = SimConfig::default();
        sim.dt_min = 1e-9;
        sim.solver.max_iters = 10;
        let mut driver = TransientDriver::new(1, sim.dt_init);
        let err = driver.step(&mut Hostile, &sim).unwrap_err();
        assert!(matches!(err, CoreError::StepTooSmall { .. }));
    }

    #[test]
    fn dt_grows_after_sustained_success() {
        let mut circuit = RcCircuit::new(5.0, 1000.0, 1e-6);
        let mut sim = SimConfig::default();
        sim.dt_init = 1e-6;
        sim.dt_max = 1e-3;
        let dc = DVector::from_vec(vec![5.0, 5.0, 0.0]);
        circuit.init_from_dc(&dc);

        let mut driver = TransientDriver::new(3, sim.dt_init);
        driver.set_initial(dc);
        for _ in 0..GROW_AFTER + 1 {
            driver.step(&mut circuit, &sim).unwrap();
        }
        assert!(driver.dt > sim.dt_init, "dt should have grown");
    }
}
