//! Newton-Raphson nonlinear solve with damping aids.
//!
//! Each iteration asks the circuit to stamp its linearization at the
//! current iterate, adds the GMIN floor to every node diagonal, solves the
//! dense system, and applies a damped update. Convergence requires both a
//! small update (`|dx| < tol_abs + tol_rel*|x|`) and a small KCL residual
//! at the accepted point.
//!
//! Damping aids, engaged in order: GMIN ramping on cold starts, per-device
//! junction limiting (inside the stamps), then source stepping via
//! [`solve_dc`]. Step reduction is the transient driver's job.

use nalgebra::DVector;
use voltaic_core::config::SolverConfig;
use voltaic_core::error::{CoreError, Result};
use voltaic_core::mna::MnaSystem;
use voltaic_devices::IntegrationMethod;

use crate::linear::solve_dense;

/// Inputs for one system assembly.
#[derive(Debug)]
pub struct Assembly<'a> {
    /// Current Newton iterate.
    pub op_point: &'a DVector<f64>,
    /// Simulation time being solved for (s).
    pub time: f64,
    /// Timestep; `None` for DC.
    pub dt: Option<f64>,
    pub method: IntegrationMethod,
    /// Independent-source scale in [0, 1].
    pub source_scale: f64,
    /// GMIN for this iteration.
    pub gmin: f64,
    pub iteration: usize,
    /// Accepted-step counter (keys deterministic noise).
    pub step_index: u64,
}

/// The solver's view of a bound circuit.
pub trait CircuitStamper {
    /// Stamp every device's linearization into a cleared system.
    fn stamp(&mut self, mna: &mut MnaSystem, assembly: &Assembly<'_>) -> Result<()>;

    /// KCL rows (non-ground classes plus internal nodes).
    fn num_node_rows(&self) -> usize;

    /// Branch rows (voltage-defining elements).
    fn num_branches(&self) -> usize;

    /// Whether any bound device requires Newton iteration.
    fn is_nonlinear(&self) -> bool;
}

/// Converged solve outcome.
#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub solution: DVector<f64>,
    pub iterations: usize,
}

/// Scheduling inputs for a single Newton solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveInputs {
    pub time: f64,
    pub dt: Option<f64>,
    pub method: IntegrationMethod,
    pub source_scale: f64,
    pub step_index: u64,
    /// Cold starts engage the GMIN ramp from 1e-3.
    pub cold_start: bool,
}

/// GMIN for iteration `k`: geometric ramp from 1e-3 to the floor on cold
/// starts, constant floor otherwise.
fn gmin_at(iteration: usize, floor: f64, cold_start: bool) -> f64 {
    if !cold_start {
        return floor;
    }
    let ramped = 1e-3 * 10f64.powi(-(iteration as i32));
    ramped.max(floor)
}

/// Largest per-iteration voltage move before the update is scaled down.
const MAX_VOLTAGE_STEP: f64 = 10.0;

/// Run Newton-Raphson to convergence.
pub fn solve_newton_raphson(
    stamper: &mut dyn CircuitStamper,
    config: &SolverConfig,
    inputs: SolveInputs,
    initial_guess: Option<&DVector<f64>>,
) -> Result<NewtonResult> {
    let size = stamper.num_node_rows() + stamper.num_branches();
    let mut x = match initial_guess {
        Some(guess) if guess.len() == size => guess.clone(),
        _ => DVector::zeros(size),
    };
    if size == 0 {
        return Ok(NewtonResult {
            solution: x,
            iterations: 0,
        });
    }

    let mut mna = MnaSystem::new(stamper.num_node_rows(), stamper.num_branches());
    let mut update_small = false;

    for iteration in 0..config.max_iters {
        let gmin = gmin_at(iteration, config.gmin, inputs.cold_start);

        mna.clear();
        let assembly = Assembly {
            op_point: &x,
            time: inputs.time,
            dt: inputs.dt,
            method: inputs.method,
            source_scale: inputs.source_scale,
            gmin,
            iteration,
            step_index: inputs.step_index,
        };
        stamper.stamp(&mut mna, &assembly)?;

        // GMIN floor on every node diagonal.
        for i in 0..stamper.num_node_rows() {
            mna.matrix_mut()[(i, i)] += gmin;
        }

        // Converged once the previous update was small and the freshly
        // assembled system agrees (KCL residual at the accepted point).
        if update_small {
            let residual = mna.residual_inf(&x);
            let bound = config.tol_kcl * (1.0 + mna.rhs().amax());
            if residual <= bound {
                return Ok(NewtonResult {
                    solution: x,
                    iterations: iteration,
                });
            }
        }

        let x_new = solve_dense(mna.matrix(), mna.rhs())?;
        if x_new.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::Overflow("Newton iterate".into()));
        }

        let delta = &x_new - &x;
        let delta_max = delta.amax();

        // Damped update; giant voltage moves are additionally clamped.
        let mut alpha = config.damping.clamp(1e-3, 1.0);
        if delta_max > MAX_VOLTAGE_STEP {
            alpha = alpha.min(MAX_VOLTAGE_STEP / delta_max);
        }
        x += alpha * delta;

        update_small =
            alpha * delta_max < config.tol_abs + config.tol_rel * x.amax();
    }

    Err(CoreError::NoConvergence {
        iterations: config.max_iters,
    })
}

/// DC operating point with the full damping-aid ladder: plain Newton with
/// GMIN ramp first, then source stepping 0 -> 1 in ten increments.
pub fn solve_dc(
    stamper: &mut dyn CircuitStamper,
    config: &SolverConfig,
    time: f64,
) -> Result<NewtonResult> {
    let cold = stamper.is_nonlinear();
    let base = SolveInputs {
        time,
        dt: None,
        method: IntegrationMethod::Trapezoidal,
        source_scale: 1.0,
        step_index: 0,
        cold_start: cold,
    };

    match solve_newton_raphson(stamper, config, base, None) {
        Ok(result) => Ok(result),
        Err(CoreError::NoConvergence { .. }) if config.source_stepping => {
            log::debug!("DC operating point: engaging source stepping");
            let mut guess: Option<DVector<f64>> = None;
            let mut iterations = 0;
            for step in 1..=10 {
                let scale = step as f64 / 10.0;
                let inputs = SolveInputs {
                    source_scale: scale,
                    cold_start: guess.is_none(),
                    ..base
                };
                let result =
                    solve_newton_raphson(stamper, config, inputs, guess.as_ref())?;
                iterations += result.iterations;
                guess = Some(result.solution);
            }
            let solution = guess.unwrap_or_else(|| {
                DVector::zeros(stamper.num_node_rows() + stamper.num_branches())
            });
            Ok(NewtonResult {
                solution,
                iterations,
            })
        }
        Err(e) => Err(e),
    }
}
