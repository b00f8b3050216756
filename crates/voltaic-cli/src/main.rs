//! Voltaic command-line front end.
//!
//! Loads a netlist (binary `.circ` or its JSON mirror) and runs one of the
//! engine's analyses, printing tabular results. This is a stand-in for the
//! interactive host: the engine API it exercises is exactly what the
//! editor front end consumes.

mod output;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use voltaic_core::circuit::{Circuit, NodeId};
use voltaic_core::component::ComponentId;
use voltaic_core::config::{BodeConfig, SimConfig};
use voltaic_core::netlist;
use voltaic_engine::{Engine, SweepSpec};

#[derive(Parser)]
#[command(name = "voltaic", about = "Analog/mixed-signal circuit simulator", version)]
struct Cli {
    /// Netlist file (.circ binary or .json mirror).
    netlist: PathBuf,

    #[command(subcommand)]
    analysis: Analysis,
}

#[derive(Subcommand)]
enum Analysis {
    /// DC operating point.
    Op,
    /// Transient run.
    Tran {
        /// Stop time in seconds.
        #[arg(long)]
        tstop: f64,
        /// Fixed timestep in seconds (default 10 us).
        #[arg(long, default_value_t = 1e-5)]
        tstep: f64,
        /// Node ids to print (defaults to all).
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<u32>,
    },
    /// Bode sweep of an AC source.
    Bode {
        /// Component id of the driving voltage source.
        #[arg(long)]
        source: u32,
        /// Output node id.
        #[arg(long)]
        output: u32,
        #[arg(long, default_value_t = 10.0)]
        f_start: f64,
        #[arg(long, default_value_t = 1e6)]
        f_stop: f64,
        #[arg(long, default_value_t = 30)]
        points: usize,
    },
    /// Parametric sweep of a component's primary value.
    Sweep {
        /// Component id whose primary value is swept.
        #[arg(long)]
        component: u32,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
        #[arg(long, default_value_t = 10)]
        points: usize,
        #[arg(long)]
        log: bool,
        /// Simulated duration per point in seconds.
        #[arg(long, default_value_t = 1e-3)]
        duration: f64,
        /// Output node id.
        #[arg(long)]
        output: u32,
    },
    /// Monte-Carlo tolerance analysis.
    MonteCarlo {
        /// Target node id.
        #[arg(long)]
        target: u32,
        /// Simulated duration per run in seconds.
        #[arg(long, default_value_t = 1e-3)]
        duration: f64,
    },
}

fn load_circuit(path: &PathBuf) -> Result<Circuit> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(netlist::from_json(&text)?)
    } else {
        let bytes =
            fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(netlist::load(&bytes)?)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let circuit = load_circuit(&cli.netlist)?;
    log::info!(
        "loaded {}: {} components, {} nodes, {} wires",
        cli.netlist.display(),
        circuit.num_components(),
        circuit.num_nodes(),
        circuit.wires().len()
    );

    match cli.analysis {
        Analysis::Op => run_op(circuit),
        Analysis::Tran {
            tstop,
            tstep,
            nodes,
        } => run_tran(circuit, tstop, tstep, nodes),
        Analysis::Bode {
            source,
            output,
            f_start,
            f_stop,
            points,
        } => run_bode(circuit, source, output, f_start, f_stop, points),
        Analysis::Sweep {
            component,
            start,
            end,
            points,
            log,
            duration,
            output,
        } => run_sweep(circuit, component, start, end, points, log, duration, output),
        Analysis::MonteCarlo { target, duration } => run_monte_carlo(circuit, target, duration),
    }
}

fn run_op(circuit: Circuit) -> Result<()> {
    println!("DC Operating Point");
    println!("==================");
    println!();

    let mut engine = Engine::new(SimConfig::default());
    engine.set_circuit(circuit);
    engine
        .run_operating_point()
        .context("operating point failed")?;

    output::header(&["Node", "V"]);
    let ids: Vec<NodeId> = engine.circuit().nodes().map(|n| n.id).collect();
    for id in ids {
        output::row(&[id.as_u32() as f64, engine.node_voltage(id)]);
    }
    Ok(())
}

fn run_tran(circuit: Circuit, tstop: f64, tstep: f64, nodes: Vec<u32>) -> Result<()> {
    println!("Transient Analysis (tstop {tstop} s, tstep {tstep} s)");
    println!("=====================================================");
    println!();

    let print_nodes: Vec<NodeId> = if nodes.is_empty() {
        circuit.nodes().map(|n| n.id).collect()
    } else {
        nodes.into_iter().map(NodeId).collect()
    };

    // Attach probes to the first eight requested nodes.
    let mut circuit = circuit;
    for (channel, node) in print_nodes.iter().take(8).enumerate() {
        circuit.add_probe(*node, channel)?;
    }

    let mut engine = Engine::new(SimConfig::with_fixed_step(tstep));
    engine.set_circuit(circuit);
    let result = engine.step(tstop).context("transient failed")?;
    for warning in &result.warnings {
        log::warn!("{warning}");
    }

    let mut columns = vec!["Time".to_string()];
    for node in print_nodes.iter().take(8) {
        columns.push(format!("V({})", node.as_u32()));
    }
    let column_refs: Vec<&str> = columns.iter().map(|s| s.as_str()).collect();
    output::header(&column_refs);

    let channels: Vec<Vec<(f64, f64)>> = (0..print_nodes.len().min(8))
        .map(|ch| engine.probe_samples(ch).collect())
        .collect();
    if let Some(first) = channels.first() {
        // Decimate to at most 50 printed rows.
        let stride = (first.len() / 50).max(1);
        for i in (0..first.len()).step_by(stride) {
            let mut values = vec![first[i].0];
            for channel in &channels {
                values.push(channel.get(i).map(|&(_, v)| v).unwrap_or(0.0));
            }
            output::row(&values);
        }
    }

    println!();
    println!(
        "Transient complete: advanced {:.6e} s, {} Newton iterations.",
        result.advanced_time, result.iterations_used
    );
    Ok(())
}

fn run_bode(
    circuit: Circuit,
    source: u32,
    output_node: u32,
    f_start: f64,
    f_stop: f64,
    points: usize,
) -> Result<()> {
    println!("Bode Analysis ({f_start} Hz .. {f_stop} Hz, {points} points)");
    println!("============================================================");
    println!();

    let mut engine = Engine::new(SimConfig::default());
    engine.set_circuit(circuit);
    let rows = engine.run_bode(
        ComponentId(source),
        NodeId(output_node),
        &BodeConfig {
            f_start,
            f_stop,
            num_points: points,
        },
    )?;

    output::header(&["f (Hz)", "Mag (dB)", "Phase (deg)"]);
    for p in &rows {
        output::row(&[p.frequency, p.magnitude_db, p.phase_deg]);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_sweep(
    circuit: Circuit,
    component: u32,
    start: f64,
    end: f64,
    points: usize,
    logarithmic: bool,
    duration: f64,
    output_node: u32,
) -> Result<()> {
    println!("Parametric Sweep ({start} .. {end}, {points} points)");
    println!("====================================================");
    println!();

    if circuit.component(ComponentId(component)).is_none() {
        bail!("component {component} not found in netlist");
    }

    let mut engine = Engine::new(SimConfig::default());
    engine.set_circuit(circuit);
    let waveforms = engine.run_sweep(&SweepSpec {
        component: ComponentId(component),
        start,
        end,
        points,
        logarithmic,
        duration,
        output: NodeId(output_node),
    })?;

    output::header(&["Value", "V(final)", "Converged"]);
    for wave in &waveforms {
        let final_v = wave.samples.last().map(|&(_, v)| v).unwrap_or(f64::NAN);
        output::row(&[wave.value, final_v, if wave.converged { 1.0 } else { 0.0 }]);
    }
    Ok(())
}

fn run_monte_carlo(circuit: Circuit, target: u32, duration: f64) -> Result<()> {
    println!("Monte-Carlo Analysis");
    println!("====================");
    println!();

    let mut engine = Engine::new(SimConfig::default());
    engine.set_circuit(circuit);
    let histogram = engine.run_monte_carlo(NodeId(target), duration)?;

    output::scalar("Runs", histogram.values.len() as f64, "");
    output::scalar("Mean", histogram.mean(), "V");
    output::scalar("Std dev", histogram.std_dev(), "V");
    output::scalar("Min", histogram.min, "V");
    output::scalar("Max", histogram.max, "V");
    println!();

    output::header(&["Bin low", "Bin high", "Count"]);
    let bins = histogram.counts.len();
    let width = (histogram.max - histogram.min) / bins as f64;
    for (i, count) in histogram.counts.iter().enumerate() {
        let low = histogram.min + i as f64 * width;
        output::row(&[low, low + width, *count as f64]);
    }
    Ok(())
}
