//! Rowing Session Simulation
//!
//! Generates the flywheel impulse stream of a simulated rowing session, in
//! the recording format rowmetrics replays. The flywheel is integrated from
//! its physical model, so drag factor, power and distance are known up front.
//!
//! # Usage
//! ```bash
//! ./simulation --strokes 30 --jitter 0.002 --seed 7 | ./rowmetrics --stdin
//! ./simulation --strokes 100 --output session.txt
//! ```

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rowmetrics::config::RowingConfig;
use rowmetrics::simulation::{FlywheelSimulator, SimulatorSettings, StrokeProfile};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rowmetrics-simulation")]
#[command(about = "Flywheel impulse simulation for rowmetrics testing")]
#[command(version)]
struct Args {
    /// Number of strokes to row
    #[arg(short, long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..=100_000))]
    strokes: u32,

    /// Drive duration (s)
    #[arg(long, default_value = "0.8")]
    drive: f64,

    /// Recovery duration (s)
    #[arg(long, default_value = "1.7")]
    recovery: f64,

    /// Peak torque on the flywheel during the drive (N·m)
    #[arg(long, default_value = "6.0")]
    torque: f64,

    /// Relative timing noise on every impulse (0.002 = 0.2 %)
    #[arg(long, default_value = "0.0")]
    jitter: f64,

    /// Random seed for reproducible jitter
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Take the machine (inertia, drag, magnets) from this rowmetrics config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit impulses at their real pace instead of all at once
    #[arg(long)]
    realtime: bool,

    /// Suppress the session log on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn log_session(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => {
            let config = RowingConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            SimulatorSettings::from_rower(&config.rower)
        }
        None => SimulatorSettings::default(),
    };
    let profile = StrokeProfile {
        drive_duration: args.drive,
        recovery_duration: args.recovery,
        peak_torque: args.torque,
    };

    log_session(&"=".repeat(60), args.quiet);
    log_session("ROWING SESSION SIMULATION", args.quiet);
    log_session(&"=".repeat(60), args.quiet);
    log_session(&format!("  Flywheel inertia: {} kg·m²", settings.flywheel_inertia), args.quiet);
    log_session(&format!("  Drag factor: {:.0}", settings.drag_factor * 1e6), args.quiet);
    log_session(&format!("  Impulses per revolution: {}", settings.num_of_impulses_per_revolution), args.quiet);
    log_session(
        &format!(
            "  Strokes: {} ({:.1}s drive, {:.1}s recovery, {:.1} N·m peak)",
            args.strokes, profile.drive_duration, profile.recovery_duration, profile.peak_torque
        ),
        args.quiet,
    );
    if args.jitter > 0.0 {
        log_session(&format!("  Jitter: {} (seed {})", args.jitter, args.seed), args.quiet);
    }

    let mut simulator = FlywheelSimulator::new(settings);
    if args.jitter > 0.0 {
        simulator = simulator
            .with_jitter(args.seed, args.jitter)
            .context("Invalid jitter")?;
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    writeln!(out, "# rowmetrics simulation: {} strokes, jitter {}", args.strokes, args.jitter)?;

    // Spin-up, the strokes, then a coast long enough to end the session
    simulator.set_angular_velocity(100.0);
    simulator.coast(0.5);
    let mut written = emit(&mut simulator, &mut out, args.realtime)?;
    for stroke in 1..=args.strokes {
        simulator.stroke(&profile);
        written += emit(&mut simulator, &mut out, args.realtime)?;
        if stroke % 10 == 0 {
            log_session(&format!("  ... {stroke} strokes, {written} impulses"), args.quiet);
        }
    }
    simulator.coast(15.0);
    written += emit(&mut simulator, &mut out, args.realtime)?;
    out.flush()?;

    log_session(&format!("Done: {written} impulses"), args.quiet);
    Ok(())
}

fn emit(simulator: &mut FlywheelSimulator, out: &mut dyn Write, realtime: bool) -> Result<usize> {
    let impulses = simulator.drain_impulses();
    for &dt in &impulses {
        if realtime {
            if let Ok(delay) = Duration::try_from_secs_f64(dt) {
                std::thread::sleep(delay);
            }
        }
        writeln!(out, "{dt}")?;
        if realtime {
            out.flush()?;
        }
    }
    Ok(impulses.len())
}
