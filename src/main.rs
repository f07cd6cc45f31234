//! rowmetrics service
//!
//! Reads flywheel impulses from a recording or stdin, runs them through the
//! session engine and prints metrics as they are produced.
//!
//! # Usage
//! ```bash
//! rowmetrics --replay session.txt --speed 0 --interval 500m --interval 120s
//! simulation --strokes 30 | rowmetrics --stdin --json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rowmetrics::config::RowingConfig;
use rowmetrics::pipeline::{
    forward_impulses, EngineInput, ImpulseRecorder, ImpulseSource, ReplaySource, SessionCommand, SessionLoop,
    SessionOutput, StdinSource,
};
use rowmetrics::types::{IntervalSetting, MetricsTrigger};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rowmetrics")]
#[command(about = "Rowing machine metrics from flywheel impulses")]
#[command(version)]
struct CliArgs {
    /// Config file (default: $ROWMETRICS_CONFIG, then ./rowmetrics.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay a recorded impulse file (one duration in seconds per line)
    #[arg(long, conflicts_with = "stdin")]
    replay: Option<PathBuf>,

    /// Read impulses from stdin
    #[arg(long)]
    stdin: bool,

    /// Replay speed (1 = real time, 0 = as fast as possible)
    #[arg(long, default_value = "1")]
    speed: f64,

    /// Workout intervals, e.g. `--interval 2000m --interval 120s`
    #[arg(long = "interval", value_name = "TARGET", value_parser = parse_interval)]
    intervals: Vec<IntervalSetting>,

    /// Print every output as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Copy every impulse read to this file
    #[arg(long, value_name = "PATH")]
    record_impulses: Option<PathBuf>,
}

/// `500m`, `2000m`, `120s`, `5min`; a bare number is meters.
fn parse_interval(value: &str) -> Result<IntervalSetting, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let amount: f64 = number
        .parse()
        .map_err(|_| format!("'{value}' does not start with a number"))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(format!("'{value}' must be positive"));
    }
    match unit.trim() {
        "" | "m" => Ok(IntervalSetting::distance(amount)),
        "km" => Ok(IntervalSetting::distance(amount * 1000.0)),
        "s" => Ok(IntervalSetting::time(amount)),
        "min" => Ok(IntervalSetting::time(amount * 60.0)),
        other => Err(format!("unknown interval unit '{other}' (use m, km, s or min)")),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RowingConfig> {
    match path {
        Some(path) => RowingConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RowingConfig::load()),
    }
}

// ============================================================================
// Output
// ============================================================================

async fn print_outputs(mut outputs: broadcast::Receiver<SessionOutput>, json: bool) {
    loop {
        match outputs.recv().await {
            Ok(output) => {
                if json {
                    match serde_json::to_string(&output) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("Failed to serialize output: {}", e),
                    }
                } else {
                    print_summary_line(&output);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Output printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary_line(output: &SessionOutput) {
    match output {
        SessionOutput::Stroke(stroke) => println!(
            "stroke {:>4} | drive {:.2}s {:.2}m {:>5.0}N | cycle {:.2}s {:>5.1}m {:>5.0}W | drag {:.0}",
            stroke.stroke_number,
            stroke.drive_duration,
            stroke.drive_length,
            stroke.drive_average_handle_force,
            stroke.cycle_duration,
            stroke.cycle_distance,
            stroke.cycle_power,
            stroke.drag_factor,
        ),
        SessionOutput::Metrics { trigger, snapshot, .. } => match trigger {
            MetricsTrigger::IntervalTargetReached | MetricsTrigger::RowingPaused | MetricsTrigger::RowingStopped => {
                println!(
                    "{:?}: {:.1}m in {:.1}s, {} strokes, {:.1} kcal",
                    trigger,
                    snapshot.total_linear_distance,
                    snapshot.total_moving_time,
                    snapshot.total_number_of_strokes,
                    snapshot.total_calories,
                );
            }
            _ => {}
        },
        SessionOutput::HeartRateRecovery { samples } => println!("heart rate recovery: {samples:?}"),
        SessionOutput::Vo2Max { vo2max } => println!("VO2max: {vo2max:.1} ml/kg/min"),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Logs go to stderr so stdout stays clean for metrics
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(args.config.as_ref())?;
    info!(
        profile = %config.rower.profile,
        impulses_per_revolution = config.rower.num_of_impulses_per_revolution,
        drag_factor = config.rower.drag_factor,
        "🚣 rowmetrics starting"
    );

    let mut source: Box<dyn ImpulseSource> = if args.stdin {
        Box::new(StdinSource::new())
    } else if let Some(path) = &args.replay {
        Box::new(ReplaySource::open(path, args.speed).await?)
    } else {
        return Err(anyhow::anyhow!("No impulse input: pass --replay <FILE> or --stdin"));
    };

    let mut recorder = match &args.record_impulses {
        Some(path) => Some(ImpulseRecorder::create(path).await?),
        None => None,
    };

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let (session_loop, inputs) = SessionLoop::new(&config, cancel_token.clone());
    let printer = tokio::spawn(print_outputs(session_loop.subscribe(), args.json));
    let session = tokio::spawn(session_loop.run());

    if !args.intervals.is_empty() {
        info!(intervals = args.intervals.len(), "Workout from command line");
        inputs
            .send(EngineInput::Command(SessionCommand::SetIntervals(args.intervals.clone())))
            .context("Session loop closed before the workout was sent")?;
    }

    let forwarded = forward_impulses(source.as_mut(), &inputs, recorder.as_mut(), &cancel_token).await?;
    if let Some(recorder) = &recorder {
        info!(impulses = recorder.recorded(), "Impulses recorded");
    }

    // End of input ends the session
    if inputs.send(EngineInput::Command(SessionCommand::Stop)).is_err() {
        warn!("Session loop closed before stop");
    }
    drop(inputs);

    let summary = session.await.context("Session loop panicked")?;
    printer.await.context("Output printer panicked")?;

    info!(
        forwarded,
        strokes = summary.total_number_of_strokes,
        distance = summary.total_linear_distance,
        moving_time = summary.total_moving_time,
        vo2max = summary.vo2max.unwrap_or(0.0),
        "✓ rowmetrics shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("2000m"), Ok(IntervalSetting::distance(2000.0)));
        assert_eq!(parse_interval("500"), Ok(IntervalSetting::distance(500.0)));
        assert_eq!(parse_interval("1.5km"), Ok(IntervalSetting::distance(1500.0)));
        assert_eq!(parse_interval("120s"), Ok(IntervalSetting::time(120.0)));
        assert_eq!(parse_interval("5min"), Ok(IntervalSetting::time(300.0)));
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        assert!(parse_interval("m").is_err());
        assert!(parse_interval("0m").is_err());
        assert!(parse_interval("10 laps").is_err());
        assert!(parse_interval("").is_err());
    }

    #[test]
    fn test_cli_accepts_repeated_intervals() {
        let args = CliArgs::try_parse_from([
            "rowmetrics", "--replay", "s.txt", "--interval", "500m", "--interval", "60s",
        ])
        .unwrap();
        assert_eq!(args.intervals.len(), 2);
        assert!(CliArgs::try_parse_from(["rowmetrics", "--replay", "s.txt", "--stdin"]).is_err());
    }
}
