//! Session processing loop shared by every input mode.
//!
//! A single task owns the [`RowingStatistics`] and serialises everything that
//! touches it: impulses, heart-rate readings and commands arrive in order
//! over one unbounded channel, timers fire inside the same `select!`.
//! Results leave through a broadcast channel so displays, peripherals and
//! loggers can subscribe independently.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::recorder::ImpulseRecorder;
use super::source::{ImpulseEvent, ImpulseSource};
use crate::config::defaults::OUTPUT_CHANNEL_CAPACITY;
use crate::config::{RowingConfig, SessionSettings};
use crate::engine::RowingStatistics;
use crate::types::{
    EngineEvent, HeartRateMeasurement, IntervalSetting, MetricsSnapshot, MetricsTrigger, StrokeRecord,
};
use crate::vo2max::Vo2MaxEstimator;

// ============================================================================
// Inputs & Outputs
// ============================================================================

/// Operator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "intervals", rename_all = "camelCase")]
pub enum SessionCommand {
    Pause,
    Resume,
    Stop,
    Reset,
    SetIntervals(Vec<IntervalSetting>),
}

/// Everything the session loop consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// Seconds since the previous flywheel impulse
    Impulse(f64),
    HeartRate(HeartRateMeasurement),
    Command(SessionCommand),
}

/// Published to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionOutput {
    Metrics {
        at: DateTime<Utc>,
        trigger: MetricsTrigger,
        snapshot: Box<MetricsSnapshot>,
    },
    Stroke(StrokeRecord),
    HeartRateRecovery {
        samples: Vec<u16>,
    },
    /// ml/kg/min, 0 when no estimate was credible
    Vo2Max {
        vo2max: f64,
    },
}

/// Final statistics returned by [`SessionLoop::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub impulses_processed: u64,
    pub total_number_of_strokes: u32,
    pub total_linear_distance: f64,
    pub total_moving_time: f64,
    pub vo2max: Option<f64>,
}

// ============================================================================
// Session Loop
// ============================================================================

pub struct SessionLoop {
    statistics: RowingStatistics,
    estimator: Vo2MaxEstimator,
    settings: SessionSettings,
    inputs: mpsc::UnboundedReceiver<EngineInput>,
    outputs: broadcast::Sender<SessionOutput>,
    cancel_token: CancellationToken,
    /// Snapshots taken at the end of every recovery, for VO2max
    stroke_metrics: Vec<MetricsSnapshot>,
    heart_rate_deadline: Option<Instant>,
    recovery_sample_deadline: Option<Instant>,
    summary: SessionSummary,
}

impl SessionLoop {
    /// Build a loop and the sender that feeds it.
    pub fn new(config: &RowingConfig, cancel_token: CancellationToken) -> (Self, mpsc::UnboundedSender<EngineInput>) {
        let (input_tx, inputs) = mpsc::unbounded_channel();
        let (outputs, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let session_loop = Self {
            statistics: RowingStatistics::new(config),
            estimator: Vo2MaxEstimator::new(&config.user),
            settings: config.session.clone(),
            inputs,
            outputs,
            cancel_token,
            stroke_metrics: Vec::new(),
            heart_rate_deadline: None,
            recovery_sample_deadline: None,
            summary: SessionSummary::default(),
        };
        (session_loop, input_tx)
    }

    /// Subscribe before [`run`](Self::run); later subscribers miss earlier output.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionOutput> {
        self.outputs.subscribe()
    }

    /// Run until cancelled or every input sender is dropped.
    pub async fn run(mut self) -> SessionSummary {
        let mut web_updates = tokio::time::interval(Duration::from_millis(
            self.settings.effective_web_update_interval_ms(),
        ));
        web_updates.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut peripheral_updates = tokio::time::interval(Duration::from_millis(
            self.settings.effective_peripheral_update_interval_ms(),
        ));
        peripheral_updates.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            web_ms = self.settings.effective_web_update_interval_ms(),
            peripheral_ms = self.settings.effective_peripheral_update_interval_ms(),
            "Session loop started"
        );

        loop {
            let heart_rate_deadline = self.heart_rate_deadline;
            let recovery_sample_deadline = self.recovery_sample_deadline;

            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[SessionLoop] Shutdown signal received");
                    break;
                }
                input = self.inputs.recv() => {
                    match input {
                        Some(input) => self.handle_input(input),
                        None => {
                            info!("[SessionLoop] All input senders closed");
                            break;
                        }
                    }
                }
                _ = web_updates.tick() => self.publish_update(MetricsTrigger::WebUpdate),
                _ = peripheral_updates.tick() => self.publish_update(MetricsTrigger::PeripheralUpdate),
                _ = sleep_until(heart_rate_deadline), if heart_rate_deadline.is_some() => {
                    self.heart_rate_deadline = None;
                    self.statistics.expire_heart_rate();
                }
                _ = sleep_until(recovery_sample_deadline), if recovery_sample_deadline.is_some() => {
                    self.recovery_sample_deadline = None;
                    if let Some(event) = self.statistics.record_recovery_heart_rate() {
                        self.publish_events(vec![event]);
                    }
                    self.schedule_recovery_sample();
                }
            }
        }

        let rower = self.statistics.rower();
        self.summary.total_number_of_strokes = rower.total_number_of_strokes();
        self.summary.total_linear_distance = rower.total_linear_distance_since_start();
        self.summary.total_moving_time = rower.total_moving_time_since_start();
        info!(
            impulses = self.summary.impulses_processed,
            strokes = self.summary.total_number_of_strokes,
            distance = self.summary.total_linear_distance,
            "Session loop finished"
        );
        self.summary
    }

    fn handle_input(&mut self, input: EngineInput) {
        let events = match input {
            EngineInput::Impulse(dt) => {
                self.summary.impulses_processed += 1;
                self.statistics.handle_rotation_impulse(dt)
            }
            EngineInput::HeartRate(measurement) => {
                self.statistics.push_heart_rate(measurement);
                self.heart_rate_deadline = Some(Instant::now() + self.heart_rate_timeout());
                Vec::new()
            }
            EngineInput::Command(command) => self.handle_command(command),
        };
        self.publish_events(events);
        self.schedule_recovery_sample();
    }

    fn handle_command(&mut self, command: SessionCommand) -> Vec<EngineEvent> {
        info!(?command, "Command received");
        match command {
            SessionCommand::Pause => self.statistics.pause(),
            SessionCommand::Resume => self.statistics.resume(),
            SessionCommand::Stop => self.statistics.stop(),
            SessionCommand::Reset => {
                let events = self.statistics.reset();
                self.stroke_metrics.clear();
                self.summary.vo2max = None;
                events
            }
            SessionCommand::SetIntervals(intervals) => self.statistics.set_interval_parameters(intervals),
        }
    }

    fn publish_update(&mut self, trigger: MetricsTrigger) {
        self.publish(SessionOutput::Metrics {
            at: Utc::now(),
            trigger,
            snapshot: Box::new(self.statistics.snapshot()),
        });
    }

    fn publish_events(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::Metrics { trigger, snapshot } => {
                    if trigger == MetricsTrigger::RecoveryFinished {
                        self.stroke_metrics.push((*snapshot).clone());
                    }
                    self.publish(SessionOutput::Metrics {
                        at: Utc::now(),
                        trigger,
                        snapshot,
                    });
                    if trigger == MetricsTrigger::RowingStopped {
                        self.publish_vo2max();
                    }
                }
                EngineEvent::StrokeFinished(stroke) => self.publish(SessionOutput::Stroke(stroke)),
                EngineEvent::HeartRateRecovery { samples } => {
                    info!(?samples, "Heart rate recovery");
                    self.publish(SessionOutput::HeartRateRecovery { samples });
                }
            }
        }
    }

    fn publish_vo2max(&mut self) {
        let vo2max = self.estimator.calculate(&self.stroke_metrics);
        info!(
            vo2max,
            strokes = self.stroke_metrics.len(),
            "VO2max estimated"
        );
        self.summary.vo2max = Some(vo2max);
        self.publish(SessionOutput::Vo2Max { vo2max });
    }

    fn publish(&self, output: SessionOutput) {
        // No subscribers is not an error
        if self.outputs.send(output).is_err() {
            debug!("No output subscribers");
        }
    }

    fn schedule_recovery_sample(&mut self) {
        if !self.statistics.recovery_heart_rate_pending() {
            self.recovery_sample_deadline = None;
        } else if self.recovery_sample_deadline.is_none() {
            let interval = Duration::from_secs(self.settings.recovery_heart_rate_interval_secs);
            self.recovery_sample_deadline = Some(Instant::now() + interval);
        }
    }

    fn heart_rate_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.settings.heart_rate_timeout_secs).unwrap_or(Duration::from_secs(6))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Source Forwarding
// ============================================================================

/// Pump a source into the session loop until EOF, cancellation or a closed
/// loop, recording each impulse on the way if asked to. Returns the number
/// of impulses forwarded.
pub async fn forward_impulses<S: ImpulseSource + ?Sized>(
    source: &mut S,
    inputs: &mpsc::UnboundedSender<EngineInput>,
    mut recorder: Option<&mut ImpulseRecorder>,
    cancel_token: &CancellationToken,
) -> Result<u64> {
    let mut forwarded = 0u64;
    info!("📥 Reading impulses from {}", source.source_name());

    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = source.next_impulse() => event?,
        };

        match event {
            ImpulseEvent::Impulse(dt) => {
                if let Some(recorder) = recorder.as_mut() {
                    recorder.record(dt).await?;
                }
                if inputs.send(EngineInput::Impulse(dt)).is_err() {
                    warn!("Session loop closed, stopping source");
                    break;
                }
                forwarded += 1;
            }
            ImpulseEvent::Eof => {
                info!(impulses = forwarded, "{} reached end", source.source_name());
                break;
            }
        }
    }

    if let Some(recorder) = recorder {
        recorder.flush().await?;
    }
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReplaySource;
    use crate::simulation::{rowing_session, SimulatorSettings, StrokeProfile};
    use crate::types::SessionStatus;

    fn concept2() -> RowingConfig {
        RowingConfig::from_toml_str("[rower]\nprofile = \"concept2_rowerg\"\n").unwrap()
    }

    /// Everything published so far, without the timer-driven updates.
    fn drain(rx: &mut broadcast::Receiver<SessionOutput>) -> Vec<SessionOutput> {
        let mut outputs = Vec::new();
        while let Ok(output) = rx.try_recv() {
            let periodic = matches!(
                output,
                SessionOutput::Metrics {
                    trigger: MetricsTrigger::WebUpdate | MetricsTrigger::PeripheralUpdate,
                    ..
                }
            );
            if !periodic {
                outputs.push(output);
            }
        }
        outputs
    }

    fn triggers(outputs: &[SessionOutput]) -> Vec<MetricsTrigger> {
        outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Metrics { trigger, .. } => Some(*trigger),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_simulated_session_through_loop() {
        let config = concept2();
        let (session, tx) = SessionLoop::new(&config, CancellationToken::new());
        let mut rx = session.subscribe();

        let impulses = rowing_session(SimulatorSettings::default(), &StrokeProfile::default(), 10);
        let expected_impulses = impulses.len() as u64;
        for dt in impulses {
            tx.send(EngineInput::Impulse(dt)).unwrap();
        }
        tx.send(EngineInput::Command(SessionCommand::Stop)).unwrap();
        drop(tx);

        let summary = session.run().await;
        assert_eq!(summary.impulses_processed, expected_impulses);
        assert_eq!(summary.total_number_of_strokes, 10);

        let outputs = drain(&mut rx);
        let strokes = outputs.iter().filter(|o| matches!(o, SessionOutput::Stroke(_))).count();
        assert_eq!(strokes, 10);

        let triggers = triggers(&outputs);
        assert!(triggers.contains(&MetricsTrigger::RowingPaused), "{triggers:?}");
        assert_eq!(triggers.last(), Some(&MetricsTrigger::RowingStopped));

        let recoveries: Vec<MetricsSnapshot> = outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Metrics {
                    trigger: MetricsTrigger::RecoveryFinished,
                    snapshot,
                    ..
                } => Some((**snapshot).clone()),
                _ => None,
            })
            .collect();
        let expected = Vo2MaxEstimator::new(&config.user).calculate(&recoveries);
        match outputs.last() {
            Some(SessionOutput::Vo2Max { vo2max }) => assert!((vo2max - expected).abs() < 1e-9),
            other => panic!("expected VO2max last, got {other:?}"),
        }
        assert_eq!(summary.vo2max, Some(expected));
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() {
        let (session, tx) = SessionLoop::new(&concept2(), CancellationToken::new());
        let mut rx = session.subscribe();

        tx.send(EngineInput::Command(SessionCommand::SetIntervals(vec![IntervalSetting::distance(500.0)])))
            .unwrap();
        tx.send(EngineInput::Command(SessionCommand::Stop)).unwrap();
        tx.send(EngineInput::Command(SessionCommand::Reset)).unwrap();
        drop(tx);

        let summary = session.run().await;
        assert_eq!(summary.vo2max, None, "reset clears the estimate");

        let outputs = drain(&mut rx);
        let stopped: Vec<_> = outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Metrics {
                    trigger: MetricsTrigger::RowingStopped,
                    snapshot,
                    ..
                } => Some(snapshot.interval_target_distance),
                _ => None,
            })
            .collect();
        assert_eq!(stopped, vec![Some(500.0)]);
        assert!(outputs.iter().any(|o| matches!(o, SessionOutput::Vo2Max { .. })));
    }

    #[tokio::test]
    async fn test_periodic_updates_carry_heart_rate() {
        let (session, tx) = SessionLoop::new(&RowingConfig::default(), CancellationToken::new());
        let mut rx = session.subscribe();
        tx.send(EngineInput::HeartRate(HeartRateMeasurement {
            heart_rate: 120,
            battery_level: Some(80),
        }))
        .unwrap();

        let handle = tokio::spawn(session.run());
        let mut seen = None;
        while seen.is_none() {
            match rx.recv().await {
                Ok(SessionOutput::Metrics {
                    trigger: MetricsTrigger::WebUpdate | MetricsTrigger::PeripheralUpdate,
                    snapshot,
                    ..
                }) if snapshot.heart_rate.is_some() => seen = Some(snapshot),
                Ok(_) => {}
                Err(e) => panic!("output channel failed: {e}"),
            }
        }
        drop(tx);
        handle.await.unwrap();

        let snapshot = seen.unwrap();
        assert_eq!(snapshot.heart_rate, Some(120));
        assert_eq!(snapshot.heart_rate_battery_level, Some(80));
        assert_eq!(snapshot.session_status, SessionStatus::WaitingForStart);
    }

    #[tokio::test]
    async fn test_cancellation_ends_loop() {
        let cancel = CancellationToken::new();
        let (session, _tx) = SessionLoop::new(&RowingConfig::default(), cancel.clone());
        cancel.cancel();
        let summary = session.run().await;
        assert_eq!(summary, SessionSummary::default());
    }

    #[tokio::test]
    async fn test_forward_impulses_records_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.txt");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut source = ReplaySource::new(vec![0.02, 0.021, 0.022], 0.0);
        let mut recorder = ImpulseRecorder::create(&path).await.unwrap();
        let forwarded = forward_impulses(&mut source, &tx, Some(&mut recorder), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forwarded, 3);
        assert_eq!(rx.recv().await, Some(EngineInput::Impulse(0.02)));

        let replayed = ReplaySource::open(&path, 0.0).await.unwrap();
        assert_eq!(replayed.remaining(), 3);
    }

    #[tokio::test]
    async fn test_forward_stops_when_loop_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut source = ReplaySource::new(vec![0.02; 10], 0.0);
        let forwarded = forward_impulses(&mut source, &tx, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forwarded, 0);
    }
}
