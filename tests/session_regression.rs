//! Session Regression Tests
//!
//! Drives the full engine (flywheel → rower → session) with impulse streams
//! from the physics simulator, where the true stroke count, drag factor and
//! effort are known, and checks what comes out the other end.

use rowmetrics::config::RowingConfig;
use rowmetrics::engine::RowingStatistics;
use rowmetrics::simulation::{rowing_session, FlywheelSimulator, SimulatorSettings, StrokeProfile};
use rowmetrics::types::{
    EngineEvent, IntervalSetting, MetricsSnapshot, MetricsTrigger, SessionStatus, StrokeRecord, StrokeState,
};

fn concept2() -> RowingConfig {
    RowingConfig::from_toml_str("[rower]\nprofile = \"concept2_rowerg\"\n").unwrap()
}

fn feed(statistics: &mut RowingStatistics, impulses: &[f64]) -> Vec<EngineEvent> {
    impulses
        .iter()
        .flat_map(|&dt| statistics.handle_rotation_impulse(dt))
        .collect()
}

fn strokes(events: &[EngineEvent]) -> Vec<&StrokeRecord> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StrokeFinished(stroke) => Some(stroke),
            _ => None,
        })
        .collect()
}

fn snapshots(events: &[EngineEvent], trigger: MetricsTrigger) -> Vec<&MetricsSnapshot> {
    events
        .iter()
        .filter(|e| e.trigger() == Some(trigger))
        .filter_map(EngineEvent::snapshot)
        .collect()
}

fn triggers(events: &[EngineEvent]) -> Vec<MetricsTrigger> {
    events.iter().filter_map(EngineEvent::trigger).collect()
}

/// Flywheel already spinning, as after a few warm-up pulls.
fn spinning_simulator() -> FlywheelSimulator {
    let mut simulator = FlywheelSimulator::new(SimulatorSettings::default());
    simulator.set_angular_velocity(100.0);
    simulator.coast(0.5);
    simulator
}

fn ten_stroke_session() -> (RowingStatistics, Vec<EngineEvent>) {
    let impulses = rowing_session(SimulatorSettings::default(), &StrokeProfile::default(), 10);
    let mut statistics = RowingStatistics::new(&concept2());
    let events = feed(&mut statistics, &impulses);
    (statistics, events)
}

// ============================================================================
// Full session
// ============================================================================

#[test]
fn ten_strokes_produce_ten_records() {
    let (statistics, events) = ten_stroke_session();
    let records = strokes(&events);

    assert_eq!(records.len(), 10, "one record per stroke");
    assert_eq!(statistics.rower().total_number_of_strokes(), 10);
    let numbers: Vec<u32> = records.iter().map(|r| r.stroke_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());

    // The final recovery is closed by the pause, not by another drive
    assert!(records[..9].iter().all(|r| !r.ended_in_pause));
    assert!(records[9].ended_in_pause);

    assert_eq!(statistics.session_status(), SessionStatus::Paused);
    let triggers = triggers(&events);
    assert_eq!(triggers.iter().filter(|&&t| t == MetricsTrigger::RowingPaused).count(), 1);
    assert_eq!(triggers.iter().filter(|&&t| t == MetricsTrigger::DriveFinished).count(), 10);
}

#[test]
fn cycle_distances_add_up_to_total() {
    let (statistics, events) = ten_stroke_session();
    let total = statistics.rower().total_linear_distance_since_start();
    let summed: f64 = strokes(&events).iter().map(|r| r.cycle_distance).sum();

    assert!((summed - total).abs() < 0.01, "strokes {summed:.3} m vs total {total:.3} m");
    assert!((100.0..116.0).contains(&total), "total {total:.2} m");

    let paused = snapshots(&events, MetricsTrigger::RowingPaused);
    assert_eq!(paused.len(), 1);
    assert!((paused[0].total_linear_distance - total).abs() < 1e-9);
}

#[test]
fn stroke_records_match_the_simulated_rower() {
    let (_, events) = ten_stroke_session();
    let records = strokes(&events);

    for record in &records[..9] {
        assert!((0.6..0.9).contains(&record.drive_duration), "drive {}", record.drive_duration);
        assert!((0.9..1.3).contains(&record.drive_length), "drive length {}", record.drive_length);
        assert!(
            (200.0..400.0).contains(&record.drive_average_handle_force),
            "average force {}",
            record.drive_average_handle_force
        );
        assert!(record.drive_peak_handle_force > record.drive_average_handle_force);
        assert!((2.3..2.7).contains(&record.cycle_duration), "cycle {}", record.cycle_duration);
        assert!((110.0..145.0).contains(&record.cycle_power), "power {}", record.cycle_power);
        // Simulated at 110
        assert!((100.0..120.0).contains(&record.drag_factor), "drag {}", record.drag_factor);
    }

    // Stroke 10 ran into a long coast: its cycle is too long to be credible
    assert!(records[9].cycle_duration > 6.0);
}

#[test]
fn recovery_snapshots_carry_smoothed_metrics() {
    let (_, events) = ten_stroke_session();
    let recoveries: Vec<_> = snapshots(&events, MetricsTrigger::RecoveryFinished)
        .into_iter()
        .filter(|s| s.total_number_of_strokes >= 1)
        .collect();
    assert_eq!(recoveries.len(), 9, "strokes 1-9 end with the next drive");

    for snapshot in &recoveries {
        assert_eq!(snapshot.session_status, SessionStatus::Rowing);
        assert_eq!(snapshot.stroke_state, StrokeState::Drive);
        assert!((80.0..200.0).contains(&snapshot.cycle_power), "power {}", snapshot.cycle_power);
        assert!((20.0..28.0).contains(&snapshot.cycle_stroke_rate), "rate {}", snapshot.cycle_stroke_rate);
        assert!(snapshot.cycle_pace.is_some_and(|pace| pace > 60.0 && pace < 300.0));
        assert!(snapshot.drive_duration.is_some());
        assert!(snapshot.stroke_work > 0.0);
    }

    let calories: Vec<f64> = recoveries.iter().map(|s| s.total_calories).collect();
    assert!(calories.windows(2).all(|w| w[1] > w[0]), "calories must grow: {calories:?}");
    let last = calories.last().copied().unwrap_or(0.0);
    assert!((2.0..10.0).contains(&last), "total calories {last}");
}

#[test]
fn snapshots_carry_the_trimmed_curve_of_the_last_drive() {
    let (_, events) = ten_stroke_session();
    let threshold = concept2().rower.minimum_force_before_stroke;

    let drives = snapshots(&events, MetricsTrigger::DriveFinished);
    let recoveries: Vec<_> = snapshots(&events, MetricsTrigger::RecoveryFinished)
        .into_iter()
        .filter(|s| s.total_number_of_strokes >= 1)
        .collect();
    assert_eq!(drives.len(), 10);
    assert_eq!(recoveries.len(), 9);

    for drive in &drives {
        let curve = &drive.drive_handle_force_curve;
        assert!(curve.len() > 1, "stroke {}: {} samples", drive.total_number_of_strokes, curve.len());
        assert!(curve[0] > threshold, "leading sample {} not trimmed", curve[0]);
        assert!(curve[curve.len() - 1] > threshold, "trailing sample {} not trimmed", curve[curve.len() - 1]);
        assert!(drive.drive_handle_power_curve.first().is_some_and(|p| *p > 0.0));
        assert!(!drive.drive_handle_velocity_curve.is_empty());
    }

    // The next drive has already started when its recovery closes; the
    // snapshot still shows the whole curve of the drive before it
    for recovery in &recoveries {
        let drive = drives
            .iter()
            .find(|d| d.total_number_of_strokes == recovery.total_number_of_strokes)
            .unwrap();
        assert_eq!(recovery.drive_handle_force_curve, drive.drive_handle_force_curve);
        assert_eq!(recovery.drive_handle_velocity_curve, drive.drive_handle_velocity_curve);
        assert_eq!(recovery.drive_handle_power_curve, drive.drive_handle_power_curve);
    }
}

#[test]
fn snapshot_after_pause_is_zeroed() {
    let (statistics, _) = ten_stroke_session();
    let snapshot = statistics.snapshot();
    assert_eq!(snapshot.session_status, SessionStatus::Paused);
    assert_eq!(snapshot.cycle_power, 0.0);
    assert_eq!(snapshot.cycle_pace, None);
    assert_eq!(snapshot.drive_duration, None);
    assert_eq!(snapshot.total_number_of_strokes, 10);
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn commanded_pause_holds_the_rower_until_resumed() {
    let profile = StrokeProfile::default();
    let mut simulator = spinning_simulator();
    let mut statistics = RowingStatistics::new(&concept2());

    for _ in 0..5 {
        simulator.stroke(&profile);
    }
    feed(&mut statistics, &simulator.drain_impulses());
    assert_eq!(statistics.rower().total_number_of_strokes(), 5);
    assert_eq!(statistics.rower().stroke_state(), StrokeState::Recovery);
    let distance = statistics.rower().total_linear_distance_since_start();
    assert!((distance - 44.126).abs() < 0.5, "distance after 5 strokes {distance:.3}");

    let events = statistics.pause();
    assert_eq!(triggers(&events), vec![MetricsTrigger::RowingPaused]);
    assert!((events[0].snapshot().map_or(0.0, |s| s.total_linear_distance) - distance).abs() < 1e-9);
    assert_eq!(statistics.session_status(), SessionStatus::Paused);

    // Rowing on while paused counts for nothing
    for _ in 0..2 {
        simulator.stroke(&profile);
    }
    let events = feed(&mut statistics, &simulator.drain_impulses());
    assert!(events.is_empty(), "{events:?}");
    assert_eq!(statistics.rower().total_number_of_strokes(), 5);
    assert_eq!(statistics.rower().total_linear_distance_since_start(), distance);

    assert!(statistics.resume().is_empty());
    for _ in 0..3 {
        simulator.stroke(&profile);
    }
    let events = feed(&mut statistics, &simulator.drain_impulses());
    assert_eq!(statistics.session_status(), SessionStatus::Rowing);
    assert_eq!(statistics.rower().total_number_of_strokes(), 8);
    assert!(statistics.rower().total_linear_distance_since_start() > distance + 15.0);

    let records = strokes(&events);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| (110.0..145.0).contains(&r.cycle_power)));
}

#[test]
fn distance_interval_stops_the_session() {
    let impulses = rowing_session(SimulatorSettings::default(), &StrokeProfile::default(), 10);
    let mut statistics = RowingStatistics::new(&concept2());
    assert!(statistics.set_interval_parameters(vec![IntervalSetting::distance(30.0)]).is_empty());

    let events = feed(&mut statistics, &impulses);
    let triggers = triggers(&events);
    let n = triggers.len();
    assert!(n >= 2);
    assert_eq!(
        &triggers[n - 2..],
        &[MetricsTrigger::IntervalTargetReached, MetricsTrigger::RowingStopped]
    );
    assert!(matches!(events.last(), Some(EngineEvent::Metrics { .. })), "nothing after the stop");

    let stopped = snapshots(&events, MetricsTrigger::RowingStopped);
    let distance = stopped[0].total_linear_distance;
    assert!((30.0..32.0).contains(&distance), "stopped at {distance:.2} m");
    assert_eq!(statistics.session_status(), SessionStatus::Stopped);
    assert!(statistics.rower().total_number_of_strokes() <= 4);
}

#[test]
fn workout_moves_from_distance_to_time_interval() {
    let impulses = rowing_session(SimulatorSettings::default(), &StrokeProfile::default(), 10);
    let mut statistics = RowingStatistics::new(&concept2());
    statistics.set_interval_parameters(vec![IntervalSetting::distance(20.0), IntervalSetting::time(10.0)]);

    let events = feed(&mut statistics, &impulses);
    let reached = snapshots(&events, MetricsTrigger::IntervalTargetReached);
    assert_eq!(reached.len(), 2);
    assert_eq!(reached[0].interval_number, 0);
    assert_eq!(reached[1].interval_number, 1);

    let second: Vec<_> = snapshots(&events, MetricsTrigger::RecoveryFinished)
        .into_iter()
        .filter(|s| s.interval_number == 1)
        .collect();
    assert!(!second.is_empty());
    assert!(second.iter().all(|s| s.interval_target_time.is_some_and(|t| (t - 10.0).abs() < 1e-9)));

    let stopped = snapshots(&events, MetricsTrigger::RowingStopped);
    assert_eq!(stopped.len(), 1);
    assert!(
        (10.0..10.5).contains(&stopped[0].interval_moving_time),
        "time interval ran {:.2}s",
        stopped[0].interval_moving_time
    );
}

#[test]
fn reset_starts_a_fresh_session() {
    let (mut statistics, _) = ten_stroke_session();
    let events = statistics.reset();
    assert_eq!(triggers(&events), vec![MetricsTrigger::RowingStopped]);

    assert_eq!(statistics.session_status(), SessionStatus::WaitingForStart);
    let snapshot = statistics.snapshot();
    assert_eq!(snapshot.total_number_of_strokes, 0);
    assert_eq!(snapshot.total_linear_distance, 0.0);

    // And rows again
    let impulses = rowing_session(SimulatorSettings::default(), &StrokeProfile::default(), 3);
    let events = feed(&mut statistics, &impulses);
    assert_eq!(strokes(&events).len(), 3);
}

// ============================================================================
// Robustness
// ============================================================================

#[test]
fn sensor_jitter_does_not_create_phantom_strokes() {
    let profile = StrokeProfile::default();
    for seed in 1..=3 {
        let mut simulator = FlywheelSimulator::new(SimulatorSettings::default())
            .with_jitter(seed, 0.002)
            .unwrap();
        simulator.set_angular_velocity(100.0);
        simulator.coast(0.5);
        for _ in 0..10 {
            simulator.stroke(&profile);
        }
        simulator.coast(15.0);

        let mut statistics = RowingStatistics::new(&concept2());
        let events = feed(&mut statistics, &simulator.into_impulses());
        assert_eq!(strokes(&events).len(), 10, "seed {seed}");
    }
}

#[test]
fn garbage_impulses_are_ignored() {
    let mut statistics = RowingStatistics::new(&concept2());
    let events = feed(&mut statistics, &[f64::NAN, -0.01, 0.0, f64::INFINITY, 1e9, 1e-9]);
    assert!(events.is_empty(), "{events:?}");
    assert_eq!(statistics.session_status(), SessionStatus::WaitingForStart);
    assert_eq!(statistics.rower().total_linear_distance_since_start(), 0.0);
}
