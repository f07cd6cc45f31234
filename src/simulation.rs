//! Flywheel physics simulator.
//!
//! Integrates `I·dω/dt = τ − k·ω²` with a fixed step and emits the time
//! between consecutive sensor edges, exactly what a flywheel with
//! `num_of_impulses_per_revolution` magnets would report. Used to produce
//! deterministic impulse streams for tests and demos.
//!
//! ## Drive Model
//!
//! A drive applies a half-sine torque `τ(t) = peak·sin(π·t/duration)`; a
//! recovery is free coasting against drag. Optional Gaussian jitter on each
//! reported duration imitates sensor timing noise.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, NormalError};

use crate::config::RowerSettings;

/// Physical constants of the simulated machine.
#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    /// kg·m²
    pub flywheel_inertia: f64,
    /// N·m·s²
    pub drag_factor: f64,
    pub num_of_impulses_per_revolution: u32,
    /// Integration step (s)
    pub time_step: f64,
}

impl Default for SimulatorSettings {
    /// A Concept2 RowErg at a typical damper setting.
    fn default() -> Self {
        Self {
            flywheel_inertia: 0.10138,
            drag_factor: 110e-6,
            num_of_impulses_per_revolution: 6,
            time_step: 1e-5,
        }
    }
}

impl SimulatorSettings {
    /// Simulate the machine described by `settings`.
    pub fn from_rower(settings: &RowerSettings) -> Self {
        Self {
            flywheel_inertia: settings.flywheel_inertia,
            drag_factor: settings.drag_factor_si(),
            num_of_impulses_per_revolution: settings.num_of_impulses_per_revolution.max(1),
            ..Self::default()
        }
    }
}

/// Timing and force of one simulated stroke.
#[derive(Debug, Clone, Copy)]
pub struct StrokeProfile {
    pub drive_duration: f64,
    pub recovery_duration: f64,
    /// Peak torque on the flywheel during the drive (N·m)
    pub peak_torque: f64,
}

impl Default for StrokeProfile {
    /// Roughly 24 strokes per minute at a moderate effort.
    fn default() -> Self {
        Self {
            drive_duration: 0.8,
            recovery_duration: 1.7,
            peak_torque: 6.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlywheelSimulator {
    settings: SimulatorSettings,
    angle_per_impulse: f64,
    angular_velocity: f64,
    angle_since_impulse: f64,
    time_since_impulse: f64,
    impulses: Vec<f64>,
    jitter: Option<(StdRng, Normal<f64>)>,
}

impl FlywheelSimulator {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            angle_per_impulse: 2.0 * std::f64::consts::PI / f64::from(settings.num_of_impulses_per_revolution.max(1)),
            angular_velocity: 0.0,
            angle_since_impulse: 0.0,
            time_since_impulse: 0.0,
            impulses: Vec::new(),
            jitter: None,
            settings,
        }
    }

    /// Scale every reported duration by `1 + N(0, relative_sigma)`, reproducibly.
    pub fn with_jitter(mut self, seed: u64, relative_sigma: f64) -> Result<Self, NormalError> {
        let normal = Normal::new(0.0, relative_sigma)?;
        self.jitter = Some((StdRng::seed_from_u64(seed), normal));
        Ok(self)
    }

    /// Set the flywheel speed directly (rad/s).
    pub fn set_angular_velocity(&mut self, angular_velocity: f64) {
        self.angular_velocity = angular_velocity.max(0.0);
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    /// Let the flywheel spin down for `duration` seconds.
    pub fn coast(&mut self, duration: f64) {
        for _ in 0..self.steps(duration) {
            self.step(0.0);
        }
    }

    /// Apply a half-sine torque pulse.
    pub fn drive(&mut self, duration: f64, peak_torque: f64) {
        let steps = self.steps(duration);
        let h = self.settings.time_step;
        for i in 0..steps {
            let t = (i as f64 + 0.5) * h;
            let torque = peak_torque * (std::f64::consts::PI * t / duration).sin();
            self.step(torque.max(0.0));
        }
    }

    pub fn stroke(&mut self, profile: &StrokeProfile) {
        self.drive(profile.drive_duration, profile.peak_torque);
        self.coast(profile.recovery_duration);
    }

    /// Impulses emitted so far.
    pub fn impulses(&self) -> &[f64] {
        &self.impulses
    }

    /// Take the impulses emitted so far, keeping the flywheel state.
    pub fn drain_impulses(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.impulses)
    }

    pub fn into_impulses(self) -> Vec<f64> {
        self.impulses
    }

    fn steps(&self, duration: f64) -> usize {
        if duration <= 0.0 || !duration.is_finite() {
            return 0;
        }
        (duration / self.settings.time_step).round() as usize
    }

    fn step(&mut self, torque: f64) {
        let h = self.settings.time_step;
        let omega = self.angular_velocity;
        let acceleration =
            (torque - self.settings.drag_factor * omega * omega) / self.settings.flywheel_inertia;
        let next_omega = (omega + acceleration * h).max(0.0);
        let swept = 0.5 * (omega + next_omega) * h;
        self.angular_velocity = next_omega;

        let remaining = self.angle_per_impulse - self.angle_since_impulse;
        if swept > 0.0 && swept >= remaining {
            // Edge crossed inside this step: interpolate its moment
            let fraction = remaining / swept;
            self.emit(self.time_since_impulse + fraction * h);
            self.angle_since_impulse = swept - remaining;
            self.time_since_impulse = (1.0 - fraction) * h;
        } else {
            self.angle_since_impulse += swept;
            self.time_since_impulse += h;
        }
    }

    fn emit(&mut self, dt: f64) {
        let dt = match self.jitter.as_mut() {
            Some((rng, normal)) => dt * (1.0 + normal.sample(rng)),
            None => dt,
        };
        self.impulses.push(dt);
    }
}

/// A complete session: the flywheel is spinning at 100 rad/s, `strokes`
/// strokes follow, then the flywheel coasts long enough to trigger a pause.
pub fn rowing_session(settings: SimulatorSettings, profile: &StrokeProfile, strokes: usize) -> Vec<f64> {
    let mut simulator = FlywheelSimulator::new(settings);
    simulator.set_angular_velocity(100.0);
    simulator.coast(0.5);
    for _ in 0..strokes {
        simulator.stroke(profile);
    }
    simulator.coast(15.0);
    simulator.into_impulses()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coasting_matches_closed_form() {
        let settings = SimulatorSettings::default();
        let (inertia, drag) = (settings.flywheel_inertia, settings.drag_factor);
        let mut simulator = FlywheelSimulator::new(settings);
        simulator.set_angular_velocity(100.0);
        simulator.coast(2.0);

        // 1/ω grows linearly: 1/ω(t) = 1/ω0 + k·t/I
        let expected = 1.0 / (1.0 / 100.0 + drag * 2.0 / inertia);
        assert!(
            (simulator.angular_velocity() - expected).abs() < 1e-3,
            "ω {} vs {}",
            simulator.angular_velocity(),
            expected
        );

        let impulses = simulator.impulses();
        assert!(impulses.len() > 150, "{} impulses", impulses.len());
        assert!(
            impulses.windows(2).all(|w| w[1] > w[0]),
            "coasting impulses must lengthen"
        );
        let first = impulses[0];
        assert!((first - (std::f64::consts::PI / 3.0) / 100.0).abs() < 1e-4, "first {first}");
    }

    #[test]
    fn test_drive_accelerates() {
        let mut simulator = FlywheelSimulator::new(SimulatorSettings::default());
        simulator.set_angular_velocity(80.0);
        simulator.drive(0.8, 6.0);
        assert!(simulator.angular_velocity() > 95.0, "ω {}", simulator.angular_velocity());
    }

    #[test]
    fn test_jitter_is_reproducible() {
        let run = |seed| {
            let mut simulator = FlywheelSimulator::new(SimulatorSettings::default())
                .with_jitter(seed, 0.01)
                .unwrap();
            simulator.set_angular_velocity(100.0);
            simulator.coast(0.5);
            simulator.into_impulses()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
        assert!(FlywheelSimulator::new(SimulatorSettings::default()).with_jitter(1, -1.0).is_err());
    }

    #[test]
    fn test_stationary_flywheel_is_silent() {
        let mut simulator = FlywheelSimulator::new(SimulatorSettings::default());
        simulator.coast(1.0);
        assert!(simulator.impulses().is_empty());
    }
}
