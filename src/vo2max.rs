//! VO2max estimation from a finished session.
//!
//! Two independent estimates are combined:
//!
//! - **Extrapolated**: heart rate vs. power is regressed over bracketed
//!   samples and projected to the user's maximum heart rate; the projected
//!   power maps to VO2max (<https://sportcoaching.co.nz/how-does-garmin-calculate-vo2-max/>)
//! - **Interpolated**: the session pace is carried to a 2000 m pace with
//!   Paul's Law and run through the Concept2 2k tables
//!   (<https://www.concept2.com/indoor-rowers/training/calculators/vo2max-calculator>)
//!
//! Only values within [10, 60] ml/kg/min are credible. Both credible: their
//! mean. One credible: that one. Neither: 0.

use tracing::debug;

use crate::config::defaults::REFERENCE_RACE_DISTANCE_M;
use crate::config::{Sex, UserSettings};
use crate::series::BucketedLinearSeries;
use crate::types::MetricsSnapshot;

/// Warm-up (s of moving time) left out of the heart-rate regression
const WARM_UP_OFFSET_SECS: f64 = 90.0;
const MINIMUM_VALID_BRACKETS: usize = 5;
const CREDIBLE_RANGE: std::ops::RangeInclusive<f64> = 10.0..=60.0;

#[derive(Debug, Clone)]
pub struct Vo2MaxEstimator {
    user: UserSettings,
}

impl Vo2MaxEstimator {
    pub fn new(user: &UserSettings) -> Self {
        Self { user: user.clone() }
    }

    /// Estimate VO2max (ml/kg/min) from the session's snapshots, oldest first.
    pub fn calculate(&self, metrics: &[MetricsSnapshot]) -> f64 {
        let (Some(first), Some(last)) = (metrics.first(), metrics.last()) else {
            return 0.0;
        };

        let heart_rate_available = first.heart_rate.is_some()
            && last.heart_rate.is_some_and(|hr| f64::from(hr) >= self.user.resting_hr);
        let extrapolated = if heart_rate_available { self.extrapolated(metrics) } else { 0.0 };
        let interpolated = self.interpolated(last.total_moving_time, last.total_linear_distance);

        match (CREDIBLE_RANGE.contains(&extrapolated), CREDIBLE_RANGE.contains(&interpolated)) {
            (true, true) => {
                debug!(extrapolated, interpolated, "VO2max: two credible estimates");
                (extrapolated + interpolated) / 2.0
            }
            (_, true) => interpolated,
            (true, false) => extrapolated,
            (false, false) => {
                debug!(extrapolated, interpolated, "VO2max: no credible estimate");
                0.0
            }
        }
    }

    /// VO2max from heart rate projected to its maximum.
    pub fn extrapolated(&self, metrics: &[MetricsSnapshot]) -> f64 {
        let user = &self.user;
        let mut series = BucketedLinearSeries::new();

        for snapshot in metrics.iter().skip_while(|m| m.total_moving_time < WARM_UP_OFFSET_SECS) {
            let Some(heart_rate) = snapshot.heart_rate.map(f64::from) else {
                continue;
            };
            let power = snapshot.cycle_power;
            if (user.resting_hr..=user.max_hr).contains(&heart_rate) && (user.min_power..=user.max_power).contains(&power)
            {
                series.push(heart_rate, power);
            }
        }
        series.flush();

        if series.number_of_samples() < MINIMUM_VALID_BRACKETS {
            debug!(brackets = series.number_of_samples(), "VO2max: too few heart rate brackets");
            return 0.0;
        }

        let projected_power = series.project_x(user.max_hr);
        let power = if projected_power <= user.max_power && projected_power >= series.max_encountered_y() {
            projected_power
        } else {
            debug!(projected_power, "VO2max: projected power not credible, using highest observed");
            series.max_encountered_y()
        };
        (14.72 * power + 250.39) / user.weight_kg
    }

    /// VO2max from the 2k pace equivalent of `distance` m in `time` s.
    pub fn interpolated(&self, time: f64, distance: f64) -> f64 {
        let user = &self.user;
        let two_k_pace = interpolate_pace(time, distance, REFERENCE_RACE_DISTANCE_M);
        let minutes = 4.0 * two_k_pace / 60.0;
        debug!(two_k_pace, "VO2max: interpolated 2k pace");

        let y = match (user.highly_trained, user.sex) {
            (true, Sex::Male) if user.weight_kg > 75.0 => 15.7 - 1.5 * minutes,
            (true, Sex::Male) => 15.1 - 1.5 * minutes,
            (true, Sex::Female) if user.weight_kg > 61.36 => 14.9 - 1.5 * minutes,
            (true, Sex::Female) => 14.6 - 1.5 * minutes,
            (false, Sex::Male) => 10.7 - 0.9 * minutes,
            (false, Sex::Female) => 10.26 - 0.93 * minutes,
        };
        y * 1000.0 / user.weight_kg
    }
}

/// Pace (s/500 m) at `target_distance` given a result over another distance,
/// by Paul's Law: +5 s/500 m for every doubling of distance. 0 if undefined.
pub fn interpolate_pace(time: f64, distance: f64, target_distance: f64) -> f64 {
    if time > 0.0 && distance > 0.0 && target_distance > 0.0 {
        500.0 * time / distance + 5.0 * (target_distance / distance).log2()
    } else {
        0.0
    }
}
