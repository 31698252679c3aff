// src/config.rs - Planner limit configuration
use serde::{Deserialize, Serialize};

use crate::error::MotionError;
use crate::motion::moveq::{MoveParams, DEFAULT_MAX_QSIZE};

/// Kinematic limits the planner derives per-move parameters from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,

    #[serde(default = "default_max_accel")]
    pub max_accel: f64,

    /// Softer acceleration driving the look-ahead's smoothed pass; limits
    /// how aggressively cruise peaks are committed.
    #[serde(default = "default_smoothed_accel")]
    pub smoothed_accel: f64,

    /// Ramp profile order: 2, 4 or 6.
    #[serde(default = "default_accel_order")]
    pub accel_order: u8,

    #[serde(default = "default_max_jerk")]
    pub max_jerk: f64,

    /// Minimum ramp duration; floors the effective acceleration of short
    /// jerk-limited ramps.
    #[serde(default = "default_min_jerk_limit_time")]
    pub min_jerk_limit_time: f64,

    #[serde(default)]
    pub accel_comp: f64,

    /// Queue depth at which lazy planning forces partial flushes.
    #[serde(default = "default_lookahead_bound")]
    pub lookahead_bound: usize,

    #[serde(default)]
    pub shaper: ShaperConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,
}

/// Input shaper defaults, applied per axis when enabled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShaperConfig {
    #[serde(default)]
    pub shaper_type: Option<String>,

    #[serde(default = "default_damped_period")]
    pub damped_period: f64,

    #[serde(default = "default_damping_ratio")]
    pub damping_ratio: f64,
}

/// Axis smoothing and pressure-advance defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SmoothingConfig {
    #[serde(default)]
    pub smooth_time_x: f64,

    #[serde(default)]
    pub smooth_time_y: f64,

    #[serde(default)]
    pub pressure_advance: f64,

    #[serde(default)]
    pub pressure_advance_smooth_time: f64,
}

fn default_max_velocity() -> f64 {
    300.0
}
fn default_max_accel() -> f64 {
    3000.0
}
fn default_smoothed_accel() -> f64 {
    3000.0
}
fn default_accel_order() -> u8 {
    2
}
fn default_max_jerk() -> f64 {
    100000.0
}
fn default_min_jerk_limit_time() -> f64 {
    0.02
}
fn default_lookahead_bound() -> usize {
    DEFAULT_MAX_QSIZE
}
fn default_damped_period() -> f64 {
    0.025
}
fn default_damping_ratio() -> f64 {
    0.1
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            max_velocity: default_max_velocity(),
            max_accel: default_max_accel(),
            smoothed_accel: default_smoothed_accel(),
            accel_order: default_accel_order(),
            max_jerk: default_max_jerk(),
            min_jerk_limit_time: default_min_jerk_limit_time(),
            accel_comp: 0.0,
            lookahead_bound: default_lookahead_bound(),
            shaper: ShaperConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl MotionConfig {
    pub fn from_toml_str(raw: &str) -> Result<MotionConfig, MotionError> {
        toml::from_str(raw).map_err(|e| MotionError::BadMoveParams {
            reason: format!("config parse error: {}", e),
        })
    }

    /// Per-move parameters for a move of length `move_d` entering through a
    /// junction capped at `junction_max_v2`, cruising at the requested
    /// velocity (clamped to the configured maximum).
    pub fn move_params(&self, move_d: f64, junction_max_v2: f64, velocity: f64) -> MoveParams {
        MoveParams {
            move_d,
            junction_max_v2,
            velocity: velocity.min(self.max_velocity),
            accel_order: self.accel_order,
            accel: self.max_accel,
            smoothed_accel: self.smoothed_accel.min(self.max_accel),
            jerk: self.max_jerk,
            min_jerk_limit_time: self.min_jerk_limit_time,
            accel_comp: self.accel_comp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MotionConfig::default();
        assert_eq!(config.max_velocity, 300.0);
        assert_eq!(config.max_accel, 3000.0);
        assert_eq!(config.accel_order, 2);
        assert_eq!(config.lookahead_bound, DEFAULT_MAX_QSIZE);
    }

    #[test]
    fn test_parse_toml_config() {
        let raw = r#"
max_velocity = 250.0
max_accel = 4500.0
smoothed_accel = 2000.0
accel_order = 6
max_jerk = 120000.0
min_jerk_limit_time = 0.015

[shaper]
shaper_type = "zv"
damped_period = 0.04
damping_ratio = 0.1

[smoothing]
smooth_time_x = 0.02
smooth_time_y = 0.02
pressure_advance = 0.045
pressure_advance_smooth_time = 0.04
        "#;
        let config = MotionConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.max_velocity, 250.0);
        assert_eq!(config.accel_order, 6);
        assert_eq!(config.shaper.shaper_type.as_deref(), Some("zv"));
        assert_eq!(config.smoothing.smooth_time_x, 0.02);

        let p = config.move_params(10.0, 400.0, 300.0);
        assert_eq!(p.velocity, 250.0);
        assert_eq!(p.accel, 4500.0);
        assert_eq!(p.smoothed_accel, 2000.0);
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(MotionConfig::from_toml_str("max_velocity = \"fast\"").is_err());
    }
}
