//! Controller configuration.
//!
//! Configs are TOML files. Every section and field is optional; missing values fall
//! back to the defaults below, which match the behavior of the stock firmware.

use std::path::Path;
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::eef::GripperParams;
use crate::error::{MorobotError, Result};
use crate::kinematics::RobotModel;
use crate::servo::{MOTION_POLL, SERVO_MAX_SPEED_RPM, TIMEOUT_DELAY};

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorobotConfig {
    #[serde(default)]
    pub robot: RobotSection,

    #[serde(default)]
    pub motion: MotionSection,

    #[serde(default)]
    pub calibration: CalibrationSection,

    /// Present only when a gripper is mounted.
    #[serde(default)]
    pub gripper: Option<GripperParams>,
}

/// `[robot]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSection {
    pub model: RobotModel,

    /// Speed for position moves without an explicit speed.
    pub speed_rpm: u8,

    /// Block before each multi-joint move until the previous one has finished.
    pub wait_after_each_move: bool,

    /// TCP position relative to the flange of the last axis, in mm.
    pub tcp_offset: Vec3,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            model: RobotModel::default(),
            speed_rpm: 25,
            wait_after_each_move: true,
            tcp_offset: Vec3::ZERO,
        }
    }
}

/// `[motion]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSection {
    /// Give up waiting for a motion after this many milliseconds.
    pub timeout_ms: u64,

    /// Observation window used to decide whether a motor still moves.
    pub motion_poll_ms: u64,

    /// Default spacing of waypoints for linear moves, in mm.
    pub linear_resolution: f32,

    /// Polling interval while following waypoints.
    pub linear_poll_ms: u64,

    /// PWM magnitude used between waypoints of a linear move.
    pub linear_pwm: f32,

    /// Pause after each point of a discontinuous trajectory.
    pub settle_ms: u64,
}

impl Default for MotionSection {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT_DELAY.as_millis() as u64,
            motion_poll_ms: MOTION_POLL.as_millis() as u64,
            linear_resolution: 5.0,
            linear_poll_ms: 10,
            linear_pwm: 8.0,
            settle_ms: 1000,
        }
    }
}

impl MotionSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn motion_poll(&self) -> Duration {
        Duration::from_millis(self.motion_poll_ms)
    }

    pub fn linear_poll(&self) -> Duration {
        Duration::from_millis(self.linear_poll_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// `[calibration]` section, used by linear-axis and gripper calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSection {
    /// Motor current that marks the hard stop.
    pub max_current: f32,

    /// Degrees moved per calibration step.
    pub step_deg: i64,

    /// Speed of calibration steps.
    pub step_rpm: u8,

    /// Time given to each step before the current is sampled.
    pub step_interval_ms: u64,

    /// Abort calibration after this many steps without reaching the stop.
    pub max_steps: u32,
}

impl Default for CalibrationSection {
    fn default() -> Self {
        Self {
            max_current: 25.0,
            step_deg: 2,
            step_rpm: 1,
            step_interval_ms: 400,
            max_steps: 500,
        }
    }
}

impl CalibrationSection {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }
}

impl MorobotConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads config from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MorobotError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Loads config from a path if given, otherwise returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.robot.speed_rpm == 0 || self.robot.speed_rpm > SERVO_MAX_SPEED_RPM {
            return Err(MorobotError::config(format!(
                "robot.speed_rpm must be in 1..={SERVO_MAX_SPEED_RPM}, got {}",
                self.robot.speed_rpm
            )));
        }
        if self.motion.linear_resolution <= 0.0 {
            return Err(MorobotError::config(
                "motion.linear_resolution must be positive",
            ));
        }
        if self.motion.motion_poll_ms == 0 || self.motion.linear_poll_ms == 0 {
            return Err(MorobotError::config("poll intervals must be non-zero"));
        }
        if self.calibration.step_deg <= 0 || self.calibration.max_steps == 0 {
            return Err(MorobotError::config(
                "calibration.step_deg and calibration.max_steps must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = MorobotConfig::from_toml_str("").unwrap();
        assert_eq!(config, MorobotConfig::default());
        assert_eq!(config.robot.speed_rpm, 25);
        assert_eq!(config.motion.timeout(), TIMEOUT_DELAY);
        assert!(config.gripper.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = MorobotConfig::from_toml_str(
            r#"
            [robot]
            model = "rrp"
            tcp_offset = [10.0, 0.0, -5.0]

            [motion]
            linear_resolution = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.robot.model, RobotModel::Rrp);
        assert_eq!(config.robot.tcp_offset, Vec3::new(10.0, 0.0, -5.0));
        assert_eq!(config.robot.speed_rpm, 25);
        assert_eq!(config.motion.linear_resolution, 2.5);
        assert_eq!(config.motion.linear_pwm, 8.0);
    }

    #[test]
    fn rejects_unusable_values() {
        let err = MorobotConfig::from_toml_str("[robot]\nspeed_rpm = 80\n").unwrap_err();
        assert!(matches!(err, MorobotError::Config { .. }));
        let err = MorobotConfig::from_toml_str("[robot]\nmodel = \"delta\"\n").unwrap_err();
        assert!(matches!(err, MorobotError::Toml(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = MorobotConfig::default();
        config.robot.model = RobotModel::Rrp;
        config.gripper = Some(GripperParams::default());
        let text = toml::to_string(&config).unwrap();
        assert_eq!(MorobotConfig::from_toml_str(&text).unwrap(), config);
    }
}
