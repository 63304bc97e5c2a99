//! Error types for morobot.
//!
//! Library code returns [`MorobotError`]; the `morobot-sim` binary wraps it with `anyhow`.

use std::path::PathBuf;

use crate::blueprint::ServoId;

/// Top-level error type for all robot operations.
#[derive(Debug, thiserror::Error)]
pub enum MorobotError {
    /// The model declares no joints at all.
    #[error("robot model has no motors")]
    NoServos,

    /// The model declares more joints than a single bus chain supports.
    #[error("too many motors: {requested} requested, maximum is {max}")]
    TooManyServos { requested: usize, max: usize },

    /// A servo index outside `0..num_smart_servos` was used.
    #[error("servo {servo} does not exist (robot has {count} servos)")]
    InvalidServo { servo: ServoId, count: usize },

    /// A commanded angle lies outside the joint limits.
    #[error("angle for motor {servo} is invalid! ({angle} degrees, allowed {min}..={max})")]
    JointLimit {
        servo: ServoId,
        angle: f32,
        min: f32,
        max: f32,
    },

    /// Inverse kinematics has no real solution for this joint.
    #[error("angle for motor {servo} is NAN, position cannot be reached")]
    NoSolution { servo: ServoId },

    /// The angle slice handed to a multi-joint move has the wrong length.
    #[error("expected {expected} joint values, got {actual}")]
    AngleCount { expected: usize, actual: usize },

    /// Waiting for the robot (or a tool) to settle took too long.
    #[error("timeout occurred while waiting for {what} to finish movement")]
    Timeout { what: String },

    /// The servo bus reported a failure.
    #[error("servo bus error on id {id}: {message}")]
    Bus { id: u8, message: String },

    /// An axis character other than `x`, `y` or `z`.
    #[error("invalid axis '{0}'")]
    InvalidAxis(char),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML decoding error for configs and programs.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A calibration routine could not find its reference.
    #[error("calibration error: {message}")]
    Calibration { message: String },

    /// Gripper parameters or commands are inconsistent.
    #[error("gripper error: {message}")]
    Gripper { message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MorobotError>;

impl MorobotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a bus error for a bus address.
    pub fn bus(id: u8, msg: impl Into<String>) -> Self {
        Self::Bus {
            id,
            message: msg.into(),
        }
    }

    /// Create a timeout error naming what was being waited for.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }

    /// Create a calibration error.
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration {
            message: msg.into(),
        }
    }

    /// Create a gripper error.
    pub fn gripper(msg: impl Into<String>) -> Self {
        Self::Gripper {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that mean "this goal is not reachable" rather than a hardware fault.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::JointLimit { .. } | Self::NoSolution { .. })
    }
}
