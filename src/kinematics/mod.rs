//! Model-specific geometry: joint limits, inverse and forward kinematics.
//!
//! Every morobot model implements [`Kinematics`]. The [`Morobot`](crate::Morobot)
//! controller is generic over it and never looks at link lengths itself.

mod scara_rrp;
mod scara_rrr;

pub use scara_rrp::ScaraRrp;
pub use scara_rrr::ScaraRrr;

use crate::blueprint::{ArmBlueprint, ServoId};
use crate::error::{MorobotError, Result};
use crate::pose::TcpPose;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Geometry of one robot model.
///
/// Goals handed to [`inverse`](Self::inverse) are "task coordinates": three numbers
/// whose meaning depends on the model (see [`task_coordinates`](Self::task_coordinates)).
pub trait Kinematics {
    /// Static description of the arm, including joint limits.
    fn blueprint(&self) -> &ArmBlueprint;

    fn robot_type(&self) -> &str {
        &self.blueprint().robot_type
    }

    fn num_joints(&self) -> usize {
        self.blueprint().num_joints()
    }

    /// Position of the TCP relative to the center of the flange of the last axis.
    fn tcp_offset(&self) -> Vec3;

    /// Stores the TCP offset and recomputes the effective geometry of the last axis.
    fn set_tcp_offset(&mut self, offset: Vec3);

    /// Checks that `angle` is a real number inside the joint's limits.
    fn check_angle(&self, servo: ServoId, angle: f32) -> Result<()> {
        if angle.is_nan() {
            warn!(servo, "angle for motor is NAN");
            return Err(MorobotError::NoSolution { servo });
        }
        let limits = self
            .blueprint()
            .limits(servo)
            .ok_or(MorobotError::InvalidServo {
                servo,
                count: self.num_joints(),
            })?;
        if !limits.contains(angle) {
            warn!(servo, angle, "angle for motor is invalid");
            return Err(MorobotError::JointLimit {
                servo,
                angle,
                min: limits.min,
                max: limits.max,
            });
        }
        Ok(())
    }

    /// Checks every angle; the first failing joint wins.
    fn check_angles(&self, angles: &[f32]) -> Result<()> {
        if angles.len() != self.num_joints() {
            return Err(MorobotError::AngleCount {
                expected: self.num_joints(),
                actual: angles.len(),
            });
        }
        angles
            .iter()
            .enumerate()
            .try_for_each(|(servo, &angle)| self.check_angle(servo as ServoId, angle))
    }

    /// Solves the inverse kinematics for a goal in task coordinates.
    /// Returns valid joint angles in degrees, one per joint.
    fn inverse(&self, goal: Vec3) -> Result<Vec<f32>>;

    /// Solves the forward kinematics for joint angles in degrees.
    fn forward(&self, angles: &[f32]) -> TcpPose;

    /// Expresses a pose in the coordinates [`inverse`](Self::inverse) takes.
    fn task_coordinates(&self, pose: &TcpPose) -> Vec3;

    /// Task-space bounding box, `[min, max]` per axis.
    fn axis_limits(&self) -> [[f32; 2]; 3];
}

impl<K: Kinematics + ?Sized> Kinematics for Box<K> {
    fn blueprint(&self) -> &ArmBlueprint {
        (**self).blueprint()
    }
    fn tcp_offset(&self) -> Vec3 {
        (**self).tcp_offset()
    }
    fn set_tcp_offset(&mut self, offset: Vec3) {
        (**self).set_tcp_offset(offset)
    }
    fn check_angle(&self, servo: ServoId, angle: f32) -> Result<()> {
        (**self).check_angle(servo, angle)
    }
    fn inverse(&self, goal: Vec3) -> Result<Vec<f32>> {
        (**self).inverse(goal)
    }
    fn forward(&self, angles: &[f32]) -> TcpPose {
        (**self).forward(angles)
    }
    fn task_coordinates(&self, pose: &TcpPose) -> Vec3 {
        (**self).task_coordinates(pose)
    }
    fn axis_limits(&self) -> [[f32; 2]; 3] {
        (**self).axis_limits()
    }
}

/// The morobot models this crate knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotModel {
    /// morobot-s (rrr): three revolute joints.
    #[default]
    Rrr,
    /// morobot-s (rrp): two revolute joints and a linear z-axis.
    Rrp,
}

impl RobotModel {
    pub fn build(self) -> Box<dyn Kinematics + Send> {
        match self {
            RobotModel::Rrr => Box::new(ScaraRrr::new()),
            RobotModel::Rrp => Box::new(ScaraRrp::new()),
        }
    }
}

impl std::str::FromStr for RobotModel {
    type Err = MorobotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rrr" | "morobot_s_rrr" => Ok(RobotModel::Rrr),
            "rrp" | "morobot_s_rrp" => Ok(RobotModel::Rrp),
            other => Err(MorobotError::config(format!("unknown robot model '{other}'"))),
        }
    }
}
