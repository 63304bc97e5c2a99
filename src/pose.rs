//! Tool-center-point pose and axis selection.

use crate::error::{MorobotError, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pose of the TCP (tool center point) in the robot base frame.
///
/// Morobots are planar SCARA arms, so only the rotation about z is ever non-zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpPose {
    /// Position in mm.
    pub position: Vec3,

    /// Rotation around the x, y and z axes in degrees.
    pub orientation: Vec3,
}

impl TcpPose {
    pub fn new(position: Vec3, rot_z: f32) -> Self {
        Self {
            position,
            orientation: Vec3::new(0.0, 0.0, rot_z),
        }
    }

    /// Component of the position along `axis`.
    pub fn position_on(&self, axis: Axis) -> f32 {
        axis.pick(self.position)
    }

    /// Component of the orientation around `axis`.
    pub fn orientation_on(&self, axis: Axis) -> f32 {
        axis.pick(self.orientation)
    }
}

impl fmt::Display for TcpPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x, y, z [mm]: {:.2}, {:.2}, {:.2}; orientation around z-axis [degrees]: {:.2}",
            self.position.x, self.position.y, self.position.z, self.orientation.z
        )
    }
}

/// A Cartesian axis of the base frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn pick(self, v: Vec3) -> f32 {
        v[self.index()]
    }

    /// Unit vector along this axis.
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

impl TryFrom<char> for Axis {
    type Error = MorobotError;

    fn try_from(c: char) -> Result<Self> {
        match c.to_ascii_lowercase() {
            'x' => Ok(Axis::X),
            'y' => Ok(Axis::Y),
            'z' => Ok(Axis::Z),
            other => Err(MorobotError::InvalidAxis(other)),
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = MorobotError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Axis::try_from(c),
            (Some(c), Some(_)) => Err(MorobotError::InvalidAxis(c)),
            (None, _) => Err(MorobotError::InvalidAxis(' ')),
        }
    }
}
