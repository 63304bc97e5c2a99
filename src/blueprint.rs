use serde::{Deserialize, Serialize};

/// Zero-based index of a joint servo.
/// The bus address of a servo is always `ServoId + 1`.
pub type ServoId = u8;

/// The static, serializable description of a morobot model.
///
/// Holds the serial chain of joints (base first) together with the link
/// lengths the kinematic model is built from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmBlueprint {
    /// Short model identifier, e.g. `"morobot_s_rrr"`.
    pub robot_type: String,

    /// All joints of the arm, ordered from the base to the flange.
    pub joints: Vec<JointDefinition>,

    /// Link lengths in mm, ordered from the base to the flange.
    pub links: Vec<LinkDefinition>,

    /// Servo degrees per mm of travel for prismatic joints.
    pub gear_ratio: Option<f32>,
}

impl ArmBlueprint {
    pub fn new(robot_type: impl Into<String>) -> Self {
        Self {
            robot_type: robot_type.into(),
            ..Self::default()
        }
    }

    pub fn add_joint(&mut self, joint_type: JointType, limits: JointLimit) -> ServoId {
        let servo = self.joints.len() as ServoId;
        self.joints.push(JointDefinition {
            servo,
            joint_type,
            limits,
        });
        servo
    }

    pub fn add_link(&mut self, name: impl Into<String>, length: f32) {
        self.links.push(LinkDefinition {
            name: name.into(),
            length,
        });
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Limits of one joint, if it exists.
    pub fn limits(&self, servo: ServoId) -> Option<JointLimit> {
        self.joints.get(servo as usize).map(|j| j.limits)
    }

    /// Length of a named link.
    pub fn link(&self, name: &str) -> Option<f32> {
        self.links.iter().find(|l| l.name == name).map(|l| l.length)
    }
}

/// One actuated joint of the arm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointDefinition {
    /// Position of the joint in the chain (bus address minus one).
    pub servo: ServoId,

    /// The type of mechanical connection.
    pub joint_type: JointType,

    /// Allowed servo shaft angles. Leaving them may harm the robot's mechanics.
    pub limits: JointLimit,
}

/// Types of actuated joints on a morobot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointType {
    /// Rotates around the z-axis (shoulder, elbow, wrist).
    Revolute,
    /// Slides along the z-axis through a rack (linear axis).
    Prismatic,
}

/// Limits for a joint's motion, in degrees of servo shaft rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f32,
    pub max: f32,
}

impl JointLimit {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Selects one side of the limit pair.
    pub fn get(&self, bound: Bound) -> f32 {
        match bound {
            Bound::Min => self.min,
            Bound::Max => self.max,
        }
    }

    /// NaN is never contained.
    pub fn contains(&self, angle: f32) -> bool {
        angle >= self.min && angle <= self.max
    }
}

/// A rigid link between two joints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkDefinition {
    pub name: String,
    /// Length in mm.
    pub length: f32,
}

/// Selects the lower or upper side of a limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    pub(crate) fn index(self) -> usize {
        match self {
            Bound::Min => 0,
            Bound::Max => 1,
        }
    }
}
