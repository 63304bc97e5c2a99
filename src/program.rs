//! Motion scripts: a list of robot operations loaded from TOML and run in order.
//!
//! ```toml
//! name = "pick"
//!
//! [[ops]]
//! op = "home"
//!
//! [[ops]]
//! op = "move_to_pose"
//! goal = [150.0, 40.0, 0.0]
//!
//! [[ops]]
//! op = "gripper_close"
//! ```

use std::path::Path;
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::eef::Gripper;
use crate::error::{MorobotError, Result};
use crate::kinematics::Kinematics;
use crate::pose::Axis;
use crate::robot::Morobot;
use crate::servo::ServoBus;
use crate::trajectory::PolynomOrder;

/// One step of a motion script.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MotionOp {
    /// Move all joints to zero and wait.
    Home,
    /// Declare the current joint positions as zero.
    Zero,
    Speed {
        rpm: u8,
    },
    Brakes {
        engaged: bool,
    },
    MoveToAngles {
        angles: Vec<i64>,
        #[serde(default)]
        speed_rpm: Option<u8>,
    },
    MoveAngles {
        angles: Vec<i64>,
        #[serde(default)]
        speed_rpm: Option<u8>,
    },
    MoveToPose {
        goal: Vec3,
    },
    MoveXyz {
        offset: Vec3,
    },
    MoveInDirection {
        axis: Axis,
        distance: f32,
    },
    Linear {
        goal: Vec3,
        #[serde(default)]
        continuous: bool,
        /// Falls back to `motion.linear_resolution`.
        #[serde(default)]
        resolution: Option<f32>,
        #[serde(default)]
        trajectory: bool,
    },
    Trajectory {
        points: Vec<Vec3>,
        #[serde(default)]
        continuous: bool,
        #[serde(default)]
        order: PolynomOrder,
    },
    /// Block until all motors stand still.
    Wait,
    Sleep {
        ms: u64,
    },
    GripperOpen,
    GripperClose,
    GripperWidth {
        mm: f32,
    },
}

impl MotionOp {
    fn needs_gripper(&self) -> bool {
        matches!(
            self,
            MotionOp::GripperOpen | MotionOp::GripperClose | MotionOp::GripperWidth { .. }
        )
    }
}

/// A named sequence of [`MotionOp`]s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ops: Vec<MotionOp>,
}

impl Program {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MorobotError::io(path, e))?;
        Self::from_toml_str(&content)
    }
}

/// Executes programs against a robot and an optional gripper.
pub struct ProgramRunner<'a, K, B> {
    robot: &'a mut Morobot<K, B>,
    gripper: Option<Gripper>,
}

impl<'a, K: Kinematics, B: ServoBus> ProgramRunner<'a, K, B> {
    pub fn new(robot: &'a mut Morobot<K, B>) -> Self {
        Self {
            robot,
            gripper: None,
        }
    }

    /// Mounts a gripper; its TCP offset is handed to the robot.
    pub fn with_gripper(mut self, gripper: Gripper) -> Self {
        gripper.attach(self.robot);
        self.gripper = Some(gripper);
        self
    }

    pub fn gripper(&self) -> Option<&Gripper> {
        self.gripper.as_ref()
    }

    /// Runs all ops in order and stops at the first error.
    ///
    /// Returns the number of ops executed.
    pub fn run(&mut self, program: &Program) -> Result<usize> {
        let name = program.name.as_deref().unwrap_or("unnamed");
        info!(program = name, ops = program.ops.len(), "running program");

        if self.gripper.is_none()
            && let Some(step) = program.ops.iter().position(MotionOp::needs_gripper)
        {
            return Err(MorobotError::gripper(format!(
                "step {step} needs a gripper but none is mounted"
            )));
        }

        for (step, op) in program.ops.iter().enumerate() {
            if let Err(e) = self.execute(op) {
                error!(program = name, step, ?op, "program aborted: {e}");
                return Err(e);
            }
        }
        Ok(program.ops.len())
    }

    /// Executes a single op.
    pub fn execute(&mut self, op: &MotionOp) -> Result<()> {
        let robot = &mut *self.robot;
        match op {
            MotionOp::Home => robot.move_home(),
            MotionOp::Zero => robot.set_zero(),
            MotionOp::Speed { rpm } => {
                robot.set_speed_rpm(*rpm);
                Ok(())
            }
            MotionOp::Brakes { engaged: true } => robot.set_brakes(),
            MotionOp::Brakes { engaged: false } => robot.release_brakes(),
            MotionOp::MoveToAngles { angles, speed_rpm } => {
                let rpm = speed_rpm.unwrap_or(robot.speed_rpm());
                robot.move_to_angles_with(angles, rpm)
            }
            MotionOp::MoveAngles { angles, speed_rpm } => {
                let rpm = speed_rpm.unwrap_or(robot.speed_rpm());
                robot.move_angles_with(angles, rpm)
            }
            MotionOp::MoveToPose { goal } => robot.move_to_pose(*goal).map(drop),
            MotionOp::MoveXyz { offset } => robot.move_xyz(*offset).map(drop),
            MotionOp::MoveInDirection { axis, distance } => {
                robot.move_in_direction(*axis, *distance).map(drop)
            }
            MotionOp::Linear {
                goal,
                continuous,
                resolution,
                trajectory,
            } => {
                let resolution =
                    resolution.unwrap_or(robot.config().motion.linear_resolution);
                robot.move_linear(*goal, *continuous, resolution, *trajectory)
            }
            MotionOp::Trajectory {
                points,
                continuous,
                order,
            } => robot.trajectory_planning(points, *continuous, *order),
            MotionOp::Wait => robot.wait_until_ready(),
            MotionOp::Sleep { ms } => {
                robot.clock().sleep(Duration::from_millis(*ms));
                Ok(())
            }
            MotionOp::GripperOpen | MotionOp::GripperClose | MotionOp::GripperWidth { .. } => {
                let Some(gripper) = self.gripper.as_mut() else {
                    return Err(MorobotError::gripper("no gripper mounted"));
                };
                match op {
                    MotionOp::GripperOpen => gripper.open(robot),
                    MotionOp::GripperClose => gripper.close(robot),
                    MotionOp::GripperWidth { mm } => {
                        let speed = gripper.params().speed_opening;
                        gripper.move_to_width(robot, *mm, speed)
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}
