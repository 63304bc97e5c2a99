//! # morobot
//!
//! Controller library for morobot SCARA arms built from chained smart servos.
//!
//! A [`Morobot`] combines a [`Kinematics`] model (rrr or rrp) with a [`ServoBus`]. It
//! tracks the TCP pose, validates every goal against the joint limits before anything
//! moves, and drives the joints either with position commands or open-loop PWM along
//! straight lines and polynomial trajectories. Grippers and binary tools live in
//! [`eef`]; [`sim`] provides an in-memory bus and clock for running all of it
//! without hardware.

pub mod blueprint;
pub mod config;
pub mod eef;
pub mod error;
pub mod kinematics;
pub mod pose;
pub mod program;
pub mod robot;
pub mod servo;
pub mod sim;
pub mod trajectory;

pub use blueprint::*;
pub use config::MorobotConfig;
pub use eef::{BinaryEef, Gripper, GripperParams, OutputPin};
pub use error::{MorobotError, Result};
pub use kinematics::{Kinematics, RobotModel, ScaraRrp, ScaraRrr};
pub use pose::{Axis, TcpPose};
pub use program::{MotionOp, Program, ProgramRunner};
pub use robot::Morobot;
pub use servo::{Brake, Clock, ServoBus, SystemClock};
pub use sim::{SimClock, SimulatedServoBus};
pub use trajectory::PolynomOrder;
