//! End-effectors: a smart-servo gripper and binary on/off tools.
//!
//! The gripper servo is chained behind the arm's joints on the same bus, so its
//! methods borrow the [`Morobot`] for the duration of each call.

use crate::error::{MorobotError, Result};
use crate::kinematics::Kinematics;
use crate::robot::Morobot;
use crate::servo::{Clock, MOTION_POLL, SERVO_MAX_SPEED_RPM, ServoBus, TIMEOUT_DELAY};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Give up waiting for the gripper after this long.
pub const TIMEOUT_DELAY_GRIPPER: Duration = TIMEOUT_DELAY;

/// Polling windows without progress after which a gripper move counts as blocked.
const QUIET_WINDOWS: u32 = 2;

/// Degrees per step while closing to a force limit.
const FORCE_STEP_DEG: i64 = 2;

/// Time given to each force step before the current is sampled.
const FORCE_STEP_INTERVAL: Duration = Duration::from_millis(50);

/// Mechanical parameters of a gripper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperParams {
    /// Servo angle of the closed gripper.
    pub deg_closed: f32,
    /// Servo angle of the fully opened gripper.
    pub deg_open: f32,
    /// Never drive further in closing direction than this.
    pub deg_close_limit: f32,
    /// Never drive further in opening direction than this.
    pub deg_open_limit: f32,
    /// Servo degrees per mm of jaw opening (parallel grippers).
    pub gear_ratio: f32,
    pub speed_opening: u8,
    pub speed_closing: u8,
    /// TCP of the gripper relative to the flange of the last robot axis.
    pub tcp_offset: Vec3,
}

impl Default for GripperParams {
    fn default() -> Self {
        Self {
            deg_closed: 0.0,
            deg_open: 90.0,
            deg_close_limit: -10.0,
            deg_open_limit: 100.0,
            gear_ratio: 3.0,
            speed_opening: 25,
            speed_closing: 25,
            tcp_offset: Vec3::new(38.0, 0.0, -46.0),
        }
    }
}

impl GripperParams {
    fn limits(&self) -> (f32, f32) {
        let lo = self.deg_close_limit.min(self.deg_open_limit);
        let hi = self.deg_close_limit.max(self.deg_open_limit);
        (lo, hi)
    }

    /// +1 if opening turns the servo in positive direction, -1 otherwise.
    fn opening_direction(&self) -> f32 {
        if self.deg_open >= self.deg_closed {
            1.0
        } else {
            -1.0
        }
    }

    fn validate(&self) -> Result<()> {
        let (lo, hi) = self.limits();
        for (name, angle) in [("closed", self.deg_closed), ("open", self.deg_open)] {
            if angle < lo || angle > hi {
                return Err(MorobotError::gripper(format!(
                    "{name} position {angle} lies outside the limits {lo}..={hi}"
                )));
            }
        }
        if self.deg_open == self.deg_closed {
            return Err(MorobotError::gripper("open and closed positions are equal"));
        }
        if self.gear_ratio <= 0.0 {
            return Err(MorobotError::gripper("gear ratio must be positive"));
        }
        Ok(())
    }
}

/// A gripper driven by a smart servo chained behind the arm.
#[derive(Debug, Clone)]
pub struct Gripper {
    params: GripperParams,
    is_closed: bool,
    is_open: bool,
}

impl Gripper {
    pub fn new(params: GripperParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            is_closed: false,
            is_open: false,
        })
    }

    pub fn params(&self) -> &GripperParams {
        &self.params
    }

    /// Stores the gripper's TCP and hands it to the robot for its kinematics.
    pub fn attach<K: Kinematics, B: ServoBus>(&self, robot: &mut Morobot<K, B>) {
        robot.set_tcp_offset(self.params.tcp_offset);
    }

    pub fn set_tcp_offset<K: Kinematics, B: ServoBus>(
        &mut self,
        robot: &mut Morobot<K, B>,
        offset: Vec3,
    ) {
        self.params.tcp_offset = offset;
        self.attach(robot);
    }

    pub fn set_params(
        &mut self,
        deg_closed: f32,
        deg_open: f32,
        deg_close_limit: f32,
        deg_open_limit: f32,
    ) -> Result<()> {
        let params = GripperParams {
            deg_closed,
            deg_open,
            deg_close_limit,
            deg_open_limit,
            ..self.params.clone()
        };
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn set_gear_ratio(&mut self, gear_ratio: f32) -> Result<()> {
        if gear_ratio <= 0.0 {
            return Err(MorobotError::gripper("gear ratio must be positive"));
        }
        self.params.gear_ratio = gear_ratio;
        Ok(())
    }

    pub fn set_speed(&mut self, speed: u8) {
        self.set_speeds(speed, speed);
    }

    pub fn set_speeds(&mut self, opening: u8, closing: u8) {
        self.params.speed_opening = opening.max(1);
        self.params.speed_closing = closing.max(1);
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open<K: Kinematics, B: ServoBus>(&mut self, robot: &mut Morobot<K, B>) -> Result<()> {
        self.move_to_angle(robot, self.params.deg_open, self.params.speed_opening)
    }

    pub fn close<K: Kinematics, B: ServoBus>(&mut self, robot: &mut Morobot<K, B>) -> Result<()> {
        self.move_to_angle(robot, self.params.deg_closed, self.params.speed_closing)
    }

    /// Moves the gripper servo to `angle` and waits until it stops.
    pub fn move_to_angle<K: Kinematics, B: ServoBus>(
        &mut self,
        robot: &mut Morobot<K, B>,
        angle: f32,
        speed: u8,
    ) -> Result<()> {
        let (lo, hi) = self.params.limits();
        if angle.is_nan() || angle < lo || angle > hi {
            warn!(angle, "gripper angle is invalid");
            return Err(MorobotError::gripper(format!(
                "angle {angle} lies outside the limits {lo}..={hi}"
            )));
        }
        let id = robot.tool_bus_id();
        let (bus, clock) = robot.tool_access();
        let target = angle.round() as i64;
        bus.move_to(id, target, speed.clamp(1, SERVO_MAX_SPEED_RPM))?;
        wait_until_finished(bus, clock, id, target)?;

        self.is_closed = angle == self.params.deg_closed;
        self.is_open = angle == self.params.deg_open;
        Ok(())
    }

    /// Opens the jaws to `width` mm.
    pub fn move_to_width<K: Kinematics, B: ServoBus>(
        &mut self,
        robot: &mut Morobot<K, B>,
        width: f32,
        speed: u8,
    ) -> Result<()> {
        let angle =
            self.params.deg_closed + self.params.opening_direction() * width * self.params.gear_ratio;
        self.move_to_angle(robot, angle, speed)
    }

    /// Closes until the motor current exceeds `max_current`.
    ///
    /// Returns `true` if an object was gripped, `false` if the jaws closed fully.
    pub fn close_to_force<K: Kinematics, B: ServoBus>(
        &mut self,
        robot: &mut Morobot<K, B>,
        max_current: f32,
    ) -> Result<bool> {
        let id = robot.tool_bus_id();
        let step = -(self.params.opening_direction() as i64) * FORCE_STEP_DEG;
        let closed = self.params.deg_closed.round() as i64;
        let speed = self.params.speed_closing;
        let (bus, clock) = robot.tool_access();

        let start = clock.now();
        loop {
            let angle = bus.angle(id)?;
            let remaining = (closed - angle) * step.signum();
            if remaining <= 0 {
                debug!("gripper closed without resistance");
                self.is_closed = true;
                self.is_open = false;
                return Ok(false);
            }
            bus.move_by(id, step.signum() * remaining.min(FORCE_STEP_DEG), speed)?;
            clock.sleep(FORCE_STEP_INTERVAL);
            if bus.current(id)? > max_current {
                // Hold the object where it is.
                let held = bus.angle(id)?;
                bus.move_to(id, held, speed)?;
                info!(angle = held, "gripper closed to force");
                self.is_closed = true;
                self.is_open = false;
                return Ok(true);
            }
            if clock.now().saturating_sub(start) > TIMEOUT_DELAY_GRIPPER {
                return Err(MorobotError::timeout("gripper"));
            }
        }
    }

    /// Closes slowly until the jaws touch, then declares that position as closed (0°).
    ///
    /// The open position and limits keep their distance to the closed position.
    pub fn auto_calibrate<K: Kinematics, B: ServoBus>(
        &mut self,
        robot: &mut Morobot<K, B>,
    ) -> Result<()> {
        let calibration = robot.config().calibration.clone();
        let id = robot.tool_bus_id();
        let step = -(self.params.opening_direction() as i64) * calibration.step_deg;
        let (bus, clock) = robot.tool_access();

        for _ in 0..calibration.max_steps {
            bus.move_by(id, step, calibration.step_rpm)?;
            clock.sleep(calibration.step_interval());
            if bus.current(id)? > calibration.max_current {
                bus.set_zero(id)?;
                let shift = self.params.deg_closed;
                self.params.deg_closed = 0.0;
                self.params.deg_open -= shift;
                self.params.deg_close_limit -= shift;
                self.params.deg_open_limit -= shift;
                self.is_closed = true;
                self.is_open = false;
                info!("gripper calibrated");
                return Ok(());
            }
        }
        Err(MorobotError::calibration(format!(
            "gripper did not close after {} steps",
            calibration.max_steps
        )))
    }

    pub fn current_opening_angle<K: Kinematics, B: ServoBus>(
        &self,
        robot: &mut Morobot<K, B>,
    ) -> Result<f32> {
        let id = robot.tool_bus_id();
        let (bus, _) = robot.tool_access();
        Ok(bus.angle(id)? as f32)
    }

    /// Jaw opening in mm.
    pub fn current_opening_width<K: Kinematics, B: ServoBus>(
        &self,
        robot: &mut Morobot<K, B>,
    ) -> Result<f32> {
        let angle = self.current_opening_angle(robot)?;
        Ok((angle - self.params.deg_closed) * self.params.opening_direction()
            / self.params.gear_ratio)
    }
}

/// Waits until the servo reports `target` or stops short of it, e.g. on an object.
fn wait_until_finished<B: ServoBus>(
    bus: &mut B,
    clock: &dyn Clock,
    id: u8,
    target: i64,
) -> Result<()> {
    let start = clock.now();
    let mut last = bus.angle(id)?;
    let mut quiet = 0;
    while last != target {
        clock.sleep(MOTION_POLL);
        let angle = bus.angle(id)?;
        if angle == last {
            quiet += 1;
            if quiet >= QUIET_WINDOWS {
                debug!(id, angle, target, "gripper stopped short of target");
                return Ok(());
            }
        } else {
            quiet = 0;
            last = angle;
        }
        if clock.now().saturating_sub(start) > TIMEOUT_DELAY_GRIPPER {
            return Err(MorobotError::timeout("gripper"));
        }
    }
    Ok(())
}

/// A digital output driving a tool such as a vacuum pump or magnet.
pub trait OutputPin {
    fn set_high(&mut self) -> Result<()>;
    fn set_low(&mut self) -> Result<()>;
}

/// An end-effector with two states, switched through one output pin.
#[derive(Debug)]
pub struct BinaryEef<P> {
    pin: P,
    active: bool,
}

impl<P: OutputPin> BinaryEef<P> {
    /// Takes the pin and drives it low.
    pub fn new(mut pin: P) -> Result<Self> {
        pin.set_low()?;
        Ok(Self { pin, active: false })
    }

    pub fn activate(&mut self) -> Result<()> {
        self.pin.set_high()?;
        self.active = true;
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        self.pin.set_low()?;
        self.active = false;
        Ok(())
    }

    pub fn is_activated(&self) -> bool {
        self.active
    }

    pub fn is_deactivated(&self) -> bool {
        !self.active
    }

    pub fn into_pin(self) -> P {
        self.pin
    }
}
