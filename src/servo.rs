//! The smart-servo bus seam and the clock used for motion polling.
//!
//! Servos on the bus are addressed from 1; the rest of the crate uses zero-based
//! [`ServoId`](crate::blueprint::ServoId)s and adds one at this boundary.

use crate::error::Result;
use std::time::{Duration, Instant};

/// Maximum number of servos one robot drives.
pub const NUM_MAX_SERVOS: usize = 10;

/// Fastest speed the smart servos accept for position moves.
pub const SERVO_MAX_SPEED_RPM: u8 = 50;

/// Give up waiting for a motion after this long.
pub const TIMEOUT_DELAY: Duration = Duration::from_millis(15_000);

/// Window used to decide whether a motor is still moving.
pub const MOTION_POLL: Duration = Duration::from_millis(150);

/// Brake state of a smart servo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Brake {
    /// Motor holds its position.
    Braked,
    /// Motor shaft can be turned by hand.
    Loose,
}

/// Commands understood by a daisy-chain of smart servos.
///
/// `id` is the 1-based bus address. Angles are degrees of shaft rotation relative to
/// the servo's zero position, speeds are rpm.
pub trait ServoBus {
    /// Let every servo on the chain pick up its address.
    fn assign_dev_ids(&mut self) -> Result<()>;

    /// Declare the current shaft position to be 0 degrees.
    fn set_zero(&mut self, id: u8) -> Result<()>;

    /// Drive to `angle` using the servo's own homing routine.
    fn set_init_angle(&mut self, id: u8, angle: i64, speed: u8) -> Result<()>;

    fn set_brake(&mut self, id: u8, brake: Brake) -> Result<()>;

    /// Absolute position move.
    fn move_to(&mut self, id: u8, angle: i64, speed: u8) -> Result<()>;

    /// Relative position move.
    fn move_by(&mut self, id: u8, delta: i64, speed: u8) -> Result<()>;

    /// Open-loop velocity command; the sign selects the direction, 0 stops.
    fn set_pwm_move(&mut self, id: u8, pwm: f32) -> Result<()>;

    fn angle(&mut self, id: u8) -> Result<i64>;
    fn speed(&mut self, id: u8) -> Result<f32>;
    fn temperature(&mut self, id: u8) -> Result<f32>;
    fn voltage(&mut self, id: u8) -> Result<f32>;
    fn current(&mut self, id: u8) -> Result<f32>;
}

impl<B: ServoBus + ?Sized> ServoBus for Box<B> {
    fn assign_dev_ids(&mut self) -> Result<()> {
        (**self).assign_dev_ids()
    }
    fn set_zero(&mut self, id: u8) -> Result<()> {
        (**self).set_zero(id)
    }
    fn set_init_angle(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        (**self).set_init_angle(id, angle, speed)
    }
    fn set_brake(&mut self, id: u8, brake: Brake) -> Result<()> {
        (**self).set_brake(id, brake)
    }
    fn move_to(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        (**self).move_to(id, angle, speed)
    }
    fn move_by(&mut self, id: u8, delta: i64, speed: u8) -> Result<()> {
        (**self).move_by(id, delta, speed)
    }
    fn set_pwm_move(&mut self, id: u8, pwm: f32) -> Result<()> {
        (**self).set_pwm_move(id, pwm)
    }
    fn angle(&mut self, id: u8) -> Result<i64> {
        (**self).angle(id)
    }
    fn speed(&mut self, id: u8) -> Result<f32> {
        (**self).speed(id)
    }
    fn temperature(&mut self, id: u8) -> Result<f32> {
        (**self).temperature(id)
    }
    fn voltage(&mut self, id: u8) -> Result<f32> {
        (**self).voltage(id)
    }
    fn current(&mut self, id: u8) -> Result<f32> {
        (**self).current(id)
    }
}

/// Monotonic time source used for motion polling and timeouts.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
