//! In-memory smart-servo chain and virtual clock.
//!
//! [`SimulatedServoBus`] integrates servo motion lazily against a shared [`SimClock`]:
//! nothing moves until the clock advances, and the clock only advances when somebody
//! sleeps on it. Tests and the `morobot-sim` binary run full motion sequences this way
//! without real hardware or wall-clock delays.

use crate::error::{MorobotError, Result};
use crate::servo::{Brake, Clock, ServoBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Degrees per second per PWM unit for open-loop moves.
pub const PWM_GAIN: f32 = 4.6109;

/// Current reported by a motor that holds still.
pub const IDLE_CURRENT: f32 = 5.0;

/// Current reported by a motor that is turning freely.
pub const MOVING_CURRENT: f32 = 15.0;

/// Current reported by a motor pushing against a hard stop.
pub const STALL_CURRENT: f32 = 80.0;

/// Shared virtual time. Clones observe and advance the same instant.
#[derive(Clone, Debug, Default)]
pub struct SimClock {
    nanos: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// A command as it arrived on the simulated bus.
#[derive(Clone, Debug, PartialEq)]
pub enum BusCommand {
    AssignDevIds,
    SetZero { id: u8 },
    SetInitAngle { id: u8, angle: i64, speed: u8 },
    SetBrake { id: u8, brake: Brake },
    MoveTo { id: u8, angle: i64, speed: u8 },
    MoveBy { id: u8, delta: i64, speed: u8 },
    SetPwmMove { id: u8, pwm: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Motion {
    Idle,
    Position { target: f32, deg_per_sec: f32 },
    Pwm(f32),
}

#[derive(Clone, Debug)]
struct SimServo {
    /// Absolute shaft angle.
    raw: f32,
    /// Raw angle that reads as 0.
    zero: f32,
    brake: Brake,
    motion: Motion,
    stalled: bool,
    hard_stops: Option<(f32, f32)>,
    temperature: f32,
    voltage: f32,
    connected: bool,
}

impl Default for SimServo {
    fn default() -> Self {
        Self {
            raw: 0.0,
            zero: 0.0,
            brake: Brake::Braked,
            motion: Motion::Idle,
            stalled: false,
            hard_stops: None,
            temperature: 28.0,
            voltage: 12.0,
            connected: true,
        }
    }
}

impl SimServo {
    fn advance(&mut self, dt: f32) {
        let velocity = match self.motion {
            Motion::Idle => return,
            Motion::Pwm(pwm) => pwm * PWM_GAIN,
            Motion::Position {
                target,
                deg_per_sec,
            } => {
                let diff = target - self.raw;
                let step = deg_per_sec * dt;
                if diff.abs() <= step {
                    self.raw = target;
                    self.motion = Motion::Idle;
                    self.stalled = false;
                    self.clamp_to_stops();
                    return;
                }
                deg_per_sec * diff.signum()
            }
        };
        self.raw += velocity * dt;
        self.stalled = false;
        self.clamp_to_stops();
    }

    fn clamp_to_stops(&mut self) {
        if let Some((lo, hi)) = self.hard_stops {
            if self.raw < lo {
                self.raw = lo;
                self.stalled = true;
            } else if self.raw > hi {
                self.raw = hi;
                self.stalled = true;
            }
        }
    }

    fn reading(&self) -> i64 {
        (self.raw - self.zero).round() as i64
    }

    fn is_moving(&self) -> bool {
        !self.stalled && self.motion != Motion::Idle
    }

    fn current(&self) -> f32 {
        if self.stalled {
            STALL_CURRENT
        } else if self.is_moving() {
            MOVING_CURRENT
        } else {
            IDLE_CURRENT
        }
    }

    fn rpm(&self) -> f32 {
        if !self.is_moving() {
            return 0.0;
        }
        match self.motion {
            Motion::Idle => 0.0,
            Motion::Pwm(pwm) => pwm * PWM_GAIN / 6.0,
            Motion::Position { deg_per_sec, .. } => deg_per_sec / 6.0,
        }
    }
}

/// A simulated daisy-chain of smart servos.
#[derive(Debug)]
pub struct SimulatedServoBus {
    clock: SimClock,
    last_sync: Duration,
    servos: Vec<SimServo>,
    log: Vec<BusCommand>,
}

impl SimulatedServoBus {
    /// A chain of `count` servos, all at angle 0.
    pub fn new(count: usize, clock: SimClock) -> Self {
        let last_sync = clock.now();
        Self {
            clock,
            last_sync,
            servos: vec![SimServo::default(); count],
            log: Vec::new(),
        }
    }

    /// Places mechanical end stops on a servo (raw degrees).
    pub fn with_hard_stops(mut self, id: u8, min: f32, max: f32) -> Self {
        if let Some(servo) = self.servos.get_mut((id as usize).wrapping_sub(1)) {
            servo.hard_stops = Some((min, max));
        }
        self
    }

    /// Starts a servo at a raw shaft angle other than 0.
    pub fn with_raw_angle(mut self, id: u8, raw: f32) -> Self {
        if let Some(servo) = self.servos.get_mut((id as usize).wrapping_sub(1)) {
            servo.raw = raw;
        }
        self
    }

    /// Makes every further command to `id` fail.
    pub fn disconnect(&mut self, id: u8) {
        if let Some(servo) = self.servos.get_mut((id as usize).wrapping_sub(1)) {
            servo.connected = false;
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn commands(&self) -> &[BusCommand] {
        &self.log
    }

    pub fn clear_commands(&mut self) {
        self.log.clear();
    }

    pub fn brake_state(&self, id: u8) -> Option<Brake> {
        self.servos.get((id as usize).wrapping_sub(1)).map(|s| s.brake)
    }

    /// Absolute shaft angle including sub-degree progress.
    pub fn raw_angle(&mut self, id: u8) -> Option<f32> {
        self.sync();
        self.servos.get((id as usize).wrapping_sub(1)).map(|s| s.raw)
    }

    fn sync(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last_sync).as_secs_f32();
        self.last_sync = now;
        if dt > 0.0 {
            for servo in &mut self.servos {
                servo.advance(dt);
            }
        }
    }

    fn servo(&mut self, id: u8) -> Result<&mut SimServo> {
        self.sync();
        let count = self.servos.len();
        match self.servos.get_mut((id as usize).wrapping_sub(1)) {
            Some(servo) if servo.connected => Ok(servo),
            Some(_) => Err(MorobotError::bus(id, "no response")),
            None => Err(MorobotError::bus(
                id,
                format!("no servo with this address (chain has {count})"),
            )),
        }
    }

    fn start_position_move(&mut self, id: u8, raw_target: f32, speed: u8) -> Result<()> {
        let servo = self.servo(id)?;
        servo.brake = Brake::Braked;
        servo.motion = Motion::Position {
            target: raw_target,
            deg_per_sec: f32::from(speed.max(1)) * 6.0,
        };
        Ok(())
    }
}

impl ServoBus for SimulatedServoBus {
    fn assign_dev_ids(&mut self) -> Result<()> {
        self.sync();
        self.log.push(BusCommand::AssignDevIds);
        Ok(())
    }

    fn set_zero(&mut self, id: u8) -> Result<()> {
        self.log.push(BusCommand::SetZero { id });
        let servo = self.servo(id)?;
        servo.zero = servo.raw;
        Ok(())
    }

    fn set_init_angle(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        self.log.push(BusCommand::SetInitAngle { id, angle, speed });
        let zero = self.servo(id)?.zero;
        self.start_position_move(id, zero + angle as f32, speed)
    }

    fn set_brake(&mut self, id: u8, brake: Brake) -> Result<()> {
        self.log.push(BusCommand::SetBrake { id, brake });
        let servo = self.servo(id)?;
        servo.brake = brake;
        if brake == Brake::Loose {
            servo.motion = Motion::Idle;
        }
        Ok(())
    }

    fn move_to(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        self.log.push(BusCommand::MoveTo { id, angle, speed });
        let zero = self.servo(id)?.zero;
        self.start_position_move(id, zero + angle as f32, speed)
    }

    fn move_by(&mut self, id: u8, delta: i64, speed: u8) -> Result<()> {
        self.log.push(BusCommand::MoveBy { id, delta, speed });
        let raw = self.servo(id)?.raw;
        self.start_position_move(id, raw + delta as f32, speed)
    }

    fn set_pwm_move(&mut self, id: u8, pwm: f32) -> Result<()> {
        self.log.push(BusCommand::SetPwmMove { id, pwm });
        let servo = self.servo(id)?;
        servo.brake = Brake::Braked;
        servo.motion = if pwm == 0.0 {
            Motion::Idle
        } else {
            Motion::Pwm(pwm)
        };
        Ok(())
    }

    fn angle(&mut self, id: u8) -> Result<i64> {
        Ok(self.servo(id)?.reading())
    }

    fn speed(&mut self, id: u8) -> Result<f32> {
        Ok(self.servo(id)?.rpm())
    }

    fn temperature(&mut self, id: u8) -> Result<f32> {
        Ok(self.servo(id)?.temperature)
    }

    fn voltage(&mut self, id: u8) -> Result<f32> {
        Ok(self.servo(id)?.voltage)
    }

    fn current(&mut self, id: u8) -> Result<f32> {
        Ok(self.servo(id)?.current())
    }
}
