//! The morobot controller.
//!
//! [`Morobot`] ties a kinematic model to a servo bus. It tracks whether the joints
//! are still moving, caches the TCP pose until a motion invalidates it, and offers
//! joint-space, Cartesian, linear and polynomial-trajectory moves.

use crate::blueprint::{Bound, ServoId};
use crate::config::MorobotConfig;
use crate::error::{MorobotError, Result};
use crate::kinematics::{Kinematics, ScaraRrp};
use crate::pose::{Axis, TcpPose};
use crate::servo::{Brake, Clock, NUM_MAX_SERVOS, SERVO_MAX_SPEED_RPM, ServoBus, SystemClock};
use crate::trajectory::{
    PolynomOrder, TRAJECTORY_SLOTS, calc_intermediate_velocity, calc_polynom_fifth_order,
    calc_polynom_third_order, linear_waypoints, synchronized_segment_time,
};
use glam::Vec3;
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Speed used by [`Morobot::move_home`].
const HOME_SPEED_RPM: u8 = 15;

/// Settling time after the bus assigned its addresses.
const ASSIGN_DELAY: Duration = Duration::from_millis(50);

/// A continuous linear move advances once the leading joint is this close to its waypoint.
const WAYPOINT_TOLERANCE_DEG: i64 = 1;

/// Controller for one morobot arm.
pub struct Morobot<K, B> {
    kinematics: K,
    bus: B,
    clock: Box<dyn Clock>,
    config: MorobotConfig,
    speed_rpm: u8,
    wait_after_each_move: bool,
    angle_reached: Vec<bool>,
    pose: TcpPose,
    pose_is_valid: bool,
}

impl<K: Kinematics, B: ServoBus> Morobot<K, B> {
    /// Creates a controller for the model `kinematics` talking to `bus`.
    ///
    /// Nothing is sent to the bus until [`begin`](Self::begin) is called.
    pub fn new(kinematics: K, bus: B) -> Result<Self> {
        let count = kinematics.num_joints();
        if count == 0 {
            error!("robot model has no motors");
            return Err(MorobotError::NoServos);
        }
        if count > NUM_MAX_SERVOS {
            error!(count, "too many motors, maximum number of motors: {NUM_MAX_SERVOS}");
            return Err(MorobotError::TooManyServos {
                requested: count,
                max: NUM_MAX_SERVOS,
            });
        }
        let config = MorobotConfig::default();
        Ok(Self {
            kinematics,
            bus,
            clock: Box::new(SystemClock::new()),
            speed_rpm: config.robot.speed_rpm,
            wait_after_each_move: config.robot.wait_after_each_move,
            config,
            angle_reached: vec![true; count],
            pose: TcpPose::default(),
            pose_is_valid: false,
        })
    }

    /// Replaces the wall clock, e.g. with a [`SimClock`](crate::sim::SimClock).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Applies motion, calibration and robot settings from a config.
    pub fn with_config(mut self, config: MorobotConfig) -> Self {
        self.speed_rpm = config.robot.speed_rpm.clamp(1, SERVO_MAX_SPEED_RPM);
        self.wait_after_each_move = config.robot.wait_after_each_move;
        self.config = config;
        self
    }

    /// Connects to the motors: assigns bus addresses, applies the TCP offset and speed
    /// from the config and reads the initial pose.
    pub fn begin(&mut self) -> Result<()> {
        self.bus.assign_dev_ids()?;
        self.clock.sleep(ASSIGN_DELAY);

        self.set_tcp_offset(self.config.robot.tcp_offset);
        self.set_speed_rpm(self.config.robot.speed_rpm);
        self.refresh_pose()?;

        info!(
            robot_type = self.robot_type(),
            servos = self.num_smart_servos(),
            "morobot initialized, connection to motors established"
        );
        Ok(())
    }

    // --- Accessors ---

    pub fn kinematics(&self) -> &K {
        &self.kinematics
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Direct bus access. Commands sent this way bypass limit checks and pose tracking.
    pub fn bus_mut(&mut self) -> &mut B {
        self.pose_is_valid = false;
        &mut self.bus
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &MorobotConfig {
        &self.config
    }

    pub fn robot_type(&self) -> &str {
        self.kinematics.robot_type()
    }

    pub fn num_smart_servos(&self) -> usize {
        self.angle_reached.len()
    }

    pub fn speed_rpm(&self) -> u8 {
        self.speed_rpm
    }

    /// Whether the cached TCP pose reflects the current joint angles.
    pub fn pose_is_valid(&self) -> bool {
        self.pose_is_valid
    }

    /// Bus address of the first device chained behind the arm's joints.
    pub fn tool_bus_id(&self) -> u8 {
        self.num_smart_servos() as u8 + 1
    }

    /// Bus and clock for end-effectors. Tool motions do not move the TCP.
    pub(crate) fn tool_access(&mut self) -> (&mut B, &dyn Clock) {
        (&mut self.bus, self.clock.as_ref())
    }

    fn bus_id(&self, servo: ServoId) -> Result<u8> {
        if (servo as usize) < self.num_smart_servos() {
            Ok(servo + 1)
        } else {
            Err(MorobotError::InvalidServo {
                servo,
                count: self.num_smart_servos(),
            })
        }
    }

    fn servo_ids(&self) -> Range<ServoId> {
        0..self.num_smart_servos() as ServoId
    }

    fn check_count(&self, actual: usize) -> Result<()> {
        let expected = self.num_smart_servos();
        if actual != expected {
            return Err(MorobotError::AngleCount { expected, actual });
        }
        Ok(())
    }

    // --- Setup ---

    /// Declares the current position of every joint as 0 degrees.
    pub fn set_zero(&mut self) -> Result<()> {
        self.pose_is_valid = false;
        for servo in self.servo_ids() {
            self.bus.set_zero(servo + 1)?;
        }
        Ok(())
    }

    /// Moves every joint to 0 degrees and waits for the motion to finish.
    pub fn move_home(&mut self) -> Result<()> {
        self.pose_is_valid = false;
        for servo in self.servo_ids() {
            self.bus.set_init_angle(servo + 1, 0, HOME_SPEED_RPM)?;
        }
        self.wait_until_ready()
    }

    /// Sets the default speed, clamped to `1..=SERVO_MAX_SPEED_RPM`.
    pub fn set_speed_rpm(&mut self, speed: u8) {
        self.speed_rpm = clamp_speed(speed);
    }

    /// Sets the position of the TCP relative to the flange of the last axis.
    pub fn set_tcp_offset(&mut self, offset: Vec3) {
        self.kinematics.set_tcp_offset(offset);
        self.pose_is_valid = false;
    }

    /// Disables the wait before each multi-joint move, so moves can be blended.
    pub fn set_wait_after_each_move(&mut self, wait: bool) {
        self.wait_after_each_move = wait;
    }

    // --- Brakes ---

    pub fn set_brakes(&mut self) -> Result<()> {
        for servo in self.servo_ids() {
            self.bus.set_brake(servo + 1, Brake::Braked)?;
        }
        Ok(())
    }

    /// Lets the joints be moved by hand.
    pub fn release_brakes(&mut self) -> Result<()> {
        self.pose_is_valid = false;
        for servo in self.servo_ids() {
            self.bus.set_brake(servo + 1, Brake::Loose)?;
        }
        Ok(())
    }

    // --- Robot status ---

    pub fn set_busy(&mut self) {
        self.angle_reached.fill(false);
    }

    pub fn set_idle(&mut self) {
        self.angle_reached.fill(true);
    }

    /// True once no busy joint moves any more.
    pub fn is_ready(&mut self) -> Result<bool> {
        for servo in self.servo_ids() {
            if self.angle_reached[servo as usize] {
                continue;
            }
            if self.check_if_motor_moves(servo)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Blocks until the robot has finished its current motion.
    ///
    /// Returns immediately when waiting is disabled with
    /// [`set_wait_after_each_move`](Self::set_wait_after_each_move).
    pub fn wait_until_ready(&mut self) -> Result<()> {
        if !self.wait_after_each_move {
            self.set_idle();
            return Ok(());
        }
        self.set_busy();
        let start = self.clock.now();
        let timeout = self.config.motion.timeout();
        while !self.is_ready()? {
            if self.clock.now().saturating_sub(start) > timeout {
                error!("timeout occurred while waiting for robot to finish movement");
                return Err(MorobotError::timeout("robot"));
            }
        }
        self.set_idle();
        Ok(())
    }

    /// Samples the angle of a motor twice, one poll window apart.
    pub fn check_if_motor_moves(&mut self, servo: ServoId) -> Result<bool> {
        let start = self.act_angle(servo)?;
        self.clock.sleep(self.config.motion.motion_poll());
        Ok(start != self.act_angle(servo)?)
    }

    // --- Getters ---

    pub fn act_angle(&mut self, servo: ServoId) -> Result<i64> {
        let id = self.bus_id(servo)?;
        self.bus.angle(id)
    }

    pub fn act_angles(&mut self) -> Result<Vec<i64>> {
        self.servo_ids().map(|servo| self.bus.angle(servo + 1)).collect()
    }

    /// Returns the TCP pose, recomputing it from the joint angles if a motion
    /// invalidated the cached one.
    pub fn refresh_pose(&mut self) -> Result<TcpPose> {
        if self.pose_is_valid {
            return Ok(self.pose);
        }
        self.wait_until_ready()?;
        let angles: Vec<f32> = self.act_angles()?.into_iter().map(|a| a as f32).collect();
        self.pose = self.kinematics.forward(&angles);
        self.pose_is_valid = true;
        debug!(pose = %self.pose, "calculated TCP-pose");
        Ok(self.pose)
    }

    pub fn act_pose(&mut self) -> Result<TcpPose> {
        self.refresh_pose()
    }

    pub fn act_position(&mut self, axis: Axis) -> Result<f32> {
        Ok(self.refresh_pose()?.position_on(axis))
    }

    pub fn act_orientation(&mut self, axis: Axis) -> Result<f32> {
        Ok(self.refresh_pose()?.orientation_on(axis))
    }

    /// Speed of a motor in rpm.
    pub fn speed(&mut self, servo: ServoId) -> Result<f32> {
        let id = self.bus_id(servo)?;
        self.bus.speed(id)
    }

    pub fn temperature(&mut self, servo: ServoId) -> Result<f32> {
        let id = self.bus_id(servo)?;
        self.bus.temperature(id)
    }

    pub fn voltage(&mut self, servo: ServoId) -> Result<f32> {
        let id = self.bus_id(servo)?;
        self.bus.voltage(id)
    }

    pub fn current(&mut self, servo: ServoId) -> Result<f32> {
        let id = self.bus_id(servo)?;
        self.bus.current(id)
    }

    pub fn joint_limit(&self, servo: ServoId, bound: Bound) -> Result<f32> {
        self.kinematics
            .blueprint()
            .limits(servo)
            .map(|l| l.get(bound))
            .ok_or(MorobotError::InvalidServo {
                servo,
                count: self.num_smart_servos(),
            })
    }

    pub fn axis_limit(&self, axis: Axis, bound: Bound) -> f32 {
        self.kinematics.axis_limits()[axis.index()][bound.index()]
    }

    // --- Joint-space movements ---

    /// Moves one motor to an absolute angle at the default speed.
    pub fn move_to_angle(&mut self, servo: ServoId, angle: i64) -> Result<()> {
        self.move_to_angle_with(servo, angle, self.speed_rpm, true)
    }

    /// Moves one motor to an absolute angle. `check_validity = false` skips the
    /// joint-limit check, which calibration routines rely on.
    pub fn move_to_angle_with(
        &mut self,
        servo: ServoId,
        angle: i64,
        speed_rpm: u8,
        check_validity: bool,
    ) -> Result<()> {
        let id = self.bus_id(servo)?;
        if check_validity {
            self.kinematics.check_angle(servo, angle as f32)?;
        }
        self.pose_is_valid = false;
        self.bus.move_to(id, angle, clamp_speed(speed_rpm))?;
        Ok(())
    }

    pub fn move_to_angles(&mut self, angles: &[i64]) -> Result<()> {
        self.move_to_angles_with(angles, self.speed_rpm)
    }

    /// Moves all motors to absolute angles. No motor moves unless every angle is valid.
    pub fn move_to_angles_with(&mut self, angles: &[i64], speed_rpm: u8) -> Result<()> {
        self.check_count(angles.len())?;
        self.wait_until_ready()?;
        info!("moving to [deg]: {}", format_angles(angles));

        let goal: Vec<f32> = angles.iter().map(|&a| a as f32).collect();
        self.kinematics.check_angles(&goal)?;
        let speed_rpm = clamp_speed(speed_rpm);
        self.pose_is_valid = false;
        for (servo, &angle) in self.servo_ids().zip(angles) {
            self.bus.move_to(servo + 1, angle, speed_rpm)?;
        }
        Ok(())
    }

    /// Moves one motor by a relative angle at the default speed.
    pub fn move_angle(&mut self, servo: ServoId, angle: i64) -> Result<()> {
        self.move_angle_with(servo, angle, self.speed_rpm, true)
    }

    pub fn move_angle_with(
        &mut self,
        servo: ServoId,
        angle: i64,
        speed_rpm: u8,
        check_validity: bool,
    ) -> Result<()> {
        let id = self.bus_id(servo)?;
        if check_validity {
            let goal = self.bus.angle(id)? + angle;
            self.kinematics.check_angle(servo, goal as f32)?;
        }
        self.pose_is_valid = false;
        self.bus.move_by(id, angle, clamp_speed(speed_rpm))?;
        Ok(())
    }

    pub fn move_angles(&mut self, angles: &[i64]) -> Result<()> {
        self.move_angles_with(angles, self.speed_rpm)
    }

    /// Moves all motors by relative angles. No motor moves unless every goal is valid.
    pub fn move_angles_with(&mut self, angles: &[i64], speed_rpm: u8) -> Result<()> {
        self.check_count(angles.len())?;
        self.wait_until_ready()?;
        info!("moving [deg]: {}", format_angles(angles));

        let current = self.act_angles()?;
        let goal: Vec<f32> = current
            .iter()
            .zip(angles)
            .map(|(&c, &delta)| (c + delta) as f32)
            .collect();
        self.kinematics.check_angles(&goal)?;
        let speed_rpm = clamp_speed(speed_rpm);
        self.pose_is_valid = false;
        for (servo, &delta) in self.servo_ids().zip(angles) {
            self.bus.move_by(servo + 1, delta, speed_rpm)?;
        }
        Ok(())
    }

    // --- Cartesian movements ---

    /// Moves the TCP to a goal in the model's task coordinates.
    ///
    /// Returns the pose the robot will have once the motion has finished.
    pub fn move_to_pose(&mut self, goal: Vec3) -> Result<TcpPose> {
        self.wait_until_ready()?;
        info!(x = goal.x, y = goal.y, z = goal.z, "moving to [mm]");

        let angles = match self.kinematics.inverse(goal) {
            Ok(angles) => round_angles(&angles),
            Err(e) => {
                warn!(error = %e, "position cannot be reached");
                self.pose_is_valid = false;
                return Err(e);
            }
        };
        self.pose_is_valid = false;
        for (servo, &angle) in self.servo_ids().zip(&angles) {
            self.bus.move_to(servo + 1, angle, self.speed_rpm)?;
        }

        let goal_angles: Vec<f32> = angles.iter().map(|&a| a as f32).collect();
        self.pose = self.kinematics.forward(&goal_angles);
        self.pose_is_valid = true;
        Ok(self.pose)
    }

    /// Moves the TCP by an offset in task coordinates.
    pub fn move_xyz(&mut self, offset: Vec3) -> Result<TcpPose> {
        let pose = self.refresh_pose()?;
        let current = self.kinematics.task_coordinates(&pose);
        self.move_to_pose(current + offset)
    }

    /// Moves the TCP along one axis of the task coordinates.
    pub fn move_in_direction(&mut self, axis: Axis, value: f32) -> Result<TcpPose> {
        self.move_xyz(axis.unit() * value)
    }

    fn stop_all(&mut self) -> Result<()> {
        for servo in self.servo_ids() {
            self.bus.set_pwm_move(servo + 1, 0.0)?;
        }
        Ok(())
    }

    fn solve_waypoints(&self, points: &[Vec3]) -> Result<Vec<Vec<i64>>> {
        points
            .iter()
            .map(|&p| self.kinematics.inverse(p).map(|a| round_angles(&a)))
            .collect()
    }

    /// Drives the joints through `points` with polynomial velocity profiles.
    ///
    /// Every segment is synchronized so the joint with the shortest travel still runs
    /// faster than the PWM dead band. With `continuous`, joints pass through
    /// intermediate points without stopping.
    pub fn trajectory_planning(
        &mut self,
        points: &[Vec3],
        continuous: bool,
        order: PolynomOrder,
    ) -> Result<()> {
        self.wait_until_ready()?;
        let joint_values = self.solve_waypoints(points)?;
        for (i, values) in joint_values.iter().enumerate() {
            debug!(point = i, angles = %format_angles(values), "trajectory joint values");
        }

        let count = self.num_smart_servos();
        let mut end_vel = vec![0.0f32; count];
        for (i, goal) in joint_values.iter().enumerate() {
            let start = self.act_angles()?;
            let Some((joint, total_time)) = synchronized_segment_time(&start, goal) else {
                debug!(point = i + 1, "already at point");
                continue;
            };
            debug!(point = i + 1, joint, total_time, "segment");

            let start_vel = if continuous {
                end_vel.clone()
            } else {
                vec![0.0; count]
            };
            end_vel = match joint_values.get(i + 1) {
                Some(next) if continuous => (0..count)
                    .map(|j| {
                        calc_intermediate_velocity(
                            total_time,
                            start[j] as f32,
                            goal[j] as f32,
                            next[j] as f32,
                        )
                    })
                    .collect(),
                _ => vec![0.0; count],
            };

            let slot = total_time / TRAJECTORY_SLOTS as f32;
            self.pose_is_valid = false;
            for k in 1..=TRAJECTORY_SLOTS {
                let t = slot * k as f32;
                for j in 0..count {
                    let pwm = match order {
                        PolynomOrder::Third => calc_polynom_third_order(
                            start[j],
                            goal[j],
                            start_vel[j],
                            end_vel[j],
                            t,
                            total_time,
                        ),
                        PolynomOrder::Fifth => calc_polynom_fifth_order(
                            start[j],
                            goal[j],
                            start_vel[j],
                            end_vel[j],
                            t,
                            total_time,
                        ),
                    };
                    let pwm = if start[j] == goal[j] { 0.0 } else { pwm };
                    self.bus.set_pwm_move(j as u8 + 1, pwm)?;
                }
                self.clock.sleep(Duration::from_secs_f32(slot));
            }

            if !continuous {
                self.stop_all()?;
                self.clock.sleep(self.config.motion.settle());
                self.log_tcp_pose()?;
            }
        }

        self.stop_all()?;
        self.pose_is_valid = false;
        self.log_tcp_pose()
    }

    /// Moves the TCP on a straight line to `goal` (task coordinates).
    ///
    /// The line is split into waypoints `resolution` mm apart. Joints are driven with a
    /// constant PWM and stopped as they reach each waypoint. With `continuous`, the next
    /// waypoint is approached as soon as the joint with the longest travel arrives.
    pub fn move_linear(
        &mut self,
        goal: Vec3,
        continuous: bool,
        resolution: f32,
        use_trajectory_planning: bool,
    ) -> Result<()> {
        self.wait_until_ready()?;
        let pose = self.refresh_pose()?;
        let start = self.kinematics.task_coordinates(&pose);
        let points = linear_waypoints(start, goal, resolution);
        debug!(
            length = (goal - start).length(),
            intervals = points.len(),
            "linear move"
        );
        if points.is_empty() {
            return Ok(());
        }

        if use_trajectory_planning {
            return self.trajectory_planning(&points, true, PolynomOrder::Third);
        }

        let joint_values = self.solve_waypoints(&points)?;
        let count = self.num_smart_servos();
        let pwm = self.config.motion.linear_pwm;
        let poll = self.config.motion.linear_poll();
        let timeout = self.config.motion.timeout();

        for (i, targets) in joint_values.iter().enumerate() {
            let start_angles = self.act_angles()?;
            let distances: Vec<i64> = targets
                .iter()
                .zip(&start_angles)
                .map(|(t, s)| t - s)
                .collect();
            let leading = (0..count)
                .max_by_key(|&j| distances[j].abs())
                .unwrap_or_default();
            debug!(interval = i, leading, "joint with max distance");

            self.pose_is_valid = false;
            let mut done = vec![false; count];
            for j in 0..count {
                let command = match distances[j].signum() {
                    1 => pwm,
                    -1 => -pwm,
                    _ => {
                        done[j] = true;
                        0.0
                    }
                };
                self.bus.set_pwm_move(j as u8 + 1, command)?;
            }

            let segment_start = self.clock.now();
            while done.contains(&false) {
                self.clock.sleep(poll);

                if continuous {
                    let lead = self.act_angle(leading as ServoId)?;
                    if (lead - targets[leading]).abs() <= WAYPOINT_TOLERANCE_DEG {
                        break;
                    }
                }
                for j in 0..count {
                    if done[j] {
                        continue;
                    }
                    let angle = self.bus.angle(j as u8 + 1)?;
                    let arrived = if distances[j] > 0 {
                        angle >= targets[j]
                    } else {
                        angle <= targets[j]
                    };
                    if arrived {
                        self.bus.set_pwm_move(j as u8 + 1, 0.0)?;
                        done[j] = true;
                    }
                }

                if self.clock.now().saturating_sub(segment_start) > timeout {
                    self.stop_all()?;
                    error!(interval = i, "timeout occurred during linear move");
                    return Err(MorobotError::timeout("linear move"));
                }
            }

            if !continuous {
                self.log_tcp_pose()?;
            }
        }

        self.stop_all()?;
        self.pose_is_valid = false;
        self.log_tcp_pose()
    }

    /// Drives a linear axis into its mechanical end stop and zeroes it there.
    ///
    /// The axis is nudged in negative direction until the motor current exceeds
    /// `max_current`.
    pub fn auto_calibrate_linear_axis(&mut self, servo: ServoId, max_current: f32) -> Result<()> {
        let id = self.bus_id(servo)?;
        let calibration = self.config.calibration.clone();
        for _ in 0..calibration.max_steps {
            self.move_angle_with(servo, -calibration.step_deg, calibration.step_rpm, false)?;
            self.clock.sleep(calibration.step_interval());
            if self.bus.current(id)? > max_current {
                self.pose_is_valid = false;
                self.bus.set_zero(id)?;
                info!(servo, "linear axis set zero");
                return Ok(());
            }
        }
        Err(MorobotError::calibration(format!(
            "motor {servo} did not reach its end stop after {} steps",
            calibration.max_steps
        )))
    }

    // --- Helpers ---

    /// Logs the current TCP pose at info level.
    pub fn log_tcp_pose(&mut self) -> Result<()> {
        let pose = self.refresh_pose()?;
        info!("TCP-pose {pose}");
        Ok(())
    }
}

impl<B: ServoBus> Morobot<ScaraRrp, B> {
    /// Retracts the linear axis fully and zeroes it there.
    pub fn move_z_axis_in(&mut self, max_current: f32) -> Result<()> {
        self.auto_calibrate_linear_axis(2, max_current)?;
        self.wait_until_ready()
    }
}

/// Renders joint angles as `a, b, c`.
pub fn format_angles(angles: &[i64]) -> String {
    angles
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Limits a per-call speed to what the servos accept.
fn clamp_speed(speed_rpm: u8) -> u8 {
    let clamped = speed_rpm.clamp(1, SERVO_MAX_SPEED_RPM);
    if clamped != speed_rpm {
        debug!(requested = speed_rpm, applied = clamped, "speed clamped");
    }
    clamped
}

fn round_angles(angles: &[f32]) -> Vec<i64> {
    angles.iter().map(|a| a.round() as i64).collect()
}
