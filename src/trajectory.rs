//! Velocity profiles and waypoint generation for PWM-driven motions.
//!
//! All functions here are pure. Velocities are in degrees per second, times in seconds.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Slowest velocity at which a PWM-driven motor still turns.
pub const MIN_PWM_VELOCITY: f32 = 25.588_54;

/// Velocity commands issued per trajectory segment.
pub const TRAJECTORY_SLOTS: u32 = 10;

/// Velocity profiles are clamped to this magnitude.
pub const MAX_PROFILE_VELOCITY: f32 = 140.0;

/// Start velocity used when a segment would otherwise start from rest.
pub const DEFAULT_START_VELOCITY: f32 = 24.0;

/// Order of the polynomial used for joint-space trajectories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolynomOrder {
    #[default]
    Third,
    Fifth,
}

/// Maps a joint velocity to the PWM value that produces it.
///
/// The motor has a dead band, so the linear fit has a different intercept in each direction.
pub fn calc_pwm(deg_per_sec: f32) -> f32 {
    const K: f32 = 4.6109;
    if deg_per_sec < 0.0 {
        (deg_per_sec - 9.1866) / K
    } else {
        (deg_per_sec + 12.0) / K
    }
}

fn start_velocity(start_vel: f32, diff: f32) -> f32 {
    if start_vel != 0.0 {
        start_vel
    } else if diff > 0.0 {
        DEFAULT_START_VELOCITY
    } else {
        -DEFAULT_START_VELOCITY
    }
}

fn clamp_velocity(v: f32) -> f32 {
    v.clamp(-MAX_PROFILE_VELOCITY, MAX_PROFILE_VELOCITY)
}

/// PWM value at `time` of a cubic segment from `start_angle` to `end_angle` lasting `total_time`.
pub fn calc_polynom_third_order(
    start_angle: i64,
    end_angle: i64,
    start_vel: f32,
    end_vel: f32,
    time: f32,
    total_time: f32,
) -> f32 {
    let diff = (end_angle - start_angle) as f32;
    let v0 = start_velocity(start_vel, diff);

    let c1 = v0;
    let c2 = (3.0 * diff - (2.0 * v0 + end_vel) * total_time) / total_time.powi(2);
    let c3 = (-2.0 * diff + (v0 + end_vel) * total_time) / total_time.powi(3);
    let velocity = c1 + 2.0 * c2 * time + 3.0 * c3 * time.powi(2);

    calc_pwm(clamp_velocity(velocity))
}

/// PWM value at `time` of a quintic segment with zero boundary accelerations.
pub fn calc_polynom_fifth_order(
    start_angle: i64,
    end_angle: i64,
    start_vel: f32,
    end_vel: f32,
    time: f32,
    total_time: f32,
) -> f32 {
    let diff = (end_angle - start_angle) as f32;
    let v0 = start_velocity(start_vel, diff);

    let c1 = v0;
    let c3 = (20.0 * diff - (8.0 * end_vel + 12.0 * v0) * total_time) / (2.0 * total_time.powi(3));
    let c4 = (-30.0 * diff + (14.0 * end_vel + 16.0 * v0) * total_time) / (2.0 * total_time.powi(4));
    let c5 = (12.0 * diff - 6.0 * (end_vel + v0) * total_time) / (2.0 * total_time.powi(5));
    let velocity =
        c1 + 3.0 * c3 * time.powi(2) + 4.0 * c4 * time.powi(3) + 5.0 * c5 * time.powi(4);

    calc_pwm(clamp_velocity(velocity))
}

/// Velocity to pass through `q1` on the way from `q0` to `q2`.
///
/// Keeps moving (mean of both slopes) if the direction does not change, stops otherwise.
pub fn calc_intermediate_velocity(time: f32, q0: f32, q1: f32, q2: f32) -> f32 {
    let d1 = (q1 - q0) / time;
    let d2 = (q2 - q1) / time;
    if d1.is_sign_negative() == d2.is_sign_negative() {
        0.5 * (d1 + d2)
    } else {
        0.0
    }
}

/// Evenly spaced points on the straight line from `start` to `goal`, excluding `start`.
///
/// Points are roughly `resolution` mm apart; the last point is always `goal`.
/// Returns nothing when `start == goal`.
pub fn linear_waypoints(start: Vec3, goal: Vec3, resolution: f32) -> Vec<Vec3> {
    let direction = goal - start;
    let length = direction.length();
    if length == 0.0 {
        return Vec::new();
    }
    let intervals = if resolution > 0.0 {
        ((length / resolution) as usize).max(1)
    } else {
        1
    };
    let step = 1.0 / intervals as f32;
    (1..=intervals)
        .map(|i| start + direction * (i as f32 * step))
        .collect()
}

/// Longest time a segment may take so that the joint travelling the shortest non-zero
/// distance still moves faster than [`MIN_PWM_VELOCITY`].
///
/// Returns the index of that joint alongside the time. `None` if no joint moves.
pub fn synchronized_segment_time(start: &[i64], end: &[i64]) -> Option<(usize, f32)> {
    start
        .iter()
        .zip(end)
        .map(|(s, e)| (e - s).abs())
        .enumerate()
        .filter(|&(_, dist)| dist != 0)
        .min_by_key(|&(_, dist)| dist)
        .map(|(joint, dist)| (joint, dist as f32 / MIN_PWM_VELOCITY))
}
