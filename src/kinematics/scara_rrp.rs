//! morobot-s (rrp): two revolute joints and a linear z-axis driven through a rack.
//!
//! Task coordinates are the TCP position `(x, y, z)` in mm. The linear axis is zeroed
//! fully retracted, so positive motor angles lower the tool.

use super::Kinematics;
use crate::blueprint::{ArmBlueprint, JointLimit, JointType};
use crate::error::Result;
use crate::pose::TcpPose;
use glam::Vec3;
use tracing::debug;

/// Length from mounting to first axis.
const A: f32 = 47.0;
/// Length from first axis to second axis.
const B: f32 = 92.9;
/// Length from second axis to the center of the flange.
const C: f32 = 72.79;
/// Turn the motor of the linear axis by this many degrees to move it 1 mm.
const GEAR_RATIO: f32 = 16.25;

#[derive(Clone, Debug)]
pub struct ScaraRrp {
    blueprint: ArmBlueprint,
    tcp_offset: Vec3,
    /// Length of the last link measured straight to the TCP.
    c_new: f32,
    /// Angle between the real last link and `c_new`.
    beta_new: f32,
}

impl Default for ScaraRrp {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaraRrp {
    pub fn new() -> Self {
        let mut blueprint = ArmBlueprint::new("morobot_s_rrp");
        blueprint.add_joint(JointType::Revolute, JointLimit::new(-100.0, 100.0));
        blueprint.add_joint(JointType::Revolute, JointLimit::new(-100.0, 100.0));
        blueprint.add_joint(JointType::Prismatic, JointLimit::new(0.0, 780.0));
        blueprint.add_link("base", A);
        blueprint.add_link("upper_arm", B);
        blueprint.add_link("forearm", C);
        blueprint.gear_ratio = Some(GEAR_RATIO);
        Self {
            blueprint,
            tcp_offset: Vec3::ZERO,
            c_new: C,
            beta_new: 0.0,
        }
    }

    pub fn gear_ratio(&self) -> f32 {
        GEAR_RATIO
    }

    /// Travel of the linear axis in mm.
    pub fn stroke(&self) -> f32 {
        self.blueprint
            .limits(2)
            .map(|l| (l.max - l.min) / GEAR_RATIO)
            .unwrap_or_default()
    }
}

impl Kinematics for ScaraRrp {
    fn blueprint(&self) -> &ArmBlueprint {
        &self.blueprint
    }

    fn tcp_offset(&self) -> Vec3 {
        self.tcp_offset
    }

    fn set_tcp_offset(&mut self, offset: Vec3) {
        self.tcp_offset = offset;
        // The tool is rigidly attached to the last link; fold it into one straight link.
        self.c_new = offset.y.hypot(C + offset.x);
        self.beta_new = (offset.y / self.c_new).asin();
    }

    fn inverse(&self, goal: Vec3) -> Result<Vec<f32>> {
        let x = goal.x - A;
        let y = goal.y;
        let r_sq = x * x + y * y;
        let c_sq = self.c_new * self.c_new;

        // Motors 0 and 1 are mounted upside down, hence the negated terms.
        let phi2n = -((r_sq - B * B - c_sq) / (2.0 * B * self.c_new)).acos();
        let gamma = y.atan2(x);
        let alpha = ((r_sq + B * B - c_sq) / (2.0 * B * r_sq.sqrt())).acos();

        let mut phi1 = -(gamma + alpha).to_degrees();
        let mut phi2 = (phi2n - self.beta_new).to_degrees();
        if self.check_angle(0, phi1).is_err() || self.check_angle(1, phi2).is_err() {
            debug!("switching to other configuration");
            phi1 = -(gamma - alpha).to_degrees();
            phi2 = -(phi2n + self.beta_new).to_degrees();
        }

        // Negative z moves the axis out.
        let phi3 = -(goal.z - self.tcp_offset.z) * GEAR_RATIO;

        let angles = vec![phi1, phi2, phi3];
        self.check_angles(&angles)?;
        Ok(angles)
    }

    fn forward(&self, angles: &[f32]) -> TcpPose {
        let q = |i: usize| angles.get(i).copied().unwrap_or(0.0);
        let theta1 = -q(0).to_radians();
        let theta2 = theta1 + q(1).to_radians() + self.beta_new;

        let x = A + B * theta1.cos() + self.c_new * theta2.cos();
        let y = B * theta1.sin() + self.c_new * theta2.sin();
        let z = -q(2) / GEAR_RATIO + self.tcp_offset.z;
        TcpPose::new(Vec3::new(x, y, z), -q(0) + q(1))
    }

    fn task_coordinates(&self, pose: &TcpPose) -> Vec3 {
        pose.position
    }

    fn axis_limits(&self) -> [[f32; 2]; 3] {
        let reach = B + self.c_new;
        let z_top = self.tcp_offset.z;
        [
            [A - reach, A + reach],
            [-reach, reach],
            [z_top - self.stroke(), z_top],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MorobotError;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-2, "{a} != {b}");
    }

    #[test]
    fn inverse_then_forward_reproduces_goal() {
        let k = ScaraRrp::new();
        let goal = Vec3::new(150.0, 50.0, -10.0);
        let angles = k.inverse(goal).unwrap();
        assert!((angles[2] - 162.5).abs() < 1e-3);
        assert_close(k.forward(&angles).position, goal);
    }

    #[test]
    fn other_configuration_when_first_is_out_of_range() {
        let k = ScaraRrp::new();
        let goal = Vec3::new(60.0, 130.0, -5.0);
        let angles = k.inverse(goal).unwrap();
        assert!(angles[1] > 0.0, "expected the mirrored elbow, got {angles:?}");
        assert_close(k.forward(&angles).position, goal);
    }

    #[test]
    fn tcp_offset_is_folded_into_last_link() {
        let mut k = ScaraRrp::new();
        k.set_tcp_offset(Vec3::new(10.0, 15.0, 20.0));
        let goal = Vec3::new(150.0, 50.0, -10.0);
        let angles = k.inverse(goal).unwrap();
        assert_close(k.forward(&angles).position, goal);
        assert_eq!(k.forward(&[0.0, 0.0, 0.0]).position.z, 20.0);
    }

    #[test]
    fn linear_axis_cannot_rise_above_zero() {
        let k = ScaraRrp::new();
        let err = k.inverse(Vec3::new(200.0, 0.0, 5.0)).unwrap_err();
        assert!(matches!(err, MorobotError::JointLimit { servo: 2, .. }));
        let limits = k.axis_limits();
        assert_eq!(limits[2][1], 0.0);
        assert!((limits[2][0] + 48.0).abs() < 1e-3);
    }
}
