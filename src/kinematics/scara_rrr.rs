//! morobot-s (rrr): a planar arm with three revolute joints.
//!
//! Task coordinates are `(x, y, rot_z)`: the TCP position in the plane (mm) and the
//! rotation of the tool around the z-axis (degrees). The height of the TCP is fixed
//! by the z-component of the TCP offset.

use super::Kinematics;
use crate::blueprint::{ArmBlueprint, JointLimit, JointType};
use crate::error::Result;
use crate::pose::TcpPose;
use glam::{Vec2, Vec3};
use tracing::{debug, warn};

/// Length from mounting to first axis.
const A: f32 = 47.0;
/// Length from first axis to second axis.
const B: f32 = 92.9;
/// Length from second axis to third axis.
const C: f32 = 70.52;

#[derive(Clone, Debug)]
pub struct ScaraRrr {
    blueprint: ArmBlueprint,
    tcp_offset: Vec3,
    /// Length from third axis to TCP (set by `set_tcp_offset`).
    d: f32,
}

impl Default for ScaraRrr {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaraRrr {
    pub fn new() -> Self {
        let mut blueprint = ArmBlueprint::new("morobot_s_rrr");
        blueprint.add_joint(JointType::Revolute, JointLimit::new(-100.0, 100.0));
        blueprint.add_joint(JointType::Revolute, JointLimit::new(-100.0, 100.0));
        blueprint.add_joint(JointType::Revolute, JointLimit::new(-180.0, 180.0));
        blueprint.add_link("base", A);
        blueprint.add_link("upper_arm", B);
        blueprint.add_link("forearm", C);
        blueprint.add_link("tool", 0.0);
        Self {
            blueprint,
            tcp_offset: Vec3::ZERO,
            d: 0.0,
        }
    }

    /// One elbow configuration. `elbow` is +1 or -1.
    fn solve_branch(&self, wrist: Vec2, rot_z: f32, elbow: f32) -> [f32; 3] {
        let r_sq = wrist.length_squared();
        let phi2 = ((r_sq - B * B - C * C) / (2.0 * B * C)).acos();
        let gamma = ((r_sq + B * B - C * C) / (2.0 * B * r_sq.sqrt())).acos();
        let alpha = wrist.y.atan2(wrist.x);

        // Motor 0 is mounted the other way round, so its angle is the negated link angle.
        let q0 = -(alpha - elbow * gamma);
        let q1 = elbow * phi2;
        let q2 = -q0 + q1 - rot_z;
        [q0.to_degrees(), q1.to_degrees(), q2.to_degrees()]
    }
}

impl Kinematics for ScaraRrr {
    fn blueprint(&self) -> &ArmBlueprint {
        &self.blueprint
    }

    fn tcp_offset(&self) -> Vec3 {
        self.tcp_offset
    }

    fn set_tcp_offset(&mut self, offset: Vec3) {
        if offset.y != 0.0 {
            warn!(y = offset.y, "y-offsets of the TCP are ignored on the rrr model");
        }
        self.tcp_offset = offset;
        self.d = offset.x;
        if let Some(tool) = self.blueprint.links.iter_mut().find(|l| l.name == "tool") {
            tool.length = self.d;
        }
    }

    fn inverse(&self, goal: Vec3) -> Result<Vec<f32>> {
        let rot_z = goal.z.to_radians();
        // Base is in x-orientation: just subtract the base length from x.
        let flange = Vec2::new(goal.x - A, goal.y);
        let wrist = flange - self.d * Vec2::new(rot_z.cos(), rot_z.sin());

        let angles = self.solve_branch(wrist, rot_z, 1.0);
        if self.check_angles(&angles).is_ok() {
            return Ok(angles.to_vec());
        }
        debug!("switching to other configuration");
        let angles = self.solve_branch(wrist, rot_z, -1.0);
        self.check_angles(&angles)?;
        Ok(angles.to_vec())
    }

    fn forward(&self, angles: &[f32]) -> TcpPose {
        let q = |i: usize| angles.get(i).copied().unwrap_or(0.0).to_radians();
        let theta1 = -q(0);
        let theta2 = theta1 + q(1);
        let theta3 = theta2 - q(2);

        let x = A + B * theta1.cos() + C * theta2.cos() + self.d * theta3.cos();
        let y = B * theta1.sin() + C * theta2.sin() + self.d * theta3.sin();
        TcpPose::new(Vec3::new(x, y, self.tcp_offset.z), theta3.to_degrees())
    }

    fn task_coordinates(&self, pose: &TcpPose) -> Vec3 {
        Vec3::new(pose.position.x, pose.position.y, pose.orientation.z)
    }

    fn axis_limits(&self) -> [[f32; 2]; 3] {
        let reach = B + C + self.d.abs();
        [
            [A - reach, A + reach],
            [-reach, reach],
            [self.tcp_offset.z, self.tcp_offset.z],
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
    fn zero_angles_stretch_along_x() {
        let k = ScaraRrr::new();
        let pose = k.forward(&[0.0, 0.0, 0.0]);
        assert_close(pose.position, Vec3::new(A + B + C, 0.0, 0.0));
        assert_eq!(pose.orientation.z, 0.0);
    }

    #[test]
    fn inverse_then_forward_reproduces_goal() {
        let mut k = ScaraRrr::new();
        k.set_tcp_offset(Vec3::new(20.0, 0.0, 5.0));
        let goal = Vec3::new(190.0, 60.0, 20.0);
        let angles = k.inverse(goal).unwrap();
        let pose = k.forward(&angles);
        assert_close(k.task_coordinates(&pose), goal);
        assert_eq!(pose.position.z, 5.0);
    }

    #[test]
    fn falls_back_to_mirrored_elbow() {
        let k = ScaraRrr::new();
        // Reaching to the far left needs the other elbow to keep joint 0 in range.
        let goal = Vec3::new(30.0, -120.0, -60.0);
        let angles = k.inverse(goal).unwrap();
        assert!(k.check_angles(&angles).is_ok());
        assert_close(k.task_coordinates(&k.forward(&angles)), goal);
    }

    #[test]
    fn out_of_reach_has_no_solution() {
        let k = ScaraRrr::new();
        let err = k.inverse(Vec3::new(500.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, MorobotError::NoSolution { servo: 0 }));
    }

    #[test]
    fn joint_limits_are_enforced() {
        let k = ScaraRrr::new();
        assert!(k.check_angle(2, 180.0).is_ok());
        assert!(matches!(
            k.check_angle(0, 100.5),
            Err(MorobotError::JointLimit { servo: 0, .. })
        ));
        assert!(matches!(
            k.check_angle(7, 0.0),
            Err(MorobotError::InvalidServo { servo: 7, .. })
        ));
    }
}
