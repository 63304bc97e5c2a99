// tests/motion.rs
use std::time::Duration;

use glam::Vec3;
use morobot::sim::BusCommand;
use morobot::{
    Axis, Bound, Brake, Clock, Morobot, MorobotConfig, MorobotError, PolynomOrder, Result,
    ScaraRrp, ScaraRrr, ServoBus, SimClock, SimulatedServoBus,
};

fn rrr() -> (Morobot<ScaraRrr, SimulatedServoBus>, SimClock) {
    let clock = SimClock::new();
    let bus = SimulatedServoBus::new(3, clock.clone());
    let mut robot = Morobot::new(ScaraRrr::new(), bus)
        .unwrap()
        .with_clock(clock.clone());
    robot.begin().unwrap();
    (robot, clock)
}

/// Simulated chain whose servo `failing` stops answering motion commands.
struct FlakyBus {
    inner: SimulatedServoBus,
    failing: Option<u8>,
}

impl FlakyBus {
    fn check(&self, id: u8) -> Result<()> {
        if self.failing == Some(id) {
            return Err(MorobotError::bus(id, "no response"));
        }
        Ok(())
    }
}

impl ServoBus for FlakyBus {
    fn assign_dev_ids(&mut self) -> Result<()> {
        self.inner.assign_dev_ids()
    }
    fn set_zero(&mut self, id: u8) -> Result<()> {
        self.inner.set_zero(id)
    }
    fn set_init_angle(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        self.inner.set_init_angle(id, angle, speed)
    }
    fn set_brake(&mut self, id: u8, brake: Brake) -> Result<()> {
        self.inner.set_brake(id, brake)
    }
    fn move_to(&mut self, id: u8, angle: i64, speed: u8) -> Result<()> {
        self.check(id)?;
        self.inner.move_to(id, angle, speed)
    }
    fn move_by(&mut self, id: u8, delta: i64, speed: u8) -> Result<()> {
        self.check(id)?;
        self.inner.move_by(id, delta, speed)
    }
    fn set_pwm_move(&mut self, id: u8, pwm: f32) -> Result<()> {
        self.inner.set_pwm_move(id, pwm)
    }
    fn angle(&mut self, id: u8) -> Result<i64> {
        self.inner.angle(id)
    }
    fn speed(&mut self, id: u8) -> Result<f32> {
        self.inner.speed(id)
    }
    fn temperature(&mut self, id: u8) -> Result<f32> {
        self.inner.temperature(id)
    }
    fn voltage(&mut self, id: u8) -> Result<f32> {
        self.inner.voltage(id)
    }
    fn current(&mut self, id: u8) -> Result<f32> {
        self.inner.current(id)
    }
}

fn pwm_commands(robot: &Morobot<ScaraRrr, SimulatedServoBus>) -> Vec<(u8, f32)> {
    robot
        .bus()
        .commands()
        .iter()
        .filter_map(|c| match c {
            BusCommand::SetPwmMove { id, pwm } => Some((*id, *pwm)),
            _ => None,
        })
        .collect()
}

fn assert_near(actual: Vec3, expected: Vec3, tolerance: f32) {
    assert!(
        (actual - expected).abs().max_element() <= tolerance,
        "{actual} is not within {tolerance} of {expected}"
    );
}

#[test]
fn begin_assigns_ids_and_reads_home_pose() {
    let (mut robot, _) = rrr();
    assert_eq!(robot.bus().commands()[0], BusCommand::AssignDevIds);
    assert_eq!(robot.robot_type(), "morobot_s_rrr");
    assert_eq!(robot.num_smart_servos(), 3);

    let pose = robot.act_pose().unwrap();
    assert_near(pose.position, Vec3::new(47.0 + 92.9 + 70.52, 0.0, 0.0), 1e-3);
    assert!(robot.pose_is_valid());
}

#[test]
fn move_to_pose_reaches_goal_and_caches_pose() {
    let (mut robot, _) = rrr();
    let goal = Vec3::new(150.0, 50.0, 0.0);

    let planned = robot.move_to_pose(goal).unwrap();
    assert!(robot.pose_is_valid());
    assert_near(planned.position, Vec3::new(150.0, 50.0, 0.0), 1.5);

    robot.wait_until_ready().unwrap();
    assert_eq!(robot.act_angles().unwrap(), vec![12, 92, 80]);

    // Direct bus access drops the cache; the next read measures the joints.
    robot.bus_mut();
    assert!(!robot.pose_is_valid());
    let measured = robot.act_pose().unwrap();
    assert_near(measured.position, planned.position, 1e-3);
    assert!((robot.act_orientation(Axis::Z).unwrap() - planned.orientation.z).abs() < 1e-3);
}

#[test]
fn relative_cartesian_moves_use_task_coordinates() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
    let pose = robot.move_in_direction(Axis::Y, -10.0).unwrap();
    assert_near(pose.position, Vec3::new(150.0, 40.0, 0.0), 1.5);

    let pose = robot.move_xyz(Vec3::new(-10.0, 20.0, 15.0)).unwrap();
    assert_near(pose.position, Vec3::new(140.0, 60.0, 0.0), 3.0);
    assert!((pose.orientation.z - 15.0).abs() < 2.0);
}

#[test]
fn unreachable_goal_leaves_joints_alone() {
    let (mut robot, _) = rrr();
    robot.bus_mut().clear_commands();
    let err = robot.move_to_pose(Vec3::new(400.0, 0.0, 0.0)).unwrap_err();
    assert!(err.is_unreachable());
    assert!(!robot.pose_is_valid());
    assert!(
        !robot
            .bus()
            .commands()
            .iter()
            .any(|c| matches!(c, BusCommand::MoveTo { .. }))
    );
}

#[test]
fn wait_times_out_on_runaway_motor() {
    let (mut robot, clock) = rrr();
    robot.bus_mut().set_pwm_move(1, 10.0).unwrap();

    let err = robot.wait_until_ready().unwrap_err();
    assert!(matches!(err, MorobotError::Timeout { .. }));
    assert!(clock.now() >= Duration::from_secs(15));

    robot.set_wait_after_each_move(false);
    robot.wait_until_ready().unwrap();
}

#[test]
fn move_home_returns_to_zero() {
    let (mut robot, _) = rrr();
    robot.move_to_angles(&[30, -40, 90]).unwrap();
    robot.move_home().unwrap();
    assert_eq!(robot.act_angles().unwrap(), vec![0, 0, 0]);
    assert!(
        robot
            .bus()
            .commands()
            .iter()
            .any(|c| matches!(c, BusCommand::SetInitAngle { id: 3, angle: 0, .. }))
    );
}

#[test]
fn relative_joint_moves_are_checked_against_current_angles() {
    let (mut robot, _) = rrr();
    robot.move_to_angles(&[90, 0, 0]).unwrap();
    robot.wait_until_ready().unwrap();

    let err = robot.move_angles(&[20, 0, 0]).unwrap_err();
    assert!(matches!(err, MorobotError::JointLimit { servo: 0, .. }));
    robot.move_angles(&[-20, 10, 0]).unwrap();
    robot.wait_until_ready().unwrap();
    assert_eq!(robot.act_angles().unwrap(), vec![70, 10, 0]);
    assert_eq!(robot.joint_limit(0, Bound::Max).unwrap(), 100.0);
}

#[test]
fn linear_move_ends_at_goal_with_motors_stopped() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();

    let goal = Vec3::new(170.0, 0.0, 0.0);
    robot.move_linear(goal, false, 5.0, false).unwrap();

    let pose = robot.act_pose().unwrap();
    assert_near(pose.position, Vec3::new(170.0, 0.0, 0.0), 6.0);
    assert!(pose.orientation.z.abs() < 4.0);
    for id in 1..=3 {
        assert_eq!(robot.bus_mut().speed(id).unwrap(), 0.0);
    }
}

#[test]
fn continuous_linear_move_also_arrives() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
    robot
        .move_linear(Vec3::new(160.0, 25.0, 0.0), true, 5.0, false)
        .unwrap();
    let pose = robot.act_pose().unwrap();
    assert_near(pose.position, Vec3::new(160.0, 25.0, 0.0), 8.0);
}

#[test]
fn trajectory_drives_with_pwm_and_stops() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
    robot.wait_until_ready().unwrap();
    robot.bus_mut().clear_commands();

    robot
        .trajectory_planning(&[Vec3::new(160.0, 25.0, 0.0)], false, PolynomOrder::Third)
        .unwrap();

    let pwm = pwm_commands(&robot);
    // Joint 0 turns up, joints 1 and 2 turn down.
    assert!(pwm[0].0 == 1 && pwm[0].1 > 0.0);
    assert!(pwm[1].0 == 2 && pwm[1].1 < 0.0);
    assert!(pwm[2].0 == 3 && pwm[2].1 < 0.0);
    let tail = &pwm[pwm.len() - 3..];
    assert!(tail.iter().all(|&(_, p)| p == 0.0));
}

#[test]
fn trajectory_keeps_moving_through_points_when_continuous() {
    let points = [Vec3::new(160.0, 25.0, 0.0), Vec3::new(170.0, 0.0, 0.0)];
    let mut counts = Vec::new();
    for continuous in [false, true] {
        let (mut robot, _) = rrr();
        robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
        robot.wait_until_ready().unwrap();
        robot.bus_mut().clear_commands();

        robot
            .trajectory_planning(&points, continuous, PolynomOrder::Third)
            .unwrap();
        let pwm = pwm_commands(&robot);
        assert!(pwm[pwm.len() - 3..].iter().all(|&(_, p)| p == 0.0));
        counts.push(pwm.len());
    }
    // 2 segments of 10 slots for 3 joints, plus a stop after every
    // segment or only at the very end.
    assert_eq!(counts, vec![60 + 3 * 2 + 3, 60 + 3]);
}

#[test]
fn fifth_order_trajectory_drives_towards_goal() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
    robot.wait_until_ready().unwrap();
    robot.bus_mut().clear_commands();

    robot
        .trajectory_planning(&[Vec3::new(160.0, 25.0, 0.0)], false, PolynomOrder::Fifth)
        .unwrap();

    let pwm = pwm_commands(&robot);
    assert!(pwm[0].0 == 1 && pwm[0].1 > 0.0);
    assert!(pwm[2].0 == 3 && pwm[2].1 < 0.0);
    assert!(pwm[pwm.len() - 3..].iter().all(|&(_, p)| p == 0.0));
    let angles = robot.act_angles().unwrap();
    assert!(angles[0] > 12, "{angles:?}");
    assert!(angles[2] < 80, "{angles:?}");
}

#[test]
fn linear_move_can_use_trajectory_planning() {
    let (mut robot, _) = rrr();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();
    robot.bus_mut().clear_commands();

    robot
        .move_linear(Vec3::new(160.0, 25.0, 0.0), false, 5.0, true)
        .unwrap();

    let pwm = pwm_commands(&robot);
    assert!(pwm.iter().any(|&(_, p)| p != 0.0));
    assert!(pwm[pwm.len() - 3..].iter().all(|&(_, p)| p == 0.0));
    assert!(
        !robot
            .bus()
            .commands()
            .iter()
            .any(|c| matches!(c, BusCommand::MoveTo { .. }))
    );
}

#[test]
fn blocked_linear_move_times_out_and_stops_motors() {
    // Joint 0 hits an obstacle at 15 degrees on its way to 35.
    let clock = SimClock::new();
    let bus = SimulatedServoBus::new(3, clock.clone()).with_hard_stops(1, -5.0, 15.0);
    let mut config = MorobotConfig::default();
    config.motion.timeout_ms = 2000;
    let mut robot = Morobot::new(ScaraRrr::new(), bus)
        .unwrap()
        .with_clock(clock)
        .with_config(config);
    robot.begin().unwrap();
    robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap();

    let err = robot
        .move_linear(Vec3::new(170.0, 0.0, 0.0), false, 5.0, false)
        .unwrap_err();
    assert!(matches!(err, MorobotError::Timeout { .. }));
    assert_eq!(robot.act_angle(0).unwrap(), 15);
    for servo in 0..3 {
        assert_eq!(robot.speed(servo).unwrap(), 0.0);
    }
}

#[test]
fn pose_cache_is_dropped_by_setup_calls() {
    let (mut robot, _) = rrr();
    robot.move_to_angles(&[30, 0, 0]).unwrap();
    robot.wait_until_ready().unwrap();
    let moved = robot.act_pose().unwrap();
    assert!(robot.pose_is_valid());

    robot.set_zero().unwrap();
    assert!(!robot.pose_is_valid());
    let zeroed = robot.act_pose().unwrap();
    assert_near(zeroed.position, Vec3::new(47.0 + 92.9 + 70.52, 0.0, 0.0), 1e-3);
    assert!((zeroed.position - moved.position).length() > 1.0);

    robot.release_brakes().unwrap();
    assert!(!robot.pose_is_valid());
    robot.act_pose().unwrap();

    robot.set_tcp_offset(Vec3::new(20.0, 0.0, 5.0));
    assert!(!robot.pose_is_valid());
    assert_eq!(robot.act_position(Axis::Z).unwrap(), 5.0);
}

#[test]
fn brakes_are_set_and_released_on_every_joint() {
    let (mut robot, _) = rrr();
    robot.bus_mut().clear_commands();

    robot.release_brakes().unwrap();
    for id in 1..=3 {
        assert_eq!(robot.bus().brake_state(id), Some(Brake::Loose));
    }
    robot.set_brakes().unwrap();
    for id in 1..=3 {
        assert_eq!(robot.bus().brake_state(id), Some(Brake::Braked));
    }
    assert_eq!(
        robot.bus().commands()[..3],
        [
            BusCommand::SetBrake { id: 1, brake: Brake::Loose },
            BusCommand::SetBrake { id: 2, brake: Brake::Loose },
            BusCommand::SetBrake { id: 3, brake: Brake::Loose },
        ]
    );
    assert_eq!(robot.bus().commands().len(), 6);
}

#[test]
fn motor_readings_are_passed_through() {
    let (mut robot, _) = rrr();
    assert_eq!(robot.temperature(0).unwrap(), 28.0);
    assert_eq!(robot.voltage(1).unwrap(), 12.0);
    assert_eq!(robot.current(2).unwrap(), 5.0);
    assert_eq!(robot.speed(0).unwrap(), 0.0);

    robot.move_to_angle(0, 90).unwrap();
    assert_eq!(robot.speed(0).unwrap(), 25.0);
    assert_eq!(robot.current(0).unwrap(), 15.0);
    assert!(matches!(
        robot.temperature(3),
        Err(MorobotError::InvalidServo { servo: 3, .. })
    ));
}

#[test]
fn failed_command_leaves_pose_invalid() {
    let clock = SimClock::new();
    let bus = FlakyBus {
        inner: SimulatedServoBus::new(3, clock.clone()),
        failing: None,
    };
    let mut robot = Morobot::new(ScaraRrr::new(), bus)
        .unwrap()
        .with_clock(clock);
    robot.begin().unwrap();
    robot.bus_mut().failing = Some(2);
    let home = robot.act_pose().unwrap();
    assert!(robot.pose_is_valid());

    // Servo 1 has already started when servo 2 fails.
    let err = robot.move_to_angles(&[30, 0, 0]).unwrap_err();
    assert!(matches!(err, MorobotError::Bus { id: 2, .. }));
    assert!(!robot.pose_is_valid());
    robot.wait_until_ready().unwrap();
    assert!((robot.act_pose().unwrap().position - home.position).length() > 1.0);

    let err = robot.move_angles(&[-10, 0, 0]).unwrap_err();
    assert!(matches!(err, MorobotError::Bus { id: 2, .. }));
    assert!(!robot.pose_is_valid());

    robot.act_pose().unwrap();
    let err = robot.move_to_pose(Vec3::new(150.0, 50.0, 0.0)).unwrap_err();
    assert!(matches!(err, MorobotError::Bus { id: 2, .. }));
    assert!(!robot.pose_is_valid());
}

#[test]
fn linear_axis_calibrates_against_end_stop() {
    let clock = SimClock::new();
    let bus = SimulatedServoBus::new(3, clock.clone())
        .with_raw_angle(3, 100.0)
        .with_hard_stops(3, -30.0, 900.0);
    let mut robot = Morobot::new(ScaraRrp::new(), bus)
        .unwrap()
        .with_clock(clock);
    robot.begin().unwrap();

    robot.move_z_axis_in(25.0).unwrap();
    assert_eq!(robot.act_angle(2).unwrap(), 0);
    assert_eq!(robot.bus_mut().raw_angle(3), Some(-30.0));
    assert!(robot.bus().commands().contains(&BusCommand::SetZero { id: 3 }));

    let pose = robot.move_to_pose(Vec3::new(150.0, 50.0, -10.0)).unwrap();
    robot.wait_until_ready().unwrap();
    assert_eq!(robot.act_angle(2).unwrap(), 163);
    assert!((pose.position.z + 10.0).abs() < 0.1);
}

#[test]
fn calibration_gives_up_without_end_stop() {
    let clock = SimClock::new();
    let bus = SimulatedServoBus::new(3, clock.clone());
    let mut config = MorobotConfig::default();
    config.calibration.max_steps = 20;
    let mut robot = Morobot::new(ScaraRrp::new(), bus)
        .unwrap()
        .with_clock(clock)
        .with_config(config);

    let err = robot.auto_calibrate_linear_axis(2, 25.0).unwrap_err();
    assert!(matches!(err, MorobotError::Calibration { .. }));
}

#[test]
fn config_is_loaded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("morobot.toml");
    std::fs::write(
        &path,
        r#"
        [robot]
        speed_rpm = 40
        tcp_offset = [20.0, 0.0, 5.0]

        [motion]
        timeout_ms = 2000
        "#,
    )
    .unwrap();

    let config = MorobotConfig::load(&path).unwrap();
    let clock = SimClock::new();
    let bus = SimulatedServoBus::new(3, clock.clone());
    let mut robot = Morobot::new(ScaraRrr::new(), bus)
        .unwrap()
        .with_clock(clock.clone())
        .with_config(config);
    robot.begin().unwrap();

    assert_eq!(robot.speed_rpm(), 40);
    assert_eq!(robot.act_position(Axis::Z).unwrap(), 5.0);

    robot.bus_mut().set_pwm_move(2, -5.0).unwrap();
    assert!(robot.wait_until_ready().is_err());
    assert!(clock.now() < Duration::from_secs(3));

    let missing = MorobotConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, MorobotError::Io { .. }));
}
