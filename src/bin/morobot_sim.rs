//! morobot-sim: drives a simulated morobot from the command line.
//!
//! The arm runs on an in-memory servo chain with a virtual clock, so motions finish
//! instantly while logging what a real arm would do.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use glam::Vec3;
use morobot::{
    Gripper, Kinematics, Morobot, MorobotConfig, Program, ProgramRunner, RobotModel, SimClock,
    SimulatedServoBus,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Raw shaft angle at which the simulated linear axis starts.
const LINEAR_AXIS_START: f32 = 120.0;

/// Simulated end stop of the linear axis, slightly past its zero.
const LINEAR_AXIS_STOP: f32 = -20.0;

#[derive(Parser, Debug)]
#[command(name = "morobot-sim", version, about = "Drive a simulated morobot arm")]
struct Cli {
    /// TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Robot model, overrides the config.
    #[arg(short, long, global = true)]
    model: Option<RobotModel>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the arm's joints, links and limits as JSON.
    Describe,
    /// Print the TCP pose, optionally after moving to joint angles.
    Pose {
        /// Joint angles in degrees, comma separated.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        angles: Option<Vec<i64>>,
    },
    /// Move the TCP to a point in task coordinates.
    MoveTo {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
    },
    /// Move the TCP on a straight line to a point in task coordinates.
    Linear {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
        /// Pass waypoints without stopping.
        #[arg(long)]
        continuous: bool,
        /// Waypoint spacing in mm.
        #[arg(long)]
        resolution: Option<f32>,
        /// Follow the waypoints with a polynomial trajectory.
        #[arg(long)]
        trajectory: bool,
    },
    /// Run a TOML motion program.
    Run { program: PathBuf },
}

type SimRobot = Morobot<Box<dyn Kinematics + Send>, SimulatedServoBus>;

fn init_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("morobot=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("morobot=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

fn build_robot(mut config: MorobotConfig, model: Option<RobotModel>) -> Result<SimRobot> {
    if let Some(model) = model {
        config.robot.model = model;
    }
    let model = config.robot.model;
    let kinematics = model.build();
    let joints = kinematics.num_joints();

    let clock = SimClock::new();
    // One extra servo behind the arm for a gripper.
    let mut bus = SimulatedServoBus::new(joints + 1, clock.clone());
    if model == RobotModel::Rrp {
        let id = joints as u8;
        bus = bus
            .with_raw_angle(id, LINEAR_AXIS_START)
            .with_hard_stops(id, LINEAR_AXIS_STOP, 2000.0);
    }
    if let Some(params) = &config.gripper {
        bus = bus.with_hard_stops(
            joints as u8 + 1,
            params.deg_close_limit.min(params.deg_open_limit),
            params.deg_close_limit.max(params.deg_open_limit),
        );
    }

    let max_current = config.calibration.max_current;
    let mut robot = Morobot::new(kinematics, bus)?
        .with_clock(clock)
        .with_config(config);
    robot.begin()?;
    if model == RobotModel::Rrp {
        robot
            .auto_calibrate_linear_axis(joints as u8 - 1, max_current)
            .context("calibrating the linear axis")?;
    }
    robot.move_home()?;
    Ok(robot)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = MorobotConfig::load_or_default(cli.config.as_deref())
        .context("failed to load config")?;

    if let Command::Describe = cli.command {
        let mut config = config;
        if let Some(model) = cli.model {
            config.robot.model = model;
        }
        let kinematics = config.robot.model.build();
        let json = serde_json::to_string_pretty(kinematics.blueprint())?;
        println!("{json}");
        return Ok(());
    }

    let mut robot = build_robot(config, cli.model)?;

    match cli.command {
        Command::Describe => {}
        Command::Pose { angles } => {
            if let Some(angles) = angles {
                robot.move_to_angles(&angles)?;
                robot.wait_until_ready()?;
            }
            let pose = robot.act_pose()?;
            println!("{pose}");
        }
        Command::MoveTo { x, y, z } => {
            let pose = robot.move_to_pose(Vec3::new(x, y, z))?;
            robot.wait_until_ready()?;
            println!("{pose}");
        }
        Command::Linear {
            x,
            y,
            z,
            continuous,
            resolution,
            trajectory,
        } => {
            let resolution = resolution.unwrap_or(robot.config().motion.linear_resolution);
            if resolution <= 0.0 {
                bail!("resolution must be positive");
            }
            robot.move_linear(Vec3::new(x, y, z), continuous, resolution, trajectory)?;
            println!("{}", robot.act_pose()?);
        }
        Command::Run { program } => {
            let loaded = Program::load(&program)
                .with_context(|| format!("failed to load program {}", program.display()))?;
            let gripper = robot.config().gripper.clone();
            let mut runner = ProgramRunner::new(&mut robot);
            if let Some(params) = gripper {
                runner = runner.with_gripper(Gripper::new(params)?);
            }
            let executed = runner.run(&loaded)?;
            info!(executed, "program finished");
            println!("{}", robot.act_pose()?);
        }
    }
    Ok(())
}
