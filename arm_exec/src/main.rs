//! # Arm Executable
//!
//! Homes the two joint stepper arm and then works through the command sequence given in the
//! parameters, forever or for a set number of commands.
//!
//! Runs against the Raspberry Pi GPIO when built for the Pi, or against simulated pins with
//! `--sim` (the only option on other targets).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{info, warn};
use std::path::PathBuf;
use structopt::StructOpt;

// Internal
use arm_lib::{
    app::ArmApp,
    axis_ctrl::{Axis, AxisCtrl},
    kinematics::KinematicsAdapter,
    motion_coord::MotionCoord,
    params::ArmExecParams,
    pulse_gen::{AccelStepper, StdClock},
    sim::{SimDelay, SimHallSensor, SimOutputPin},
    NUM_AXES,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Parameter file used when none is given, relative to the `params` directory of the software
/// root.
const DEFAULT_PARAMS_FILE: &str = "arm_exec.toml";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command line arguments.
#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec", about = "Two joint stepper arm executable")]
struct Args {
    /// Path to the parameter file. Defaults to `params/arm_exec.toml` under the software root.
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,

    /// Stop after this many commands, runs forever if not given.
    #[structopt(long)]
    cycles: Option<u64>,

    /// Use simulated pins instead of the GPIO.
    #[structopt(long)]
    sim: bool,

    /// Number of reads after which each simulated hall sensor triggers.
    #[structopt(long, default_value = "1000")]
    sim_trigger_polls: u64,

    /// Minimum level of log messages.
    #[structopt(long, default_value = "trace")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(args.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params = match args.params {
        Some(ref path) => util::params::load_path::<ArmExecParams, _>(path),
        None => util::params::load::<ArmExecParams>(DEFAULT_PARAMS_FILE),
    }
    .wrap_err("Could not load arm parameters")?;

    params.validate().wrap_err("Invalid arm parameters")?;

    info!("Parameters loaded");

    // ---- RUN ----

    if args.sim {
        run_sim(&params, &args)
    } else {
        run_hw(&params, &args)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run with simulated pins. Motion is still timed in real time.
fn run_sim(params: &ArmExecParams, args: &Args) -> Result<()> {
    info!(
        "Running in simulation, hall sensors trigger after {} reads",
        args.sim_trigger_polls
    );

    let clock = StdClock::default();
    let axis = |i: usize| {
        AxisCtrl::new(
            &params.axes[i],
            AccelStepper::new(SimOutputPin::new(), SimOutputPin::new(), clock),
        )
    };

    let coord = MotionCoord::new(
        [axis(0), axis(1)],
        [
            SimHallSensor::new(Some(args.sim_trigger_polls)),
            SimHallSensor::new(Some(args.sim_trigger_polls)),
        ],
        params.homing_cfgs(),
        params.homing_order,
        SimOutputPin::new(),
        SimDelay::sleeping(),
    )
    .wrap_err("Failed to initialise motion coordination")?;

    run(coord, params, SimDelay::sleeping(), args.cycles)
}

/// Run on the Raspberry Pi GPIO.
#[cfg(target_arch = "arm")]
fn run_hw(params: &ArmExecParams, args: &Args) -> Result<()> {
    use arm_lib::hw::Hw;

    let hw = Hw::new().wrap_err("Failed to initialise the GPIO")?;
    let clock = StdClock::default();

    let mut axes = Vec::with_capacity(NUM_AXES);
    let mut sensors = Vec::with_capacity(NUM_AXES);
    for axis_params in params.axes.iter() {
        let pins = hw
            .axis_pins(axis_params)
            .wrap_err_with(|| format!("Failed to acquire the {} axis pins", axis_params.name))?;

        axes.push(AxisCtrl::new(
            axis_params,
            AccelStepper::new(pins.step, pins.dir, clock),
        ));
        sensors.push(pins.hall);
    }

    let indicator = hw
        .output(params.indicator_pin)
        .wrap_err("Failed to acquire the indicator pin")?;

    let coord = MotionCoord::new(
        into_array(axes)?,
        into_array(sensors)?,
        params.homing_cfgs(),
        params.homing_order,
        indicator,
        hw.delay(),
    )
    .wrap_err("Failed to initialise motion coordination")?;

    run(coord, params, hw.delay(), args.cycles)
}

/// Without a GPIO to drive only simulation is possible.
#[cfg(not(target_arch = "arm"))]
fn run_hw(params: &ArmExecParams, args: &Args) -> Result<()> {
    warn!("No GPIO support on this target, falling back to simulation");
    run_sim(params, args)
}

#[cfg(target_arch = "arm")]
fn into_array<T>(items: Vec<T>) -> Result<[T; NUM_AXES]> {
    use color_eyre::eyre::eyre;
    use std::convert::TryInto;

    items
        .try_into()
        .map_err(|v: Vec<T>| eyre!("Expected {} axes, found {}", NUM_AXES, v.len()))
}

/// Home the arm and run the application loop.
fn run<A, S, L, D, W>(
    coord: MotionCoord<A, S, L, D, NUM_AXES>,
    params: &ArmExecParams,
    dwell: W,
    cycles: Option<u64>,
) -> Result<()>
where
    A: Axis,
    S: InputPin,
    L: OutputPin,
    D: DelayMs<u32>,
    W: DelayMs<u32>,
{
    let solver = params
        .ik_solver
        .build(params.ik_tolerance_mm, params.ik_max_iterations);

    let mut app = ArmApp::new(
        coord,
        KinematicsAdapter::new(solver),
        params.link_lengths_mm.clone(),
        params.sequence.clone(),
        params.dwell_ms,
        dwell,
    )
    .wrap_err("Failed to initialise the application")?;

    app.init().wrap_err("Failed to home the arm")?;

    info!("Initialisation complete, entering main loop");

    let stats = app.run(cycles).wrap_err("Arm application failed")?;

    info!(
        "Finished: {} commands completed, {} skipped",
        stats.completed, stats.skipped
    );

    Ok(())
}
