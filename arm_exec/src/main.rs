//! Main arm executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, parameters and position control module
//!     - Open the servo bus and configure every joint for step-mode moves
//!     - Seed a multi-turn tracker per joint from the absolute count register
//!     - Spawn one controller thread per joint, each driving its joint
//!       towards the moving target in bounded chunks
//!     - Run the operator loop: either the teleop key loop, or a motion
//!       script when a script path is given on the command line
//!
//! Bus access is serialised behind one lock, controller state behind another;
//! no thread holds both across a servo exchange.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use arm_lib::{
    joint_track::MultiTurnTracker,
    params::ArmExecParams,
    pos_ctrl::{InputData, PosCtrl},
    telem::TelemRecord,
    teleop::{self, TeleopAction},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Internal
use servo_if::{
    bus::{OperatingMode, SerialBus, StsBus},
    cmd::ArmCmd,
    joints::JointId,
};
use util::{
    archive::Archived,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingCmds, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Controller thread sleep when its joint is on target.
const CTRL_IDLE_PERIOD: Duration = Duration::from_millis(20);

/// Poll period while a controller thread waits for its chunk to finish.
const MOVING_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Poll period of the script executor.
const SCRIPT_POLL_PERIOD: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shared handles threaded through the operator loops.
struct Context {
    bus: Arc<Mutex<SerialBus>>,
    pos_ctrl: Arc<Mutex<PosCtrl>>,
    trackers: Arc<Mutex<HashMap<JointId, MultiTurnTracker>>>,
    session: Session,
    params: ArmExecParams,
}

/// Snapshot of the final state of a joint, saved on exit.
#[derive(Serialize)]
struct JointSnapshot {
    joint: JointId,
    target_steps: i64,
    abs_steps: i64,
    turns: i64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams =
        util::params::load("arm_exec.toml").wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- MODULE INITIALISATION ----

    let mut pos_ctrl = PosCtrl::default();
    pos_ctrl
        .init("pos_ctrl.toml", &session)
        .wrap_err("Failed to initialise PosCtrl")?;

    info!("PosCtrl initialised");

    // ---- LOAD SCRIPT IF GIVEN ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let mut script = None;
    if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

        info!(
            "Loaded script lasts {:.02} s and contains {} commands\n",
            si.get_duration(),
            si.get_num_cmds()
        );

        script = Some(si);
    } else if args.len() > 2 {
        return Err(eyre!("Usage: arm_exec [script_path]"));
    }

    // ---- BUS INITIALISATION ----

    let mut bus = StsBus::open(&params.serial_device, params.baud)
        .wrap_err("Failed to open the servo bus")?;

    info!("Servo bus open on {}", params.serial_device);

    // ---- JOINT CONFIGURATION ----

    let mut trackers: HashMap<JointId, MultiTurnTracker> = HashMap::new();

    for (joint, config) in pos_ctrl.joints() {
        let id = config.servo_id;

        // Relative chunked moves need step mode
        bus.set_mode(id, OperatingMode::Step)
            .wrap_err_with(|| format!("Failed to set step mode on joint {}", joint))?;

        // Disable the angle limits, the controller enforces its own bounds
        bus.unlock_eeprom(id)?;
        bus.set_angle_limits(id, 0, 0)?;
        bus.lock_eeprom(id)?;

        let (min, max) = bus.get_angle_limits(id)?;
        info!("{}: angle limits {} to {}", joint, min, max);

        // Seed the multi-turn tracker from the absolute count register
        let raw = bus
            .read_abs_count(id)
            .wrap_err_with(|| format!("Failed to read the absolute count of joint {}", joint))?;
        let turns = pos_ctrl.initial_turns(joint);
        let tracker = MultiTurnTracker::new(raw, turns);

        pos_ctrl.seed_target(joint, tracker.abs_steps());

        info!(
            "{}: raw count {} with {} initial turns, seeded at {} steps",
            joint,
            raw,
            turns,
            tracker.abs_steps()
        );

        trackers.insert(joint, tracker);
    }

    // ---- CONTROLLER THREADS ----

    let ctx = Context {
        bus: Arc::new(Mutex::new(bus)),
        pos_ctrl: Arc::new(Mutex::new(pos_ctrl)),
        trackers: Arc::new(Mutex::new(trackers)),
        session,
        params,
    };

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    let joints = ctx.pos_ctrl.lock().unwrap().joints();
    for (joint, config) in joints {
        let bus = ctx.bus.clone();
        let pos_ctrl = ctx.pos_ctrl.clone();
        let trackers = ctx.trackers.clone();
        let stop = stop.clone();

        handles.push(
            thread::Builder::new()
                .name(format!("ctrl_{}", joint))
                .spawn(move || {
                    controller_thread(joint, config.servo_id, bus, pos_ctrl, trackers, stop)
                })
                .wrap_err("Failed to spawn controller thread")?,
        );
    }

    info!("Initialisation complete, {} controller threads running", handles.len());

    // ---- OPERATOR LOOP ----

    match script {
        Some(si) => run_script(si, &ctx)?,
        None => run_key_loop(&ctx)?,
    }

    // ---- SHUTDOWN ----

    info!("Stopping controller threads");
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        if handle.join().is_err() {
            warn!("A controller thread panicked during shutdown");
        }
    }

    save_final_state(&ctx);
    ctx.session.exit();

    info!("Bus closed. Bye.");

    Ok(())
}

/// Closed-loop controller for one joint.
///
/// Each cycle reads the tracked position, asks PosCtrl for a bounded chunk
/// towards the target, executes it over the bus, waits for the servo to stop
/// and folds the fresh absolute count back into the tracker.
fn controller_thread(
    joint: JointId,
    servo_id: u8,
    bus: Arc<Mutex<SerialBus>>,
    pos_ctrl: Arc<Mutex<PosCtrl>>,
    trackers: Arc<Mutex<HashMap<JointId, MultiTurnTracker>>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let abs_steps = match trackers.lock().unwrap().get(&joint) {
            Some(t) => t.abs_steps(),
            None => break,
        };

        // One controller cycle
        let demand = {
            let mut ctrl = pos_ctrl.lock().unwrap();
            let mut input = InputData::default();
            input.abs_steps.insert(joint, abs_steps);

            match ctrl.proc(&input) {
                Ok((output, _)) => {
                    if let Err(e) = ctrl.write() {
                        warn!("[ctrl_{}] archive write failed: {}", joint, e);
                    }
                    output.demands.get(&joint).copied()
                }
                Err(e) => {
                    warn!("[ctrl_{}] processing error: {}", joint, e);
                    None
                }
            }
        };

        let demand = match demand {
            Some(d) => d,
            None => {
                // On target: keep the tracker fresh at idle rate
                refresh_tracker(joint, servo_id, &bus, &trackers);
                thread::sleep(CTRL_IDLE_PERIOD);
                continue;
            }
        };

        // Execute the chunk. The bus lock is taken per exchange so other
        // joints interleave their traffic.
        let sent = {
            let mut bus = bus.lock().unwrap();
            bus.write_position(servo_id, demand.delta_steps, demand.speed, demand.acc)
        };
        if let Err(e) = sent {
            warn!("[ctrl_{}] move demand failed: {}", joint, e);
            thread::sleep(CTRL_IDLE_PERIOD);
            continue;
        }

        // Wait for the servo to stop without hogging the bus
        while !stop.load(Ordering::Relaxed) {
            let moving = { bus.lock().unwrap().read_moving(servo_id) };
            match moving {
                Ok(true) => thread::sleep(MOVING_POLL_PERIOD),
                Ok(false) => break,
                Err(e) => {
                    warn!("[ctrl_{}] moving poll failed: {}", joint, e);
                    break;
                }
            }
        }

        refresh_tracker(joint, servo_id, &bus, &trackers);
    }
}

/// Fold a fresh absolute count reading into a joint's tracker.
fn refresh_tracker(
    joint: JointId,
    servo_id: u8,
    bus: &Arc<Mutex<SerialBus>>,
    trackers: &Arc<Mutex<HashMap<JointId, MultiTurnTracker>>>,
) {
    let raw = { bus.lock().unwrap().read_abs_count(servo_id) };
    match raw {
        Ok(raw) => {
            if let Some(tracker) = trackers.lock().unwrap().get_mut(&joint) {
                tracker.update(raw);
            }
        }
        Err(e) => warn!("[ctrl_{}] absolute count read failed: {}", joint, e),
    }
}

/// Run the teleop key loop until the operator quits.
///
/// Input is line-oriented: the first character of each entered line selects
/// the action.
fn run_key_loop(ctx: &Context) -> Result<(), Report> {
    info!("Entering teleop key loop");
    info!("    q/a w/s e/d r/f t/g jog joints, p info, i dump, - zero, space stop, x quit");

    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = line.wrap_err("Failed to read from stdin")?;
        let key = match line.trim().chars().next() {
            Some(c) => c,
            None => continue,
        };

        match teleop::action_for_key(key) {
            Some(TeleopAction::Quit) => break,
            Some(action) => execute_action(action, ctx),
            None => info!("Unknown key '{}', no action taken", key),
        }
    }

    Ok(())
}

/// Execute one teleop action.
fn execute_action(action: TeleopAction, ctx: &Context) {
    match action {
        TeleopAction::Jog { joint, dir } => {
            let delta = dir * ctx.params.jog_step_deg;
            if let Err(e) = ctx
                .pos_ctrl
                .lock()
                .unwrap()
                .update_target_angle(joint, delta)
            {
                warn!("Jog failed: {}", e);
            }
        }
        TeleopAction::Info => show_all_positions(ctx),
        TeleopAction::DumpRegisters => dump_registers(ctx),
        TeleopAction::Zero => {
            info!("Sending all joints to zero");
            let mut ctrl = ctx.pos_ctrl.lock().unwrap();
            for (joint, _) in ctrl.joints() {
                ctrl.seed_target(joint, 0);
            }
        }
        TeleopAction::StopAll => {
            info!("Stopping all joints at their current positions");
            let trackers = ctx.trackers.lock().unwrap();
            let mut ctrl = ctx.pos_ctrl.lock().unwrap();
            for (joint, tracker) in trackers.iter() {
                ctrl.seed_target(*joint, tracker.abs_steps());
            }
        }
        TeleopAction::Quit => (),
    }
}

/// Log the tracked and sensed state of every joint.
fn show_all_positions(ctx: &Context) {
    let joints = ctx.pos_ctrl.lock().unwrap().joints();

    for (joint, config) in joints {
        let status = { ctx.bus.lock().unwrap().read_status(config.servo_id) };

        let status = match status {
            Ok(s) => s,
            Err(e) => {
                warn!("{}: status read failed: {}", joint, e);
                continue;
            }
        };

        let acc = {
            ctx.bus
                .lock()
                .unwrap()
                .read_acceleration(config.servo_id)
                .unwrap_or(0)
        };

        let (abs_steps, turns) = match ctx.trackers.lock().unwrap().get(&joint) {
            Some(t) => (t.abs_steps(), t.turns()),
            None => continue,
        };
        let target = ctx
            .pos_ctrl
            .lock()
            .unwrap()
            .target_steps(joint)
            .unwrap_or(abs_steps);

        info!(
            "[{:8}] speed:{} acc:{} (~{} steps/s^2) load:{:.1}% current:{:.1}mA abs:{} raw:{} turns:{} target:{} err:{}",
            joint.to_string(),
            status.speed,
            acc,
            acc as u32 * 100,
            status.load_pct,
            status.current_ma,
            abs_steps,
            status.abs_count,
            turns,
            target,
            target - abs_steps
        );

        // Also archive the sample so sessions keep a record of inspections
        ctx.session.save(
            format!("info_{}.json", joint),
            TelemRecord::from_status(config.servo_id, &status),
        );
    }
}

/// Dump the register table of every servo into the session.
fn dump_registers(ctx: &Context) {
    let joints = ctx.pos_ctrl.lock().unwrap().joints();
    for (joint, config) in joints {
        let dump = { ctx.bus.lock().unwrap().dump_registers(config.servo_id) };

        match dump {
            Ok(dump) => {
                for (addr, value) in &dump {
                    info!("[{:8}] reg[{:#04x}] = {}", joint.to_string(), addr, value);
                }
                // Timestamped so repeated dumps in one session all survive
                util::session::save_with_timestamp(
                    format!("register_dump_{}.json", joint),
                    dump,
                );
            }
            Err(e) => warn!("{}: register dump failed: {}", joint, e),
        }
    }
}

/// Run a motion script to its end, then wait for every joint to settle.
fn run_script(mut si: ScriptInterpreter, ctx: &Context) -> Result<(), Report> {
    info!("Executing motion script");

    loop {
        match si.get_pending() {
            PendingCmds::None => thread::sleep(SCRIPT_POLL_PERIOD),
            PendingCmds::Some(cmds) => {
                for cmd in cmds {
                    execute_cmd(cmd, ctx);
                }
            }
            PendingCmds::EndOfScript => break,
        }
    }

    info!("End of script, waiting for joints to settle");

    while !all_on_target(ctx) {
        thread::sleep(SCRIPT_POLL_PERIOD);
    }

    Ok(())
}

/// Execute one scripted arm command.
fn execute_cmd(cmd: ArmCmd, ctx: &Context) {
    match cmd {
        ArmCmd::Rotation { dems } => {
            let mut ctrl = ctx.pos_ctrl.lock().unwrap();
            for (joint, angle_deg) in dems.pos_deg {
                if let Err(e) = ctrl.set_target_angle(joint, angle_deg) {
                    warn!("Rotation demand failed: {}", e);
                }
            }
        }
        ArmCmd::Jog { joint, delta_deg } => {
            if let Err(e) = ctx
                .pos_ctrl
                .lock()
                .unwrap()
                .update_target_angle(joint, delta_deg)
            {
                warn!("Jog demand failed: {}", e);
            }
        }
        ArmCmd::InverseKinematics { x_m, y_m, phi_rad } => {
            match ctx
                .pos_ctrl
                .lock()
                .unwrap()
                .apply_ik_target(x_m, y_m, phi_rad)
            {
                Ok(joints) => info!(
                    "IK target ({:.3}, {:.3}) solved: shoulder {:.1}°, elbow {:.1}°, wrist {:.1}°",
                    x_m,
                    y_m,
                    joints.shoulder_rad.to_degrees(),
                    joints.elbow_rad.to_degrees(),
                    joints.wrist_rad.to_degrees()
                ),
                Err(e) => warn!("IK demand failed: {}", e),
            }
        }
        ArmCmd::Zero => execute_action(TeleopAction::Zero, ctx),
        ArmCmd::Stop => execute_action(TeleopAction::StopAll, ctx),
        ArmCmd::Info => show_all_positions(ctx),
        ArmCmd::Wheel { .. } => {
            warn!("Wheel commands are not available in the position teleop session")
        }
    }
}

/// Whether every joint's tracked position matches its target.
fn all_on_target(ctx: &Context) -> bool {
    let ctrl = ctx.pos_ctrl.lock().unwrap();
    let trackers = ctx.trackers.lock().unwrap();

    trackers.iter().all(|(joint, tracker)| {
        ctrl.target_steps(*joint)
            .map(|target| target == tracker.abs_steps())
            .unwrap_or(true)
    })
}

/// Save the final joint state into the session.
fn save_final_state(ctx: &Context) {
    let ctrl = ctx.pos_ctrl.lock().unwrap();
    let trackers = ctx.trackers.lock().unwrap();

    let snapshot: Vec<JointSnapshot> = trackers
        .iter()
        .map(|(&joint, tracker)| JointSnapshot {
            joint,
            target_steps: ctrl.target_steps(joint).unwrap_or(tracker.abs_steps()),
            abs_steps: tracker.abs_steps(),
            turns: tracker.turns(),
        })
        .collect();

    ctx.session.save("final_state.json", snapshot);
}
