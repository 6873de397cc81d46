//! Guided servo provisioning tool
//!
//! Unlocks the servo's EEPROM, programs the operating mode, angle limits,
//! optional position offset and optional new bus ID, locks the EEPROM again
//! and runs verification moves. Every write is gated behind an explicit
//! confirmation because a mis-provisioned servo can lunge on power-up.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use servo_if::bus::{OperatingMode, SerialBus, StsBus};
use servo_if::protocol::{as_signed_16, MAX_ID};
use servo_if::registers;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Speed and acceleration of the verification moves.
const VERIFY_SPEED: u16 = 2400;
const VERIFY_ACC: u8 = 50;

/// Position poll period of the background reporter thread.
const POLL_PERIOD: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// CLI OPTIONS
// ---------------------------------------------------------------------------

#[derive(StructOpt)]
#[structopt(name = "servo_setup", about = "Provision a servo's mode, limits and ID")]
struct Opt {
    /// Serial device the servo bus hangs off, e.g. /dev/ttyUSB0
    device: String,

    /// Current bus ID of the servo
    current_id: u8,

    /// New bus ID to assign
    #[structopt(long)]
    new_id: Option<u8>,

    /// Operating mode to program: position or wheel
    #[structopt(long, default_value = "position", parse(try_from_str = parse_mode))]
    mode: OperatingMode,

    /// Minimum angle limit in ticks (position mode)
    #[structopt(long, default_value = "0")]
    min_limit: u16,

    /// Maximum angle limit in ticks (position mode)
    #[structopt(long, default_value = "17000")]
    max_limit: u16,

    /// Hardware position offset to program, e.g. 16383 for a midpoint zero
    #[structopt(long)]
    offset: Option<u16>,

    /// Skip the verification moves
    #[structopt(long)]
    no_verify: bool,

    /// Serial baud rate
    #[structopt(long, default_value = "1000000")]
    baud: u32,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut bus =
        StsBus::open(&opt.device, opt.baud).wrap_err("Failed to open the servo bus")?;

    let model = bus
        .ping(opt.current_id)
        .wrap_err_with(|| format!("No response from servo {}", opt.current_id))?;
    println!(
        "[ID:{:03}] responding, model number {}",
        opt.current_id, model
    );

    if !confirm("Reconfigure this servo?") {
        println!("Nothing written, bye.");
        return Ok(());
    }

    // ---- EEPROM CONFIGURATION ----

    bus.unlock_eeprom(opt.current_id)?;
    println!("EEPROM unlocked");

    bus.set_mode(opt.current_id, opt.mode)?;
    let mode = bus.get_mode(opt.current_id)?;
    println!("Operating mode set to {:?}", mode);

    if opt.mode == OperatingMode::Position {
        bus.set_angle_limits(opt.current_id, opt.min_limit, opt.max_limit)?;

        let (min, max) = bus.get_angle_limits(opt.current_id)?;
        println!(
            "Angle limits set in EEPROM: {} to {}",
            as_signed_16(min),
            as_signed_16(max)
        );
    }

    if let Some(offset) = opt.offset {
        bus.set_position_offset(opt.current_id, offset)?;
        println!("Position offset set to {}", offset);
    }

    let id = match opt.new_id {
        Some(new_id) if new_id > MAX_ID => {
            println!("New ID {} is above the bus limit {}, keeping the old one", new_id, MAX_ID);
            opt.current_id
        }
        Some(new_id) => {
            bus.set_id(opt.current_id, new_id)?;
            println!("Servo ID changed to {}", new_id);
            new_id
        }
        None => opt.current_id,
    };

    bus.lock_eeprom(id)?;
    println!("EEPROM locked");

    // ---- VERIFICATION ----

    if opt.no_verify {
        return Ok(());
    }

    match opt.mode {
        OperatingMode::Position => verify_position_mode(bus, id)?,
        OperatingMode::Wheel => verify_wheel_mode(bus, id)?,
        OperatingMode::Step => (),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_mode(s: &str) -> Result<OperatingMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "position" => Ok(OperatingMode::Position),
        "wheel" => Ok(OperatingMode::Wheel),
        "step" => Ok(OperatingMode::Step),
        other => Err(format!("{} is not a mode (position, wheel or step)", other)),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

/// Drive the servo through two large position moves while a background
/// thread reports the present position.
fn verify_position_mode(bus: SerialBus, id: u8) -> Result<()> {
    let bus = Arc::new(std::sync::Mutex::new(bus));
    let stop = Arc::new(AtomicBool::new(false));

    // Background position reporter
    let poll_bus = bus.clone();
    let poll_stop = stop.clone();
    let poller = thread::spawn(move || {
        while !poll_stop.load(Ordering::Relaxed) {
            let raw = { poll_bus.lock().unwrap().read_u16(id, registers::PRESENT_POSITION) };
            if let Ok(raw) = raw {
                println!("Present position: {}", as_signed_16(raw));
            }
            thread::sleep(POLL_PERIOD);
        }
    });

    if confirm("Move to the far position (32766)?") {
        {
            let mut bus = bus.lock().unwrap();
            bus.write_position(id, 32766, VERIFY_SPEED, VERIFY_ACC)?;
        }
        wait_stopped_shared(&bus, id)?;
    }

    if confirm("Move back to zero?") {
        {
            let mut bus = bus.lock().unwrap();
            bus.write_position(id, 0, VERIFY_SPEED, VERIFY_ACC)?;
        }
        wait_stopped_shared(&bus, id)?;
    }

    stop.store(true, Ordering::Relaxed);
    let _ = poller.join();

    println!("Verification complete");
    Ok(())
}

/// Spin the servo briefly in each direction.
fn verify_wheel_mode(mut bus: SerialBus, id: u8) -> Result<()> {
    if !confirm("Spin the servo to verify wheel mode?") {
        return Ok(());
    }

    bus.write_wheel_speed(id, VERIFY_SPEED as i32, VERIFY_ACC)?;
    thread::sleep(Duration::from_secs(1));

    bus.write_wheel_speed(id, -(VERIFY_SPEED as i32), VERIFY_ACC)?;
    thread::sleep(Duration::from_secs(1));

    bus.write_wheel_speed(id, 0, VERIFY_ACC)?;

    println!("Verification complete");
    Ok(())
}

/// Poll the moving flag on a shared bus until the servo stops.
fn wait_stopped_shared(bus: &Arc<std::sync::Mutex<SerialBus>>, id: u8) -> Result<()> {
    loop {
        let moving = { bus.lock().unwrap().read_moving(id)? };
        if !moving {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(50));
    }
}
