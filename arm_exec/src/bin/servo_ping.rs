//! Ping a servo and report its model number

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use servo_if::bus::StsBus;
use structopt::StructOpt;

// ---------------------------------------------------------------------------
// CLI OPTIONS
// ---------------------------------------------------------------------------

#[derive(StructOpt)]
#[structopt(name = "servo_ping", about = "Ping a servo and report its model number")]
struct Opt {
    /// Serial device the servo bus hangs off, e.g. /dev/ttyUSB0
    device: String,

    /// Servo bus ID to ping
    id: u8,

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
        .ping(opt.id)
        .wrap_err_with(|| format!("No response from servo {}", opt.id))?;

    println!("[ID:{:03}] ping succeeded, model number {}", opt.id, model);

    Ok(())
}
