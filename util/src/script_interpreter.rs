//! # Arm motion script interpreter module
//!
//! This module provides an interpreter for arm motion scripts, allowing
//! sequences of arm commands to be executed at scripted times.
//!
//! A script is a plain text file of `time: command;` lines, where `time` is
//! the number of seconds after session start at which the command shall run
//! and `command` is a JSON-encoded [`ArmCmd`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;
use servo_if::cmd::{ArmCmd, CmdParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
pub struct Command {
    /// The time the command is supposed to execute at
    exec_time_s: f64,

    /// The arm command to run
    cmd: ArmCmd,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending`
/// to acquire a list of commands that need executing.
pub struct ScriptInterpreter {
    _script_path: PathBuf,
    cmds: VecDeque<Command>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)"
    )]
    InvalidTimestamp(String),

    #[error("Script contains an invalid command at {0} s: {1}")]
    InvalidCmd(f64, CmdParseError),
}

pub enum PendingCmds {
    None,
    Some(Vec<ArmCmd>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());

        // Check that the script file exists.
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        // Load the script into a string
        let script = match fs::read_to_string(script_path) {
            Ok(s) => s,
            Err(e) => return Err(ScriptError::ScriptLoadError(e)),
        };

        // Empty queue of commands
        let mut cmd_queue: VecDeque<Command> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .unwrap();

        let mut num_caps = 0;

        for cap in re.captures_iter(&script) {
            // Parse the exec time
            let exec_time_s: f64 = match cap.get(1).unwrap().as_str().parse() {
                Ok(t) => t,
                Err(e) => return Err(ScriptError::InvalidTimestamp(format!("{}", e))),
            };

            // Parse the command from the payload. The scripts contain JSON
            // only.
            let cmd = match ArmCmd::from_json(cap.get(3).unwrap().as_str()) {
                Ok(c) => c,
                Err(e) => return Err(ScriptError::InvalidCmd(exec_time_s, e)),
            };

            cmd_queue.push_back(Command { exec_time_s, cmd });

            num_caps += 1;
        }

        if num_caps == 0 {
            return Err(ScriptError::ScriptEmpty);
        }

        // Sort the queue so that the earliest commands come first
        cmd_queue
            .make_contiguous()
            .sort_by(|a, b| a.exec_time_s.partial_cmp(&b.exec_time_s).unwrap());

        Ok(Self {
            _script_path: path,
            cmds: cmd_queue,
        })
    }

    /// Get the commands which are pending execution at the current session
    /// time.
    pub fn get_pending(&mut self) -> PendingCmds {
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript;
        }

        let now_s = get_elapsed_seconds();
        let mut pending: Vec<ArmCmd> = Vec::new();

        while let Some(c) = self.cmds.front() {
            if c.exec_time_s <= now_s {
                // Unwrap is fine as front() just told us there's an element
                pending.push(self.cmds.pop_front().unwrap().cmd);
            } else {
                break;
            }
        }

        match pending.len() {
            0 => PendingCmds::None,
            _ => PendingCmds::Some(pending),
        }
    }

    /// Get the duration of the script in seconds.
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0.0,
        }
    }

    /// Get the number of commands loaded from the script.
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }
}
