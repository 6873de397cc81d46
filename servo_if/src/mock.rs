//! # Mock servo port
//!
//! A [`MockServoPort`] stands in for the serial port in tests: it implements
//! `Read` and `Write`, decodes the instruction packets written to it against
//! a bank of simulated servo register files, and queues up the status packets
//! a real bus would produce. Position demands move the simulated servo
//! instantly but hold the moving flag up for a couple of polls so callers
//! exercise their wait loops.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};

use crate::protocol::{self, Instruction, BROADCAST_ID, HEADER};
use crate::registers;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Size of the simulated register file.
const REG_FILE_SIZE: usize = 128;

/// Number of moving-flag reads reporting motion after a demand.
const MOVING_POLLS: u8 = 2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One simulated servo.
struct MockServo {
    regs: [u8; REG_FILE_SIZE],
    moving_polls: u8,
}

/// A bank of simulated servos behind a fake serial port.
pub struct MockServoPort {
    servos: HashMap<u8, MockServo>,

    /// Bytes written by the bus, not yet parsed into a full packet.
    rx: Vec<u8>,

    /// Response bytes waiting to be read by the bus.
    tx: VecDeque<u8>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MockServo {
    fn new(id: u8) -> Self {
        let mut regs = [0u8; REG_FILE_SIZE];
        regs[registers::ID as usize] = id;
        LittleEndian::write_u16(
            &mut regs[registers::MODEL_NUMBER as usize..],
            MockServoPort::MODEL_NUMBER,
        );
        Self {
            regs,
            moving_polls: 0,
        }
    }

    fn read_regs(&mut self, addr: u8, len: u8) -> Vec<u8> {
        // Refresh the moving flag before serving it
        let covers_moving =
            addr <= registers::MOVING && registers::MOVING < addr.saturating_add(len);
        if covers_moving {
            self.regs[registers::MOVING as usize] = (self.moving_polls > 0) as u8;
            self.moving_polls = self.moving_polls.saturating_sub(1);
        }

        self.regs[addr as usize..(addr + len) as usize].to_vec()
    }

    fn write_regs(&mut self, addr: u8, data: &[u8]) {
        self.regs[addr as usize..addr as usize + data.len()].copy_from_slice(data);

        // A write covering the goal position register is a move demand
        let covers_goal = addr <= registers::GOAL_POSITION
            && (addr as usize + data.len()) > registers::GOAL_POSITION as usize + 1;
        if covers_goal {
            self.apply_move();
        }
    }

    /// Apply a freshly-latched goal position to the present position and
    /// multi-turn count.
    fn apply_move(&mut self) {
        let goal = protocol::decode_sign_magnitude(LittleEndian::read_u16(
            &self.regs[registers::GOAL_POSITION as usize..],
        ));
        let present = protocol::as_signed_16(LittleEndian::read_u16(
            &self.regs[registers::PRESENT_POSITION as usize..],
        ));

        let delta = match self.regs[registers::OPERATING_MODE as usize] {
            // Position mode: the goal is absolute
            0 => goal - present,
            // Step mode: the goal is a relative step count
            3 => goal,
            // Wheel mode latches no position goals
            _ => return,
        };

        let new_present = (present + delta) as u16;
        LittleEndian::write_u16(
            &mut self.regs[registers::PRESENT_POSITION as usize..],
            new_present,
        );

        let abs = LittleEndian::read_u16(&self.regs[registers::ABS_POSITION as usize..]);
        let new_abs = (abs as i32).wrapping_add(delta) as u16;
        LittleEndian::write_u16(&mut self.regs[registers::ABS_POSITION as usize..], new_abs);

        self.moving_polls = MOVING_POLLS;
    }
}

impl MockServoPort {
    /// Model number reported by all simulated servos.
    pub const MODEL_NUMBER: u16 = 777;

    /// Create a port with one simulated servo per given ID.
    pub fn with_servos(ids: &[u8]) -> Self {
        Self {
            servos: ids.iter().map(|&id| (id, MockServo::new(id))).collect(),
            rx: Vec::new(),
            tx: VecDeque::new(),
        }
    }

    /// Poke a register of a simulated servo directly.
    pub fn set_register_u16(&mut self, id: u8, addr: u8, value: u16) {
        if let Some(servo) = self.servos.get_mut(&id) {
            LittleEndian::write_u16(&mut servo.regs[addr as usize..], value);
        }
    }

    /// Read a register of a simulated servo directly.
    pub fn get_register_u16(&self, id: u8, addr: u8) -> Option<u16> {
        self.servos
            .get(&id)
            .map(|s| LittleEndian::read_u16(&s.regs[addr as usize..]))
    }

    /// Try to parse and execute every complete packet in the rx buffer.
    fn pump(&mut self) {
        loop {
            // Drop noise ahead of a header
            while self.rx.len() >= 2 && self.rx[..2] != HEADER {
                self.rx.remove(0);
            }
            if self.rx.len() < 4 {
                return;
            }

            let length = self.rx[3] as usize;
            if self.rx.len() < 4 + length {
                return;
            }

            let packet: Vec<u8> = self.rx.drain(..4 + length).collect();
            self.execute(&packet);
        }
    }

    fn execute(&mut self, packet: &[u8]) {
        let id = packet[2];
        let length = packet[3];
        let instr = packet[4];
        let params = &packet[5..packet.len() - 1];

        // A real servo ignores corrupt packets
        if protocol::checksum(id, length, instr, params) != packet[packet.len() - 1] {
            return;
        }

        let broadcast = id == BROADCAST_ID;
        let targets: Vec<u8> = if broadcast {
            self.servos.keys().copied().collect()
        } else if self.servos.contains_key(&id) {
            vec![id]
        } else {
            // Nobody home: no response at all
            return;
        };

        for target in targets {
            let response = match instr {
                i if i == Instruction::Ping as u8 => Some(Vec::new()),
                i if i == Instruction::Read as u8 && params.len() == 2 => {
                    let servo = self.servos.get_mut(&target).unwrap();
                    Some(servo.read_regs(params[0], params[1]))
                }
                i if i == Instruction::Write as u8 && !params.is_empty() => {
                    let servo = self.servos.get_mut(&target).unwrap();
                    servo.write_regs(params[0], &params[1..]);
                    Some(Vec::new())
                }
                _ => None,
            };

            if broadcast {
                continue;
            }

            if let Some(resp_params) = response {
                self.queue_status(target, 0, &resp_params);
            }
        }

        // An ID register write re-keys the servo
        let rekeys: Vec<(u8, u8)> = self
            .servos
            .iter()
            .filter(|(key, servo)| servo.regs[registers::ID as usize] != **key)
            .map(|(key, servo)| (*key, servo.regs[registers::ID as usize]))
            .collect();
        for (old, new) in rekeys {
            if let Some(servo) = self.servos.remove(&old) {
                self.servos.insert(new, servo);
            }
        }
    }

    fn queue_status(&mut self, id: u8, error: u8, params: &[u8]) {
        let length = (params.len() + 2) as u8;
        self.tx.extend(&HEADER);
        self.tx.push_back(id);
        self.tx.push_back(length);
        self.tx.push_back(error);
        self.tx.extend(params);
        self.tx
            .push_back(protocol::checksum(id, length, error, params));
    }
}

impl Write for MockServoPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.rx.extend_from_slice(buf);
        self.pump();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Read for MockServoPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.tx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
