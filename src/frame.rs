//! Wire format of the SDS011 serial protocol.
//!
//! Command frame sent to the sensor (19 bytes):
//!
//! ```text
//! AA B4 CMD MODE VALUE 00*10 FF FF CS AB
//! ```
//!
//! Frame received from the sensor (10 bytes):
//!
//! ```text
//! AA C5 CMD D1 D2 D3 ID1 ID2 CS AB   reply to a command
//! AA C0 D1  D2 D3 D4 ID1 ID2 CS AB   data report
//! ```
//!
//! The checksum is the byte sum, modulo 256, of everything between the role
//! marker and the checksum itself.

use core::fmt::Debug;

use embedded_io::{Error as _, ErrorKind, Read};
use log::{debug, trace};

use crate::config::DeviceId;
use crate::constants::*;
use crate::error::Error;

/// Commands understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReportMode,
    Request,
    DeviceId,
    WorkState,
    Firmware,
    DutyCycle,
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        match command {
            Command::ReportMode => 0x02,
            Command::Request => 0x04,
            Command::DeviceId => 0x05,
            Command::WorkState => 0x06,
            Command::Firmware => 0x07,
            Command::DutyCycle => 0x08,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x02 => Ok(Command::ReportMode),
            0x04 => Ok(Command::Request),
            0x05 => Ok(Command::DeviceId),
            0x06 => Ok(Command::WorkState),
            0x07 => Ok(Command::Firmware),
            0x08 => Ok(Command::DutyCycle),
            other => Err(other),
        }
    }
}

/// Whether a command reads or writes a sensor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Getting,
    Setting,
}

impl From<CommandMode> for u8 {
    fn from(mode: CommandMode) -> u8 {
        match mode {
            CommandMode::Getting => 0x00,
            CommandMode::Setting => 0x01,
        }
    }
}

/// The kind of frame a read is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A reply (`0xC5`) echoing the given command.
    Reply(Command),
    /// A data report (`0xC0`), either pushed or answering a request.
    DataReport,
}

impl Expect {
    /// Role marker the expected frame must carry.
    pub fn role(&self) -> u8 {
        match self {
            Expect::Reply(_) => REPLY_ID,
            Expect::DataReport => DATA_REPORT_ID,
        }
    }
}

/// Sums a byte span modulo 256.
pub fn checksum(span: &[u8]) -> u8 {
    span.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Builds a complete command frame, checksum included.
pub fn build_command_frame(command: Command, payload: [u8; 2]) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    frame[2] = command.into();
    frame[3] = payload[0];
    frame[4] = payload[1];
    // Bytes 5..=14 stay zero.
    frame[3 + COMMAND_PAYLOAD_LEN] = COMMAND_TERMINATOR;
    frame[4 + COMMAND_PAYLOAD_LEN] = COMMAND_TERMINATOR;
    frame[COMMAND_LEN - 2] = checksum(&frame[2..COMMAND_LEN - 2]);
    frame[COMMAND_LEN - 1] = TAIL;
    frame
}

/// A 10-byte frame received from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; RESPONSE_LEN],
}

impl Frame {
    /// Wraps raw bytes without validating them.
    pub fn from_bytes(bytes: [u8; RESPONSE_LEN]) -> Self {
        Frame { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; RESPONSE_LEN] {
        &self.bytes
    }

    pub fn role(&self) -> u8 {
        self.bytes[1]
    }

    /// Echoed command code of a reply.
    pub fn command(&self) -> u8 {
        self.bytes[2]
    }

    /// Reply payload: the three data bytes after the command code and the device id.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[3..RESPONSE_LEN - 2]
    }

    /// Measurement bytes of a data report.
    pub fn data(&self) -> &[u8] {
        &self.bytes[2..6]
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.bytes[6], self.bytes[7])
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[RESPONSE_LEN - 2]
    }

    /// Checks the received checksum against the frame content.
    pub fn verify_checksum<E: Debug>(&self) -> Result<(), Error<E>> {
        let calculated = checksum(&self.bytes[2..RESPONSE_LEN - 2]);
        if calculated != self.checksum() {
            return Err(Error::Checksum {
                calculated,
                received: self.checksum(),
            });
        }
        Ok(())
    }
}

// Reads one byte, `None` meaning the stream had nothing within its timeout.
fn read_byte<S: Read>(serial: &mut S) -> Result<Option<u8>, Error<S::Error>> {
    let mut byte = [0u8; 1];
    match serial.read(&mut byte) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(byte[0])),
        Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

// Fills `buf` until it is full or the stream goes silent, returning the byte count.
fn read_until_silent<S: Read>(serial: &mut S, buf: &mut [u8]) -> Result<usize, Error<S::Error>> {
    let mut filled = 0;
    while filled < buf.len() {
        match serial.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Reads the next frame of the expected kind from the stream.
///
/// Bytes before the head marker are skipped. Returns `Ok(None)` when the
/// stream has nothing to offer within its read timeout; what that silence
/// means is up to the caller. Device identity is not checked here.
pub fn read_frame<S: Read>(
    serial: &mut S,
    expected: Expect,
) -> Result<Option<Frame>, Error<S::Error>> {
    loop {
        match read_byte(serial)? {
            None => return Ok(None),
            Some(HEAD) => break,
            Some(other) => trace!("Skipping byte {:02X} before frame head", other),
        }
    }

    let mut bytes = [0u8; RESPONSE_LEN];
    bytes[0] = HEAD;
    let Some(role) = read_byte(serial)? else {
        return Err(Error::MalformedData {
            expected: RESPONSE_LEN,
            received: 1,
        });
    };
    if role != expected.role() {
        return Err(Error::Framing { expected, role });
    }
    bytes[1] = role;

    let filled = read_until_silent(serial, &mut bytes[2..])?;
    if filled < RESPONSE_LEN - 2 {
        debug!("Truncated frame: {:02X?}", &bytes[..2 + filled]);
        return Err(Error::MalformedData {
            expected: RESPONSE_LEN,
            received: 2 + filled,
        });
    }

    let frame = Frame::from_bytes(bytes);
    debug!("Received frame: {:02X?}", frame.as_bytes());
    frame.verify_checksum::<S::Error>()?;
    if bytes[RESPONSE_LEN - 1] != TAIL {
        return Err(Error::BadTail {
            received: bytes[RESPONSE_LEN - 1],
        });
    }
    if let Expect::Reply(command) = expected {
        if frame.command() != u8::from(command) {
            return Err(Error::Protocol {
                expected: command,
                received: frame.command(),
            });
        }
    }
    Ok(Some(frame))
}
