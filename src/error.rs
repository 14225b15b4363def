use core::fmt::Debug;
use core::time::Duration;

use crate::config::DeviceId;
use crate::frame::{Command, Expect};

/// Errors returned by [`SensorLink`](crate::SensorLink) operations.
///
/// `E` is the error type of the underlying byte stream.
#[derive(Debug, thiserror::Error)]
pub enum Error<E: Debug> {
    /// The stream failed to read, write or flush.
    #[error("I/O error: {0:?}")]
    Io(E),

    /// The stream accepted only part of a command frame. The link should be rebuilt.
    #[error("partial write: {written} of {expected} bytes sent")]
    PartialWrite { written: usize, expected: usize },

    /// A frame started with a role marker other than the one expected.
    ///
    /// This covers replies read by `send_command` too: a data report arriving
    /// where a command reply was due is a role mismatch and reported here.
    /// A reply to the wrong command is [`Error::Protocol`].
    #[error("unexpected role marker {role:#04x} while waiting for {expected:?}")]
    Framing { expected: Expect, role: u8 },

    /// The frame did not end with the tail marker.
    #[error("bad frame tail {received:#04x}")]
    BadTail { received: u8 },

    /// A reply echoed a different command than the one sent.
    #[error("reply to command {received:#04x}, expected {expected:?}")]
    Protocol { expected: Command, received: u8 },

    /// The frame checksum does not match its content.
    #[error("bad checksum: calculated {calculated:#04x}, received {received:#04x}")]
    Checksum { calculated: u8, received: u8 },

    /// The frame was sent by another physical sensor.
    #[error("frame from device {received}, link is bound to {bound}")]
    DeviceMismatch { bound: DeviceId, received: DeviceId },

    /// Nothing arrived within the stream read timeout.
    #[error("no response while waiting for {expected:?}")]
    NoResponse { expected: Expect },

    /// Nothing arrived within the duty-cycle window.
    #[error("no data within the duty-cycle window, waited {waited:?}")]
    Timeout { waited: Duration },

    /// The sensor is sleeping and has to be woken up first.
    #[error("sensor is sleeping")]
    SensorAsleep,

    /// The sensor is in passive mode and only answers explicit requests.
    #[error("sensor is in passive report mode")]
    PassiveMode,

    /// A frame or payload was shorter than the protocol requires.
    #[error("malformed data: expected {expected} bytes, received {received}")]
    MalformedData { expected: usize, received: usize },

    /// The sensor acknowledged a set command with another value.
    #[error("{command:?} set to {requested} but sensor answered {echoed}")]
    CommandRejected {
        command: Command,
        requested: u8,
        echoed: u8,
    },

    /// The sensor answered with a value outside the protocol range.
    #[error("invalid value {value} in reply to {command:?}")]
    InvalidValue { command: Command, value: u8 },

    /// Duty cycle outside `0..=30` minutes.
    #[error("duty cycle {0} out of range (0-30)")]
    InvalidDutyCycle(u8),
}

impl<E: Debug> Error<E> {
    /// Whether the bytes read did not form a usable frame.
    pub fn is_corrupt_frame(&self) -> bool {
        matches!(
            self,
            Error::Framing { .. }
                | Error::BadTail { .. }
                | Error::Protocol { .. }
                | Error::Checksum { .. }
                | Error::MalformedData { .. }
        )
    }
}

/// Step of the construction handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// Listening for an unsolicited frame.
    Listen,
    /// Waking a silent sensor.
    Wake,
    /// Querying the duty cycle.
    DutyCycle,
    /// Querying the report mode.
    ReportMode,
    /// Querying the firmware version.
    Firmware,
}

/// Failure while attaching to a sensor. The stream has been dropped.
#[derive(Debug, thiserror::Error)]
#[error("handshake failed at {stage:?}: {cause}")]
pub struct HandshakeError<E: Debug> {
    pub stage: HandshakeStage,
    pub cause: Error<E>,
}

impl<E: Debug> HandshakeError<E> {
    pub(crate) fn at(stage: HandshakeStage) -> impl FnOnce(Error<E>) -> Self {
        move |cause| HandshakeError { stage, cause }
    }
}
