use core::time::Duration;

// HEAD is the byte that marks the beginning of any frame (command or data).
pub const HEAD: u8 = 0xAA;

// TAIL is the byte that marks the end of any frame (command or data).
pub const TAIL: u8 = 0xAB;

// COMMAND_ID is the byte that identifies a command frame sent to the sensor.
pub const COMMAND_ID: u8 = 0xB4;

// REPLY_ID is the byte that identifies a reply frame received from the sensor
// in response to a command.
pub const REPLY_ID: u8 = 0xC5;

// DATA_REPORT_ID is the byte that identifies a data report frame received from the sensor.
// This is pushed in initiative mode and is also the answer to a request command.
pub const DATA_REPORT_ID: u8 = 0xC0;

// COMMAND_TERMINATOR fills the two bytes before the checksum of every command frame.
pub const COMMAND_TERMINATOR: u8 = 0xFF;

/// Length of a frame sent to the sensor.
pub const COMMAND_LEN: usize = 19;

/// Length of a frame received from the sensor.
pub const RESPONSE_LEN: usize = 10;

/// Number of payload bytes between the command code and the terminators.
pub const COMMAND_PAYLOAD_LEN: usize = 12;

/// Maximum duty cycle accepted by the sensor, in minutes.
pub const MAX_DUTY_CYCLE: u8 = 30;

/// Slack added to the duty-cycle window to absorb sensor clock drift, in percent.
pub const READ_TIMEOUT_DRIFT_PERCENT: u64 = 2;

/// Frames skipped while listening for the first push before giving up on it.
pub const MAX_LISTEN_ATTEMPTS: usize = 5;

/// Serial parameters the sensor speaks.
pub const BAUD_RATE: u32 = 9600;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

/// Read timeout the stream should be configured with.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);
