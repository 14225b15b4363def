use core::fmt;
use core::time::Duration;

use crate::constants::READ_TIMEOUT_DRIFT_PERCENT;

/// Represents the report mode of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ReportMode {
    /// In Initiative mode, the sensor pushes data on its own.
    Initiative,
    /// In Passive mode, the sensor only reports data when requested.
    Passive,
}

impl From<ReportMode> for u8 {
    fn from(mode: ReportMode) -> u8 {
        match mode {
            ReportMode::Initiative => 0x00,
            ReportMode::Passive => 0x01,
        }
    }
}

impl TryFrom<u8> for ReportMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReportMode::Initiative),
            0x01 => Ok(ReportMode::Passive),
            other => Err(other),
        }
    }
}

/// Represents the work state of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Sensor is in low-power sleep mode and sends nothing.
    Sleeping,
    /// Sensor is actively taking measurements.
    Measuring,
}

impl From<WorkState> for u8 {
    fn from(state: WorkState) -> u8 {
        match state {
            WorkState::Sleeping => 0x00,
            WorkState::Measuring => 0x01,
        }
    }
}

impl TryFrom<u8> for WorkState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(WorkState::Sleeping),
            0x01 => Ok(WorkState::Measuring),
            other => Err(other),
        }
    }
}

/// Represents the unique identifier of the SDS011 sensor.
///
/// Every frame the sensor sends ends with these two bytes.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceId {
    /// The first byte of the device ID.
    pub id1: u8,
    /// The second byte of the device ID.
    pub id2: u8,
}

impl DeviceId {
    pub const fn new(id1: u8, id2: u8) -> Self {
        DeviceId { id1, id2 }
    }
}

/// Formats the id the way it is printed on the sensor label, e.g. `CC0B`.
impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.id1, self.id2)
    }
}

/// Firmware build date reported by the sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub struct FirmwareVersion {
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

/// Formats as `YYMMDD`.
impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}{:02}", self.year, self.month, self.day)
    }
}

/// Configuration of the sensor as last read back from, or written to, the device.
///
/// The driver never assumes these values: they are queried during the
/// handshake because the sensor may have been left in any prior state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SensorConfig {
    /// The firmware version.
    pub firmware: FirmwareVersion,
    /// The report mode of the sensor.
    pub report_mode: ReportMode,
    /// Whether the sensor is sleeping or measuring.
    pub work_state: WorkState,
    /// Duty cycle in minutes, `0` meaning continuous measurement.
    pub duty_cycle: u8,
    /// Identity bound from the first valid frame, `None` until then.
    pub device_id: Option<DeviceId>,
}

impl Default for SensorConfig {
    /// Returns the state assumed before anything was read from the sensor.
    fn default() -> SensorConfig {
        SensorConfig {
            firmware: FirmwareVersion::default(),
            report_mode: ReportMode::Initiative,
            work_state: WorkState::Measuring,
            duty_cycle: 0,
            device_id: None,
        }
    }
}

/// Returns how long to wait for a reading in the given duty cycle.
///
/// The window is `duty_cycle` minutes plus a fixed drift allowance. A duty
/// cycle of `0` means continuous measurement and yields `None`: reads are
/// never timed out by the driver.
pub fn active_window(duty_cycle: u8) -> Option<Duration> {
    if duty_cycle == 0 {
        return None;
    }
    let millis = 60_000 * u64::from(duty_cycle) * (100 + READ_TIMEOUT_DRIFT_PERCENT) / 100;
    Some(Duration::from_millis(millis))
}

/// Same as [`active_window`] in seconds, `0.0` standing for "always active".
pub fn compute_active_window_seconds(duty_cycle: u8) -> f64 {
    active_window(duty_cycle).map_or(0.0, |window| window.as_secs_f64())
}
