#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::fmt::Debug;
use core::time::Duration;

use embedded_io::{Read, Write};
use log::{debug, error, info, warn};

mod clock;
pub use clock::*;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

pub mod frame;
pub use frame::{Command, CommandMode, Expect, Frame};

#[cfg(test)]
mod testing;

/// Represents a driver bound to one SDS011 sensor.
///
/// The link owns the byte stream and caches the sensor configuration. Every
/// operation blocks until a valid frame arrives or the stream read timeout
/// elapses; nothing is retried internally.
///
/// # Type Parameters
///
/// * `S`: The byte stream connected to the sensor. It must implement
///   `embedded_io::Read` and `embedded_io::Write`, and should be configured
///   as described by [`BAUD_RATE`] and [`READ_TIMEOUT`].
/// * `C`: The monotonic time source used for duty-cycle bookkeeping.
pub struct SensorLink<S, C> {
    serial: S,
    clock: C,
    config: SensorConfig,
    // None while the sensor measures continuously.
    read_window: Option<Duration>,
    cycle_start: Duration,
}

/// Represents a single data sample read from the SDS011 sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f32,
    /// PM10 concentration in µg/m³.
    pub pm10: f32,
}

/// Decodes PM2.5 and PM10 from the four measurement bytes of a data report.
///
/// Each value is a little-endian `u16` in tenths of µg/m³.
pub fn extract_measurement<E: Debug>(data: &[u8]) -> Result<Measurement, Error<E>> {
    if data.len() < 4 {
        return Err(Error::MalformedData {
            expected: 4,
            received: data.len(),
        });
    }
    let pm2_5 = f32::from(u16::from_le_bytes([data[0], data[1]])) / 10.0;
    let pm10 = f32::from(u16::from_le_bytes([data[2], data[3]])) / 10.0;
    Ok(Measurement { pm2_5, pm10 })
}

impl<S, C> SensorLink<S, C>
where
    S: Read + Write,
    C: Clock,
{
    /// Attaches to a sensor and reads back its configuration.
    ///
    /// This involves:
    /// - Listening for one unsolicited frame.
    /// - If the sensor stays silent, sending it a wake-up command.
    /// - Querying duty cycle, report mode and firmware version.
    ///
    /// A passive sensor is silent too, so it also gets woken up. That wake-up
    /// is visible on the device: a passive sensor put to sleep by someone
    /// else will be measuring afterwards.
    ///
    /// On failure the stream is dropped.
    pub fn new(serial: S, clock: C) -> Result<Self, HandshakeError<S::Error>> {
        let cycle_start = clock.now();
        let mut link = SensorLink {
            serial,
            clock,
            config: SensorConfig::default(),
            read_window: None,
            cycle_start,
        };
        link.handshake()?;
        Ok(link)
    }

    fn handshake(&mut self) -> Result<(), HandshakeError<S::Error>> {
        let heard = self.listen().map_err(HandshakeError::at(HandshakeStage::Listen))?;
        if !heard {
            warn!("Sensor is silent (sleeping, passive or in a duty cycle), waking it up");
            self.send_command(
                Command::WorkState,
                CommandMode::Setting,
                WorkState::Measuring.into(),
            )
            .map_err(HandshakeError::at(HandshakeStage::Wake))?;
        }
        self.config.work_state = WorkState::Measuring;

        self.query_duty_cycle()
            .map_err(HandshakeError::at(HandshakeStage::DutyCycle))?;
        self.query_report_mode()
            .map_err(HandshakeError::at(HandshakeStage::ReportMode))?;
        self.query_firmware()
            .map_err(HandshakeError::at(HandshakeStage::Firmware))?;

        info!(
            "SDS011 attached: firmware {}, {:?}, {:?}, duty cycle {} min",
            self.config.firmware,
            self.config.report_mode,
            self.config.work_state,
            self.config.duty_cycle
        );
        if let Some(id) = self.config.device_id {
            info!("SDS011 device id {}", id);
        }
        Ok(())
    }

    // Waits for one unsolicited frame. Broken frames are skipped: the link may
    // be attached in the middle of a push, or hold a reply from an earlier session.
    fn listen(&mut self) -> Result<bool, Error<S::Error>> {
        for attempt in 1..=MAX_LISTEN_ATTEMPTS {
            match self.parse_frame(Expect::DataReport) {
                Ok(frame) => return Ok(frame.is_some()),
                Err(e) if e.is_corrupt_frame() => {
                    warn!("Ignoring bad frame on attach (attempt {}): {:?}", attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
        warn!("No valid frame after {} attempts", MAX_LISTEN_ATTEMPTS);
        Ok(false)
    }

    /// Returns the cached sensor configuration.
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn firmware_version(&self) -> FirmwareVersion {
        self.config.firmware
    }

    pub fn work_state(&self) -> WorkState {
        self.config.work_state
    }

    pub fn report_mode(&self) -> ReportMode {
        self.config.report_mode
    }

    pub fn duty_cycle(&self) -> u8 {
        self.config.duty_cycle
    }

    /// Identity of the attached sensor, bound from the first frame it sent.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.config.device_id
    }

    /// How long [`read_next_reading`](Self::read_next_reading) waits for data,
    /// `None` when the sensor measures continuously.
    pub fn read_window(&self) -> Option<Duration> {
        self.read_window
    }

    /// Gives the stream back, discarding the cached configuration.
    pub fn release(self) -> S {
        self.serial
    }

    /// Puts the sensor to sleep or wakes it up.
    pub fn set_work_state(&mut self, state: WorkState) -> Result<(), Error<S::Error>> {
        debug!("Setting work state to: {:?}", state);
        self.set(Command::WorkState, state.into()).map_err(|e| {
            error!("Failed to set work state to {:?}: {:?}", state, e);
            e
        })?;
        self.config.work_state = state;
        info!("Work state set to {:?}", state);
        Ok(())
    }

    /// Switches between pushed reports and reports on request.
    pub fn set_report_mode(&mut self, mode: ReportMode) -> Result<(), Error<S::Error>> {
        debug!("Setting report mode to: {:?}", mode);
        self.set(Command::ReportMode, mode.into()).map_err(|e| {
            error!("Failed to set report mode to {:?}: {:?}", mode, e);
            e
        })?;
        self.config.report_mode = mode;
        info!("Report mode set to {:?}", mode);
        Ok(())
    }

    /// Sets the sensor's duty cycle.
    ///
    /// - A value of `0` sets the sensor to continuous measurement.
    /// - Values from `1` to `30` make the sensor measure once every `period`
    ///   minutes and sleep in between.
    ///
    /// The read window restarts now, and the cached configuration is then
    /// refreshed from the sensor.
    pub fn set_duty_cycle(&mut self, period: u8) -> Result<(), Error<S::Error>> {
        if period > MAX_DUTY_CYCLE {
            error!("Duty cycle {} out of range (0-30)", period);
            return Err(Error::InvalidDutyCycle(period));
        }
        debug!("Setting duty cycle to: {} minutes", period);
        self.set(Command::DutyCycle, period).map_err(|e| {
            error!("Failed to set duty cycle to {}: {:?}", period, e);
            e
        })?;
        self.config.duty_cycle = period;
        self.restart_window(period);
        info!("Duty cycle set to {} minutes", period);
        self.refresh_config()
    }

    /// Queries duty cycle, report mode and firmware version again.
    pub fn refresh_config(&mut self) -> Result<(), Error<S::Error>> {
        self.query_duty_cycle()?;
        self.query_report_mode()?;
        self.query_firmware()?;
        Ok(())
    }

    /// Queries the sensor's duty cycle and restarts the read window.
    pub fn query_duty_cycle(&mut self) -> Result<u8, Error<S::Error>> {
        let frame = self.send_command(Command::DutyCycle, CommandMode::Getting, 0)?;
        let period = frame.payload()[1];
        if period > MAX_DUTY_CYCLE {
            return Err(Error::InvalidValue {
                command: Command::DutyCycle,
                value: period,
            });
        }
        self.config.duty_cycle = period;
        self.restart_window(period);
        debug!("Queried duty cycle: {} minutes", period);
        Ok(period)
    }

    /// Queries the sensor's report mode.
    pub fn query_report_mode(&mut self) -> Result<ReportMode, Error<S::Error>> {
        let frame = self.send_command(Command::ReportMode, CommandMode::Getting, 0)?;
        let value = frame.payload()[1];
        let Ok(mode) = ReportMode::try_from(value) else {
            return Err(Error::InvalidValue {
                command: Command::ReportMode,
                value,
            });
        };
        self.config.report_mode = mode;
        debug!("Queried report mode: {:?}", mode);
        Ok(mode)
    }

    /// Queries the sensor's work state.
    pub fn query_work_state(&mut self) -> Result<WorkState, Error<S::Error>> {
        let frame = self.send_command(Command::WorkState, CommandMode::Getting, 0)?;
        let value = frame.payload()[1];
        let Ok(state) = WorkState::try_from(value) else {
            return Err(Error::InvalidValue {
                command: Command::WorkState,
                value,
            });
        };
        self.config.work_state = state;
        debug!("Queried work state: {:?}", state);
        Ok(state)
    }

    /// Retrieves the firmware version of the sensor.
    pub fn query_firmware(&mut self) -> Result<FirmwareVersion, Error<S::Error>> {
        let frame = self.send_command(Command::Firmware, CommandMode::Getting, 0)?;
        let payload = frame.payload();
        let firmware = FirmwareVersion {
            year: payload[0],
            month: payload[1],
            day: payload[2],
        };
        self.config.firmware = firmware;
        debug!("Firmware version: {}", firmware);
        Ok(firmware)
    }

    /// Asks the sensor for a measurement and waits for the answer.
    ///
    /// Works in both report modes, but is meant for passive mode.
    pub fn request_reading(&mut self) -> Result<Measurement, Error<S::Error>> {
        debug!("Requesting reading (CMD 0x04)");
        let command = frame::build_command_frame(Command::Request, [0x00, 0x00]);
        self.transmit(&command)?;
        let expected = Expect::DataReport;
        let Some(frame) = self.parse_frame(expected)? else {
            return Err(Error::NoResponse { expected });
        };
        self.take_measurement(&frame)
    }

    /// Waits for the next measurement pushed by the sensor.
    ///
    /// Fails without touching the stream when the sensor is sleeping or in
    /// passive mode. With a duty cycle the sensor is silent most of the time,
    /// so silence is tolerated until the read window elapses.
    pub fn read_next_reading(&mut self) -> Result<Measurement, Error<S::Error>> {
        if self.config.work_state == WorkState::Sleeping {
            return Err(Error::SensorAsleep);
        }
        if self.config.report_mode == ReportMode::Passive {
            return Err(Error::PassiveMode);
        }

        let expected = Expect::DataReport;
        let Some(window) = self.read_window else {
            return match self.parse_frame(expected)? {
                Some(frame) => self.take_measurement(&frame),
                None => {
                    error!("No data from a continuously measuring sensor. Is it asleep?");
                    Err(Error::NoResponse { expected })
                }
            };
        };

        let deadline = self.cycle_start + window;
        while self.clock.now() < deadline {
            match self.parse_frame(expected)? {
                Some(frame) => return self.take_measurement(&frame),
                None => debug!("No data yet, as expected inside a duty cycle"),
            }
        }

        let now = self.clock.now();
        let waited = now.saturating_sub(self.cycle_start);
        warn!("No data within read window of {:?}", window);
        // Without a restart every later call would time out at once.
        self.cycle_start = now;
        Err(Error::Timeout { waited })
    }

    /// Sends a get or set command and returns the matching reply.
    ///
    /// The reply payload is [`Frame::payload`]: three data bytes followed by
    /// the device id.
    pub fn send_command(
        &mut self,
        command: Command,
        mode: CommandMode,
        value: u8,
    ) -> Result<Frame, Error<S::Error>> {
        debug!("Sending {:?} ({:?}, {})", command, mode, value);
        let bytes = frame::build_command_frame(command, [mode.into(), value]);
        self.transmit(&bytes)?;
        let expected = Expect::Reply(command);
        self.parse_frame(expected)?.ok_or(Error::NoResponse { expected })
    }

    /// Reads the next frame and checks it comes from the bound sensor.
    ///
    /// The first valid frame binds the device id for the lifetime of the link.
    pub fn parse_frame(&mut self, expected: Expect) -> Result<Option<Frame>, Error<S::Error>> {
        let Some(frame) = frame::read_frame(&mut self.serial, expected)? else {
            return Ok(None);
        };
        let received = frame.device_id();
        match self.config.device_id {
            None => {
                debug!("Binding to device id {}", received);
                self.config.device_id = Some(received);
            }
            Some(bound) if bound != received => {
                return Err(Error::DeviceMismatch { bound, received });
            }
            Some(_) => {}
        }
        Ok(Some(frame))
    }

    // Sends a set command and checks the sensor echoes the new value.
    fn set(&mut self, command: Command, value: u8) -> Result<(), Error<S::Error>> {
        let frame = self.send_command(command, CommandMode::Setting, value)?;
        let echoed = frame.payload()[1];
        if echoed != value {
            return Err(Error::CommandRejected {
                command,
                requested: value,
                echoed,
            });
        }
        Ok(())
    }

    // Writes a whole command frame. A short write leaves the link unusable.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Error<S::Error>> {
        debug!("Executing command: {:02X?}", bytes);
        let written = self.serial.write(bytes).map_err(Error::Io)?;
        self.serial.flush().map_err(Error::Io)?;
        if written != bytes.len() {
            error!("Only {} of {} bytes written", written, bytes.len());
            return Err(Error::PartialWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    fn take_measurement(&mut self, frame: &Frame) -> Result<Measurement, Error<S::Error>> {
        let measurement = extract_measurement::<S::Error>(frame.data())?;
        if self.read_window.is_some() {
            self.cycle_start = self.clock.now();
        }
        debug!(
            "Processed frame - PM2.5: {}, PM10: {}",
            measurement.pm2_5, measurement.pm10
        );
        Ok(measurement)
    }

    fn restart_window(&mut self, period: u8) {
        self.read_window = active_window(period);
        self.cycle_start = self.clock.now();
        debug!("Read window for duty cycle {}: {:?}", period, self.read_window);
    }
}
