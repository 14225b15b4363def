// Test doubles for the byte stream and the clock.

use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use embedded_io::{ErrorKind, ErrorType, Read, Write};

use crate::clock::Clock;
use crate::constants::*;
use crate::frame::{checksum, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    TimedOut,
    Broken,
}

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        match self {
            MockError::TimedOut => ErrorKind::TimedOut,
            MockError::Broken => ErrorKind::BrokenPipe,
        }
    }
}

/// Builds a checksum-valid reply frame.
pub fn reply(command: Command, data: [u8; 3], id: [u8; 2]) -> [u8; RESPONSE_LEN] {
    response(REPLY_ID, [command.into(), data[0], data[1], data[2]], id)
}

/// Builds a checksum-valid data report frame.
pub fn data_report(data: [u8; 4], id: [u8; 2]) -> [u8; RESPONSE_LEN] {
    response(DATA_REPORT_ID, data, id)
}

fn response(role: u8, body: [u8; 4], id: [u8; 2]) -> [u8; RESPONSE_LEN] {
    let mut frame = [
        HEAD, role, body[0], body[1], body[2], body[3], id[0], id[1], 0, TAIL,
    ];
    frame[8] = checksum(&frame[2..8]);
    frame
}

#[derive(Debug, Clone, Copy)]
enum Inbound {
    Byte(u8),
    Error(MockError),
}

#[derive(Debug, Default)]
pub struct MockInner {
    rx: VecDeque<Inbound>,
    scripted: VecDeque<Vec<Inbound>>,
    pub tx: Vec<u8>,
    pub flushes: usize,
    pub reads: usize,
    pub write_limit: Option<usize>,
    chunk_size: Option<usize>,
}

/// Scripted stream. Bytes given to `queue` are readable at once; each batch
/// given to `respond` becomes readable after the next write.
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    inner: Rc<RefCell<MockInner>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> RefMut<'_, MockInner> {
        self.inner.borrow_mut()
    }

    pub fn queue(&mut self, bytes: &[u8]) {
        self.inner().rx.extend(bytes.iter().map(|&b| Inbound::Byte(b)));
    }

    pub fn queue_error(&mut self, error: MockError) {
        self.inner().rx.push_back(Inbound::Error(error));
    }

    pub fn respond(&mut self, bytes: &[u8]) {
        let batch = bytes.iter().map(|&b| Inbound::Byte(b)).collect();
        self.inner().scripted.push_back(batch);
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.inner().chunk_size = Some(size);
    }

    pub fn set_write_limit(&mut self, limit: usize) {
        self.inner().write_limit = Some(limit);
    }

    pub fn sent(&self) -> Vec<u8> {
        self.inner.borrow().tx.clone()
    }

    pub fn reads(&self) -> usize {
        self.inner.borrow().reads
    }
}

impl ErrorType for MockSerial {
    type Error = MockError;
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut inner = self.inner();
        inner.reads += 1;
        let limit = inner.chunk_size.unwrap_or(buf.len()).min(buf.len());
        let mut n = 0;
        while n < limit {
            match inner.rx.front().copied() {
                Some(Inbound::Byte(b)) => {
                    inner.rx.pop_front();
                    buf[n] = b;
                    n += 1;
                }
                Some(Inbound::Error(e)) if n == 0 => {
                    inner.rx.pop_front();
                    return Err(e);
                }
                _ => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut inner = self.inner();
        let accepted = inner.write_limit.unwrap_or(buf.len()).min(buf.len());
        inner.tx.extend_from_slice(&buf[..accepted]);
        if let Some(batch) = inner.scripted.pop_front() {
            inner.rx.extend(batch);
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner().flushes += 1;
        Ok(())
    }
}

/// State of a simulated sensor.
#[derive(Debug)]
pub struct SensorState {
    pub id: [u8; 2],
    pub firmware: [u8; 3],
    pub report_mode: u8,
    pub work_state: u8,
    pub duty_cycle: u8,
    pub reading: [u8; 4],
    /// Whether the sensor pushes reports while in initiative mode.
    pub pushing: bool,
    pub commands: Vec<[u8; COMMAND_LEN]>,
    pending: VecDeque<u8>,
    inbox: Vec<u8>,
}

impl Default for SensorState {
    fn default() -> Self {
        SensorState {
            id: [0xCC, 0x0B],
            firmware: [15, 7, 10],
            report_mode: 0,
            work_state: 1,
            duty_cycle: 0,
            reading: [0x34, 0x01, 0x45, 0x00],
            pushing: true,
            commands: Vec::new(),
            pending: VecDeque::new(),
            inbox: Vec::new(),
        }
    }
}

impl SensorState {
    fn handle(&mut self, frame: [u8; COMMAND_LEN]) {
        self.commands.push(frame);
        if frame[17] != checksum(&frame[2..17]) {
            return;
        }
        let (command, mode, value) = (frame[2], frame[3], frame[4]);
        // A sleeping sensor only listens to the wake-up command.
        if self.work_state == 0 && command != u8::from(Command::WorkState) {
            return;
        }
        let setting = mode == 1;
        let answer = match Command::try_from(command) {
            Ok(Command::ReportMode) => {
                if setting {
                    self.report_mode = value;
                }
                reply(Command::ReportMode, [mode, self.report_mode, 0], self.id)
            }
            Ok(Command::WorkState) => {
                if setting {
                    self.work_state = value;
                }
                reply(Command::WorkState, [mode, self.work_state, 0], self.id)
            }
            Ok(Command::DutyCycle) => {
                if setting {
                    self.duty_cycle = value;
                }
                reply(Command::DutyCycle, [mode, self.duty_cycle, 0], self.id)
            }
            Ok(Command::Firmware) => reply(Command::Firmware, self.firmware, self.id),
            Ok(Command::DeviceId) => reply(Command::DeviceId, [0, 0, 0], self.id),
            Ok(Command::Request) => data_report(self.reading, self.id),
            Err(_) => return,
        };
        self.pending.extend(answer);
    }

    pub fn commands_with_code(&self, command: Command) -> usize {
        let code = u8::from(command);
        self.commands.iter().filter(|frame| frame[2] == code).count()
    }
}

/// Simulated SDS011 answering command frames like the real device.
#[derive(Debug, Clone, Default)]
pub struct FakeSensor {
    state: Rc<RefCell<SensorState>>,
}

impl FakeSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefMut<'_, SensorState> {
        self.state.borrow_mut()
    }
}

impl ErrorType for FakeSensor {
    type Error = MockError;
}

impl Read for FakeSensor {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        if state.pending.is_empty()
            && state.pushing
            && state.report_mode == 0
            && state.work_state == 1
        {
            let report = data_report(state.reading, state.id);
            state.pending.extend(report);
        }
        let mut n = 0;
        while n < buf.len() {
            match state.pending.pop_front() {
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

impl Write for FakeSensor {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        state.inbox.extend_from_slice(buf);
        while state.inbox.len() >= COMMAND_LEN {
            let mut frame = [0u8; COMMAND_LEN];
            frame.copy_from_slice(&state.inbox[..COMMAND_LEN]);
            state.inbox.drain(..COMMAND_LEN);
            state.handle(frame);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Clock that moves forward by `step` every time it is read.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
    step: Duration,
}

impl ManualClock {
    pub fn new(step: Duration) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(Duration::ZERO)),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}
