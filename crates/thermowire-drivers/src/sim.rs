//! # Simulated bus
//!
//! A 1-Wire line running on a virtual microsecond clock, for exercising
//! drivers without hardware or real-time waits.
//!
//! A [`SimBus`] owns the clock, the line state and the peer attached to the
//! line. [`SimBus::line`] and [`SimBus::timing`] hand out a [`LinePort`] and a
//! [`TimingPort`] that share that state: every busy wait or sleep advances
//! the clock, and every line operation is recorded with its timestamp.
//!
//! The peer decodes host slots from the width of their low pulses, the same
//! way a real device does:
//!
//! - a low pulse of at least 480 µs is a reset, answered by a presence pulse
//! - a shorter pulse is a write slot (`1` when released before 15 µs), unless
//!   the peer is transmitting, in which case it is a read slot and the peer
//!   holds the line low for 30 µs to send a `0`

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use core::cell::RefCell;
use core::convert::Infallible;

use crate::ports::{LinePort, TimingPort};

// Shortest low pulse recognized as a reset.
const RESET_MIN_LOW_US: u64 = 480;
// Longest low pulse recognized as a written `1`.
const WRITE_1_MAX_LOW_US: u64 = 15;

// Presence pulse emitted after a reset.
const PRESENCE_DELAY_US: u64 = 20;
const PRESENCE_LOW_US: u64 = 120;

// How long a transmitting peer holds the line to send a `0`.
const READ_0_HOLD_US: u64 = 30;

// Power-on value of the temperature register, 85 °C.
const POWER_ON_RAW: i16 = 0x0550;

const CMD_SKIP_ROM: u8 = 0xCC;
const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Electrical mode of the simulated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Driven by the host.
    Output,
    /// Floating with pull-up.
    Input,
}

/// A line operation performed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Switched to the given mode.
    Configure(Mode),
    /// Wrote a level, `true` for high.
    Write(bool),
    /// Sampled a level, `true` for high.
    Sample(bool),
    /// Busy waited for the given microseconds.
    BusyWait(u32),
    /// Slept for the given milliseconds.
    Sleep(u32),
}

/// A timestamped [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Virtual time at which the operation started.
    pub at_us: u64,
    /// The operation.
    pub operation: Operation,
}

/// A low phase driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowPulse {
    /// When the host pulled the line low.
    pub start_us: u64,
    /// When the host released the line.
    pub end_us: u64,
}

impl LowPulse {
    /// Duration of the low phase.
    #[must_use]
    #[inline]
    pub const fn duration_us(&self) -> u64 {
        self.end_us - self.start_us
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    RomCommand,
    FunctionCommand,
    Transmit,
}

struct Sensor {
    raw: i16,
    register: i16,
    phase: Phase,
    rx_byte: u8,
    rx_bits: u8,
    tx: VecDeque<bool>,
    tx_bits_sent: usize,
    received: Vec<u8>,
    resets_answered: u32,
    max_resets: Option<u32>,
}

impl Sensor {
    fn new(raw: i16) -> Self {
        Self {
            raw,
            register: POWER_ON_RAW,
            phase: Phase::Idle,
            rx_byte: 0,
            rx_bits: 0,
            tx: VecDeque::new(),
            tx_bits_sent: 0,
            received: Vec::new(),
            resets_answered: 0,
            max_resets: None,
        }
    }

    // Returns whether the sensor answers this reset.
    fn on_reset(&mut self) -> bool {
        if self
            .max_resets
            .is_some_and(|max| self.resets_answered >= max)
        {
            self.phase = Phase::Idle;
            return false;
        }

        self.resets_answered += 1;
        self.phase = Phase::RomCommand;
        self.rx_byte = 0;
        self.rx_bits = 0;
        self.tx.clear();
        true
    }

    fn on_write_bit(&mut self, bit: bool) {
        if matches!(self.phase, Phase::Idle | Phase::Transmit) {
            return;
        }

        self.rx_byte |= u8::from(bit) << self.rx_bits;
        self.rx_bits += 1;
        if self.rx_bits == 8 {
            let byte = self.rx_byte;
            self.rx_byte = 0;
            self.rx_bits = 0;
            self.on_byte(byte);
        }
    }

    fn on_byte(&mut self, byte: u8) {
        self.received.push(byte);
        self.phase = match (self.phase, byte) {
            (Phase::RomCommand, CMD_SKIP_ROM) => Phase::FunctionCommand,
            (Phase::FunctionCommand, CMD_CONVERT_T) => {
                self.register = self.raw;
                Phase::Idle
            }
            (Phase::FunctionCommand, CMD_READ_SCRATCHPAD) => {
                for byte in self.scratchpad() {
                    self.tx.extend((0..8).map(|i| byte >> i & 1 == 1));
                }
                Phase::Transmit
            }
            _ => Phase::Idle,
        };
    }

    // Bit answered in the current slot, an exhausted scratchpad reads as ones.
    fn peek_tx_bit(&self) -> bool {
        self.tx.front().copied().unwrap_or(true)
    }

    // A released slot that was not a reset consumed the answered bit.
    fn on_read_slot(&mut self) {
        if self.tx.pop_front().is_some() {
            self.tx_bits_sent += 1;
        }
    }

    fn scratchpad(&self) -> [u8; 9] {
        let [lsb, msb] = self.register.to_le_bytes();
        // TH, TL, 12-bit configuration and the reserved bytes.
        let mut data = [lsb, msb, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        data[8] = crc8(&data[0..8]);
        data
    }
}

// Dallas/Maxim CRC8, so the simulated scratchpad looks like a real one.
fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }

    crc
}

#[derive(Default)]
struct Loopback {
    queue: VecDeque<bool>,
    // Slot released by the host but not yet known to be a write.
    pending: Option<bool>,
    // Bit answered in the current read slot.
    slot_bit: Option<bool>,
}

enum Peer {
    Absent,
    Sensor(Sensor),
    Loopback(Loopback),
}

struct State {
    ready: bool,
    now_us: u64,
    mode: Mode,
    latch: bool,
    low_since: Option<u64>,
    hold_low: Option<(u64, u64)>,
    peer: Peer,
    records: Vec<Record>,
    pulses: Vec<LowPulse>,
}

impl State {
    fn new(peer: Peer) -> Self {
        Self {
            ready: true,
            now_us: 0,
            mode: Mode::Input,
            latch: true,
            low_since: None,
            hold_low: None,
            peer,
            records: Vec::new(),
            pulses: Vec::new(),
        }
    }

    fn record(&mut self, operation: Operation) {
        self.records.push(Record {
            at_us: self.now_us,
            operation,
        });
    }

    // Detects host edges after a mode or level change.
    fn sync_drive(&mut self) {
        let host_low = self.mode == Mode::Output && !self.latch;
        match (self.low_since, host_low) {
            (None, true) => {
                self.low_since = Some(self.now_us);
                self.on_fall();
            }
            (Some(start_us), false) => {
                self.low_since = None;
                self.pulses.push(LowPulse {
                    start_us,
                    end_us: self.now_us,
                });
                self.on_rise(self.now_us - start_us);
            }
            _ => {}
        }
    }

    fn on_fall(&mut self) {
        let now = self.now_us;
        match &mut self.peer {
            Peer::Absent => {}
            Peer::Sensor(sensor) => {
                // Whether the slot is a reset is only known on release.
                if sensor.phase == Phase::Transmit && !sensor.peek_tx_bit() {
                    self.hold_low = Some((now, now + READ_0_HOLD_US));
                }
            }
            Peer::Loopback(loopback) => {
                if let Some(bit) = loopback.pending.take() {
                    loopback.queue.push_back(bit);
                }
                loopback.slot_bit = None;
            }
        }
    }

    fn on_rise(&mut self, low_us: u64) {
        let now = self.now_us;
        let is_reset = low_us >= RESET_MIN_LOW_US;
        let present = match &mut self.peer {
            Peer::Absent => false,
            Peer::Sensor(sensor) if is_reset => sensor.on_reset(),
            Peer::Sensor(sensor) if sensor.phase == Phase::Transmit => {
                sensor.on_read_slot();
                false
            }
            Peer::Sensor(sensor) => {
                sensor.on_write_bit(low_us < WRITE_1_MAX_LOW_US);
                false
            }
            Peer::Loopback(_) if is_reset => true,
            Peer::Loopback(loopback) => {
                loopback.pending = Some(low_us < WRITE_1_MAX_LOW_US);
                false
            }
        };

        if present {
            let start = now + PRESENCE_DELAY_US;
            self.hold_low = Some((start, start + PRESENCE_LOW_US));
        }
    }

    fn level(&mut self) -> bool {
        if self.low_since.is_some() {
            return false;
        }

        let now = self.now_us;
        let input = self.mode == Mode::Input;
        if self
            .hold_low
            .is_some_and(|(from, until)| now >= from && now < until)
        {
            return false;
        }

        match &mut self.peer {
            Peer::Loopback(loopback) if input => {
                // Sampling a released slot makes it a read slot.
                if loopback.pending.take().is_some() {
                    loopback.slot_bit = Some(loopback.queue.pop_front().unwrap_or(true));
                }
                loopback.slot_bit.unwrap_or(true)
            }
            _ => true,
        }
    }

    fn sensor(&self) -> Option<&Sensor> {
        match &self.peer {
            Peer::Sensor(sensor) => Some(sensor),
            _ => None,
        }
    }
}

/// A simulated 1-Wire line with its attached peer.
pub struct SimBus {
    state: RefCell<State>,
}

impl SimBus {
    /// Creates a bus with a sensor whose conversions produce the given raw
    /// temperature register.
    #[must_use]
    pub fn sensor(raw: i16) -> Self {
        Self::with_peer(Peer::Sensor(Sensor::new(raw)))
    }

    /// Creates a bus with nothing attached.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_peer(Peer::Absent)
    }

    /// Creates a bus whose peer answers resets and plays every written bit
    /// back, in order, in the following read slots.
    #[must_use]
    pub fn loopback() -> Self {
        Self::with_peer(Peer::Loopback(Loopback::default()))
    }

    /// Makes the line report it is not ready.
    #[must_use]
    pub fn not_ready(self) -> Self {
        self.state.borrow_mut().ready = false;
        self
    }

    /// Makes the sensor stop answering after the given number of resets.
    #[must_use]
    pub fn vanish_after_resets(self, resets: u32) -> Self {
        if let Peer::Sensor(sensor) = &mut self.state.borrow_mut().peer {
            sensor.max_resets = Some(resets);
        }
        self
    }

    /// Changes the raw register produced by the next conversions.
    pub fn set_raw_temperature(&self, raw: i16) {
        if let Peer::Sensor(sensor) = &mut self.state.borrow_mut().peer {
            sensor.raw = raw;
        }
    }

    /// Returns a [`LinePort`] on this bus.
    #[must_use]
    pub fn line(&self) -> SimLine<'_> {
        SimLine { bus: self }
    }

    /// Returns a [`TimingPort`] advancing this bus clock.
    #[must_use]
    pub fn timing(&self) -> SimTiming<'_> {
        SimTiming { bus: self }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }

    /// Every operation performed on the bus so far.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.state.borrow().records.clone()
    }

    /// Every completed low phase driven by the host.
    #[must_use]
    pub fn low_pulses(&self) -> Vec<LowPulse> {
        self.state.borrow().pulses.clone()
    }

    /// Number of reset pulses driven by the host.
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.state
            .borrow()
            .pulses
            .iter()
            .filter(|pulse| pulse.duration_us() >= RESET_MIN_LOW_US)
            .count()
    }

    /// Timestamps and levels of every sample taken by the host.
    #[must_use]
    pub fn samples(&self) -> Vec<(u64, bool)> {
        self.state
            .borrow()
            .records
            .iter()
            .filter_map(|record| match record.operation {
                Operation::Sample(level) => Some((record.at_us, level)),
                _ => None,
            })
            .collect()
    }

    /// Durations of every yielding sleep.
    #[must_use]
    pub fn sleeps_ms(&self) -> Vec<u32> {
        self.state
            .borrow()
            .records
            .iter()
            .filter_map(|record| match record.operation {
                Operation::Sleep(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }

    /// Bytes decoded by the sensor from write slots.
    #[must_use]
    pub fn received_bytes(&self) -> Vec<u8> {
        self.state
            .borrow()
            .sensor()
            .map(|sensor| sensor.received.clone())
            .unwrap_or_default()
    }

    /// Whole bytes the sensor sent in read slots.
    #[must_use]
    pub fn bytes_sent(&self) -> usize {
        self.state
            .borrow()
            .sensor()
            .map_or(0, |sensor| sensor.tx_bits_sent / 8)
    }

    fn with_peer(peer: Peer) -> Self {
        Self {
            state: RefCell::new(State::new(peer)),
        }
    }
}

/// The [`LinePort`] of a [`SimBus`].
pub struct SimLine<'a> {
    bus: &'a SimBus,
}

impl LinePort for SimLine<'_> {
    type Error = Infallible;

    fn is_ready(&self) -> bool {
        self.bus.state.borrow().ready
    }

    fn configure_output(&mut self) -> Result<(), Self::Error> {
        let mut state = self.bus.state.borrow_mut();
        state.record(Operation::Configure(Mode::Output));
        state.mode = Mode::Output;
        state.sync_drive();
        Ok(())
    }

    fn configure_input_pullup(&mut self) -> Result<(), Self::Error> {
        let mut state = self.bus.state.borrow_mut();
        state.record(Operation::Configure(Mode::Input));
        state.mode = Mode::Input;
        state.sync_drive();
        Ok(())
    }

    fn write_level(&mut self, high: bool) -> Result<(), Self::Error> {
        let mut state = self.bus.state.borrow_mut();
        state.record(Operation::Write(high));
        state.latch = high;
        state.sync_drive();
        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        let mut state = self.bus.state.borrow_mut();
        let level = state.level();
        state.record(Operation::Sample(level));
        Ok(level)
    }
}

/// The [`TimingPort`] of a [`SimBus`].
pub struct SimTiming<'a> {
    bus: &'a SimBus,
}

impl TimingPort for SimTiming<'_> {
    fn busy_wait_us(&mut self, us: u32) {
        let mut state = self.bus.state.borrow_mut();
        state.record(Operation::BusyWait(us));
        state.now_us += u64::from(us);
    }

    async fn sleep_ms(&mut self, ms: u32) {
        let mut state = self.bus.state.borrow_mut();
        state.record(Operation::Sleep(ms));
        state.now_us += u64::from(ms) * 1000;
    }
}
