//! # 1-Wire transport
//!
//! Bit and byte primitives of the 1-Wire bus, bit-banged on a [`LinePort`]
//! and timed by a [`TimingPort`].
//!
//! Every bit occupies a fixed 70 µs timeslot regardless of its value, and a
//! reset occupies a 960 µs slot. The durations below come from the Maxim
//! recommended timings and must not be approximated: drifting beyond the
//! sensor tolerance silently corrupts the transfer.
//!
//! All waits in this module are busy waits. The only yielding wait on the bus
//! is [`OneWire::sleep_ms`].

use core::result::Result;

use crate::ports::{LinePort, TimingPort};

// Timing for reset and presence detection on the 1-Wire bus.
const RESET_LOW_US: u32 = 480;
const PRESENCE_WAIT_US: u32 = 70;
const PRESENCE_RELEASE_US: u32 = 410;

// Timing for writing logic 1 and 0 bits to the bus.
const WRITE_1_LOW_US: u32 = 6;
const WRITE_1_HIGH_US: u32 = 64;
const WRITE_0_LOW_US: u32 = 60;
const WRITE_0_HIGH_US: u32 = 10;

// Timing for reading a bit from the bus (init, sample, recovery).
const READ_INIT_LOW_US: u32 = 6;
const READ_SAMPLE_US: u32 = 9;
const READ_RECOVERY_US: u32 = 55;

/// Duration of a single bit timeslot.
pub const SLOT_US: u32 = 70;

/// Duration of a reset-and-presence slot.
pub const RESET_SLOT_US: u32 = RESET_LOW_US + PRESENCE_WAIT_US + PRESENCE_RELEASE_US;

const _: () = assert!(WRITE_1_LOW_US + WRITE_1_HIGH_US == SLOT_US);
const _: () = assert!(WRITE_0_LOW_US + WRITE_0_HIGH_US == SLOT_US);
const _: () = assert!(READ_INIT_LOW_US + READ_SAMPLE_US + READ_RECOVERY_US == SLOT_US);
const _: () = assert!(RESET_SLOT_US >= 960);

/// A single-line 1-Wire bus.
///
/// Owns its [`LinePort`] and [`TimingPort`] for its whole lifetime. The bus
/// is not reentrant: only one transaction may run on a line at a time.
pub struct OneWire<L, T>
where
    L: LinePort,
    T: TimingPort,
{
    line: L,
    timing: T,
}

impl<L, T> OneWire<L, T>
where
    L: LinePort,
    T: TimingPort,
{
    /// Creates a [`OneWire`] bus on the given line and delay provider.
    #[must_use]
    #[inline]
    pub fn new(line: L, timing: T) -> Self {
        Self { line, timing }
    }

    /// Returns the line the bus runs on.
    #[inline]
    pub fn line(&self) -> &L {
        &self.line
    }

    /// Releases the line and the delay provider.
    #[inline]
    pub fn release(self) -> (L, T) {
        (self.line, self.timing)
    }

    /// Performs a bus reset and checks for the presence pulse.
    ///
    /// Returns `true` if a device pulled the line low during the presence
    /// window. No retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if accessing the line fails.
    pub fn reset(&mut self) -> Result<bool, L::Error> {
        self.drive_low()?;
        self.timing.busy_wait_us(RESET_LOW_US);

        self.line.configure_input_pullup()?;
        self.timing.busy_wait_us(PRESENCE_WAIT_US);

        // Sensor should pull the line low to indicate presence.
        let present = !self.line.read_level()?;
        self.timing.busy_wait_us(PRESENCE_RELEASE_US);

        Ok(present)
    }

    /// Writes a single bit in one timeslot.
    ///
    /// # Errors
    ///
    /// Returns an error if accessing the line fails.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), L::Error> {
        let (low_us, high_us) = if bit {
            // Logic 1: short low pulse.
            (WRITE_1_LOW_US, WRITE_1_HIGH_US)
        } else {
            // Logic 0: long low pulse.
            (WRITE_0_LOW_US, WRITE_0_HIGH_US)
        };

        self.drive_low()?;
        self.timing.busy_wait_us(low_us);
        self.line.configure_input_pullup()?;
        self.timing.busy_wait_us(high_us);

        Ok(())
    }

    /// Reads a single bit in one timeslot.
    ///
    /// # Errors
    ///
    /// Returns an error if accessing the line fails.
    pub fn read_bit(&mut self) -> Result<bool, L::Error> {
        self.drive_low()?;
        self.timing.busy_wait_us(READ_INIT_LOW_US);
        self.line.configure_input_pullup()?;
        self.timing.busy_wait_us(READ_SAMPLE_US);

        // The device holds the line low for a 0 and leaves it floating for a 1.
        let bit = self.line.read_level()?;
        self.timing.busy_wait_us(READ_RECOVERY_US);

        Ok(bit)
    }

    /// Writes a byte, least significant bit first.
    ///
    /// # Errors
    ///
    /// Returns an error if accessing the line fails.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), L::Error> {
        let mut value = byte;
        for _ in 0..8 {
            self.write_bit(value & 0x01 == 0x01)?;
            value >>= 1;
        }

        Ok(())
    }

    /// Reads a byte, least significant bit first.
    ///
    /// # Errors
    ///
    /// Returns an error if accessing the line fails.
    pub fn read_byte(&mut self) -> Result<u8, L::Error> {
        let mut byte = 0;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit()? {
                byte |= 0x80;
            }
        }

        Ok(byte)
    }

    /// Sleeps without holding the executor, leaving the line released.
    #[inline]
    pub async fn sleep_ms(&mut self, ms: u32) {
        self.timing.sleep_ms(ms).await;
    }

    fn drive_low(&mut self) -> Result<(), L::Error> {
        self.line.configure_output()?;
        self.line.write_level(false)
    }
}
