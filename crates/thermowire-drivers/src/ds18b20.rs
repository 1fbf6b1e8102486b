//! # DS18B20 Driver
//!
//! This module provides an architecture-agnostic driver for the `DS18B20`
//! digital temperature sensor, bit-banged over a single open-drain line.
//!
//! The bit and byte timeslots are run with busy waits to meet the device's
//! strict timing requirements, while the 750 ms conversion wait is a
//! yielding sleep, which is why the reading methods are asynchronous.
//!
//! The driver operates in *single-sensor mode* using the `Skip ROM` command to
//! address the device directly without needing its unique 64-bit ROM code,
//! making it ideal for setups where **only one** `DS18B20` is connected
//! to the bus. The sensor is assumed to run at its default 12-bit
//! resolution, and the scratchpad CRC is not checked.
//!
//! For detailed specifications, refer to the
//! [datasheet](https://www.alldatasheet.com/datasheet-pdf/pdf/58557/DALLAS/DS18B20.html).

use core::fmt;
use core::result::Result;

use log::{debug, error};

use crate::onewire::OneWire;
use crate::ports::{LinePort, TimingPort};

// Maximum wait time for temperature conversion at 12-bit resolution.
const CONVERSION_WAIT_MS: u32 = 750;

// DS18B20 ROM and function commands.
const CMD_SKIP_ROM: u8 = 0xCC;
const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

// Temperature resolution of the DS18B20 sensor.
// Each bit in the 12-bit temperature reading corresponds to 1/16 °C.
const RAW_UNITS_PER_DEGREE: f32 = 16.0;

/// Value returned by [`Ds18b20::read_celsius_or_sentinel`] when no sensor
/// answers.
///
/// The sensor operates between -55 °C and +125 °C, so this value can never
/// be a measurement.
pub const NOT_DETECTED_CELSIUS: f32 = -1000.0;

/// Errors that may occur when interacting with the `DS18B20` sensor.
#[derive(Debug, PartialEq, Eq)]
pub enum Ds18b20Error<E> {
    /// Error related to GPIO pin I/O operations.
    Pin(E),
    /// The GPIO line is not usable.
    NotReady,
    /// No presence pulse detected, sensor not found on bus.
    NoPresence,
}

impl<E> From<E> for Ds18b20Error<E> {
    fn from(e: E) -> Self {
        Ds18b20Error::Pin(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Ds18b20Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(e) => write!(f, "GPIO line error: {e:?}"),
            Self::NotReady => f.write_str("GPIO line not ready"),
            Self::NoPresence => f.write_str("sensor not detected"),
        }
    }
}

/// The temperature register read from the scratchpad.
///
/// A 16-bit two's-complement value where each unit is 1/16 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature(i16);

impl Temperature {
    /// Creates a [`Temperature`] from a raw register value.
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// Assembles a [`Temperature`] from the two scratchpad bytes.
    #[must_use]
    #[inline]
    pub const fn from_scratchpad(lsb: u8, msb: u8) -> Self {
        Self(i16::from_le_bytes([lsb, msb]))
    }

    /// The raw register value.
    #[must_use]
    #[inline]
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// The temperature in degrees Celsius (°C).
    #[must_use]
    #[inline]
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / RAW_UNITS_PER_DEGREE
    }
}

impl From<Temperature> for f32 {
    fn from(temperature: Temperature) -> Self {
        temperature.celsius()
    }
}

/// The `DS18B20` driver.
pub struct Ds18b20<L, T>
where
    L: LinePort,
    T: TimingPort,
{
    bus: OneWire<L, T>,
}

impl<L, T> Ds18b20<L, T>
where
    L: LinePort,
    T: TimingPort,
{
    /// Creates a [`Ds18b20`] driver for the given line and delay provider.
    #[must_use]
    pub fn new(line: L, timing: T) -> Self {
        Self {
            bus: OneWire::new(line, timing),
        }
    }

    /// Checks that the line is usable.
    ///
    /// No bus activity is performed.
    ///
    /// # Errors
    ///
    /// Returns [`Ds18b20Error::NotReady`] if the line reports it is not ready.
    pub fn init(&mut self) -> Result<(), Ds18b20Error<L::Error>> {
        if !self.bus.line().is_ready() {
            error!("GPIO line not ready");
            return Err(Ds18b20Error::NotReady);
        }

        Ok(())
    }

    /// Performs a full temperature measurement sequence and returns the
    /// measured temperature in degrees Celsius (°C).
    ///
    /// See [`Ds18b20::measure`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    ///
    /// - Communication with the sensor fails
    /// - No device responds on the bus
    pub async fn read_temperature(&mut self) -> Result<f32, Ds18b20Error<L::Error>> {
        self.measure().await.map(f32::from)
    }

    /// Performs a full temperature measurement sequence:
    ///
    /// 1. Resets the bus and checks presence
    /// 2. Initiates a temperature conversion
    /// 3. Sleeps for the worst-case conversion time
    /// 4. Resets the bus again and checks presence
    /// 5. Reads the temperature bytes of the scratchpad
    ///
    /// Every failure ends the transaction: no retry is attempted, the caller
    /// decides when to try again.
    ///
    /// # Notes
    ///
    /// After a power-on reset, the DS18B20’s temperature register is initialized
    /// to **85.0 °C**. Discard a reading of 85.0 °C taken right after power-up,
    /// as it does not reflect the current temperature.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    ///
    /// - Communication with the sensor fails
    /// - No device responds to either reset
    pub async fn measure(&mut self) -> Result<Temperature, Ds18b20Error<L::Error>> {
        // 1. Reset and check presence.
        self.select()?;

        // 2. Start temperature conversion.
        self.bus.write_byte(CMD_CONVERT_T)?;

        // 3. Wait for conversion completion.
        self.bus.sleep_ms(CONVERSION_WAIT_MS).await;

        // 4. Reset again to read scratchpad.
        self.select()?;
        self.bus.write_byte(CMD_READ_SCRATCHPAD)?;

        // 5. Read the temperature register, the rest of the scratchpad is
        // left unread.
        let lsb = self.bus.read_byte()?;
        let msb = self.bus.read_byte()?;

        let temperature = Temperature::from_scratchpad(lsb, msb);
        debug!(
            "DS18B20 raw register {:#06x} ({} °C)",
            temperature.raw(),
            temperature.celsius()
        );

        Ok(temperature)
    }

    /// Performs a full temperature measurement sequence, returning
    /// [`NOT_DETECTED_CELSIUS`] on any failure.
    pub async fn read_celsius_or_sentinel(&mut self) -> f32 {
        self.read_temperature()
            .await
            .unwrap_or(NOT_DETECTED_CELSIUS)
    }

    /// Releases the line and the delay provider.
    #[inline]
    pub fn release(self) -> (L, T) {
        self.bus.release()
    }

    fn select(&mut self) -> Result<(), Ds18b20Error<L::Error>> {
        if !self.bus.reset()? {
            error!("No DS18B20 detected");
            return Err(Ds18b20Error::NoPresence);
        }

        self.bus.write_byte(CMD_SKIP_ROM)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::vec::Vec;

    use std::io::ErrorKind;

    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};

    use crate::ports::{HalTiming, OpenDrainLine};
    use crate::sim::SimBus;

    type MockDriver = Ds18b20<OpenDrainLine<PinMock>, HalTiming<NoopDelay, NoopDelay>>;

    fn mock_driver(expectations: &[PinTransaction]) -> MockDriver {
        let line = OpenDrainLine::new(PinMock::new(expectations));
        let timing = HalTiming::new(NoopDelay::new(), NoopDelay::new());
        Ds18b20::new(line, timing)
    }

    fn done(driver: MockDriver) {
        let (line, _) = driver.release();
        line.into_inner().done();
    }

    fn reset(present: bool) -> [PinTransaction; 3] {
        let level = if present { State::Low } else { State::High };
        [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::get(level),
        ]
    }

    fn write_byte() -> Vec<PinTransaction> {
        (0..8)
            .flat_map(|_| [PinTransaction::set(State::Low), PinTransaction::set(State::High)])
            .collect()
    }

    fn read_byte(byte: u8) -> Vec<PinTransaction> {
        (0..8)
            .flat_map(|i| {
                let level = if byte >> i & 1 == 1 {
                    State::High
                } else {
                    State::Low
                };
                [
                    PinTransaction::set(State::Low),
                    PinTransaction::set(State::High),
                    PinTransaction::get(level),
                ]
            })
            .collect()
    }

    #[test]
    fn test_decode_positive() {
        let temperature = Temperature::from_raw(0x0191);
        assert!((temperature.celsius() - 25.0625).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_negative() {
        let temperature = Temperature::from_scratchpad(0x5E, 0xFF);
        assert_eq!(temperature.raw(), -162);
        assert!((temperature.celsius() + 10.125).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_zero() {
        assert!(f32::from(Temperature::from_raw(0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_idle_line() {
        // A floating line reads all ones.
        let temperature = Temperature::from_scratchpad(0xFF, 0xFF);
        assert!((temperature.celsius() + 0.0625).abs() < f32::EPSILON);
    }

    #[test]
    fn test_init_not_ready_touches_nothing() {
        let sim = SimBus::sensor(0x0191).not_ready();
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        assert_eq!(ds18b20.init(), Err(Ds18b20Error::NotReady));
        assert!(sim.records().is_empty());
        assert_eq!(sim.now_us(), 0);
    }

    #[test]
    fn test_init_ready() {
        let sim = SimBus::sensor(0x0191);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        assert_eq!(ds18b20.init(), Ok(()));
        assert!(sim.records().is_empty());
    }

    #[tokio::test]
    async fn test_read_temperature_no_presence() {
        let expectations = reset(false);

        let mut ds18b20 = mock_driver(&expectations);

        let result = ds18b20.read_temperature().await;
        assert!(matches!(result, Err(Ds18b20Error::NoPresence)));

        done(ds18b20);
    }

    #[tokio::test]
    async fn test_read_temperature_pin_error() {
        let expectations = [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::get(State::Low).with_error(MockError::Io(ErrorKind::Other)),
        ];

        let mut ds18b20 = mock_driver(&expectations);

        // The failed presence sample ends the transaction.
        let result = ds18b20.read_temperature().await;
        assert!(matches!(result, Err(Ds18b20Error::Pin(MockError::Io(ErrorKind::Other)))));

        done(ds18b20);
    }

    #[tokio::test]
    async fn test_pin_error_mid_transaction() {
        let mut expectations = Vec::new();
        expectations.extend(reset(true));
        expectations.extend(write_byte()); // Skip ROM.
        expectations.extend(write_byte()); // Convert T.
        expectations.extend(reset(true));
        expectations.extend(write_byte()); // Skip ROM.
        expectations.extend(write_byte()); // Read scratchpad.
        expectations.extend([
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::get(State::High).with_error(MockError::Io(ErrorKind::TimedOut)),
        ]);

        let mut ds18b20 = mock_driver(&expectations);

        let result = ds18b20.read_temperature().await;
        assert!(matches!(result, Err(Ds18b20Error::Pin(MockError::Io(ErrorKind::TimedOut)))));

        done(ds18b20);
    }

    #[tokio::test]
    async fn test_sentinel_on_pin_error() {
        let expectations = [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
            PinTransaction::get(State::Low).with_error(MockError::Io(ErrorKind::Other)),
        ];

        let mut ds18b20 = mock_driver(&expectations);

        let temp = ds18b20.read_celsius_or_sentinel().await;
        assert!((temp - NOT_DETECTED_CELSIUS).abs() < f32::EPSILON);

        done(ds18b20);
    }

    #[tokio::test]
    async fn test_read_temperature_pin_sequence() {
        let mut expectations = Vec::new();
        expectations.extend(reset(true));
        expectations.extend(write_byte()); // Skip ROM.
        expectations.extend(write_byte()); // Convert T.
        expectations.extend(reset(true));
        expectations.extend(write_byte()); // Skip ROM.
        expectations.extend(write_byte()); // Read scratchpad.
        expectations.extend(read_byte(0x50));
        expectations.extend(read_byte(0x05));

        let mut ds18b20 = mock_driver(&expectations);

        let temp = ds18b20.read_temperature().await.unwrap();
        assert!((temp - 85.0).abs() < f32::EPSILON);

        done(ds18b20);
    }

    #[tokio::test]
    async fn test_empty_bus_stops_after_first_reset() {
        let sim = SimBus::empty();
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let result = ds18b20.read_temperature().await;
        assert_eq!(result, Err(Ds18b20Error::NoPresence));

        // A single reset slot, no command byte and no conversion wait.
        assert_eq!(sim.low_pulses().len(), 1);
        assert!(sim.sleeps_ms().is_empty());
        assert_eq!(sim.now_us(), 960);
    }

    #[tokio::test]
    async fn test_full_transaction() {
        let sim = SimBus::sensor(0x0191);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let temperature = ds18b20.measure().await.unwrap();
        assert_eq!(temperature.raw(), 0x0191);
        assert!((temperature.celsius() - 25.0625).abs() < f32::EPSILON);

        assert_eq!(sim.reset_count(), 2);
        assert_eq!(
            sim.received_bytes(),
            [CMD_SKIP_ROM, CMD_CONVERT_T, CMD_SKIP_ROM, CMD_READ_SCRATCHPAD]
        );
        assert_eq!(sim.bytes_sent(), 2);
        assert_eq!(sim.sleeps_ms(), [CONVERSION_WAIT_MS]);
    }

    #[tokio::test]
    async fn test_negative_reading() {
        let sim = SimBus::sensor(-162);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let temp = ds18b20.read_temperature().await.unwrap();
        assert!((temp + 10.125).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_follows_temperature_changes() {
        let sim = SimBus::sensor(0x0191);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let first = ds18b20.read_temperature().await.unwrap();
        sim.set_raw_temperature(0);
        let second = ds18b20.read_temperature().await.unwrap();

        assert!((first - 25.0625).abs() < f32::EPSILON);
        assert!(second.abs() < f32::EPSILON);
        assert_eq!(sim.reset_count(), 4);
    }

    #[tokio::test]
    async fn test_sensor_lost_before_second_reset() {
        let sim = SimBus::sensor(0x0191).vanish_after_resets(1);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let result = ds18b20.read_temperature().await;
        assert_eq!(result, Err(Ds18b20Error::NoPresence));

        // The read scratchpad command is never issued.
        assert_eq!(sim.reset_count(), 2);
        assert_eq!(sim.received_bytes(), [CMD_SKIP_ROM, CMD_CONVERT_T]);
        assert_eq!(sim.bytes_sent(), 0);
    }

    #[tokio::test]
    async fn test_sentinel_on_missing_sensor() {
        let sim = SimBus::empty();
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let temp = ds18b20.read_celsius_or_sentinel().await;
        assert!((temp - NOT_DETECTED_CELSIUS).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_sentinel_passes_readings_through() {
        let sim = SimBus::sensor(0x0191);
        let mut ds18b20 = Ds18b20::new(sim.line(), sim.timing());

        let temp = ds18b20.read_celsius_or_sentinel().await;
        assert!((temp - 25.0625).abs() < f32::EPSILON);
    }

    #[test]
    fn test_error_display() {
        let error: Ds18b20Error<()> = Ds18b20Error::NoPresence;
        assert_eq!(alloc::format!("{error}"), "sensor not detected");
    }
}
