//! # Hardware ports
//!
//! The 1-Wire transport never touches the hardware directly. It talks to a
//! [`LinePort`], the single open-drain data line, and to a [`TimingPort`],
//! which provides the busy microsecond waits used inside bit timeslots and
//! the yielding millisecond sleep used while the sensor converts.
//!
//! [`OpenDrainLine`] and [`HalTiming`] adapt `embedded-hal` pins and delay
//! providers to these ports, so any HAL exposing an open-drain pin can drive
//! the bus.

use core::future::Future;
use core::result::Result;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use embedded_hal_async::delay::DelayNs as AsyncDelayNs;

/// The shared open-drain data line.
///
/// The line is owned by exactly one driver instance. Mode switches must be
/// idempotent and take effect immediately.
pub trait LinePort {
    /// Error returned by the underlying pin.
    type Error;

    /// Returns `true` when the underlying pin resource is usable.
    fn is_ready(&self) -> bool;

    /// Switches the line to driven output mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be reconfigured.
    fn configure_output(&mut self) -> Result<(), Self::Error>;

    /// Releases the line to floating input mode with pull-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be reconfigured.
    fn configure_input_pullup(&mut self) -> Result<(), Self::Error>;

    /// Drives the line to the given level. Meaningful in output mode only.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be written.
    fn write_level(&mut self, high: bool) -> Result<(), Self::Error>;

    /// Samples the line, returning `true` when it reads high.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be read.
    fn read_level(&mut self) -> Result<bool, Self::Error>;
}

/// Delay provider for the bus.
pub trait TimingPort {
    /// Blocks the caller for the given number of microseconds without
    /// yielding.
    fn busy_wait_us(&mut self, us: u32);

    /// Sleeps for the given number of milliseconds, yielding to other tasks.
    fn sleep_ms(&mut self, ms: u32) -> impl Future<Output = ()>;
}

/// A [`LinePort`] backed by an `embedded-hal` open-drain pin.
///
/// An open-drain pin is always an output: driving it high releases the line
/// to the external pull-up, so it doubles as the input mode and the pin can
/// be sampled at any time.
pub struct OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    pin: P,
}

impl<P> OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    /// Creates an [`OpenDrainLine`] from an open-drain pin.
    #[must_use]
    #[inline]
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    /// Returns the wrapped pin.
    #[inline]
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> LinePort for OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    type Error = P::Error;

    // The HAL hands out configured pins only.
    #[inline]
    fn is_ready(&self) -> bool {
        true
    }

    #[inline]
    fn configure_output(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    #[inline]
    fn configure_input_pullup(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high()
    }

    #[inline]
    fn write_level(&mut self, high: bool) -> Result<(), Self::Error> {
        self.pin.set_state(high.into())
    }

    #[inline]
    fn read_level(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high()
    }
}

/// A [`TimingPort`] made of two `embedded-hal` delay providers.
///
/// `busy` must block the core for the microsecond waits, while `sleeper` is
/// awaited for the conversion wait so the executor can run other tasks.
pub struct HalTiming<B, S>
where
    B: DelayNs,
    S: AsyncDelayNs,
{
    busy: B,
    sleeper: S,
}

impl<B, S> HalTiming<B, S>
where
    B: DelayNs,
    S: AsyncDelayNs,
{
    /// Creates a [`HalTiming`] from a blocking and an asynchronous delay.
    #[must_use]
    #[inline]
    pub fn new(busy: B, sleeper: S) -> Self {
        Self { busy, sleeper }
    }

    /// Returns the wrapped delay providers.
    #[inline]
    pub fn into_inner(self) -> (B, S) {
        (self.busy, self.sleeper)
    }
}

impl<B, S> TimingPort for HalTiming<B, S>
where
    B: DelayNs,
    S: AsyncDelayNs,
{
    #[inline]
    fn busy_wait_us(&mut self, us: u32) {
        self.busy.delay_us(us);
    }

    async fn sleep_ms(&mut self, ms: u32) {
        self.sleeper.delay_ms(ms).await;
    }
}
