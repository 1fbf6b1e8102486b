use std::fmt::Debug;
use std::time::Duration;

use tracing::{error, info};

use thermowire_drivers::ds18b20::Ds18b20;
use thermowire_drivers::ports::{LinePort, TimingPort};

use crate::error::{Error, ErrorKind, Result};
use crate::record::{PollSummary, SampleRecord};

// Default interval between two transactions.
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Periodically reads a [`Ds18b20`] sensor.
///
/// Each transaction is attempted once. A failed transaction is logged and
/// the poller simply tries again after the usual interval, without backoff.
pub struct Poller<L, T>
where
    L: LinePort,
    T: TimingPort,
{
    sensor: Ds18b20<L, T>,
    interval: Duration,
    samples: Option<u64>,
}

impl<L, T> Poller<L, T>
where
    L: LinePort,
    L::Error: Debug,
    T: TimingPort,
{
    /// Creates a [`Poller`] reading the given sensor every two seconds,
    /// indefinitely.
    #[must_use]
    pub const fn new(sensor: Ds18b20<L, T>) -> Self {
        Self {
            sensor,
            interval: DEFAULT_INTERVAL,
            samples: None,
        }
    }

    /// Sets the interval between the end of a transaction and the start of
    /// the next one.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stops the poller after the given number of transactions.
    #[must_use]
    pub const fn samples(mut self, samples: u64) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Checks the sensor line, then runs the polling loop, handing every
    /// [`SampleRecord`] to `on_sample`.
    ///
    /// Without a sample limit, this method never returns successfully.
    ///
    /// # Errors
    ///
    /// Fails if the sensor line is not ready. Failed transactions are not
    /// errors, they are reported through their [`SampleRecord`].
    pub async fn run<F>(&mut self, mut on_sample: F) -> Result<PollSummary>
    where
        F: FnMut(&SampleRecord),
    {
        self.sensor
            .init()
            .map_err(|e| Error::new(ErrorKind::Sensor, e.to_string()))?;

        let mut summary = PollSummary::default();
        let mut sequence = 0;
        while self.samples.is_none_or(|limit| sequence < limit) {
            if sequence > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let result = self.sensor.measure().await;
            let record = SampleRecord::new(sequence, &result);
            match (&record.celsius, &record.error) {
                (Some(celsius), _) => info!("Temperature: {celsius:.2} °C"),
                (None, Some(e)) => error!("Temperature read failed: {e}"),
                (None, None) => {}
            }

            on_sample(&record);
            summary.add(&record);
            sequence += 1;
        }

        Ok(summary)
    }

    /// Returns the sensor.
    #[inline]
    pub fn into_inner(self) -> Ds18b20<L, T> {
        self.sensor
    }
}
