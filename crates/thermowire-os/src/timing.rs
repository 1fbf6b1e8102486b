use std::time::{Duration, Instant};

use thermowire_drivers::ports::TimingPort;

/// A [`TimingPort`] for hosted targets.
///
/// Microsecond waits spin on the monotonic clock, since the scheduler cannot
/// wake a thread with microsecond accuracy. Millisecond sleeps go through
/// the `tokio` timer and yield to the runtime.
///
/// Pair it with an [`OpenDrainLine`] wrapping a GPIO pin exposed by the host
/// through `embedded-hal`.
///
/// [`OpenDrainLine`]: thermowire_drivers::ports::OpenDrainLine
#[derive(Debug, Default, Clone, Copy)]
pub struct HostTiming;

impl HostTiming {
    /// Creates a [`HostTiming`].
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TimingPort for HostTiming {
    fn busy_wait_us(&mut self, us: u32) {
        let deadline = Instant::now() + Duration::from_micros(u64::from(us));
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    async fn sleep_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
    }
}
