//! `thermowire-os` is a library for sampling `thermowire` sensors on targets
//! running an operating system.
//!
//! A [`Poller`] owns a sensor driver and runs its temperature transaction at a
//! fixed interval on the `tokio` runtime. Each transaction produces a
//! [`SampleRecord`], logged through `tracing` and handed to the caller, who
//! can forward it anywhere, for example as a line of `JSON`.
//!
//! A failed transaction never stops the loop: the poller logs it and tries
//! again after the usual interval.
//!
//! [`HostTiming`] provides the delays the 1-Wire transport needs on a hosted
//! target. Together with an `OpenDrainLine` over a host GPIO pin, it lets a
//! [`Poller`] drive a real sensor.

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Error management.
pub mod error;
/// The polling loop.
pub mod poller;
/// Sample records and run summaries.
pub mod record;
/// Hosted delay provider.
pub mod timing;

pub use poller::Poller;
pub use record::{PollSummary, SampleRecord};
pub use timing::HostTiming;
