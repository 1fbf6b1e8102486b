//! `thermowire-drivers` is a library for talking to a 1-Wire temperature
//! sensor through a single open-drain GPIO line, without any dedicated
//! protocol hardware.
//!
//! The crate is layered from the hardware up:
//!
//! - [`ports`] defines the line and timing capabilities the protocol needs,
//!   along with adapters for `embedded-hal` pins and delays
//! - [`onewire`] bit-bangs reset, bit and byte timeslots on those ports
//! - [`ds18b20`] runs the temperature transaction of a `DS18B20` sensor and
//!   decodes its reading
//!
//! Each driver owns its line: a line must never be shared by two drivers or
//! used from two execution contexts at once.
//!
//! The `sim` feature enables a simulated line running on a virtual clock,
//! useful for testing the drivers and the code built on top of them.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod ports;

pub mod onewire;

#[cfg(feature = "ds18b20")]
#[cfg_attr(docsrs, doc(cfg(feature = "ds18b20")))]
pub mod ds18b20;

#[cfg(any(test, feature = "sim"))]
#[cfg_attr(docsrs, doc(cfg(feature = "sim")))]
pub mod sim;
