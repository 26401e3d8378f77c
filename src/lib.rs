// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Driver for the BNO08x sensor hub over I2C.
//!
//! The hub speaks SHTP: every transfer is a frame with a 4-byte
//! length/channel/sequence header. This crate brings the device out of
//! reset, enables output features, and keeps a background service thread
//! ingesting sensor reports while foreground callers issue blocking
//! configuration commands.
//!
//! All bus traffic is serialized by a single-slot bus token (see
//! [`sync::BusArbiter`]). The background service holds it for one
//! receive-and-dispatch cycle at a time; foreground calls hold it for a
//! whole command round-trip.

pub mod constants;
pub mod driver;
pub mod interface;
pub mod reports;
pub mod shtp;
pub mod sync;
pub mod transport;

pub use driver::{Bno08x, DriverConfig, Lifecycle};
pub use reports::{Message, OrientationReport, ReportStatus};
pub use sync::IrqNotifier;

use embedded_hal::{digital, i2c};

/// Errors in this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `init` was called on a driver that already owns its resources
    #[error("driver is already initialized")]
    AlreadyInitialized,
    /// The operation needs a prior successful `init`
    #[error("driver is not initialized")]
    NotInitialized,
    /// The operation needs the device to be out of reset (`start`)
    #[error("driver is not running")]
    NotRunning,
    /// I2C transaction failed
    #[error("I2C bus error: {0:?}")]
    Bus(i2c::ErrorKind),
    /// Pin setting or sensing failed
    #[error("pin error: {0:?}")]
    Pin(digital::ErrorKind),
    /// A deadline elapsed before the awaited condition arrived
    #[error("timed out waiting for the sensor hub")]
    Timeout,
    /// The header announced a fragmented transfer, which is not supported
    #[error("SHTP continuation frames are not supported")]
    Continuation,
    /// The header length is smaller than the header itself
    #[error("SHTP frame too small: {0} bytes")]
    FrameTooShort(u16),
    /// The header length does not fit the receive buffer
    #[error("SHTP frame too big: {0} bytes")]
    FrameTooLong(u16),
    /// An outgoing payload does not fit the send buffer
    #[error("outgoing payload too long: {0} bytes")]
    PayloadTooLong(usize),
    /// The background service thread could not be spawned
    #[error("failed to spawn service thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl Error {
    /// Framing errors abort one receive but leave the link usable.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::Continuation | Error::FrameTooShort(_) | Error::FrameTooLong(_)
        )
    }
}
