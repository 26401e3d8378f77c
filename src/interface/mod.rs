// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Platform seams.
//!
//! The driver talks to any `embedded_hal` 1.0 I2C bus and output pins. The
//! data-ready line additionally has to deliver falling edges to an
//! [`IrqNotifier`]. Linux backends built on `gpiod` and
//! `linux-embedded-hal` are available with the `linux` feature.

use embedded_hal::digital::InputPin;

use crate::sync::IrqNotifier;

#[cfg(feature = "linux")]
pub mod gpio;
#[cfg(feature = "linux")]
pub mod i2c;

/// The hub's active-low HINTN line.
pub trait DataReadyPin: InputPin {
    /// Route falling edges of the line to `notifier`.
    ///
    /// Called once by `init`. The edge handler must only call
    /// [`IrqNotifier::notify`].
    fn attach(&mut self, notifier: IrqNotifier) -> Result<(), Self::Error>;
}
