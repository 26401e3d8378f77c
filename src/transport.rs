// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Raw I2C transport to the hub.
//!
//! The hub does not use register addresses: every read starts at the
//! beginning of its output frame, every write is one whole frame. This
//! layer knows nothing about framing.

use embedded_hal::digital::{Error as _, InputPin};
use embedded_hal::i2c::{Error as _, I2c};
use log::error;

use crate::Error;

/// I2C bus plus the data-ready line of one hub
pub struct I2cTransport<I2C, IRQ> {
    i2c: I2C,
    irq: IRQ,
    address: u8,
}

impl<I2C, IRQ> I2cTransport<I2C, IRQ>
where
    I2C: I2c,
    IRQ: InputPin,
{
    pub fn new(i2c: I2C, irq: IRQ, address: u8) -> Self {
        Self { i2c, irq, address }
    }

    /// One write transaction
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.i2c.write(self.address, bytes).map_err(|e| {
            error!("Failed to write to I2C with err: {:?}", e);
            Error::Bus(e.kind())
        })
    }

    /// One read transaction of exactly `buf.len()` bytes
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.i2c.read(self.address, buf).map_err(|e| {
            error!("Failed to read from I2C with err: {:?}", e);
            Error::Bus(e.kind())
        })
    }

    pub fn irq_mut(&mut self) -> &mut IRQ {
        &mut self.irq
    }

    /// The hub pulls the line low while it has a frame for us
    pub fn irq_asserted(&mut self) -> Result<bool, Error> {
        self.irq.is_low().map_err(|e| Error::Pin(e.kind()))
    }
}
