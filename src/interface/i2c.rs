// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Linux I2C character device.

use std::path::Path;

pub use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
pub use linux_embedded_hal::I2cdev;

/// Open an I2C adapter such as `/dev/i2c-1`. The slave address is chosen
/// per transaction by the driver.
pub fn open<P: AsRef<Path>>(path: P) -> Result<I2cdev, LinuxI2CError> {
    I2cdev::new(path)
}
