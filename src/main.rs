// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

use bno08x_i2c::interface::gpio::{GpiodIrq, GpiodOut};
use bno08x_i2c::interface::i2c;
use bno08x_i2c::{Bno08x, DriverConfig};
use gpiod::Chip;
use log::info;

use std::{error::Error, f32::consts::PI, thread::sleep, time::Duration};

/// Static pin map of the reference carrier board
const I2C_BUS: &str = "/dev/i2c-1";
const GPIO_CHIP: &str = "/dev/gpiochip0";
const PIN_INT: u32 = 17;
const PIN_RST: u32 = 27;
const PIN_BOOT: u32 = 22;

const REPORT_INTERVAL_US: u32 = 10_000;
const PRINT_INTERVAL_MS: u64 = 50;

const RAD_TO_DEG: f32 = 180f32 / PI;

fn quaternion_to_euler(qr: f32, qi: f32, qj: f32, qk: f32) -> [f32; 3] {
    let sqr = qr * qr;
    let sqi = qi * qi;
    let sqj = qj * qj;
    let sqk = qk * qk;

    let yaw = (2.0 * (qi * qj + qk * qr)).atan2(sqi - sqj - sqk + sqr) * RAD_TO_DEG;
    let pitch = (-2.0 * (qi * qk - qj * qr) / (sqi + sqj + sqk + sqr)).asin() * RAD_TO_DEG;
    let roll = (2.0 * (qj * qk + qi * qr)).atan2(-sqi - sqj + sqk + sqr) * RAD_TO_DEG;

    [yaw, pitch, roll]
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let chip = Chip::new(GPIO_CHIP)?;
    let irq = GpiodIrq::new(&chip, PIN_INT)?;
    let reset = GpiodOut::new(&chip, PIN_RST, false)?;
    let boot = GpiodOut::new(&chip, PIN_BOOT, false)?;
    let bus = i2c::open(I2C_BUS)?;

    let mut imu = Bno08x::new(DriverConfig::default().with_command_timeout(Duration::from_secs(2)));
    imu.init(bus, irq, reset, boot)?;
    imu.start()?;
    imu.enable_orientation(REPORT_INTERVAL_US)?;
    info!("orientation enabled at {} us", REPORT_INTERVAL_US);

    loop {
        sleep(Duration::from_millis(PRINT_INTERVAL_MS));
        if let Some(report) = imu.orientation() {
            let [qi, qj, qk, qr] = report.quaternion();
            println!(
                "Current rotation: {:?} (accuracy {:.3} rad, {:?})",
                quaternion_to_euler(qr, qi, qj, qk),
                report.accuracy,
                report.common.status
            );
        }
    }
}
