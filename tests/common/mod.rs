// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and mock implementations

#![allow(dead_code)]

pub mod mock_hub;

pub use mock_hub::{frame, orientation_report, MockHub, MockI2c, MockIrq, MockPin, Operation};

use bno08x_i2c::{Bno08x, DriverConfig};
use std::sync::Once;
use std::time::{Duration, Instant};

pub type MockDriver = Bno08x<MockI2c, MockIrq, MockPin, MockPin>;

static INIT: Once = Once::new();

/// Initialize logger for tests (only once)
pub fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Config with a bounded command timeout so a broken exchange fails the
/// test instead of hanging it
pub fn test_config() -> DriverConfig {
    DriverConfig::default()
        .with_service_name("bno08x-test")
        .with_command_timeout(Duration::from_secs(2))
}

/// Driver initialized against a fresh mock hub
pub fn init_driver(config: DriverConfig) -> (MockDriver, MockHub) {
    init_logger();
    let hub = MockHub::new();
    let (i2c, irq, reset, boot) = hub.parts();
    let mut imu = Bno08x::new(config);
    imu.init(i2c, irq, reset, boot).expect("init");
    (imu, hub)
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
