// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! GPIO lines through the Linux GPIO character device.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use gpiod::{Chip, EdgeDetect, Input, Lines, Options, Output};
use log::{debug, error};

use super::DataReadyPin;
use crate::sync::IrqNotifier;

/// I/O error from the GPIO character device
#[derive(Debug)]
pub struct GpioError(pub io::Error);

impl digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<io::Error> for GpioError {
    fn from(e: io::Error) -> Self {
        GpioError(e)
    }
}

/// Output line (reset, boot-select)
pub struct GpiodOut {
    output: Lines<Output>,
}

impl GpiodOut {
    pub fn new(chip: &Chip, pin: u32, initial: bool) -> io::Result<GpiodOut> {
        let opts = Options::output([pin])
            .values([initial])
            .consumer("bno08x-out");

        Ok(GpiodOut {
            output: chip.request_lines(opts)?,
        })
    }
}

impl ErrorType for GpiodOut {
    type Error = GpioError;
}

impl OutputPin for GpiodOut {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.output.set_values([false])?;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.output.set_values([true])?;
        Ok(())
    }
}

/// Data-ready input with edge detection.
///
/// Once attached, a watcher thread blocks on kernel edge events, refreshes
/// the cached line level and raises the IRQ flag whenever the line reads
/// low. Level queries after attach read that cache.
pub struct GpiodIrq {
    input: Option<Lines<Input>>,
    level_low: Arc<AtomicBool>,
    pin: u32,
}

impl GpiodIrq {
    pub fn new(chip: &Chip, pin: u32) -> io::Result<GpiodIrq> {
        let opts = Options::input([pin])
            .edge(EdgeDetect::Both)
            .consumer("bno08x-int");
        let input = chip.request_lines(opts)?;
        let [high] = input.get_values([false])?;

        Ok(GpiodIrq {
            input: Some(input),
            level_low: Arc::new(AtomicBool::new(!high)),
            pin,
        })
    }
}

impl ErrorType for GpiodIrq {
    type Error = GpioError;
}

impl InputPin for GpiodIrq {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        match &self.input {
            Some(input) => {
                let [high] = input.get_values([false])?;
                Ok(!high)
            }
            None => Ok(self.level_low.load(Ordering::Acquire)),
        }
    }
}

impl DataReadyPin for GpiodIrq {
    fn attach(&mut self, notifier: IrqNotifier) -> Result<(), Self::Error> {
        let input = self.input.take().ok_or_else(|| {
            GpioError(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "interrupt line already attached",
            ))
        })?;
        let level_low = self.level_low.clone();
        let pin = self.pin;

        thread::Builder::new()
            .name("bno08x-irq".into())
            .spawn(move || watch_edges(input, pin, level_low, notifier))?;
        debug!("attached edge watcher to line {}", pin);
        Ok(())
    }
}

fn watch_edges(
    mut input: Lines<Input>,
    pin: u32,
    level_low: Arc<AtomicBool>,
    notifier: IrqNotifier,
) {
    loop {
        if let Err(e) = input.read_event() {
            error!("edge watch on line {} failed: {}", pin, e);
            return;
        }
        match input.get_values([false]) {
            Ok([high]) => {
                level_low.store(!high, Ordering::Release);
                if !high {
                    notifier.notify();
                }
            }
            Err(e) => {
                error!("level read on line {} failed: {}", pin, e);
                return;
            }
        }
    }
}
