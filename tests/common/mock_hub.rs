// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scripted BNO08x hub behind embedded-hal mocks.
//!
//! The hub keeps a queue of outgoing frames and holds its data-ready line
//! low while the queue is non-empty. Like the real part over I2C, every
//! read starts at the frame header: the first read of a frame is a header
//! read and leaves the frame queued, the next read transfers and drops it.

#![allow(dead_code)]

use bno08x_i2c::constants::{
    CHANNEL_EXECUTABLE, CHANNEL_HUB_CONTROL, EXECUTABLE_DEVICE_RESP_RESET_COMPLETE, NUM_CHANNELS,
    PACKET_HEADER_LENGTH, SHUB_GET_FEATURE_RESP, SHUB_REPORT_SET_FEATURE_CMD,
};
use bno08x_i2c::interface::DataReadyPin;
use bno08x_i2c::IrqNotifier;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

/// Records bus and pin activity
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// I2C read transaction
    Read {
        /// Target address
        address: u8,
        /// Requested length
        len: usize,
    },
    /// I2C write transaction
    Write {
        /// Target address
        address: u8,
        /// Bytes written
        bytes: Vec<u8>,
    },
    /// Reset line driven
    Reset(bool),
    /// Boot-select line driven
    Boot(bool),
}

#[derive(Debug)]
struct HubState {
    /// Frames waiting to be read by the host
    pending: VecDeque<Vec<u8>>,
    /// The front frame's header was already served
    header_served: bool,
    /// Hub side sequence counters
    next_seq: [u8; NUM_CHANNELS],
    operations: Vec<Operation>,
    notifier: Option<IrqNotifier>,

    reset_high: bool,
    boot_high: bool,
    /// Frames emitted on reset release, ahead of reset complete
    boot_frames: Vec<(u8, Vec<u8>)>,
    send_reset_complete: bool,
    answer_set_feature: bool,
    /// Frames emitted ahead of the next Get Feature response
    feature_preamble: Vec<(u8, Vec<u8>)>,

    /// Failure injection
    fail_reads: bool,
    fail_attach: bool,
}

impl HubState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            header_served: false,
            next_seq: [0; NUM_CHANNELS],
            operations: Vec::new(),
            notifier: None,
            reset_high: false,
            boot_high: false,
            boot_frames: Vec::new(),
            send_reset_complete: true,
            answer_set_feature: true,
            feature_preamble: Vec::new(),
            fail_reads: false,
            fail_attach: false,
        }
    }

    fn notify(&self) {
        if !self.pending.is_empty() {
            if let Some(notifier) = &self.notifier {
                notifier.notify();
            }
        }
    }

    /// Queue a frame with the next hub sequence number of `channel`
    fn enqueue(&mut self, channel: u8, payload: &[u8]) {
        let seq = match self.next_seq.get_mut(channel as usize) {
            Some(seq) => {
                let current = *seq;
                *seq = current.wrapping_add(2);
                current
            }
            None => 0,
        };
        self.pending.push_back(frame(channel, seq, payload));
        self.notify();
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.operations.push(Operation::Read {
            address,
            len: buf.len(),
        });
        if self.fail_reads {
            return Err(ErrorKind::Other);
        }

        buf.fill(0);
        let Some(front) = self.pending.front() else {
            return Ok(());
        };
        let n = buf.len().min(front.len());
        buf[..n].copy_from_slice(&front[..n]);

        if self.header_served || front.len() <= buf.len() {
            self.pending.pop_front();
            self.header_served = false;
        } else {
            self.header_served = true;
        }
        self.notify();
        Ok(())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.operations.push(Operation::Write {
            address,
            bytes: bytes.to_vec(),
        });
        let body = &bytes[PACKET_HEADER_LENGTH.min(bytes.len())..];
        if bytes.get(2) == Some(&CHANNEL_HUB_CONTROL)
            && body.first() == Some(&SHUB_REPORT_SET_FEATURE_CMD)
            && self.answer_set_feature
        {
            for (channel, payload) in std::mem::take(&mut self.feature_preamble) {
                self.enqueue(channel, &payload);
            }
            // Get Feature response mirrors the request fields
            let mut response = body.to_vec();
            response[0] = SHUB_GET_FEATURE_RESP;
            self.enqueue(CHANNEL_HUB_CONTROL, &response);
        }
        Ok(())
    }

    /// Held in reset the hub forgets queued output and sequence state
    fn enter_reset(&mut self) {
        self.pending.clear();
        self.header_served = false;
        self.next_seq = [0; NUM_CHANNELS];
    }

    fn release_reset(&mut self) {
        for (channel, payload) in std::mem::take(&mut self.boot_frames) {
            self.enqueue(channel, &payload);
        }
        if self.send_reset_complete {
            self.enqueue(CHANNEL_EXECUTABLE, &[EXECUTABLE_DEVICE_RESP_RESET_COMPLETE]);
        }
    }
}

/// Build a raw SHTP frame
pub fn frame(channel: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
    let len = (PACKET_HEADER_LENGTH + payload.len()) as u16;
    let [lo, hi] = len.to_le_bytes();
    let mut bytes = vec![lo, hi, channel, seq];
    bytes.extend_from_slice(payload);
    bytes
}

/// AR/VR rotation vector sub-report from raw Q-point fields
pub fn orientation_report(seq: u8, raw: [i16; 5]) -> Vec<u8> {
    let mut bytes = vec![0x28, seq, 0x03, 0x00];
    for field in raw {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    bytes
}

/// Handle used by tests to script the hub and inspect traffic
#[derive(Clone)]
pub struct MockHub {
    state: Arc<Mutex<HubState>>,
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap()
    }

    /// Bus, data-ready, reset and boot pins wired to this hub
    pub fn parts(&self) -> (MockI2c, MockIrq, MockPin, MockPin) {
        (
            MockI2c {
                state: self.state.clone(),
            },
            MockIrq {
                state: self.state.clone(),
            },
            MockPin {
                state: self.state.clone(),
                role: PinRole::Reset,
            },
            MockPin {
                state: self.state.clone(),
                role: PinRole::Boot,
            },
        )
    }

    /// Send a frame to the host now
    pub fn push(&self, channel: u8, payload: &[u8]) {
        self.lock().enqueue(channel, payload);
    }

    /// Queue raw bytes as they are, header included
    pub fn push_raw(&self, bytes: Vec<u8>) {
        let mut hub = self.lock();
        hub.pending.push_back(bytes);
        hub.notify();
    }

    /// Emit a frame when reset is released, before reset complete
    pub fn on_boot(&self, channel: u8, payload: &[u8]) {
        self.lock().boot_frames.push((channel, payload.to_vec()));
    }

    /// Emit a frame right before the next Get Feature response
    pub fn before_feature_response(&self, channel: u8, payload: &[u8]) {
        self.lock()
            .feature_preamble
            .push((channel, payload.to_vec()));
    }

    pub fn set_reset_complete(&self, enabled: bool) {
        self.lock().send_reset_complete = enabled;
    }

    pub fn set_answer_set_feature(&self, enabled: bool) {
        self.lock().answer_set_feature = enabled;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_attach(&self, fail: bool) {
        self.lock().fail_attach = fail;
    }

    /// Bus and pin handles still alive outside this `MockHub`
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.state) - 1
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Lengths of every read transaction so far
    pub fn reads(&self) -> Vec<usize> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Read { len, .. } => Some(*len),
                _ => None,
            })
            .collect()
    }

    /// Every write transaction so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write { bytes, .. } => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn reset_high(&self) -> bool {
        self.lock().reset_high
    }

    pub fn boot_high(&self) -> bool {
        self.lock().boot_high
    }

    pub fn is_attached(&self) -> bool {
        self.lock().notifier.is_some()
    }
}

pub struct MockI2c {
    state: Arc<Mutex<HubState>>,
}

impl i2c::ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut hub = self.state.lock().unwrap();
        for op in operations {
            match op {
                i2c::Operation::Read(buf) => hub.read(address, buf)?,
                i2c::Operation::Write(bytes) => hub.write(address, bytes)?,
            }
        }
        Ok(())
    }
}

/// Data-ready line: low while the hub has frames queued
pub struct MockIrq {
    state: Arc<Mutex<HubState>>,
}

impl digital::ErrorType for MockIrq {
    type Error = digital::ErrorKind;
}

impl InputPin for MockIrq {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.state.lock().unwrap().pending.is_empty())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state.lock().unwrap().pending.is_empty())
    }
}

impl DataReadyPin for MockIrq {
    fn attach(&mut self, notifier: IrqNotifier) -> Result<(), Self::Error> {
        let mut hub = self.state.lock().unwrap();
        if hub.fail_attach {
            return Err(digital::ErrorKind::Other);
        }
        hub.notifier = Some(notifier);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum PinRole {
    Reset,
    Boot,
}

pub struct MockPin {
    state: Arc<Mutex<HubState>>,
    role: PinRole,
}

impl MockPin {
    fn drive(&mut self, high: bool) {
        let mut hub = self.state.lock().unwrap();
        match self.role {
            PinRole::Reset => {
                hub.operations.push(Operation::Reset(high));
                let released = high && !hub.reset_high;
                hub.reset_high = high;
                if !high {
                    hub.enter_reset();
                } else if released {
                    hub.release_reset();
                }
            }
            PinRole::Boot => {
                hub.operations.push(Operation::Boot(high));
                hub.boot_high = high;
            }
        }
    }
}

impl digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}
