// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! BNO08x sensor hub driver.
//!
//! [`Bno08x`] owns the bus, the pins and a background service thread.
//! After [`init`](Bno08x::init) the service thread drains every frame the
//! hub sends whenever no foreground exchange holds the bus token.
//! [`start`](Bno08x::start) and [`enable_feature`](Bno08x::enable_feature)
//! take the token for a whole command round-trip and route every frame
//! that is not their answer through the same dispatcher.

use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::I2c;
use log::{debug, error, info, trace, warn};

use crate::constants::{
    CHANNEL_EXECUTABLE, CHANNEL_HUB_CONTROL, DEFAULT_ADDRESS, EXECUTABLE_DEVICE_RESP_RESET_COMPLETE,
    PACKET_HEADER_LENGTH, RESET_COMPLETE_FRAME_LEN, SENSOR_REPORTID_ARVR_ROTATION_VECTOR,
    SHUB_GET_FEATURE_RESP,
};
use crate::interface::DataReadyPin;
use crate::reports::{self, Message, OrientationReport, SetFeatureCommand};
use crate::shtp::{Frame, ShtpCodec};
use crate::sync::{BusArbiter, EventFlags, IrqNotifier, EVENT_BUS_FREE, EVENT_IRQ};
use crate::transport::I2cTransport;
use crate::Error;

/// Driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// 7-bit I2C address of the hub
    pub address: u8,
    /// Name of the background service thread
    pub service_name: String,
    /// Stack size of the background service thread in bytes
    pub service_stack_size: usize,
    /// Upper bound for `start` and `enable_feature`. `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// Consecutive background receive failures between escalated log lines
    pub failure_log_threshold: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            service_name: "bno08x-service".to_string(),
            service_stack_size: 64 * 1024,
            command_timeout: None,
            failure_log_threshold: 10,
        }
    }
}

impl DriverConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_service_stack_size(mut self, bytes: usize) -> Self {
        self.service_stack_size = bytes;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn with_failure_log_threshold(mut self, failures: u32) -> Self {
        self.failure_log_threshold = failures;
        self
    }
}

/// Driver lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No resources owned
    Uninitialized,
    /// Pins and bus registered, service thread running, hub held in reset
    Initialized,
    /// Hub out of reset and accepting commands
    Running,
}

/// Latest values seen by the dispatcher
#[derive(Debug, Default)]
struct Readings {
    orientation: Option<OrientationReport>,
    base_delta: Option<i32>,
    enabled: HashSet<u8>,
}

type Listener = Box<dyn FnMut(&Message) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pin_error<E: digital::Error>(e: E) -> Error {
    Error::Pin(e.kind())
}

fn is_reset_complete(frame: &Frame<'_>) -> bool {
    frame.channel() == CHANNEL_EXECUTABLE
        && frame.len() == RESET_COMPLETE_FRAME_LEN as usize
        && frame.bytes[PACKET_HEADER_LENGTH] == EXECUTABLE_DEVICE_RESP_RESET_COMPLETE
}

/// Everything behind the bus token
struct Device<I2C, IRQ, RST, BOOT> {
    transport: I2cTransport<I2C, IRQ>,
    codec: ShtpCodec,
    reset: RST,
    boot: BOOT,
}

/// State shared between the foreground handle and the service thread
struct Shared<I2C, IRQ, RST, BOOT> {
    events: Arc<EventFlags>,
    bus: BusArbiter,
    /// Only locked by the bus token holder, so never contended
    device: Mutex<Device<I2C, IRQ, RST, BOOT>>,
    readings: Arc<Mutex<Readings>>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl<I2C, IRQ, RST, BOOT> Shared<I2C, IRQ, RST, BOOT>
where
    I2C: I2c,
    IRQ: DataReadyPin,
    RST: OutputPin,
    BOOT: OutputPin,
{
    fn lock_device(&self) -> MutexGuard<'_, Device<I2C, IRQ, RST, BOOT>> {
        lock(&self.device)
    }

    /// Block until the data-ready line is asserted.
    ///
    /// With `acquire` the wait also takes the bus token and is meant for
    /// the service thread; otherwise the caller already holds it. The line
    /// level is re-read after every wake, because the edge may predate the
    /// wait or belong to a frame that was already drained.
    fn wait_for_irq(
        &self,
        deadline: Option<Instant>,
        acquire: bool,
    ) -> Result<MutexGuard<'_, Device<I2C, IRQ, RST, BOOT>>, Error> {
        let mask = if acquire {
            EVENT_IRQ | EVENT_BUS_FREE
        } else {
            EVENT_IRQ
        };
        loop {
            let woke = self.events.wait_all(mask, deadline);
            if woke || !acquire {
                let mut device = self.lock_device();
                if device.transport.irq_asserted()? {
                    return Ok(device);
                }
            }
            if woke && acquire {
                self.bus.release();
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Timeout);
            }
        }
    }

    /// Read one frame into the receive arena.
    ///
    /// The header is read and validated first so an oversized frame is
    /// rejected before any payload transfer. The hub restarts every read
    /// at the header, so the second read moves the whole frame.
    fn receive(
        &self,
        deadline: Option<Instant>,
        acquire: bool,
    ) -> Result<MutexGuard<'_, Device<I2C, IRQ, RST, BOOT>>, Error> {
        let mut header = [0u8; PACKET_HEADER_LENGTH];
        let len = {
            let mut device = self.wait_for_irq(deadline, acquire)?;
            device.transport.read_raw(&mut header)?;
            device.codec.accept_header(&header)?
        };

        let mut device = self.wait_for_irq(deadline, false)?;
        let Device {
            transport, codec, ..
        } = &mut *device;
        transport.read_raw(codec.rx_mut(len))?;
        Ok(device)
    }

    fn send(&self, channel: u8, payload: &[u8]) -> Result<(), Error> {
        let mut device = self.lock_device();
        let Device {
            transport, codec, ..
        } = &mut *device;
        let frame = codec.encode(channel, payload)?;
        trace!("Sending {} bytes on chan {}", frame.len(), channel);
        transport.send_raw(frame)
    }

    /// Receive frames until `done` accepts one. Everything else goes to
    /// the dispatcher. Framing errors are logged and the wait goes on.
    fn exchange_until(
        &self,
        deadline: Option<Instant>,
        mut done: impl FnMut(&Frame<'_>) -> bool,
    ) -> Result<(), Error> {
        loop {
            match self.receive(deadline, false) {
                Ok(device) => {
                    let frame = device.codec.frame();
                    if done(&frame) {
                        return Ok(());
                    }
                    self.dispatch(&frame);
                }
                Err(e) if e.is_framing() => {
                    error!("Dropped frame: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dispatch(&self, frame: &Frame<'_>) {
        reports::dispatch(frame, &mut |msg| self.deliver(msg));
    }

    fn deliver(&self, msg: Message) {
        {
            let mut readings = lock(&self.readings);
            match &msg {
                Message::Orientation(report) => readings.orientation = Some(*report),
                Message::BaseTimestamp(ts) => readings.base_delta = Some(ts.base_delta),
                _ => {}
            }
        }
        if let Some(listener) = lock(&self.listener).as_mut() {
            listener(&msg);
        }
    }

    /// Background service: the default occupant of the bus
    fn service(&self, failure_log_threshold: u32) {
        let threshold = failure_log_threshold.max(1);
        let mut failures: u32 = 0;
        loop {
            match self.receive(None, true) {
                Ok(device) => {
                    failures = 0;
                    self.dispatch(&device.codec.frame());
                    drop(device);
                    self.bus.release();
                }
                Err(e) => {
                    self.bus.release();
                    failures = failures.saturating_add(1);
                    error!("Service receive failed: {}", e);
                    if failures % threshold == 0 {
                        error!(
                            "{} consecutive receive failures, the hub may need a reset",
                            failures
                        );
                    }
                }
            }
        }
    }
}

/// BNO08x driver over I2C
///
/// `I2C` is the bus, `IRQ` the data-ready line, `RST` and `BOOT` the
/// active-low reset and boot-select lines.
pub struct Bno08x<I2C, IRQ, RST, BOOT> {
    config: DriverConfig,
    state: Lifecycle,
    shared: Option<Arc<Shared<I2C, IRQ, RST, BOOT>>>,
    readings: Arc<Mutex<Readings>>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl<I2C, IRQ, RST, BOOT> Bno08x<I2C, IRQ, RST, BOOT>
where
    I2C: I2c + Send + 'static,
    IRQ: DataReadyPin + Send + 'static,
    RST: OutputPin + Send + 'static,
    BOOT: OutputPin + Send + 'static,
{
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            state: Lifecycle::Uninitialized,
            shared: None,
            readings: Arc::default(),
            listener: Arc::default(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Take ownership of the bus and pins and spawn the service thread.
    ///
    /// The hub is left in reset with boot-select low until
    /// [`start`](Self::start). One-shot: a second call fails with
    /// [`Error::AlreadyInitialized`].
    pub fn init(
        &mut self,
        i2c: I2C,
        irq: IRQ,
        mut reset: RST,
        mut boot: BOOT,
    ) -> Result<(), Error> {
        if self.shared.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        debug!("driver init, address 0x{:02X}", self.config.address);

        reset.set_low().map_err(pin_error)?;
        boot.set_low().map_err(pin_error)?;

        let events = Arc::new(EventFlags::new());
        let notifier = IrqNotifier::new(events.clone());
        let shared = Arc::new(Shared {
            bus: BusArbiter::new(events.clone()),
            events,
            device: Mutex::new(Device {
                transport: I2cTransport::new(i2c, irq, self.config.address),
                codec: ShtpCodec::new(),
                reset,
                boot,
            }),
            readings: self.readings.clone(),
            listener: self.listener.clone(),
        });

        // The service waits for the go signal so a failed attach leaves
        // nothing running
        let (go, ready) = mpsc::channel::<()>();
        let service = shared.clone();
        let threshold = self.config.failure_log_threshold;
        thread::Builder::new()
            .name(self.config.service_name.clone())
            .stack_size(self.config.service_stack_size)
            .spawn(move || {
                if ready.recv().is_ok() {
                    service.service(threshold);
                }
            })
            .map_err(Error::Spawn)?;
        debug!("service thread '{}' spawned", self.config.service_name);

        shared
            .lock_device()
            .transport
            .irq_mut()
            .attach(notifier)
            .map_err(pin_error)?;

        shared.bus.release();
        // The receiver only goes away if the thread died
        let _ = go.send(());

        self.shared = Some(shared);
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn shared(&self) -> Result<Arc<Shared<I2C, IRQ, RST, BOOT>>, Error> {
        self.shared.clone().ok_or(Error::NotInitialized)
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.command_timeout.map(|t| Instant::now() + t)
    }

    /// Reset the hub and wait for its reset-complete report.
    ///
    /// Every attempt pulses reset, so a call that timed out can be
    /// retried. Frames that arrive first (advertisements, error lists)
    /// are dispatched as usual.
    pub fn start(&mut self) -> Result<(), Error> {
        let shared = self.shared()?;
        if self.state == Lifecycle::Running {
            debug!("hub already running");
            return Ok(());
        }
        let deadline = self.deadline();
        let _bus = shared.bus.acquire(deadline).ok_or(Error::Timeout)?;

        {
            let mut device = shared.lock_device();
            device.reset.set_low().map_err(pin_error)?;
            device.boot.set_high().map_err(pin_error)?;
            // The hub restarts its sequence numbers
            device.codec = ShtpCodec::new();
            device.reset.set_high().map_err(pin_error)?;
        }
        debug!("reset released, waiting for reset complete");

        shared.exchange_until(deadline, is_reset_complete)?;
        info!("Sensor hub reset complete");
        self.state = Lifecycle::Running;
        Ok(())
    }

    fn running(&self) -> Result<Arc<Shared<I2C, IRQ, RST, BOOT>>, Error> {
        let shared = self.shared()?;
        match self.state {
            Lifecycle::Running => Ok(shared),
            _ => Err(Error::NotRunning),
        }
    }

    /// Enable periodic output of sensor report `feature_id`.
    ///
    /// Blocks until the hub answers with a Get Feature response.
    pub fn enable_feature(&mut self, feature_id: u8, interval_us: u32) -> Result<(), Error> {
        let shared = self.running()?;
        trace!("enable_feature 0x{:X}, {} us", feature_id, interval_us);

        let command = SetFeatureCommand::new(feature_id, interval_us).encode();
        let deadline = self.deadline();
        let _bus = shared.bus.acquire(deadline).ok_or(Error::Timeout)?;
        shared.send(CHANNEL_HUB_CONTROL, &command)?;

        shared.exchange_until(deadline, |frame| {
            if frame.channel() != CHANNEL_HUB_CONTROL
                || frame.report_id() != Some(SHUB_GET_FEATURE_RESP)
            {
                return false;
            }
            match frame.payload().get(1) {
                Some(&reported) if reported != feature_id => warn!(
                    "Feature response for 0x{:02X} while enabling 0x{:02X}",
                    reported, feature_id
                ),
                _ => {}
            }
            true
        })?;

        lock(&self.readings).enabled.insert(feature_id);
        info!("Report {:x} is enabled", feature_id);
        Ok(())
    }

    /// Enable the AR/VR stabilized rotation vector
    pub fn enable_orientation(&mut self, interval_us: u32) -> Result<(), Error> {
        self.enable_feature(SENSOR_REPORTID_ARVR_ROTATION_VECTOR, interval_us)
    }

    /// Last orientation report, if any arrived
    pub fn orientation(&self) -> Option<OrientationReport> {
        lock(&self.readings).orientation
    }

    /// Last base timestamp delta, in 100 us ticks
    pub fn base_timestamp_delta(&self) -> Option<i32> {
        lock(&self.readings).base_delta
    }

    /// Was `feature_id` acknowledged by the hub
    pub fn is_feature_enabled(&self, feature_id: u8) -> bool {
        lock(&self.readings).enabled.contains(&feature_id)
    }

    /// Install a callback that sees every decoded message.
    ///
    /// It runs on whichever thread holds the bus token, so it must not
    /// call back into the driver's blocking operations.
    pub fn set_listener(&self, listener: impl FnMut(&Message) + Send + 'static) {
        *lock(&self.listener) = Some(Box::new(listener));
    }

    pub fn clear_listener(&self) {
        *lock(&self.listener) = None;
    }
}
