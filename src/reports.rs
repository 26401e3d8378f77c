// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! SH-2 command building and report decoding.
//!
//! Sensor report frames carry a run of sub-reports, each starting with a
//! report ID byte that fixes its size. [`dispatch`] walks any received
//! frame and hands every decoded item to a sink as a [`Message`].

use log::{error, info, warn};

use crate::constants::{
    device_error_to_text, q_to_f32, CHANNEL_COMMAND, CHANNEL_HUB_CONTROL, CHANNEL_SENSOR_REPORTS,
    CHANNEL_WAKE_REPORTS, CMD_RESP_ADVERTISEMENT, CMD_RESP_ERROR_LIST, PACKET_HEADER_LENGTH,
    Q_POINT_ACCURACY, Q_POINT_QUATERNION, SENSOR_REPORTID_ARVR_ROTATION_VECTOR,
    SHUB_BASE_TIMESTAMP, SHUB_COMMAND_RESP, SHUB_REPORT_SET_FEATURE_CMD, SHUB_TIMESTAMP_REBASE,
};
use crate::shtp::Frame;

#[inline]
fn read_i16(buf: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Set Feature command (report 0xFD) on the hub control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFeatureCommand {
    pub feature_report_id: u8,
    pub wake_up_enable: bool,
    pub always_on_enable: bool,
    /// Report interval in microseconds
    pub report_interval_us: u32,
    /// Batch interval in microseconds
    pub batch_interval_us: u32,
    /// Sensor specific configuration word
    pub config_word: u32,
}

impl SetFeatureCommand {
    /// Payload size, report ID included
    pub const SIZE: usize = 17;

    const FLAG_WAKE_UP: u8 = 1 << 2;
    const FLAG_ALWAYS_ON: u8 = 1 << 3;

    /// Plain periodic report, no batching
    pub fn new(feature_report_id: u8, report_interval_us: u32) -> Self {
        Self {
            feature_report_id,
            wake_up_enable: false,
            always_on_enable: false,
            report_interval_us,
            batch_interval_us: 0,
            config_word: 0,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = SHUB_REPORT_SET_FEATURE_CMD;
        buf[1] = self.feature_report_id;
        if self.wake_up_enable {
            buf[2] |= Self::FLAG_WAKE_UP;
        }
        if self.always_on_enable {
            buf[2] |= Self::FLAG_ALWAYS_ON;
        }
        // buf[3..5]: change sensitivity, unused
        buf[5..9].copy_from_slice(&self.report_interval_us.to_le_bytes());
        buf[9..13].copy_from_slice(&self.batch_interval_us.to_le_bytes());
        buf[13..17].copy_from_slice(&self.config_word.to_le_bytes());
        buf
    }
}

/// Base timestamp reference (0xFB): delta to the batch's host interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseTimestamp {
    pub base_delta: i32,
}

impl BaseTimestamp {
    pub const SIZE: usize = 5;

    pub fn read(buf: &[u8]) -> Self {
        Self {
            base_delta: read_i32(buf, 1),
        }
    }
}

/// Timestamp rebase (0xFA)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRebase {
    pub rebase_delta: i32,
}

impl TimestampRebase {
    pub const SIZE: usize = 5;

    pub fn read(buf: &[u8]) -> Self {
        Self {
            rebase_delta: read_i32(buf, 1),
        }
    }
}

/// Reliability of a sensor report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Unreliable,
    AccuracyLow,
    AccuracyMedium,
    AccuracyHigh,
}

impl From<u8> for ReportStatus {
    fn from(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ReportStatus::Unreliable,
            1 => ReportStatus::AccuracyLow,
            2 => ReportStatus::AccuracyMedium,
            _ => ReportStatus::AccuracyHigh,
        }
    }
}

/// Header shared by every sensor report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReportCommon {
    pub sequence: u8,
    pub status: ReportStatus,
    /// 14-bit delay, upper six bits live in the status byte
    pub delay: u16,
}

impl SensorReportCommon {
    pub const SIZE: usize = 4;

    pub fn read(buf: &[u8]) -> Self {
        Self {
            sequence: buf[1],
            status: ReportStatus::from(buf[2]),
            delay: (((buf[2] & 0b1111_1100) as u16) << 6) | buf[3] as u16,
        }
    }
}

/// AR/VR stabilized rotation vector (0x28)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationReport {
    pub common: SensorReportCommon,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    /// Heading accuracy estimate in radians
    pub accuracy: f32,
}

impl OrientationReport {
    pub const SIZE: usize = SensorReportCommon::SIZE + 10;

    pub fn read(buf: &[u8]) -> Self {
        Self {
            common: SensorReportCommon::read(buf),
            x: q_to_f32(read_i16(buf, 4), Q_POINT_QUATERNION),
            y: q_to_f32(read_i16(buf, 6), Q_POINT_QUATERNION),
            z: q_to_f32(read_i16(buf, 8), Q_POINT_QUATERNION),
            w: q_to_f32(read_i16(buf, 10), Q_POINT_QUATERNION),
            accuracy: q_to_f32(read_i16(buf, 12), Q_POINT_ACCURACY),
        }
    }

    /// Quaternion as [x, y, z, w]
    pub fn quaternion(&self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// One decoded item from a received frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    BaseTimestamp(BaseTimestamp),
    TimestampRebase(TimestampRebase),
    Orientation(OrientationReport),
    /// Command response on the hub control channel
    CommandResponse { command: u8 },
    /// Error code from an error list on the SHTP command channel
    DeviceError { code: u8, text: &'static str },
    /// Advertisement on the SHTP command channel
    Advertisement { entries: usize },
    /// Anything not classified above
    Generic {
        channel: u8,
        len: usize,
        report_id: Option<u8>,
    },
}

/// Why the walk over a sensor frame stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubReportError {
    /// Unrecognized report ID at `offset`
    UnknownId { id: u8, offset: usize },
    /// Fewer bytes left than report `id` needs
    Truncated {
        id: u8,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

fn sub_report_size(id: u8) -> Option<usize> {
    match id {
        SHUB_BASE_TIMESTAMP => Some(BaseTimestamp::SIZE),
        SHUB_TIMESTAMP_REBASE => Some(TimestampRebase::SIZE),
        SENSOR_REPORTID_ARVR_ROTATION_VECTOR => Some(OrientationReport::SIZE),
        _ => None,
    }
}

/// Walk the sub-reports of a sensor report frame.
///
/// Stops at the first unknown or truncated sub-report. Everything decoded
/// before that point has already been handed to `sink`.
pub fn walk_sensor_reports(
    frame: &Frame<'_>,
    sink: &mut dyn FnMut(Message),
) -> Result<usize, SubReportError> {
    let bytes = frame.bytes;
    let mut off = PACKET_HEADER_LENGTH;
    let mut count = 0;

    while off < bytes.len() {
        let id = bytes[off];
        let needed = sub_report_size(id).ok_or(SubReportError::UnknownId { id, offset: off })?;
        let available = bytes.len() - off;
        if available < needed {
            return Err(SubReportError::Truncated {
                id,
                offset: off,
                needed,
                available,
            });
        }

        let report = &bytes[off..off + needed];
        let msg = match id {
            SHUB_BASE_TIMESTAMP => Message::BaseTimestamp(BaseTimestamp::read(report)),
            SHUB_TIMESTAMP_REBASE => Message::TimestampRebase(TimestampRebase::read(report)),
            _ => Message::Orientation(OrientationReport::read(report)),
        };
        sink(msg);
        count += 1;
        off += needed;
    }
    Ok(count)
}

/// Walk tag/length/value entries of an advertisement payload
fn count_advertisement_entries(body: &[u8]) -> usize {
    let mut cursor = 0;
    let mut entries = 0;
    while cursor + 2 <= body.len() {
        let len = body[cursor + 1] as usize;
        cursor += 2 + len;
        if cursor > body.len() {
            break;
        }
        entries += 1;
    }
    entries
}

/// Interpret any received frame and report what it carried.
///
/// Never fails: malformed sub-reports end the walk over this one frame
/// and are logged.
pub fn dispatch(frame: &Frame<'_>, sink: &mut dyn FnMut(Message)) {
    let channel = frame.channel();
    let len = frame.len();
    let report_id = frame.report_id();

    match (channel, report_id) {
        (CHANNEL_SENSOR_REPORTS | CHANNEL_WAKE_REPORTS, _) => {
            match walk_sensor_reports(frame, sink) {
                Ok(_) => {}
                Err(SubReportError::UnknownId { id, offset }) => {
                    warn!("Unknown sub-report id 0x{:02X} at offset {}", id, offset);
                }
                Err(SubReportError::Truncated {
                    id,
                    offset,
                    needed,
                    available,
                }) => {
                    error!(
                        "Invalid size for sub-report 0x{:02X} at offset {}: need {}, have {}",
                        id, offset, needed, available
                    );
                }
            }
        }
        (CHANNEL_HUB_CONTROL, Some(SHUB_COMMAND_RESP)) if len > 6 => {
            let command = frame.bytes[6] & 0x7F;
            info!(
                "Received a cargo on chan {}, len: {}, command id: {:x}",
                channel, len, command
            );
            sink(Message::CommandResponse { command });
        }
        (CHANNEL_COMMAND, Some(CMD_RESP_ERROR_LIST)) => {
            for &code in &frame.payload()[1..] {
                let text = device_error_to_text(code);
                warn!("Hub reported error {}: {}", code, text);
                sink(Message::DeviceError { code, text });
            }
        }
        (CHANNEL_COMMAND, Some(CMD_RESP_ADVERTISEMENT)) => {
            let entries = count_advertisement_entries(&frame.payload()[1..]);
            info!("Received advertisement with {} entries", entries);
            sink(Message::Advertisement { entries });
        }
        _ => {
            match report_id {
                Some(id) => info!(
                    "Received a cargo on chan {}, len: {}, report id: {:x}",
                    channel, len, id
                ),
                None => info!("Received a cargo on chan {}, len: {}", channel, len),
            }
            sink(Message::Generic {
                channel,
                len,
                report_id,
            });
        }
    }
}
