// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Constants for the BNO08x sensor hub driver.
//!
//! This module contains the SHTP channel table, the SH-2 report IDs the
//! driver understands, buffer sizes, and the fixed-point helpers used to
//! turn raw report fields into floats.

/// Default 7-bit I2C address of the hub (SA0 high)
pub const DEFAULT_ADDRESS: u8 = 0x4A;

/// Size of the SHTP header that starts every frame
pub const PACKET_HEADER_LENGTH: usize = 4;
/// Receive arena capacity. Frames announcing more than this are rejected.
pub const PACKET_RECV_BUF_LEN: usize = 1024;
/// Largest frame the driver ever sends
pub const PACKET_SEND_BUF_LEN: usize = 256;
/// Channels with sequence bookkeeping
pub const NUM_CHANNELS: usize = 6;

/// Top bit of the 16-bit length field flags a continuation (fragment)
pub const LENGTH_CONTINUATION_BIT: u16 = 0x8000;

// =============================================================================
// SHTP Communication Channels
// =============================================================================

/// SHTP command channel (advertisements, error lists)
pub const CHANNEL_COMMAND: u8 = 0;
/// Executable channel (reset, reset-complete)
pub const CHANNEL_EXECUTABLE: u8 = 1;
/// Sensor hub control channel (feature commands and responses)
pub const CHANNEL_HUB_CONTROL: u8 = 2;
/// Input sensor reports (non-wake)
pub const CHANNEL_SENSOR_REPORTS: u8 = 3;
/// Wake input sensor reports
pub const CHANNEL_WAKE_REPORTS: u8 = 4;
/// Gyro-integrated rotation vector
pub const CHANNEL_GYRO_ROTATION: u8 = 5;

// =============================================================================
// Command Channel Responses
// =============================================================================

/// Advertisement response
pub const CMD_RESP_ADVERTISEMENT: u8 = 0;
/// Error list response
pub const CMD_RESP_ERROR_LIST: u8 = 1;

// =============================================================================
// Executable Channel
// =============================================================================

/// Reset complete response
pub const EXECUTABLE_DEVICE_RESP_RESET_COMPLETE: u8 = 1;
/// Total length of the reset-complete frame (header plus one byte)
pub const RESET_COMPLETE_FRAME_LEN: u16 = 5;

// =============================================================================
// Sensor Hub (SHUB) Protocol Constants
// =============================================================================

/// Set feature command
pub const SHUB_REPORT_SET_FEATURE_CMD: u8 = 0xFD;
/// Get feature response
pub const SHUB_GET_FEATURE_RESP: u8 = 0xFC;
/// Base timestamp reference
pub const SHUB_BASE_TIMESTAMP: u8 = 0xFB;
/// Timestamp rebase
pub const SHUB_TIMESTAMP_REBASE: u8 = 0xFA;
/// Command response
pub const SHUB_COMMAND_RESP: u8 = 0xF1;

// =============================================================================
// Sensor Report IDs (from SH2 Reference Manual)
// =============================================================================

/// Unit quaternion rotation vector
pub const SENSOR_REPORTID_ROTATION_VECTOR: u8 = 0x05;
/// AR/VR stabilized rotation vector: Q point 14 for the quaternion, Q point
/// 12 for heading accuracy (radians)
pub const SENSOR_REPORTID_ARVR_ROTATION_VECTOR: u8 = 0x28;

/// Q point of rotation vector quaternion components
pub const Q_POINT_QUATERNION: usize = 14;
/// Q point of rotation vector heading accuracy
pub const Q_POINT_ACCURACY: usize = 12;

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert Q-point fixed-point value to f32
#[inline]
pub fn q_to_f32(q_val: i16, q_point: usize) -> f32 {
    (q_val as f32) / ((1u32 << q_point) as f32)
}

/// Describe an SHTP error code reported by the hub on the command channel.
///
/// Only used for diagnostics.
pub fn device_error_to_text(code: u8) -> &'static str {
    match code {
        0 => "no error",
        1 => "hub application attempted to exceed maximum read cargo length",
        2 => "host write was too short (need at least a 4-byte header)",
        3 => "host wrote a header with length greater than maximum write cargo length",
        4 => "host wrote a header with length less than or equal to header length",
        5 => "host wrote beginning of fragmented cargo, fragmentation not supported",
        6 => "host wrote continuation of fragmented cargo, fragmentation not supported",
        7 => "unrecognized command on control channel",
        8 => "unrecognized parameter to get-advertisement command",
        9 => "host wrote to unrecognized channel",
        10 => "advertisement request received while advertisement response was pending",
        11 => "host wrote before the hub finished sending its advertisement response",
        12 => "error list too long to send, truncated",
        14 => "invalid next sequence index",
        _ => "unknown",
    }
}
