// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! SHTP framing.
//!
//! Every transfer starts with a 4-byte little-endian header:
//! `len_lo, len_hi, channel, sequence`. The length counts the header
//! itself, and the top bit of `len_hi` marks a continuation fragment, which
//! this driver rejects.

use log::{trace, warn};

use crate::constants::{
    LENGTH_CONTINUATION_BIT, NUM_CHANNELS, PACKET_HEADER_LENGTH, PACKET_RECV_BUF_LEN,
    PACKET_SEND_BUF_LEN,
};
use crate::Error;

/// SHTP frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Raw 16-bit length field, continuation bit included
    pub length: u16,
    /// Logical channel
    pub channel: u8,
    /// Per-channel sequence number
    pub sequence: u8,
}

impl Header {
    pub const SIZE: usize = PACKET_HEADER_LENGTH;

    pub fn encode(&self) -> [u8; PACKET_HEADER_LENGTH] {
        let [lo, hi] = self.length.to_le_bytes();
        [lo, hi, self.channel, self.sequence]
    }

    pub fn decode(buf: &[u8; PACKET_HEADER_LENGTH]) -> Self {
        Self {
            length: u16::from_le_bytes([buf[0], buf[1]]),
            channel: buf[2],
            sequence: buf[3],
        }
    }

    /// Is this header the start or middle of a fragmented transfer
    pub fn is_continuation(&self) -> bool {
        self.length & LENGTH_CONTINUATION_BIT != 0
    }

    /// Check the header against the receive arena and return the total
    /// frame length in bytes.
    pub fn validate(&self) -> Result<usize, Error> {
        if self.is_continuation() {
            return Err(Error::Continuation);
        }
        let len = self.length as usize;
        if len < PACKET_HEADER_LENGTH {
            return Err(Error::FrameTooShort(self.length));
        }
        if len > PACKET_RECV_BUF_LEN {
            return Err(Error::FrameTooLong(self.length));
        }
        Ok(len)
    }
}

/// Outcome of checking an incoming sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Channel id is beyond the tracked table
    Untracked,
    /// Sequence number matched the expectation
    InOrder,
    /// Sequence number differed; the counter has been resynchronized
    Mismatch { expected: u8, received: u8 },
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    next_in: u8,
    next_out: u8,
}

/// Per-channel incoming and outgoing sequence counters
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: [ChannelState; NUM_CHANNELS],
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming frame. The hub advances its counter by two per
    /// frame read over I2C, so the next expected value is `received + 2`.
    pub fn track_incoming(&mut self, channel: u8, received: u8) -> SequenceCheck {
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return SequenceCheck::Untracked;
        };
        let expected = state.next_in;
        state.next_in = received.wrapping_add(2);
        if expected == received {
            SequenceCheck::InOrder
        } else {
            SequenceCheck::Mismatch { expected, received }
        }
    }

    /// Take the next outgoing sequence number for `channel`. Untracked
    /// channels always send zero.
    pub fn next_outgoing(&mut self, channel: u8) -> u8 {
        match self.channels.get_mut(channel as usize) {
            Some(state) => {
                let seq = state.next_out;
                state.next_out = seq.wrapping_add(1);
                seq
            }
            None => 0,
        }
    }

    /// Next sequence number expected on `channel`
    pub fn expected_incoming(&self, channel: u8) -> Option<u8> {
        self.channels.get(channel as usize).map(|s| s.next_in)
    }

    /// Next sequence number that will be sent on `channel`
    pub fn peek_outgoing(&self, channel: u8) -> Option<u8> {
        self.channels.get(channel as usize).map(|s| s.next_out)
    }
}

/// A received frame, borrowed from the receive arena.
///
/// `bytes` holds the whole frame, header included, so payload fields sit
/// at the same offsets as on the wire.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: Header,
    pub bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn channel(&self) -> u8 {
        self.header.channel
    }

    /// Total frame length, header included
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes after the header
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[PACKET_HEADER_LENGTH.min(self.bytes.len())..]
    }

    /// First payload byte, which is the report ID on SH-2 channels
    pub fn report_id(&self) -> Option<u8> {
        self.payload().first().copied()
    }
}

/// Frame codec state: the shared receive arena, the last accepted header,
/// the send buffer and the channel sequence table.
///
/// Only the holder of the bus token touches it.
pub struct ShtpCodec {
    rx: [u8; PACKET_RECV_BUF_LEN],
    tx: [u8; PACKET_SEND_BUF_LEN],
    header_in: Header,
    channels: ChannelTable,
}

impl Default for ShtpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ShtpCodec {
    pub fn new() -> Self {
        Self {
            rx: [0; PACKET_RECV_BUF_LEN],
            tx: [0; PACKET_SEND_BUF_LEN],
            header_in: Header::default(),
            channels: ChannelTable::new(),
        }
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Validate a freshly read header and update sequence bookkeeping.
    ///
    /// Returns the total frame length to read next.
    pub fn accept_header(&mut self, raw: &[u8; PACKET_HEADER_LENGTH]) -> Result<usize, Error> {
        let header = Header::decode(raw);
        trace!(
            "SHTP header len={} chan={} seq={}",
            header.length & !LENGTH_CONTINUATION_BIT,
            header.channel,
            header.sequence
        );
        let len = header.validate()?;

        match self.channels.track_incoming(header.channel, header.sequence) {
            SequenceCheck::Untracked => {
                warn!("SHTP channel too big: {}", header.channel);
            }
            SequenceCheck::Mismatch { expected, received } => {
                warn!(
                    "SHTP sequence mismatch on channel {}: expected {}, got {}",
                    header.channel, expected, received
                );
            }
            SequenceCheck::InOrder => {}
        }

        self.header_in = header;
        Ok(len)
    }

    /// Arena slice the next frame read lands in
    pub fn rx_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.rx[..len]
    }

    /// View of the last accepted frame
    pub fn frame(&self) -> Frame<'_> {
        let len = (self.header_in.length as usize).min(PACKET_RECV_BUF_LEN);
        Frame {
            header: self.header_in,
            bytes: &self.rx[..len],
        }
    }

    /// Stamp a header in front of `payload` and return the encoded frame.
    pub fn encode(&mut self, channel: u8, payload: &[u8]) -> Result<&[u8], Error> {
        let len = PACKET_HEADER_LENGTH + payload.len();
        if len > PACKET_SEND_BUF_LEN {
            return Err(Error::PayloadTooLong(payload.len()));
        }
        let header = Header {
            length: len as u16,
            channel,
            sequence: self.channels.next_outgoing(channel),
        };
        self.tx[..PACKET_HEADER_LENGTH].copy_from_slice(&header.encode());
        self.tx[PACKET_HEADER_LENGTH..len].copy_from_slice(payload);
        Ok(&self.tx[..len])
    }
}
