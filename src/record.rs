// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Pattern and packet record framing.
//!
//! Both record kinds start with the same 64-byte header that the action's
//! DMA engine parses:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | sync marker, `0x5A` x 4 |
//! | 4 | 2 | length (little-endian; 12 bits for packets, 11 for patterns) |
//! | 6 | 54 | reserved, zero |
//! | 60 | 4 | record identifier (little-endian) |
//!
//! The body follows the header and the record is zero-padded so that it
//! ends on a 64-byte boundary.

use crate::error::AccelError;

/// Record alignment required by the DMA engine.
pub const RECORD_ALIGN: usize = 64;

/// Size of the record header.
pub const HEADER_SIZE: usize = 64;

/// Sync marker opening every record.
pub const SYNC_MARKER: [u8; 4] = [0x5A; 4];

/// Largest payload the 12-bit packet length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 0x0FFF;

/// Width of a compiled pattern slot in the hardware (bytes).
pub const PATTERN_WIDTH_BYTES: usize = 128;

/// Size of one result slot written by the hardware (80 bits).
pub const RESULT_SLOT_SIZE: usize = 10;

const RESERVED_LEN: usize = 54;

/// Which kind of record a header introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Pattern,
    Packet,
}

impl RecordKind {
    /// Bits of the high length byte that the hardware reads.
    #[inline]
    const fn high_len_mask(self) -> u8 {
        match self {
            Self::Pattern => 0x07,
            Self::Packet => 0x0F,
        }
    }
}

/// 64-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct RecordHeader {
    /// Sync marker, always [`SYNC_MARKER`] for a valid header.
    pub sync: [u8; 4],
    /// Length field as stored (already masked to the hardware width).
    pub length: u16,
    reserved: [u8; RESERVED_LEN],
    /// Pattern or packet identifier.
    pub id: u32,
}

impl RecordHeader {
    /// Header for a packet carrying `payload_len` bytes.
    pub fn packet(id: u32, payload_len: usize) -> Result<Self, AccelError> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(AccelError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self::with_length(RecordKind::Packet, id, payload_len as u16))
    }

    /// Header for a pattern in a `pattern_width`-byte hardware slot.
    ///
    /// The length field always holds `pattern_width - 4`, independent of
    /// the compiled configuration length.
    pub fn pattern(id: u32, pattern_width: usize) -> Self {
        let byte_cnt = pattern_width.saturating_sub(4) as u16;
        Self::with_length(RecordKind::Pattern, id, byte_cnt)
    }

    fn with_length(kind: RecordKind, id: u32, length: u16) -> Self {
        let lo = length & 0xFF;
        let hi = (length >> 8) & u16::from(kind.high_len_mask());
        Self {
            sync: SYNC_MARKER,
            length: lo | (hi << 8),
            reserved: [0; RESERVED_LEN],
            id,
        }
    }

    /// Serialize into the little-endian wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.sync);
        out[4..6].copy_from_slice(&self.length.to_le_bytes());
        out[6..60].copy_from_slice(&self.reserved);
        out[60..64].copy_from_slice(&self.id.to_le_bytes());
        out
    }

    /// Parse a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, AccelError> {
        if bytes.len() < HEADER_SIZE {
            return Err(AccelError::BufferTooSmall {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let mut sync = [0u8; 4];
        sync.copy_from_slice(&bytes[0..4]);
        if sync != SYNC_MARKER {
            return Err(AccelError::InvalidArgument(format!(
                "bad sync marker {:02x?}",
                sync
            )));
        }
        let mut reserved = [0u8; RESERVED_LEN];
        reserved.copy_from_slice(&bytes[6..60]);
        Ok(Self {
            sync,
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
            reserved,
            id: u32::from_le_bytes([bytes[60], bytes[61], bytes[62], bytes[63]]),
        })
    }

    /// Payload length of a packet header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        usize::from(self.length & 0x0FFF)
    }

    /// Returns true if all reserved bytes are zero.
    pub fn reserved_is_zero(&self) -> bool {
        self.reserved.iter().all(|&b| b == 0)
    }
}

/// Round `len` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Encoded length of a record whose body is `body_len` bytes.
#[inline]
pub const fn encoded_len(body_len: usize) -> usize {
    align_up(HEADER_SIZE + body_len, RECORD_ALIGN)
}

/// One result slot written by the hardware per matched packet.
///
/// Bytes 4..8 carry the matched packet identifier; the remaining bytes are
/// pattern/offset information that the host does not interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSlot {
    pub raw: [u8; RESULT_SLOT_SIZE],
}

impl ResultSlot {
    /// Matched packet identifier.
    #[inline]
    pub fn packet_id(&self) -> u32 {
        self.raw[4..8]
            .iter()
            .enumerate()
            .fold(0u32, |id, (j, &b)| id | (u32::from(b) << (j * 8)))
    }
}

// Compile-time layout checks for the wire header
const _: () = assert!(std::mem::size_of::<RecordHeader>() == HEADER_SIZE);
const _: () = assert!(std::mem::align_of::<RecordHeader>() == RECORD_ALIGN);
const _: () = assert!(PATTERN_WIDTH_BYTES - 4 < 0x800);
