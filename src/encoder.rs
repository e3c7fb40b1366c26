// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Pattern and packet encoders.
//!
//! An [`Encoder`] is one encoding session: it owns the pattern and packet
//! identifier counters, so independent sessions never hand out colliding
//! identifiers. Identifiers are pre-incremented; the first one issued by a
//! fresh encoder is 1.

use crate::error::AccelError;
use crate::record::{encoded_len, RecordHeader, HEADER_SIZE, PATTERN_WIDTH_BYTES, RECORD_ALIGN};

/// Compiles pattern text into the configuration bytes of one hardware pattern slot.
///
/// Implementations must not return more than `width` bytes.
pub trait PatternCompiler: Send + Sync {
    /// Compile `pattern` for a `width`-byte hardware pattern slot.
    fn compile(&self, pattern: &str, width: usize) -> Result<Vec<u8>, AccelError>;
}

impl<F> PatternCompiler for F
where
    F: Fn(&str, usize) -> Result<Vec<u8>, AccelError> + Send + Sync,
{
    fn compile(&self, pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
        self(pattern, width)
    }
}

/// Encoding session with its own identifier counters.
#[derive(Debug, Clone)]
pub struct Encoder {
    pattern_id: u32,
    packet_id: u32,
    pattern_width: usize,
}

impl Encoder {
    /// Fresh session for the default hardware pattern width.
    pub const fn new() -> Self {
        Self::with_pattern_width(PATTERN_WIDTH_BYTES)
    }

    /// Fresh session for a `pattern_width`-byte pattern slot.
    pub const fn with_pattern_width(pattern_width: usize) -> Self {
        Self {
            pattern_id: 0,
            packet_id: 0,
            pattern_width,
        }
    }

    /// Continue a session whose last issued identifiers were `pattern_id` and `packet_id`.
    pub const fn starting_at(pattern_id: u32, packet_id: u32, pattern_width: usize) -> Self {
        Self {
            pattern_id,
            packet_id,
            pattern_width,
        }
    }

    /// Hardware pattern slot width in bytes.
    #[inline]
    pub fn pattern_width(&self) -> usize {
        self.pattern_width
    }

    /// Identifier of the most recently encoded packet (0 if none).
    #[inline]
    pub fn last_packet_id(&self) -> u32 {
        self.packet_id
    }

    /// Identifier of the most recently encoded pattern (0 if none).
    #[inline]
    pub fn last_pattern_id(&self) -> u32 {
        self.pattern_id
    }

    /// Encode one packet record at `offset` in `buf`.
    ///
    /// Returns the offset immediately after the padded record.
    pub fn encode_packet(
        &mut self,
        payload: &[u8],
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, AccelError> {
        let header = RecordHeader::packet(next_id(self.packet_id, "packet")?, payload.len())?;
        let next = write_record(buf, offset, &header, payload)?;
        self.packet_id = header.id;

        log::trace!("PKT[{}] len {} at {:#x}", header.id, payload.len(), offset);
        Ok(next)
    }

    /// Compile `pattern` and encode it at `offset` in `buf`.
    ///
    /// Returns the offset immediately after the padded record.
    pub fn encode_pattern(
        &mut self,
        compiler: &dyn PatternCompiler,
        pattern: &str,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, AccelError> {
        if pattern.is_empty() {
            return Err(AccelError::EmptyPattern);
        }
        let config = compiler.compile(pattern, self.pattern_width)?;
        log::debug!(
            "PATT {:?}: {} config bytes",
            pattern,
            config.len()
        );
        self.encode_pattern_config(&config, buf, offset)
    }

    /// Encode already compiled pattern configuration bytes at `offset` in `buf`.
    pub fn encode_pattern_config(
        &mut self,
        config: &[u8],
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, AccelError> {
        if config.len() > self.pattern_width {
            return Err(AccelError::PatternConfigTooLarge {
                len: config.len(),
                max: self.pattern_width,
            });
        }
        let header = RecordHeader::pattern(next_id(self.pattern_id, "pattern")?, self.pattern_width);
        let next = write_record(buf, offset, &header, config)?;
        self.pattern_id = header.id;
        Ok(next)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write header, body and zero padding; nothing is written on error.
/// Identifier following `last`; identifiers never wrap.
fn next_id(last: u32, kind: &str) -> Result<u32, AccelError> {
    last.checked_add(1).ok_or_else(|| {
        AccelError::InvalidArgument(format!("{kind} identifiers exhausted at {last}"))
    })
}

fn write_record(
    buf: &mut [u8],
    offset: usize,
    header: &RecordHeader,
    body: &[u8],
) -> Result<usize, AccelError> {
    if offset % RECORD_ALIGN != 0 {
        return Err(AccelError::InvalidArgument(format!(
            "record offset {offset:#x} is not {RECORD_ALIGN}-byte aligned"
        )));
    }
    let len = encoded_len(body.len());
    let end = offset + len;
    if end > buf.len() {
        return Err(AccelError::BufferTooSmall {
            needed: end,
            available: buf.len(),
        });
    }

    let record = &mut buf[offset..end];
    record[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    record[HEADER_SIZE..HEADER_SIZE + body.len()].copy_from_slice(body);
    record[HEADER_SIZE + body.len()..].fill(0);
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MAX_PAYLOAD_LEN;

    fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
        Ok(pattern.bytes().take(width).collect())
    }

    #[test]
    fn test_packet_length_and_ids_roundtrip() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0u8; 8192];
        let mut last_id = 0;

        for len in 0..=MAX_PAYLOAD_LEN {
            let payload = vec![0x33u8; len];
            let end = encoder.encode_packet(&payload, &mut buf, 0).unwrap();
            assert_eq!(end % 64, 0);
            assert_eq!(end, encoded_len(len));

            let header = RecordHeader::parse(&buf).unwrap();
            assert_eq!(header.payload_len(), len);
            assert!(header.id > last_id);
            last_id = header.id;
            assert_eq!(&buf[64..64 + len], &payload[..]);
            assert!(buf[64 + len..end].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_packets_back_to_back() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0xFFu8; 4096];

        let second = encoder.encode_packet(b"foo", &mut buf, 0).unwrap();
        assert_eq!(second, 64 * 2);
        let end = encoder.encode_packet(b"foobar123", &mut buf, second).unwrap();
        assert_eq!(end % 64, 0);
        assert_eq!(end, 256);

        let first = RecordHeader::parse(&buf).unwrap();
        let next = RecordHeader::parse(&buf[second..]).unwrap();
        assert_eq!(first.payload_len(), 3);
        assert_eq!(next.payload_len(), 9);
        assert_eq!(next.id, first.id + 1);
        assert_eq!(&buf[second + 64..second + 73], b"foobar123");
        // Stale bytes are overwritten by padding.
        assert!(buf[67..128].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_payload_too_large_leaves_counter() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0u8; 8192];
        let err = encoder
            .encode_packet(&[0u8; MAX_PAYLOAD_LEN + 1], &mut buf, 0)
            .unwrap_err();
        assert!(matches!(err, AccelError::PayloadTooLarge { .. }));
        assert_eq!(encoder.last_packet_id(), 0);
    }

    #[test]
    fn test_misaligned_offset_and_small_buffer() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0u8; 128];
        assert!(matches!(
            encoder.encode_packet(b"x", &mut buf, 3),
            Err(AccelError::InvalidArgument(_))
        ));
        assert!(matches!(
            encoder.encode_packet(&[0u8; 100], &mut buf, 0),
            Err(AccelError::BufferTooSmall { needed: 192, available: 128 })
        ));
        assert_eq!(encoder.last_packet_id(), 0);
    }

    #[test]
    fn test_pattern_record() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0u8; 4096];
        let end = encoder.encode_pattern(&literal, "abc", &mut buf, 0).unwrap();
        assert_eq!(end, 128);

        let header = RecordHeader::parse(&buf).unwrap();
        assert_eq!(header.id, 1);
        assert_eq!(header.length as usize, PATTERN_WIDTH_BYTES - 4);
        assert_eq!(&buf[64..67], b"abc");
        assert_eq!(encoder.last_pattern_id(), 1);
        assert_eq!(encoder.last_packet_id(), 0);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let mut encoder = Encoder::new();
        let mut buf = vec![0u8; 4096];
        assert!(matches!(
            encoder.encode_pattern(&literal, "", &mut buf, 0),
            Err(AccelError::EmptyPattern)
        ));
    }

    #[test]
    fn test_pattern_config_too_large() {
        let mut encoder = Encoder::with_pattern_width(16);
        let mut buf = vec![0u8; 4096];
        let err = encoder
            .encode_pattern_config(&[1u8; 17], &mut buf, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            AccelError::PatternConfigTooLarge { len: 17, max: 16 }
        ));
    }

    #[test]
    fn test_independent_sessions() {
        let mut a = Encoder::new();
        let mut b = Encoder::starting_at(0, 41, PATTERN_WIDTH_BYTES);
        let mut buf = vec![0u8; 256];

        a.encode_packet(b"x", &mut buf, 0).unwrap();
        a.encode_packet(b"y", &mut buf, 0).unwrap();
        b.encode_packet(b"z", &mut buf, 0).unwrap();

        assert_eq!(a.last_packet_id(), 2);
        assert_eq!(b.last_packet_id(), 42);
    }

    #[test]
    fn test_identifiers_do_not_wrap() {
        let mut encoder = Encoder::starting_at(u32::MAX, u32::MAX - 1, PATTERN_WIDTH_BYTES);
        let mut buf = vec![0u8; 256];

        encoder.encode_packet(b"last", &mut buf, 0).unwrap();
        assert_eq!(encoder.last_packet_id(), u32::MAX);
        assert!(matches!(
            encoder.encode_packet(b"next", &mut buf, 0),
            Err(AccelError::InvalidArgument(_))
        ));
        assert_eq!(encoder.last_packet_id(), u32::MAX);

        assert!(matches!(
            encoder.encode_pattern(&literal, "foo", &mut buf, 0),
            Err(AccelError::InvalidArgument(_))
        ));
        assert_eq!(encoder.last_pattern_id(), u32::MAX);
    }
}
