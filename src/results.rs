// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Result buffer decoding.

use crate::error::AccelError;
use crate::record::{align_up, ResultSlot, RESULT_SLOT_SIZE};

/// Smallest result buffer ever allocated.
pub const MIN_RESULT_BUFFER: usize = 4096;

/// Result buffer size for `packets` packets.
///
/// `round_up(10 * packets * safety_factor, 4096)`, at least 4096 bytes.
pub fn result_buffer_size(packets: usize, safety_factor: usize) -> usize {
    let raw = RESULT_SLOT_SIZE
        .saturating_mul(packets)
        .saturating_mul(safety_factor.max(1))
        .min(isize::MAX as usize);
    align_up(raw, MIN_RESULT_BUFFER).max(MIN_RESULT_BUFFER)
}

/// Iterate over the first `count` result slots of `buf`.
///
/// # Errors
///
/// Returns [`AccelError::ResultOverrun`] if `count` slots do not fit `buf`.
pub fn result_slots(
    buf: &[u8],
    count: usize,
) -> Result<impl Iterator<Item = ResultSlot> + '_, AccelError> {
    let needed = count
        .checked_mul(RESULT_SLOT_SIZE)
        .filter(|&n| n <= buf.len())
        .ok_or(AccelError::ResultOverrun {
            matched: count,
            needed: count.saturating_mul(RESULT_SLOT_SIZE),
            available: buf.len(),
        })?;

    Ok(buf[..needed].chunks_exact(RESULT_SLOT_SIZE).map(|chunk| {
        let mut raw = [0u8; RESULT_SLOT_SIZE];
        raw.copy_from_slice(chunk);
        ResultSlot { raw }
    }))
}

/// Decode the matched packet identifiers of the first `count` slots, in slot order.
pub fn decode_results(buf: &[u8], count: usize) -> Result<Vec<u32>, AccelError> {
    let ids: Vec<u32> = result_slots(buf, count)?.map(|s| s.packet_id()).collect();
    log::debug!("decoded {} result slots", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(ids: &[u32]) -> Vec<u8> {
        let mut buf = vec![0xEEu8; ids.len() * RESULT_SLOT_SIZE + 7];
        for (i, id) in ids.iter().enumerate() {
            let at = i * RESULT_SLOT_SIZE + 4;
            buf[at..at + 4].copy_from_slice(&id.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_decode_in_slot_order() {
        let ids = [9, 1, 0xDEAD_BEEF, 4];
        let buf = slots(&ids);
        assert_eq!(decode_results(&buf, 4).unwrap(), ids);
        assert_eq!(decode_results(&buf, 2).unwrap(), &ids[..2]);
        assert!(decode_results(&buf, 0).unwrap().is_empty());
    }

    #[test]
    fn test_overrun() {
        let buf = vec![0u8; 4096];
        assert_eq!(decode_results(&buf, 409).unwrap().len(), 409);
        assert!(matches!(
            decode_results(&buf, 410),
            Err(AccelError::ResultOverrun {
                matched: 410,
                needed: 4100,
                available: 4096
            })
        ));
    }

    #[test]
    fn test_slot_raw_bytes_kept() {
        let buf = slots(&[3]);
        let slot = result_slots(&buf, 1).unwrap().next().unwrap();
        assert_eq!(slot.raw[..4], [0xEE; 4]);
        assert_eq!(slot.packet_id(), 3);
    }

    #[test]
    fn test_result_buffer_size() {
        assert_eq!(result_buffer_size(0, 2), 4096);
        assert_eq!(result_buffer_size(204, 2), 4096);
        assert_eq!(result_buffer_size(205, 2), 8192);
        assert_eq!(result_buffer_size(1000, 1), 12288);
        assert_eq!(result_buffer_size(10, 0), 4096);
    }
}
