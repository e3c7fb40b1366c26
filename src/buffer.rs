// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Page-aligned host memory shared with the accelerator.
//!
//! The action reads pattern and packet buffers and writes result slots by
//! DMA, addressing host memory directly. Every buffer handed to the
//! hardware is therefore a [`DmaBuffer`]: zero-initialised, 4096-byte
//! aligned, with a capacity that is a whole number of pages, and pinned at
//! one address for its lifetime.

use crate::encoder::{Encoder, PatternCompiler};
use crate::error::AccelError;
use crate::record::{align_up, RecordHeader, HEADER_SIZE, RECORD_ALIGN};
use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Alignment and size granularity of DMA buffers.
pub const DMA_ALIGN: usize = 4096;

/// Address and length of a buffer as programmed into the action registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDescriptor {
    /// Host virtual address of the first byte.
    pub addr: u64,
    /// Number of bytes the hardware may access.
    pub len: usize,
}

impl BufferDescriptor {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Owned, zeroed, page-aligned allocation.
pub struct DmaBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
}

// SAFETY: DmaBuffer exclusively owns its allocation; no interior sharing.
unsafe impl Send for DmaBuffer {}

// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    /// Allocate at least `size` bytes, rounded up to whole pages.
    ///
    /// A zero `size` still yields one page.
    pub fn new(size: usize) -> Result<Self, AccelError> {
        let capacity = align_up(size.max(1), DMA_ALIGN);
        let layout = Layout::from_size_align(capacity, DMA_ALIGN)
            .map_err(|_| AccelError::Allocation { size: capacity })?;

        // SAFETY: layout has a nonzero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AccelError::Allocation { size: capacity })?;

        log::trace!("DMA buffer {:p}: {} bytes", raw, capacity);
        Ok(Self { ptr, capacity })
    }

    /// Allocated size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Host address of the first byte.
    #[inline]
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Descriptor covering the first `len` bytes.
    pub fn descriptor(&self, len: usize) -> Result<BufferDescriptor, AccelError> {
        if len > self.capacity {
            return Err(AccelError::BufferTooSmall {
                needed: len,
                available: self.capacity,
            });
        }
        Ok(BufferDescriptor {
            addr: self.addr(),
            len,
        })
    }

    /// Descriptor covering the whole allocation.
    #[inline]
    pub fn full_descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            addr: self.addr(),
            len: self.capacity,
        }
    }

    /// Move the first `keep` bytes into a new allocation of at least `size` bytes.
    fn regrow(&self, size: usize, keep: usize) -> Result<Self, AccelError> {
        let mut grown = Self::new(size)?;
        grown[..keep].copy_from_slice(&self[..keep]);
        Ok(grown)
    }

    fn layout(&self) -> Layout {
        // SAFETY: the same size/alignment pair was validated in `new`.
        unsafe { Layout::from_size_align_unchecked(self.capacity, DMA_ALIGN) }
    }
}

impl Deref for DmaBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialised for capacity bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }
}

impl DerefMut for DmaBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid and initialised for capacity bytes, and we hold &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        log::trace!("free DMA buffer {:p}", self.ptr.as_ptr());
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout()) }
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A DMA buffer filled with back-to-back pattern or packet records.
///
/// The buffer is over-allocated up front and grows (reallocate and copy) when
/// a record does not fit; only the used prefix is handed to the hardware.
#[derive(Debug)]
pub struct RecordBuffer {
    buf: DmaBuffer,
    used: usize,
    records: usize,
}

impl RecordBuffer {
    /// Empty record buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, AccelError> {
        Ok(Self {
            buf: DmaBuffer::new(capacity)?,
            used: 0,
            records: 0,
        })
    }

    /// Encode one packet record, returning its identifier.
    pub fn push_packet(&mut self, encoder: &mut Encoder, payload: &[u8]) -> Result<u32, AccelError> {
        self.reserve(crate::record::encoded_len(payload.len()))?;
        self.used = encoder.encode_packet(payload, &mut self.buf, self.used)?;
        self.records += 1;
        Ok(encoder.last_packet_id())
    }

    /// Compile and encode one pattern record, returning its identifier.
    pub fn push_pattern(
        &mut self,
        encoder: &mut Encoder,
        compiler: &dyn PatternCompiler,
        pattern: &str,
    ) -> Result<u32, AccelError> {
        self.reserve(crate::record::encoded_len(encoder.pattern_width()))?;
        self.used = encoder.encode_pattern(compiler, pattern, &mut self.buf, self.used)?;
        self.records += 1;
        Ok(encoder.last_pattern_id())
    }

    fn reserve(&mut self, additional: usize) -> Result<(), AccelError> {
        let needed = self.used + additional;
        if needed > self.buf.capacity() {
            let size = needed.max(self.buf.capacity() * 2);
            log::debug!(
                "record buffer grows from {} to {} bytes",
                self.buf.capacity(),
                size
            );
            self.buf = self.buf.regrow(size, self.used)?;
        }
        Ok(())
    }

    /// Bytes occupied by encoded records (always a multiple of 64).
    #[inline]
    pub fn used_len(&self) -> usize {
        self.used
    }

    /// Number of records encoded so far.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.records
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// The encoded records.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// Descriptor of the used prefix, as handed to the hardware.
    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            addr: self.buf.addr(),
            len: self.used,
        }
    }

    /// Walk packet records, yielding `(offset, header)` pairs.
    ///
    /// Each record is sized from its 12-bit length field, so this only
    /// applies to packet buffers.
    pub fn packet_headers(&self) -> Result<Vec<(usize, RecordHeader)>, AccelError> {
        let bytes = self.as_bytes();
        let mut out = Vec::with_capacity(self.records);
        let mut offset = 0;
        while offset < bytes.len() {
            let header = RecordHeader::parse(&bytes[offset..])?;
            out.push((offset, header));
            offset += align_up(HEADER_SIZE + header.payload_len(), RECORD_ALIGN);
        }
        Ok(out)
    }

    /// Give up the records and keep the allocation.
    pub fn into_inner(self) -> DmaBuffer {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dma_buffer_alignment() {
        for size in [0, 1, 4095, 4096, 4097, 100_000] {
            let buf = DmaBuffer::new(size).unwrap();
            assert_eq!(buf.addr() % DMA_ALIGN as u64, 0);
            assert_eq!(buf.capacity() % DMA_ALIGN, 0);
            assert!(buf.capacity() >= size.max(1));
            assert!(buf.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_descriptor_bounds() {
        let buf = DmaBuffer::new(4096).unwrap();
        let desc = buf.descriptor(100).unwrap();
        assert_eq!(desc.addr, buf.addr());
        assert_eq!(desc.len, 100);
        assert!(buf.descriptor(4097).is_err());
        assert_eq!(buf.full_descriptor().len, 4096);
    }

    #[test]
    fn test_record_buffer_grows_preserving_records() {
        let mut encoder = Encoder::new();
        let mut records = RecordBuffer::with_capacity(64).unwrap();

        for _ in 0..100 {
            records.push_packet(&mut encoder, &[0xAB; 100]).unwrap();
        }

        assert_eq!(records.record_count(), 100);
        assert_eq!(records.used_len(), 100 * 192);
        assert!(records.capacity() >= records.used_len());
        assert_eq!(records.descriptor().addr % DMA_ALIGN as u64, 0);

        let headers = records.packet_headers().unwrap();
        assert_eq!(headers.len(), 100);
        for (i, (offset, header)) in headers.iter().enumerate() {
            assert_eq!(*offset, i * 192);
            assert_eq!(header.id, i as u32 + 1);
            assert_eq!(header.payload_len(), 100);
        }
    }
}
