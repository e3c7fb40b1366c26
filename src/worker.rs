// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Pattern and packet sources for engine jobs.

use crate::buffer::{BufferDescriptor, RecordBuffer};
use crate::encoder::{Encoder, PatternCompiler};
use crate::error::AccelError;
use crate::record::HEADER_SIZE;
use std::collections::HashMap;

/// Supplies encoded buffers to engine jobs.
///
/// Implementations are shared by every engine thread.
pub trait Worker: Send + Sync {
    /// Encoded pattern buffer, read by the hardware in place.
    fn pattern_buffer(&self) -> Option<BufferDescriptor>;

    /// Encoded packet records for job `job_id` on `engine`.
    fn packet_buffer(&self, job_id: usize, engine: usize) -> Option<&[u8]>;
}

/// In-memory worker owning one pattern buffer and per-job packet buffers.
///
/// All buffers are encoded through a single session, so pattern and packet
/// identifiers are unique across jobs.
#[derive(Debug, Default)]
pub struct BufferedWorker {
    encoder: Encoder,
    pattern: Option<RecordBuffer>,
    packets: HashMap<(usize, usize), RecordBuffer>,
}

impl BufferedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(encoder: Encoder) -> Self {
        Self {
            encoder,
            ..Self::default()
        }
    }

    /// Compile `pattern` into the shared pattern buffer, replacing any previous one.
    ///
    /// Returns the pattern identifier.
    pub fn set_pattern(
        &mut self,
        compiler: &dyn PatternCompiler,
        pattern: &str,
    ) -> Result<u32, AccelError> {
        let mut buf = RecordBuffer::with_capacity(HEADER_SIZE + self.encoder.pattern_width())?;
        let id = buf.push_pattern(&mut self.encoder, compiler, pattern)?;
        self.pattern = Some(buf);
        Ok(id)
    }

    /// Encode `payloads` as the packets of job `job_id` on `engine`.
    ///
    /// Returns the identifiers assigned, in order.
    pub fn add_packets<I, P>(
        &mut self,
        job_id: usize,
        engine: usize,
        payloads: I,
    ) -> Result<Vec<u32>, AccelError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut buf = RecordBuffer::with_capacity(0)?;
        let ids = payloads
            .into_iter()
            .map(|p| buf.push_packet(&mut self.encoder, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "worker: job {job_id} engine {engine}: {} packets, {} bytes",
            ids.len(),
            buf.used_len()
        );
        self.packets.insert((job_id, engine), buf);
        Ok(ids)
    }

    /// Largest packet buffer registered for `engine`.
    pub fn max_packet_len(&self, engine: usize) -> usize {
        self.packets
            .iter()
            .filter(|((_, e), _)| *e == engine)
            .map(|(_, buf)| buf.used_len())
            .max()
            .unwrap_or(0)
    }

    /// The encoding session shared by all buffers.
    #[inline]
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }
}

impl Worker for BufferedWorker {
    fn pattern_buffer(&self) -> Option<BufferDescriptor> {
        self.pattern.as_ref().map(RecordBuffer::descriptor)
    }

    fn packet_buffer(&self, job_id: usize, engine: usize) -> Option<&[u8]> {
        self.packets.get(&(job_id, engine)).map(RecordBuffer::as_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordHeader;

    fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
        Ok(pattern.bytes().take(width).collect())
    }

    #[test]
    fn test_buffers_by_job_and_engine() {
        let mut worker = BufferedWorker::new();
        assert!(worker.pattern_buffer().is_none());

        worker.set_pattern(&literal, "needle").unwrap();
        let pattern = worker.pattern_buffer().unwrap();
        assert_eq!(pattern.len, 128);
        assert_eq!(pattern.addr % 4096, 0);

        assert_eq!(worker.add_packets(0, 1, [b"a", b"b"]).unwrap(), [1, 2]);
        assert_eq!(worker.add_packets(1, 1, [b"c"]).unwrap(), [3]);

        let bytes = worker.packet_buffer(0, 1).unwrap();
        assert_eq!(bytes.len(), 256);
        assert_eq!(RecordHeader::parse(&bytes[128..]).unwrap().id, 2);
        assert!(worker.packet_buffer(0, 0).is_none());
        assert_eq!(worker.max_packet_len(1), 256);
        assert_eq!(worker.max_packet_len(0), 0);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut worker = BufferedWorker::new();
        let big = vec![0u8; 5000];
        assert!(worker.add_packets(0, 0, [big]).is_err());
        assert!(worker.packet_buffer(0, 0).is_none());
    }
}
