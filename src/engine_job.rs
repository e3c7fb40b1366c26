// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! One job on one engine, fed by a [`Worker`].
//!
//! Engine jobs are the unit handed to engine threads. Each job copies its
//! pre-encoded packet records into a staging buffer without holding the
//! hardware lock, then runs the scan under the lock. A failing job marks
//! itself `Failed` and skips its remaining phases; other jobs are unaffected.

use crate::buffer::{BufferDescriptor, DmaBuffer};
use crate::driver::{ScanOutcome, ScanRequest};
use crate::error::AccelError;
use crate::hardware::HardwareManager;
use crate::results::decode_results;
use crate::transport::ActionTransport;
use crate::worker::Worker;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status of an engine job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Initialized,
    PacketsReady,
    Scanned,
    Done,
    Failed,
}

impl JobStatus {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initialized => "initialized",
            Self::PacketsReady => "packets_ready",
            Self::Scanned => "scanned",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// A job bound to one engine of a shared card.
pub struct EngineJob<T: ActionTransport> {
    id: usize,
    engine: usize,
    hw: Option<Arc<HardwareManager<T>>>,
    worker: Option<Arc<dyn Worker>>,
    packets: Option<DmaBuffer>,
    results: Option<DmaBuffer>,
    pattern: BufferDescriptor,
    packet_len: usize,
    attached: bool,
    status: JobStatus,
    outcome: ScanOutcome,
    matched: u32,
    matched_ids: Vec<u32>,
    init_time: Duration,
    prepare_time: Duration,
    scan_time: Duration,
}

impl<T: ActionTransport> EngineJob<T> {
    /// Job `id` on `engine`, without hardware bound yet.
    pub fn new(id: usize, engine: usize) -> Self {
        Self {
            id,
            engine,
            hw: None,
            worker: None,
            packets: None,
            results: None,
            pattern: BufferDescriptor::default(),
            packet_len: 0,
            attached: false,
            status: JobStatus::Pending,
            outcome: ScanOutcome::default(),
            matched: 0,
            matched_ids: Vec::new(),
            init_time: Duration::ZERO,
            prepare_time: Duration::ZERO,
            scan_time: Duration::ZERO,
        }
    }

    pub fn with_hardware(id: usize, engine: usize, hw: Arc<HardwareManager<T>>) -> Self {
        let mut job = Self::new(id, engine);
        job.hw = Some(hw);
        job
    }

    pub fn set_worker(&mut self, worker: Arc<dyn Worker>) {
        self.worker = Some(worker);
    }

    /// Staging buffer for packet records; its capacity bounds the packet bytes.
    pub fn set_packet_buffer(&mut self, buf: DmaBuffer) {
        self.packets = Some(buf);
    }

    pub fn set_result_buffer(&mut self, buf: DmaBuffer) {
        self.results = Some(buf);
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn engine(&self) -> usize {
        self.engine
    }

    #[inline]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Time spent in `init` and `prepare_packets`.
    pub fn buff_prep_time(&self) -> Duration {
        self.init_time + self.prepare_time
    }

    #[inline]
    pub fn scan_time(&self) -> Duration {
        self.scan_time
    }

    /// Final matched count, read after the settle reads.
    #[inline]
    pub fn num_matched(&self) -> u32 {
        self.matched
    }

    /// Matched packet identifiers, decoded when the job finished.
    #[inline]
    pub fn matched_ids(&self) -> &[u32] {
        &self.matched_ids
    }

    #[inline]
    pub fn scan_outcome(&self) -> &ScanOutcome {
        &self.outcome
    }

    /// Run `init`, `prepare_packets`, `scan` and `done`.
    ///
    /// The first failure marks the job `Failed` and skips the rest.
    pub fn run(&mut self) -> Result<(), AccelError> {
        self.init()?;
        self.prepare_packets()?;
        self.scan()?;
        self.done()
    }

    /// Bind the pattern and reset the engine.
    pub fn init(&mut self) -> Result<(), AccelError> {
        self.enter(JobStatus::Pending)?;
        let start = Instant::now();
        let result = self.do_init();
        self.init_time = start.elapsed();
        self.finish(JobStatus::Initialized, result)
    }

    fn do_init(&mut self) -> Result<(), AccelError> {
        let hw = self.hardware()?;
        let worker = self.worker()?;
        if self.engine >= hw.engine_count() {
            return Err(AccelError::InvalidEngine {
                engine: self.engine,
                count: hw.engine_count(),
            });
        }
        self.pattern = worker.pattern_buffer().ok_or_else(|| {
            AccelError::Configuration(format!("job {}: worker has no pattern buffer", self.id))
        })?;

        if !self.attached {
            hw.attach()?;
            self.attached = true;
        }
        hw.reset_engine(self.engine)
    }

    /// Copy this job's packet records into the staging buffer.
    pub fn prepare_packets(&mut self) -> Result<(), AccelError> {
        self.enter(JobStatus::Initialized)?;
        let start = Instant::now();
        let result = self.do_prepare_packets();
        self.prepare_time = start.elapsed();
        self.finish(JobStatus::PacketsReady, result)
    }

    fn do_prepare_packets(&mut self) -> Result<(), AccelError> {
        let worker = self.worker()?;
        if self.results.is_none() {
            return Err(AccelError::Configuration(format!(
                "job {}: no result buffer",
                self.id
            )));
        }
        let staging = self.packets.as_mut().ok_or_else(|| {
            AccelError::Configuration(format!("job {}: no packet buffer", self.id))
        })?;
        let bytes = worker.packet_buffer(self.id, self.engine).ok_or_else(|| {
            AccelError::Configuration(format!(
                "job {}: no packets for engine {}",
                self.id, self.engine
            ))
        })?;
        if bytes.len() > staging.capacity() {
            return Err(AccelError::BufferTooSmall {
                needed: bytes.len(),
                available: staging.capacity(),
            });
        }

        staging[..bytes.len()].copy_from_slice(bytes);
        self.packet_len = bytes.len();
        log::debug!(
            "job {} engine {}: staged {} packet bytes",
            self.id,
            self.engine,
            self.packet_len
        );
        Ok(())
    }

    /// Run the scan, then settle and read the final matched count.
    pub fn scan(&mut self) -> Result<(), AccelError> {
        self.enter(JobStatus::PacketsReady)?;
        let start = Instant::now();
        let result = self.do_scan();
        self.scan_time = start.elapsed();
        self.finish(JobStatus::Scanned, result)
    }

    fn do_scan(&mut self) -> Result<(), AccelError> {
        let hw = self.hardware()?;
        let request = match (&self.packets, &self.results) {
            (Some(packets), Some(results)) => ScanRequest {
                pattern: self.pattern,
                packets: packets.descriptor(self.packet_len)?,
                results: results.full_descriptor(),
            },
            _ => {
                return Err(AccelError::Configuration(format!(
                    "job {}: buffers not bound",
                    self.id
                )))
            }
        };

        self.outcome = hw.scan(self.engine, &request)?;
        self.matched = hw.settle(self.engine, hw.config().engine_settle_reads)?;
        Ok(())
    }

    /// Decode the result slots and finish the job.
    pub fn done(&mut self) -> Result<(), AccelError> {
        self.enter(JobStatus::Scanned)?;
        let result = match &self.results {
            Some(results) => decode_results(results, self.matched as usize),
            None => Ok(Vec::new()),
        };
        let result = result.map(|ids| self.matched_ids = ids);
        self.finish(JobStatus::Done, result)?;

        self.release_attachment();
        log::info!(
            "job {} engine {}: {} matched, prep {:?}, scan {:?}",
            self.id,
            self.engine,
            self.matched,
            self.buff_prep_time(),
            self.scan_time
        );
        Ok(())
    }

    /// Hand back the staging and result buffers for reuse.
    pub fn release_buffers(&mut self) -> (Option<DmaBuffer>, Option<DmaBuffer>) {
        self.packet_len = 0;
        (self.packets.take(), self.results.take())
    }

    /// Drop the worker, hardware and buffer references.
    pub fn cleanup(&mut self) {
        self.release_attachment();
        self.worker = None;
        self.hw = None;
        self.packets = None;
        self.results = None;
    }

    fn hardware(&self) -> Result<Arc<HardwareManager<T>>, AccelError> {
        self.hw.clone().ok_or_else(|| {
            AccelError::Configuration(format!("job {}: no hardware bound", self.id))
        })
    }

    fn worker(&self) -> Result<Arc<dyn Worker>, AccelError> {
        self.worker.clone().ok_or_else(|| {
            AccelError::Configuration(format!("job {}: no worker bound", self.id))
        })
    }

    fn enter(&self, required: JobStatus) -> Result<(), AccelError> {
        if self.status == required {
            Ok(())
        } else {
            Err(AccelError::PhaseOrder {
                expected: required.name(),
                actual: self.status.name(),
            })
        }
    }

    fn finish(&mut self, reached: JobStatus, result: Result<(), AccelError>) -> Result<(), AccelError> {
        match result {
            Ok(()) => {
                self.status = reached;
                Ok(())
            }
            Err(e) => {
                log::warn!("job {} engine {}: {}", self.id, self.engine, e);
                self.status = JobStatus::Failed;
                self.release_attachment();
                Err(e)
            }
        }
    }

    fn release_attachment(&mut self) {
        if !std::mem::take(&mut self.attached) {
            return;
        }
        if let Some(hw) = &self.hw {
            if let Err(e) = hw.release() {
                log::warn!("job {} engine {}: release failed: {}", self.id, self.engine, e);
            }
        }
    }
}

impl<T: ActionTransport> Drop for EngineJob<T> {
    fn drop(&mut self) {
        self.release_attachment();
    }
}

impl<T: ActionTransport> std::fmt::Debug for EngineJob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineJob")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("status", &self.status)
            .field("matched", &self.matched)
            .finish()
    }
}
