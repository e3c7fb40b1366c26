// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Job descriptor: one pattern scanned over one packet stream.
//!
//! A [`JobDescriptor`] owns the three DMA buffers of a scan and walks them
//! through the lifecycle
//!
//! ```text
//! initialize -> compile -> load_packets -> scan -> harvest -> cleanup
//! ```
//!
//! Each step runs at most once and only in this order; `cleanup` is accepted
//! at any point after construction. Per-step durations are recorded in
//! [`PhaseTimings`], including for jobs that fail part way.

use crate::buffer::{DmaBuffer, RecordBuffer};
use crate::driver::{ScanOutcome, ScanRequest};
use crate::encoder::{Encoder, PatternCompiler};
use crate::error::AccelError;
use crate::hardware::HardwareManager;
use crate::record::HEADER_SIZE;
use crate::results::{decode_results, result_buffer_size};
use crate::transport::ActionTransport;
use std::time::{Duration, Instant};

/// Payload size assumed per packet when sizing the packet buffer up front.
const PACKET_SIZE_HINT: usize = 2048;

/// Lifecycle steps of a job, in their required order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Initialize,
    Compile,
    LoadPackets,
    Scan,
    Harvest,
    Cleanup,
}

impl Step {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Compile => "compile",
            Self::LoadPackets => "load_packets",
            Self::Scan => "scan",
            Self::Harvest => "harvest",
            Self::Cleanup => "cleanup",
        }
    }

    /// Step that must have completed before this one may run.
    const fn requires(self) -> Option<Step> {
        match self {
            Self::Initialize | Self::Cleanup => None,
            Self::Compile => Some(Self::Initialize),
            Self::LoadPackets => Some(Self::Compile),
            Self::Scan => Some(Self::LoadPackets),
            Self::Harvest => Some(Self::Scan),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    /// The given step completed last.
    Completed(Step),
    /// The given step failed; only `cleanup` is accepted.
    Failed(Step),
}

impl JobState {
    fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Completed(step) | Self::Failed(step) => step.name(),
        }
    }
}

/// Per-step durations and completion instants.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    pub init: Duration,
    pub pattern: Duration,
    /// Time spent inside the packet encoder.
    pub packet_copy: Duration,
    /// Whole packet load, including the packet source.
    pub packet_load: Duration,
    pub scan: Duration,
    pub harvest: Duration,
    pub cleanup: Duration,
    completed: Vec<(Step, Instant)>,
}

impl PhaseTimings {
    /// Packet load time not spent encoding.
    #[inline]
    pub fn packet_other(&self) -> Duration {
        self.packet_load.saturating_sub(self.packet_copy)
    }

    /// When `step` completed, if it did.
    pub fn completed_at(&self, step: Step) -> Option<Instant> {
        self.completed
            .iter()
            .find(|(s, _)| *s == step)
            .map(|&(_, at)| at)
    }

    /// Completed steps with their completion instants, in order.
    pub fn completions(&self) -> &[(Step, Instant)] {
        &self.completed
    }

    pub fn total(&self) -> Duration {
        self.init + self.pattern + self.packet_load + self.scan + self.harvest + self.cleanup
    }

    fn set(&mut self, step: Step, elapsed: Duration) {
        match step {
            Step::Initialize => self.init = elapsed,
            Step::Compile => self.pattern = elapsed,
            Step::LoadPackets => self.packet_load = elapsed,
            Step::Scan => self.scan = elapsed,
            Step::Harvest => self.harvest = elapsed,
            Step::Cleanup => self.cleanup = elapsed,
        }
    }

    fn record(&mut self, step: Step, elapsed: Duration) {
        self.set(step, elapsed);
        self.completed.push((step, Instant::now()));
    }
}

/// Results of a job that ran every step.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub packet_count: usize,
    /// Payload bytes, excluding record headers and padding.
    pub payload_bytes: usize,
    /// Encoded packet buffer length handed to the hardware.
    pub packet_buffer_len: usize,
    pub result_buffer_len: usize,
    pub matched_packets: u32,
    pub matched_ids: Vec<u32>,
    pub scan: ScanOutcome,
    pub timings: PhaseTimings,
}

/// A job that stopped at `step`.
#[derive(Debug, thiserror::Error)]
#[error("job failed in {step}: {error}")]
pub struct JobFailure {
    pub step: Step,
    #[source]
    pub error: AccelError,
    /// Timings collected up to the failure.
    pub timings: PhaseTimings,
}

/// One pattern-over-packets scan on one engine.
pub struct JobDescriptor<'hw, T: ActionTransport> {
    hw: &'hw HardwareManager<T>,
    engine: usize,
    encoder: Encoder,
    state: JobState,
    attached: bool,
    pattern: Option<RecordBuffer>,
    packets: Option<RecordBuffer>,
    results: Option<DmaBuffer>,
    packet_count: usize,
    payload_bytes: usize,
    scan: ScanOutcome,
    matched_packets: u32,
    matched_ids: Vec<u32>,
    timings: PhaseTimings,
}

impl<'hw, T: ActionTransport> JobDescriptor<'hw, T> {
    /// New job on `engine` with a fresh encoding session.
    pub fn new(hw: &'hw HardwareManager<T>, engine: usize) -> Self {
        let encoder = Encoder::with_pattern_width(hw.config().pattern_width_bytes);
        Self::with_encoder(hw, engine, encoder)
    }

    /// New job continuing an existing encoding session.
    pub fn with_encoder(hw: &'hw HardwareManager<T>, engine: usize, encoder: Encoder) -> Self {
        Self {
            hw,
            engine,
            encoder,
            state: JobState::Created,
            attached: false,
            pattern: None,
            packets: None,
            results: None,
            packet_count: 0,
            payload_bytes: 0,
            scan: ScanOutcome::default(),
            matched_packets: 0,
            matched_ids: Vec::new(),
            timings: PhaseTimings::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> JobState {
        self.state
    }

    #[inline]
    pub fn engine(&self) -> usize {
        self.engine
    }

    #[inline]
    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    #[inline]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Size of the allocated result buffer (0 before `load_packets`).
    pub fn result_buffer_len(&self) -> usize {
        self.results.as_ref().map_or(0, |r| r.capacity())
    }

    /// Used length of the encoded packet buffer.
    pub fn packet_buffer_len(&self) -> usize {
        self.packets.as_ref().map_or(0, |p| p.used_len())
    }

    /// Used length of the encoded pattern buffer.
    pub fn pattern_buffer_len(&self) -> usize {
        self.pattern.as_ref().map_or(0, |p| p.used_len())
    }

    /// Final matched count read at harvest.
    #[inline]
    pub fn matched_packets(&self) -> u32 {
        self.matched_packets
    }

    /// Matched packet identifiers, in result slot order.
    #[inline]
    pub fn matched_ids(&self) -> &[u32] {
        &self.matched_ids
    }

    /// What the scan reported.
    #[inline]
    pub fn scan_outcome(&self) -> &ScanOutcome {
        &self.scan
    }

    /// Give back the encoding session for a follow-up job.
    pub fn into_encoder(mut self) -> Encoder {
        std::mem::take(&mut self.encoder)
    }

    /// Attach the action and soft reset the engine.
    pub fn initialize(&mut self) -> Result<(), AccelError> {
        self.enter(Step::Initialize)?;
        let start = Instant::now();
        let result = self.do_initialize();
        self.finish(Step::Initialize, start, result)
    }

    fn do_initialize(&mut self) -> Result<(), AccelError> {
        self.hw.attach()?;
        self.attached = true;
        self.hw.reset_engine(self.engine)
    }

    /// Compile `pattern` into a fresh pattern buffer.
    pub fn compile(&mut self, compiler: &dyn PatternCompiler, pattern: &str) -> Result<(), AccelError> {
        self.enter(Step::Compile)?;
        let start = Instant::now();
        let result = self.do_compile(compiler, pattern);
        self.finish(Step::Compile, start, result)
    }

    fn do_compile(&mut self, compiler: &dyn PatternCompiler, pattern: &str) -> Result<(), AccelError> {
        let width = self.encoder.pattern_width();
        let mut buf = RecordBuffer::with_capacity(HEADER_SIZE + width)?;
        buf.push_pattern(&mut self.encoder, compiler, pattern)?;
        if buf.used_len() == 0 {
            return Err(AccelError::Configuration(format!(
                "pattern {pattern:?} encoded to an empty buffer"
            )));
        }
        log::debug!("job engine {}: pattern buffer {} bytes", self.engine, buf.used_len());
        self.pattern = Some(buf);
        Ok(())
    }

    /// Encode every payload of `packets` and allocate the result buffer.
    ///
    /// An empty stream is accepted; the hardware then scans an empty buffer.
    pub fn load_packets<I, P>(&mut self, packets: I) -> Result<(), AccelError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.enter(Step::LoadPackets)?;
        let start = Instant::now();
        let result = self.do_load_packets(packets.into_iter());
        self.finish(Step::LoadPackets, start, result)
    }

    fn do_load_packets<I, P>(&mut self, packets: I) -> Result<(), AccelError>
    where
        I: Iterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let hint = packets.size_hint().0.max(1);
        let mut buf = RecordBuffer::with_capacity(hint.saturating_mul(HEADER_SIZE + PACKET_SIZE_HINT))?;
        let mut copy = Duration::ZERO;

        for payload in packets {
            let payload = payload.as_ref();
            let t = Instant::now();
            buf.push_packet(&mut self.encoder, payload)?;
            copy += t.elapsed();
            self.packet_count += 1;
            self.payload_bytes += payload.len();
        }
        self.timings.packet_copy = copy;

        let size = result_buffer_size(self.packet_count, self.hw.config().result_safety_factor);
        self.results = Some(DmaBuffer::new(size)?);
        log::debug!(
            "job engine {}: {} packets, {} payload bytes, {} encoded, {} result bytes",
            self.engine,
            self.packet_count,
            self.payload_bytes,
            buf.used_len(),
            size
        );
        self.packets = Some(buf);
        Ok(())
    }

    /// Run the scan on the hardware.
    pub fn scan(&mut self) -> Result<(), AccelError> {
        self.enter(Step::Scan)?;
        let start = Instant::now();
        let result = self.do_scan();
        self.finish(Step::Scan, start, result)
    }

    fn do_scan(&mut self) -> Result<(), AccelError> {
        let request = match (&self.pattern, &self.packets, &self.results) {
            (Some(pattern), Some(packets), Some(results)) => ScanRequest {
                pattern: pattern.descriptor(),
                packets: packets.descriptor(),
                results: results.full_descriptor(),
            },
            _ => {
                return Err(AccelError::Configuration(
                    "scan without pattern, packet and result buffers".into(),
                ))
            }
        };
        self.scan = self.hw.scan(self.engine, &request)?;
        Ok(())
    }

    /// Settle, read the final matched count and decode the result slots.
    pub fn harvest(&mut self) -> Result<(), AccelError> {
        self.enter(Step::Harvest)?;
        let start = Instant::now();
        let result = self.do_harvest();
        self.finish(Step::Harvest, start, result)
    }

    fn do_harvest(&mut self) -> Result<(), AccelError> {
        let reads = self.hw.config().harvest_settle_reads;
        let count = self.hw.settle(self.engine, reads)?;
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| AccelError::Configuration("no result buffer".into()))?;

        self.matched_ids = decode_results(results, count as usize)?;
        self.matched_packets = count;
        log::info!(
            "job engine {}: {} of {} packets matched",
            self.engine,
            count,
            self.packet_count
        );
        Ok(())
    }

    /// Release the hardware attachment and the buffers.
    ///
    /// Accepted once from any state, including after a failure.
    pub fn cleanup(&mut self) -> Result<(), AccelError> {
        if self.state == JobState::Completed(Step::Cleanup) {
            return Err(self.order_error(Step::Cleanup));
        }
        let start = Instant::now();
        self.pattern = None;
        self.packets = None;
        self.results = None;
        let result = self.detach();
        self.timings.record(Step::Cleanup, start.elapsed());
        self.state = JobState::Completed(Step::Cleanup);
        result
    }

    /// Run every step, always cleaning up.
    pub fn execute<I, P>(
        self,
        compiler: &dyn PatternCompiler,
        pattern: &str,
        packets: I,
    ) -> Result<JobSummary, JobFailure>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut job = scopeguard::guard(self, |mut job| {
            if let Err(e) = job.cleanup() {
                log::warn!("job engine {}: cleanup failed: {}", job.engine, e);
            }
        });

        let steps = job.run_steps(compiler, pattern, packets);
        let mut job = scopeguard::ScopeGuard::into_inner(job);

        if let Err((step, error)) = steps {
            if let Err(e) = job.cleanup() {
                log::warn!("job engine {}: cleanup failed: {}", job.engine, e);
            }
            return Err(JobFailure {
                step,
                error,
                timings: job.timings.clone(),
            });
        }

        let summary = JobSummary {
            packet_count: job.packet_count,
            payload_bytes: job.payload_bytes,
            packet_buffer_len: job.packet_buffer_len(),
            result_buffer_len: job.result_buffer_len(),
            matched_packets: job.matched_packets,
            matched_ids: std::mem::take(&mut job.matched_ids),
            scan: job.scan,
            timings: PhaseTimings::default(),
        };
        match job.cleanup() {
            Ok(()) => Ok(JobSummary {
                timings: job.timings.clone(),
                ..summary
            }),
            Err(error) => Err(JobFailure {
                step: Step::Cleanup,
                error,
                timings: job.timings.clone(),
            }),
        }
    }

    fn run_steps<I, P>(
        &mut self,
        compiler: &dyn PatternCompiler,
        pattern: &str,
        packets: I,
    ) -> Result<(), (Step, AccelError)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.initialize().map_err(|e| (Step::Initialize, e))?;
        self.compile(compiler, pattern).map_err(|e| (Step::Compile, e))?;
        self.load_packets(packets).map_err(|e| (Step::LoadPackets, e))?;
        self.scan().map_err(|e| (Step::Scan, e))?;
        self.harvest().map_err(|e| (Step::Harvest, e))
    }

    fn enter(&self, step: Step) -> Result<(), AccelError> {
        let ready = match (self.state, step.requires()) {
            (JobState::Created, None) => true,
            (JobState::Completed(done), Some(required)) => done == required,
            _ => false,
        };
        if ready {
            Ok(())
        } else {
            Err(self.order_error(step))
        }
    }

    fn order_error(&self, step: Step) -> AccelError {
        AccelError::PhaseOrder {
            expected: step.requires().map_or("created", Step::name),
            actual: self.state.name(),
        }
    }

    fn finish(&mut self, step: Step, start: Instant, result: Result<(), AccelError>) -> Result<(), AccelError> {
        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                self.timings.record(step, elapsed);
                self.state = JobState::Completed(step);
                Ok(())
            }
            Err(e) => {
                self.timings.set(step, elapsed);
                log::warn!("job engine {}: {} failed: {}", self.engine, step, e);
                self.state = JobState::Failed(step);
                Err(e)
            }
        }
    }

    fn detach(&mut self) -> Result<(), AccelError> {
        if std::mem::take(&mut self.attached) {
            self.hw.release()
        } else {
            Ok(())
        }
    }
}

impl<T: ActionTransport> Drop for JobDescriptor<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("job engine {}: release on drop failed: {}", self.engine, e);
        }
    }
}

impl<T: ActionTransport> std::fmt::Debug for JobDescriptor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("attached", &self.attached)
            .field("packet_count", &self.packet_count)
            .field("matched_packets", &self.matched_packets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccelConfig;
    use crate::driver::ScanState;
    use crate::sim::SimulatedAction;

    fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
        Ok(pattern.bytes().take(width).collect())
    }

    fn manager() -> HardwareManager<SimulatedAction> {
        HardwareManager::new(
            SimulatedAction::new(1),
            AccelConfig::default().with_poll_timeout(Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_empty_packet_stream() {
        let hw = manager();
        let mut job = JobDescriptor::new(&hw, 0);
        job.initialize().unwrap();
        job.compile(&literal, "abc").unwrap();
        job.load_packets(Vec::<&[u8]>::new()).unwrap();
        assert_eq!(job.result_buffer_len(), 4096);
        assert_eq!(job.packet_buffer_len(), 0);
        assert_eq!(job.pattern_buffer_len(), 128);

        job.scan().unwrap();
        job.harvest().unwrap();
        assert_eq!(job.matched_packets(), 0);
        assert!(job.matched_ids().is_empty());
        job.cleanup().unwrap();
        assert_eq!(hw.attachments(), 0);
    }

    #[test]
    fn test_timings_monotonic() {
        let hw = manager();
        let mut job = JobDescriptor::new(&hw, 0);
        job.initialize().unwrap();
        job.compile(&literal, "foo").unwrap();
        let packets: [&[u8]; 3] = [b"foo", b"foobar123", b"bar"];
        job.load_packets(packets).unwrap();
        assert_eq!(job.packet_buffer_len(), 128 * 3);
        job.scan().unwrap();
        job.harvest().unwrap();
        job.cleanup().unwrap();
        assert_eq!(job.packet_buffer_len(), 0);

        let timings = job.timings();
        let steps: Vec<Step> = timings.completions().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            steps,
            [
                Step::Initialize,
                Step::Compile,
                Step::LoadPackets,
                Step::Scan,
                Step::Harvest,
                Step::Cleanup
            ]
        );
        assert!(timings.completions().windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(timings.packet_copy <= timings.packet_load);
        assert_eq!(job.payload_bytes(), 15);
    }

    #[test]
    fn test_phase_order_enforced() {
        let hw = manager();
        let mut job = JobDescriptor::new(&hw, 0);
        assert!(matches!(
            job.scan(),
            Err(AccelError::PhaseOrder { expected: "load_packets", actual: "created" })
        ));
        assert_eq!(job.state(), JobState::Created);

        job.initialize().unwrap();
        assert!(matches!(job.initialize(), Err(AccelError::PhaseOrder { .. })));
        assert_eq!(hw.attachments(), 1);

        job.cleanup().unwrap();
        assert!(matches!(job.cleanup(), Err(AccelError::PhaseOrder { .. })));
        assert_eq!(hw.attachments(), 0);
    }

    #[test]
    fn test_drop_releases_attachment() {
        let hw = manager();
        {
            let mut job = JobDescriptor::new(&hw, 0);
            job.initialize().unwrap();
            assert_eq!(hw.attachments(), 1);
        }
        assert_eq!(hw.attachments(), 0);
        assert!(!hw.with_transport(|sim| sim.is_attached()));
    }

    #[test]
    fn test_execute_matches() {
        let hw = manager();
        hw.with_transport(|sim| {
            // SAFETY: the job scans into its own result buffer.
            unsafe { sim.emulate_results(0, vec![2, 3]) }
        });
        let packets: [&[u8]; 3] = [b"bar", b"foo", b"xfoo"];
        let summary = JobDescriptor::new(&hw, 0)
            .execute(&literal, "foo", packets)
            .unwrap();
        assert_eq!(summary.matched_ids, [2, 3]);
        assert_eq!(summary.matched_packets, 2);
        assert_eq!(summary.packet_count, 3);
        assert_eq!(summary.result_buffer_len, 4096);
        assert!(summary.timings.completed_at(Step::Cleanup).is_some());
        assert_eq!(hw.attachments(), 0);
    }

    #[test]
    fn test_failure_keeps_timings() {
        let hw = manager();
        hw.with_transport(|sim| sim.inject_error(0, ScanState::Scanning, 0x7));

        let failure = JobDescriptor::new(&hw, 0)
            .execute(&literal, "foo", [b"foo"])
            .unwrap_err();
        assert_eq!(failure.step, Step::Scan);
        assert_eq!(failure.error.hardware_code(), Some(0x7));
        assert!(failure.timings.completed_at(Step::LoadPackets).is_some());
        assert!(failure.timings.completed_at(Step::Scan).is_none());
        let cleaned = failure.timings.completed_at(Step::Cleanup).unwrap();
        assert!(cleaned >= failure.timings.completed_at(Step::LoadPackets).unwrap());
        assert_eq!(hw.attachments(), 0);
    }

    #[test]
    fn test_failed_job_accepts_only_cleanup() {
        let hw = manager();
        let mut job = JobDescriptor::new(&hw, 0);
        job.initialize().unwrap();
        assert!(job.compile(&literal, "").is_err());
        assert_eq!(job.state(), JobState::Failed(Step::Compile));
        assert!(matches!(
            job.load_packets([b"x"]),
            Err(AccelError::PhaseOrder { .. })
        ));
        job.cleanup().unwrap();
    }

    #[test]
    fn test_result_overrun_reported() {
        let hw = manager();
        hw.with_transport(|sim| sim.set_match_count(0, 1000));
        let failure = JobDescriptor::new(&hw, 0)
            .execute(&literal, "foo", [b"foo"])
            .unwrap_err();
        assert_eq!(failure.step, Step::Harvest);
        assert!(matches!(failure.error, AccelError::ResultOverrun { matched: 1000, .. }));
    }

    #[test]
    fn test_encoder_session_continues() {
        let hw = manager();
        let mut job = JobDescriptor::new(&hw, 0);
        job.initialize().unwrap();
        job.compile(&literal, "foo").unwrap();
        job.load_packets([b"a", b"b"]).unwrap();
        job.cleanup().unwrap();
        let encoder = job.into_encoder();
        assert_eq!(encoder.last_packet_id(), 2);

        let job = JobDescriptor::with_encoder(&hw, 0, encoder);
        let summary = job.execute(&literal, "foo", [b"c"]).unwrap();
        assert_eq!(summary.packet_count, 1);
    }
}
