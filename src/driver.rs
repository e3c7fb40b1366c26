// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Register protocol driver for one scan on one engine.
//!
//! ```text
//! Idle -> Configured -> CopyingPattern -> Scanning -> Flushing -> Done
//!                             |              |           |
//!                             +------------> Error <-----+
//! ```
//!
//! The action exposes no completion interrupt, so every phase is a status
//! poll. Status bits must be observed in the documented order; skipping a
//! poll risks acting on a stale status value. Once `Error` is reached no
//! further register writes are issued for the scan.

use crate::buffer::BufferDescriptor;
use crate::error::AccelError;
use crate::regs::{split_u64, Control, Reg, Status};
use crate::transport::ActionTransport;
use std::time::{Duration, Instant};

/// Driver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    Idle,
    Configured,
    CopyingPattern,
    Scanning,
    Flushing,
    Done,
    Error,
}

impl ScanState {
    /// Returns a human-readable name for the state.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Configured => "CONFIGURED",
            Self::CopyingPattern => "COPYING_PATTERN",
            Self::Scanning => "SCANNING",
            Self::Flushing => "FLUSHING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The three buffers of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Encoded pattern records; `len` is programmed as the pattern total.
    pub pattern: BufferDescriptor,
    /// Encoded packet records; `len` is programmed as the packet total.
    pub packets: BufferDescriptor,
    /// Result slot area; `len` is programmed as the result buffer size.
    pub results: BufferDescriptor,
}

/// Timing and polling knobs for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Deadline for each polling loop.
    pub timeout: Duration,
    /// Pause between polls; zero spins.
    pub interval: Duration,
}

/// What a completed scan reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOutcome {
    /// Matched packet count read from `STATUS_H` after the flush.
    pub matched_packets: u32,
    /// Status polls spent in the pattern copy phase.
    pub copy_polls: u32,
    /// Status polls spent in the scan phase.
    pub scan_polls: u32,
    /// Status polls spent in the flush phase.
    pub flush_polls: u32,
    /// Time spent in the action-level idle wait.
    pub idle_wait: Duration,
}

/// State machine sequencing one scan on one engine.
pub struct ScanDriver<'t, T: ActionTransport + ?Sized> {
    transport: &'t mut T,
    engine: usize,
    policy: PollPolicy,
    state: ScanState,
    history: Vec<ScanState>,
}

impl<'t, T: ActionTransport + ?Sized> ScanDriver<'t, T> {
    pub fn new(transport: &'t mut T, engine: usize, policy: PollPolicy) -> Self {
        Self {
            transport,
            engine,
            policy,
            state: ScanState::Idle,
            history: Vec::with_capacity(6),
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// States entered so far, in order (excluding the initial `Idle`).
    #[inline]
    pub fn history(&self) -> &[ScanState] {
        &self.history
    }

    /// Run a complete scan: configure, copy pattern, scan, flush.
    pub fn run(&mut self, request: &ScanRequest) -> Result<ScanOutcome, AccelError> {
        if self.state != ScanState::Idle {
            return Err(AccelError::PhaseOrder {
                expected: ScanState::Idle.name(),
                actual: self.state.name(),
            });
        }
        let mut outcome = ScanOutcome::default();

        log::debug!(
            "engine {}: pattern {:#x}/{} packets {:#x}/{} results {:#x}/{}",
            self.engine,
            request.pattern.addr,
            request.pattern.len,
            request.packets.addr,
            request.packets.len,
            request.results.addr,
            request.results.len
        );
        self.configure(request)?;

        self.control(Control::COPY_PATTERN)?;
        self.enter(ScanState::CopyingPattern);
        outcome.copy_polls = self.poll(|status| {
            Ok(status.contains(Status::COPY_DONE))
        })?;
        log::debug!("engine {}: pattern copy done", self.engine);

        self.control(Control::WORK)?;
        self.enter(ScanState::Scanning);
        outcome.scan_polls = self.poll(|status| {
            if status.contains(Status::STAT_SPACE_EXHAUSTED) {
                return Err(AccelError::ResultSpaceExhausted {
                    status: status.bits(),
                });
            }
            Ok(status.contains(Status::WORK_DONE))
        })?;
        log::debug!("engine {}: work done", self.engine);

        self.control(Control::empty())?;
        self.control(Control::FLUSH)?;
        self.enter(ScanState::Flushing);
        outcome.flush_polls = self.poll(|status| Ok(status.contains(Status::FLUSH_DONE)))?;
        outcome.matched_packets = self.read(Reg::StatusH)?;
        log::debug!(
            "engine {}: flush done, {} matched packets",
            self.engine,
            outcome.matched_packets
        );

        self.control(Control::empty())?;
        self.enter(ScanState::Done);
        Ok(outcome)
    }

    fn configure(&mut self, request: &ScanRequest) -> Result<(), AccelError> {
        self.write_pair(Reg::PattInitAddrL, Reg::PattInitAddrH, request.pattern.addr)?;
        self.write_pair(Reg::PktInitAddrL, Reg::PktInitAddrH, request.packets.addr)?;
        self.write_pair(Reg::PattCardDdrAddrL, Reg::PattCardDdrAddrH, 0)?;
        self.write_pair(Reg::StatInitAddrL, Reg::StatInitAddrH, request.results.addr)?;
        self.write_pair(Reg::PattTotalNumL, Reg::PattTotalNumH, request.pattern.len as u64)?;
        self.write_pair(Reg::PktTotalNumL, Reg::PktTotalNumH, request.packets.len as u64)?;
        self.write_pair(Reg::StatTotalSizeL, Reg::StatTotalSizeH, request.results.len as u64)?;
        self.enter(ScanState::Configured);
        Ok(())
    }

    /// Poll `STATUS_L` until `done` accepts it; returns the number of polls.
    ///
    /// The error field is checked before `done` on every read.
    fn poll<F>(&mut self, mut done: F) -> Result<u32, AccelError>
    where
        F: FnMut(Status) -> Result<bool, AccelError>,
    {
        let phase = self.state.name();
        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            let status = Status::from_bits_retain(self.read(Reg::StatusL)?);
            polls += 1;
            log::trace!(
                "engine {} {}: status {:#010x}",
                self.engine,
                phase,
                status.bits()
            );

            let code = status.error_code();
            if code != 0 {
                log::warn!("engine {} {}: error code {:#x}", self.engine, phase, code);
                self.enter(ScanState::Error);
                return Err(AccelError::HardwareProtocol {
                    code,
                    status: status.bits(),
                });
            }

            match done(status) {
                Ok(true) => return Ok(polls),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("engine {} {}: {}", self.engine, phase, e);
                    self.enter(ScanState::Error);
                    return Err(e);
                }
            }

            let waited = start.elapsed();
            if waited >= self.policy.timeout {
                return Err(AccelError::Timeout { phase, waited });
            }
            if self.policy.interval.is_zero() {
                core::hint::spin_loop();
            } else {
                std::thread::sleep(self.policy.interval);
            }
        }
    }

    fn enter(&mut self, state: ScanState) {
        self.state = state;
        self.history.push(state);
    }

    fn control(&mut self, value: Control) -> Result<(), AccelError> {
        self.write(Reg::ControlL, value.bits())?;
        self.write(Reg::ControlH, 0)
    }

    fn write_pair(&mut self, lo: Reg, hi: Reg, value: u64) -> Result<(), AccelError> {
        let (low, high) = split_u64(value);
        self.write(lo, low)?;
        self.write(hi, high)
    }

    #[inline]
    fn write(&mut self, reg: Reg, value: u32) -> Result<(), AccelError> {
        self.transport.write32(reg.at(self.engine), value)
    }

    #[inline]
    fn read(&mut self, reg: Reg) -> Result<u32, AccelError> {
        self.transport.read32(reg.at(self.engine))
    }
}
