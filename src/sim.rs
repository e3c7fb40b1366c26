// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software model of the string-match action's register protocol.
//!
//! [`SimulatedAction`] answers control writes with the status bits the real
//! action would raise, so the driver, job descriptors and engine jobs can run
//! without a card. It also supports:
//! - scripted `STATUS_L` sequences per engine
//! - error-code injection in a given scan phase
//! - result-space exhaustion and stalled phases
//! - emulated result DMA into the programmed result buffer
//! - a full register access log and overlap detection between engines

use crate::driver::ScanState;
use crate::error::AccelError;
use crate::record::RESULT_SLOT_SIZE;
use crate::regs::{Control, Reg, Status, ACTION_TYPE_STRING_MATCH};
use crate::transport::ActionTransport;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One logged register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Read { offset: u32 },
    Write { offset: u32, value: u32 },
}

impl RegisterOp {
    /// Absolute register offset.
    pub fn offset(&self) -> u32 {
        match *self {
            Self::Read { offset } | Self::Write { offset, .. } => offset,
        }
    }

    /// Engine whose register block was accessed.
    pub fn engine(&self) -> Option<usize> {
        Reg::decode(self.offset()).map(|(engine, _)| engine)
    }
}

#[derive(Debug, Default)]
struct EngineModel {
    phase: Option<ScanState>,
    status: u32,
    match_count: u32,
    script: VecDeque<u32>,
    inject: Option<(ScanState, u16)>,
    exhausted: bool,
    stall: Option<ScanState>,
    dma_ids: Option<Vec<u32>>,
    resets: u32,
}

/// Simulated string-match action.
#[derive(Debug)]
pub struct SimulatedAction {
    engines: Vec<EngineModel>,
    regs: HashMap<u32, u32>,
    log: Vec<RegisterOp>,
    action_type: u32,
    attached: bool,
    attach_count: u32,
    detach_count: u32,
    starts: u32,
    idle_hang: bool,
    active_scan: Option<usize>,
    overlaps: usize,
}

impl SimulatedAction {
    /// Model an action serving `engines` engines.
    pub fn new(engines: usize) -> Self {
        Self {
            engines: (0..engines.max(1)).map(|_| EngineModel::default()).collect(),
            regs: HashMap::new(),
            log: Vec::new(),
            action_type: ACTION_TYPE_STRING_MATCH,
            attached: false,
            attach_count: 0,
            detach_count: 0,
            starts: 0,
            idle_hang: false,
            active_scan: None,
            overlaps: 0,
        }
    }

    /// Pretend a different action is loaded on the card.
    pub fn with_action_type(mut self, action_type: u32) -> Self {
        self.action_type = action_type;
        self
    }

    /// Matched packet count reported by `engine` after the flush.
    pub fn set_match_count(&mut self, engine: usize, count: u32) {
        self.engines[engine].match_count = count;
    }

    /// Return `values` for the next `STATUS_L` reads on `engine`, then resume the model.
    pub fn script_status<I: IntoIterator<Item = u32>>(&mut self, engine: usize, values: I) {
        self.engines[engine].script.extend(values);
    }

    /// Raise error `code` in status bits 8-23 once `engine` enters `phase`.
    pub fn inject_error(&mut self, engine: usize, phase: ScanState, code: u16) {
        self.engines[engine].inject = Some((phase, code));
    }

    /// Report result space exhaustion during the scan phase of `engine`.
    pub fn inject_space_exhausted(&mut self, engine: usize) {
        self.engines[engine].exhausted = true;
    }

    /// Never raise the completion bit of `phase` on `engine`.
    pub fn stall(&mut self, engine: usize, phase: ScanState) {
        self.engines[engine].stall = Some(phase);
    }

    /// Make the action-level idle wait time out.
    pub fn hang_idle(&mut self) {
        self.idle_hang = true;
    }

    /// Write one result slot per identifier into the result buffer at flush time.
    ///
    /// If the slots do not fit the programmed result size, the scan phase
    /// reports result space exhaustion instead.
    ///
    /// # Safety
    ///
    /// Every scan on `engine` must program `STAT_INIT_ADDR`/`STAT_TOTAL_SIZE`
    /// with live, writable host memory that is not otherwise accessed until
    /// the scan returns. Scans driven from a job's own result
    /// [`crate::buffer::DmaBuffer`] satisfy this.
    pub unsafe fn emulate_results(&mut self, engine: usize, ids: Vec<u32>) {
        let model = &mut self.engines[engine];
        model.match_count = ids.len() as u32;
        model.dma_ids = Some(ids);
    }

    /// All register accesses so far.
    pub fn log(&self) -> &[RegisterOp] {
        &self.log
    }

    /// Forget the register log.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Last value written to `offset` (0 if never written).
    pub fn register(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    /// Number of soft resets seen by `engine`.
    pub fn resets(&self, engine: usize) -> u32 {
        self.engines[engine].resets
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn attach_count(&self) -> u32 {
        self.attach_count
    }

    pub fn detach_count(&self) -> u32 {
        self.detach_count
    }

    /// Number of action-level starts.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Register accesses by one engine while another engine's scan was in flight.
    pub fn overlapping_accesses(&self) -> usize {
        self.overlaps
    }

    fn engine_of(&self, offset: u32) -> Result<(usize, Reg), AccelError> {
        match Reg::decode(offset) {
            Some((engine, reg)) if engine < self.engines.len() => Ok((engine, reg)),
            _ => Err(AccelError::InvalidArgument(format!(
                "no simulated register at {offset:#x}"
            ))),
        }
    }

    /// 64-bit value of a `_L`/`_H` register pair.
    fn reg_pair(&self, lo: Reg, hi: Reg, engine: usize) -> u64 {
        u64::from(self.register(lo.at(engine))) | (u64::from(self.register(hi.at(engine))) << 32)
    }

    fn track_overlap(&mut self, engine: usize) {
        if let Some(active) = self.active_scan {
            if active != engine {
                self.overlaps += 1;
            }
        }
    }

    fn on_control(&mut self, engine: usize, value: u32) {
        let control = Control::from_bits_retain(value);
        let result_size = self.reg_pair(Reg::StatTotalSizeL, Reg::StatTotalSizeH, engine);
        let result_addr = self.reg_pair(Reg::StatInitAddrL, Reg::StatInitAddrH, engine);
        let model = &mut self.engines[engine];

        let phase = if control.contains(Control::SOFT_RESET) {
            model.status = 0;
            model.phase = None;
            model.resets += 1;
            return;
        } else if control == Control::COPY_PATTERN {
            ScanState::CopyingPattern
        } else if control == Control::WORK {
            ScanState::Scanning
        } else if control == Control::FLUSH {
            ScanState::Flushing
        } else {
            if control.is_empty() && model.phase == Some(ScanState::Flushing) {
                model.phase = Some(ScanState::Done);
                self.active_scan = None;
            }
            return;
        };
        model.phase = Some(phase);

        if let Some((at, code)) = model.inject {
            if at == phase {
                model.status |= u32::from(code) << 8;
            }
        }
        if model.stall == Some(phase) {
            return;
        }

        match phase {
            ScanState::CopyingPattern => model.status |= Status::COPY_DONE.bits(),
            ScanState::Scanning => {
                let overflow = match &model.dma_ids {
                    Some(ids) => (ids.len() * RESULT_SLOT_SIZE) as u64 > result_size,
                    None => false,
                };
                if model.exhausted || overflow {
                    model.status |= Status::STAT_SPACE_EXHAUSTED.bits();
                } else {
                    model.status |= Status::WORK_DONE.bits();
                }
            }
            ScanState::Flushing => {
                if let Some(ids) = &model.dma_ids {
                    if result_addr != 0 {
                        let mut slots = vec![0u8; ids.len() * RESULT_SLOT_SIZE];
                        for (slot, id) in slots.chunks_exact_mut(RESULT_SLOT_SIZE).zip(ids) {
                            slot[4..8].copy_from_slice(&id.to_le_bytes());
                        }
                        // SAFETY: guaranteed by the caller of `emulate_results`; the
                        // scan phase already checked the slots fit the programmed size.
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                slots.as_ptr(),
                                result_addr as *mut u8,
                                slots.len(),
                            );
                        }
                    }
                }
                model.status |= Status::FLUSH_DONE.bits();
            }
            _ => {}
        }
    }
}

impl ActionTransport for SimulatedAction {
    fn attach(&mut self, action_type: u32, _timeout: Duration) -> Result<(), AccelError> {
        if action_type != self.action_type {
            return Err(AccelError::AttachFailed {
                action_type,
                reason: format!("card runs action {:#010x}", self.action_type),
            });
        }
        self.attached = true;
        self.attach_count += 1;
        Ok(())
    }

    fn detach(&mut self) -> Result<(), AccelError> {
        if self.attached {
            self.attached = false;
            self.detach_count += 1;
        }
        Ok(())
    }

    fn read32(&mut self, offset: u32) -> Result<u32, AccelError> {
        let (engine, reg) = self.engine_of(offset)?;
        self.log.push(RegisterOp::Read { offset });
        self.track_overlap(engine);

        let model = &mut self.engines[engine];
        let value = match reg {
            Reg::StatusL => model.script.pop_front().unwrap_or(model.status),
            Reg::StatusH => model.match_count,
            _ => self.regs.get(&offset).copied().unwrap_or(0),
        };

        // A failed poll ends the scan on the host side.
        if reg == Reg::StatusL && self.active_scan == Some(engine) {
            let status = Status::from_bits_retain(value);
            if status.error_code() != 0 || status.contains(Status::STAT_SPACE_EXHAUSTED) {
                self.active_scan = None;
            }
        }
        Ok(value)
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<(), AccelError> {
        let (engine, reg) = self.engine_of(offset)?;
        self.log.push(RegisterOp::Write { offset, value });
        self.track_overlap(engine);
        self.regs.insert(offset, value);

        match reg {
            Reg::PattInitAddrL => {
                if self.active_scan.is_none() {
                    self.active_scan = Some(engine);
                }
                let model = &mut self.engines[engine];
                model.status = 0;
                model.phase = Some(ScanState::Configured);
            }
            Reg::ControlL => self.on_control(engine, value),
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), AccelError> {
        self.starts += 1;
        Ok(())
    }

    fn wait_idle(&mut self, timeout: Duration) -> Result<Duration, AccelError> {
        if self.idle_hang {
            return Err(AccelError::Timeout {
                phase: "action idle wait",
                waited: timeout,
            });
        }
        Ok(Duration::ZERO)
    }
}
