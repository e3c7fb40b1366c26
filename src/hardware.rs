// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Shared, lock-guarded access to one accelerator card.

use crate::config::AccelConfig;
use crate::driver::{PollPolicy, ScanDriver, ScanOutcome, ScanRequest};
use crate::error::AccelError;
use crate::regs::{Control, Reg};
use crate::transport::ActionTransport;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Inner<T> {
    transport: T,
    attached: usize,
}

/// Hardware manager shared by every job on one card.
///
/// All register traffic goes through a single mutex. A complete scan
/// (configure, copy, scan, flush, idle wait) is one lock acquisition, so
/// register sequences of different engines never interleave.
///
/// # Example
///
/// ```rust
/// use strmatch_accel::{AccelConfig, HardwareManager, SimulatedAction};
///
/// let hw = HardwareManager::new(SimulatedAction::new(2), AccelConfig::default().with_engine_count(2));
/// hw.attach().unwrap();
/// hw.reset_engine(1).unwrap();
/// hw.release().unwrap();
/// ```
pub struct HardwareManager<T: ActionTransport> {
    inner: Mutex<Inner<T>>,
    config: AccelConfig,
}

impl<T: ActionTransport> HardwareManager<T> {
    pub fn new(transport: T, config: AccelConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                attached: 0,
            }),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    #[inline]
    pub fn engine_count(&self) -> usize {
        self.config.engine_count
    }

    /// Polling policy derived from the configuration.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: self.config.poll_timeout,
            interval: self.config.poll_interval,
        }
    }

    /// Take one reference on the action attachment.
    ///
    /// The first reference attaches the transport.
    pub fn attach(&self) -> Result<(), AccelError> {
        let mut inner = self.lock();
        if inner.attached == 0 {
            log::debug!(
                "attaching action {:#010x} ({})",
                self.config.action_type,
                self.config.device_path()
            );
            inner
                .transport
                .attach(self.config.action_type, self.config.attach_timeout)?;
        }
        inner.attached += 1;
        Ok(())
    }

    /// Drop one reference on the action attachment.
    ///
    /// The last reference detaches the transport. Releasing without an
    /// attachment is a no-op.
    pub fn release(&self) -> Result<(), AccelError> {
        let mut inner = self.lock();
        match inner.attached {
            0 => Ok(()),
            1 => {
                inner.attached = 0;
                log::debug!("detaching action");
                inner.transport.detach()
            }
            _ => {
                inner.attached -= 1;
                Ok(())
            }
        }
    }

    /// Number of outstanding attachment references.
    pub fn attachments(&self) -> usize {
        self.lock().attached
    }

    /// Soft reset `engine`: control bit 4 written, then cleared.
    pub fn reset_engine(&self, engine: usize) -> Result<(), AccelError> {
        self.check_engine(engine)?;
        let mut inner = self.lock();
        let t = &mut inner.transport;
        t.write32(Reg::ControlL.at(engine), Control::SOFT_RESET.bits())?;
        t.write32(Reg::ControlH.at(engine), 0)?;
        t.write32(Reg::ControlL.at(engine), 0)?;
        t.write32(Reg::ControlH.at(engine), 0)?;
        log::debug!("engine {engine}: soft reset");
        Ok(())
    }

    /// Run one complete scan on `engine`, then start the action and wait for it to go idle.
    ///
    /// # Errors
    ///
    /// Returns the driver's error for protocol failures and polling
    /// timeouts, or a timeout if the action never reports idle.
    pub fn scan(&self, engine: usize, request: &ScanRequest) -> Result<ScanOutcome, AccelError> {
        self.check_engine(engine)?;
        let policy = self.poll_policy();
        let mut inner = self.lock();
        let t = &mut inner.transport;

        let mut outcome = ScanDriver::new(&mut *t, engine, policy).run(request)?;
        t.start()?;
        outcome.idle_wait = t.wait_idle(self.config.idle_timeout)?;
        Ok(outcome)
    }

    /// Read `STATUS_L` `reads` times, then return `STATUS_H`.
    pub fn settle(&self, engine: usize, reads: u32) -> Result<u32, AccelError> {
        self.check_engine(engine)?;
        let mut inner = self.lock();
        let t = &mut inner.transport;
        for _ in 0..reads {
            t.read32(Reg::StatusL.at(engine))?;
        }
        t.read32(Reg::StatusH.at(engine))
    }

    /// Read one engine register.
    pub fn reg_read(&self, engine: usize, reg: Reg) -> Result<u32, AccelError> {
        self.check_engine(engine)?;
        self.lock().transport.read32(reg.at(engine))
    }

    /// Write one engine register.
    pub fn reg_write(&self, engine: usize, reg: Reg, value: u32) -> Result<(), AccelError> {
        self.check_engine(engine)?;
        self.lock().transport.write32(reg.at(engine), value)
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().transport)
    }

    /// Consume the manager and return the transport.
    pub fn into_transport(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
    }

    fn check_engine(&self, engine: usize) -> Result<(), AccelError> {
        if engine >= self.config.engine_count {
            return Err(AccelError::InvalidEngine {
                engine,
                count: self.config.engine_count,
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ActionTransport> std::fmt::Debug for HardwareManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareManager")
            .field("config", &self.config)
            .field("attached", &self.inner.try_lock().ok().map(|i| i.attached))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDescriptor;
    use crate::driver::ScanState;
    use crate::sim::{RegisterOp, SimulatedAction};
    use std::time::Duration;

    fn manager(engines: usize) -> HardwareManager<SimulatedAction> {
        HardwareManager::new(
            SimulatedAction::new(engines),
            AccelConfig::default()
                .with_engine_count(engines)
                .with_poll_timeout(Duration::from_millis(50)),
        )
    }

    fn request() -> ScanRequest {
        ScanRequest {
            pattern: BufferDescriptor { addr: 0x1000, len: 128 },
            packets: BufferDescriptor { addr: 0x2000, len: 0 },
            results: BufferDescriptor { addr: 0, len: 4096 },
        }
    }

    #[test]
    fn test_attach_refcount() {
        let hw = manager(1);
        hw.attach().unwrap();
        hw.attach().unwrap();
        hw.release().unwrap();
        assert!(hw.with_transport(|sim| sim.is_attached()));
        hw.release().unwrap();
        hw.release().unwrap();

        let sim = hw.into_transport();
        assert!(!sim.is_attached());
        assert_eq!(sim.attach_count(), 1);
        assert_eq!(sim.detach_count(), 1);
    }

    #[test]
    fn test_attach_failure_takes_no_reference() {
        let hw = HardwareManager::new(
            SimulatedAction::new(1).with_action_type(0x1234),
            AccelConfig::default(),
        );
        assert!(matches!(hw.attach(), Err(AccelError::AttachFailed { .. })));
        assert_eq!(hw.attachments(), 0);
    }

    #[test]
    fn test_reset_sequence() {
        let hw = manager(2);
        hw.reset_engine(1).unwrap();
        let sim = hw.into_transport();
        assert_eq!(
            sim.log(),
            &[
                RegisterOp::Write { offset: 0x130, value: 0x10 },
                RegisterOp::Write { offset: 0x134, value: 0 },
                RegisterOp::Write { offset: 0x130, value: 0 },
                RegisterOp::Write { offset: 0x134, value: 0 },
            ]
        );
        assert_eq!(sim.resets(1), 1);
    }

    #[test]
    fn test_engine_out_of_range() {
        let hw = manager(2);
        assert!(matches!(
            hw.reset_engine(2),
            Err(AccelError::InvalidEngine { engine: 2, count: 2 })
        ));
        assert!(hw.scan(5, &request()).is_err());
    }

    #[test]
    fn test_scan_and_settle() {
        let hw = manager(1);
        hw.with_transport(|sim| sim.set_match_count(0, 7));
        let outcome = hw.scan(0, &request()).unwrap();
        assert_eq!(outcome.matched_packets, 7);
        assert_eq!(hw.settle(0, 10).unwrap(), 7);

        let sim = hw.into_transport();
        assert_eq!(sim.starts(), 1);
        let status_reads = sim
            .log()
            .iter()
            .rev()
            .skip(1)
            .take_while(|op| **op == RegisterOp::Read { offset: Reg::StatusL.at(0) })
            .count();
        assert_eq!(status_reads, 10);
    }

    #[test]
    fn test_register_access() {
        let hw = manager(2);
        hw.reg_write(1, Reg::PktTotalNumL, 0x40).unwrap();
        assert_eq!(hw.reg_read(1, Reg::PktTotalNumL).unwrap(), 0x40);
        assert_eq!(hw.reg_read(0, Reg::PktTotalNumL).unwrap(), 0);
        assert_eq!(hw.with_transport(|sim| sim.register(0x168)), 0x40);
    }

    #[test]
    fn test_idle_timeout_surfaces() {
        let hw = manager(1);
        hw.with_transport(|sim| sim.hang_idle());
        let err = hw.scan(0, &request()).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_stalled_scan_times_out() {
        let hw = manager(1);
        hw.with_transport(|sim| sim.stall(0, ScanState::Scanning));
        assert!(matches!(
            hw.scan(0, &request()),
            Err(AccelError::Timeout { phase: "SCANNING", .. })
        ));
    }
}
