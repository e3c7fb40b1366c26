// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Action transport: the card-level primitives the protocol is built on.
//!
//! A transport attaches to the string-match action on one card and offers
//! raw 32-bit MMIO access to its register space plus the action-level
//! start/idle handshake. The register protocol itself lives in
//! [`crate::driver`]; transports know nothing about it.
//!
//! Implementations:
//! - [`crate::device::MmioCard`]: memory-mapped card on Linux
//! - [`crate::sim::SimulatedAction`]: software model for hardware-less runs

use crate::error::AccelError;
use std::time::Duration;

/// Card/action transport.
pub trait ActionTransport: Send {
    /// Attach the action of type `action_type`, waiting up to `timeout`.
    fn attach(&mut self, action_type: u32, timeout: Duration) -> Result<(), AccelError>;

    /// Detach the action. Detaching an unattached transport is a no-op.
    fn detach(&mut self) -> Result<(), AccelError>;

    /// Read a 32-bit register at byte `offset`.
    fn read32(&mut self, offset: u32) -> Result<u32, AccelError>;

    /// Write a 32-bit register at byte `offset`.
    fn write32(&mut self, offset: u32, value: u32) -> Result<(), AccelError>;

    /// Kick the action (action-level start bit).
    fn start(&mut self) -> Result<(), AccelError>;

    /// Block until the action reports idle, or fail with a timeout.
    ///
    /// Returns the time spent waiting.
    fn wait_idle(&mut self, timeout: Duration) -> Result<Duration, AccelError>;
}

impl<T: ActionTransport + ?Sized> ActionTransport for Box<T> {
    fn attach(&mut self, action_type: u32, timeout: Duration) -> Result<(), AccelError> {
        (**self).attach(action_type, timeout)
    }

    fn detach(&mut self) -> Result<(), AccelError> {
        (**self).detach()
    }

    fn read32(&mut self, offset: u32) -> Result<u32, AccelError> {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<(), AccelError> {
        (**self).write32(offset, value)
    }

    fn start(&mut self) -> Result<(), AccelError> {
        (**self).start()
    }

    fn wait_idle(&mut self, timeout: Duration) -> Result<Duration, AccelError> {
        (**self).wait_idle(timeout)
    }
}
