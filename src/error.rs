// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for accelerator operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while encoding, scanning or harvesting.
#[derive(Debug, Error)]
pub enum AccelError {
    /// A required collaborator (worker, hardware manager, buffer) is not bound.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Engine index outside the range served by the hardware manager.
    #[error("engine {engine} out of range (have {count} engines)")]
    InvalidEngine { engine: usize, count: usize },

    /// A lifecycle operation was called out of order or twice.
    #[error("phase order violation: expected {expected}, got {actual}")]
    PhaseOrder {
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Packet payload does not fit the 12-bit length field.
    #[error("payload of {len} bytes exceeds the {max}-byte record limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Pattern text is empty.
    #[error("pattern text is empty")]
    EmptyPattern,

    /// Compiled pattern configuration is wider than the hardware pattern slot.
    #[error("compiled pattern is {len} bytes, hardware width is {max} bytes")]
    PatternConfigTooLarge { len: usize, max: usize },

    /// Destination buffer cannot hold the encoded record.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Nonzero error field (status bits 8-23) reported by the action.
    #[error("hardware error code {code:#06x} (status={status:#010x})")]
    HardwareProtocol { code: u16, status: u32 },

    /// The action ran out of result buffer space during the scan.
    #[error("result buffer space exhausted (status={status:#010x})")]
    ResultSpaceExhausted { status: u32 },

    /// Hardware reported more matches than the result buffer can hold.
    #[error("{matched} matches need {needed} bytes, result buffer holds {available}")]
    ResultOverrun {
        matched: usize,
        needed: usize,
        available: usize,
    },

    /// The string-match action could not be attached.
    #[error("cannot attach action {action_type:#010x}: {reason}")]
    AttachFailed { action_type: u32, reason: String },

    /// A blocking wait expired.
    #[error("timeout in {phase} after {waited:?}")]
    Timeout {
        phase: &'static str,
        waited: Duration,
    },

    /// DMA buffer allocation failed.
    #[error("failed to allocate {size} bytes of DMA memory")]
    Allocation { size: usize },

    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform not supported.
    #[error("platform not supported: the accelerator requires Linux with the CAPI driver")]
    PlatformNotSupported,

    /// No accelerator card found on the system.
    #[error("no accelerator card found")]
    NoCardFound,

    /// Permission denied accessing the card.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),
}

impl AccelError {
    /// Raw code reported by the hardware, if this error came from the status register.
    pub fn hardware_code(&self) -> Option<u32> {
        match self {
            Self::HardwareProtocol { code, .. } => Some(u32::from(*code)),
            Self::ResultSpaceExhausted { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for errors detected while polling the accelerator.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::HardwareProtocol { .. } | Self::ResultSpaceExhausted { .. }
        )
    }

    /// Returns true for expired waits.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for accelerator operations.
pub type AccelResult<T> = Result<T, AccelError>;
