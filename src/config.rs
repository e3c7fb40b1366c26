// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Tunables shared by jobs and the hardware manager.

use crate::record::PATTERN_WIDTH_BYTES;
use crate::regs::ACTION_TYPE_STRING_MATCH;
use std::time::Duration;

/// Default action wait time.
pub const DEFAULT_ACTION_WAIT: Duration = Duration::from_secs(10);

/// Default time allowed for attaching the action (5x the wait time).
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(50);

/// Default result-buffer over-allocation factor.
///
/// The action has been seen writing past the naive `10 * packets` estimate.
pub const DEFAULT_RESULT_SAFETY_FACTOR: usize = 2;

/// Default `STATUS_L` reads before harvesting a job's results.
pub const DEFAULT_HARVEST_SETTLE_READS: u32 = 2;

/// Default `STATUS_L` reads before reading an engine job's match count.
pub const DEFAULT_ENGINE_SETTLE_READS: u32 = 10;

/// Accelerator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelConfig {
    /// Card number, selects `/dev/cxl/afu<N>.0s`.
    pub card_number: u32,
    /// Action type to attach.
    pub action_type: u32,
    /// Timeout for attaching the action.
    pub attach_timeout: Duration,
    /// Timeout for the action-level idle wait after a scan.
    pub idle_timeout: Duration,
    /// Deadline for each status polling loop.
    pub poll_timeout: Duration,
    /// Pause between status polls; zero spins.
    pub poll_interval: Duration,
    /// Multiplier applied to the result buffer estimate.
    pub result_safety_factor: usize,
    /// Hardware pattern slot width in bytes.
    pub pattern_width_bytes: usize,
    /// Settle reads before a job harvest.
    pub harvest_settle_reads: u32,
    /// Settle reads after an engine job scan.
    pub engine_settle_reads: u32,
    /// Number of engines served by one card.
    pub engine_count: usize,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            card_number: 0,
            action_type: ACTION_TYPE_STRING_MATCH,
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            idle_timeout: DEFAULT_ACTION_WAIT,
            poll_timeout: DEFAULT_ACTION_WAIT,
            poll_interval: Duration::ZERO,
            result_safety_factor: DEFAULT_RESULT_SAFETY_FACTOR,
            pattern_width_bytes: PATTERN_WIDTH_BYTES,
            harvest_settle_reads: DEFAULT_HARVEST_SETTLE_READS,
            engine_settle_reads: DEFAULT_ENGINE_SETTLE_READS,
            engine_count: 1,
        }
    }
}

impl AccelConfig {
    pub fn with_card_number(mut self, card_number: u32) -> Self {
        self.card_number = card_number;
        self
    }

    pub fn with_action_type(mut self, action_type: u32) -> Self {
        self.action_type = action_type;
        self
    }

    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the result buffer safety factor (at least 1).
    pub fn with_result_safety_factor(mut self, factor: usize) -> Self {
        self.result_safety_factor = factor.max(1);
        self
    }

    pub fn with_pattern_width(mut self, width: usize) -> Self {
        self.pattern_width_bytes = width;
        self
    }

    pub fn with_harvest_settle_reads(mut self, reads: u32) -> Self {
        self.harvest_settle_reads = reads;
        self
    }

    pub fn with_engine_settle_reads(mut self, reads: u32) -> Self {
        self.engine_settle_reads = reads;
        self
    }

    /// Set the number of engines (at least 1).
    pub fn with_engine_count(mut self, engines: usize) -> Self {
        self.engine_count = engines.max(1);
        self
    }

    /// Device node of the configured card.
    pub fn device_path(&self) -> String {
        format!("/dev/cxl/afu{}.0s", self.card_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AccelConfig::default();
        assert_eq!(config.result_safety_factor, 2);
        assert_eq!(config.harvest_settle_reads, 2);
        assert_eq!(config.engine_settle_reads, 10);
        assert_eq!(config.attach_timeout, 5 * config.idle_timeout);
        assert_eq!(config.device_path(), "/dev/cxl/afu0.0s");
    }

    #[test]
    fn test_builder_clamps() {
        let config = AccelConfig::default()
            .with_result_safety_factor(0)
            .with_engine_count(0)
            .with_card_number(3);
        assert_eq!(config.result_safety_factor, 1);
        assert_eq!(config.engine_count, 1);
        assert_eq!(config.device_path(), "/dev/cxl/afu3.0s");
    }
}
