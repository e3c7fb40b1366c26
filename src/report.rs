// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CSV job reports.

use crate::job::JobSummary;
use std::fmt::Write as _;
use std::time::Duration;

/// Column header of [`csv_line`].
pub const CSV_HEADER: &str =
    "num_pkt,pkt_size,init,patt,pkt_cpy,pkt_other,hw_re_scan,harvest,cleanup,hw_perf(MB/s),num_matched_pkt";

/// Scan throughput in MiB/s of `bytes` over `elapsed`.
///
/// Scans shorter than one millisecond report 0.
pub fn throughput_mib_s(elapsed: Duration, bytes: usize) -> f64 {
    let ms = elapsed.as_millis();
    if ms == 0 {
        return 0.0;
    }
    (bytes as f64 / (1024.0 * 1024.0)) * 1000.0 / ms as f64
}

/// One CSV line for a finished job; durations are in nanoseconds.
pub fn csv_line(summary: &JobSummary) -> String {
    let t = &summary.timings;
    let mut line = String::with_capacity(128);
    let _ = write!(
        line,
        "{},{},{},{},{},{},{},{},{},{:.6},{}",
        summary.packet_count,
        summary.payload_bytes,
        t.init.as_nanos(),
        t.pattern.as_nanos(),
        t.packet_copy.as_nanos(),
        t.packet_other().as_nanos(),
        t.scan.as_nanos(),
        t.harvest.as_nanos(),
        t.cleanup.as_nanos(),
        throughput_mib_s(t.scan, summary.payload_bytes),
        summary.matched_packets
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ScanOutcome;
    use crate::job::PhaseTimings;

    #[test]
    fn test_throughput() {
        assert_eq!(throughput_mib_s(Duration::from_micros(999), 1 << 30), 0.0);
        assert_eq!(throughput_mib_s(Duration::from_millis(1000), 64 << 20), 64.0);
        assert_eq!(throughput_mib_s(Duration::from_millis(500), 1 << 20), 2.0);
    }

    #[test]
    fn test_csv_line() {
        let mut timings = PhaseTimings::default();
        timings.init = Duration::from_nanos(1);
        timings.pattern = Duration::from_nanos(2);
        timings.packet_copy = Duration::from_nanos(3);
        timings.packet_load = Duration::from_nanos(10);
        timings.scan = Duration::from_millis(2);
        timings.harvest = Duration::from_nanos(5);
        timings.cleanup = Duration::from_nanos(6);
        let summary = JobSummary {
            packet_count: 4,
            payload_bytes: 2 << 20,
            packet_buffer_len: 0,
            result_buffer_len: 4096,
            matched_packets: 3,
            matched_ids: vec![1, 2, 3],
            scan: ScanOutcome::default(),
            timings,
        };
        assert_eq!(
            csv_line(&summary),
            "4,2097152,1,2,3,7,2000000,5,6,1000.000000,3"
        );
        assert_eq!(CSV_HEADER.split(',').count(), csv_line(&summary).split(',').count());
    }
}
