// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! One thread per engine, each running its share of jobs in order.

use crate::buffer::DmaBuffer;
use crate::engine_job::{EngineJob, JobStatus};
use crate::error::AccelError;
use crate::hardware::HardwareManager;
use crate::record::HEADER_SIZE;
use crate::results::result_buffer_size;
use crate::transport::ActionTransport;
use crate::worker::Worker;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one engine job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: usize,
    pub status: JobStatus,
    pub matched: u32,
    pub matched_ids: Vec<u32>,
    pub buff_prep_time: Duration,
    pub scan_time: Duration,
    pub error: Option<AccelError>,
}

/// Everything one engine thread did.
#[derive(Debug, Default)]
pub struct EngineReport {
    pub engine: usize,
    pub jobs: Vec<JobOutcome>,
}

impl EngineReport {
    pub fn matched_total(&self) -> u64 {
        self.jobs.iter().map(|j| u64::from(j.matched)).sum()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count()
    }

    pub fn buff_prep_total(&self) -> Duration {
        self.jobs.iter().map(|j| j.buff_prep_time).sum()
    }

    pub fn scan_total(&self) -> Duration {
        self.jobs.iter().map(|j| j.scan_time).sum()
    }
}

/// Run `schedule[e]` (a list of job ids) on engine `e`, all engines in parallel.
///
/// Each engine thread allocates its staging and result buffers once, sized
/// for its largest packet buffer, and reuses them for every job. A failed
/// job is recorded in the report and the engine moves on to its next job.
///
/// # Errors
///
/// Fails if the schedule names more engines than the card serves, if buffer
/// allocation fails, or if an engine thread panics.
pub fn run_engines<T: ActionTransport>(
    hw: &Arc<HardwareManager<T>>,
    worker: &Arc<dyn Worker>,
    schedule: &[Vec<usize>],
) -> Result<Vec<EngineReport>, AccelError> {
    if schedule.len() > hw.engine_count() {
        return Err(AccelError::InvalidEngine {
            engine: schedule.len() - 1,
            count: hw.engine_count(),
        });
    }
    log::info!("running {} engines", schedule.len());

    std::thread::scope(|s| {
        let handles: Vec<_> = schedule
            .iter()
            .enumerate()
            .map(|(engine, jobs)| s.spawn(move || run_engine(hw, worker, engine, jobs)))
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(engine, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(AccelError::Configuration(format!(
                        "engine {engine} thread panicked"
                    )))
                })
            })
            .collect()
    })
}

fn run_engine<T: ActionTransport>(
    hw: &Arc<HardwareManager<T>>,
    worker: &Arc<dyn Worker>,
    engine: usize,
    jobs: &[usize],
) -> Result<EngineReport, AccelError> {
    let max_len = jobs
        .iter()
        .filter_map(|&id| worker.packet_buffer(id, engine).map(<[u8]>::len))
        .max()
        .unwrap_or(0);
    // Every packet record is at least one header long.
    let max_packets = max_len / HEADER_SIZE;

    let mut staging = Some(DmaBuffer::new(max_len)?);
    let mut results = Some(DmaBuffer::new(result_buffer_size(
        max_packets,
        hw.config().result_safety_factor,
    ))?);

    let mut report = EngineReport {
        engine,
        jobs: Vec::with_capacity(jobs.len()),
    };
    for &id in jobs {
        let mut job = EngineJob::with_hardware(id, engine, Arc::clone(hw));
        job.set_worker(Arc::clone(worker));
        if let Some(buf) = staging.take() {
            job.set_packet_buffer(buf);
        }
        if let Some(buf) = results.take() {
            job.set_result_buffer(buf);
        }

        let error = job.run().err();
        report.jobs.push(JobOutcome {
            job_id: id,
            status: job.status(),
            matched: job.num_matched(),
            matched_ids: job.matched_ids().to_vec(),
            buff_prep_time: job.buff_prep_time(),
            scan_time: job.scan_time(),
            error,
        });

        (staging, results) = job.release_buffers();
        job.cleanup();
    }

    log::info!(
        "engine {}: {} jobs, {} failed, {} matched, scan {:?}",
        engine,
        report.jobs.len(),
        report.failed(),
        report.matched_total(),
        report.scan_total()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccelConfig;
    use crate::driver::ScanState;
    use crate::sim::SimulatedAction;
    use crate::worker::BufferedWorker;

    fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
        Ok(pattern.bytes().take(width).collect())
    }

    fn manager(engines: usize) -> Arc<HardwareManager<SimulatedAction>> {
        Arc::new(HardwareManager::new(
            SimulatedAction::new(engines),
            AccelConfig::default()
                .with_engine_count(engines)
                .with_poll_timeout(Duration::from_millis(100)),
        ))
    }

    fn worker(schedule: &[Vec<usize>]) -> Arc<dyn Worker> {
        let mut worker = BufferedWorker::new();
        worker.set_pattern(&literal, "foo").unwrap();
        for (engine, jobs) in schedule.iter().enumerate() {
            for &id in jobs {
                let packets: Vec<Vec<u8>> = (0..=id).map(|i| vec![b'x'; i * 10]).collect();
                worker.add_packets(id, engine, packets).unwrap();
            }
        }
        Arc::new(worker)
    }

    #[test]
    fn test_reports_per_engine() {
        let schedule = vec![vec![0, 2, 4], vec![1, 3]];
        let hw = manager(2);

        let reports = run_engines(&hw, &worker(&schedule), &schedule).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].engine, 0);
        let ids: Vec<usize> = reports[0].jobs.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, [0, 2, 4]);
        assert_eq!(reports[1].jobs.len(), 2);
        assert!(reports
            .iter()
            .flat_map(|r| &r.jobs)
            .all(|j| j.status == JobStatus::Done && j.error.is_none()));
        assert_eq!(hw.attachments(), 0);

        let sim = Arc::try_unwrap(hw).unwrap().into_transport();
        assert_eq!(sim.overlapping_accesses(), 0);
        assert_eq!(sim.starts(), 5);
    }

    #[test]
    fn test_failed_job_does_not_stop_engine() {
        let schedule = vec![vec![0, 1]];
        let hw = manager(1);
        hw.with_transport(|sim| sim.inject_error(0, ScanState::CopyingPattern, 0x3));

        let reports = run_engines(&hw, &worker(&schedule), &schedule).unwrap();
        let jobs = &reports[0].jobs;
        assert_eq!(jobs.len(), 2);
        // The injection hits every scan on the engine; the second job still runs.
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[1].job_id, 1);
        assert_eq!(jobs[0].error.as_ref().and_then(AccelError::hardware_code), Some(0x3));
        assert_eq!(reports[0].failed(), 2);
    }

    #[test]
    fn test_too_many_engines() {
        let schedule = vec![vec![0], vec![1], vec![2]];
        let hw = manager(2);
        assert!(matches!(
            run_engines(&hw, &worker(&schedule[..2]), &schedule),
            Err(AccelError::InvalidEngine { engine: 2, count: 2 })
        ));
    }
}
