// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Benchmarks for the host-side hot paths: packet encoding, result decoding
//! and a full job against the simulated action.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strmatch_accel::{
    decode_results, AccelConfig, AccelError, Encoder, HardwareManager, JobDescriptor,
    RecordBuffer, SimulatedAction,
};

fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
    Ok(pattern.bytes().take(width).collect())
}

/// Benchmark packet encoding into a growing record buffer.
fn bench_encode_packets(c: &mut Criterion) {
    let payload_sizes: Vec<usize> = vec![
        16,   // short rows
        256,  // typical text column
        2048, // large rows
        4095, // maximum payload
    ];
    let packets = 1024;

    let mut group = c.benchmark_group("encode_packets");

    for size in payload_sizes {
        let payload: Vec<u8> = (0..size).map(|i| (i & 0xFF) as u8).collect();
        group.throughput(Throughput::Bytes((size * packets) as u64));

        group.bench_with_input(BenchmarkId::new("record_buffer", size), &payload, |b, payload| {
            b.iter(|| {
                let mut encoder = Encoder::new();
                let mut buf = RecordBuffer::with_capacity(packets * (64 + size)).unwrap();
                for _ in 0..packets {
                    buf.push_packet(&mut encoder, payload).unwrap();
                }
                buf.used_len()
            });
        });
    }

    group.finish();
}

/// Benchmark result slot decoding.
fn bench_decode_results(c: &mut Criterion) {
    let counts: Vec<usize> = vec![16, 1024, 65536];

    let mut group = c.benchmark_group("decode_results");

    for count in counts {
        let mut buf = vec![0u8; count * 10];
        for (i, slot) in buf.chunks_exact_mut(10).enumerate() {
            slot[4..8].copy_from_slice(&(i as u32).to_le_bytes());
        }
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &buf, |b, buf| {
            b.iter(|| decode_results(buf, count).unwrap());
        });
    }

    group.finish();
}

/// Benchmark a complete job lifecycle on the simulated action.
fn bench_simulated_job(c: &mut Criterion) {
    let packets: Vec<Vec<u8>> = (0..4096).map(|i| format!("row {i} foobar").into_bytes()).collect();
    let hw = HardwareManager::new(SimulatedAction::new(1), AccelConfig::default());

    c.bench_function("simulated_job_4096_packets", |b| {
        b.iter(|| {
            hw.with_transport(SimulatedAction::clear_log);
            JobDescriptor::new(&hw, 0)
                .execute(&literal, "foobar", &packets)
                .unwrap()
                .packet_count
        });
    });
}

criterion_group!(
    benches,
    bench_encode_packets,
    bench_decode_results,
    bench_simulated_job
);
criterion_main!(benches);
