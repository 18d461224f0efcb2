//! Benchmarks for the soul scheduler.
//!
//! Benchmarks cover:
//! - Fan-out of independent tasks followed by `block`
//! - Nested fork-join from inside tasks
//! - Context-affine task throughput on the submitting thread
//! - Priority mixes under work stealing

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use soul_scheduler::config::SchedulerConfig;
use soul_scheduler::core::{LaunchPolicy, Priority, Scheduler};

// ============================================================================
// Helper Functions
// ============================================================================

fn build_scheduler(workers: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig::default().with_worker_count(workers))
        .expect("bench scheduler")
}

fn spin(iterations: u64) -> u64 {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = acc.wrapping_mul(31).wrapping_add(black_box(i));
    }
    acc
}

// ============================================================================
// Fork-Join Benchmarks
// ============================================================================

fn bench_fan_out_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_block");
    let scheduler = build_scheduler(num_cpus::get().saturating_sub(1));

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let sum = Arc::new(AtomicU64::new(0));
            b.iter(|| {
                for i in 0..size {
                    let sum = Arc::clone(&sum);
                    scheduler.add_task(Priority::High, LaunchPolicy::Continue, false, move || {
                        sum.fetch_add(spin(64) ^ i, Ordering::Relaxed);
                    });
                }
                scheduler.block();
                black_box(sum.load(Ordering::Relaxed));
            });
        });
    }
    group.finish();
    scheduler.terminate().expect("bench terminate");
}

fn bench_nested_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_block");
    let scheduler = build_scheduler(num_cpus::get().saturating_sub(1));

    for parents in [8u64, 32] {
        group.throughput(Throughput::Elements(parents * 32));
        group.bench_with_input(BenchmarkId::from_parameter(parents), &parents, |b, &parents| {
            b.iter(|| {
                for _ in 0..parents {
                    let inner = scheduler.clone();
                    scheduler.add_task(Priority::Low, LaunchPolicy::Continue, false, move || {
                        for _ in 0..32 {
                            inner.add_task(Priority::High, LaunchPolicy::Continue, false, || {
                                black_box(spin(128));
                            });
                        }
                        inner.block();
                    });
                }
                scheduler.block();
            });
        });
    }
    group.finish();
    scheduler.terminate().expect("bench terminate");
}

// ============================================================================
// Launch Policy and Affinity Benchmarks
// ============================================================================

fn bench_immediate_launch(c: &mut Criterion) {
    let mut group = c.benchmark_group("immediate_launch");
    let scheduler = build_scheduler(2);

    group.throughput(Throughput::Elements(256));
    group.bench_function("immediate_256", |b| {
        b.iter(|| {
            for _ in 0..256 {
                scheduler.add_task(Priority::High, LaunchPolicy::Immediate, false, || {
                    black_box(spin(16));
                });
            }
            scheduler.block();
        });
    });
    group.finish();
    scheduler.terminate().expect("bench terminate");
}

fn bench_affine_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("affine_throughput");
    let scheduler = build_scheduler(2);

    for size in [100u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for _ in 0..size {
                    scheduler.add_task(Priority::High, LaunchPolicy::Continue, true, || {
                        black_box(spin(16));
                    });
                }
                scheduler.block();
            });
        });
    }
    group.finish();
    scheduler.terminate().expect("bench terminate");
}

// ============================================================================
// Priority Mix Benchmarks
// ============================================================================

fn bench_mixed_priorities(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_priorities");
    let scheduler = build_scheduler(num_cpus::get().saturating_sub(1));

    group.throughput(Throughput::Elements(2_000));
    group.bench_function("high_low_2000", |b| {
        b.iter(|| {
            for i in 0..2_000u32 {
                let priority = if i % 4 == 0 { Priority::Low } else { Priority::High };
                scheduler.add_task(priority, LaunchPolicy::Continue, false, || {
                    black_box(spin(32));
                });
            }
            scheduler.block();
        });
    });
    group.finish();
    scheduler.terminate().expect("bench terminate");
}

criterion_group!(fork_join_benches, bench_fan_out_block, bench_nested_block);

criterion_group!(
    launch_benches,
    bench_immediate_launch,
    bench_affine_throughput
);

criterion_group!(priority_benches, bench_mixed_priorities);

criterion_main!(fork_join_benches, launch_benches, priority_benches);
