use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use prodcons_rs::{Buffer, CancelToken, Config, FanoutBuffer, ProdCons, HIGH_THROUGHPUT_CONFIG};
use std::thread;

const MSG_PER_PRODUCER: u64 = 100_000;
const BATCH_SIZE: usize = 64;

/// Runs `producers` threads of `MSG_PER_PRODUCER` puts against `consume`.
fn run_plain<F>(config: Config, producers: usize, consume: F)
where
    F: FnOnce(&Buffer<u64>, &CancelToken) + Send,
{
    let buffer = Buffer::<u64>::new(config).unwrap();
    buffer.configure_expected_producers(producers);
    let cancel = CancelToken::new();

    thread::scope(|s| {
        for _ in 0..producers {
            s.spawn(|| {
                let producer = buffer.register_producer(&cancel).unwrap();
                for i in 0..MSG_PER_PRODUCER {
                    producer.put(i).unwrap();
                }
            });
        }
        consume(&buffer, &cancel);
    });
}

fn bench_spsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    for capacity in [1usize, 16, 1024] {
        group.bench_with_input(BenchmarkId::new("get", capacity), &capacity, |b, &cap| {
            b.iter(|| {
                run_plain(Config::new(cap, false), 1, |buffer, cancel| {
                    while let Some(v) = buffer.get(cancel).unwrap() {
                        black_box(v);
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpmc");

    for producers in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(MSG_PER_PRODUCER * producers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{producers}P_{producers}C")),
            &producers,
            |b, &n| {
                b.iter(|| {
                    run_plain(HIGH_THROUGHPUT_CONFIG, n, |buffer, cancel| {
                        thread::scope(|s| {
                            for _ in 0..n {
                                s.spawn(|| {
                                    while let Some(v) = buffer.get(cancel).unwrap() {
                                        black_box(v);
                                    }
                                });
                            }
                        });
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER * 4));

    group.bench_function("get_batch_4P_1C", |b| {
        b.iter(|| {
            run_plain(HIGH_THROUGHPUT_CONFIG, 4, |buffer, cancel| loop {
                let batch = buffer.get_batch(BATCH_SIZE, cancel).unwrap();
                if batch.is_empty() {
                    break;
                }
                black_box(batch);
            });
        });
    });

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    const GROUPS: u64 = 10_000;
    let mut group = c.benchmark_group("fanout");

    for copies in [1usize, 2, 4] {
        group.throughput(Throughput::Elements(GROUPS * copies as u64));
        group.bench_with_input(BenchmarkId::new("copies", copies), &copies, |b, &n| {
            b.iter(|| {
                let buffer = FanoutBuffer::<u64>::with_capacity(16).unwrap();
                buffer.configure_expected_producers(1);
                let cancel = CancelToken::new();

                thread::scope(|s| {
                    s.spawn(|| {
                        let producer = buffer.register_producer(&cancel).unwrap();
                        for i in 0..GROUPS {
                            producer.put_copies(i, n).unwrap();
                        }
                    });
                    for _ in 0..n {
                        s.spawn(|| {
                            while let Some(v) = buffer.get(&cancel).unwrap() {
                                black_box(v);
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spsc, bench_mpmc, bench_batch, bench_fanout);
criterion_main!(benches);
