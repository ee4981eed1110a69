use core::hash::BuildHasher;
use core::hash::Hash;
use core::hint::black_box;

use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::HashMap as HashbrownMap;
use probe_hash::HashTable as ProbeTable;
use probe_hash::key_policy::HashPolicy;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::distr;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;
use siphasher::sip::SipHasher;

#[derive(Clone, Copy, Default)]
struct SipBuilder;

impl BuildHasher for SipBuilder {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> Self::Hasher {
        SipHasher::new_with_keys(0x5eed_0001, 0x5eed_0002)
    }
}

type Probe<K> = ProbeTable<K, u64, HashPolicy<SipBuilder>>;
type Hashbrown<K> = HashbrownMap<K, u64, SipBuilder>;

fn probe_table<K>() -> Probe<K> {
    ProbeTable::with_policy(HashPolicy::with_hasher(SipBuilder))
}

fn hashbrown_table<K>() -> Hashbrown<K> {
    HashbrownMap::with_hasher(SipBuilder)
}

trait BenchKey: Clone + Hash + Eq {
    fn new(key: u64) -> Self;
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct SmallKey(u64);

impl BenchKey for SmallKey {
    fn new(key: u64) -> Self {
        black_box(Self(key))
    }
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct StringKey(String);

impl BenchKey for StringKey {
    fn new(key: u64) -> Self {
        black_box(Self(format!("key_{:016X}", key)))
    }
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
    (1 << 18),
];

#[derive(Clone, Copy)]
enum Operation {
    Insert,
    Remove,
    Find,
}

fn random_keys<K: BenchKey>(count: usize) -> Vec<(K, u64)> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            let key = rng.try_next_u64().unwrap();
            (K::new(key), key)
        })
        .collect()
}

fn bench_insert_random<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "insert_random_{}",
        core::any::type_name::<K>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter_batched(
                || keys.clone(),
                |keys| {
                    let mut table = probe_table::<K>();
                    for (key, value) in keys {
                        black_box(table.insert(key, value));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || keys.clone(),
                |keys| {
                    let mut table = hashbrown_table::<K>();
                    for (key, value) in keys {
                        black_box(table.insert(key, value));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit_miss<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "find_hit_miss_{}",
        core::any::type_name::<K>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let present = (0..size as u64).map(K::new).collect::<Vec<K>>();
        let mut probes = (0..size as u64 * 2).map(K::new).collect::<Vec<K>>();
        probes.shuffle(&mut SmallRng::from_os_rng());

        let mut probe = probe_table::<K>();
        let mut hashbrown = hashbrown_table::<K>();
        for (i, key) in present.iter().enumerate() {
            probe.insert(key.clone(), i as u64);
            hashbrown.insert(key.clone(), i as u64);
        }

        group.throughput(Throughput::Elements(probes.len() as u64));
        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter(|| {
                for key in &probes {
                    black_box(probe.lookup(key));
                }
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                for key in &probes {
                    black_box(hashbrown.get(key));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("remove_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);

        let mut probe = probe_table::<K>();
        let mut hashbrown = hashbrown_table::<K>();
        for (key, value) in keys.iter().cloned() {
            probe.insert(key.clone(), value);
            hashbrown.insert(key, value);
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter_batched(
                || probe.clone(),
                |mut table| {
                    for (key, _) in &keys {
                        black_box(table.remove(key));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || hashbrown.clone(),
                |mut table| {
                    for (key, _) in &keys {
                        black_box(table.remove(key));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_iteration<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("iteration_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let probe = keys.iter().cloned().fold(probe_table::<K>(), |mut table, (k, v)| {
            table.insert(k, v);
            table
        });
        let hashbrown = keys
            .iter()
            .cloned()
            .fold(hashbrown_table::<K>(), |mut table, (k, v)| {
                table.insert(k, v);
                table
            });

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter(|| black_box(probe.values().fold(0u64, |acc, v| acc.wrapping_add(*v))))
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| black_box(hashbrown.values().fold(0u64, |acc, v| acc.wrapping_add(*v))))
        });
    }

    group.finish();
}

/// Every key is inserted then removed, in shuffled order. Exercises grave
/// buildup and in-place compaction.
fn bench_churn<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let insertions_and_removals = (0..size as u64)
            .flat_map(|i| {
                let key = K::new(i);
                [(key.clone(), i), (key, i)]
            })
            .collect::<Vec<(K, u64)>>();

        group.throughput(Throughput::Elements(size as u64 * 2));
        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut ops = insertions_and_removals.clone();
                    ops.shuffle(&mut SmallRng::from_os_rng());
                    ops
                },
                |ops| {
                    let mut table = probe_table::<K>();
                    for (key, value) in ops {
                        match table.entry(key) {
                            probe_hash::Entry::Vacant(entry) => {
                                black_box(entry.insert(value));
                            }
                            probe_hash::Entry::Occupied(entry) => {
                                black_box(entry.remove());
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut ops = insertions_and_removals.clone();
                    ops.shuffle(&mut SmallRng::from_os_rng());
                    ops
                },
                |ops| {
                    let mut table = hashbrown_table::<K>();
                    for (key, value) in ops {
                        match table.entry(key) {
                            hashbrown::hash_map::Entry::Vacant(entry) => {
                                black_box(entry.insert(value));
                            }
                            hashbrown::hash_map::Entry::Occupied(entry) => {
                                black_box(entry.remove());
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_mixed_probabilistic<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "mixed_probabilistic_{}",
        core::any::type_name::<K>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    const KEY_SPACE_MULTIPLIER: u64 = 2;

    for &size in SIZES[..=MAX_SIZE].iter() {
        let mut rng = SmallRng::from_os_rng();
        let insert_distr = Zipf::new(size as f32 - 1.0, 1.0).unwrap();
        let find_remove_distr =
            Zipf::new(size as f32 * KEY_SPACE_MULTIPLIER as f32 - 1.0, 1.0).unwrap();

        let operations = (0..size * 3)
            .map(|_| {
                let op_choice: f64 = rng.sample(distr::Uniform::new(0.0, 1.0).unwrap());
                if op_choice < 0.5 {
                    (Operation::Find, K::new(rng.sample(find_remove_distr) as u64))
                } else if op_choice < 0.75 {
                    (Operation::Insert, K::new(rng.sample(insert_distr) as u64))
                } else {
                    (Operation::Remove, K::new(rng.sample(find_remove_distr) as u64))
                }
            })
            .collect::<Vec<(Operation, K)>>();

        group.throughput(Throughput::Elements(operations.len() as u64));
        group.bench_function(format!("probe_hash/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let mut table = probe_table::<K>();
                    for (i, (operation, key)) in operations.into_iter().enumerate() {
                        match operation {
                            Operation::Insert => {
                                black_box(table.update(key, i as u64));
                            }
                            Operation::Remove => {
                                black_box(table.remove(&key));
                            }
                            Operation::Find => {
                                black_box(table.lookup(&key));
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let mut table = hashbrown_table::<K>();
                    for (i, (operation, key)) in operations.into_iter().enumerate() {
                        match operation {
                            Operation::Insert => {
                                black_box(table.insert(key, i as u64));
                            }
                            Operation::Remove => {
                                black_box(table.remove(&key));
                            }
                            Operation::Find => {
                                black_box(table.get(&key));
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_random::<SmallKey, 4>,
    bench_insert_random::<StringKey, 3>,
    bench_find_hit_miss::<SmallKey, 4>,
    bench_find_hit_miss::<StringKey, 3>,
    bench_remove::<SmallKey, 4>,
    bench_remove::<StringKey, 3>,
    bench_iteration::<SmallKey, 4>,
    bench_churn::<SmallKey, 4>,
    bench_churn::<StringKey, 3>,
    bench_mixed_probabilistic::<SmallKey, 4>,
    bench_mixed_probabilistic::<StringKey, 3>,
);

criterion_main!(benches);
