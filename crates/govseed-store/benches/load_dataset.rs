use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use criterion::measurement::WallTime;
use criterion::{BatchSize, BenchmarkGroup, BenchmarkId, Criterion, criterion_group, criterion_main};
use govseed_store::{
    DatasetGenerator, GeneratorConfig, InMemoryStore, LoadOptions, NameSuffix, SqliteStore, Store,
    load_dataset,
};
use govseed_types::{Dataset, TrialConfig};

const SEED: u64 = 42;
const MAX_IN_MEMORY_DEPARTMENTS: usize = 500_000;

fn dataset(config: TrialConfig) -> Dataset {
    let generator_config = GeneratorConfig {
        suffix: NameSuffix::Sequence,
        ..GeneratorConfig::default()
    };
    DatasetGenerator::seeded(generator_config, SEED)
        .generate(config.ministries, config.departments_per_ministry)
        .unwrap()
}

fn options(batch_size: usize) -> LoadOptions {
    LoadOptions::new(NonZeroUsize::new(batch_size).unwrap())
}

fn label(config: TrialConfig, batch_size: usize) -> String {
    format!(
        "m{}_d{}_batch{}",
        config.ministries, config.departments_per_ministry, batch_size
    )
}

fn bench_in_memory(group: &mut BenchmarkGroup<'_, WallTime>, config: TrialConfig, batch_size: usize) {
    if config.department_total() > MAX_IN_MEMORY_DEPARTMENTS {
        return;
    }
    let data = dataset(config);
    let options = options(batch_size);

    group.bench_with_input(
        BenchmarkId::new("memory", label(config, batch_size)),
        &data,
        |b, data| {
            b.iter_batched(
                InMemoryStore::new,
                |store| {
                    let _ = load_dataset(&store, data, &options).unwrap();
                },
                BatchSize::LargeInput,
            )
        },
    );
}

fn bench_sqlite(group: &mut BenchmarkGroup<'_, WallTime>, config: TrialConfig, batch_size: usize) {
    let data = dataset(config);
    let options = options(batch_size);
    let store = SqliteStore::new_in_memory().unwrap();

    group.bench_with_input(
        BenchmarkId::new("sqlite", label(config, batch_size)),
        &data,
        |b, data| {
            b.iter_batched(
                || store.reset().unwrap(),
                |_| {
                    let _ = load_dataset(&store, data, &options).unwrap();
                },
                BatchSize::PerIteration,
            )
        },
    );
}

fn load_dataset_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_dataset_size_scale");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(6));

    let mut sizes = vec![
        TrialConfig::new(10, 10),
        TrialConfig::new(100, 10),
        TrialConfig::new(100, 100),
    ];
    if is_extended() {
        sizes.push(TrialConfig::new(1000, 100));
        sizes.push(TrialConfig::new(1000, 500));
    }

    for config in sizes {
        bench_in_memory(&mut group, config, 500);
        bench_sqlite(&mut group, config, 500);
    }
    group.finish();

    let mut batch_group = c.benchmark_group("load_dataset_batch_scale");
    batch_group.sample_size(20);
    batch_group.warm_up_time(Duration::from_secs(2));
    batch_group.measurement_time(Duration::from_secs(6));

    let config = TrialConfig::new(100, 50);
    let mut batch_sizes = vec![1, 50, 500, 5000];
    if is_extended() {
        batch_sizes.push(8000);
    }
    for batch_size in batch_sizes {
        bench_sqlite(&mut batch_group, config, batch_size);
    }
    batch_group.finish();
}

fn is_extended() -> bool {
    matches!(
        env::var("GOVSEED_BENCH_EXTENDED").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

criterion_group!(benches, load_dataset_bench);
criterion_main!(benches);
