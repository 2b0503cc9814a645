use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sombra_graphstore::Store;

const INSERT_COUNT: u64 = 8_192;
const LOOKUP_SAMPLES: usize = 2_048;

fn micro_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/index");
    group.sample_size(20);

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("sequential_insert", |b| {
        b.iter_batched(
            || Store::new_store(false),
            |store| {
                let _thread = store.register_thread();
                let mut tx = store.start_transaction(false);
                for v in 0..INSERT_COUNT {
                    tx.insert_vertex(v).expect("insert");
                }
                tx.commit().expect("commit");
                black_box(store.chunk_count());
            },
            BatchSize::SmallInput,
        );
    });

    let mut random_keys: Vec<u64> = (0..INSERT_COUNT).collect();
    random_keys.shuffle(&mut ChaCha8Rng::seed_from_u64(0xBEEF_F00D));
    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("random_insert", |b| {
        b.iter_batched(
            || Store::new_store(false),
            |store| {
                let _thread = store.register_thread();
                let mut tx = store.start_transaction(false);
                for v in &random_keys {
                    tx.insert_vertex(*v).expect("insert");
                }
                tx.commit().expect("commit");
                black_box(store.chunk_count());
            },
            BatchSize::SmallInput,
        );
    });

    let lookup_store = Store::new_store(false);
    let _thread = lookup_store.register_thread();
    let mut seed_tx = lookup_store.start_transaction(false);
    for v in 0..INSERT_COUNT {
        seed_tx.insert_vertex(v).expect("insert");
    }
    seed_tx.commit().expect("commit");
    let mut rng = ChaCha8Rng::seed_from_u64(0xFEED_FACE);

    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function(BenchmarkId::new("point_lookup", LOOKUP_SAMPLES), |b| {
        b.iter(|| {
            let reader = lookup_store.start_transaction(true);
            for _ in 0..LOOKUP_SAMPLES {
                use rand::Rng;
                let key = rng.gen_range(0..INSERT_COUNT);
                black_box(reader.has_vertex(key));
            }
            reader.commit().expect("commit reader");
        });
    });

    group.finish();
}

criterion_group!(benches, micro_index);
criterion_main!(benches);
