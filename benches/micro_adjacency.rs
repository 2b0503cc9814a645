use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sombra_graphstore::Store;

const VERTEX_COUNT: usize = 4_096;
const EDGE_COUNT: usize = 32_768;

fn micro_adjacency(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/adjacency");
    group.sample_size(40);
    group.throughput(Throughput::Elements(1));

    let harness = GraphHarness::new(VERTEX_COUNT, EDGE_COUNT);
    let mut cursor = 0usize;
    group.bench_with_input(BenchmarkId::new("scan_out", VERTEX_COUNT), &VERTEX_COUNT, |b, _| {
        b.iter(|| {
            let vertex = harness.vertices[cursor % harness.vertices.len()];
            cursor += 1;
            black_box(harness.degree(vertex))
        });
    });
    group.finish();
}

struct GraphHarness {
    store: std::sync::Arc<Store>,
    _thread: sombra_graphstore::ThreadHandle,
    vertices: Vec<u64>,
}

impl GraphHarness {
    fn new(vertex_count: usize, edge_count: usize) -> Self {
        let store = Store::new_store(false);
        let thread = store.register_thread();
        let mut vertices = Vec::with_capacity(vertex_count);

        let mut tx = store.start_transaction(false);
        for v in 0..vertex_count as u64 {
            tx.insert_vertex(v).expect("insert vertex");
            vertices.push(v);
        }
        tx.commit().expect("commit vertices");

        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut tx = store.start_transaction(false);
        for _ in 0..edge_count {
            let src = vertices[rng.gen_range(0..vertices.len())];
            let dst = vertices[rng.gen_range(0..vertices.len())];
            if src == dst {
                continue;
            }
            let _ = tx.insert_edge(src, dst, 1.0);
        }
        tx.commit().expect("commit edges");

        GraphHarness { store, _thread: thread, vertices }
    }

    fn degree(&self, vertex: u64) -> u64 {
        let reader = self.store.start_transaction(true);
        let d = reader.degree(vertex);
        reader.commit().expect("commit reader");
        d
    }
}

criterion_group!(benches, micro_adjacency);
criterion_main!(benches);
