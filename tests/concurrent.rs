use std::sync::{Arc, Barrier};
use std::thread;

use sombra_graphstore::Store;

const NUM_THREADS: usize = 8;
const VERTICES_PER_THREAD: usize = 250;

#[test]
fn concurrent_disjoint_vertex_inserts_all_land() {
    // Universal property 1: disjoint inserts from N threads, each in its
    // own committing transaction, all end up present and counted.
    let store = Store::new_store(false);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::new();

    for thread_id in 0..NUM_THREADS {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let _registration = store.register_thread();
            barrier.wait();
            for i in 0..VERTICES_PER_THREAD {
                let vertex = (thread_id * VERTICES_PER_THREAD + i) as u64;
                let mut tx = store.start_transaction(false);
                tx.insert_vertex(vertex).unwrap();
                tx.commit().unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let reader = store.start_transaction(true);
    assert_eq!(reader.num_vertices(), (NUM_THREADS * VERTICES_PER_THREAD) as u64);
    for v in 0..(NUM_THREADS * VERTICES_PER_THREAD) as u64 {
        assert!(reader.has_vertex(v), "vertex {v} missing after concurrent insert");
    }
    reader.commit().unwrap();
}

#[test]
fn concurrent_edge_inserts_between_shared_vertices() {
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut setup = store.start_transaction(false);
    for v in 0..64u64 {
        setup.insert_vertex(v).unwrap();
    }
    setup.commit().unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let _registration = store.register_thread();
            barrier.wait();
            for v in 0..16u64 {
                let source = worker * 16 + v;
                let dest = (source + 1) % 64;
                if source == dest {
                    continue;
                }
                loop {
                    let mut tx = store.start_transaction(false);
                    match tx.insert_edge(source, dest, source as f64) {
                        Ok(()) => {
                            tx.commit().unwrap();
                            break;
                        }
                        Err(sombra_graphstore::GraphError::Conflict(_)) => {
                            tx.rollback();
                            continue;
                        }
                        Err(e) => panic!("unexpected error: {e:?}"),
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let reader = store.start_transaction(true);
    for worker in 0..4u64 {
        for v in 0..16u64 {
            let source = worker * 16 + v;
            let dest = (source + 1) % 64;
            if source == dest {
                continue;
            }
            assert!(reader.has_edge(source, dest), "missing edge {source}->{dest}");
        }
    }
    reader.commit().unwrap();
}

#[test]
fn read_only_transaction_sees_a_stable_snapshot_during_concurrent_writes() {
    // Scenario (f), simplified to a single snapshot check: a reader's view
    // of a vertex's edges never includes writes committed after its read
    // timestamp, nor omits writes committed before it.
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut setup = store.start_transaction(false);
    setup.insert_vertex(10).unwrap();
    for v in 0..8u64 {
        setup.insert_vertex(100 + v).unwrap();
        setup.insert_edge(10, 100 + v, v as f64).unwrap();
    }
    setup.commit().unwrap();

    let reader = store.start_transaction(true);
    let mut seen_before = Vec::new();
    reader.scan_out(10, |dest, weight| {
        seen_before.push((dest, weight));
        true
    });

    let writer_store = store.clone();
    let writer = thread::spawn(move || {
        let _registration = writer_store.register_thread();
        let mut tx = writer_store.start_transaction(false);
        for v in 0..8u64 {
            tx.remove_edge(10, 100 + v).unwrap();
        }
        for v in 8..16u64 {
            tx.insert_vertex(100 + v).unwrap();
            tx.insert_edge(10, 100 + v, v as f64).unwrap();
        }
        tx.commit().unwrap();
    });
    writer.join().unwrap();

    let mut seen_after = Vec::new();
    reader.scan_out(10, |dest, weight| {
        seen_after.push((dest, weight));
        true
    });
    assert_eq!(seen_before, seen_after, "read-only snapshot must stay stable");
    reader.commit().unwrap();
}
