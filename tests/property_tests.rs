use std::collections::BTreeSet;

use proptest::prelude::*;
use sombra_graphstore::Store;

#[derive(Debug, Clone)]
enum Op {
    InsertVertex(u64),
    RemoveVertex(u64),
}

fn op_strategy(universe: u64) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..universe).prop_map(Op::InsertVertex),
        (0..universe).prop_map(Op::RemoveVertex),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Universal property 1, single-threaded: replaying any sequence of
    /// insert/remove vertex ops against a model `BTreeSet` and against the
    /// store (skipping ops that the model says would be a logical error)
    /// keeps both in agreement, and a fresh transaction's `num_vertices`
    /// matches the model's cardinality.
    #[test]
    fn vertex_presence_matches_model(ops in proptest::collection::vec(op_strategy(64), 1..200)) {
        let store = Store::new_store(false);
        let _thread = store.register_thread();
        let mut model: BTreeSet<u64> = BTreeSet::new();

        for op in ops {
            match op {
                Op::InsertVertex(v) => {
                    let mut tx = store.start_transaction(false);
                    let result = tx.insert_vertex(v);
                    if model.insert(v) {
                        prop_assert!(result.is_ok());
                        tx.commit().unwrap();
                    } else {
                        prop_assert!(result.is_err());
                        tx.rollback();
                    }
                }
                Op::RemoveVertex(v) => {
                    let mut tx = store.start_transaction(false);
                    let result = tx.remove_vertex(v);
                    if model.remove(&v) {
                        prop_assert!(result.is_ok());
                        tx.commit().unwrap();
                    } else {
                        prop_assert!(result.is_err());
                        tx.rollback();
                    }
                }
            }
        }

        let reader = store.start_transaction(true);
        prop_assert_eq!(reader.num_vertices(), model.len() as u64);
        for v in 0..64u64 {
            prop_assert_eq!(reader.has_vertex(v), model.contains(&v));
        }
        reader.commit().unwrap();
    }

    /// A same-transaction insert immediately followed by a remove of the
    /// same edge always collapses back to "absent", regardless of the
    /// weight used.
    #[test]
    fn self_reverting_edge_write_is_a_no_op(weight in any::<f64>().prop_filter("finite", |w| w.is_finite())) {
        let store = Store::new_store(false);
        let _thread = store.register_thread();

        let mut setup = store.start_transaction(false);
        setup.insert_vertex(1).unwrap();
        setup.insert_vertex(2).unwrap();
        setup.commit().unwrap();

        let mut tx = store.start_transaction(false);
        tx.insert_edge(1, 2, weight).unwrap();
        tx.remove_edge(1, 2).unwrap();
        tx.commit().unwrap();

        let reader = store.start_transaction(true);
        prop_assert!(!reader.has_edge(1, 2));
        reader.commit().unwrap();
    }
}
