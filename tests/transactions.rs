use sombra_graphstore::{LogicalError, Store};

#[test]
fn insert_vertices_then_query_presence_and_counts() {
    // Scenario (a): insert 10, 20, 30 into an empty store, commit, then
    // observe presence/absence and the aggregate counts from a fresh
    // transaction.
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut tx = store.start_transaction(false);
    tx.insert_vertex(10).unwrap();
    tx.insert_vertex(20).unwrap();
    tx.insert_vertex(30).unwrap();
    tx.commit().unwrap();

    let reader = store.start_transaction(true);
    for v in [10, 20, 30] {
        assert!(reader.has_vertex(v), "vertex {v} should be present");
    }
    assert!(!reader.has_vertex(40));
    assert_eq!(reader.num_vertices(), 3);
    assert_eq!(reader.num_edges(), 0);
    reader.commit().unwrap();
}

#[test]
fn insert_edge_is_symmetric_and_rejects_duplicates() {
    // Scenario (b).
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut tx = store.start_transaction(false);
    tx.insert_vertex(10).unwrap();
    tx.insert_vertex(20).unwrap();
    tx.insert_edge(10, 20, 1020.0).unwrap();
    tx.commit().unwrap();

    let mut second = store.start_transaction(false);
    assert!(second.has_edge(10, 20));
    assert!(second.has_edge(20, 10));
    assert_eq!(second.get_weight(10, 20), Some(1020.0));
    assert_eq!(second.get_weight(20, 10), Some(1020.0));

    let err = second.insert_edge(10, 20, 7.0).unwrap_err();
    assert!(matches!(
        err,
        sombra_graphstore::GraphError::Logical(LogicalError::EdgeAlreadyExists(10, 20))
    ));
    second.rollback();
}

#[test]
fn concurrent_writers_on_same_vertex_conflict() {
    // Scenario (c): an earlier-started transaction A and a later B both try
    // to insert the same vertex while A is still open; B must see
    // TransactionConflict.
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut a = store.start_transaction(false);
    a.insert_vertex(5).unwrap();

    let mut b = store.start_transaction(false);
    let err = b.insert_vertex(5).unwrap_err();
    assert!(matches!(err, sombra_graphstore::GraphError::Conflict(_)));
    b.rollback();

    a.commit().unwrap();
}

#[test]
fn insert_then_remove_same_edge_leaves_store_unchanged() {
    // Universal property 3.
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut setup = store.start_transaction(false);
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.commit().unwrap();

    let before = {
        let r = store.start_transaction(true);
        let counts = (r.num_vertices(), r.num_edges());
        r.commit().unwrap();
        counts
    };

    let mut tx = store.start_transaction(false);
    tx.insert_edge(1, 2, 3.0).unwrap();
    tx.remove_edge(1, 2).unwrap();
    tx.commit().unwrap();

    let after = store.start_transaction(true);
    assert_eq!((after.num_vertices(), after.num_edges()), before);
    assert!(!after.has_edge(1, 2));
    after.commit().unwrap();
}

#[test]
fn rollback_restores_pre_transaction_state() {
    // Universal property 7.
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut base = store.start_transaction(false);
    base.insert_vertex(1).unwrap();
    base.insert_vertex(2).unwrap();
    base.insert_edge(1, 2, 9.5).unwrap();
    base.commit().unwrap();

    let mut tx = store.start_transaction(false);
    tx.insert_vertex(3).unwrap();
    tx.insert_edge(1, 3, 1.0).unwrap();
    tx.remove_edge(1, 2).unwrap();
    tx.rollback();

    let reader = store.start_transaction(true);
    assert!(!reader.has_vertex(3));
    assert!(reader.has_edge(1, 2));
    assert_eq!(reader.get_weight(1, 2), Some(9.5));
    assert!(!reader.has_edge(1, 3));
    reader.commit().unwrap();
}

#[test]
fn removing_a_vertex_removes_its_incident_edges() {
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    let mut tx = store.start_transaction(false);
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.insert_vertex(3).unwrap();
    tx.insert_edge(1, 2, 1.0).unwrap();
    tx.insert_edge(1, 3, 2.0).unwrap();
    tx.commit().unwrap();

    let mut tx = store.start_transaction(false);
    tx.remove_vertex(1).unwrap();
    tx.commit().unwrap();

    let reader = store.start_transaction(true);
    assert!(!reader.has_vertex(1));
    assert!(!reader.has_edge(2, 1));
    assert!(!reader.has_edge(3, 1));
    assert!(reader.has_vertex(2));
    assert!(reader.has_vertex(3));
    reader.commit().unwrap();
}

#[test]
fn dropping_an_unfinished_transaction_rolls_back() {
    let store = Store::new_store(false);
    let _thread = store.register_thread();

    {
        let mut tx = store.start_transaction(false);
        tx.insert_vertex(42).unwrap();
        // Dropped without commit/rollback.
    }

    let reader = store.start_transaction(true);
    assert!(!reader.has_vertex(42));
    reader.commit().unwrap();
}

#[test]
fn reserved_vertex_id_is_rejected() {
    let store = Store::new_store(false);
    let _thread = store.register_thread();
    let mut tx = store.start_transaction(false);
    let err = tx.insert_vertex(u64::MAX).unwrap_err();
    assert!(matches!(
        err,
        sombra_graphstore::GraphError::Logical(LogicalError::ReservedVertexId(_))
    ));
    tx.rollback();
}
