//! Custom assertions for synchronizer tests

use crate::core_sync::CrdtSynchronizer;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert that every replica holds the same value for `crdt_id`
pub fn assert_converged(crdt_id: &str, replicas: &[&CrdtSynchronizer]) {
    let Some(first) = replicas.first() else {
        return;
    };
    let expected = first.value(crdt_id);
    for replica in &replicas[1..] {
        let actual = replica.value(crdt_id);
        if actual != expected {
            panic!(
                "Replica {} diverged on {}: {:?} vs {:?} at {}",
                replica.replica_id(),
                crdt_id,
                actual,
                expected,
                first.replica_id()
            );
        }
    }
}

/// Assert that two replicas hold bit-identical data for `crdt_id`
pub fn assert_same_data(crdt_id: &str, a: &CrdtSynchronizer, b: &CrdtSynchronizer) {
    let left = a.get(crdt_id).map(|s| &s.data);
    let right = b.get(crdt_id).map(|s| &s.data);
    if left != right {
        panic!(
            "Data of {} differs between {} and {}: {:?} vs {:?}",
            crdt_id,
            a.replica_id(),
            b.replica_id(),
            left,
            right
        );
    }
}
