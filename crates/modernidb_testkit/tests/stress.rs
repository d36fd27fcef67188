//! Several threads sharing one client.

use modernidb::{TransactionMode, TransactionOptions};
use modernidb_testkit::prelude::*;

#[test]
fn concurrent_puts_keep_every_successful_write() {
    init_tracing();
    let factory = TestFactory::memory();
    let db = open_catalog(&factory);
    let config = StressConfig {
        operations: 50,
        threads: 4,
    };
    let result = stress_concurrent_puts(&db, &config);
    assert_eq!(result.total_ops, 200);
    assert!(result.successful_ops > 0);

    let (items, _done) = db
        .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
        .unwrap();
    assert_eq!(items.count(None).unwrap(), result.successful_ops as u64);
}

#[test]
fn concurrent_reads_all_see_the_record() {
    let (_factory, db) = scenarios::populated_catalog(5);
    let result = stress_concurrent_reads(&db, "item-002", &StressConfig::default());
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, 800);
}

#[test]
fn events_are_seen_once_per_commit() {
    let factory = TestFactory::memory();
    let db = open_catalog(&factory);
    let writes = db.subscribe_channel(TransactionMode::ReadWrite);
    let result = stress_concurrent_puts(
        &db,
        &StressConfig {
            operations: 20,
            threads: 3,
        },
    );
    let events = writes.try_iter().count();
    assert!(events >= result.successful_ops);
    assert!(events <= result.total_ops);
}
