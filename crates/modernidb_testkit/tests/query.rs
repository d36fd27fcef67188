//! The query layer over a shared factory.

use modernidb::{
    AsyncOp, DatabaseQueryOpFailure, InaccessibleDatabaseError, ModernIdb, QueryClient,
    TransactionMode, TransactionOptions,
};
use modernidb_testkit::prelude::*;

fn prices(db: &ModernIdb) -> modernidb::Result<Vec<u32>> {
    let (items, _done) = db.transaction::<Item>(
        "items",
        TransactionMode::ReadOnly,
        TransactionOptions::default(),
    )?;
    Ok(items.get_all(None, None)?.into_iter().map(|item| item.price).collect())
}

#[test]
fn cached_queries_refresh_after_writes() {
    let factory = TestFactory::memory();
    let client = QueryClient::connect(catalog_db(&factory));
    assert!(client.open_request().is_success());

    assert_eq!(client.query(Some("prices"), prices), AsyncOp::Success(vec![]));
    client
        .db()
        .put_to_store("items", &Item::new("a", "tools", 7), None)
        .unwrap();
    assert_eq!(client.query(Some("prices"), prices), AsyncOp::Success(vec![7]));

    // Reads do not invalidate.
    client.db().get_from_store::<Item>("items", "a").unwrap();
    assert_eq!(client.cached::<Vec<u32>>("prices"), Some(AsyncOp::Success(vec![7])));
}

#[test]
fn other_clients_upgrading_close_the_query_client() {
    let factory = TestFactory::memory();
    let client = QueryClient::connect(catalog_db(&factory));
    let newer = modernidb::ModernIdb::builder(&factory, CATALOG)
        .version(2)
        .build()
        .unwrap();
    newer.open().unwrap();

    let op = client.query(Some("prices"), prices);
    assert_eq!(
        op,
        AsyncOp::Failure(DatabaseQueryOpFailure::Inaccessible(
            InaccessibleDatabaseError::ClosedForUpgrade
        ))
    );
    let json = serde_json::to_value(op.failure()).unwrap();
    assert_eq!(json, serde_json::json!({"type": "CLOSED_FOR_UPGRADE"}));
}
