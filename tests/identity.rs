mod common;

use common::{gadget_table, sqlite_store, Gadget};
use tempus::TempusError;

#[tokio::test]
async fn new_id_returns_distinct_ids() {
    let (_dir, store) = sqlite_store().await;
    let table = gadget_table();
    table.create(&store, None).await.expect("create");

    let tx = store.begin().await.expect("begin");
    let id1 = table.new_id(&store, "allocator", &tx).await.expect("id1");
    let id2 = table.new_id(&store, "allocator", &tx).await.expect("id2");
    assert_ne!(id1, id2);
    store.commit(tx).await.expect("commit");
}

#[tokio::test]
async fn use_id_is_an_atomic_claim() {
    let (_dir, store) = sqlite_store().await;
    let mut table = gadget_table();
    table.create(&store, None).await.expect("create");

    let tx = store.begin().await.expect("begin");
    let id = table.new_id(&store, "A", &tx).await.expect("new_id");
    table.new.std.id = id;

    // wrong creator
    let err = table
        .use_id(&store, "B", &tx)
        .await
        .expect_err("claim by non-creator");
    assert!(matches!(err.root(), TempusError::IdNotClaimed));

    // creator claims once
    table.use_id(&store, "A", &tx).await.expect("claim");

    // and only once
    let err = table
        .use_id(&store, "A", &tx)
        .await
        .expect_err("second claim");
    assert!(matches!(err.root(), TempusError::IdNotClaimed));

    let row = table
        .read_id(&store, id, Some(&tx))
        .await
        .expect("read_id")
        .expect("identity row");
    assert_eq!(row.created_by, "A");
    assert_eq!(row.used_by, "A");
    assert!(!row.created.is_empty());

    store.commit(tx).await.expect("commit");
}

#[tokio::test]
async fn an_unused_identity_keeps_a_null_used_by() {
    let (_dir, store) = sqlite_store().await;
    let table = gadget_table();
    table.create(&store, None).await.expect("create");

    let tx = store.begin().await.expect("begin");
    let id = table.new_id(&store, "A", &tx).await.expect("new_id");
    let row = table
        .read_id(&store, id, Some(&tx))
        .await
        .expect("read_id")
        .expect("identity row");
    assert_eq!(row.used_by, "");
    store.commit(tx).await.expect("commit");
}

#[tokio::test]
async fn start_consumes_the_identity() {
    let (_dir, store) = sqlite_store().await;
    let mut table = gadget_table();
    table.create(&store, None).await.expect("create");

    let tx = store.begin().await.expect("begin");
    let id = table.new_id(&store, "starter", &tx).await.expect("new_id");

    table.new.idv = Some(Gadget::new("", "0815", 42));
    table
        .start(&store, id, "now", "starter", &tx)
        .await
        .expect("start");

    let row = table
        .read_id(&store, id, Some(&tx))
        .await
        .expect("read_id")
        .expect("identity row");
    assert_eq!(row.used_by, "starter");

    // a second first-version under the same identity is refused
    table.new.idv = Some(Gadget::new("", "4711", 43));
    let err = table
        .start(&store, id, "2999-01-01 00:00:00.000", "starter", &tx)
        .await
        .expect_err("identity already used");
    assert!(matches!(err.root(), TempusError::IdNotClaimed));

    store.commit(tx).await.expect("commit");
}
