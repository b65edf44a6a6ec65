mod support;

use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use tokio::{io::AsyncWriteExt, sync::mpsc};

use pgswitch::{config::PoolerMode, gateway::BackendLink, intercept::Forwarder};

const ROUTING: &str = r#"
    [routing]
    enabled = true

    [[routing.rules]]
    pattern = "tableb"
    dbkey = "dev.2"
"#;

// ----- Frames ----------------------------------------------------------------

fn parse(statement: &str, query: &str) -> BytesMut {
    let mut body = BytesMut::new();
    body.extend_from_slice(statement.as_bytes());
    body.put_u8(0);
    body.extend_from_slice(query.as_bytes());
    body.put_u8(0);
    body.put_i16(0);
    support::message(b'P', &body)
}

fn bind(statement: &str) -> BytesMut {
    let mut body = BytesMut::new();
    body.put_u8(0); // unnamed portal
    body.extend_from_slice(statement.as_bytes());
    body.put_u8(0);
    body.put_i16(0);
    body.put_i16(0);
    body.put_i16(0);
    support::message(b'B', &body)
}

fn execute() -> BytesMut {
    let mut body = BytesMut::new();
    body.put_u8(0);
    body.put_i32(0);
    support::message(b'E', &body)
}

fn sync() -> BytesMut {
    support::message(b'S', &[])
}

fn batch(units: impl IntoIterator<Item = BytesMut>) -> BytesMut {
    let mut out = BytesMut::new();
    for unit in units {
        out.extend_from_slice(&unit);
    }
    out
}

// ----- Link ------------------------------------------------------------------

#[tokio::test]
async fn unsynced_extended_units_pin_the_backend() {
    let (_backends, pools) = support::pools(&["dev.1", "dev.2"]).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut link = BackendLink::new(Arc::clone(&pools), PoolerMode::Transaction, tx);

    for unit in [parse("", "select 1"), bind(""), execute()] {
        link.forward("bob", "dev.1", unit).await.unwrap();
    }

    assert_eq!(link.pinned_pool().await.unwrap().as_deref(), Some("dev.1"));
    assert_eq!(support::idle_in(&pools, "dev.1"), 0);
}

#[tokio::test]
async fn leaving_an_unsynced_backend_closes_it() {
    let (_backends, pools) = support::pools(&["dev.1", "dev.2"]).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut link = BackendLink::new(Arc::clone(&pools), PoolerMode::Transaction, tx);

    for unit in [parse("", "select 1"), bind(""), execute()] {
        link.forward("bob", "dev.1", unit).await.unwrap();
    }
    link.forward("bob", "dev.2", support::simple_query("select 2"))
        .await
        .unwrap();
    link.settle().await.unwrap();

    // the half-finished exchange never goes back to the idle list
    assert_eq!(support::idle_in(&pools, "dev.1"), 0);
    assert_eq!(support::idle_in(&pools, "dev.2"), 1);
}

#[tokio::test]
async fn sync_releases_the_backend_in_transaction_mode() {
    let (_backends, pools) = support::pools(&["dev.1"]).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut link = BackendLink::new(Arc::clone(&pools), PoolerMode::Transaction, tx);

    for unit in [parse("", "select 1"), bind(""), execute(), sync()] {
        link.forward("bob", "dev.1", unit).await.unwrap();
    }

    assert_eq!(link.pinned_pool().await.unwrap(), None);
    assert!(!link.is_leased());
    assert_eq!(support::idle_in(&pools, "dev.1"), 1);

    let mut relayed = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        relayed.extend_from_slice(&bytes);
    }
    assert_eq!(relayed.last(), Some(&b'I'));
}

// ----- End to end ------------------------------------------------------------

#[tokio::test]
async fn prepared_statements_are_routed() {
    let proxy = support::Proxy::start(&["dev.1", "dev.2"], ROUTING).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let rows = client.query("select * from tablea", &[]).await.unwrap();
    assert_eq!(rows[0].get::<_, &str>(0), "dev.1");

    let rows = client.query("select * from tableb", &[]).await.unwrap();
    assert_eq!(rows[0].get::<_, &str>(0), "dev.2");
    assert_eq!(rows[0].get::<_, &str>(1), "select * from tableb");

    // the session stays where the last verdict put it
    let (dbkey, _) = support::answered_by(&client, "select * from tablea").await;
    assert_eq!(dbkey, "dev.2");

    assert_eq!(proxy.backend("dev.1").received(), vec!["select * from tablea"]);
}

#[tokio::test]
async fn switch_is_refused_before_sync() {
    let proxy = support::Proxy::start(&["dev.1", "dev.2"], ROUTING).await;
    let mut stream = support::raw_session(&proxy, "bob", "opensesame", "dev.1").await;

    let pipelined = batch([
        parse("", "select * from tablea"),
        bind(""),
        execute(),
        parse("", "select * from tableb"),
        bind(""),
        execute(),
        sync(),
    ]);
    stream.write_all(&pipelined).await.unwrap();

    let mut buf = BytesMut::new();
    let tags = support::read_until_ready(&mut stream, &mut buf, b'Z').await;
    assert_eq!(tags, b"12DC12DCZ".to_vec());

    assert_eq!(
        proxy.backend("dev.1").received(),
        vec!["select * from tablea", "select * from tableb"]
    );
    assert!(proxy.backend("dev.2").received().is_empty());

    // once synced, the next statement may move
    let tail = batch([parse("", "select * from tableb"), bind(""), execute(), sync()]);
    stream.write_all(&tail).await.unwrap();
    let tags = support::read_until_ready(&mut stream, &mut buf, b'Z').await;
    assert_eq!(tags, b"12DCZ".to_vec());
    assert_eq!(proxy.backend("dev.2").received(), vec!["select * from tableb"]);
}
