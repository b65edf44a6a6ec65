mod support;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;

const REWRITE: &str = r#"
    [rewrite]
    enabled = true

    [[rewrite.rules]]
    pattern = "\\blegacy_orders\\b"
    replacement = "orders_v2"

    [[rewrite.rules]]
    pattern = "/\\*.*?\\*/ ?"
    replacement = ""
    users = ["bob"]
"#;

#[tokio::test]
async fn statements_are_rewritten_before_forwarding() {
    let proxy = support::Proxy::start(&["dev.1"], REWRITE).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let (_, query) = support::answered_by(&client, "select * from legacy_orders").await;
    assert_eq!(query, "select * from orders_v2");

    let (_, query) = support::answered_by(&client, "select 1").await;
    assert_eq!(query, "select 1");
}

#[tokio::test]
async fn rewrite_rules_follow_user_scope() {
    let proxy = support::Proxy::start(&["dev.1"], REWRITE).await;

    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();
    let (_, query) = support::answered_by(&client, "/* trace */ select 1").await;
    assert_eq!(query, "/* trace */ select 1");

    let client = proxy.connect("bob", "opensesame", "dev.1").await.unwrap();
    let (_, query) = support::answered_by(&client, "/* trace */ select 1").await;
    assert_eq!(query, "select 1");
}

#[tokio::test]
async fn routing_sees_the_original_text_and_rewrite_still_applies() {
    let extra = format!(
        r#"
        [routing]
        enabled = true
        [[routing.rules]]
        pattern = "legacy_orders"
        dbkey = "dev.2"
        {REWRITE}
        "#
    );

    let proxy = support::Proxy::start(&["dev.1", "dev.2"], &extra).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let (dbkey, query) = support::answered_by(&client, "select * from legacy_orders").await;
    assert_eq!(dbkey, "dev.2");
    assert_eq!(query, "select * from orders_v2");
}

#[tokio::test]
async fn oversized_statement_passes_through_unmodified() {
    let extra = format!("[intercept]\nbuffer_capacity = 64\n{REWRITE}");
    let proxy = support::Proxy::start(&["dev.1"], &extra).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let long = format!("select * from legacy_orders where note = '{}'", "x".repeat(80));
    let (_, query) = support::answered_by(&client, &long).await;
    assert_eq!(query, long);

    // the session keeps working afterwards
    let (_, query) = support::answered_by(&client, "select * from legacy_orders").await;
    assert_eq!(query, "select * from orders_v2");
}

#[tokio::test]
async fn oversized_statement_disconnects_under_disconnect_policy() {
    let extra = format!(
        "[intercept]\nbuffer_capacity = 64\nfailure_policy = \"disconnect\"\n{REWRITE}"
    );
    let proxy = support::Proxy::start(&["dev.1"], &extra).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let (_, query) = support::answered_by(&client, "select * from legacy_orders").await;
    assert_eq!(query, "select * from orders_v2");

    let long = format!("select '{}'", "x".repeat(80));
    assert!(client.simple_query(&long).await.is_err());
    assert_eq!(proxy.backend("dev.1").received(), vec!["select * from orders_v2"]);
}

#[tokio::test]
async fn statements_ahead_of_an_oversized_one_still_run() {
    let extra = format!(
        "[intercept]\nbuffer_capacity = 64\nfailure_policy = \"disconnect\"\n{REWRITE}"
    );
    let proxy = support::Proxy::start(&["dev.1"], &extra).await;
    let mut stream = support::raw_session(&proxy, "alice", "hunter2", "dev.1").await;

    let long = format!("select '{}'", "x".repeat(80));
    let mut pipelined = support::simple_query("select * from legacy_orders");
    pipelined.extend_from_slice(&support::simple_query(&long));
    stream.write_all(&pipelined).await.unwrap();

    let mut buf = BytesMut::new();
    let tags = support::read_until_ready(&mut stream, &mut buf, b'Z').await;
    assert_eq!(tags, b"TDCZ".to_vec());

    // then the FATAL error and the close
    let tags = support::read_until_ready(&mut stream, &mut buf, b'Z').await;
    assert_eq!(tags, vec![b'E']);

    assert_eq!(proxy.backend("dev.1").received(), vec!["select * from orders_v2"]);
}

#[tokio::test]
async fn rewrite_that_outgrows_the_buffer_is_not_applied() {
    let extra = r#"
        [intercept]
        buffer_capacity = 40

        [rewrite]
        enabled = true
        [[rewrite.rules]]
        pattern = "t"
        replacement = "a_much_longer_table_name"
    "#;

    let proxy = support::Proxy::start(&["dev.1"], extra).await;
    let client = proxy.connect("alice", "hunter2", "dev.1").await.unwrap();

    let (_, query) = support::answered_by(&client, "select * from t").await;
    assert_eq!(query, "select * from t");
}
