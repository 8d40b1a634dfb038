//! Worker admission and graceful shutdown.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod common;

use common::{get, read_file, read_response, start, Site};

#[tokio::test]
async fn queued_connection_waits_for_a_free_slot() {
    let site = Site::new();
    let mut config = site.config();
    config.scheduler.max_workers = 1;
    let running = start(config).await;

    let first = running.connect().await;
    // Give the accept loop time to admit the first connection.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut second = running.connect().await;
    second.write_all(get("/public.html").as_bytes()).await.unwrap();
    let waiting = tokio::time::timeout(Duration::from_millis(300), read_response(&mut second, false)).await;
    assert!(waiting.is_err(), "second connection was served while the only slot was taken");

    drop(first);
    let response = tokio::time::timeout(Duration::from_secs(5), read_response(&mut second, false))
        .await
        .expect("queued connection was never started");
    assert_eq!(response.text(), "public");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_joins_open_connections() {
    let site = Site::new();
    let running = start(site.config()).await;

    let mut open = running.connect().await;
    open.write_all(get("/public.html").as_bytes()).await.unwrap();
    assert_eq!(read_response(&mut open, false).await.status(), 200);

    running.stop().await.unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), open.read_to_end(&mut rest))
        .await
        .expect("connection still open after shutdown")
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn shutdown_persists_rules_and_credentials() {
    let site = Site::new();
    let running = start(site.config()).await;
    running.stop().await.unwrap();

    let rules: serde_json::Value = serde_json::from_str(&read_file(&site.path("rules.json"))).unwrap();
    assert_eq!(rules["Database"], "users.keys");
    assert_eq!(rules["Handler"]["login.html"], "login.sh");
    assert_eq!(rules["Exception"][0]["Username"], "alice");

    assert_eq!(
        read_file(&site.path("users.keys")),
        "alice\nwonderland\nbob\nbuilder\n"
    );
}

#[tokio::test]
async fn missing_rule_file_is_generated() {
    let site = Site::new();
    std::fs::remove_file(site.path("rules.json")).unwrap();
    let running = start(site.config()).await;

    let rules: serde_json::Value = serde_json::from_str(&read_file(&site.path("rules.json"))).unwrap();
    assert_eq!(rules["Allow"], serde_json::json!(["*"]));

    // Everything under the root is allowed by the generated rules.
    let response = common::exchange(&running, &get("/secret.html")).await;
    assert_eq!(response.status(), 200);

    running.stop().await.unwrap();
}
