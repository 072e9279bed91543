//! Presence broadcasts over real sockets

use pretty_assertions::assert_eq;
use serde_json::json;

use convo_server::config::PresenceMode;

use crate::common::TestApp;

#[tokio::test]
async fn test_online_and_offline_are_broadcast() {
    let app = TestApp::spawn().await;
    let mut watcher = app.connect(9).await;
    assert_eq!(
        watcher.recv_type("status").await,
        json!({"type": "status", "user_id": 9, "status": "online"})
    );

    let a = app.connect(1).await;
    assert_eq!(
        watcher.recv_type("status").await,
        json!({"type": "status", "user_id": 1, "status": "online"})
    );

    app.disconnect(a).await;
    assert_eq!(
        watcher.recv_type("status").await,
        json!({"type": "status", "user_id": 1, "status": "offline"})
    );
}

#[tokio::test]
async fn test_per_user_mode_ignores_additional_devices() {
    let app = TestApp::spawn().await;
    let mut watcher = app.connect(9).await;
    watcher.recv_type("status").await;

    let phone = app.connect(1).await;
    watcher.recv_type("status").await;
    let laptop = app.connect(1).await;
    app.disconnect(laptop).await;

    watcher.expect_no("status").await;

    app.disconnect(phone).await;
    assert_eq!(watcher.recv_type("status").await["status"], "offline");
}

#[tokio::test]
async fn test_per_connection_mode_announces_every_device() {
    let app = TestApp::spawn_with(|settings| settings.presence.mode = PresenceMode::PerConnection)
        .await;
    let mut watcher = app.connect(9).await;
    watcher.recv_type("status").await;

    let phone = app.connect(1).await;
    let laptop = app.connect(1).await;
    app.disconnect(laptop).await;
    app.disconnect(phone).await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let event = watcher.recv_type("status").await;
        assert_eq!(event["user_id"], 1);
        statuses.push(event["status"].as_str().unwrap().to_string());
    }
    assert_eq!(statuses, vec!["online", "online", "offline", "offline"]);
}
