//! End-to-end envelope dispatch over real sockets

use pretty_assertions::assert_eq;
use serde_json::json;

use convo_server::domain::{MessageRepository, MessageStatus};

use crate::common::TestApp;

#[tokio::test]
async fn test_text_reaches_both_members_then_read_marks_it() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let mut b = app.connect(2).await;

    a.send_json(json!({"type": "text", "chat_id": chat_id, "content": "hi"}))
        .await;

    for client in [&mut a, &mut b] {
        let event = client.recv_type("text").await;
        assert_eq!(event["chat_id"], chat_id);
        assert_eq!(event["sender_id"], 1);
        assert_eq!(event["content"], "hi");
        assert_eq!(event["status"], "sent");
        assert!(event["message_id"].as_i64().unwrap() > 0);
    }

    b.send_json(json!({"type": "read", "chat_id": chat_id})).await;

    let expected = json!({"type": "read", "chat_id": chat_id, "user_id": 2});
    assert_eq!(a.recv_type("read").await, expected);
    assert_eq!(b.recv_type("read").await, expected);

    let stored = app.store.find_by_chat(chat_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn test_every_device_of_a_member_receives_the_message() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let mut b_phone = app.connect(2).await;
    let mut b_laptop = app.connect(2).await;

    a.send_json(json!({"type": "media", "chat_id": chat_id, "content": "Sent a image", "media_url": "/uploads/cat.png"}))
        .await;

    for client in [&mut b_phone, &mut b_laptop] {
        let event = client.recv_type("media").await;
        assert_eq!(event["media_url"], "/uploads/cat.png");
    }
    assert_eq!(app.store.message_count(), 1);
}

#[tokio::test]
async fn test_typing_skips_every_connection_of_the_sender() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let mut a_other = app.connect(1).await;
    let mut b = app.connect(2).await;

    a.send_json(json!({"type": "typing", "chat_id": chat_id, "is_typing": true}))
        .await;

    assert_eq!(
        b.recv_type("typing").await,
        json!({"type": "typing", "chat_id": chat_id, "user_id": 1, "is_typing": true})
    );
    a.expect_no("typing").await;
    a_other.expect_no("typing").await;
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_call_signaling_is_unicast() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2, 3]);
    let mut a = app.connect(1).await;
    let mut b = app.connect(2).await;
    let mut c = app.connect(3).await;

    a.send_json(json!({
        "type": "ice-candidate",
        "recipient_id": 2,
        "chat_id": chat_id,
        "data": {"candidate": "candidate:1 1 UDP 2122252543 10.0.0.1 54400 typ host"}
    }))
    .await;

    let event = b.recv_type("ice-candidate").await;
    assert_eq!(event["sender_id"], 1);
    assert_eq!(
        event["data"]["candidate"],
        "candidate:1 1 UDP 2122252543 10.0.0.1 54400 typ host"
    );
    c.expect_no("ice-candidate").await;
    a.expect_no("ice-candidate").await;
}

#[tokio::test]
async fn test_malformed_frame_is_echoed_and_connection_survives() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1]);
    let mut a = app.connect(1).await;
    a.recv_type("status").await;

    a.send_text("hello server").await;
    assert_eq!(a.recv_text().await.as_deref(), Some("Echo: hello server"));

    a.send_json(json!({"chat_id": chat_id, "content": "still here"}))
        .await;
    let event = a.recv_type("text").await;
    assert_eq!(event["content"], "still here");
}

#[tokio::test]
async fn test_invalid_envelopes_have_no_effect() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let mut b = app.connect(2).await;

    a.send_json(json!({"type": "text", "chat_id": chat_id})).await;
    a.send_json(json!({"type": "text", "content": "no chat"})).await;
    a.send_json(json!({"type": "call-offer", "data": {}})).await;
    a.send_json(json!({"type": "sticker", "chat_id": chat_id})).await;

    b.expect_no("text").await;
    b.expect_no("call-offer").await;
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_non_member_cannot_post() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[2, 3]);
    let mut outsider = app.connect(1).await;
    let mut b = app.connect(2).await;

    outsider
        .send_json(json!({"type": "text", "chat_id": chat_id, "content": "let me in"}))
        .await;

    b.expect_no("text").await;
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_non_member_can_post_when_enforcement_disabled() {
    let app = TestApp::spawn_with(|settings| settings.dispatch.enforce_membership = false).await;
    let chat_id = app.store.create_chat(&[2]);
    let mut outsider = app.connect(1).await;
    let mut b = app.connect(2).await;

    outsider
        .send_json(json!({"type": "text", "chat_id": chat_id, "content": "hello"}))
        .await;

    assert_eq!(b.recv_type("text").await["sender_id"], 1);
}

#[tokio::test]
async fn test_disconnected_member_misses_later_messages() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let b = app.connect(2).await;
    app.disconnect(b).await;

    a.send_json(json!({"type": "text", "chat_id": chat_id, "content": "anyone?"}))
        .await;

    assert_eq!(a.recv_type("text").await["content"], "anyone?");
    assert_eq!(app.store.message_count(), 1);
    assert!(!app.gateway.registry().is_online(2));
}

#[tokio::test]
async fn test_storage_outage_drops_frame_without_closing() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1]);
    let mut a = app.connect(1).await;

    app.store.set_unavailable(true);
    a.send_json(json!({"type": "text", "chat_id": chat_id, "content": "lost"}))
        .await;
    a.expect_no("text").await;

    app.store.set_unavailable(false);
    a.send_json(json!({"type": "text", "chat_id": chat_id, "content": "back"}))
        .await;
    assert_eq!(a.recv_type("text").await["content"], "back");
    assert_eq!(app.gateway.connection_count(), 1);
}

#[tokio::test]
async fn test_remaining_device_keeps_working_after_another_closes() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a_phone = app.connect(1).await;
    let a_laptop = app.connect(1).await;
    let mut b = app.connect(2).await;

    app.disconnect(a_laptop).await;
    assert!(app.gateway.registry().is_online(1));

    a_phone
        .send_json(json!({"type": "text", "chat_id": chat_id, "content": "still here"}))
        .await;
    for client in [&mut a_phone, &mut b] {
        assert_eq!(client.recv_type("text").await["content"], "still here");
    }

    b.send_json(json!({"type": "text", "chat_id": chat_id, "content": "welcome back"}))
        .await;
    assert_eq!(a_phone.recv_type("text").await["content"], "welcome back");
}

#[tokio::test]
async fn test_frames_from_one_connection_arrive_in_order() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2]);
    let mut a = app.connect(1).await;
    let mut b = app.connect(2).await;

    for n in 0..10 {
        a.send_json(json!({"type": "text", "chat_id": chat_id, "content": format!("m{}", n)}))
            .await;
    }

    let mut last_id = 0;
    for n in 0..10 {
        let event = b.recv_type("text").await;
        assert_eq!(event["content"], format!("m{}", n));
        let message_id = event["message_id"].as_i64().unwrap();
        assert!(message_id > last_id);
        last_id = message_id;
    }
}

#[tokio::test]
async fn test_concurrent_senders_reach_every_member() {
    let app = TestApp::spawn().await;
    let chat_id = app.store.create_chat(&[1, 2, 3]);
    let mut a = app.connect(1).await;
    let mut b = app.connect(2).await;
    let mut c = app.connect(3).await;

    tokio::join!(
        async {
            for n in 0..5 {
                a.send_json(json!({"type": "text", "chat_id": chat_id, "content": format!("a{}", n)}))
                    .await;
            }
        },
        async {
            for n in 0..5 {
                b.send_json(json!({"type": "text", "chat_id": chat_id, "content": format!("b{}", n)}))
                    .await;
            }
        },
    );

    let mut expected: Vec<String> = (0..5)
        .flat_map(|n| [format!("a{}", n), format!("b{}", n)])
        .collect();
    expected.sort();

    for client in [&mut a, &mut b, &mut c] {
        let mut contents = Vec::new();
        for _ in 0..10 {
            let event = client.recv_type("text").await;
            contents.push(event["content"].as_str().unwrap().to_string());
        }
        contents.sort();
        assert_eq!(contents, expected);
    }
    assert_eq!(app.store.message_count(), 10);
}
