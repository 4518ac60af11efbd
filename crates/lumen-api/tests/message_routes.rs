mod common;

use anyhow::Context;
use axum::http::{Method, StatusCode};
use common::{TestContext, TestUser};
use serde_json::{json, Value};

async fn send(
    ctx: &TestContext,
    from: &TestUser,
    to: &TestUser,
    content: &str,
) -> anyhow::Result<(StatusCode, Value)> {
    ctx.request(
        Method::POST,
        "/api/messages/send",
        Some(&from.token),
        Some(json!({ "recipientId": to.id.to_string(), "content": content })),
    )
    .await
}

async fn respond(
    ctx: &TestContext,
    receiver: &TestUser,
    action: &str,
) -> anyhow::Result<(StatusCode, Value)> {
    let (status, requests) = ctx
        .request(Method::GET, "/api/messages/requests", Some(&receiver.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let request_id = requests[0]["id"]
        .as_str()
        .context("request id should be a string")?
        .to_string();
    ctx.request(
        Method::POST,
        &format!("/api/messages/requests/{request_id}/respond"),
        Some(&receiver.token),
        Some(json!({ "action": action })),
    )
    .await
}

#[tokio::test]
async fn first_contact_goes_through_a_request() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;

    let (status, payload) = send(&ctx, &alice, &bob, "hi bob").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(payload["status"], "request_created");
    assert_eq!(payload["request"]["status"], "pending");

    let (status, payload) = send(&ctx, &alice, &bob, "hello??").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["code"], "request_already_pending");

    let (status, outgoing) = ctx
        .request(
            Method::GET,
            "/api/messages/requests?direction=outgoing",
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outgoing.as_array().map(Vec::len), Some(1));

    let (status, payload) = respond(&ctx, &bob, "accept").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["request"]["status"], "accepted");
    assert_eq!(payload["message"]["content"], "hi bob");
    assert!(payload["conversationId"].is_string());

    let (_, conversations) = ctx
        .request(Method::GET, "/api/messages/conversations", Some(&alice.token), None)
        .await?;
    assert_eq!(conversations[0]["lastMessage"], "hi bob");

    let (status, payload) = send(&ctx, &alice, &bob, "thanks").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["status"], "delivered");
    assert_eq!(payload["message"]["seq"], 2);

    let (status, conversations) = ctx
        .request(Method::GET, "/api/messages/conversations", Some(&bob.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversations[0]["unreadCount"], 2);
    assert_eq!(conversations[0]["otherUser"]["username"], "alice");
    assert_eq!(conversations[0]["lastMessage"], "thanks");

    // Opening the thread marks everything from alice as read.
    let (status, thread) = ctx
        .request(
            Method::GET,
            &format!("/api/messages/{}", alice.id),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = thread
        .as_array()
        .context("thread should be an array")?
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert_eq!(contents, ["hi bob", "thanks"]);

    let (_, conversations) = ctx
        .request(Method::GET, "/api/messages/conversations", Some(&bob.token), None)
        .await?;
    assert_eq!(conversations[0]["unreadCount"], 0);
    Ok(())
}

#[tokio::test]
async fn rejected_sender_must_wait() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;

    send(&ctx, &alice, &bob, "hi").await?;
    let (status, payload) = respond(&ctx, &bob, "reject").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["request"]["status"], "rejected");
    assert!(payload["message"].is_null());

    let (status, payload) = send(&ctx, &alice, &bob, "please").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["code"], "request_rejected");
    Ok(())
}

#[tokio::test]
async fn blocks_stop_delivery_both_ways() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;

    send(&ctx, &alice, &bob, "hi").await?;
    let (status, payload) = respond(&ctx, &bob, "block").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["request"]["status"], "blocked");

    let (status, payload) = send(&ctx, &alice, &bob, "why").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["code"], "blocked_by_user");

    let (status, payload) = send(&ctx, &bob, &alice, "sorry").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["code"], "user_blocked");

    let (status, blocked) = ctx
        .request(Method::GET, "/api/users/blocked", Some(&bob.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocked[0]["username"], "alice");

    let (status, payload) = ctx
        .request(
            Method::POST,
            &format!("/api/users/{}/unblock", alice.id),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["removed"], true);

    // No conversation was ever opened, so bob's message becomes a request.
    let (status, payload) = send(&ctx, &bob, &alice, "sorry").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(payload["status"], "request_created");
    Ok(())
}

#[tokio::test]
async fn validation_and_missing_users() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let ghost = TestUser {
        id: 424242,
        token: String::new(),
    };

    let (status, payload) = send(&ctx, &alice, &ghost, "anyone?").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["kind"], "not_found");

    let (status, _) = send(&ctx, &alice, &alice, "me").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::GET,
            "/api/messages/requests?direction=sideways",
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
