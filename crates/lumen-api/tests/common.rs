#![allow(dead_code)]

use anyhow::Context;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use lumen_core::{AppConfig, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

pub struct TestUser {
    pub id: i64,
    pub token: String,
}

impl TestContext {
    pub async fn new() -> anyhow::Result<Self> {
        let db = lumen_db::create_pool("sqlite::memory:", 1).await?;
        lumen_db::run_migrations(&db).await?;
        let state = AppState::new(db, AppConfig::default());
        let app = lumen_api::build_router()
            .merge(lumen_ws::gateway_router())
            .with_state(state.clone());
        Ok(Self { state, app })
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = if let Some(payload) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(payload.to_string()))?
        } else {
            builder.body(Body::empty())?
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let payload = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body_bytes) }))
        };
        Ok((status, payload))
    }

    pub async fn register(&self, username: &str) -> anyhow::Result<TestUser> {
        let (status, payload) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct-horse" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {payload}");
        let id = payload["user"]["id"]
            .as_str()
            .context("user id should be a string")?
            .parse()?;
        let token = payload["token"]
            .as_str()
            .context("token should be a string")?
            .to_string();
        Ok(TestUser { id, token })
    }
}
