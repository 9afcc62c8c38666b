//! 웹 모듈 - 채팅 프론트엔드 HTTP 서버
//!
//! - `GET /`: 랜딩 페이지
//! - `GET /chat`: 채팅 페이지
//! - `POST /get`: 폼 필드 `msg`로 질문, HTML 조각으로 답변
//! - `GET /healthz`: 헬스 체크

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::format::format_answer_html;
use crate::rag::RagChain;

const LANDING_HTML: &str = include_str!("../../templates/landing.html");
const CHAT_HTML: &str = include_str!("../../templates/chat.html");

// ============================================================================
// Application Context
// ============================================================================

/// 요청 핸들러들이 공유하는 애플리케이션 컨텍스트
///
/// 시작 시 한 번 만들어지며 이후 읽기 전용입니다.
#[derive(Clone)]
pub struct AppContext {
    pub chain: Arc<RagChain>,
}

impl AppContext {
    pub fn new(chain: RagChain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// 핸들러 에러
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("upstream service error: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 채팅 폼
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub msg: Option<String>,
}

/// 라우터 생성
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/chat", get(chat))
        .route("/get", post(get_chat_response))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// 서버 실행 (종료 시그널까지 블록)
pub async fn serve(ctx: AppContext, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("medibot listening on http://{}", addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ============================================================================
// Handlers
// ============================================================================

async fn landing() -> Html<&'static str> {
    Html(LANDING_HTML)
}

async fn chat() -> Html<&'static str> {
    Html(CHAT_HTML)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn get_chat_response(
    State(ctx): State<AppContext>,
    Form(form): Form<ChatForm>,
) -> Result<impl IntoResponse, AppError> {
    let msg = form
        .msg
        .filter(|m| !m.trim().is_empty())
        .ok_or(AppError::BadRequest("missing form field: msg"))?;

    let answer = ctx.chain.answer(&msg).await.map_err(|e| {
        tracing::error!("Answer pipeline failed: {:#}", e);
        AppError::Upstream(e)
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        format_answer_html(&answer.answer),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_status() {
        let response = AppError::BadRequest("missing form field: msg").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_status() {
        let response = AppError::from(anyhow::anyhow!("pinecone down")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_templates_embedded() {
        assert!(LANDING_HTML.contains("/chat"));
        assert!(CHAT_HTML.contains("/get"));
    }
}
