use axum::{
    routing::post,
    Router,
    extract::{rejection::JsonRejection, Json, State},
    middleware,
    response::IntoResponse,
};
use tower_http::cors::{CorsLayer, Any};
use std::time::Instant;

use crate::api::models::ChatRequest;
use crate::api::response;
use crate::error::{AppError, Result};
use crate::rate_limit;
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .layer(middleware::from_fn_with_state(
            app_state.limiter.clone(),
            rate_limit::enforce,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(app_state)
}

async fn chat_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = body.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let start_time = Instant::now();
    tracing::info!(has_url = req.url.is_some(), "processing chat request");

    let reply = state.chat.reply(&req.message, req.url.as_deref()).await?;

    tracing::info!(elapsed = ?start_time.elapsed(), "chat request completed");
    Ok(response::chat_reply(reply))
}
