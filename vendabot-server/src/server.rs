// vendabot-server/src/server.rs
//
// Inbound webhooks. Policy: 200 for processed-or-intentionally-ignored,
// 400 only for malformed input, 500 for unrecoverable internal failures.
// The senders' own retry semantics handle redelivery.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use vendabot_core::services::intake::WebhookEvent;
use vendabot_core::services::reply::InboundReply;
use vendabot_core::Error;

use crate::context::AppContext;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/webhooks/marketplace", post(marketplace_webhook))
        .route("/webhooks/messaging", post(messaging_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn marketplace_webhook(
    State(ctx): State<Arc<AppContext>>,
    Json(event): Json<WebhookEvent>,
) -> StatusCode {
    match ctx.intake.handle_webhook(&event).await {
        Ok(()) => StatusCode::OK,
        Err(Error::Validation(msg)) => {
            debug!(%msg, "rejecting malformed marketplace webhook");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            error!(error = %e, "marketplace webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn messaging_webhook(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<Value>,
) -> StatusCode {
    // Non-message events (presence, status) are expected traffic, not errors.
    let Some(reply) = InboundReply::from_payload(&payload) else {
        debug!("messaging webhook carried no usable message");
        return StatusCode::OK;
    };

    match ctx.reply.handle_reply(&reply).await {
        Ok(()) => StatusCode::OK,
        Err(Error::Validation(msg)) => {
            debug!(%msg, "rejecting malformed messaging webhook");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            error!(error = %e, "messaging webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
