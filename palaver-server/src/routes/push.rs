//! Push subscription lifecycle and the manual fan-out trigger.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use shared::models::{
    NotificationData, NotificationPayload, PushActionResponse, PushSubscription, SubscribeRequest,
    TestPushResponse, UnsubscribeRequest, VapidKeyResponse,
};
use tracing::{info, instrument};

use crate::app_state::AppState;
use crate::http::error::{ApiError, AppResult};
use crate::http::problem::ProblemDetails;
use crate::services::Notifier;

#[utoipa::path(
    get,
    path = "/api/push/vapid-key",
    responses(
        (status = 200, description = "Public VAPID key for subscribing", body = VapidKeyResponse)
    ),
    tag = "Push"
)]
#[allow(clippy::unused_async)] // handlers must be async for axum routing
pub async fn vapid_key(State(state): State<Arc<AppState>>) -> Json<VapidKeyResponse> {
    Json(VapidKeyResponse {
        public_key: state.push.vapid_public_key.clone(),
    })
}

#[utoipa::path(
    post,
    path = "/api/push/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscription stored", body = PushActionResponse),
        (status = 400, description = "Subscription endpoint missing", body = ProblemDetails)
    ),
    tag = "Push"
)]
#[instrument(skip(state, request))]
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubscribeRequest>,
) -> AppResult<Json<PushActionResponse>> {
    if request.endpoint.trim().is_empty() {
        return Err(ApiError::missing_field(
            "endpoint",
            "subscription endpoint is required",
        ));
    }

    let subscription = PushSubscription::from(request);
    state.registry.upsert(&subscription).await?;
    info!(endpoint = %subscription.endpoint, "push subscription stored");
    Ok(Json(PushActionResponse { success: true }))
}

#[utoipa::path(
    post,
    path = "/api/push/unsubscribe",
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "Subscription removed if it existed", body = PushActionResponse),
        (status = 400, description = "Subscription endpoint missing", body = ProblemDetails)
    ),
    tag = "Push"
)]
#[instrument(skip(state, request))]
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UnsubscribeRequest>,
) -> AppResult<Json<PushActionResponse>> {
    if request.endpoint.trim().is_empty() {
        return Err(ApiError::missing_field(
            "endpoint",
            "subscription endpoint is required",
        ));
    }

    // Idempotent: deleting an unknown endpoint still succeeds.
    state.registry.delete(&request.endpoint).await?;
    info!(endpoint = %request.endpoint, "push subscription removed");
    Ok(Json(PushActionResponse { success: true }))
}

#[utoipa::path(
    get,
    path = "/api/push/test",
    responses(
        (status = 200, description = "Fan-out pass finished", body = TestPushResponse),
        (status = 500, description = "Subscription listing failed", body = ProblemDetails)
    ),
    tag = "Push"
)]
#[instrument(skip(state))]
pub async fn test_push(State(state): State<Arc<AppState>>) -> AppResult<Json<TestPushResponse>> {
    let notifier = Notifier::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.contacts),
        Arc::clone(&state.gateway),
    );

    let payload = NotificationPayload {
        title: "Palaver".to_string(),
        body: "Test notification".to_string(),
        data: NotificationData::default(),
    };

    let report = notifier.send_to_all(&payload).await?;

    Ok(Json(TestPushResponse {
        success: true,
        message: report.summary(),
    }))
}

pub fn push_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/push/vapid-key", get(vapid_key))
        .route("/push/subscribe", post(subscribe))
        .route("/push/unsubscribe", post(unsubscribe))
        .route("/push/test", get(test_push))
}
