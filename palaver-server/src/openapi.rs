#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    MessageRow, NotificationData, NotificationPayload, PushActionResponse, PushSubscription,
    SubscribeRequest, SubscriptionKeys, TestPushResponse, UnsubscribeRequest, VapidKeyResponse,
};
use utoipa::OpenApi;

use crate::http::problem::ProblemDetails;

/// OpenAPI document for the Palaver HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Palaver API",
        version = "1.0.0",
        description = "Message snapshots and web-push fan-out for the Palaver messaging platform"
    ),
    paths(
        crate::routes::push::vapid_key,
        crate::routes::push::subscribe,
        crate::routes::push::unsubscribe,
        crate::routes::push::test_push,
        crate::routes::messages::list_messages,
    ),
    components(
        schemas(
            MessageRow,
            PushSubscription,
            SubscriptionKeys,
            SubscribeRequest,
            UnsubscribeRequest,
            PushActionResponse,
            TestPushResponse,
            VapidKeyResponse,
            NotificationPayload,
            NotificationData,
            ProblemDetails,
        )
    ),
    tags(
        (name = "Push", description = "Push subscription lifecycle and delivery checks"),
        (name = "Messages", description = "Message snapshot endpoints")
    )
)]
pub struct ApiDoc;
