use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Browser-provided credential material for one push endpoint. Opaque
/// to us; it is stored verbatim and echoed back to the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SubscriptionKeys {
    /// Client public key.
    pub p256dh: String,
    /// Authentication secret.
    pub auth: String,
}

/// One registered push endpoint. The endpoint URL is the primary key:
/// re-subscribing upserts, unsubscribing deletes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PushSubscription {
    /// Provider-issued delivery URL, unique per browser registration.
    pub endpoint: String,
    /// Credential material bound to the endpoint.
    pub keys: SubscriptionKeys,
}

/// Extra notification fields consumed by the display layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct NotificationData {
    /// Conversation to open when the notification is activated.
    #[serde(rename = "contactId", skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

/// Rendered notification content delivered to every subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct NotificationPayload {
    /// Notification title, usually the sender display name.
    pub title: String,
    /// Notification body, the message text or a media label.
    pub body: String,
    /// Routing data for the display layer.
    #[serde(default)]
    pub data: NotificationData,
}

/// Response for the VAPID key lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct VapidKeyResponse {
    /// Public half of the server VAPID key pair.
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Request body for registering a subscription. Fields default so an
/// incomplete body reaches validation instead of a decode rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SubscribeRequest {
    /// Provider-issued delivery URL.
    #[serde(default)]
    pub endpoint: String,
    /// Credential material bound to the endpoint.
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

impl From<SubscribeRequest> for PushSubscription {
    fn from(request: SubscribeRequest) -> Self {
        Self {
            endpoint: request.endpoint,
            keys: request.keys,
        }
    }
}

/// Request body for dropping a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UnsubscribeRequest {
    /// Endpoint URL registered earlier.
    #[serde(default)]
    pub endpoint: String,
}

/// Acknowledgement for subscribe/unsubscribe calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PushActionResponse {
    /// Always true; failures surface as problem responses instead.
    pub success: bool,
}

/// Result of a manually triggered fan-out pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TestPushResponse {
    /// Whether the pass ran to completion.
    pub success: bool,
    /// Human-readable delivery summary.
    pub message: String,
}
