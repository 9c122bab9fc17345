use std::sync::Arc;

use shared::config::PushConfig;

use crate::services::contacts::{ContactDirectory, StaticContactDirectory};
use crate::services::push_gateway::{PushGateway, WebPushGateway};
use crate::services::registry::{MemorySubscriptionRegistry, SubscriptionRegistry};

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Database pool; absent when the server runs without a database.
    pub pool: Option<sqlx::PgPool>,
    /// Push subscription storage.
    pub registry: Arc<dyn SubscriptionRegistry>,
    /// Display-name lookup for notification titles.
    pub contacts: Arc<dyn ContactDirectory>,
    /// Delivery boundary to the push provider.
    pub gateway: Arc<dyn PushGateway>,
    /// Push configuration (VAPID key material, timeouts).
    pub push: PushConfig,
}

impl Default for AppState {
    fn default() -> Self {
        let push = PushConfig::default();
        Self {
            pool: None,
            registry: Arc::new(MemorySubscriptionRegistry::default()),
            contacts: Arc::new(StaticContactDirectory::default()),
            gateway: Arc::new(WebPushGateway::new(&push)),
            push,
        }
    }
}
