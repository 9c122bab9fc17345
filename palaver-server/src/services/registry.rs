use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::models::{PushSubscription, SubscriptionKeys};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::trace;

/// Persistence seam for push subscriptions, keyed by endpoint.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Inserts a subscription or refreshes the keys of an existing one.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot persist the change.
    async fn upsert(&self, subscription: &PushSubscription) -> Result<()>;

    /// Removes one subscription by endpoint. Removing an endpoint that
    /// was never registered, or that another pass already removed, is
    /// not an error.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot apply the removal.
    async fn delete(&self, endpoint: &str) -> Result<()>;

    /// Every currently registered subscription, ordered by endpoint.
    ///
    /// # Errors
    /// Returns an error if the subscriptions cannot be read or decoded.
    async fn list_all(&self) -> Result<Vec<PushSubscription>>;
}

/// Registry backed by the `push_subscriptions` table.
#[derive(Clone)]
pub struct PgSubscriptionRegistry {
    pool: PgPool,
}

impl PgSubscriptionRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRecord {
    endpoint: String,
    keys: serde_json::Value,
}

#[async_trait]
impl SubscriptionRegistry for PgSubscriptionRegistry {
    async fn upsert(&self, subscription: &PushSubscription) -> Result<()> {
        let keys = serde_json::to_value(&subscription.keys)?;
        sqlx::query(
            "INSERT INTO push_subscriptions (endpoint, keys) VALUES ($1, $2) \
             ON CONFLICT (endpoint) DO UPDATE SET keys = EXCLUDED.keys, updated_at = now()",
        )
        .bind(&subscription.endpoint)
        .bind(keys)
        .execute(&self.pool)
        .await?;

        trace!(endpoint = %subscription.endpoint, "stored push subscription");
        Ok(())
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;

        trace!(endpoint = %endpoint, "removed push subscription");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PushSubscription>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT endpoint, keys FROM push_subscriptions ORDER BY endpoint",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut subscriptions = Vec::with_capacity(records.len());
        for record in records {
            let keys: SubscriptionKeys = serde_json::from_value(record.keys)?;
            subscriptions.push(PushSubscription {
                endpoint: record.endpoint,
                keys,
            });
        }
        Ok(subscriptions)
    }
}

/// In-memory registry for tests and database-free operation.
#[derive(Debug, Default)]
pub struct MemorySubscriptionRegistry {
    inner: Mutex<HashMap<String, PushSubscription>>,
}

#[async_trait]
impl SubscriptionRegistry for MemorySubscriptionRegistry {
    async fn upsert(&self, subscription: &PushSubscription) -> Result<()> {
        self.inner
            .lock()
            .await
            .insert(subscription.endpoint.clone(), subscription.clone());
        Ok(())
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        self.inner.lock().await.remove(endpoint);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PushSubscription>> {
        let mut subscriptions: Vec<PushSubscription> =
            self.inner.lock().await.values().cloned().collect();
        subscriptions.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(endpoint: &str, auth: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: "pk".to_string(),
                auth: auth.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_replaces_keys_for_the_same_endpoint() {
        let registry = MemorySubscriptionRegistry::default();
        registry
            .upsert(&subscription("https://push.example/a", "one"))
            .await
            .unwrap();
        registry
            .upsert(&subscription("https://push.example/a", "two"))
            .await
            .unwrap();

        let all = registry.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].keys.auth, "two");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let registry = MemorySubscriptionRegistry::default();
        registry
            .upsert(&subscription("https://push.example/a", "one"))
            .await
            .unwrap();

        registry.delete("https://push.example/a").await.unwrap();
        registry.delete("https://push.example/a").await.unwrap();
        registry.delete("https://push.example/never").await.unwrap();

        assert!(registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_orders_by_endpoint() {
        let registry = MemorySubscriptionRegistry::default();
        for endpoint in ["https://push.example/c", "https://push.example/a"] {
            registry.upsert(&subscription(endpoint, "k")).await.unwrap();
        }

        let endpoints: Vec<String> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert_eq!(
            endpoints,
            vec!["https://push.example/a", "https://push.example/c"]
        );
    }
}
