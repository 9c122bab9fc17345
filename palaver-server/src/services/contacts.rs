use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Display-name lookup for notification titles. Best-effort only; the
/// fan-out falls back to the raw sender token when lookup misses or
/// fails.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Display name for a sender token, when one is known.
    ///
    /// # Errors
    /// Returns an error if the lookup itself fails; an unknown contact
    /// is `Ok(None)`.
    async fn display_name(&self, contact_id: &str) -> Result<Option<String>>;
}

/// Directory backed by the `contacts` table.
#[derive(Clone)]
pub struct PgContactDirectory {
    pool: PgPool,
}

impl PgContactDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for PgContactDirectory {
    async fn display_name(&self, contact_id: &str) -> Result<Option<String>> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM contacts WHERE id = $1")
            .bind(contact_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name.map(|row| row.0))
    }
}

/// Fixed directory for tests and database-free operation.
#[derive(Debug, Default)]
pub struct StaticContactDirectory {
    names: HashMap<String, String>,
}

impl StaticContactDirectory {
    /// Builds a directory from `(contact_id, display_name)` pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(id, name)| (id.into(), name.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl ContactDirectory for StaticContactDirectory {
    async fn display_name(&self, contact_id: &str) -> Result<Option<String>> {
        Ok(self.names.get(contact_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_returns_known_names_only() {
        let directory = StaticContactDirectory::from_pairs([("4915551234", "Ada Lovelace")]);

        assert_eq!(
            directory.display_name("4915551234").await.unwrap(),
            Some("Ada Lovelace".to_string())
        );
        assert_eq!(directory.display_name("4900000000").await.unwrap(), None);
    }
}
