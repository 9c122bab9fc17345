//! Embedded database bootstrap: schema, change trigger, indexes.
//!
//! Stages run in order at startup, one transaction per stage, and are
//! written to be re-runnable against an already-bootstrapped database.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'text',
    sender TEXT,
    recipient TEXT,
    text TEXT,
    media_url TEXT,
    reply_to_mid TEXT,
    mid TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS push_subscriptions (
    endpoint TEXT PRIMARY KEY,
    keys JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
";

// Column names double as the change-stream wire fields, so the trigger
// payload decodes straight into the shared row model. Delete events
// carry only the primary key.
const TRIGGER_SQL: &str = r"
CREATE OR REPLACE FUNCTION palaver_notify_message_change() RETURNS trigger AS $$
DECLARE
    payload text;
BEGIN
    IF TG_OP = 'INSERT' THEN
        payload := json_build_object('event_type', 'insert', 'new', row_to_json(NEW), 'old', NULL)::text;
    ELSIF TG_OP = 'UPDATE' THEN
        payload := json_build_object('event_type', 'update', 'new', row_to_json(NEW), 'old', row_to_json(OLD))::text;
    ELSE
        payload := json_build_object('event_type', 'delete', 'new', NULL, 'old', json_build_object('id', OLD.id))::text;
    END IF;
    PERFORM pg_notify('palaver_message_events', payload);
    RETURN NULL;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS messages_notify_change ON messages;
CREATE TRIGGER messages_notify_change
    AFTER INSERT OR UPDATE OR DELETE ON messages
    FOR EACH ROW
    EXECUTE FUNCTION palaver_notify_message_change();
";

const INDEX_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages (sender);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages (recipient);
CREATE INDEX IF NOT EXISTS idx_messages_mid ON messages (mid);
";

const STAGES: &[(&str, &str)] = &[
    ("schema", SCHEMA_SQL),
    ("triggers", TRIGGER_SQL),
    ("indexes", INDEX_SQL),
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database error executing bootstrap stage '{stage}': {source}")]
    Sql {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies all bootstrap stages in order.
///
/// # Errors
/// Returns the first stage that failed; later stages are not attempted.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    info!("running database bootstrap");
    for (stage, sql) in STAGES {
        apply_stage(pool, stage, sql).await?;
    }
    Ok(())
}

async fn apply_stage(pool: &PgPool, stage: &'static str, sql: &str) -> Result<(), BootstrapError> {
    debug!(stage, "applying bootstrap stage");
    let mut transaction = pool
        .begin()
        .await
        .map_err(|source| BootstrapError::Sql { stage, source })?;

    if let Err(source) = sqlx::raw_sql(sql).execute(&mut *transaction).await {
        return Err(BootstrapError::Sql { stage, source });
    }

    transaction
        .commit()
        .await
        .map_err(|source| BootstrapError::Sql { stage, source })
}

/// Simple liveness check used during startup.
///
/// # Errors
/// Returns the underlying database error when the round trip fails.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe: every bootstrapped table must exist.
///
/// # Errors
/// Returns a database error when the check cannot run or the schema is
/// missing.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    #[cfg(test)]
    if let Some(result) = readiness_override() {
        return result;
    }

    let ready: (bool,) = sqlx::query_as(
        "SELECT to_regclass('public.messages') IS NOT NULL \
           AND to_regclass('public.push_subscriptions') IS NOT NULL \
           AND to_regclass('public.contacts') IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    if ready.0 {
        Ok(())
    } else {
        Err(sqlx::Error::Protocol(
            "database schema not bootstrapped".into(),
        ))
    }
}

#[cfg(test)]
static READINESS_OVERRIDE: std::sync::Mutex<Option<Result<(), String>>> =
    std::sync::Mutex::new(None);

/// Test hook: forces the readiness probe outcome without a database.
#[cfg(test)]
pub fn set_readiness_override(value: Option<Result<(), String>>) {
    *READINESS_OVERRIDE.lock().unwrap() = value;
}

#[cfg(test)]
fn readiness_override() -> Option<Result<(), sqlx::Error>> {
    READINESS_OVERRIDE
        .lock()
        .unwrap()
        .clone()
        .map(|result| result.map_err(sqlx::Error::Protocol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_notifies_on_the_listener_channel() {
        assert!(TRIGGER_SQL.contains(crate::listener::CHANNEL));
    }

    #[test]
    fn schema_covers_every_bootstrapped_table() {
        for table in ["messages", "push_subscriptions", "contacts"] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "schema stage missing table {table}"
            );
        }
    }

    #[test]
    fn stages_run_schema_before_triggers_and_indexes() {
        let labels: Vec<&str> = STAGES.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["schema", "triggers", "indexes"]);
    }
}
