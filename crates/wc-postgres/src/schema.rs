//! Idempotent schema creation. Per WC-SPEC §3, this workspace carries no
//! migration engine; tables are created with `CREATE TABLE IF NOT EXISTS` at
//! startup, the same way this codebase's Postgres adapter brings up the
//! `es.streams`/`es.events` tables on first use.

use sqlx::PgPool;

/// Schema/table names, centralized so the rest of the adapter never embeds a
/// bare string literal for a table name.
pub mod tables {
    pub const SCHEMA: &str = "wc";
    pub const OUTBOX: &str = "wc.outbox";
    pub const INBOX: &str = "wc.inbox";
    pub const EVENT_STORE: &str = "wc.event_store";
    pub const STREAMS: &str = "wc.streams";
    pub const RECEPTOR_PROCESSING: &str = "wc.receptor_processing";
    pub const PERSPECTIVE_CHECKPOINTS: &str = "wc.perspective_checkpoints";
    pub const PARTITION_LEASES: &str = "wc.partition_leases";
    pub const DEAD_LETTER_OUTBOX: &str = "wc.dead_letter_outbox";
    pub const DEAD_LETTER_INBOX: &str = "wc.dead_letter_inbox";
}

/// Create every table and index the Store needs, if not already present.
/// Safe to call on every process start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE SCHEMA IF NOT EXISTS wc").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.streams (
            stream_id TEXT PRIMARY KEY,
            next_sequence_order BIGINT NOT NULL DEFAULT 1,
            next_event_version BIGINT NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.outbox (
            message_id TEXT PRIMARY KEY,
            correlation_id TEXT NOT NULL,
            causation_id TEXT,
            message_type TEXT NOT NULL,
            stream_id TEXT NOT NULL,
            partition_number INT NOT NULL,
            sequence_order BIGINT NOT NULL,
            topic TEXT NOT NULL,
            payload_bytes BYTEA NOT NULL,
            status TEXT NOT NULL,
            instance_id TEXT,
            lease_expiry TIMESTAMPTZ,
            retry_count INT NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS outbox_claimable_idx
        ON wc.outbox (partition_number, sequence_order)
        WHERE status = 'STORED'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS outbox_lease_expiry_idx ON wc.outbox (lease_expiry)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.inbox (
            message_id TEXT PRIMARY KEY,
            correlation_id TEXT NOT NULL,
            causation_id TEXT,
            message_type TEXT NOT NULL,
            stream_id TEXT NOT NULL,
            partition_number INT NOT NULL,
            sequence_order BIGINT NOT NULL,
            source_topic TEXT NOT NULL,
            payload_bytes BYTEA NOT NULL,
            status TEXT NOT NULL,
            instance_id TEXT,
            lease_expiry TIMESTAMPTZ,
            retry_count INT NOT NULL DEFAULT 0,
            last_error TEXT,
            received_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS inbox_claimable_idx
        ON wc.inbox (partition_number, sequence_order)
        WHERE status = 'STORED'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS inbox_lease_expiry_idx ON wc.inbox (lease_expiry)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.event_store (
            event_id TEXT PRIMARY KEY,
            stream_id TEXT NOT NULL,
            aggregate_type TEXT NOT NULL,
            version BIGINT NOT NULL,
            global_sequence BIGSERIAL,
            payload_bytes BYTEA NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (stream_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.receptor_processing (
            event_id TEXT NOT NULL,
            receptor_name TEXT NOT NULL,
            status TEXT NOT NULL,
            last_error TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (event_id, receptor_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.perspective_checkpoints (
            stream_id TEXT NOT NULL,
            perspective_name TEXT NOT NULL,
            last_event_id TEXT NOT NULL,
            last_sequence_number BIGINT NOT NULL,
            status TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (stream_id, perspective_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Partition ownership is logically transient (WC-SPEC §3) but needs a
    // durable substrate so an idle partition (no currently-claimed row)
    // still resolves to a stable owner across calls instead of racing every
    // instance that asks.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.partition_leases (
            partition_number INT PRIMARY KEY,
            instance_id TEXT NOT NULL,
            lease_expiry TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.dead_letter_outbox (
            LIKE wc.outbox INCLUDING ALL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wc.dead_letter_inbox (
            LIKE wc.inbox INCLUDING ALL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
