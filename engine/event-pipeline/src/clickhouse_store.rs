//! ClickHouse store for ingested events.
//!
//! One flushed batch becomes one `INSERT ... FORMAT RowBinary` request. Rows
//! are streamed in batch order and only committed by `Insert::end`; an insert
//! dropped before `end` is aborted server-side, so a failed batch leaves no
//! partial rows behind.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::event::Event;
use crate::store::EventStore;
use clickhouse::{Client, Row};
use serde::Serialize;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// Row layout of the events table, in insertion-column order.
///
/// ```sql
/// CREATE TABLE events (
///     client_time DateTime,
///     device_id   UUID,
///     device_os   String,
///     session     String,
///     sequence    Int32,
///     event       String,
///     param_int   Nullable(Int32),
///     param_str   Nullable(String),
///     ip          IPv4,
///     server_time DateTime
/// ) ENGINE = MergeTree ORDER BY tuple();
/// ```
#[derive(Debug, Clone, Row, Serialize)]
pub struct EventRow {
    /// Device-reported time, Unix seconds (0 when absent)
    pub client_time: u32,

    #[serde(with = "clickhouse::serde::uuid")]
    pub device_id: Uuid,

    pub device_os: String,

    pub session: String,

    pub sequence: i32,

    pub event: String,

    pub param_int: Option<i32>,

    pub param_str: Option<String>,

    /// Peer address (0.0.0.0 when unknown)
    #[serde(with = "clickhouse::serde::ipv4")]
    pub ip: Ipv4Addr,

    /// Ingestion time, Unix seconds
    pub server_time: u32,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        let device_id = Uuid::parse_str(&event.device_id).unwrap_or_else(|_| {
            tracing::warn!(device_id = %event.device_id, "device_id is not a UUID, storing nil");
            Uuid::nil()
        });

        Self {
            client_time: event.client_time.unix_seconds(),
            device_id,
            device_os: event.device_os.clone(),
            session: event.session.clone(),
            sequence: event.sequence,
            event: event.event.clone(),
            param_int: event.param_int,
            param_str: event.param_str.clone(),
            ip: event.ip_v4().unwrap_or(Ipv4Addr::UNSPECIFIED),
            server_time: event.server_time.unix_seconds(),
        }
    }
}

/// Events table DDL for the given configuration
pub fn create_table_sql(config: &StoreConfig) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}
(
    client_time DateTime,
    device_id   UUID,
    device_os   String,
    session     String,
    sequence    Int32,
    event       String,
    param_int   Nullable(Int32),
    param_str   Nullable(String),
    ip          IPv4,
    server_time DateTime
)
ENGINE = MergeTree
ORDER BY tuple()",
        config.qualified_table()
    )
}

/// ClickHouse-backed [`EventStore`]
pub struct ClickHouseStore {
    client: Client,
    config: StoreConfig,
}

impl ClickHouseStore {
    /// Create a store; no connection is made until the first request.
    pub fn new(config: StoreConfig) -> Self {
        let client = Self::build_client(&config).with_database(&config.database);

        tracing::info!(
            url = %config.url,
            database = %config.database,
            table = %config.table,
            "ClickHouse store initialized"
        );

        Self { client, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // Without a database: the server rejects requests that name a
    // database which does not exist yet.
    fn build_client(config: &StoreConfig) -> Client {
        let mut client = Client::default().with_url(&config.url);

        if let Some(ref username) = config.username {
            client = client.with_user(username);
        }

        if let Some(ref password) = config.password {
            client = client.with_password(password);
        }

        client
    }
}

#[async_trait::async_trait]
impl EventStore for ClickHouseStore {
    async fn ensure_schema(&self) -> Result<()> {
        let admin = Self::build_client(&self.config);

        admin
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.config.database))
            .execute()
            .await?;
        admin.query(&create_table_sql(&self.config)).execute().await?;

        tracing::info!(table = %self.config.qualified_table(), "events table ready");
        Ok(())
    }

    async fn insert_batch(&self, events: &[Event]) -> Result<()> {
        let mut insert = self.client.insert::<EventRow>(&self.config.table)?;

        for event in events {
            insert.write(&EventRow::from(event)).await?;
        }

        insert.end().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let one: u8 = self.client.query("SELECT 1").fetch_one().await?;
        if one != 1 {
            return Err(crate::error::PipelineError::store(format!(
                "unexpected ping reply {one}"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "clickhouse"
    }
}
