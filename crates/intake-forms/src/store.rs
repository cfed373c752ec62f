//! Scoped MongoDB access: one client per logical operation, closed on every exit path.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{doc, Bson};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ConfigError, DatabaseConfig};

#[derive(Debug, Clone)]
pub struct MongoConnector {
    uri: String,
    database: String,
}

impl MongoConnector {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.require_uri()?, config.database.clone()))
    }

    /// Connects, runs `op` against the database, then shuts the client down whether or not
    /// `op` succeeded. Only connection failures surface as the outer error.
    pub async fn scoped<T, F, Fut>(&self, op: F) -> Result<T, mongodb::error::Error>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = T>,
    {
        info!(database = %self.database, "connecting to document store");
        let client = Client::with_uri_str(&self.uri).await?;
        let database = client.database(&self.database);

        if let Err(err) = database.run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(err);
        }
        debug!("document store connection established");

        let output = op(database).await;
        client.shutdown().await;
        Ok(output)
    }
}

/// Converts a stored BSON value into the JSON clients receive: object ids as hex strings and
/// dates as RFC 3339 strings.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(instant) => {
            DateTime::<Utc>::from_timestamp_millis(instant.timestamp_millis())
                .map(|instant| Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .unwrap_or(Value::Null)
        }
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
