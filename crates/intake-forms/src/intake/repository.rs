use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use tracing::info;

use crate::config::{ConfigError, DatabaseConfig};
use crate::store::{bson_to_json, MongoConnector};

use super::domain::{
    InsertConfirmation, IntakeForm, StoredForm, DOB_FIELD, MEDS_LIST_URL_FIELD,
    PHOTO_ID_URL_FIELD,
};

/// Storage abstraction over the single intake-form collection.
#[async_trait]
pub trait FormRepository: Send + Sync {
    async fn insert(&self, form: IntakeForm) -> Result<InsertConfirmation, RepositoryError>;
    /// Full unfiltered scan in the store's natural order.
    async fn list_all(&self) -> Result<Vec<StoredForm>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("document store unavailable: {0}")]
    Connection(String),
    #[error("Failed to insert document: {0}")]
    InsertFailed(String),
    #[error("Failed to read documents: {0}")]
    ReadFailed(String),
}

/// MongoDB-backed repository. Every call opens and closes its own connection.
#[derive(Debug, Clone)]
pub struct MongoFormRepository {
    connector: MongoConnector,
    collection: String,
}

impl MongoFormRepository {
    pub fn new(connector: MongoConnector, collection: impl Into<String>) -> Self {
        Self {
            connector,
            collection: collection.into(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            MongoConnector::from_config(config)?,
            config.forms_collection.clone(),
        ))
    }
}

#[async_trait]
impl FormRepository for MongoFormRepository {
    async fn insert(&self, form: IntakeForm) -> Result<InsertConfirmation, RepositoryError> {
        let document = form_document(&form);
        let collection = self.collection.clone();

        let outcome = self
            .connector
            .scoped(|database| async move {
                info!(collection = %collection, "inserting intake form");
                database
                    .collection::<Document>(&collection)
                    .insert_one(document)
                    .await
            })
            .await
            .map_err(|err| RepositoryError::InsertFailed(err.to_string()))?;

        let result = outcome.map_err(|err| RepositoryError::InsertFailed(err.to_string()))?;
        let inserted_id = match result.inserted_id {
            Bson::ObjectId(id) => id.to_hex(),
            other => other.to_string(),
        };

        Ok(InsertConfirmation {
            acknowledged: true,
            inserted_id,
        })
    }

    async fn list_all(&self) -> Result<Vec<StoredForm>, RepositoryError> {
        let collection = self.collection.clone();

        let outcome = self
            .connector
            .scoped(|database| async move {
                let cursor = database
                    .collection::<Document>(&collection)
                    .find(doc! {})
                    .await?;
                cursor.try_collect::<Vec<Document>>().await
            })
            .await
            .map_err(|err| RepositoryError::Connection(err.to_string()))?;

        let documents = outcome.map_err(|err| RepositoryError::ReadFailed(err.to_string()))?;
        Ok(documents
            .into_iter()
            .map(|document| match bson_to_json(Bson::Document(document)) {
                serde_json::Value::Object(map) => StoredForm(map),
                _ => StoredForm(serde_json::Map::new()),
            })
            .collect())
    }
}

/// BSON shape of a form: passthrough strings, `dob` as a date (or null), and both URLs.
pub(crate) fn form_document(form: &IntakeForm) -> Document {
    let mut document = Document::new();
    for (key, value) in &form.fields {
        document.insert(key.clone(), value.clone());
    }

    let dob = form
        .dob
        .to_utc_midnight()
        .map(|instant| mongodb::bson::DateTime::from_millis(instant.timestamp_millis()))
        .map(Bson::DateTime)
        .unwrap_or(Bson::Null);
    document.insert(DOB_FIELD, dob);
    document.insert(PHOTO_ID_URL_FIELD, form.photo_id_url.clone());
    document.insert(MEDS_LIST_URL_FIELD, form.meds_list_url.clone());
    document
}
