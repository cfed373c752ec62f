use async_trait::async_trait;
use mongodb::bson::doc;

use crate::config::{ConfigError, DatabaseConfig};
use crate::store::MongoConnector;

use super::domain::StaffUser;

/// Lookup and creation of staff accounts keyed by provider subject.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str)
        -> Result<Option<StaffUser>, DirectoryError>;
    async fn create(&self, user: StaffUser) -> Result<StaffUser, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("user directory query failed: {0}")]
    Query(String),
}

/// Users collection in the same MongoDB database as the forms.
#[derive(Debug, Clone)]
pub struct MongoUserDirectory {
    connector: MongoConnector,
    collection: String,
}

impl MongoUserDirectory {
    pub fn new(connector: MongoConnector, collection: impl Into<String>) -> Self {
        Self {
            connector,
            collection: collection.into(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            MongoConnector::from_config(config)?,
            config.users_collection.clone(),
        ))
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<StaffUser>, DirectoryError> {
        let collection = self.collection.clone();
        let filter = doc! { "googleId": external_id };

        self.connector
            .scoped(|database| async move {
                database
                    .collection::<StaffUser>(&collection)
                    .find_one(filter)
                    .await
            })
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?
            .map_err(|err| DirectoryError::Query(err.to_string()))
    }

    async fn create(&self, user: StaffUser) -> Result<StaffUser, DirectoryError> {
        let collection = self.collection.clone();
        let record = user.clone();

        self.connector
            .scoped(|database| async move {
                database
                    .collection::<StaffUser>(&collection)
                    .insert_one(record)
                    .await
            })
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?
            .map_err(|err| DirectoryError::Query(err.to_string()))?;

        Ok(user)
    }
}
