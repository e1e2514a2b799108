use std::sync::Arc;

use crate::config::{AwsConfig, ConfigError};
use crate::services::{
    database::{DatabaseHandler, DynamoStore},
    ocr::{TextractApi, TextractHandler},
    storage::{S3Store, StorageHandler},
    word::WordHandler,
};

/// Handlers sharing one resolved AWS configuration.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageHandler>,
    pub database: Arc<DatabaseHandler>,
    pub ocr: Arc<TextractHandler>,
    pub word: Arc<WordHandler>,
}

impl AppState {
    pub fn new(storage: StorageHandler, database: DatabaseHandler, ocr: TextractHandler) -> Self {
        let storage = Arc::new(storage);
        Self {
            word: Arc::new(WordHandler::new(storage.clone())),
            storage,
            database: Arc::new(database),
            ocr: Arc::new(ocr),
        }
    }

    /// Build AWS-backed handlers. `table_name` is the database handler's default table.
    pub async fn from_config(config: &AwsConfig, table_name: &str) -> Result<Self, ConfigError> {
        let sdk_config = config.sdk_config().await;

        let mut s3 = S3Store::new(config.s3_region()?, config.s3_credentials()?);
        if config.endpoint_url.is_some() {
            s3 = s3.with_path_style();
        }

        tracing::info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "Initialized AWS clients"
        );

        Ok(Self::new(
            StorageHandler::new(Arc::new(s3)),
            DatabaseHandler::new(Arc::new(DynamoStore::new(&sdk_config)), table_name),
            TextractHandler::new(Arc::new(TextractApi::new(&sdk_config))),
        ))
    }
}
