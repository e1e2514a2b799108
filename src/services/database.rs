use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as DynamoValue;

use crate::models::item::{AttributeValue, Item, WireItem};
use crate::services::codec::{self, CodecError, ItemInput};
use crate::services::ocr::BoxError;

/// Item operations the handler forwards to the database.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn put_item(&self, table: &str, item: WireItem) -> Result<(), BoxError>;

    /// `None` when no item has this key.
    async fn get_item(&self, table: &str, key: WireItem) -> Result<Option<WireItem>, BoxError>;

    async fn delete_item(&self, table: &str, key: WireItem) -> Result<(), BoxError>;
}

/// Reads and writes items in plain form, encoding on the way in and
/// decoding on the way out.
pub struct DatabaseHandler {
    store: Arc<dyn ItemStore>,
    table_name: String,
}

impl DatabaseHandler {
    pub fn new(store: Arc<dyn ItemStore>, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: table_name.into(),
        }
    }

    /// Table name this handler was configured with. Every operation still
    /// takes its table explicitly; the CLI passes this one.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Look up an item by key. The key may be plain or wire-encoded.
    ///
    /// Returns `Ok(None)` when nothing is stored under the key, which is
    /// distinct from an item with no attributes.
    pub async fn get_item<K>(&self, table: &str, key: K) -> Result<Option<Item>, DatabaseError>
    where
        K: TryInto<ItemInput>,
        CodecError: From<K::Error>,
    {
        let key = key.try_into().map_err(CodecError::from)?.into_wire();

        let found = self
            .store
            .get_item(table, key)
            .await
            .map_err(|source| DatabaseError::Backend {
                operation: "get_item",
                table: table.to_string(),
                source,
            })?;
        metrics::counter!("database_operations_total", "op" => "get_item").increment(1);

        match found {
            Some(item) => {
                tracing::debug!(table = %table, "Item found");
                Ok(Some(codec::decode(&item)?))
            }
            None => {
                tracing::debug!(table = %table, "Item not found");
                Ok(None)
            }
        }
    }

    /// Write an item, encoding it first unless it is already wire-encoded.
    ///
    /// Non-mapping input is rejected before the database is contacted.
    /// Returns the item as written.
    pub async fn insert_item<I>(&self, table: &str, item: I) -> Result<WireItem, DatabaseError>
    where
        I: TryInto<ItemInput>,
        CodecError: From<I::Error>,
    {
        let item = item.try_into().map_err(CodecError::from)?.into_wire();

        self.store
            .put_item(table, item.clone())
            .await
            .map_err(|source| DatabaseError::Backend {
                operation: "put_item",
                table: table.to_string(),
                source,
            })?;
        metrics::counter!("database_operations_total", "op" => "put_item").increment(1);

        tracing::info!(table = %table, attributes = item.len(), "Item inserted");
        Ok(item)
    }

    /// Delete the item under `key`. Failures are logged and reported as `false`.
    pub async fn delete_item<K>(&self, table: &str, key: K) -> bool
    where
        K: TryInto<ItemInput>,
        CodecError: From<K::Error>,
    {
        let key = match key.try_into() {
            Ok(key) => key.into_wire(),
            Err(e) => {
                tracing::error!(table = %table, error = %CodecError::from(e), "Invalid key for delete");
                return false;
            }
        };

        match self.store.delete_item(table, key).await {
            Ok(()) => {
                metrics::counter!("database_operations_total", "op" => "delete_item").increment(1);
                tracing::info!(table = %table, "Item deleted");
                true
            }
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Failed to delete item");
                false
            }
        }
    }
}

/// [`ItemStore`] over the AWS DynamoDB SDK.
pub struct DynamoStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(config),
        }
    }
}

#[async_trait]
impl ItemStore for DynamoStore {
    async fn put_item(&self, table: &str, item: WireItem) -> Result<(), BoxError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_dynamo_item(item)))
            .send()
            .await
            .map_err(|e| format!("DynamoDB put_item failed: {}", DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn get_item(&self, table: &str, key: WireItem) -> Result<Option<WireItem>, BoxError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_dynamo_item(key)))
            .send()
            .await
            .map_err(|e| format!("DynamoDB get_item failed: {}", DisplayErrorContext(&e)))?;

        match output.item {
            Some(item) => Ok(Some(from_dynamo_item(item)?)),
            None => Ok(None),
        }
    }

    async fn delete_item(&self, table: &str, key: WireItem) -> Result<(), BoxError> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_dynamo_item(key)))
            .send()
            .await
            .map_err(|e| format!("DynamoDB delete_item failed: {}", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

fn to_dynamo_item(item: WireItem) -> HashMap<String, DynamoValue> {
    item.into_iter()
        .map(|(key, value)| (key, to_dynamo(value)))
        .collect()
}

fn to_dynamo(value: AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::S(s) => DynamoValue::S(s),
        AttributeValue::N(n) => DynamoValue::N(n),
        AttributeValue::B(bytes) => DynamoValue::B(Blob::new(bytes)),
        AttributeValue::Bool(b) => DynamoValue::Bool(b),
        AttributeValue::Null(b) => DynamoValue::Null(b),
        AttributeValue::L(items) => DynamoValue::L(items.into_iter().map(to_dynamo).collect()),
        AttributeValue::M(map) => DynamoValue::M(to_dynamo_item(map)),
        AttributeValue::Ss(set) => DynamoValue::Ss(set),
        AttributeValue::Ns(set) => DynamoValue::Ns(set),
        AttributeValue::Bs(set) => DynamoValue::Bs(set.into_iter().map(Blob::new).collect()),
    }
}

fn from_dynamo_item(item: HashMap<String, DynamoValue>) -> Result<WireItem, CodecError> {
    item.into_iter()
        .map(|(key, value)| Ok((key, from_dynamo(value)?)))
        .collect()
}

fn from_dynamo(value: DynamoValue) -> Result<AttributeValue, CodecError> {
    Ok(match value {
        DynamoValue::S(s) => AttributeValue::S(s),
        DynamoValue::N(n) => AttributeValue::N(n),
        DynamoValue::B(blob) => AttributeValue::B(blob.into_inner()),
        DynamoValue::Bool(b) => AttributeValue::Bool(b),
        DynamoValue::Null(b) => AttributeValue::Null(b),
        DynamoValue::L(items) => AttributeValue::L(
            items
                .into_iter()
                .map(from_dynamo)
                .collect::<Result<_, _>>()?,
        ),
        DynamoValue::M(map) => AttributeValue::M(from_dynamo_item(map)?),
        DynamoValue::Ss(set) => AttributeValue::Ss(set),
        DynamoValue::Ns(set) => AttributeValue::Ns(set),
        DynamoValue::Bs(set) => AttributeValue::Bs(set.into_iter().map(Blob::into_inner).collect()),
        other => return Err(CodecError::UnknownTag(format!("{other:?}"))),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{operation} on table {table} failed: {source}")]
    Backend {
        operation: &'static str,
        table: String,
        #[source]
        source: BoxError,
    },
}
