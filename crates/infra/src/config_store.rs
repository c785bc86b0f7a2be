//! Configuration store: whole collections of JSON records by a stable name.
//!
//! This is the shape legacy deployments kept their promo codes, shipping
//! zones/methods and withdrawal requests in. The engine itself runs on
//! per-aggregate event streams; collections are only read to seed those
//! streams and written as snapshots on export.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::command_dispatcher::DispatchError;

pub const PROMO_CODES: &str = "promo_codes";
pub const SHIPPING_ZONES: &str = "shipping_zones";
pub const SHIPPING_METHODS: &str = "shipping_methods";
pub const WITHDRAWAL_REQUESTS: &str = "withdrawal_requests";

pub const COLLECTIONS: [&str; 4] = [PROMO_CODES, SHIPPING_ZONES, SHIPPING_METHODS, WITHDRAWAL_REQUESTS];

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("configuration store unavailable: {0}")]
    Unavailable(String),
}

impl From<ConfigStoreError> for DispatchError {
    fn from(value: ConfigStoreError) -> Self {
        DispatchError::Configuration(value.to_string())
    }
}

pub trait ConfigurationStore: Send + Sync {
    /// Records of a collection; a collection never saved is empty.
    fn load(&self, collection: &str) -> Result<Vec<JsonValue>, ConfigStoreError>;

    /// Replace a whole collection.
    fn save(&self, collection: &str, records: Vec<JsonValue>) -> Result<(), ConfigStoreError>;

    /// Replace several collections in one write; on error none is replaced.
    fn save_all(&self, collections: Vec<(&str, Vec<JsonValue>)>) -> Result<(), ConfigStoreError>;
}

fn ensure_known(collection: &str) -> Result<(), ConfigStoreError> {
    if COLLECTIONS.contains(&collection) {
        Ok(())
    } else {
        Err(ConfigStoreError::UnknownCollection(collection.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryConfigurationStore {
    collections: RwLock<BTreeMap<String, Vec<JsonValue>>>,
}

impl InMemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigurationStore for InMemoryConfigurationStore {
    fn load(&self, collection: &str) -> Result<Vec<JsonValue>, ConfigStoreError> {
        ensure_known(collection)?;
        let collections = self
            .collections
            .read()
            .map_err(|_| ConfigStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn save(&self, collection: &str, records: Vec<JsonValue>) -> Result<(), ConfigStoreError> {
        ensure_known(collection)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| ConfigStoreError::Unavailable("lock poisoned".to_string()))?;
        collections.insert(collection.to_string(), records);
        Ok(())
    }

    fn save_all(&self, batch: Vec<(&str, Vec<JsonValue>)>) -> Result<(), ConfigStoreError> {
        for (collection, _) in &batch {
            ensure_known(collection)?;
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|_| ConfigStoreError::Unavailable("lock poisoned".to_string()))?;
        for (collection, records) in batch {
            collections.insert(collection.to_string(), records);
        }
        Ok(())
    }
}

/// Load a collection as typed records.
pub fn load_records<T>(store: &dyn ConfigurationStore, collection: &str) -> Result<Vec<T>, DispatchError>
where
    T: DeserializeOwned,
{
    store
        .load(collection)?
        .into_iter()
        .enumerate()
        .map(|(idx, value)| {
            serde_json::from_value(value)
                .map_err(|e| DispatchError::Deserialize(format!("{collection}[{idx}]: {e}")))
        })
        .collect()
}

/// Save typed records as a collection.
pub fn save_records<T>(store: &dyn ConfigurationStore, collection: &str, records: &[T]) -> Result<(), DispatchError>
where
    T: Serialize,
{
    Ok(store.save(collection, to_values(collection, records)?)?)
}

/// Serialize typed records for a collection without writing them.
pub fn to_values<T>(collection: &str, records: &[T]) -> Result<Vec<JsonValue>, DispatchError>
where
    T: Serialize,
{
    records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DispatchError::Configuration(format!("{collection}: {e}")))
}
