//! # State Store
//!
//! Arbitrary application state as JSON, independent of the job queue. Two
//! layouts:
//!
//! - plain keys `namespace:name`, optionally expiring ([`StateStore::set`] /
//!   [`StateStore::get`]);
//! - fields of one hash keyed by `namespace`, which never expire
//!   ([`StateStore::hset`] / [`StateStore::hget`]).
//!
//! Reads of a missing key are not errors: they report `false` and leave the
//! output untouched.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::store::{KvStore, StoreError};

#[derive(Debug, Error)]
pub enum StateError {
    /// The value could not be turned into JSON or read back from it.
    #[error("cannot (de)serialize state for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StateResult<T> = Result<T, StateError>;

/// Builds the plain key for `name` inside `namespace`.
pub fn state_key(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}

/// Names field `field` of hash `namespace` in errors.
fn field_label(namespace: &str, field: &str) -> String {
    format!("{}/{}", namespace, field)
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> StateResult<String> {
    serde_json::to_string(value).map_err(|source| StateError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StateResult<T> {
    serde_json::from_str(raw).map_err(|source| StateError::Serialization {
        key: key.to_string(),
        source,
    })
}

#[derive(Clone)]
pub struct StateStore<S> {
    store: S,
}

impl<S: KvStore> StateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stores `value` at `namespace:name`, replacing what was there.
    /// `ttl = None` keeps it until overwritten or deleted.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        name: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> StateResult<()> {
        let key = state_key(namespace, name);
        let json = encode(&key, value)?;
        self.store.set(&key, &json, ttl).await?;
        Ok(())
    }

    /// Reads `namespace:name` into `out`.
    ///
    /// Returns `false` and leaves `out` unchanged when the key does not
    /// exist. A stored value that does not deserialize into `T` is an error.
    #[instrument(skip(self, out))]
    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, name: &str, out: &mut T) -> StateResult<bool> {
        match self.fetch(namespace, name).await? {
            Some(value) => {
                *out = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Value-returning form of [`StateStore::get`].
    pub async fn fetch<T: DeserializeOwned>(&self, namespace: &str, name: &str) -> StateResult<Option<T>> {
        let key = state_key(namespace, name);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Deletes `namespace:name`, returning whether it existed.
    pub async fn delete(&self, namespace: &str, name: &str) -> StateResult<bool> {
        Ok(self.store.delete(&state_key(namespace, name)).await?)
    }

    /// Stores `value` as field `field` of the hash `namespace`.
    #[instrument(skip(self, value))]
    pub async fn hset<T: Serialize + ?Sized>(&self, namespace: &str, field: &str, value: &T) -> StateResult<()> {
        let json = encode(&field_label(namespace, field), value)?;
        self.store.hset(namespace, field, &json).await?;
        Ok(())
    }

    /// Reads field `field` of the hash `namespace` into `out`, with the same
    /// missing-key contract as [`StateStore::get`].
    #[instrument(skip(self, out))]
    pub async fn hget<T: DeserializeOwned>(&self, namespace: &str, field: &str, out: &mut T) -> StateResult<bool> {
        match self.hfetch(namespace, field).await? {
            Some(value) => {
                *out = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Value-returning form of [`StateStore::hget`].
    pub async fn hfetch<T: DeserializeOwned>(&self, namespace: &str, field: &str) -> StateResult<Option<T>> {
        match self.store.hget(namespace, field).await? {
            Some(raw) => Ok(Some(decode(&field_label(namespace, field), &raw)?)),
            None => Ok(None),
        }
    }
}
