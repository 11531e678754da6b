// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistence adapter contract (spec §4.I, §6). Adapters are assumed
//! internally thread-safe, one logical stream per actor id.

use crate::error::PersistenceError;
use crate::record::{ActorMetadata, PersistedEvent, Snapshot};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[async_trait]
pub trait PersistenceAdapter<S, E>: Send + Sync
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot<S>>, PersistenceError>;

    async fn save_snapshot(&self, id: &str, snapshot: Snapshot<S>) -> Result<(), PersistenceError>;

    async fn load_events(
        &self,
        id: &str,
        since_version: Option<u64>,
    ) -> Result<Vec<PersistedEvent<E>>, PersistenceError>;

    async fn append_event(&self, id: &str, event: PersistedEvent<E>) -> Result<(), PersistenceError>;

    /// Optional operations (spec §6): adapters that don't track a registry
    /// may accept the defaults.
    async fn list_actors(&self) -> Result<Vec<ActorMetadata>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn save_metadata(&self, _metadata: ActorMetadata) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn load_metadata(&self, _id: &str) -> Result<Option<ActorMetadata>, PersistenceError> {
        Ok(None)
    }
}
