// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory adapter for tests and ephemeral (non-durable) actors.

use crate::adapter::PersistenceAdapter;
use crate::error::PersistenceError;
use crate::record::{ActorMetadata, PersistedEvent, Snapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Default)]
struct Streams<S, E> {
    snapshots: HashMap<String, Snapshot<S>>,
    events: HashMap<String, Vec<PersistedEvent<E>>>,
    metadata: HashMap<String, ActorMetadata>,
}

pub struct InMemoryAdapter<S, E> {
    streams: Mutex<Streams<S, E>>,
}

impl<S, E> Default for InMemoryAdapter<S, E> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(Streams {
                snapshots: HashMap::new(),
                events: HashMap::new(),
                metadata: HashMap::new(),
            }),
        }
    }
}

impl<S, E> InMemoryAdapter<S, E> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<S, E> PersistenceAdapter<S, E> for InMemoryAdapter<S, E>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot<S>>, PersistenceError> {
        Ok(self.streams.lock().snapshots.get(id).cloned())
    }

    async fn save_snapshot(&self, id: &str, snapshot: Snapshot<S>) -> Result<(), PersistenceError> {
        self.streams.lock().snapshots.insert(id.to_string(), snapshot);
        Ok(())
    }

    async fn load_events(
        &self,
        id: &str,
        since_version: Option<u64>,
    ) -> Result<Vec<PersistedEvent<E>>, PersistenceError> {
        let floor = since_version.unwrap_or(0);
        Ok(self
            .streams
            .lock()
            .events
            .get(id)
            .map(|events| events.iter().filter(|e| e.version > floor).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_event(&self, id: &str, event: PersistedEvent<E>) -> Result<(), PersistenceError> {
        self.streams
            .lock()
            .events
            .entry(id.to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn list_actors(&self) -> Result<Vec<ActorMetadata>, PersistenceError> {
        Ok(self.streams.lock().metadata.values().cloned().collect())
    }

    async fn save_metadata(&self, metadata: ActorMetadata) -> Result<(), PersistenceError> {
        self.streams.lock().metadata.insert(metadata.id.clone(), metadata);
        Ok(())
    }

    async fn load_metadata(&self, id: &str) -> Result<Option<ActorMetadata>, PersistenceError> {
        Ok(self.streams.lock().metadata.get(id).cloned())
    }
}
