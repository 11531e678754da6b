// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed adapter: one directory per actor id, holding a JSONL WAL
//! (`wal.jsonl`) and an atomically-written snapshot (`snapshot.json`).

use crate::adapter::PersistenceAdapter;
use crate::error::PersistenceError;
use crate::record::{ActorMetadata, PersistedEvent, Snapshot};
use crate::wal::Wal;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;

pub struct FileAdapter<S, E> {
    base_dir: PathBuf,
    wals: Mutex<HashMap<String, Wal<E>>>,
    metadata: Mutex<HashMap<String, ActorMetadata>>,
    _state: PhantomData<S>,
}

impl<S, E> FileAdapter<S, E> {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            wals: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
            _state: PhantomData,
        }
    }

    fn actor_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    fn wal_path(&self, id: &str) -> PathBuf {
        self.actor_dir(id).join("wal.jsonl")
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.actor_dir(id).join("snapshot.json")
    }
}

#[async_trait]
impl<S, E> PersistenceAdapter<S, E> for FileAdapter<S, E>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot<S>>, PersistenceError> {
        Snapshot::load_from(&self.snapshot_path(id))
    }

    async fn save_snapshot(&self, id: &str, snapshot: Snapshot<S>) -> Result<(), PersistenceError> {
        snapshot.save_to(&self.snapshot_path(id))
    }

    async fn load_events(
        &self,
        id: &str,
        since_version: Option<u64>,
    ) -> Result<Vec<PersistedEvent<E>>, PersistenceError> {
        let mut wals = self.wals.lock();
        let wal = self.open_or_get(&mut wals, id)?;
        let entries = wal.entries_after(since_version.unwrap_or(0))?;
        Ok(entries.into_iter().map(|entry| entry.event).collect())
    }

    async fn append_event(&self, id: &str, event: PersistedEvent<E>) -> Result<(), PersistenceError> {
        let mut wals = self.wals.lock();
        let wal = self.open_or_get(&mut wals, id)?;
        wal.append(event)?;
        // Flushed immediately: the adapter has no background flush driver of
        // its own, so each append is its own durability point rather than
        // relying on `needs_flush()`'s interval/threshold batching.
        wal.flush()?;
        wal.mark_processed(wal.write_seq());
        Ok(())
    }

    async fn list_actors(&self) -> Result<Vec<ActorMetadata>, PersistenceError> {
        Ok(self.metadata.lock().values().cloned().collect())
    }

    async fn save_metadata(&self, metadata: ActorMetadata) -> Result<(), PersistenceError> {
        self.metadata.lock().insert(metadata.id.clone(), metadata);
        Ok(())
    }

    async fn load_metadata(&self, id: &str) -> Result<Option<ActorMetadata>, PersistenceError> {
        Ok(self.metadata.lock().get(id).cloned())
    }
}

impl<S, E> FileAdapter<S, E>
where
    E: Serialize + DeserializeOwned,
{
    fn open_or_get<'a>(
        &self,
        wals: &'a mut HashMap<String, Wal<E>>,
        id: &str,
    ) -> Result<&'a mut Wal<E>, PersistenceError> {
        if !wals.contains_key(id) {
            let wal = Wal::open(&self.wal_path(id), 0)?;
            wals.insert(id.to_string(), wal);
        }
        Ok(wals.get_mut(id).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_and_replays_events_after_snapshot_version() {
        let dir = tempdir().unwrap();
        let adapter: FileAdapter<String, String> = FileAdapter::new(dir.path());

        adapter
            .append_event(
                "fetcher-1",
                PersistedEvent {
                    event: "Fetch".to_string(),
                    version: 1,
                    timestamp: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();
        adapter
            .append_event(
                "fetcher-1",
                PersistedEvent {
                    event: "Resolve".to_string(),
                    version: 2,
                    timestamp: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();

        let events = adapter.load_events("fetcher-1", None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "Fetch");
        assert_eq!(events[1].event, "Resolve");

        let events_after_1 = adapter.load_events("fetcher-1", Some(1)).await.unwrap();
        assert_eq!(events_after_1.len(), 1);
        assert_eq!(events_after_1[0].event, "Resolve");
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let adapter: FileAdapter<String, String> = FileAdapter::new(dir.path());

        adapter
            .save_snapshot("fetcher-1", Snapshot::new("Success".to_string(), 2))
            .await
            .unwrap();

        let snap = adapter.load_snapshot("fetcher-1").await.unwrap().unwrap();
        assert_eq!(snap.state, "Success");
        assert_eq!(snap.version, 2);
    }
}
