// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The actor system registry (spec §4.K): single-owner mapping from actor id
//! to a live, persisted actor, plus batch restore over a persistence
//! adapter's actor metadata listing.

use crate::cancel::TokioCancelSignal;
use crate::config::{PersistenceConfig, RuntimeConfig};
use crate::error::ActorError;
use crate::persistent::PersistentActorRef;
use emx_core::{InspectSink, Machine, SyntheticEvent, Taggable};
use emx_storage::PersistenceAdapter;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The outcome of a batch restore: which ids came back live, and which
/// failed along with why (spec §4.K `restore_many`/`restore_all`).
#[derive(Default)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<(String, ActorError)>,
}

pub struct ActorSystem<S, E> {
    adapter: Arc<dyn PersistenceAdapter<S, E>>,
    config: PersistenceConfig,
    runtime: RuntimeConfig,
    sink: Arc<dyn InspectSink>,
    clock: Arc<dyn emx_core::Clock>,
    actors: Mutex<HashMap<String, PersistentActorRef<S, E>>>,
}

impl<S, E> ActorSystem<S, E>
where
    S: Taggable + Serialize + DeserializeOwned,
    E: SyntheticEvent + Serialize + DeserializeOwned,
{
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
    ) -> Self {
        Self::with_runtime_config(adapter, config, sink, clock, RuntimeConfig::default())
    }

    /// As [`new`](Self::new), but with an explicit [`RuntimeConfig`] applied
    /// to every actor this system spawns or restores.
    pub fn with_runtime_config(
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            adapter,
            config,
            runtime,
            sink,
            clock,
            actors: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a brand-new actor under `id`. Refuses a duplicate id with
    /// `ActorError::DuplicateActor`; if the newly built actor can't be
    /// registered (duplicate detected after the fact, e.g. a racing
    /// `spawn`), it is torn down rather than left running unregistered.
    pub fn spawn(
        &self,
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
    ) -> Result<PersistentActorRef<S, E>, ActorError> {
        let id = id.into();
        {
            let actors = self.actors.lock();
            if actors.contains_key(&id) {
                return Err(ActorError::DuplicateActor(id));
            }
        }

        let actor = PersistentActorRef::spawn_with_config(
            id.clone(),
            machine,
            self.adapter.clone(),
            self.config.clone(),
            self.sink.clone(),
            self.clock.clone(),
            self.runtime,
        )?;

        let mut actors = self.actors.lock();
        if actors.contains_key(&id) {
            drop(actors);
            let actor = actor.clone();
            tokio::spawn(async move { actor.stop().await });
            return Err(ActorError::DuplicateActor(id));
        }
        actors.insert(id, actor.clone());
        Ok(actor)
    }

    /// Restores `id` from persisted state, registering it live if any
    /// snapshot or journal exists (spec §4.K).
    pub async fn restore(
        &self,
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
    ) -> Result<Option<PersistentActorRef<S, E>>, ActorError> {
        let id = id.into();
        let restored = PersistentActorRef::restore_with_config(
            id.clone(),
            machine,
            self.adapter.clone(),
            self.config.clone(),
            self.sink.clone(),
            self.clock.clone(),
            self.runtime,
        )
        .await?;

        if let Some(actor) = &restored {
            self.actors.lock().insert(id, actor.clone());
        }
        Ok(restored)
    }

    pub fn get(&self, id: &str) -> Option<PersistentActorRef<S, E>> {
        self.actors.lock().get(id).cloned()
    }

    /// Stops and deregisters `id`. A no-op if `id` isn't registered, or was
    /// already deregistered by reaching a final state on its own.
    pub async fn stop(&self, id: &str) {
        let actor = self.actors.lock().remove(id);
        if let Some(actor) = actor {
            actor.stop().await;
        }
    }

    /// Restores every id in `ids`, reporting which came back live and which
    /// failed (spec §4.K).
    pub async fn restore_many(
        &self,
        ids: &[String],
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        for id in ids {
            match self.restore(id.clone(), machine.clone()).await {
                Ok(Some(_)) => report.restored.push(id.clone()),
                Ok(None) => {}
                Err(err) => report.failed.push((id.clone(), err)),
            }
        }
        report
    }

    /// Restores every persisted actor of `machine.machine_type()`. Refuses
    /// to run if the machine carries no type tag — restoring blind would
    /// risk folding an unrelated actor's events through the wrong
    /// transition table (spec §4.K).
    pub async fn restore_all(
        &self,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
    ) -> Result<RestoreReport, ActorError> {
        let expected_type = machine.machine_type().map(str::to_string).ok_or_else(|| {
            ActorError::InvalidConfiguration("restore_all requires machine_type to be set".to_string())
        })?;

        let all_metadata = self.adapter.list_actors().await?;

        let ids: Vec<String> = all_metadata
            .into_iter()
            .filter(|m| m.machine_type.as_deref() == Some(expected_type.as_str()))
            .map(|m| m.id)
            .collect();

        Ok(self.restore_many(&ids, machine).await)
    }

    /// Stops every registered actor. Idempotent against actors that already
    /// stopped themselves by reaching a final state.
    pub async fn shutdown(&self) {
        let actors: Vec<PersistentActorRef<S, E>> = self.actors.lock().drain().map(|(_, a)| a).collect();
        for actor in actors {
            actor.stop().await;
        }
    }
}

#[cfg(test)]
#[path = "../system_tests.rs"]
mod tests;
