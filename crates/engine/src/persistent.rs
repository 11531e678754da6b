// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent actor: versioned journaling and snapshotting layered over
//! the same transition engine the plain [`crate::actor::ActorRef`] uses
//! (spec §4.J).
//!
//! Persistence adds steps the plain actor loop doesn't have — version
//! bump, journal append, metadata update, snapshot scheduling — so rather
//! than bolt hooks onto `ActorRef`'s loop this is a sibling event loop,
//! grounded on the same structure as `actor::run`.

use crate::actor::{mailbox, MailboxRx, MailboxTx};
use crate::cancel::TokioCancelSignal;
use crate::config::{PersistenceConfig, RuntimeConfig, SnapshotSchedule};
use crate::engine;
use crate::error::ActorError;
use crate::scope::Scope;
use chrono::{DateTime, Utc};
use emx_core::{InspectEvent, InspectSink, Machine, SelfRef, SyntheticEvent, Taggable};
use emx_storage::{ActorMetadata, PersistedEvent, PersistenceAdapter, PersistenceError, Snapshot};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

struct Inner<S, E> {
    id: String,
    created_at: DateTime<Utc>,
    mailbox_tx: MailboxTx<E>,
    state_tx: watch::Sender<S>,
    version: AtomicU64,
    stop_signal: TokioCancelSignal,
    stopped_rx: watch::Receiver<bool>,
    listeners: Mutex<Vec<Arc<dyn Fn(&S) + Send + Sync>>>,
    machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
    adapter: Arc<dyn PersistenceAdapter<S, E>>,
}

/// A live, persisted actor handle. Cheap to clone; the event loop runs
/// detached in its own task, as with [`crate::actor::ActorRef`].
pub struct PersistentActorRef<S, E> {
    inner: Arc<Inner<S, E>>,
}

impl<S, E> Clone for PersistentActorRef<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, E> SelfRef<E> for PersistentActorRef<S, E>
where
    S: Taggable,
    E: Taggable,
{
    fn send(&self, event: E) {
        let _ = self.inner.mailbox_tx.send(event);
    }
}

impl<S, E> PersistentActorRef<S, E>
where
    S: Taggable + Serialize + DeserializeOwned,
    E: SyntheticEvent + Serialize + DeserializeOwned,
{
    /// Starts a brand-new persistent actor at `machine.initial()`, version 0
    /// (spec §4.J restore table, "missing snapshot + missing journal").
    pub fn spawn(
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
    ) -> Result<Self, ActorError> {
        Self::spawn_with_config(id, machine, adapter, config, sink, clock, RuntimeConfig::default())
    }

    /// As [`spawn`](Self::spawn), but with an explicit [`RuntimeConfig`] —
    /// currently just the mailbox's capacity (spec §4.F).
    pub fn spawn_with_config(
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
        runtime: RuntimeConfig,
    ) -> Result<Self, ActorError> {
        let initial = machine.initial().clone();
        let (actor, mailbox_rx, stopped_tx) =
            Self::build(id, machine, adapter, 0, initial, runtime)?;
        Self::launch(actor.clone(), mailbox_rx, stopped_tx, sink, clock, config);
        Ok(actor)
    }

    /// Loads any persisted snapshot/journal for `id` and, if present,
    /// starts a live actor restored from it (spec §4.J Restore). Returns
    /// `Ok(None)` if neither a snapshot nor journaled events exist — "not
    /// an error; produces 'no persisted actor'".
    pub async fn restore(
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
    ) -> Result<Option<Self>, ActorError> {
        Self::restore_with_config(id, machine, adapter, config, sink, clock, RuntimeConfig::default()).await
    }

    /// As [`restore`](Self::restore), but with an explicit [`RuntimeConfig`]
    /// — currently just the mailbox's capacity (spec §4.F).
    pub async fn restore_with_config(
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        config: PersistenceConfig,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
        runtime: RuntimeConfig,
    ) -> Result<Option<Self>, ActorError> {
        let id = id.into();
        let snapshot = adapter.load_snapshot(&id).await?;
        let since_version = snapshot.as_ref().map(|s| s.version);
        let events = adapter.load_events(&id, since_version).await?;

        if snapshot.is_none() && events.is_empty() {
            return Ok(None);
        }

        let (mut state, mut version) = match snapshot {
            Some(Snapshot { state, version, .. }) => (state, version),
            None => (machine.initial().clone(), 0),
        };

        let (actor, mailbox_rx, stopped_tx) =
            Self::build(id, machine.clone(), adapter, version, state.clone(), runtime)?;

        // Replay is pure-only: guards and handlers execute, but scoped
        // spawn effects never run (spec §4.J). `actor` is a real `SelfRef`
        // here, but its loop task has not started yet — any self-send a
        // handler performs during replay simply queues on the mailbox and
        // is processed once the loop starts below.
        for persisted in events {
            state = engine::apply_pure(&machine, state, &persisted.event, &actor)
                .await
                .map_err(ActorError::ReplayDefect)?;
            version = persisted.version;
        }
        actor.commit_state(state);
        actor.inner.version.store(version, Ordering::Release);

        Self::launch(actor.clone(), mailbox_rx, stopped_tx, sink, clock, config);
        Ok(Some(actor))
    }

    fn build(
        id: impl Into<String>,
        machine: Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
        adapter: Arc<dyn PersistenceAdapter<S, E>>,
        version: u64,
        state: S,
        runtime: RuntimeConfig,
    ) -> Result<(Self, MailboxRx<E>, watch::Sender<bool>), ActorError> {
        if !machine.is_provisioned() {
            return Err(emx_core::MachineError::UnprovidedSlots(machine.missing_slots()).into());
        }

        let id = id.into();
        let (mailbox_tx, mailbox_rx) = mailbox(runtime.mailbox_capacity);
        let (state_tx, _state_rx) = watch::channel(state);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let stop_signal = TokioCancelSignal::new();

        let inner = Arc::new(Inner {
            id,
            created_at: Utc::now(),
            mailbox_tx,
            state_tx,
            version: AtomicU64::new(version),
            stop_signal,
            stopped_rx,
            listeners: Mutex::new(Vec::new()),
            machine,
            adapter,
        });

        Ok((PersistentActorRef { inner }, mailbox_rx, stopped_tx))
    }

    fn launch(
        actor: Self,
        mailbox_rx: MailboxRx<E>,
        stopped_tx: watch::Sender<bool>,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
        config: PersistenceConfig,
    ) {
        tokio::spawn(async move {
            run(actor, mailbox_rx, stopped_tx, sink, clock, config).await;
        });
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    pub fn send_checked(&self, event: E) -> Result<(), ActorError> {
        self.inner.mailbox_tx.send(event)
    }

    pub fn snapshot_sync(&self) -> S {
        self.inner.state_tx.borrow().clone()
    }

    pub async fn snapshot(&self) -> S {
        self.snapshot_sync()
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.snapshot_sync().tag() == tag
    }

    pub async fn can(&self, event: &E) -> bool {
        let state = self.snapshot_sync();
        engine::can(&self.inner.machine, &state, event, self).await
    }

    pub fn changes(&self) -> watch::Receiver<S> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(callback));
    }

    pub async fn stop(&self) {
        self.inner.stop_signal.cancel();
        let mut stopped_rx = self.inner.stopped_rx.clone();
        let _ = stopped_rx.wait_for(|stopped| *stopped).await;
    }

    /// Forces an immediate, synchronous snapshot write, bypassing the
    /// background snapshot worker's schedule (spec §10.6: a durability
    /// barrier for callers that just enqueued an event and can't wait for
    /// the next scheduled tick).
    pub async fn persist_now(&self) -> Result<(), PersistenceError> {
        let state = self.snapshot_sync();
        let version = self.version();
        self.inner
            .adapter
            .save_snapshot(&self.inner.id, Snapshot::new(state, version))
            .await
    }

    fn notify_listeners(&self, state: &S) {
        let entries: Vec<Arc<dyn Fn(&S) + Send + Sync>> = self.inner.listeners.lock().clone();
        for callback in entries {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (callback)(state)));
            if result.is_err() {
                warn!(actor_id = %self.inner.id, "listener callback panicked; swallowed per spec");
            }
        }
    }

    fn commit_state(&self, state: S) {
        self.inner.state_tx.send_replace(state);
    }
}

fn emit(sink: &Arc<dyn InspectSink>, event: InspectEvent) {
    sink.on_inspect(event);
}

fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

async fn run<S, E>(
    actor: PersistentActorRef<S, E>,
    mut mailbox_rx: MailboxRx<E>,
    stopped_tx: watch::Sender<bool>,
    sink: Arc<dyn InspectSink>,
    clock: Arc<dyn emx_core::Clock>,
    config: PersistenceConfig,
) where
    S: Taggable + Serialize + DeserializeOwned,
    E: SyntheticEvent + Serialize + DeserializeOwned,
{
    let id = actor.inner.id.clone();
    let machine = actor.inner.machine.clone();
    let mut state_scope = Scope::new();
    let mut background_scope = Scope::new();

    emit(
        &sink,
        InspectEvent::Spawn {
            actor_id: id.clone(),
            initial_state: to_value(&actor.snapshot_sync()),
            ts_ms: clock.now_ms(),
        },
    );

    for def in machine.background_effects() {
        let ctx = emx_core::HandlerContext::new(actor.snapshot_sync(), E::init_event(), actor.clone());
        let signal = background_scope.signal();
        let handler = def.handler.clone();
        background_scope.spawn(async move { handler(ctx, signal).await });
    }

    let initial = actor.snapshot_sync();
    match engine::settle_into(
        &machine,
        initial,
        E::init_event(),
        &actor,
        &mut state_scope,
        &id,
        &sink,
        &clock,
    )
    .await
    {
        Ok((settled_state, panics)) => {
            actor.commit_state(settled_state.clone());
            for message in panics {
                report_defect(&actor, &sink, &clock, "spawn", None, message);
            }
            write_metadata(&actor, &machine).await;
        }
        Err(message) => {
            report_defect(&actor, &sink, &clock, "transition", None, message);
            teardown(&actor, &sink, &clock, &mut state_scope, &mut background_scope).await;
            let _ = stopped_tx.send(true);
            return;
        }
    }

    if machine.is_final(&actor.snapshot_sync().tag()) {
        teardown(&actor, &sink, &clock, &mut state_scope, &mut background_scope).await;
        let _ = stopped_tx.send(true);
        return;
    }

    let mut events_since_snapshot: u64 = 0;
    let mut last_snapshot_at = Instant::now();

    loop {
        tokio::select! {
            _ = actor.inner.stop_signal.cancelled() => {
                debug!(actor_id = %id, "persistent actor stop requested");
                break;
            }
            maybe_event = mailbox_rx.recv() => {
                let Some(event) = maybe_event else {
                    debug!(actor_id = %id, "mailbox closed");
                    break;
                };

                let state = actor.snapshot_sync();
                emit(&sink, InspectEvent::Event {
                    actor_id: id.clone(),
                    state: to_value(&state),
                    event: to_value(&event),
                    ts_ms: clock.now_ms(),
                });

                match engine::apply(&machine, &state, &event, &actor, &mut state_scope, &id, &sink, &clock).await {
                    engine::Outcome::Ignored => continue,
                    engine::Outcome::HandlerPanicked(message) => {
                        report_defect(&actor, &sink, &clock, "transition", Some(&event), message);
                        break;
                    }
                    engine::Outcome::Applied { previous_state, new_state, is_final, settle_panics, .. } => {
                        let version = actor.inner.version.fetch_add(1, Ordering::AcqRel) + 1;

                        if config.journal_events {
                            let persisted = PersistedEvent { event: event.clone(), version, timestamp: Utc::now() };
                            if let Err(err) = actor.inner.adapter.append_event(&id, persisted).await {
                                warn!(actor_id = %id, %err, "journal append failed; continuing (at-least-once on recovery)");
                            }
                        }

                        actor.commit_state(new_state.clone());
                        emit(&sink, InspectEvent::Transition {
                            actor_id: id.clone(),
                            from_state: to_value(&previous_state),
                            to_state: to_value(&new_state),
                            event: to_value(&event),
                            ts_ms: clock.now_ms(),
                        });
                        actor.notify_listeners(&new_state);
                        write_metadata(&actor, &machine).await;

                        events_since_snapshot += 1;
                        let due = match &config.snapshot_schedule {
                            SnapshotSchedule::EveryEvents(n) => events_since_snapshot >= *n,
                            SnapshotSchedule::EveryDuration(d) => last_snapshot_at.elapsed() >= *d,
                            SnapshotSchedule::Manual => false,
                        };
                        if due {
                            if let Err(err) = actor.persist_now().await {
                                warn!(actor_id = %id, %err, "scheduled snapshot write failed; continuing");
                            }
                            events_since_snapshot = 0;
                            last_snapshot_at = Instant::now();
                        }

                        let mut defect = false;
                        for message in settle_panics {
                            report_defect(&actor, &sink, &clock, "spawn", Some(&event), message);
                            defect = true;
                        }
                        if defect || is_final {
                            break;
                        }
                    }
                }
            }
        }
    }

    teardown(&actor, &sink, &clock, &mut state_scope, &mut background_scope).await;
    let _ = stopped_tx.send(true);
}

async fn write_metadata<S, E>(
    actor: &PersistentActorRef<S, E>,
    machine: &Machine<S, E, PersistentActorRef<S, E>, TokioCancelSignal>,
) where
    S: Taggable + Serialize + DeserializeOwned,
    E: SyntheticEvent + Serialize + DeserializeOwned,
{
    let state = actor.snapshot_sync();
    let metadata = ActorMetadata {
        id: actor.inner.id.clone(),
        machine_type: machine.machine_type().map(str::to_string),
        created_at: actor.inner.created_at,
        last_activity_at: Utc::now(),
        version: actor.version(),
        state_tag: state.tag().as_ref().to_string(),
    };
    if let Err(err) = actor.inner.adapter.save_metadata(metadata).await {
        warn!(actor_id = %actor.inner.id, %err, "metadata write failed; continuing");
    }
}

async fn teardown<S, E>(
    actor: &PersistentActorRef<S, E>,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
    state_scope: &mut Scope,
    background_scope: &mut Scope,
) where
    S: Taggable + Serialize + DeserializeOwned,
    E: SyntheticEvent + Serialize + DeserializeOwned,
{
    let final_state = actor.snapshot_sync();
    for message in state_scope.close().await {
        error!(actor_id = %actor.inner.id, %message, "spawn effect panicked during teardown");
    }
    for message in background_scope.close().await {
        error!(actor_id = %actor.inner.id, %message, "background effect panicked during teardown");
    }
    emit(
        sink,
        InspectEvent::Stop {
            actor_id: actor.inner.id.clone(),
            final_state: to_value(&final_state),
            ts_ms: clock.now_ms(),
        },
    );
}

fn report_defect<S, E>(
    actor: &PersistentActorRef<S, E>,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
    phase: &'static str,
    event: Option<&E>,
    message: String,
) where
    S: Taggable + Serialize,
    E: Serialize,
{
    error!(actor_id = %actor.inner.id, phase, %message, "persistent actor defect");
    let state = actor.snapshot_sync();
    emit(
        sink,
        InspectEvent::Error {
            actor_id: actor.inner.id.clone(),
            phase,
            state: to_value(&state),
            event: event.map(to_value),
            error: message,
            ts_ms: clock.now_ms(),
        },
    );
}

#[cfg(test)]
#[path = "../persistent_tests.rs"]
mod tests;
