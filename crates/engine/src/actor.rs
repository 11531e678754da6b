// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The actor reference and its mailbox event loop (spec §4.F).
//!
//! `ActorRef<S, E>` is `Arc`-backed and cheap to clone; the event loop itself
//! runs in a detached `tokio::spawn`ed task owning the real mutable state.
//! External callers only ever see the `Arc`-shared handle.

use crate::cancel::TokioCancelSignal;
use crate::config::RuntimeConfig;
use crate::engine;
use crate::error::ActorError;
use crate::scope::Scope;
use emx_core::{InspectEvent, InspectSink, Machine, SelfRef, SyntheticEvent, Taggable};
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// The actor mailbox sender, sized per [`RuntimeConfig::mailbox_capacity`]:
/// unbounded when unset (the historical default), or a bounded channel that
/// reports [`ActorError::MailboxFull`] instead of growing forever.
pub(crate) enum MailboxTx<E> {
    Unbounded(mpsc::UnboundedSender<E>),
    Bounded(mpsc::Sender<E>),
}

impl<E> MailboxTx<E> {
    pub(crate) fn send(&self, event: E) -> Result<(), ActorError> {
        match self {
            MailboxTx::Unbounded(tx) => tx.send(event).map_err(|_| ActorError::MailboxClosed),
            MailboxTx::Bounded(tx) => match tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(ActorError::MailboxFull),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ActorError::MailboxClosed),
            },
        }
    }
}

pub(crate) enum MailboxRx<E> {
    Unbounded(mpsc::UnboundedReceiver<E>),
    Bounded(mpsc::Receiver<E>),
}

impl<E> MailboxRx<E> {
    pub(crate) async fn recv(&mut self) -> Option<E> {
        match self {
            MailboxRx::Unbounded(rx) => rx.recv().await,
            MailboxRx::Bounded(rx) => rx.recv().await,
        }
    }
}

pub(crate) fn mailbox<E>(capacity: Option<usize>) -> (MailboxTx<E>, MailboxRx<E>) {
    match capacity {
        Some(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (MailboxTx::Bounded(tx), MailboxRx::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (MailboxTx::Unbounded(tx), MailboxRx::Unbounded(rx))
        }
    }
}

struct ListenerEntry<S> {
    id: u64,
    callback: Listener<S>,
}

impl<S> Clone for ListenerEntry<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: self.callback.clone(),
        }
    }
}

struct Inner<S, E> {
    id: String,
    mailbox_tx: MailboxTx<E>,
    state_tx: watch::Sender<S>,
    stop_signal: TokioCancelSignal,
    stopped_rx: watch::Receiver<bool>,
    listeners: Mutex<Vec<ListenerEntry<S>>>,
    next_listener_id: AtomicU64,
    machine: Machine<S, E, ActorRef<S, E>, TokioCancelSignal>,
}

/// A live actor handle. Cloning shares the same underlying actor; the last
/// handle to go out of scope does not itself stop the actor — call [`stop`]
/// explicitly (spec §4.F: `stop` is an operation on the reference, not a
/// `Drop` side effect).
///
/// [`stop`]: ActorRef::stop
pub struct ActorRef<S, E> {
    inner: Arc<Inner<S, E>>,
}

impl<S, E> Clone for ActorRef<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, E> SelfRef<E> for ActorRef<S, E>
where
    S: Taggable,
    E: Taggable,
{
    fn send(&self, event: E) {
        // A full or closed mailbox is dropped silently here; callers that
        // need to observe either condition use `send_checked`.
        let _ = self.inner.mailbox_tx.send(event);
    }
}

/// A capability returned from [`ActorRef::subscribe`]. Dropping it does
/// nothing; call [`unsubscribe`](Unsubscribe::unsubscribe) explicitly.
pub struct Unsubscribe<S, E> {
    actor: ActorRef<S, E>,
    id: u64,
}

impl<S, E> Unsubscribe<S, E>
where
    S: Taggable,
{
    pub fn unsubscribe(self) {
        let mut listeners = self.actor.inner.listeners.lock();
        listeners.retain(|entry| entry.id != self.id);
    }
}

impl<S, E> ActorRef<S, E>
where
    S: Taggable + Serialize,
    E: SyntheticEvent + Serialize,
{
    /// Spawns a fresh actor from `machine`'s initial state (spec §4.F event
    /// loop step 1). Fails with [`ActorError::Machine`] if the machine is
    /// not fully provisioned.
    pub fn spawn(
        id: impl Into<String>,
        machine: Machine<S, E, ActorRef<S, E>, TokioCancelSignal>,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
    ) -> Result<Self, ActorError> {
        Self::spawn_with_config(id, machine, sink, clock, RuntimeConfig::default())
    }

    /// As [`spawn`](Self::spawn), but with an explicit [`RuntimeConfig`] —
    /// currently just the mailbox's capacity (spec §4.F).
    pub fn spawn_with_config(
        id: impl Into<String>,
        machine: Machine<S, E, ActorRef<S, E>, TokioCancelSignal>,
        sink: Arc<dyn InspectSink>,
        clock: Arc<dyn emx_core::Clock>,
        config: RuntimeConfig,
    ) -> Result<Self, ActorError> {
        if !machine.is_provisioned() {
            return Err(emx_core::MachineError::UnprovidedSlots(machine.missing_slots()).into());
        }

        let id = id.into();
        let initial = machine.initial().clone();
        let (mailbox_tx, mailbox_rx) = mailbox(config.mailbox_capacity);
        let (state_tx, _state_rx) = watch::channel(initial.clone());
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let stop_signal = TokioCancelSignal::new();

        let inner = Arc::new(Inner {
            id,
            mailbox_tx,
            state_tx,
            stop_signal,
            stopped_rx,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            machine,
        });
        let actor = ActorRef { inner };

        let loop_actor = actor.clone();
        tokio::spawn(async move {
            run(loop_actor, mailbox_rx, stopped_tx, sink, clock).await;
        });

        Ok(actor)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Enqueues `event` on the mailbox. Never blocks; fails only once the
    /// mailbox has been shut down (spec §4.F).
    pub fn send_checked(&self, event: E) -> Result<(), ActorError> {
        self.inner.mailbox_tx.send(event)
    }

    /// Current state by value.
    pub fn snapshot_sync(&self) -> S {
        self.inner.state_tx.borrow().clone()
    }

    /// Current state by value, as a suspending read (spec §4.F) — trivial
    /// here since the state cell never itself suspends, but kept distinct
    /// from `snapshot_sync` to match the spec's two-operation contract.
    pub async fn snapshot(&self) -> S {
        self.snapshot_sync()
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.snapshot_sync().tag() == tag
    }

    /// Evaluates whether `event` would currently win a transition, without
    /// mutating state (spec §4.F: `can`).
    pub async fn can(&self, event: &E) -> bool {
        let state = self.snapshot_sync();
        engine::can(&self.inner.machine, &state, event, self).await
    }

    /// A `watch` receiver over the state cell. The receiver already holds
    /// the current value; callers that want "only future changes" per spec
    /// §4.F should call `.changed().await` before the first `.borrow()`.
    pub fn changes(&self) -> watch::Receiver<S> {
        self.inner.state_tx.subscribe()
    }

    /// Installs a synchronous observer, called after every committed state
    /// update in subscription order. Observer panics are caught and
    /// swallowed (spec §4.F, §7: listener failures never affect progress).
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe<S, E>
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(ListenerEntry {
            id,
            callback: Arc::new(callback),
        });
        Unsubscribe {
            actor: self.clone(),
            id,
        }
    }

    /// Idempotent orderly shutdown: cancels the loop's stop signal and waits
    /// for the loop task to finish tearing down.
    pub async fn stop(&self) {
        self.inner.stop_signal.cancel();
        let mut stopped_rx = self.inner.stopped_rx.clone();
        let _ = stopped_rx.wait_for(|stopped| *stopped).await;
    }

    pub(crate) fn machine(&self) -> &Machine<S, E, ActorRef<S, E>, TokioCancelSignal> {
        &self.inner.machine
    }

    pub(crate) fn notify_listeners(&self, state: &S) {
        let entries: Vec<ListenerEntry<S>> = self.inner.listeners.lock().clone();
        for entry in entries {
            let callback = entry.callback.clone();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (callback)(state)));
            if result.is_err() {
                warn!(actor_id = %self.inner.id, "listener callback panicked; swallowed per spec");
            }
        }
    }

    pub(crate) fn commit_state(&self, state: S) {
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
    actor: ActorRef<S, E>,
    mut mailbox_rx: MailboxRx<E>,
    stopped_tx: watch::Sender<bool>,
    sink: Arc<dyn InspectSink>,
    clock: Arc<dyn emx_core::Clock>,
) where
    S: Taggable + Serialize,
    E: SyntheticEvent + Serialize,
{
    let id = actor.inner.id.clone();
    let machine = actor.machine().clone();

    let mut state_scope = Scope::new();
    let mut background_scope = Scope::new();

    let initial = machine.initial().clone();
    emit(
        &sink,
        InspectEvent::Spawn {
            actor_id: id.clone(),
            initial_state: to_value(&initial),
            ts_ms: clock.now_ms(),
        },
    );

    for def in machine.background_effects() {
        let ctx = emx_core::HandlerContext::new(initial.clone(), E::init_event(), actor.clone());
        let signal = background_scope.signal();
        let handler = def.handler.clone();
        background_scope.spawn(async move { handler(ctx, signal).await });
    }

    let settled = engine::settle_into(
        &machine,
        initial,
        E::init_event(),
        &actor,
        &mut state_scope,
        &id,
        &sink,
        &clock,
    )
    .await;
    let current = match settled {
        Ok((settled_state, panics)) => {
            actor.commit_state(settled_state.clone());
            for message in panics {
                report_defect(&actor, &sink, &clock, "spawn", None, message);
            }
            settled_state
        }
        Err(message) => {
            report_defect(&actor, &sink, &clock, "transition", None, message);
            teardown(&actor, &sink, &clock, &mut state_scope, &mut background_scope).await;
            let _ = stopped_tx.send(true);
            return;
        }
    };

    if machine.is_final(&current.tag()) {
        teardown(&actor, &sink, &clock, &mut state_scope, &mut background_scope).await;
        let _ = stopped_tx.send(true);
        return;
    }

    loop {
        tokio::select! {
            _ = actor.inner.stop_signal.cancelled() => {
                debug!(actor_id = %id, "actor stop requested");
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
                        report_defect::<S, E>(&actor, &sink, &clock, "transition", Some(&event), message);
                        break;
                    }
                    engine::Outcome::Applied { previous_state, new_state, is_final, settle_panics, .. } => {
                        actor.commit_state(new_state.clone());
                        emit(&sink, InspectEvent::Transition {
                            actor_id: id.clone(),
                            from_state: to_value(&previous_state),
                            to_state: to_value(&new_state),
                            event: to_value(&event),
                            ts_ms: clock.now_ms(),
                        });
                        actor.notify_listeners(&new_state);

                        let mut defect = false;
                        for message in settle_panics {
                            report_defect::<S, E>(&actor, &sink, &clock, "spawn", Some(&event), message);
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

async fn teardown<S, E>(
    actor: &ActorRef<S, E>,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
    state_scope: &mut Scope,
    background_scope: &mut Scope,
) where
    S: Taggable + Serialize,
    E: SyntheticEvent + Serialize,
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
    actor: &ActorRef<S, E>,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
    phase: &'static str,
    event: Option<&E>,
    message: String,
) where
    S: Taggable + Serialize,
    E: Serialize,
{
    error!(actor_id = %actor.inner.id, phase, %message, "actor defect");
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
#[path = "../actor_tests.rs"]
mod tests;
