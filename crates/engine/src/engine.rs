// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure transition resolution + application algorithm (spec §4.E),
//! coupled to the scoped-effect lifecycle it drives (spec §4.E.5, §5) and
//! the `always`-transition settling cascade (spec §9 Open Question (ii)).

use crate::cancel::TokioCancelSignal;
use crate::scope::Scope;
use emx_core::{
    GuardExpr, HandlerContext, InspectEvent, InspectSink, Machine, Params, SelfRef, SyntheticEvent,
    Taggable,
};
use serde::Serialize;
use std::sync::Arc;

pub(crate) enum Outcome<S> {
    /// No candidate transition's guard held; caller must not mutate state.
    Ignored,
    Applied {
        previous_state: S,
        new_state: S,
        lifecycle_ran: bool,
        is_final: bool,
        /// Panic messages surfaced while settling into `new_state`: spawn
        /// effects interrupted while closing the outgoing scope, or an
        /// `always`-transition handler mid-cascade. Spec §7 treats any of
        /// these as an actor defect — the caller reports an `error`
        /// inspection event per message (`phase: "spawn"`) and then stops
        /// the actor, even though `new_state` here is otherwise valid.
        settle_panics: Vec<String>,
    },
    /// The winning transition's handler itself panicked. The state is left
    /// ambiguous, so the caller must treat this as fatal to the actor (spec
    /// §7, `phase: "transition"`) rather than attempt to apply a new state.
    HandlerPanicked(String),
}

/// Resolves `(current_state.tag(), event.tag())` against the machine's
/// transition index and applies the first transition whose guard holds. If
/// the winning transition changes the lifecycle (tag change or `reenter`),
/// settles the new state into its scope via [`settle_into`] before
/// returning.
pub(crate) async fn apply<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    current_state: &S,
    event: &E,
    self_ref: &R,
    scope: &mut Scope,
    actor_id: &str,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
) -> Outcome<S>
where
    S: Taggable + Serialize,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    let state_tag = current_state.tag();
    let event_tag = event.tag();

    let winner = {
        let index = machine.transition_index();
        let candidates = index.find(&state_tag, &event_tag);
        let mut winner = None;
        for candidate in candidates {
            let ctx = HandlerContext::new(current_state.clone(), event.clone(), self_ref.clone());
            let guard_holds = match &candidate.guard {
                None => true,
                Some(guard) => eval_guard(machine, guard, &ctx).await,
            };
            if guard_holds {
                winner = Some(candidate.clone());
                break;
            }
        }
        winner
    };

    let Some(transition) = winner else {
        return Outcome::Ignored;
    };

    let ctx = HandlerContext::new(current_state.clone(), event.clone(), self_ref.clone());
    let new_state = match run_handler(transition.handler.clone(), ctx).await {
        Ok(new_state) => new_state,
        Err(message) => return Outcome::HandlerPanicked(message),
    };

    let lifecycle_ran = new_state.tag() != state_tag || transition.reenter;

    let (settled_state, settle_panics) = if lifecycle_ran {
        match settle_into(
            machine,
            new_state,
            E::enter_event(),
            self_ref,
            scope,
            actor_id,
            sink,
            clock,
        )
        .await
        {
            Ok((settled, panics)) => (settled, panics),
            Err(message) => return Outcome::HandlerPanicked(message),
        }
    } else {
        (new_state, Vec::new())
    };

    let is_final = machine.is_final(&settled_state.tag());

    Outcome::Applied {
        previous_state: current_state.clone(),
        new_state: settled_state,
        lifecycle_ran,
        is_final,
        settle_panics,
    }
}

/// Evaluates whether `event` would win a transition against `state` without
/// running any handler — the pure half of [`apply`], used by `ActorRef::can`
/// (spec §4.F).
pub(crate) async fn can<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    state: &S,
    event: &E,
    self_ref: &R,
) -> bool
where
    S: Taggable,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    let state_tag = state.tag();
    let event_tag = event.tag();
    let index = machine.transition_index();
    let candidates = index.find(&state_tag, &event_tag);
    for candidate in candidates {
        let ctx = HandlerContext::new(state.clone(), event.clone(), self_ref.clone());
        let guard_holds = match &candidate.guard {
            None => true,
            Some(guard) => eval_guard(machine, guard, &ctx).await,
        };
        if guard_holds {
            return true;
        }
    }
    false
}

/// Closes `scope`, replaces it, settles the `always`-transition cascade for
/// `state` (spec §9 Open Question (ii): applied after the state cell is set
/// and before the new scope opens, re-looping until none fire), then forks
/// spawn effects for the finally-settled state tag. Returns the panic
/// messages collected from the closed scope; the caller is responsible for
/// actually replacing its own state cell with the returned settled state —
/// this function only mutates `scope`.
///
/// Used both by `apply` (on a lifecycle-changing transition) and by the
/// actor's initial-spawn path (entering `machine.initial()` for the first
/// time, with an already-empty scope).
pub(crate) async fn settle_into<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    state: S,
    entry_event: E,
    self_ref: &R,
    scope: &mut Scope,
    actor_id: &str,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
) -> Result<(S, Vec<String>), String>
where
    S: Taggable + Serialize,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    let panics = scope.close().await;
    *scope = Scope::new();

    let state = settle_pure(machine, state, entry_event.clone(), self_ref).await?;
    fork_spawn_effects(machine, &state, entry_event, self_ref, scope, actor_id, sink, clock);
    Ok((state, panics))
}

/// The `always`-transition cascade (spec §9 Open Question (ii)) with no
/// scope attached: re-applies guard-cascaded eventless transitions for the
/// current state tag until none fire. Used both by [`settle_into`] (live
/// actor operation) and by persistence replay (spec §4.J: "guards and
/// handlers execute, but scoped spawn effects are NOT run during replay").
pub(crate) async fn settle_pure<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    mut state: S,
    entry_event: E,
    self_ref: &R,
) -> Result<S, String>
where
    S: Taggable,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    loop {
        let tag = state.tag();
        let candidates: Vec<_> = machine.transition_index().find_always(&tag).to_vec();
        let mut fired = None;
        for candidate in &candidates {
            let ctx = HandlerContext::new(state.clone(), entry_event.clone(), self_ref.clone());
            let guard_holds = match &candidate.guard {
                None => true,
                Some(guard) => eval_guard(machine, guard, &ctx).await,
            };
            if guard_holds {
                fired = Some(candidate.clone());
                break;
            }
        }
        let Some(transition) = fired else {
            break;
        };
        let ctx = HandlerContext::new(state.clone(), entry_event.clone(), self_ref.clone());
        state = run_handler(transition.handler.clone(), ctx).await?;
    }
    Ok(state)
}

/// Resolves and applies a single transition against `state` with no scope
/// attached — no spawn effects are forked on lifecycle change, only the
/// pure `always`-cascade runs (spec §4.J replay semantics). Returns `state`
/// unchanged if no candidate transition's guard holds.
pub(crate) async fn apply_pure<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    state: S,
    event: &E,
    self_ref: &R,
) -> Result<S, String>
where
    S: Taggable,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    let state_tag = state.tag();
    let event_tag = event.tag();

    let winner = {
        let index = machine.transition_index();
        let candidates = index.find(&state_tag, &event_tag);
        let mut winner = None;
        for candidate in candidates {
            let ctx = HandlerContext::new(state.clone(), event.clone(), self_ref.clone());
            let guard_holds = match &candidate.guard {
                None => true,
                Some(guard) => eval_guard(machine, guard, &ctx).await,
            };
            if guard_holds {
                winner = Some(candidate.clone());
                break;
            }
        }
        winner
    };

    let Some(transition) = winner else {
        return Ok(state);
    };

    let ctx = HandlerContext::new(state.clone(), event.clone(), self_ref.clone());
    let new_state = run_handler(transition.handler.clone(), ctx).await?;
    let lifecycle_ran = new_state.tag() != state_tag || transition.reenter;

    if lifecycle_ran {
        settle_pure(machine, new_state, E::enter_event(), self_ref).await
    } else {
        Ok(new_state)
    }
}

/// Runs a transition (or `always`-transition) handler isolated in its own
/// task, so a panic inside user code is caught rather than unwinding the
/// actor loop (spec §7: transition defects leave the state ambiguous and
/// must be reported, not silently propagated as a Rust panic).
async fn run_handler<S, E, R>(
    handler: emx_core::TransitionHandler<S, E, R>,
    ctx: HandlerContext<S, E, R>,
) -> Result<S, String>
where
    S: Taggable,
    E: Taggable,
    R: SelfRef<E>,
{
    match tokio::spawn(async move { handler(ctx).await }).await {
        Ok(new_state) => Ok(new_state),
        Err(join_err) if join_err.is_panic() => Err(panic_message(join_err.into_panic())),
        Err(_) => Err("transition handler task was cancelled".to_string()),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Forks every spawn effect registered for `state`'s tag onto `scope`, in
/// registration order, under the `$init`/`$enter` event supplied by the
/// caller, and notifies `sink` of each one forked (spec §6 `effect` shape).
pub(crate) fn fork_spawn_effects<S, E, R>(
    machine: &Machine<S, E, R, TokioCancelSignal>,
    state: &S,
    entry_event: E,
    self_ref: &R,
    scope: &mut Scope,
    actor_id: &str,
    sink: &Arc<dyn InspectSink>,
    clock: &Arc<dyn emx_core::Clock>,
) where
    S: Taggable + Serialize,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    let state_tag = state.tag();
    for def in machine.spawn_effects() {
        if def.state_tag != state_tag {
            continue;
        }
        let ctx = HandlerContext::new(state.clone(), entry_event.clone(), self_ref.clone());
        let signal = scope.signal();
        let handler = def.handler.clone();
        scope.spawn(async move { handler(ctx, signal).await });
        sink.on_inspect(InspectEvent::Effect {
            actor_id: actor_id.to_string(),
            effect_type: "spawn",
            state: serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
            ts_ms: clock.now_ms(),
        });
    }
}

fn eval_guard<'a, S, E, R>(
    machine: &'a Machine<S, E, R, TokioCancelSignal>,
    guard: &'a GuardExpr,
    ctx: &'a HandlerContext<S, E, R>,
) -> emx_core::BoxFuture<'a, bool>
where
    S: Taggable,
    E: SyntheticEvent,
    R: SelfRef<E>,
{
    Box::pin(async move {
        match guard {
            GuardExpr::Slot { name, params } => {
                let handler = machine.guard_handler(name);
                let params: Params = params.clone();
                handler(params, ctx.clone()).await
            }
            GuardExpr::And(exprs) => {
                for expr in exprs {
                    if !eval_guard(machine, expr, ctx).await {
                        return false;
                    }
                }
                true
            }
            GuardExpr::Or(exprs) => {
                for expr in exprs {
                    if eval_guard(machine, expr, ctx).await {
                        return true;
                    }
                }
                false
            }
            GuardExpr::Not(expr) => !eval_guard(machine, expr, ctx).await,
        }
    })
}
