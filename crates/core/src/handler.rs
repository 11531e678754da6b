// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler contracts for transitions, guards, effects, and spawn/background
//! effects, plus the guard composition AST.
//!
//! Handlers are stored as boxed closures rather than as trait objects bound
//! to a user-defined trait: this keeps machine construction a plain builder
//! call (`on(...)`, `spawn(...)`) instead of requiring a `impl` block per
//! handler, which is how the teacher's `Effect`/`Event` enums are consumed —
//! by value, through closures and match arms, not through trait objects.

use crate::tag::Tag;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, `Send` future — the common denominator for "suspending
/// computation" in the source specification.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parameters passed to a named guard or effect slot. Untyped by design —
/// the schema/validation library that would type these is an external
/// collaborator (see spec §1 Out of scope).
pub type Params = Value;

/// A tagged state or event value.
///
/// `tag()` is the Rust realization of the `_tag` discriminant field the
/// specification requires on every state/event encoding.
pub trait Taggable: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn tag(&self) -> Tag;
}

/// Capability for handlers to enqueue events back into their own actor's
/// mailbox. Implemented by `ActorRef` in `emx-engine`; declared here so
/// `emx-core` never depends on the actor runtime.
pub trait SelfRef<E>: Clone + Send + Sync + 'static {
    fn send(&self, event: E);
}

/// Synthesizes the two reserved internal events fed to spawn effects on
/// state entry: `$init` for the initial state, `$enter` for every
/// subsequent entry (spec §3). An event type's variant carrying one of
/// these tags need not hold any payload.
pub trait SyntheticEvent: Taggable {
    fn init_event() -> Self;
    fn enter_event() -> Self;
}

/// Context passed to every handler invocation: `{state, event, self}` from
/// the specification's module-level "context tag", passed explicitly
/// instead of injected.
#[derive(Clone)]
pub struct HandlerContext<S, E, R> {
    pub state: S,
    pub event: E,
    pub self_ref: R,
}

impl<S, E, R> HandlerContext<S, E, R> {
    pub fn new(state: S, event: E, self_ref: R) -> Self {
        Self {
            state,
            event,
            self_ref,
        }
    }
}

/// A transition handler: given the captured `(state, event, self)`, produces
/// the new state, possibly via suspension.
pub type TransitionHandler<S, E, R> =
    Arc<dyn Fn(HandlerContext<S, E, R>) -> BoxFuture<'static, S> + Send + Sync>;

/// A provisioned guard handler: `(params, ctx) -> bool`.
pub type GuardHandler<S, E, R> =
    Arc<dyn Fn(Params, HandlerContext<S, E, R>) -> BoxFuture<'static, bool> + Send + Sync>;

/// A provisioned effect handler: `(params, ctx) -> ()`. No user-visible
/// success value, per spec §4.D.
pub type EffectHandler<S, E, R> =
    Arc<dyn Fn(Params, HandlerContext<S, E, R>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A spawn or background effect handler. Receives a cancellation signal the
/// handler is expected to observe and unwind its finalizers against; the
/// engine awaits completion after signaling cancellation (spec §5).
pub type ScopedEffectHandler<S, E, R, C> =
    Arc<dyn Fn(HandlerContext<S, E, R>, C) -> BoxFuture<'static, ()> + Send + Sync>;

/// Guard composition: AND/OR/NOT over named slots, evaluated eagerly in
/// registration order (spec §4.D permits short-circuit but does not require
/// it).
#[derive(Clone)]
pub enum GuardExpr {
    Slot { name: String, params: Params },
    And(Vec<GuardExpr>),
    Or(Vec<GuardExpr>),
    Not(Box<GuardExpr>),
}

impl GuardExpr {
    pub fn slot(name: impl Into<String>, params: Params) -> Self {
        GuardExpr::Slot {
            name: name.into(),
            params,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::slot(name, Value::Null)
    }

    pub fn and(exprs: Vec<GuardExpr>) -> Self {
        GuardExpr::And(exprs)
    }

    pub fn or(exprs: Vec<GuardExpr>) -> Self {
        GuardExpr::Or(exprs)
    }

    pub fn not(expr: GuardExpr) -> Self {
        GuardExpr::Not(Box::new(expr))
    }

    /// Collect the slot names this expression references, for provisioning
    /// validation.
    pub(crate) fn slot_names(&self, out: &mut Vec<String>) {
        match self {
            GuardExpr::Slot { name, .. } => out.push(name.clone()),
            GuardExpr::And(xs) | GuardExpr::Or(xs) => {
                for x in xs {
                    x.slot_names(out);
                }
            }
            GuardExpr::Not(x) => x.slot_names(out),
        }
    }
}
