// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The immutable machine definition (spec §3, §4.D) and the builder that
//! produces it.
//!
//! A `Machine` is frozen the moment `build()` returns: no mutation after the
//! first actor derives from it. `provide()` never mutates its receiver — it
//! returns a new `Machine` sharing the original's transition table (and its
//! memoized index) but carrying its own guard/effect handler maps, so a
//! single built machine can back several independently-provisioned actors.

use crate::cancel::CancelSignal;
use crate::error::{slot_provision_defect, MachineError};
use crate::handler::{
    EffectHandler, GuardExpr, GuardHandler, ScopedEffectHandler, SelfRef, Taggable,
    TransitionHandler,
};
use crate::tag::{Tag, WILDCARD};
use crate::transition_index::TransitionIndex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

/// A single registered transition. `state_tag == "*"` marks a wildcard
/// transition, participating after concrete matches for the same event tag.
#[derive(Clone)]
pub struct Transition<S, E, R> {
    pub state_tag: Tag,
    pub event_tag: Tag,
    pub guard: Option<GuardExpr>,
    pub reenter: bool,
    pub handler: TransitionHandler<S, E, R>,
}

/// An eventless transition, guard-cascaded on entry into `state_tag` (spec
/// §9 Open Question (ii)): the actor loop applies these after the state
/// cell is set and before the new scope opens, re-looping until none fire.
#[derive(Clone)]
pub struct AlwaysTransition<S, E, R> {
    pub state_tag: Tag,
    pub guard: Option<GuardExpr>,
    pub handler: TransitionHandler<S, E, R>,
}

/// A spawn effect: runs under the per-state scope for every entry into
/// `state_tag`, fed the `$enter` (or `$init`, for the initial state) event.
#[derive(Clone)]
pub struct SpawnEffectDef<S, E, R, C> {
    pub state_tag: Tag,
    pub handler: ScopedEffectHandler<S, E, R, C>,
}

/// A background effect: runs once, under the actor's lifetime scope,
/// interrupted only at actor stop.
#[derive(Clone)]
pub struct BackgroundEffectDef<S, E, R, C> {
    pub handler: ScopedEffectHandler<S, E, R, C>,
}

/// Marker for a declared guard/effect slot. Parameter typing is deliberately
/// out of scope here (see spec §1, "the schema/validation library") — a
/// declared slot is just a name the machine expects a handler for.
#[derive(Clone, Debug, Default)]
pub struct SlotSchema;

pub struct Machine<S, E, R, C> {
    pub(crate) initial: S,
    transitions: Arc<Vec<Transition<S, E, R>>>,
    always: Arc<Vec<AlwaysTransition<S, E, R>>>,
    spawn_effects: Arc<Vec<SpawnEffectDef<S, E, R, C>>>,
    background_effects: Arc<Vec<BackgroundEffectDef<S, E, R, C>>>,
    final_states: Arc<HashSet<Tag>>,
    guards: Arc<HashMap<String, SlotSchema>>,
    effects: Arc<HashMap<String, SlotSchema>>,
    guard_handlers: Arc<HashMap<String, GuardHandler<S, E, R>>>,
    effect_handlers: Arc<HashMap<String, EffectHandler<S, E, R>>>,
    index: Arc<OnceLock<TransitionIndex<S, E, R>>>,
    machine_type: Option<Arc<str>>,
}

impl<S, E, R, C> Clone for Machine<S, E, R, C>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            initial: self.initial.clone(),
            transitions: self.transitions.clone(),
            always: self.always.clone(),
            spawn_effects: self.spawn_effects.clone(),
            background_effects: self.background_effects.clone(),
            final_states: self.final_states.clone(),
            guards: self.guards.clone(),
            effects: self.effects.clone(),
            guard_handlers: self.guard_handlers.clone(),
            effect_handlers: self.effect_handlers.clone(),
            index: self.index.clone(),
            machine_type: self.machine_type.clone(),
        }
    }
}

impl<S, E, R, C> Machine<S, E, R, C>
where
    S: Taggable,
    E: Taggable,
    R: SelfRef<E>,
    C: CancelSignal,
{
    pub fn initial(&self) -> &S {
        &self.initial
    }

    pub fn machine_type(&self) -> Option<&str> {
        self.machine_type.as_deref()
    }

    pub fn final_states(&self) -> &HashSet<Tag> {
        &self.final_states
    }

    pub fn is_final(&self, tag: &Tag) -> bool {
        self.final_states.contains(tag)
    }

    pub fn spawn_effects(&self) -> &[SpawnEffectDef<S, E, R, C>] {
        &self.spawn_effects
    }

    pub fn background_effects(&self) -> &[BackgroundEffectDef<S, E, R, C>] {
        &self.background_effects
    }

    /// Lazily computed, memoized across every `provide()`d clone of this
    /// machine (their transition tables are identical — only handler maps
    /// differ — so sharing the index is sound, not just an optimization).
    pub fn transition_index(&self) -> &TransitionIndex<S, E, R> {
        self.index
            .get_or_init(|| TransitionIndex::build(&self.transitions, &self.always))
    }

    /// Declared-but-unbound guard and effect slot names (spec §4.D).
    pub fn missing_slots(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .guards
            .keys()
            .filter(|name| !self.guard_handlers.contains_key(*name))
            .chain(
                self.effects
                    .keys()
                    .filter(|name| !self.effect_handlers.contains_key(*name)),
            )
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    pub fn is_provisioned(&self) -> bool {
        self.missing_slots().is_empty()
    }

    /// Binds handler maps to every declared slot, returning a fresh machine.
    /// `self` is left untouched and remains reusable with alternative
    /// handler maps (spec §4.D, §8 round-trip property).
    pub fn provide(
        &self,
        guard_handlers: HashMap<String, GuardHandler<S, E, R>>,
        effect_handlers: HashMap<String, EffectHandler<S, E, R>>,
    ) -> Result<Self, MachineError> {
        let mut missing = Vec::new();
        let mut extra = Vec::new();

        for name in self.guards.keys() {
            if !guard_handlers.contains_key(name) {
                missing.push(name.clone());
            }
        }
        for name in guard_handlers.keys() {
            if !self.guards.contains_key(name) {
                extra.push(name.clone());
            }
        }
        for name in self.effects.keys() {
            if !effect_handlers.contains_key(name) {
                missing.push(name.clone());
            }
        }
        for name in effect_handlers.keys() {
            if !self.effects.contains_key(name) {
                extra.push(name.clone());
            }
        }

        if !missing.is_empty() || !extra.is_empty() {
            missing.sort();
            extra.sort();
            return Err(MachineError::ProvisionValidation { missing, extra });
        }

        let mut provisioned = self.clone();
        provisioned.guard_handlers = Arc::new(guard_handlers);
        provisioned.effect_handlers = Arc::new(effect_handlers);
        Ok(provisioned)
    }

    /// Resolves a provisioned guard handler by slot name. Panics — a fatal
    /// `SlotProvision` defect, not a `MachineError` — if the slot was never
    /// bound; callers are expected to have checked `is_provisioned()` before
    /// spawning an actor.
    pub fn guard_handler(&self, name: &str) -> GuardHandler<S, E, R> {
        match self.guard_handlers.get(name) {
            Some(handler) => handler.clone(),
            None => slot_provision_defect(name),
        }
    }

    pub fn effect_handler(&self, name: &str) -> EffectHandler<S, E, R> {
        match self.effect_handlers.get(name) {
            Some(handler) => handler.clone(),
            None => slot_provision_defect(name),
        }
    }
}

/// Accumulates a machine definition in registration order. Not reusable
/// after `build()`; the spec's declarative DSL (method chains over a shared
/// mutable builder) is an external collaborator (see spec §1) — this is the
/// plain Rust construction surface it would compile down to.
pub struct MachineBuilder<S, E, R, C> {
    initial: S,
    transitions: Vec<Transition<S, E, R>>,
    always: Vec<AlwaysTransition<S, E, R>>,
    spawn_effects: Vec<SpawnEffectDef<S, E, R, C>>,
    background_effects: Vec<BackgroundEffectDef<S, E, R, C>>,
    final_states: HashSet<Tag>,
    guards: HashMap<String, SlotSchema>,
    effects: HashMap<String, SlotSchema>,
    machine_type: Option<Arc<str>>,
}

impl<S, E, R, C> MachineBuilder<S, E, R, C>
where
    S: Taggable,
    E: Taggable,
    R: SelfRef<E>,
    C: CancelSignal,
{
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            transitions: Vec::new(),
            always: Vec::new(),
            spawn_effects: Vec::new(),
            background_effects: Vec::new(),
            final_states: HashSet::new(),
            guards: HashMap::new(),
            effects: HashMap::new(),
            machine_type: None,
        }
    }

    pub fn machine_type(mut self, name: impl Into<Arc<str>>) -> Self {
        self.machine_type = Some(name.into());
        self
    }

    pub fn on(self, state_tag: impl Into<Tag>, event_tag: impl Into<Tag>, handler: TransitionHandler<S, E, R>) -> Self {
        self.push_transition(state_tag.into(), event_tag.into(), None, false, handler)
    }

    pub fn on_guarded(
        self,
        state_tag: impl Into<Tag>,
        event_tag: impl Into<Tag>,
        guard: GuardExpr,
        handler: TransitionHandler<S, E, R>,
    ) -> Self {
        self.push_transition(state_tag.into(), event_tag.into(), Some(guard), false, handler)
    }

    pub fn reenter(self, state_tag: impl Into<Tag>, event_tag: impl Into<Tag>, handler: TransitionHandler<S, E, R>) -> Self {
        self.push_transition(state_tag.into(), event_tag.into(), None, true, handler)
    }

    pub fn reenter_guarded(
        self,
        state_tag: impl Into<Tag>,
        event_tag: impl Into<Tag>,
        guard: GuardExpr,
        handler: TransitionHandler<S, E, R>,
    ) -> Self {
        self.push_transition(state_tag.into(), event_tag.into(), Some(guard), true, handler)
    }

    /// Registers a wildcard (`onAny`) transition. Per spec §8 scenario 6,
    /// register these after their concrete counterparts so the index's
    /// registration-order guarantee puts concrete matches first.
    pub fn on_any(self, event_tag: impl Into<Tag>, handler: TransitionHandler<S, E, R>) -> Self {
        self.push_transition(Tag::from(WILDCARD), event_tag.into(), None, false, handler)
    }

    fn push_transition(
        mut self,
        state_tag: Tag,
        event_tag: Tag,
        guard: Option<GuardExpr>,
        reenter: bool,
        handler: TransitionHandler<S, E, R>,
    ) -> Self {
        self.transitions.push(Transition {
            state_tag,
            event_tag,
            guard,
            reenter,
            handler,
        });
        self
    }

    /// Registers an eventless transition applied on entry into `state_tag`
    /// whenever its guard holds (spec §9 Open Question (ii)).
    pub fn always(self, state_tag: impl Into<Tag>, handler: TransitionHandler<S, E, R>) -> Self {
        self.always_guarded_impl(state_tag.into(), None, handler)
    }

    pub fn always_guarded(self, state_tag: impl Into<Tag>, guard: GuardExpr, handler: TransitionHandler<S, E, R>) -> Self {
        self.always_guarded_impl(state_tag.into(), Some(guard), handler)
    }

    fn always_guarded_impl(mut self, state_tag: Tag, guard: Option<GuardExpr>, handler: TransitionHandler<S, E, R>) -> Self {
        self.always.push(AlwaysTransition {
            state_tag,
            guard,
            handler,
        });
        self
    }

    pub fn spawn(mut self, state_tag: impl Into<Tag>, handler: ScopedEffectHandler<S, E, R, C>) -> Self {
        self.spawn_effects.push(SpawnEffectDef {
            state_tag: state_tag.into(),
            handler,
        });
        self
    }

    pub fn background(mut self, handler: ScopedEffectHandler<S, E, R, C>) -> Self {
        self.background_effects.push(BackgroundEffectDef { handler });
        self
    }

    pub fn final_state(mut self, tag: impl Into<Tag>) -> Self {
        self.final_states.insert(tag.into());
        self
    }

    pub fn guard_slot(mut self, name: impl Into<String>) -> Self {
        self.guards.insert(name.into(), SlotSchema);
        self
    }

    pub fn effect_slot(mut self, name: impl Into<String>) -> Self {
        self.effects.insert(name.into(), SlotSchema);
        self
    }

    pub fn build(self) -> Machine<S, E, R, C> {
        Machine {
            initial: self.initial,
            transitions: Arc::new(self.transitions),
            always: Arc::new(self.always),
            spawn_effects: Arc::new(self.spawn_effects),
            background_effects: Arc::new(self.background_effects),
            final_states: Arc::new(self.final_states),
            guards: Arc::new(self.guards),
            effects: Arc::new(self.effects),
            guard_handlers: Arc::new(HashMap::new()),
            effect_handlers: Arc::new(HashMap::new()),
            index: Arc::new(OnceLock::new()),
            machine_type: self.machine_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerContext;
    use serde_json::Value;

    #[derive(Clone, Debug, PartialEq)]
    struct St(Tag);

    impl Taggable for St {
        fn tag(&self) -> Tag {
            self.0.clone()
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Ev(Tag);

    impl Taggable for Ev {
        fn tag(&self) -> Tag {
            self.0.clone()
        }
    }

    #[derive(Clone)]
    struct NoopRef;

    impl SelfRef<Ev> for NoopRef {
        fn send(&self, _event: Ev) {}
    }

    #[derive(Clone)]
    struct NoopCancel;

    impl CancelSignal for NoopCancel {
        fn is_cancelled(&self) -> bool {
            false
        }

        fn cancelled(&self) -> crate::handler::BoxFuture<'static, ()> {
            Box::pin(std::future::pending())
        }
    }

    fn identity_handler() -> TransitionHandler<St, Ev, NoopRef> {
        std::sync::Arc::new(|ctx: HandlerContext<St, Ev, NoopRef>| Box::pin(async move { ctx.state }))
    }

    #[test]
    fn missing_slots_lists_unbound_names() {
        let machine: Machine<St, Ev, NoopRef, NoopCancel> = MachineBuilder::new(St(Tag::from("Idle")))
            .guard_slot("underLimit")
            .effect_slot("log")
            .on("Idle", "Go", identity_handler())
            .build();

        assert_eq!(machine.missing_slots(), vec!["log", "underLimit"]);
        assert!(!machine.is_provisioned());
    }

    #[test]
    fn provide_rejects_non_total_handler_set() {
        let machine: Machine<St, Ev, NoopRef, NoopCancel> =
            MachineBuilder::new(St(Tag::from("Idle"))).guard_slot("underLimit").build();

        let mut extra_guard: HashMap<String, GuardHandler<St, Ev, NoopRef>> = HashMap::new();
        extra_guard.insert(
            "wrongName".into(),
            std::sync::Arc::new(|_params: Value, _ctx| Box::pin(async { true })),
        );

        let err = machine.provide(extra_guard, HashMap::new()).unwrap_err();
        match err {
            MachineError::ProvisionValidation { missing, extra } => {
                assert_eq!(missing, vec!["underLimit".to_string()]);
                assert_eq!(extra, vec!["wrongName".to_string()]);
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn provide_leaves_original_machine_reusable() {
        let machine: Machine<St, Ev, NoopRef, NoopCancel> =
            MachineBuilder::new(St(Tag::from("Idle"))).guard_slot("underLimit").build();

        let mut guards: HashMap<String, GuardHandler<St, Ev, NoopRef>> = HashMap::new();
        guards.insert(
            "underLimit".into(),
            std::sync::Arc::new(|_params: Value, _ctx| Box::pin(async { true })),
        );

        let provisioned = machine.provide(guards, HashMap::new()).expect("total handler set");
        assert!(provisioned.is_provisioned());
        assert!(!machine.is_provisioned(), "original machine must stay unprovisioned");
    }

    #[test]
    fn transition_index_orders_concrete_before_wildcard() {
        let machine: Machine<St, Ev, NoopRef, NoopCancel> = MachineBuilder::new(St(Tag::from("Success")))
            .on("Success", "Reset", identity_handler())
            .on_any("Reset", identity_handler())
            .build();

        let idx = machine.transition_index();
        let found = idx.find(&Tag::from("Success"), &Tag::from("Reset"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].state_tag.as_ref(), "Success");
        assert_eq!(found[1].state_tag.as_ref(), "*");
    }
}
