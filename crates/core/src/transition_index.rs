// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached lookup from `(state_tag, event_tag)` to the ordered candidate
//! transitions (spec §4.C). Built once per machine and memoized behind a
//! `OnceLock` in [`crate::machine::Machine`]; a naive linear scan over every
//! registered transition on each event is the thing this avoids.

use crate::handler::{SelfRef, Taggable};
use crate::machine::{AlwaysTransition, Transition};
use crate::tag::{Tag, WILDCARD};
use std::collections::HashMap;

pub struct TransitionIndex<S, E, R> {
    by_pair: HashMap<(Tag, Tag), Vec<Transition<S, E, R>>>,
    wildcard: HashMap<Tag, Vec<Transition<S, E, R>>>,
    always_by_state: HashMap<Tag, Vec<AlwaysTransition<S, E, R>>>,
}

impl<S, E, R> TransitionIndex<S, E, R>
where
    S: Taggable,
    E: Taggable,
    R: SelfRef<E>,
{
    pub(crate) fn build(transitions: &[Transition<S, E, R>], always: &[AlwaysTransition<S, E, R>]) -> Self {
        let mut by_pair: HashMap<(Tag, Tag), Vec<Transition<S, E, R>>> = HashMap::new();
        let mut wildcard: HashMap<Tag, Vec<Transition<S, E, R>>> = HashMap::new();

        for t in transitions {
            if t.state_tag.as_ref() == WILDCARD {
                wildcard.entry(t.event_tag.clone()).or_default().push(t.clone());
            } else {
                by_pair
                    .entry((t.state_tag.clone(), t.event_tag.clone()))
                    .or_default()
                    .push(t.clone());
            }
        }

        let mut always_by_state: HashMap<Tag, Vec<AlwaysTransition<S, E, R>>> = HashMap::new();
        for a in always {
            always_by_state.entry(a.state_tag.clone()).or_default().push(a.clone());
        }

        Self {
            by_pair,
            wildcard,
            always_by_state,
        }
    }

    /// Concrete matches in registration order, followed by wildcard matches
    /// in registration order (spec §4.C, §4.E.6).
    pub fn find(&self, state_tag: &Tag, event_tag: &Tag) -> Vec<&Transition<S, E, R>> {
        let mut out: Vec<&Transition<S, E, R>> = Vec::new();
        if let Some(xs) = self.by_pair.get(&(state_tag.clone(), event_tag.clone())) {
            out.extend(xs.iter());
        }
        if let Some(xs) = self.wildcard.get(event_tag) {
            out.extend(xs.iter());
        }
        out
    }

    /// Eventless transitions registered for entry into `state_tag`, in
    /// registration order (spec §9 Open Question (ii), resolved "yes").
    pub fn find_always(&self, state_tag: &Tag) -> &[AlwaysTransition<S, E, R>] {
        self.always_by_state
            .get(state_tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
