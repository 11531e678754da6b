// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! emx-core: tag vocabulary, machine definition, transition index, and the
//! guard/effect slot system for the effect-machine runtime.
//!
//! This crate is pure data and pure logic — no async runtime, no I/O. The
//! actor event loop that drives a [`Machine`] lives in `emx-engine`.

pub mod cancel;
pub mod error;
pub mod handler;
pub mod inspect;
pub mod machine;
pub mod tag;
pub mod transition_index;

pub use cancel::CancelSignal;
pub use error::MachineError;
pub use handler::{
    BoxFuture, EffectHandler, GuardExpr, GuardHandler, HandlerContext, Params, ScopedEffectHandler,
    SelfRef, SyntheticEvent, Taggable, TransitionHandler,
};
pub use inspect::{Clock, FakeClock, InspectEvent, InspectSink, NullSink, SystemClock};
pub use machine::{
    AlwaysTransition, BackgroundEffectDef, Machine, MachineBuilder, SlotSchema, SpawnEffectDef,
    Transition,
};
pub use tag::{Tag, ENTER_EVENT, INIT_EVENT, WILDCARD};
pub use transition_index::TransitionIndex;
