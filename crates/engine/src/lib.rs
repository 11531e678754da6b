// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! emx-engine: the transition engine, the actor mailbox/event-loop runtime,
//! the persistent actor extension, and the actor system registry.
//!
//! `emx-core` supplies the pure machine definition; this crate supplies the
//! `tokio`-backed scheduler that drives it.

pub mod actor;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistent;
pub mod scope;
pub mod system;

pub use actor::{ActorRef, Unsubscribe};
pub use cancel::TokioCancelSignal;
pub use config::{PersistenceConfig, RuntimeConfig, SnapshotSchedule};
pub use error::ActorError;
pub use persistent::PersistentActorRef;
pub use scope::Scope;
pub use system::{ActorSystem, RestoreReport};
