// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation signal contract for scoped (spawn/background) effects.
//!
//! `emx-core` declares only the contract; `emx-engine` supplies the concrete
//! implementation (a `tokio_util::sync::CancellationToken` wrapper). This
//! mirrors the spec's note that "the state scope maps to a structured task
//! scope whose cancellation awaits children" without tying the core crate to
//! a specific async runtime.

use crate::handler::BoxFuture;

pub trait CancelSignal: Clone + Send + Sync + 'static {
    /// True once the owning scope has been closed.
    fn is_cancelled(&self) -> bool;

    /// Resolves when the owning scope is closed. Handlers `select!` on this
    /// to unwind finalizers instead of polling `is_cancelled`.
    fn cancelled(&self) -> BoxFuture<'static, ()>;
}
