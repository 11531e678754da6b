// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A structured task scope: a set of fibers sharing one cancellation signal,
//! closed as a unit. This is the engine's realization of spec §5's "old
//! scope closed before new scope opens" invariant — `close()` cancels every
//! handle in the scope and awaits its completion before returning, so no
//! fiber from the outgoing scope can still be running once the next state's
//! spawn effects start.

use crate::cancel::TokioCancelSignal;
use std::future::Future;
use tokio::task::JoinHandle;

pub struct Scope {
    signal: TokioCancelSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            signal: TokioCancelSignal::new(),
            handles: Vec::new(),
        }
    }

    pub fn signal(&self) -> TokioCancelSignal {
        self.signal.clone()
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(fut));
    }

    /// Interrupts every fiber in this scope and awaits their completion.
    /// Idempotent: closing an already-closed scope is a no-op second pass.
    /// Returns the panic message of any fiber that unwound instead of
    /// finishing or observing cancellation — the caller decides how to
    /// surface these (spec §7: handler defects become `error` inspection
    /// events).
    pub async fn close(&mut self) -> Vec<String> {
        self.signal.cancel();
        let mut panics = Vec::new();
        for handle in self.handles.drain(..) {
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    panics.push(panic_message(join_err.into_panic()));
                }
            }
        }
        panics
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
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
