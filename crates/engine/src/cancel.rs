// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete cancellation signal: a thin wrapper over
//! `tokio_util::sync::CancellationToken`, realizing `emx_core::CancelSignal`
//! (spec §9: "the translation is a task/fiber scheduler plus cancellation
//! tokens").

use emx_core::{BoxFuture, CancelSignal};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Default)]
pub struct TokioCancelSignal(CancellationToken);

impl TokioCancelSignal {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl CancelSignal for TokioCancelSignal {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    fn cancelled(&self) -> BoxFuture<'static, ()> {
        let token = self.0.clone();
        Box::pin(async move { token.cancelled().await })
    }
}
