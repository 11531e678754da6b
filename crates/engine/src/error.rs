// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the actor runtime.

use emx_core::MachineError;
use emx_storage::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("machine error: {0}")]
    Machine(#[from] MachineError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("actor id already registered: {0}")]
    DuplicateActor(String),

    #[error("mailbox closed")]
    MailboxClosed,

    #[error("mailbox at capacity")]
    MailboxFull,

    #[error("replay defect: {0}")]
    ReplayDefect(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
