// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for persistence adapters (spec §7): `StorageFault` and
//! `VersionConflict` are the two kinds a caller of `persist` ever needs to
//! branch on; everything else collapses into `StorageFault` via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage fault: {0}")]
    StorageFault(String),

    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("missing schema for actor {0}")]
    MissingSchema(String),

    #[error("wal corrupt at offset {offset}: {message}")]
    Corrupt { offset: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
