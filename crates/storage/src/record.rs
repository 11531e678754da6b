// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence records (spec §3, §6): a journaled event, a point-in-time
//! snapshot, and the optional per-actor metadata row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single journaled event, monotone in `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEvent<E> {
    pub event: E,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

/// A point-in-time state value. "All events with `version <= snapshot.version`
/// are already folded in" (spec §6) — readers replay only what comes after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub state: S,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl<S> Snapshot<S> {
    pub fn new(state: S, version: u64) -> Self {
        Self {
            state,
            version,
            created_at: Utc::now(),
        }
    }
}

/// Optional registry row for an actor (spec §4.K `restore_all`, `list_actors`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorMetadata {
    pub id: String,
    pub machine_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub version: u64,
    pub state_tag: String,
}
