// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration (spec §10.4 ambient expansion): explicit
//! constructor arguments, no global singleton. The CLI binary is the only
//! place that resolves a directory from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// When the snapshot worker considers a persistent actor "due" for a
/// snapshot write (spec §4.J).
#[derive(Clone, Debug)]
pub enum SnapshotSchedule {
    /// After this many applied transitions since the last snapshot.
    EveryEvents(u64),
    /// After this much wall-clock time since the last snapshot.
    EveryDuration(Duration),
    /// Only on an explicit `persist_now` call.
    Manual,
}

impl Default for SnapshotSchedule {
    fn default() -> Self {
        Self::EveryEvents(50)
    }
}

/// Persistence knobs for a `PersistentActor` (spec §4.J).
#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    /// Root directory for journals and snapshots (file-backed adapters).
    pub state_dir: PathBuf,
    pub snapshot_schedule: SnapshotSchedule,
    /// Whether events are appended to the journal at all; disabling this
    /// leaves snapshotting as the only durability mechanism.
    pub journal_events: bool,
}

impl PersistenceConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            snapshot_schedule: SnapshotSchedule::default(),
            journal_events: true,
        }
    }

    pub fn with_snapshot_schedule(mut self, schedule: SnapshotSchedule) -> Self {
        self.snapshot_schedule = schedule;
        self
    }

    pub fn with_journal_events(mut self, enabled: bool) -> Self {
        self.journal_events = enabled;
        self
    }
}

/// Mailbox sizing for an actor's event loop (spec §4.F).
///
/// `None` (the default) keeps the mailbox unbounded, matching the
/// historical behavior: `send_checked` never fails except once the actor
/// has stopped. `Some(n)` bounds it to `n` pending events; once full,
/// `send_checked` returns `ActorError::MailboxFull` immediately instead of
/// growing the queue without limit.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuntimeConfig {
    pub mailbox_capacity: Option<usize>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }
}
