// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! emx-storage: the persistence adapter contract plus two concrete
//! adapters — an in-memory adapter for tests and ephemeral actors, and a
//! file-backed adapter using a JSONL write-ahead log and atomic snapshot
//! files.

pub mod adapter;
pub mod error;
pub mod file;
pub mod in_memory;
pub mod record;
pub mod snapshot;
pub mod wal;

pub use adapter::PersistenceAdapter;
pub use error::PersistenceError;
pub use file::FileAdapter;
pub use in_memory::InMemoryAdapter;
pub use record::{ActorMetadata, PersistedEvent, Snapshot};
pub use wal::{Wal, WalEntry};
