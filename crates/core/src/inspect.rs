// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stable inspection-event shape (spec §6) and the optional observer
//! interface that consumes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle notification delivered to an optional [`InspectSink`].
///
/// Serializes with `{"type": "...", ...}`, matching the teacher's
/// `#[serde(tag = "type")]` convention for wire-shaped enums (see
/// `oj_core::Event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InspectEvent {
    #[serde(rename = "spawn")]
    Spawn {
        actor_id: String,
        initial_state: Value,
        ts_ms: u64,
    },
    #[serde(rename = "event")]
    Event {
        actor_id: String,
        state: Value,
        event: Value,
        ts_ms: u64,
    },
    #[serde(rename = "transition")]
    Transition {
        actor_id: String,
        from_state: Value,
        to_state: Value,
        event: Value,
        ts_ms: u64,
    },
    #[serde(rename = "effect")]
    Effect {
        actor_id: String,
        effect_type: &'static str,
        state: Value,
        ts_ms: u64,
    },
    #[serde(rename = "stop")]
    Stop {
        actor_id: String,
        final_state: Value,
        ts_ms: u64,
    },
    #[serde(rename = "error")]
    Error {
        actor_id: String,
        phase: &'static str,
        state: Value,
        event: Option<Value>,
        error: String,
        ts_ms: u64,
    },
}

/// Optional observer interface. Implementations must not panic; the engine
/// treats a panicking sink as fail-soft by catching the unwind and logging
/// it, but a well-behaved sink never relies on that safety net.
pub trait InspectSink: Send + Sync {
    fn on_inspect(&self, event: InspectEvent);
}

/// A sink that discards every event — the default when no observer is
/// configured.
pub struct NullSink;

impl InspectSink for NullSink {
    fn on_inspect(&self, _event: InspectEvent) {}
}

/// Injectable clock for inspection timestamps, so tests get deterministic
/// `ts_ms` values (spec §6: "injectable for test determinism").
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests: starts at an arbitrary epoch and only
/// advances when told to.
#[derive(Debug, Default)]
pub struct FakeClock(std::sync::atomic::AtomicU64);

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(start_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
