// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for machine construction and provisioning.
//!
//! Runtime (actor-loop) errors live in `emx-engine::ActorError`, which wraps
//! this type; persistence errors live in `emx-storage::PersistenceError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    /// `spawn` attempted on a machine with unfulfilled guard/effect slots.
    #[error("unprovisioned slots: {0:?}")]
    UnprovidedSlots(Vec<String>),

    /// `provide` was given a handler map that is not exactly the declared
    /// slot set. Lists every missing and every extra name in one error.
    #[error("provisioning mismatch: missing {missing:?}, extra {extra:?}")]
    ProvisionValidation {
        missing: Vec<String>,
        extra: Vec<String>,
    },
}

/// Invoked a slot name with no registered handler at runtime. This is a
/// programming error (spec §7: "fatal defect"), not a recoverable
/// `MachineError` — it is raised by panicking, mirroring "fail-loud".
#[track_caller]
#[allow(clippy::panic)]
pub(crate) fn slot_provision_defect(name: &str) -> ! {
    panic!("slot '{name}' invoked but no handler is registered (SlotProvision defect)")
}
