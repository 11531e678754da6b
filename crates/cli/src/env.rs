// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI binary — the only
//! place in this workspace that resolves a directory from the environment
//! (spec §10.4); the library crates take an explicit `PersistenceConfig`.

use std::path::PathBuf;

/// Resolve state directory: `EMX_STATE_DIR` > `XDG_STATE_HOME`/emx > `~/.local/state/emx`.
pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("EMX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("emx"));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set and EMX_STATE_DIR/XDG_STATE_HOME are unset"))?;
    Ok(PathBuf::from(home).join(".local/state/emx"))
}
