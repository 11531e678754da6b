// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The common tag vocabulary: state tags, event tags, the wildcard tag,
//! and the two reserved internal event tags.

use std::borrow::Cow;

/// A state or event tag. Cheap to clone; usually a `'static` string literal
/// but may be owned when built dynamically (e.g. from a config file).
pub type Tag = Cow<'static, str>;

/// Matches any state tag in a transition registration.
pub const WILDCARD: &str = "*";

/// Synthetic event fed to the initial state's scoped effects on actor start.
pub const INIT_EVENT: &str = "$init";

/// Synthetic event fed to spawn effects on every post-transition entry.
pub const ENTER_EVENT: &str = "$enter";

/// Build a `'static` tag from a string literal without an allocation.
pub const fn tag(s: &'static str) -> Tag {
    Cow::Borrowed(s)
}
