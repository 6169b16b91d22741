// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! User-facing session notices.
//!
//! The session layer never talks to a terminal itself. It emits
//! [`SessionNotice`] values on an unbounded channel and the embedding UI
//! decides how to surface them.

use std::time::Duration;

use crate::expiry::WarningPrompt;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user chose "sign out" on the expiry warning.
    UserChoice,
    /// The warning window elapsed with no user action.
    TimedOut,
    /// A credential refresh failed; the session was terminated fail-closed.
    ExtendFailed,
    /// An explicit logout call outside the warning flow.
    Logout,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserChoice => "user_choice",
            Self::TimedOut => "timeout",
            Self::ExtendFailed => "extend_failed",
            Self::Logout => "logout",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notices emitted by the session layer.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// The sign-in is about to expire. The embedded [`WarningPrompt`] accepts
    /// exactly one resolution; after its window elapses the session ends on
    /// its own.
    ExpiryWarning(WarningPrompt),
    /// A credential refresh succeeded; the session runs for `remaining` more.
    SessionExtended { remaining: Duration },
    /// A credential refresh failed. A `SessionEnded` notice follows.
    ExtendFailed,
    /// The session is over and local state has been cleared.
    SessionEnded { reason: EndReason },
}
