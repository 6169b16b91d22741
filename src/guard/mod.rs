// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Role-based access decisions.
//!
//! Pure functions over a [`SessionSnapshot`]; the embedding UI decides what
//! a redirect or a denial looks like.

use crate::session::SessionSnapshot;
use crate::types::UserRole;

/// Outcome of an access check for a role-gated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Validation still in flight; render nothing yet.
    Loading,
    /// Not signed in; send the user to the sign-in flow.
    SignInRequired,
    /// Signed in, but the role is not in the allowed set.
    Forbidden,
    /// Signed in with an allowed role.
    Granted,
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::SignInRequired => write!(f, "sign-in required"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Granted => write!(f, "granted"),
        }
    }
}

/// Check whether the current session may enter a view restricted to
/// `allowed_roles`. An empty slice means any authenticated user may enter.
pub fn check_access(snapshot: &SessionSnapshot, allowed_roles: &[UserRole]) -> AccessDecision {
    if snapshot.is_loading {
        return AccessDecision::Loading;
    }
    if !snapshot.is_authenticated {
        return AccessDecision::SignInRequired;
    }
    match &snapshot.user {
        Some(user) if allowed_roles.is_empty() || allowed_roles.contains(&user.role) => {
            AccessDecision::Granted
        }
        Some(_) => AccessDecision::Forbidden,
        // authenticated without a user should never happen; fail closed
        None => AccessDecision::SignInRequired,
    }
}

/// Landing route for a role after sign-in.
pub fn redirect_path(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "/admin/dashboard",
        UserRole::Company => "/company/dashboard",
        UserRole::User => "/user",
    }
}
