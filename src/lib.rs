// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! tokenwatch - session keep-alive library
//!
//! Keeps a device compliance portal sign-in alive. The portal issues a
//! 30-minute cookie credential; tokenwatch validates it, warns one minute
//! before it expires, and lets the user extend or end the session — with the
//! extend-vs-timeout race resolved exactly once.
//!
//! # Core Modules
//!
//! - [`session`] - Session manager: validation, sign-out, state flags
//! - [`expiry`] - Expiry coordinator: warning timer and prompt resolution
//! - [`auth`] - Portal auth API client (login / validate / refresh / logout)
//! - [`guard`] - Role-based access decisions
//! - [`notice`] - User-facing session notices (warning, extended, ended)
//! - [`config`] - Config file handling (`~/.tokenwatch/config.json`)
//! - [`error`] - Consistent error formatting utilities

pub mod auth;
pub mod config;
pub mod error;
pub mod expiry;
pub mod guard;
pub mod notice;
pub mod session;
pub mod types;

// Re-export commonly used types from the session layer
pub use session::{SessionManager, SessionSnapshot};

// Re-export the expiry coordinator surface
pub use expiry::{
    CoordinatorState, ExpiryCoordinator, PromptResolution, WarningPrompt,
    CREDENTIAL_LIFETIME_SECS, EXPIRY_WARNING_DELAY_SECS, WARNING_WINDOW_SECS,
};

// Re-export auth client types
pub use auth::{AuthApi, AuthError, HttpAuthClient, TokenResponse};

// Re-export notices
pub use notice::{EndReason, SessionNotice};

// Re-export access control helpers
pub use guard::{check_access, redirect_path, AccessDecision};

// Re-export canonical types
pub use types::{SessionUser, UserRole};

// Re-export config
pub use config::Config;

// Re-export error utilities
pub use error::{format_error, format_simple_error, GITHUB_ISSUES_URL};
