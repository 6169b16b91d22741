// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Canonical types used across tokenwatch.
//!
//! This module provides unified type definitions to avoid duplication.

use serde::{Deserialize, Serialize};

/// A portal user role.
///
/// All logic downstream of the auth API handles roles in this normalized
/// form. The backend is known to send case variations (ADMIN / Admin /
/// COMPANY), so every ingestion point must go through [`UserRole::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Program administrator
    Admin,
    /// Service company operator
    Company,
    /// Enrolled end user
    User,
}

impl UserRole {
    /// Normalize a raw role string from the backend.
    ///
    /// Unrecognized roles fall back to [`UserRole::User`], the least
    /// privileged role.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "company" => Self::Company,
            "user" => Self::User,
            _ => Self::User,
        }
    }

    /// Convert role to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Company => "company",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The in-memory record of who is currently authenticated.
///
/// Created on successful validation, replaced wholesale on refresh, and
/// destroyed on logout or failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}
