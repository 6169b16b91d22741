// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Consistent error formatting for tokenwatch.
//!
//! Provides utilities to format errors with actionable information including
//! possible causes, suggested fixes, and documentation links.

/// GitHub issues URL for support.
pub const GITHUB_ISSUES_URL: &str = "https://github.com/morganforge/tokenwatch/issues";

/// Formats an error message with title, causes, fixes, and help link.
///
/// # Arguments
///
/// * `title` - The error title (e.g., "Failed to reach the portal")
/// * `causes` - List of possible causes
/// * `fixes` - List of suggested fixes (should be actionable commands or steps)
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = String::new();

    // Error title
    output.push_str(&format!("[✗] {}\n\n", title));

    // Possible causes
    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    // Suggested fixes
    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    // Help link
    output.push_str(&format!("Need help? {}", GITHUB_ISSUES_URL));

    output
}

/// Formats a simple error with just a title and help link.
pub fn format_simple_error(title: &str) -> String {
    format!("[✗] {}\n\nNeed help? {}", title, GITHUB_ISSUES_URL)
}
