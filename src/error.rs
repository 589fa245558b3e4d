// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types and consistent error formatting for grameen.
//!
//! [`Rejection`] is what the download machine answers when it refuses an
//! intent. The formatting helpers render actionable messages (causes,
//! fixes) for the command line.

use std::fmt;

/// Why the download machine refused to start a download.
///
/// Cancelling or removing from the wrong state is not an error; those calls
/// simply do nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No user identity is active; the caller should prompt for sign-in
    AuthenticationRequired,
    /// The id is not in the current resource list
    UnknownResource(String),
    /// A download (and its tick timer) is already running for the id
    AlreadyDownloading(String),
    /// The resource is already available offline
    AlreadyDownloaded(String),
    /// The download worker has shut down
    WorkerStopped,
}

impl Rejection {
    /// Returns true if signing in would let the request through.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Rejection::AuthenticationRequired)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AuthenticationRequired => write!(f, "authentication required"),
            Rejection::UnknownResource(id) => write!(f, "unknown resource '{}'", id),
            Rejection::AlreadyDownloading(id) => write!(f, "resource '{}' is already downloading", id),
            Rejection::AlreadyDownloaded(id) => write!(f, "resource '{}' is already downloaded", id),
            Rejection::WorkerStopped => write!(f, "download worker is not running"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use grameen::error::format_error;
///
/// let error = format_error(
///     "Sign in to download resources",
///     &["No user is signed in"],
///     &["Pass a user: grameen download 1 --user asha"],
/// );
/// println!("{}", error);
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n", title);

    if !causes.is_empty() {
        output.push_str("\nPossible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
    }

    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}

/// Formats a one-line error.
pub fn format_simple_error(title: &str) -> String {
    format!("[✗] {}", title)
}

/// Builder for constructing formatted error messages.
///
/// ```
/// use grameen::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Could not read the progress store")
///     .cause("The data directory is not writable")
///     .fix("Point GRAMEEN_DATA_DIR at a writable directory")
///     .build();
/// println!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(String::as_str).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(String::as_str).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Render a rejection the way the CLI shows it.
pub fn explain_rejection(rejection: &Rejection) -> String {
    match rejection {
        Rejection::AuthenticationRequired => ErrorBuilder::new("Sign in to download resources")
            .cause("No user identity is active")
            .fix("Pass a user: grameen download <ID> --user <NAME>")
            .fix("Or set GRAMEEN_USER in your environment")
            .build(),
        Rejection::UnknownResource(id) => ErrorBuilder::new(format!("No resource with id '{}'", id))
            .fix("List available resources: grameen catalog")
            .build(),
        Rejection::AlreadyDownloaded(id) => ErrorBuilder::new(format!("Resource '{}' is already downloaded", id))
            .fix(format!("Remove it first to download again: grameen remove {}", id))
            .build(),
        other => format_simple_error(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let error = format_error("Test Error", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.starts_with("[✗] Test Error\n"));
        assert!(error.contains("Possible causes:"));
        assert!(error.contains("  - Cause 2"));
        assert!(error.contains("Try these fixes:"));
        assert!(error.contains("  1. Fix 1"));
        assert!(error.contains("  2. Fix 2"));
    }

    #[test]
    fn test_empty_causes_and_fixes() {
        let error = format_error("Empty test", &[], &[]);
        assert_eq!(error, "[✗] Empty test\n");
    }

    #[test]
    fn test_error_builder_display() {
        let builder = ErrorBuilder::new("Display test").cause("Cause").fix("Fix");
        let error = format!("{}", builder);
        assert!(error.contains("[✗] Display test"));
        assert!(error.contains("  - Cause"));
        assert!(error.contains("  1. Fix"));
    }

    #[test]
    fn test_rejection_messages() {
        assert!(Rejection::AuthenticationRequired.requires_sign_in());
        assert!(!Rejection::WorkerStopped.requires_sign_in());
        assert_eq!(
            Rejection::AlreadyDownloading("2".into()).to_string(),
            "resource '2' is already downloading"
        );

        let sign_in = explain_rejection(&Rejection::AuthenticationRequired);
        assert!(sign_in.contains("Sign in"));
        assert!(sign_in.contains("--user"));
    }
}
