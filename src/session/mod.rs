//! Remote view sessions
//!
//! A [`Session`] is a live handle on the rendered table page. It can vanish
//! at any moment (browser crash, expired driver session); callers that see
//! [`SessionError::Lost`] must drop the handle and ask the
//! [`SessionSupervisor`] for a new one.
//!
//! # Components
//!
//! - `Session` / `SessionFactory`: the seam over the rendering collaborator
//! - `SessionSupervisor`: sole owner of the active session
//! - `ChromeSession`: headless Chrome over the DevTools protocol
//! - `MemorySession`: in-process simulated table view

mod chrome;
mod memory;
mod supervisor;

pub use chrome::{ChromeFactory, ChromeSession};
pub use memory::{MemoryFactory, MemorySession, MemoryTable};
pub use supervisor::SessionSupervisor;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a remote view
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session lost: {0}")]
    Lost(String),

    #[error("Unexpected dialog: {0}")]
    Dialog(String),

    #[error("Stale element: {0}")]
    Stale(String),

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Script error: {0}")]
    Script(String),
}

impl SessionError {
    /// Classifies a raw driver message
    ///
    /// | Message contains | Variant |
    /// |------------------|---------|
    /// | invalid session, session deleted, no such window, target closed, connection closed, browser closed, disconnected | `Lost` |
    /// | alert, dialog | `Dialog` |
    /// | stale element, detached | `Stale` |
    /// | anything else | `Script` |
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        const LOST: [&str; 7] = [
            "invalid session",
            "session deleted",
            "no such window",
            "target closed",
            "connection closed",
            "browser closed",
            "disconnected",
        ];

        if LOST.iter().any(|needle| lower.contains(needle)) {
            Self::Lost(message)
        } else if lower.contains("alert") || lower.contains("dialog") {
            Self::Dialog(message)
        } else if lower.contains("stale element") || lower.contains("detached") {
            Self::Stale(message)
        } else {
            Self::Script(message)
        }
    }

    /// Returns true if the session can no longer be used
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost(_))
    }

    /// Returns true for UI noise that is dismissed and retried in place
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Dialog(_) | Self::Stale(_))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// A cookie captured from the live view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Formats cookies as a `Cookie` request header value
pub fn cookie_header(cookies: &[SessionCookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// A live, paginated table view
///
/// Every wait inside an implementation is bounded; nothing blocks forever.
#[async_trait]
pub trait Session: Send {
    /// Returns false once the underlying view is gone
    async fn is_alive(&mut self) -> bool;

    /// Full HTML of the current view
    async fn content(&mut self) -> SessionResult<String>;

    /// Waits until `selector` matches something; false on timeout
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> SessionResult<bool>;

    /// Page number shown by the active pagination indicator
    async fn active_page(&mut self) -> SessionResult<Option<u32>>;

    /// Asks the table's own paging API to show the zero-based page
    ///
    /// Returns false when the view exposes no paging API.
    async fn jump_to(&mut self, page_index: u32) -> SessionResult<bool>;

    /// Page numbers of the clickable numbered controls currently shown
    async fn page_controls(&mut self) -> SessionResult<Vec<u32>>;

    /// Scrolls to and clicks the numbered control for `page`
    async fn click_page_control(&mut self, page: u32) -> SessionResult<()>;

    /// Returns true if an enabled "next" control exists
    async fn has_next(&mut self) -> SessionResult<bool>;

    /// Clicks the "next" control; false when it is absent or disabled
    async fn click_next(&mut self) -> SessionResult<bool>;

    /// Reloads the view from its start URL
    async fn reload(&mut self) -> SessionResult<()>;

    /// Dismisses an open native dialog, if any
    async fn dismiss_dialog(&mut self) -> SessionResult<()>;

    /// Backend query endpoint the table was configured with, if any
    async fn ajax_endpoint(&mut self) -> SessionResult<Option<String>>;

    /// Cookies of the current view
    async fn cookies(&mut self) -> SessionResult<Vec<SessionCookie>>;

    /// User agent string of the view, if known
    async fn user_agent(&mut self) -> SessionResult<Option<String>>;

    /// Tears the view down; errors are logged, not returned
    async fn close(&mut self);
}

/// Creates fresh sessions for the supervisor
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> SessionResult<Box<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lost() {
        assert!(SessionError::classify("invalid session id").is_lost());
        assert!(SessionError::classify("Target closed").is_lost());
        assert!(SessionError::classify("ws: connection closed normally").is_lost());
    }

    #[test]
    fn test_classify_transient() {
        let dialog = SessionError::classify("unexpected alert open: {Alert text : Oops}");
        assert!(matches!(dialog, SessionError::Dialog(_)));
        assert!(dialog.is_transient());

        let stale = SessionError::classify("stale element reference: element is not attached");
        assert!(matches!(stale, SessionError::Stale(_)));
        assert!(stale.is_transient());
    }

    #[test]
    fn test_classify_other() {
        let err = SessionError::classify("ReferenceError: jQuery is not defined");
        assert!(matches!(err, SessionError::Script(_)));
        assert!(!err.is_lost());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header(&[]), None);
        let cookies = vec![
            SessionCookie {
                name: "XSRF-TOKEN".to_string(),
                value: "abc".to_string(),
            },
            SessionCookie {
                name: "laravel_session".to_string(),
                value: "xyz".to_string(),
            },
        ];
        assert_eq!(
            cookie_header(&cookies),
            Some("XSRF-TOKEN=abc; laravel_session=xyz".to_string())
        );
    }
}
