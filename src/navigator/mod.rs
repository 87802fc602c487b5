//! Page navigation for the live view
//!
//! This module moves the rendered table to a target page and verifies the
//! move by reading the active pagination indicator:
//! - Strategies: direct jump, numbered control click, next control click
//! - Escalation: reload the view, then recreate the session once
//!
//! Transient UI noise (dialogs, stale elements) is dismissed and the same
//! strategy retried; it never escalates by itself.

mod driver;
mod strategy;

pub use driver::{Navigator, NavigatorConfig};
pub use strategy::{Step, Strategy};

use thiserror::Error;

/// Fatal navigation failures
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Page {target} unreachable: all strategies failed after reload and session recreation")]
    Unreachable { target: u32 },

    #[error("Session lost {losses} times while navigating to page {target}")]
    SessionUnstable { target: u32, losses: u32 },
}
