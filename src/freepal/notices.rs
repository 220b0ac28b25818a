//! User-facing notices (toasts).
//!
//! Mutations that fail after touching local state publish a notice here once
//! the rollback is done. UI layers subscribe and render them; publishing with
//! nobody listening is a no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    /// Shown as a transient toast; the user can keep going.
    Recoverable,
    /// Shown as a blocking message (e.g. the session is gone).
    Blocking,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub severity: NoticeSeverity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn error(severity: NoticeSeverity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            severity,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            severity: NoticeSeverity::Recoverable,
            title: title.into(),
            message: message.into(),
        }
    }
}

pub struct NoticeCenter {
    sender: broadcast::Sender<Notice>,
}

impl NoticeCenter {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(BUFFER_SIZE).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        if self.sender.send(notice).is_err() {
            tracing::trace!(target: "freepal::notices::publish", "No notice subscribers");
        }
    }
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}
