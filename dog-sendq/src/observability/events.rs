use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events published by a send queue.
///
/// Correlation ids are opaque to the queue and never appear here; groups are
/// identified by a per-queue sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SendEvent {
    /// A fresh execution group replaced a dead (or missing) one
    GroupCreated {
        group: u64,
        limit: Option<usize>,
        at: DateTime<Utc>,
    },

    /// A submission started; `pending` is the in-flight count after it
    Started {
        group: u64,
        pending: u64,
        at: DateTime<Utc>,
    },

    /// A submission returned; `pending` is the in-flight count after it
    Finished {
        group: u64,
        pending: u64,
        ok: bool,
        at: DateTime<Utc>,
    },

    /// A non-blocking send found no free slot
    Rejected { at: DateTime<Utc> },

    /// A failed submission cancelled its siblings
    GroupCancelled { group: u64, at: DateTime<Utc> },
}

impl SendEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GroupCreated { .. } => "group_created",
            Self::Started { .. } => "started",
            Self::Finished { .. } => "finished",
            Self::Rejected { .. } => "rejected",
            Self::GroupCancelled { .. } => "group_cancelled",
        }
    }

    /// Group the event belongs to, if any
    pub fn group(&self) -> Option<u64> {
        match self {
            Self::GroupCreated { group, .. }
            | Self::Started { group, .. }
            | Self::Finished { group, .. }
            | Self::GroupCancelled { group, .. } => Some(*group),
            Self::Rejected { .. } => None,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::GroupCreated { at, .. }
            | Self::Started { at, .. }
            | Self::Finished { at, .. }
            | Self::Rejected { at }
            | Self::GroupCancelled { at, .. } => at,
        }
    }
}
