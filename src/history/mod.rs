//! # Directory History
//!
//! The persisted record of every directory the daemon has ever seen in use,
//! keyed by absolute path.
//!
//! ## Storage
//!
//! The whole history is one JSON file in the XDG data directory:
//!
//! ```text
//! ~/.local/share/recent-dirs/history.json
//! ```
//!
//! ## Data Format
//!
//! ```json
//! {
//!   "/home/user/projects/recent-dirs": {
//!     "path": "/home/user/projects/recent-dirs",
//!     "last_access": "2025-02-05T10:30:00Z"
//!   }
//! }
//! ```
//!
//! Saves are atomic (temp file + rename), so a crash mid-write never
//! corrupts the previous snapshot. Loads are tolerant: a missing, unreadable
//! or corrupt file yields an empty history and the daemon starts cold.

mod store;

pub use store::HistoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Usage record for a single directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirUsage {
    /// Absolute path of the directory; identity key in the history map.
    pub path: PathBuf,
    /// When the directory was most recently seen in use.
    pub last_access: DateTime<Utc>,
}

impl DirUsage {
    /// Create a record for a directory observed right now.
    pub fn now(path: PathBuf) -> Self {
        Self {
            path,
            last_access: Utc::now(),
        }
    }
}

/// The full in-memory history: one entry per distinct directory path.
pub type HistoryMap = HashMap<PathBuf, DirUsage>;
