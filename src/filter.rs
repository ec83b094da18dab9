//! Key and recency predicates that decide which listed objects count as backups.

use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::contract::ListedObject;

/// A listed object that passed both the key pattern and the recency window.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupCandidate {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Case-insensitive regex anchored at the start of the key.
///
/// Only the start is anchored: `db_` matches `db_2024.bak`, and `.*\.bak$`
/// matches any key ending in `.bak`. A key does not have to be consumed in full.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    compiled: Regex,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let compiled = RegexBuilder::new(&format!("^(?:{pattern})"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            source: pattern.to_string(),
            compiled,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.compiled.is_match(key)
    }

    /// The pattern as the user wrote it.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Trailing time window an object's modification time must fall into.
#[derive(Debug, Clone, Copy)]
pub struct RecencyWindow {
    max_age: Duration,
}

impl RecencyWindow {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours.min(u32::MAX as u64) as i64))
    }

    /// Strictly newer than `now - max_age`. Objects without a timestamp never qualify.
    pub fn is_recent_at(&self, last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_modified {
            // a window reaching past the start of representable time admits everything
            Some(modified) => match now.checked_sub_signed(self.max_age) {
                Some(cutoff) => modified > cutoff,
                None => true,
            },
            None => false,
        }
    }
}

/// Keep the objects matching both predicates, in listing order.
///
/// Key shape plays no part: a matching, recent key ending in `/` is a candidate too.
pub fn select_candidates(
    objects: Vec<ListedObject>,
    pattern: &KeyPattern,
    window: &RecencyWindow,
    now: DateTime<Utc>,
) -> Vec<BackupCandidate> {
    let mut candidates = Vec::new();
    for obj in objects {
        if !pattern.matches(&obj.key) {
            continue;
        }
        let last_modified = match obj.last_modified {
            Some(modified) if window.is_recent_at(Some(modified), now) => modified,
            other => {
                debug!(key = %obj.key, last_modified = ?other, "Matching key is not recent");
                continue;
            }
        };
        info!(
            key = %obj.key,
            modified = %last_modified,
            size = obj.size,
            "Recent backup found"
        );
        candidates.push(BackupCandidate {
            key: obj.key,
            last_modified,
            size: obj.size,
        });
    }
    candidates
}
