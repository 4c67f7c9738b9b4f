//! Daily trigger times and their JSON store
//!
//! Times are `HH:MM` in process-local wall-clock time. The store file looks
//! like:
//!
//! ```json
//! { "schedule": [ { "time": "09:00" }, { "time": "18:30" } ] }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, PairpostError, Result};
use crate::users::ensure_exists;

/// How late a trigger may be noticed and still fire
pub const FIRE_GRACE_SECONDS: i64 = 60;

/// One daily trigger time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEntry", into = "RawEntry")]
pub struct ScheduleEntry {
    time: NaiveTime,
}

#[derive(Serialize, Deserialize)]
struct RawEntry {
    time: String,
}

impl ScheduleEntry {
    pub fn new(time: NaiveTime) -> Self {
        Self { time }
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// First occurrence of this time strictly after `after`
    pub fn next_after(&self, after: NaiveDateTime) -> NaiveDateTime {
        let candidate = after.date().and_time(self.time);
        if candidate > after {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }
}

impl FromStr for ScheduleEntry {
    type Err = PairpostError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let valid_shape = trimmed
            .split_once(':')
            .map(|(h, m)| {
                (1..=2).contains(&h.len())
                    && m.len() == 2
                    && h.chars().all(|c| c.is_ascii_digit())
                    && m.chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false);

        let time = valid_shape
            .then(|| NaiveTime::parse_from_str(trimmed, "%H:%M").ok())
            .flatten()
            .ok_or_else(|| {
                PairpostError::InvalidArgument(format!(
                    "Invalid time '{}': expected HH:MM (00:00-23:59)",
                    s
                ))
            })?;

        Ok(Self { time })
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format("%H:%M"))
    }
}

impl TryFrom<RawEntry> for ScheduleEntry {
    type Error = PairpostError;

    fn try_from(raw: RawEntry) -> Result<Self> {
        raw.time.parse()
    }
}

impl From<ScheduleEntry> for RawEntry {
    fn from(entry: ScheduleEntry) -> Self {
        RawEntry {
            time: entry.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    schedule: Vec<ScheduleEntry>,
}

/// Set of trigger times persisted after every mutation
#[derive(Debug)]
pub struct ScheduleStore {
    path: PathBuf,
    entries: BTreeSet<ScheduleEntry>,
}

impl ScheduleStore {
    /// Load the store, treating a missing file as an empty schedule
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(path = %path.display(), "schedule file not found, starting empty");
            return Ok(Self {
                path,
                entries: BTreeSet::new(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let file: ScheduleFile = if content.trim().is_empty() {
            ScheduleFile::default()
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.clone(),
                source,
            })?
        };

        let entries: BTreeSet<ScheduleEntry> = file.schedule.into_iter().collect();
        debug!(path = %path.display(), entries = entries.len(), "loaded schedule");
        Ok(Self { path, entries })
    }

    /// Load the store, failing when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_exists(&path)?;
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in time-of-day order
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.entries.iter().copied().collect()
    }

    /// Add a time and persist; returns `false` if it was already present
    pub fn add(&mut self, entry: ScheduleEntry) -> Result<bool> {
        if !self.entries.insert(entry) {
            debug!(time = %entry, "time already scheduled");
            return Ok(false);
        }
        self.save()?;
        info!(time = %entry, "added schedule time");
        Ok(true)
    }

    /// Remove a time and persist; returns `false` if it was not present
    pub fn remove(&mut self, entry: ScheduleEntry) -> Result<bool> {
        if !self.entries.remove(&entry) {
            return Ok(false);
        }
        self.save()?;
        info!(time = %entry, "removed schedule time");
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = ScheduleFile {
            schedule: self.entries(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| ConfigError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Triggers that came due in one poll
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TriggerPoll {
    pub fired: Vec<ScheduleEntry>,
    pub missed: Vec<ScheduleEntry>,
}

impl TriggerPoll {
    pub fn should_run(&self) -> bool {
        !self.fired.is_empty()
    }
}

/// Next due time for each entry
///
/// A trigger noticed more than [`FIRE_GRACE_SECONDS`] after its due time is
/// reported as missed. Fired and missed triggers alike move on to their next
/// daily occurrence, so nothing is ever caught up. Triggers that come due
/// while a run is in progress are consumed with [`DailyTriggers::skip_through`]
/// once it returns.
#[derive(Debug, Default)]
pub struct DailyTriggers {
    next_due: BTreeMap<ScheduleEntry, NaiveDateTime>,
}

impl DailyTriggers {
    pub fn new(entries: impl IntoIterator<Item = ScheduleEntry>, now: NaiveDateTime) -> Self {
        let mut triggers = Self::default();
        for entry in entries {
            triggers.add(entry, now);
        }
        triggers
    }

    pub fn add(&mut self, entry: ScheduleEntry, now: NaiveDateTime) {
        self.next_due.entry(entry).or_insert_with(|| entry.next_after(now));
    }

    pub fn remove(&mut self, entry: &ScheduleEntry) -> bool {
        self.next_due.remove(entry).is_some()
    }

    pub fn len(&self) -> usize {
        self.next_due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_due.is_empty()
    }

    /// Earliest upcoming trigger
    pub fn next_due(&self) -> Option<(ScheduleEntry, NaiveDateTime)> {
        self.next_due
            .iter()
            .min_by_key(|(_, due)| **due)
            .map(|(entry, due)| (*entry, *due))
    }

    pub fn poll(&mut self, now: NaiveDateTime) -> TriggerPoll {
        let grace = Duration::seconds(FIRE_GRACE_SECONDS);
        let mut result = TriggerPoll::default();

        for (entry, due) in self.next_due.iter_mut() {
            if *due > now {
                continue;
            }

            if now - *due <= grace {
                result.fired.push(*entry);
            } else {
                result.missed.push(*entry);
            }
            *due = entry.next_after(now);
        }

        result
    }

    /// Roll every trigger due at or before `now` on to its next occurrence
    ///
    /// Returns the skipped entries. Used after a run so triggers that passed
    /// while it was blocking are missed rather than fired late.
    pub fn skip_through(&mut self, now: NaiveDateTime) -> Vec<ScheduleEntry> {
        let mut skipped = Vec::new();
        for (entry, due) in self.next_due.iter_mut() {
            if *due <= now {
                skipped.push(*entry);
                *due = entry.next_after(now);
            }
        }
        skipped
    }
}
