//! Domain types for the quadrant to-do lists.
//!
//! Items serialize to camelCase JSON. The same shape is used for locally
//! stored lists and for remote records, with `currentSessionStart` encoded as
//! epoch milliseconds.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Opaque identifier of a to-do item.
///
/// Local items use a UUID v4; remote items use the object store's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One of the four urgency x importance quadrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Important & Urgent")]
    ImportantUrgent,
    #[serde(rename = "Important & Not Urgent")]
    ImportantNotUrgent,
    #[serde(rename = "Not Important & Urgent")]
    NotImportantUrgent,
    #[serde(rename = "Not Important & Not Urgent")]
    NotImportantNotUrgent,
}

impl Category {
    /// All quadrants in display order.
    pub const ALL: [Category; 4] = [
        Category::ImportantUrgent,
        Category::ImportantNotUrgent,
        Category::NotImportantUrgent,
        Category::NotImportantNotUrgent,
    ];

    /// Display label, also used as the storage key and remote field value.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ImportantUrgent => "Important & Urgent",
            Self::ImportantNotUrgent => "Important & Not Urgent",
            Self::NotImportantUrgent => "Not Important & Urgent",
            Self::NotImportantNotUrgent => "Not Important & Not Urgent",
        }
    }

    /// Short kebab-case name for command lines.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::ImportantUrgent => "important-urgent",
            Self::ImportantNotUrgent => "important-not-urgent",
            Self::NotImportantUrgent => "not-important-urgent",
            Self::NotImportantNotUrgent => "not-important-not-urgent",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(wanted) || c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnknownCategory(wanted.to_string()))
    }
}

/// A single to-do entry with its tracked time.
///
/// `current_session_start` is set if and only if this item is the running
/// item of its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: ItemId,

    pub name: String,

    #[serde(default)]
    pub done: bool,

    /// Whole seconds credited by completed sessions.
    #[serde(default)]
    pub total_time: u64,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub current_session_start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    /// Creates a not-done item with no tracked time and a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::generate(),
            name: name.into(),
            done: false,
            total_time: 0,
            current_session_start: None,
            category: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Returns `true` while a timer session is open on this item.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current_session_start.is_some()
    }

    /// Seconds elapsed in the open session, or 0 when none is open.
    #[must_use]
    pub fn session_elapsed(&self, now: DateTime<Utc>) -> u64 {
        self.current_session_start
            .map(|start| elapsed_seconds(start, now))
            .unwrap_or(0)
    }

    /// Total plus the open session's elapsed seconds.
    #[must_use]
    pub fn display_time(&self, now: DateTime<Utc>) -> u64 {
        self.total_time.saturating_add(self.session_elapsed(now))
    }
}

/// Whole seconds between `start` and `now`, truncated, never negative.
#[must_use]
pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}

/// Partial update of an item.
///
/// `current_session_start` is tri-state: `None` leaves it untouched,
/// `Some(None)` clears it and `Some(Some(t))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub done: Option<bool>,
    pub total_time: Option<u64>,
    pub current_session_start: Option<Option<DateTime<Utc>>>,
}

impl ItemPatch {
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn done(done: bool) -> Self {
        Self {
            done: Some(done),
            ..Self::default()
        }
    }

    /// Patch carrying the timer-owned fields of `item`.
    #[must_use]
    pub fn session_of(item: &TodoItem) -> Self {
        Self {
            total_time: Some(item.total_time),
            current_session_start: Some(item.current_session_start),
            ..Self::default()
        }
    }

    /// Patch that clears the open session without crediting time.
    #[must_use]
    pub fn clear_session() -> Self {
        Self {
            current_session_start: Some(None),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.done.is_none()
            && self.total_time.is_none()
            && self.current_session_start.is_none()
    }

    /// Returns `true` if the patch writes `totalTime` or `currentSessionStart`.
    #[must_use]
    pub fn touches_session(&self) -> bool {
        self.total_time.is_some() || self.current_session_start.is_some()
    }

    /// Merges the set fields into `item`.
    pub fn apply_to(&self, item: &mut TodoItem) {
        if let Some(name) = &self.name {
            item.name.clone_from(name);
        }
        if let Some(done) = self.done {
            item.done = done;
        }
        if let Some(total) = self.total_time {
            item.total_time = total;
        }
        if let Some(start) = self.current_session_start {
            item.current_session_start = start;
        }
    }
}

/// Trims `name` and rejects it if nothing is left.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn new_item_starts_idle() {
        let item = TodoItem::new("Write report");
        assert_eq!(item.name, "Write report");
        assert!(!item.done);
        assert_eq!(item.total_time, 0);
        assert!(!item.is_running());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ItemId::generate(), ItemId::generate());
    }

    #[test]
    fn display_time_adds_open_session() {
        let mut item = TodoItem::new("a");
        item.total_time = 10;
        item.current_session_start = Some(at(0));
        assert_eq!(item.display_time(at(5)), 15);
    }

    #[test]
    fn elapsed_truncates_partial_seconds() {
        let start = at(0);
        let now = start + Duration::milliseconds(65_999);
        assert_eq!(elapsed_seconds(start, now), 65);
    }

    #[test]
    fn elapsed_never_negative() {
        assert_eq!(elapsed_seconds(at(10), at(0)), 0);
    }

    #[test]
    fn category_parses_slug_and_label() {
        assert_eq!(
            "important-urgent".parse::<Category>().unwrap(),
            Category::ImportantUrgent
        );
        assert_eq!(
            "not important & not urgent".parse::<Category>().unwrap(),
            Category::NotImportantNotUrgent
        );
        assert!(matches!(
            "someday".parse::<Category>(),
            Err(ValidationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn category_serializes_as_label() {
        let json = serde_json::to_string(&Category::ImportantNotUrgent).unwrap();
        assert_eq!(json, "\"Important & Not Urgent\"");
    }

    #[test]
    fn item_serializes_camel_case_with_millis() {
        let mut item = TodoItem::new("a");
        item.current_session_start = Some(at(0));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["totalTime"], 0);
        assert_eq!(value["currentSessionStart"], 1_700_000_000_000_i64);
        assert!(value.get("category").is_none());
    }

    #[test]
    fn legacy_item_without_time_fields_deserializes() {
        let json = r#"{"id":"1","name":"old","done":true}"#;
        let item: TodoItem = serde_json::from_str(json).unwrap();
        assert!(item.done);
        assert_eq!(item.total_time, 0);
        assert!(item.current_session_start.is_none());
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut item = TodoItem::new("a");
        item.total_time = 7;
        ItemPatch::rename("b").apply_to(&mut item);
        assert_eq!(item.name, "b");
        assert_eq!(item.total_time, 7);

        item.current_session_start = Some(at(0));
        ItemPatch::clear_session().apply_to(&mut item);
        assert!(item.current_session_start.is_none());
        assert_eq!(item.total_time, 7);
    }

    #[test]
    fn patch_classification() {
        assert!(ItemPatch::default().is_empty());
        assert!(!ItemPatch::done(true).touches_session());
        assert!(ItemPatch::clear_session().touches_session());
    }

    #[test]
    fn validate_name_trims() {
        assert_eq!(validate_name("  hi ").unwrap(), "hi");
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
    }
}
