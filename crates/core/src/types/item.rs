//! Library item metadata snapshots

use crate::types::{RelativePath, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of library item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    /// Single audio file
    Book,
    /// Plain folder of items
    Folder,
    /// Folder of files played back as one book
    Bound,
}

impl ItemType {
    /// Folders and bound books are containers of remote files
    pub fn is_container(&self) -> bool {
        matches!(self, ItemType::Folder | ItemType::Bound)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Book => "book",
            ItemType::Folder => "folder",
            ItemType::Bound => "bound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "book" => Some(ItemType::Book),
            "folder" => Some(ItemType::Folder),
            "bound" => Some(ItemType::Bound),
            _ => None,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full metadata snapshot of a library item, as uploaded on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub relative_path: RelativePath,
    pub title: String,
    /// Author or other descriptive details
    pub details: String,
    pub speed: Option<f32>,
    /// Playback position in seconds
    pub current_time: f64,
    /// Total duration in seconds
    pub duration: f64,
    pub percent_completed: f64,
    pub is_finished: bool,
    pub order_rank: i64,
    pub last_play_date: Option<Timestamp>,
    pub item_type: ItemType,
}

impl ItemMetadata {
    /// Creates a snapshot for a new, unplayed item
    pub fn new(relative_path: RelativePath, title: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            relative_path,
            title: title.into(),
            details: String::new(),
            speed: None,
            current_time: 0.0,
            duration: 0.0,
            percent_completed: 0.0,
            is_finished: false,
            order_rank: 0,
            last_play_date: None,
            item_type,
        }
    }

    /// Overlays every field present in `update`
    pub fn apply(&mut self, update: &MetadataUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(details) = &update.details {
            self.details = details.clone();
        }
        if let Some(speed) = update.speed {
            self.speed = Some(speed);
        }
        if let Some(current_time) = update.current_time {
            self.current_time = current_time;
        }
        if let Some(duration) = update.duration {
            self.duration = duration;
        }
        if let Some(percent) = update.percent_completed {
            self.percent_completed = percent;
        }
        if let Some(is_finished) = update.is_finished {
            self.is_finished = is_finished;
        }
        if let Some(order_rank) = update.order_rank {
            self.order_rank = order_rank;
        }
        if let Some(last_play_date) = update.last_play_date {
            self.last_play_date = Some(last_play_date);
        }
    }

    /// True if the playback progress of the two snapshots disagrees
    pub fn progress_differs(&self, other: &ItemMetadata) -> bool {
        const EPSILON: f64 = 0.001;
        (self.current_time - other.current_time).abs() > EPSILON
            || (self.duration - other.duration).abs() > EPSILON
            || (self.percent_completed - other.percent_completed).abs() > EPSILON
    }

    /// Update carrying this snapshot's playback state
    pub fn progress_update(&self) -> MetadataUpdate {
        MetadataUpdate {
            current_time: Some(self.current_time),
            duration: Some(self.duration),
            percent_completed: Some(self.percent_completed),
            is_finished: Some(self.is_finished),
            last_play_date: self.last_play_date,
            ..Default::default()
        }
    }
}

/// Partial metadata change; `None` fields are left untouched remotely
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_completed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_finished: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_play_date: Option<Timestamp>,
}

impl MetadataUpdate {
    /// Returns `self` with every field present in `newer` taking precedence
    pub fn merged_with(&self, newer: &MetadataUpdate) -> MetadataUpdate {
        MetadataUpdate {
            title: newer.title.clone().or_else(|| self.title.clone()),
            details: newer.details.clone().or_else(|| self.details.clone()),
            speed: newer.speed.or(self.speed),
            current_time: newer.current_time.or(self.current_time),
            duration: newer.duration.or(self.duration),
            percent_completed: newer.percent_completed.or(self.percent_completed),
            is_finished: newer.is_finished.or(self.is_finished),
            order_rank: newer.order_rank.or(self.order_rank),
            last_play_date: newer.last_play_date.or(self.last_play_date),
        }
    }

    /// True if no field is set
    pub fn is_empty(&self) -> bool {
        *self == MetadataUpdate::default()
    }
}
