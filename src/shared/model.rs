//! Workspace Model Types
//!
//! Plain data materialized from a replica document. These are what the
//! persistence layer writes to relational rows and what tests compare when
//! checking that replicas converged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canvas coordinates of a screen or an arrow anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Arrow from an element inside a generated screen to another screen
///
/// The arrow list of a conversation point is stored as one opaque value:
/// concurrent writers do not merge element-wise, the last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrow {
    pub touchable_id: String,
    pub target_screen_id: String,
    pub start_point: Position,
}

/// One prompt/response turn on a screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationPoint {
    pub prompt: String,
    pub html: String,
    pub title: String,
    /// Milliseconds since the epoch. Orders points and identifies them
    /// within their screen.
    pub timestamp: i64,
    #[serde(default)]
    pub arrows: Vec<Arrow>,
}

impl ConversationPoint {
    pub fn new(timestamp: i64, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            html: String::new(),
            title: String::new(),
            timestamp,
            arrows: Vec::new(),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_arrows(mut self, arrows: Vec<Arrow>) -> Self {
        self.arrows = arrows;
        self
    }

    /// Points with generated content are persisted; the rest are
    /// placeholders that only live in replicas.
    pub fn is_durable(&self) -> bool {
        !self.html.is_empty()
    }
}

/// A screen on the workspace canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenEntry {
    pub id: String,
    pub position: Option<Position>,
    pub height: Option<f64>,
    pub selected_index: Option<i64>,
    /// Sorted ascending by timestamp
    pub conversation_points: Vec<ConversationPoint>,
}

impl ScreenEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
            height: None,
            selected_index: None,
            conversation_points: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_selected_index(mut self, index: i64) -> Self {
        self.selected_index = Some(index);
        self
    }

    pub fn with_point(mut self, point: ConversationPoint) -> Self {
        self.conversation_points.push(point);
        self.conversation_points.sort_by_key(|p| p.timestamp);
        self
    }

    pub fn point(&self, timestamp: i64) -> Option<&ConversationPoint> {
        self.conversation_points.iter().find(|p| p.timestamp == timestamp)
    }

    /// Durable points in timestamp order
    pub fn durable_points(&self) -> impl Iterator<Item = &ConversationPoint> {
        self.conversation_points.iter().filter(|p| p.is_durable())
    }
}

/// Materialized content of a workspace replica
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub screens: BTreeMap<String, ScreenEntry>,
}

impl WorkspaceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(mut self, screen: ScreenEntry) -> Self {
        self.screens.insert(screen.id.clone(), screen);
        self
    }

    pub fn screen(&self, id: &str) -> Option<&ScreenEntry> {
        self.screens.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn durable_point_count(&self) -> usize {
        self.screens.values().map(|s| s.durable_points().count()).sum()
    }
}
