/**
 * Workspace Store
 *
 * The durable side of a workspace: the encoded replica state plus
 * relational rows for screens and conversation points. The hub only talks
 * to a store through the [`WorkspaceStore`] trait so that the Postgres
 * implementation and the in-process one used without a database are
 * interchangeable.
 *
 * Rooms are restored from the replica state, which keeps the history peers
 * need to merge edits made while the room was unloaded. The rows are the
 * queryable projection of the same state; they seed a room only when no
 * state was ever written.
 *
 * # Row Identity
 *
 * - Screens are keyed by workspace and the screen id the replica uses.
 * - Conversation points are keyed by workspace and `"{screen_id}:{timestamp}"`
 *   and carry a `sort_index`, their position in the screen's ordered list of
 *   durable points.
 */

use crate::shared::{Arrow, ConversationPoint, Delta, Position, ScreenEntry, WorkspaceSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Name given to workspace rows created by reconciliation
pub const DEFAULT_WORKSPACE_NAME: &str = "Untitled workspace";

/// Errors raised by a workspace store
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl PersistenceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Row counts touched by one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub workspace_created: bool,
    /// The encoded replica state was replaced
    pub state_written: bool,
    pub screens_upserted: usize,
    pub screens_deleted: usize,
    pub points_upserted: usize,
    pub points_deleted: usize,
}

impl ReconcileReport {
    /// Number of row writes the pass performed
    pub fn total_writes(&self) -> usize {
        usize::from(self.workspace_created)
            + usize::from(self.state_written)
            + self.screens_upserted
            + self.screens_deleted
            + self.points_upserted
            + self.points_deleted
    }

    pub fn is_noop(&self) -> bool {
        self.total_writes() == 0
    }
}

/// Everything stored for one workspace
#[derive(Debug, Clone, PartialEq)]
pub struct StoredWorkspace {
    /// Projection rebuilt from the rows
    pub snapshot: WorkspaceSnapshot,
    /// Encoded replica state, `None` for rows written without one
    pub state: Option<Delta>,
}

/// Durable storage for workspace snapshots
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Load a workspace, `None` if it was never persisted
    async fn load(&self, workspace_id: &str) -> Result<Option<StoredWorkspace>, PersistenceError>;

    /// Make the durable rows match `snapshot` in a single transaction
    ///
    /// When `state` is given the encoded replica state is replaced in the
    /// same transaction; `None` leaves the stored state as it is.
    async fn reconcile(
        &self,
        workspace_id: &str,
        snapshot: &WorkspaceSnapshot,
        state: Option<&[u8]>,
    ) -> Result<ReconcileReport, PersistenceError>;

    /// Load only the row projection of a workspace
    async fn load_snapshot(&self, workspace_id: &str) -> Result<Option<WorkspaceSnapshot>, PersistenceError> {
        Ok(self.load(workspace_id).await?.map(|stored| stored.snapshot))
    }
}

/// A `screens` row
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenRow {
    pub id: String,
    pub workspace_id: String,
    pub position: Option<Position>,
    pub height: Option<f64>,
    pub selected_index: Option<i64>,
}

impl ScreenRow {
    pub fn from_entry(workspace_id: &str, screen: &ScreenEntry) -> Self {
        Self {
            id: screen.id.clone(),
            workspace_id: workspace_id.to_string(),
            position: screen.position,
            height: screen.height,
            selected_index: screen.selected_index,
        }
    }
}

/// A `conversation_points` row
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    pub id: String,
    pub screen_id: String,
    pub prompt: String,
    pub html: String,
    pub title: String,
    pub timestamp: i64,
    pub arrows: Vec<Arrow>,
    pub sort_index: i32,
}

impl PointRow {
    pub fn from_point(screen_id: &str, point: &ConversationPoint, sort_index: i32) -> Self {
        Self {
            id: point_row_id(screen_id, point.timestamp),
            screen_id: screen_id.to_string(),
            prompt: point.prompt.clone(),
            html: point.html.clone(),
            title: point.title.clone(),
            timestamp: point.timestamp,
            arrows: point.arrows.clone(),
            sort_index,
        }
    }

    pub fn to_point(&self) -> ConversationPoint {
        ConversationPoint {
            prompt: self.prompt.clone(),
            html: self.html.clone(),
            title: self.title.clone(),
            timestamp: self.timestamp,
            arrows: self.arrows.clone(),
        }
    }
}

/// Identifier of a conversation point row
pub fn point_row_id(screen_id: &str, timestamp: i64) -> String {
    format!("{}:{}", screen_id, timestamp)
}

/// Rows currently stored for one workspace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingRows {
    pub workspace_exists: bool,
    pub screens: Vec<ScreenRow>,
    pub points: Vec<PointRow>,
}

impl ExistingRows {
    /// Rebuild the snapshot the rows describe
    pub fn into_snapshot(self) -> WorkspaceSnapshot {
        let mut snapshot = WorkspaceSnapshot::new();
        for row in self.screens {
            let mut screen = ScreenEntry::new(row.id);
            screen.position = row.position;
            screen.height = row.height;
            screen.selected_index = row.selected_index;
            snapshot.screens.insert(screen.id.clone(), screen);
        }

        let mut points = self.points;
        points.sort_by_key(|p| (p.sort_index, p.timestamp));
        for row in points {
            match snapshot.screens.get_mut(&row.screen_id) {
                Some(screen) => screen.conversation_points.push(row.to_point()),
                None => tracing::warn!("[Persist] Point {} has no screen row, skipping", row.id),
            }
        }
        for screen in snapshot.screens.values_mut() {
            screen.conversation_points.sort_by_key(|p| p.timestamp);
        }
        snapshot
    }
}
