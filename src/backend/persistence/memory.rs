//! In-process workspace store
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests. Rows
//! live in ordered maps behind one async lock, so every reconciliation pass
//! is atomic just like the Postgres transaction.

use super::reconciler::ReconcilePlan;
use super::store::{
    ExistingRows, PersistenceError, PointRow, ReconcileReport, ScreenRow, StoredWorkspace, WorkspaceStore,
    DEFAULT_WORKSPACE_NAME,
};
use crate::shared::{Delta, WorkspaceSnapshot};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// `(workspace_id, row id)`, the primary key of screens and points
type RowKey = (String, String);

#[derive(Debug, Default)]
struct Tables {
    workspaces: BTreeMap<String, String>,
    states: BTreeMap<String, Delta>,
    screens: BTreeMap<RowKey, ScreenRow>,
    points: BTreeMap<RowKey, PointRow>,
}

fn key(workspace_id: &str, id: &str) -> RowKey {
    (workspace_id.to_string(), id.to_string())
}

impl Tables {
    fn rows_for(&self, workspace_id: &str) -> ExistingRows {
        let screens = self
            .screens
            .iter()
            .filter(|((ws, _), _)| ws == workspace_id)
            .map(|(_, row)| row.clone())
            .collect();
        let points = self
            .points
            .iter()
            .filter(|((ws, _), _)| ws == workspace_id)
            .map(|(_, row)| row.clone())
            .collect();

        ExistingRows {
            workspace_exists: self.workspaces.contains_key(workspace_id),
            screens,
            points,
        }
    }

    fn apply(&mut self, workspace_id: &str, plan: &ReconcilePlan) {
        if plan.create_workspace {
            self.workspaces
                .insert(workspace_id.to_string(), DEFAULT_WORKSPACE_NAME.to_string());
        }
        for row in &plan.upsert_screens {
            self.screens.insert(key(workspace_id, &row.id), row.clone());
        }
        for row in &plan.upsert_points {
            self.points.insert(key(workspace_id, &row.id), row.clone());
        }
        for id in &plan.delete_points {
            self.points.remove(&key(workspace_id, id));
        }
        for id in &plan.delete_screens {
            self.screens.remove(&key(workspace_id, id));
            // ON DELETE CASCADE
            self.points
                .retain(|(ws, _), row| ws != workspace_id || &row.screen_id != id);
        }
    }
}

/// Workspace store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryWorkspaceStore {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
    runs: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryWorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the rows of `snapshot` and no replica state
    pub async fn seeded(workspace_id: &str, snapshot: &WorkspaceSnapshot) -> Result<Self, PersistenceError> {
        let store = Self::new();
        store.reconcile(workspace_id, snapshot, None).await?;
        store.writes.store(0, Ordering::SeqCst);
        store.runs.store(0, Ordering::SeqCst);
        Ok(store)
    }

    /// Make every subsequent call fail with `Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total writes across all reconciliation passes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful reconciliation passes
    pub fn reconcile_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub async fn rows(&self, workspace_id: &str) -> ExistingRows {
        self.tables.lock().await.rows_for(workspace_id)
    }

    /// Encoded replica state last written for a workspace
    pub async fn state(&self, workspace_id: &str) -> Option<Delta> {
        self.tables.lock().await.states.get(workspace_id).cloned()
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::unavailable("memory store switched to failing"));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for MemoryWorkspaceStore {
    async fn load(&self, workspace_id: &str) -> Result<Option<StoredWorkspace>, PersistenceError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let rows = tables.rows_for(workspace_id);
        if !rows.workspace_exists {
            return Ok(None);
        }
        Ok(Some(StoredWorkspace {
            snapshot: rows.into_snapshot(),
            state: tables.states.get(workspace_id).cloned(),
        }))
    }

    async fn reconcile(
        &self,
        workspace_id: &str,
        snapshot: &WorkspaceSnapshot,
        state: Option<&[u8]>,
    ) -> Result<ReconcileReport, PersistenceError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let existing = tables.rows_for(workspace_id);
        let plan = ReconcilePlan::compute(workspace_id, &existing, snapshot);
        tables.apply(workspace_id, &plan);

        let mut report = plan.report();
        if let Some(state) = state {
            tables.states.insert(workspace_id.to_string(), state.to_vec());
            report.state_written = true;
        }
        self.writes.fetch_add(report.total_writes(), Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(report)
    }
}
