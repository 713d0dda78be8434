/**
 * Postgres Workspace Store
 *
 * Persists workspace snapshots to the relational layout created by the
 * migrations in `migrations/`. A reconciliation pass loads the current rows
 * with row locks, computes a [`ReconcilePlan`], applies it and replaces the
 * encoded replica state, all inside one transaction: a failure midway leaves
 * the previous rows and state untouched.
 */

use super::reconciler::ReconcilePlan;
use super::store::{
    ExistingRows, PersistenceError, PointRow, ReconcileReport, ScreenRow, StoredWorkspace, WorkspaceStore,
    DEFAULT_WORKSPACE_NAME,
};
use crate::shared::{Arrow, Delta, Position, WorkspaceSnapshot};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};

/// Workspace store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgWorkspaceStore {
    pool: PgPool,
}

impl PgWorkspaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Load the rows of a workspace
///
/// With `for_update` the screen rows are locked until the surrounding
/// transaction ends.
async fn load_rows(
    conn: &mut PgConnection,
    workspace_id: &str,
    for_update: bool,
) -> Result<ExistingRows, PersistenceError> {
    let workspace_exists = sqlx::query("SELECT 1 FROM workspaces WHERE id = $1")
        .bind(workspace_id)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();

    let screen_sql = if for_update {
        "SELECT id, workspace_id, position, height, selected_index FROM screens WHERE workspace_id = $1 FOR UPDATE"
    } else {
        "SELECT id, workspace_id, position, height, selected_index FROM screens WHERE workspace_id = $1"
    };
    let screen_rows = sqlx::query(screen_sql)
        .bind(workspace_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut screens = Vec::with_capacity(screen_rows.len());
    for row in screen_rows {
        let position: Option<Json<Position>> = row.try_get("position")?;
        screens.push(ScreenRow {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            position: position.map(|p| p.0),
            height: row.try_get("height")?,
            selected_index: row.try_get("selected_index")?,
        });
    }

    let point_rows = sqlx::query(
        r#"
        SELECT id, screen_id, prompt, html, title, timestamp, arrows, sort_index
        FROM conversation_points
        WHERE workspace_id = $1
        "#,
    )
    .bind(workspace_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut points = Vec::with_capacity(point_rows.len());
    for row in point_rows {
        let arrows: Json<Vec<Arrow>> = row.try_get("arrows")?;
        points.push(PointRow {
            id: row.try_get("id")?,
            screen_id: row.try_get("screen_id")?,
            prompt: row.try_get("prompt")?,
            html: row.try_get("html")?,
            title: row.try_get("title")?,
            timestamp: row.try_get("timestamp")?,
            arrows: arrows.0,
            sort_index: row.try_get("sort_index")?,
        });
    }

    Ok(ExistingRows {
        workspace_exists,
        screens,
        points,
    })
}

async fn apply_plan(
    conn: &mut PgConnection,
    workspace_id: &str,
    plan: &ReconcilePlan,
) -> Result<(), PersistenceError> {
    if plan.create_workspace {
        sqlx::query(
            r#"
            INSERT INTO workspaces (id, name, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(workspace_id)
        .bind(DEFAULT_WORKSPACE_NAME)
        .execute(&mut *conn)
        .await?;
    }

    for row in &plan.upsert_screens {
        sqlx::query(
            r#"
            INSERT INTO screens (id, workspace_id, position, height, selected_index, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (workspace_id, id) DO UPDATE SET
                position = EXCLUDED.position,
                height = EXCLUDED.height,
                selected_index = EXCLUDED.selected_index,
                updated_at = NOW()
            "#,
        )
        .bind(&row.id)
        .bind(&row.workspace_id)
        .bind(row.position.map(Json))
        .bind(row.height)
        .bind(row.selected_index)
        .execute(&mut *conn)
        .await?;
    }

    for row in &plan.upsert_points {
        sqlx::query(
            r#"
            INSERT INTO conversation_points (id, workspace_id, screen_id, prompt, html, title, timestamp, arrows, sort_index, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (workspace_id, id) DO UPDATE SET
                prompt = EXCLUDED.prompt,
                html = EXCLUDED.html,
                title = EXCLUDED.title,
                timestamp = EXCLUDED.timestamp,
                arrows = EXCLUDED.arrows,
                sort_index = EXCLUDED.sort_index,
                updated_at = NOW()
            "#,
        )
        .bind(&row.id)
        .bind(workspace_id)
        .bind(&row.screen_id)
        .bind(&row.prompt)
        .bind(&row.html)
        .bind(&row.title)
        .bind(row.timestamp)
        .bind(Json(&row.arrows))
        .bind(row.sort_index)
        .execute(&mut *conn)
        .await?;
    }

    if !plan.delete_points.is_empty() {
        sqlx::query("DELETE FROM conversation_points WHERE workspace_id = $1 AND id = ANY($2)")
            .bind(workspace_id)
            .bind(&plan.delete_points)
            .execute(&mut *conn)
            .await?;
    }

    if !plan.delete_screens.is_empty() {
        // conversation_points cascade
        sqlx::query("DELETE FROM screens WHERE workspace_id = $1 AND id = ANY($2)")
            .bind(workspace_id)
            .bind(&plan.delete_screens)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn write_state(conn: &mut PgConnection, workspace_id: &str, state: &[u8]) -> Result<(), PersistenceError> {
    sqlx::query("UPDATE workspaces SET crdt_state = $2, updated_at = NOW() WHERE id = $1")
        .bind(workspace_id)
        .bind(state)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl WorkspaceStore for PgWorkspaceStore {
    async fn load(&self, workspace_id: &str) -> Result<Option<StoredWorkspace>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        let rows = load_rows(&mut conn, workspace_id, false).await?;
        if !rows.workspace_exists {
            return Ok(None);
        }
        let state: Option<Delta> = sqlx::query_scalar::<_, Option<Delta>>("SELECT crdt_state FROM workspaces WHERE id = $1")
            .bind(workspace_id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();

        Ok(Some(StoredWorkspace {
            snapshot: rows.into_snapshot(),
            state,
        }))
    }

    async fn reconcile(
        &self,
        workspace_id: &str,
        snapshot: &WorkspaceSnapshot,
        state: Option<&[u8]>,
    ) -> Result<ReconcileReport, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let existing = load_rows(&mut tx, workspace_id, true).await?;
        let plan = ReconcilePlan::compute(workspace_id, &existing, snapshot);
        if plan.is_empty() && state.is_none() {
            tx.rollback().await?;
            return Ok(ReconcileReport::default());
        }

        apply_plan(&mut tx, workspace_id, &plan).await?;
        let mut report = plan.report();
        if let Some(state) = state {
            write_state(&mut tx, workspace_id, state).await?;
            report.state_written = true;
        }
        tx.commit().await?;

        tracing::debug!(
            "[Persist] Reconciled workspace {} with {} writes",
            workspace_id,
            report.total_writes()
        );
        Ok(report)
    }
}
