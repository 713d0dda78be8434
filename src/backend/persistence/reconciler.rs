//! Persistence Reconciler
//!
//! Computes the row writes that make the stored rows of a workspace match a
//! replica snapshot. The plan is pure: stores load their rows, compute the
//! plan and apply it inside their own transaction.
//!
//! Only rows whose content differs are written, so reconciling the same
//! snapshot twice produces an empty plan on the second run.
//!
//! # Rules
//!
//! 1. Create the workspace row if it is missing.
//! 2. Upsert every screen of the snapshot.
//! 3. Upsert every durable conversation point (non-empty html) with its
//!    ordinal position as `sort_index`; delete stored points of that screen
//!    that are no longer durable in the snapshot.
//! 4. Delete stored screens that are absent from the snapshot. Their points
//!    go with them.

use super::store::{ExistingRows, PointRow, ReconcileReport, ScreenRow};
use crate::shared::WorkspaceSnapshot;
use std::collections::{HashMap, HashSet};

/// Row writes needed to reconcile one workspace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub create_workspace: bool,
    pub upsert_screens: Vec<ScreenRow>,
    pub upsert_points: Vec<PointRow>,
    /// Ids of point rows to delete
    pub delete_points: Vec<String>,
    /// Ids of screen rows to delete
    pub delete_screens: Vec<String>,
}

impl ReconcilePlan {
    pub fn compute(workspace_id: &str, existing: &ExistingRows, snapshot: &WorkspaceSnapshot) -> Self {
        let stored_screens: HashMap<&str, &ScreenRow> =
            existing.screens.iter().map(|row| (row.id.as_str(), row)).collect();
        let stored_points: HashMap<&str, &PointRow> =
            existing.points.iter().map(|row| (row.id.as_str(), row)).collect();

        let mut plan = ReconcilePlan {
            create_workspace: !existing.workspace_exists,
            ..Default::default()
        };

        let mut live_points: HashSet<String> = HashSet::new();
        for screen in snapshot.screens.values() {
            let row = ScreenRow::from_entry(workspace_id, screen);
            if stored_screens.get(row.id.as_str()) != Some(&&row) {
                plan.upsert_screens.push(row);
            }

            for (index, point) in screen.durable_points().enumerate() {
                let sort_index = i32::try_from(index).unwrap_or(i32::MAX);
                let row = PointRow::from_point(&screen.id, point, sort_index);
                if stored_points.get(row.id.as_str()) != Some(&&row) {
                    plan.upsert_points.push(row.clone());
                }
                live_points.insert(row.id);
            }
        }

        for row in &existing.points {
            // Points of deleted screens are removed with their screen row
            if snapshot.screens.contains_key(&row.screen_id) && !live_points.contains(&row.id) {
                plan.delete_points.push(row.id.clone());
            }
        }

        for row in &existing.screens {
            if !snapshot.screens.contains_key(&row.id) {
                plan.delete_screens.push(row.id.clone());
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.report().is_noop()
    }

    /// Counts the plan will produce once applied
    pub fn report(&self) -> ReconcileReport {
        ReconcileReport {
            workspace_created: self.create_workspace,
            screens_upserted: self.upsert_screens.len(),
            screens_deleted: self.delete_screens.len(),
            points_upserted: self.upsert_points.len(),
            points_deleted: self.delete_points.len(),
            state_written: false,
        }
    }
}
