//! Persistence Module
//!
//! Reconciles live workspace replicas into relational rows and keeps their
//! encoded state.
//!
//! # Module Structure
//!
//! ```text
//! persistence/
//! ├── mod.rs        - Module exports
//! ├── store.rs      - WorkspaceStore trait, row types, errors
//! ├── reconciler.rs - Pure reconciliation plan
//! ├── postgres.rs   - sqlx Postgres store
//! ├── memory.rs     - In-process store
//! └── queue.rs      - Bounded per-workspace queue and stats
//! ```

pub mod memory;
pub mod postgres;
pub mod queue;
pub mod reconciler;
pub mod store;

pub use memory::MemoryWorkspaceStore;
pub use postgres::PgWorkspaceStore;
pub use queue::{PersistenceQueue, PersistenceStats, PersistenceStatsSnapshot, ScheduleOutcome};
pub use reconciler::ReconcilePlan;
pub use store::{
    point_row_id, ExistingRows, PersistenceError, PointRow, ReconcileReport, ScreenRow, StoredWorkspace,
    WorkspaceStore,
};
