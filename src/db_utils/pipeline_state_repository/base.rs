use sqlx::SqlitePool;
use std::sync::Arc;

/// Access layer over `pipeline_state`, `mous` and `targets`.
///
/// Every method runs a single statement or a single transaction; no lock is
/// held across calls. Stage claims are compare-and-swap updates so two
/// overlapping dispatcher scans cannot both enter the same stage.
#[derive(Debug, Clone)]
pub struct PipelineStateRepository {
    pub(super) pool: Arc<SqlitePool>,
}

impl PipelineStateRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> Arc<SqlitePool> {
        self.pool.clone()
    }
}
