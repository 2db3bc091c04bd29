pub(crate) mod rows;
pub mod schema;
pub mod store;

pub use store::SqliteRunStore;

use crate::errors::StoreError;
use crate::model::{AnalysisRun, RunTransition};
use chrono::{DateTime, Utc};

/// Persistence boundary for analysis runs.
///
/// The store is not the only writer: a remote worker may complete a run the
/// orchestrator is polling. Implementations must reject transitions on
/// terminal records so history stays append-only.
pub trait RunStore: Send + Sync {
    /// Persist a new record and return its id.
    fn create_run(&self, run: &AnalysisRun) -> Result<String, StoreError>;

    /// Apply `transition` and return the updated record.
    fn update_run(
        &self,
        id: &str,
        transition: &RunTransition,
        at: DateTime<Utc>,
    ) -> Result<AnalysisRun, StoreError>;

    /// Runs for `subject_id`, newest first.
    fn list_runs(&self, subject_id: &str, limit: usize) -> Result<Vec<AnalysisRun>, StoreError>;

    fn get_run(&self, id: &str) -> Result<AnalysisRun, StoreError>;

    fn latest_run(&self, subject_id: &str) -> Result<Option<AnalysisRun>, StoreError> {
        Ok(self.list_runs(subject_id, 1)?.into_iter().next())
    }
}
