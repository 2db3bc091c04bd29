//! Analysis run orchestration and multi-engine score aggregation.
//!
//! - [`orchestrator::RunOrchestrator`] drives the expensive, persisted analysis
//!   run for a subject: staleness-aware reuse, remote execution, bounded polling.
//! - [`board::EngineBoard`] fires cheap scoring engines independently and keeps
//!   a live [`scoring::Composite`] over the ones that have reported.
//!
//! The two are causally unrelated and may be active for the same subject at once.

pub mod board;
pub mod config;
pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod scoring;
pub mod storage;

pub use board::{EngineBoard, EngineBoardState, EngineRunOutcome, EngineState};
pub use config::QuantaConfig;
pub use model::{AnalysisRun, EngineResult, FailureKind, FormatType, RunStatus, Subject};
pub use orchestrator::{OrchestratorSnapshot, RerunDecision, RunOrchestrator, StartOutcome};
pub use registry::{EngineRegistry, EngineSpec, FormatRestriction};
pub use scoring::{Composite, Grade};
pub use storage::{RunStore, SqliteRunStore};
