//! Subtitle sync job orchestration.
//!
//! This crate handles:
//! - The job registry and lifecycle state machine
//! - Running the detection, normalization and synchronization stages
//! - Progress and timeline reporting
//! - Backup preservation and result packaging
//! - TTL-based cleanup of job storage

pub mod cleaner;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod packager;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod service;
pub mod store;

pub use cleaner::{Cleaner, SweepReport};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use packager::{BackupArchive, ResultFile, ResultPackager};
pub use pipeline::{default_pipeline, PipelineStage, StageContext, Toolbox};
pub use progress::{ProgressReporter, StatusSnapshot};
pub use runner::{JobInputs, JobRunner};
pub use service::{StagedUpload, SubmitReceipt, Submission, SubsyncService};
pub use store::JobStore;
