//! setscan library interface
//!
//! Identifies the tracks played in a long recording (e.g. a DJ set) by
//! recognizing overlapping windows and aggregating the matches.
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod aggregator;
pub mod audio;
pub mod db;
pub mod gateway;
pub mod input;
pub mod oracle;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod types;

pub use aggregator::{TrackAggregate, TrackAggregator};
pub use db::ChunkCache;
pub use gateway::RecognitionGateway;
pub use pipeline::{run_identification, RunRequest, RunSettings};
pub use report::{ReportRow, ReportWriter, RunMetadata, RunReport};
pub use scheduler::{ChunkScheduler, ScheduleStats, SchedulerSettings};
pub use types::{ChunkKey, ChunkResult, MatchRecord, OracleMatch, Window};
