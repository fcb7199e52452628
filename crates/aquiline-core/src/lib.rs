//! Aquiline Core - Common infrastructure for the air-quality ingest pipeline
//!
//! This crate provides the pieces shared by the fetch and load layers:
//! the HTTP client/runtime bridge, rate-limit bookkeeping, the error
//! taxonomy, the run ledger, the parquet sink, logging, progress and
//! shutdown handling.

pub mod error;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod progress;
pub mod ratelimit;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use error::FetchError;
pub use http::{ApiError, RawResponse, SHARED_RUNTIME, blocking_get, http_client};
pub use ledger::{EntityError, RunLog, RunRecord, RunStatus, RunSummary, TimeRange};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_duration, fmt_num};
pub use ratelimit::{LOW_WATERMARK, RateLimitState};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
pub use sink::{ParquetSink, cleanup_tmp_files, is_valid_parquet};
