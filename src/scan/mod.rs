//! Scan orchestration.
//!
//! - **`pipeline`**: worker pool that turns a scan window into ledger entries.
//! - **`retry`**: bounded retry with doubling backoff for upstream calls.
//! - **`progress`**: scan state machine and the progress sink feeding it.
//! - **`watchdog`**: cancels a scan that stops making progress.
//! - **`service`**: single-active-scan session used by the routes and the CLI.

pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod service;
pub mod watchdog;

pub use pipeline::{PipelineError, PipelineStats, ProgressSink, ScanPipeline, ScanTarget};
pub use progress::{ScanProgress, ScanState};
pub use service::{ScanError, ScanHandle, ScanRequest, ScanService};
