//! pv-export - Channel archive to BTSF exporter
//!
//! Copies the sample history of process variables (PVs) from a relational
//! channel archive into one binary time-series (BTSF) file per PV. Runs are
//! resumable: a second run only appends samples recorded since the last
//! persisted one.
//!
//! # Features
//!
//! - **Incremental**: the last record of an existing file is the cursor for
//!   the archive query, so re-running never duplicates samples.
//!
//! - **Parallel**: PVs are exported by a pool of worker threads, each task
//!   with its own archive connection.
//!
//! - **Isolated failures**: a PV that cannot be exported is reported and
//!   skipped; every other PV still runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Channel Archive                            │
//! │               (chan_grp / channel / sample)                     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               │ PvSelector (include / exclude)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ExportCoordinator                            │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │export-0 │  │export-1 │  │export-2 │  ...    │export-N │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       │            │            │                   │           │
//! │       ▼            ▼            ▼                   ▼           │
//! │   decide_state → open_writer → stream_samples → finish          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!                 ┌──────────────────────────┐
//!                 │  OUTPUT_DIR/SR/C01/...   │
//!                 │      <leaf>.btsf         │
//!                 └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Export everything
//! pv-export archive.db ./btsf
//!
//! # Only storage ring PVs, 16 workers, with a JSON report
//! pv-export archive.db ./btsf --include 'SR:' -j 16 --report run.json
//! ```

pub mod archive;
pub mod btsf;
pub mod config;
pub mod error;
pub mod export;
pub mod progress;
pub mod report;
pub mod scheduler;

pub use config::{CliArgs, ExportConfig};
pub use error::{ExportError, Result};
pub use export::{process_task, ExportTask, PvSelector, TaskOutcome, TaskResult};
pub use scheduler::{ExportCoordinator, RunReport};
