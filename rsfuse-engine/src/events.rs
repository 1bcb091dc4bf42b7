//! Task progress events
//!
//! The orchestrator optionally reports progress over a channel so a caller
//! (CLI progress display, tests) can observe execution order without
//! scraping logs. Emission is fire-and-forget: a dropped receiver never
//! fails the task.

use rsfuse_common::types::Date;
use std::path::PathBuf;

/// Progress event emitted during task execution
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    TaskStarted {
        jobs: usize,
    },
    JobStarted {
        index: usize,
        date1: Date,
        date3: Option<Date>,
    },
    DatePredicted {
        date: Date,
        output: PathBuf,
    },
    DateSkipped {
        date: Date,
        reason: String,
    },
    DateFailed {
        date: Date,
        error: String,
    },
    WriteFailed {
        date: Date,
        path: PathBuf,
        error: String,
    },
    JobFinished {
        index: usize,
    },
    TaskFinished {
        predicted: usize,
        skipped: usize,
        failed: usize,
    },
}
