//! Batch runs of one template or workflow over CSV parameter rows.
//!
//! A batch task turns each CSV row into one item. A pool of workers pulls items
//! in row order, runs the target with the row bound to `$.params`, writes one
//! artifact per item through an [`OutputSink`] and reports back to a single
//! supervisor task, which is the only writer of task and item state while the
//! task runs.

mod artifact;
mod output;
mod rows;
mod runner;
mod worker;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ScrapeError, common::Vars};

pub use output::{FsOutputSink, OutputSink};
pub use runner::BatchRunner;
pub(crate) use runner::BatchDeps;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchTaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Stopped,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// 1-based row number
    pub seq_no: usize,
    pub status: ItemStatus,
    pub params: Vars,
    pub output_file: Option<PathBuf>,
    pub error: Option<ScrapeError>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
}

impl BatchCounts {
    pub fn tally(items: &[BatchItem]) -> Self {
        let mut counts = BatchCounts {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Running => counts.running += 1,
                ItemStatus::Success => counts.success += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Point-in-time view of a batch task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub id: String,
    pub name: String,
    pub status: BatchTaskStatus,
    pub paused: bool,
    pub counts: BatchCounts,
    pub items: Vec<BatchItem>,
}
