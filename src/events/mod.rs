//! Batch lifecycle events broadcast to subscribers.

use serde::{Deserialize, Serialize};

use crate::batch::{BatchCounts, BatchTaskStatus};

/// Event emitted by a running batch task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        task_id: String,
        total: usize,
    },
    ItemFinished {
        task_id: String,
        seq_no: usize,
        success: bool,
    },
    Paused {
        task_id: String,
    },
    Resumed {
        task_id: String,
    },
    Finished {
        task_id: String,
        status: BatchTaskStatus,
        counts: BatchCounts,
    },
}
