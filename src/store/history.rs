use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::{Result, ScrapeError, ShareLock, common::Vars, store::HistorySink, utils};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunKind {
    Template,
    Workflow,
    BatchItem,
}

/// One finished run.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub kind: RunKind,
    /// template or workflow reference the run was started with
    pub reference: String,
    pub batch_id: Option<String>,
    pub seq_no: Option<usize>,
    pub params: Vars,
    pub success: bool,
    pub error: Option<ScrapeError>,
    pub data: Value,
    /// execution context at the end of the run
    pub context: Value,
    pub start_time: i64,
    pub end_time: i64,
}

impl RunRecord {
    pub fn new(
        kind: RunKind,
        reference: &str,
        params: Vars,
    ) -> Self {
        Self {
            id: utils::longid(),
            kind,
            reference: reference.to_string(),
            batch_id: None,
            seq_no: None,
            params,
            success: false,
            error: None,
            data: Value::Null,
            context: Value::Null,
            start_time: utils::time::time_millis(),
            end_time: 0,
        }
    }
}

/// Keeps every record in memory, newest last.
#[derive(Clone, Default)]
pub struct MemHistory {
    records: ShareLock<Vec<RunRecord>>,
}

impl MemHistory {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for MemHistory {
    fn record(
        &self,
        record: RunRecord,
    ) -> Result<()> {
        trace!("history::record({}, {})", record.kind.as_ref(), record.reference);
        let mut records = self.records.write().map_err(|e| ScrapeError::IoError(format!("history lock poisoned: {}", e)))?;
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_mem_history_keeps_order() {
        let history = MemHistory::new();
        assert!(history.is_empty());
        for reference in ["a", "b"] {
            let mut record = RunRecord::new(RunKind::Template, reference, Vars::from(json!({"q": 1})));
            record.success = true;
            history.record(record).unwrap();
        }
        let records = history.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reference, "a");
        assert_eq!(records[1].reference, "b");
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn test_record_serializes_kind() {
        let record = RunRecord::new(RunKind::BatchItem, "w", Vars::new());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "batch_item");
    }
}
