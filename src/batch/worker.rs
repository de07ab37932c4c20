use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    ScrapeError,
    batch::{artifact, rows::Row},
    common::{Queue, Shutdown},
    executor::ExecutorResult,
    model::{BatchTaskModel, TemplateModel, WorkflowModel},
    runtime::ExecutionContext,
    store::{RunKind, RunRecord},
    utils,
};

use super::runner::BatchDeps;

/// The definition a run executes, looked up once when the run starts.
#[derive(Clone)]
pub(crate) enum Target {
    Template(Arc<TemplateModel>),
    Workflow(Arc<WorkflowModel>),
}

impl Target {
    fn reference(&self) -> &str {
        match self {
            Target::Template(t) => &t.name,
            Target::Workflow(w) => &w.name,
        }
    }
}

/// Everything one run of a batch task shares between its workers.
pub(crate) struct RunPlan {
    pub task: Arc<BatchTaskModel>,
    pub target: Target,
    pub rows: Vec<Row>,
    pub output_dir: PathBuf,
    /// timestamp of the run, used in generated artifact names
    pub stamp: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ItemOutcome {
    pub success: bool,
    pub output_file: Option<PathBuf>,
    pub error: Option<ScrapeError>,
}

#[derive(Debug)]
pub(crate) enum Report {
    Started(usize),
    Finished(usize, ItemOutcome),
}

pub(crate) struct Worker {
    pub id: usize,
    pub plan: Arc<RunPlan>,
    pub deps: Arc<BatchDeps>,
    pub queue: Arc<Queue<usize>>,
    pub stop: Arc<Shutdown>,
    pub pause: watch::Receiver<bool>,
    pub tx: mpsc::Sender<Report>,
}

impl Worker {
    pub async fn run(mut self) {
        debug!("batch::worker({}, {}) started", self.plan.task.id, self.id);
        let pacing = Duration::from_millis(self.plan.task.sleep_ms);

        while self.gate().await {
            let Some(idx) = self.queue.try_next() else {
                break;
            };
            if self.tx.send(Report::Started(idx)).await.is_err() {
                break;
            }
            let outcome = self.run_item(idx).await;
            if self.tx.send(Report::Finished(idx, outcome)).await.is_err() {
                break;
            }

            if !pacing.is_zero() && self.queue.len() > 0 {
                tokio::select! {
                    _ = self.stop.wait() => break,
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }
        debug!("batch::worker({}, {}) exited", self.plan.task.id, self.id);
    }

    /// Wait out a pause. False once the run is stopped.
    async fn gate(&mut self) -> bool {
        if self.stop.is_terminated() {
            return false;
        }
        if *self.pause.borrow() {
            tokio::select! {
                _ = self.stop.wait() => return false,
                _ = self.pause.wait_for(|paused| !*paused) => {}
            }
        }
        !self.stop.is_terminated()
    }

    async fn run_item(
        &self,
        idx: usize,
    ) -> ItemOutcome {
        let plan = &self.plan;
        let row = &plan.rows[idx];
        let seq_no = idx + 1;
        let mut record = RunRecord::new(RunKind::BatchItem, plan.target.reference(), row.params.clone());
        record.batch_id = Some(plan.task.id.clone());
        record.seq_no = Some(seq_no);

        let (result, context): (ExecutorResult, Value) = match &plan.target {
            Target::Template(template) => {
                let result = self.deps.workflows.executor().execute(template, &row.params).await;
                (result, ExecutionContext::new(row.params.clone()).snapshot())
            }
            Target::Workflow(workflow) => {
                let run = self.deps.workflows.run(workflow, row.params.clone()).await;
                (run.result, run.context.snapshot())
            }
        };

        let file_name = artifact::file_name(row.output_name.as_deref(), &plan.task.name, &plan.stamp, seq_no);
        let content = artifact::content(&result, &plan.task.save_fields, plan.task.data_json_path.as_deref());
        let written = self.deps.output.write_item_artifact(&plan.output_dir, &file_name, &content).await;

        let (output_file, error) = match written {
            Ok(path) => {
                info!("batch::item({}, {}) saved to {} (success={})", plan.task.id, seq_no, path.display(), result.success);
                (Some(path), result.error.clone())
            }
            Err(err) => {
                warn!("batch::item({}, {}) artifact write failed: {}", plan.task.id, seq_no, err);
                (None, Some(result.error.clone().unwrap_or(err)))
            }
        };
        let success = result.success && output_file.is_some();

        record.success = success;
        record.error = error.clone();
        record.data = result.data;
        record.context = context;
        record.end_time = utils::time::time_millis();
        if let Err(err) = self.deps.history.record(record) {
            warn!("batch::item({}, {}) history record failed: {}", plan.task.id, seq_no, err);
        }

        ItemOutcome {
            success,
            output_file,
            error,
        }
    }
}
