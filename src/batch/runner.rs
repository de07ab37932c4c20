use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
};
use tracing::{info, warn};

use crate::{
    Result, ScrapeError, ShareLock,
    batch::{
        BatchCounts, BatchItem, BatchStatus, BatchTaskStatus, ItemStatus, OutputSink, artifact, rows,
        worker::{Report, RunPlan, Target, Worker},
    },
    common::{BroadcastQueue, Queue, Shutdown},
    events::BatchEvent,
    model::{BatchTarget, BatchTaskModel},
    store::HistorySink,
    utils,
    workflow::WorkflowEngine,
};

/// Collaborators shared by every batch run.
pub(crate) struct BatchDeps {
    pub workflows: WorkflowEngine,
    pub output: Arc<dyn OutputSink>,
    pub history: Arc<dyn HistorySink>,
    pub events: Arc<BroadcastQueue<BatchEvent>>,
    pub output_root: PathBuf,
    pub max_concurrency: usize,
}

#[derive(Default)]
struct TaskState {
    status: BatchTaskStatus,
    items: Vec<BatchItem>,
}

/// Signals of the current run.
struct RunControl {
    stop: Arc<Shutdown>,
    pause: watch::Sender<bool>,
}

struct TaskHandle {
    task: Arc<BatchTaskModel>,
    state: ShareLock<TaskState>,
    control: Mutex<Option<RunControl>>,
    /// true while a run is in progress
    running: watch::Sender<bool>,
}

fn poisoned<T>(_: T) -> ScrapeError {
    ScrapeError::IoError("batch state lock poisoned".to_string())
}

impl TaskHandle {
    fn snapshot(&self) -> Result<BatchStatus> {
        let paused = self.control.lock().map_err(poisoned)?.as_ref().is_some_and(|c| *c.pause.borrow());
        let state = self.state.read().map_err(poisoned)?;
        Ok(BatchStatus {
            id: self.task.id.clone(),
            name: self.task.name.clone(),
            status: state.status,
            paused: paused && state.status == BatchTaskStatus::Running,
            counts: BatchCounts::tally(&state.items),
            items: state.items.clone(),
        })
    }

    fn with_running_control<T>(
        &self,
        f: impl FnOnce(&RunControl) -> T,
    ) -> Result<T> {
        let status = self.state.read().map_err(poisoned)?.status;
        let control = self.control.lock().map_err(poisoned)?;
        match control.as_ref() {
            Some(control) if status == BatchTaskStatus::Running => Ok(f(control)),
            _ => Err(ScrapeError::Rejected(format!("batch task '{}' is not running", self.task.id))),
        }
    }
}

/// Registry and lifecycle control of batch tasks.
pub struct BatchRunner {
    deps: Arc<BatchDeps>,
    tasks: ShareLock<HashMap<String, Arc<TaskHandle>>>,
    runtime: Handle,
}

impl BatchRunner {
    pub(crate) fn new(
        deps: BatchDeps,
        runtime: Handle,
    ) -> Self {
        Self {
            deps: Arc::new(deps),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            runtime,
        }
    }

    /// Register a task, returning its id. A task without id gets a fresh one.
    pub fn create(
        &self,
        task: BatchTaskModel,
    ) -> Result<String> {
        let mut task = task.normalize()?;
        if task.id.is_empty() {
            task.id = utils::longid();
        }
        let id = task.id.clone();

        let mut tasks = self.tasks.write().map_err(poisoned)?;
        if tasks.contains_key(&id) {
            return Err(ScrapeError::Rejected(format!("batch task '{}' already exists", id)));
        }
        let (running, _) = watch::channel(false);
        tasks.insert(
            id.clone(),
            Arc::new(TaskHandle {
                task: Arc::new(task),
                state: Arc::new(RwLock::new(TaskState::default())),
                control: Mutex::new(None),
                running,
            }),
        );
        info!("batch::create({})", id);
        Ok(id)
    }

    fn handle(
        &self,
        id: &str,
    ) -> Result<Arc<TaskHandle>> {
        self.tasks.read().map_err(poisoned)?.get(id).cloned().ok_or_else(|| ScrapeError::not_found("batch task", id))
    }

    fn target(
        &self,
        target: &BatchTarget,
    ) -> Result<Target> {
        let store = self.deps.workflows.executor().store();
        Ok(match target {
            BatchTarget::Template(reference) => Target::Template(store.get_template(reference)?),
            BatchTarget::Workflow(reference) => Target::Workflow(store.get_workflow(reference)?),
        })
    }

    /// Start a new run. Items are rebuilt from the CSV rows, previous results are dropped.
    pub fn start(
        &self,
        id: &str,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        let task = handle.task.clone();

        let stop = Arc::new(Shutdown::new());
        let (pause_tx, pause_rx) = watch::channel(false);

        let (plan, queue) = {
            let mut state = handle.state.write().map_err(poisoned)?;
            if state.status == BatchTaskStatus::Running {
                return Err(ScrapeError::Rejected(format!("batch task '{}' is already running", id)));
            }
            let target = self.target(&task.target)?;
            let rows = rows::parse(&task.csv_text)?;

            let queue = Queue::new(rows.len().max(1));
            for idx in 0..rows.len() {
                queue.send(idx)?;
            }

            state.items = rows
                .iter()
                .enumerate()
                .map(|(i, row)| BatchItem {
                    seq_no: i + 1,
                    status: ItemStatus::Pending,
                    params: row.params.clone(),
                    output_file: None,
                    error: None,
                })
                .collect();
            *handle.control.lock().map_err(poisoned)? = Some(RunControl {
                stop: stop.clone(),
                pause: pause_tx,
            });
            state.status = BatchTaskStatus::Running;
            handle.running.send_replace(true);

            let plan = RunPlan {
                target,
                rows,
                output_dir: artifact::output_dir(&self.deps.output_root, &task.output_dir, &task.name),
                stamp: utils::time::file_stamp(),
                task: task.clone(),
            };
            (Arc::new(plan), queue)
        };
        let total = plan.rows.len();

        info!("batch::start({}) {} item(s), output_dir={}", id, total, plan.output_dir.display());
        self.deps.events.send(BatchEvent::Started {
            task_id: id.to_string(),
            total,
        });

        let (tx, rx) = mpsc::channel::<Report>(1024);
        let workers = task.concurrency.min(self.deps.max_concurrency.max(1)).min(total);
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                plan: plan.clone(),
                deps: self.deps.clone(),
                queue: queue.clone(),
                stop: stop.clone(),
                pause: pause_rx.clone(),
                tx: tx.clone(),
            };
            self.runtime.spawn(worker.run());
        }
        drop(tx);

        self.runtime.spawn(Self::supervise(handle, self.deps.clone(), stop, rx));
        Ok(())
    }

    /// Single writer of item and task state during a run.
    async fn supervise(
        handle: Arc<TaskHandle>,
        deps: Arc<BatchDeps>,
        stop: Arc<Shutdown>,
        mut rx: mpsc::Receiver<Report>,
    ) {
        let task_id = handle.task.id.clone();

        while let Some(report) = rx.recv().await {
            let Ok(mut state) = handle.state.write() else {
                warn!("batch::supervise({}) state lock poisoned", task_id);
                break;
            };
            match report {
                Report::Started(idx) => {
                    if let Some(item) = state.items.get_mut(idx) {
                        item.status = ItemStatus::Running;
                    }
                }
                Report::Finished(idx, outcome) => {
                    if let Some(item) = state.items.get_mut(idx) {
                        item.status = if outcome.success {
                            ItemStatus::Success
                        } else {
                            ItemStatus::Failed
                        };
                        item.output_file = outcome.output_file;
                        item.error = outcome.error;
                        deps.events.send(BatchEvent::ItemFinished {
                            task_id: task_id.clone(),
                            seq_no: item.seq_no,
                            success: outcome.success,
                        });
                    }
                }
            }
        }

        let Ok(mut state) = handle.state.write() else {
            warn!("batch::supervise({}) state lock poisoned", task_id);
            return;
        };
        // a worker gone without reporting leaves its item running
        for item in state.items.iter_mut().filter(|item| item.status == ItemStatus::Running) {
            warn!("batch::supervise({}) item {} lost its worker", task_id, item.seq_no);
            item.status = ItemStatus::Failed;
            item.error = Some(ScrapeError::Internal(format!("batch worker exited before item {} finished", item.seq_no)));
        }
        let counts = BatchCounts::tally(&state.items);
        state.status = if stop.is_terminated() {
            BatchTaskStatus::Stopped
        } else {
            BatchTaskStatus::Completed
        };
        handle.running.send_replace(false);
        info!("batch::finish({}) {} success={} failed={} pending={}", task_id, state.status.as_ref(), counts.success, counts.failed, counts.pending);
        deps.events.send(BatchEvent::Finished {
            task_id,
            status: state.status,
            counts,
        });
    }

    /// Ask a running task to stop. In-flight items finish, undispatched items stay pending.
    pub fn stop(
        &self,
        id: &str,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        handle.with_running_control(|control| control.stop.shutdown())?;
        info!("batch::stop({})", id);
        Ok(())
    }

    /// Stop every running task, returning how many were signalled.
    pub fn stop_all(&self) -> Result<usize> {
        let handles: Vec<Arc<TaskHandle>> = self.tasks.read().map_err(poisoned)?.values().cloned().collect();
        let mut stopped = 0;
        for handle in handles {
            if handle.with_running_control(|control| control.stop.shutdown()).is_ok() {
                stopped += 1;
            }
        }
        info!("batch::stop_all() stopped {} task(s)", stopped);
        Ok(stopped)
    }

    /// Hold dispatch until [`BatchRunner::resume`]. In-flight items finish.
    pub fn pause(
        &self,
        id: &str,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        let changed = handle.with_running_control(|control| !control.pause.send_replace(true))?;
        if changed {
            info!("batch::pause({})", id);
            self.deps.events.send(BatchEvent::Paused {
                task_id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn resume(
        &self,
        id: &str,
    ) -> Result<()> {
        let handle = self.handle(id)?;
        let changed = handle.with_running_control(|control| control.pause.send_replace(false))?;
        if changed {
            info!("batch::resume({})", id);
            self.deps.events.send(BatchEvent::Resumed {
                task_id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn status(
        &self,
        id: &str,
    ) -> Result<BatchStatus> {
        self.handle(id)?.snapshot()
    }

    /// Resolves with the final status once the current run, if any, has ended.
    pub async fn wait(
        &self,
        id: &str,
    ) -> Result<BatchStatus> {
        let handle = self.handle(id)?;
        let mut running = handle.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
        handle.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BatchEvent> {
        self.deps.events.subscribe()
    }
}
