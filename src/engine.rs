//! Engine, the entry point of Scrapeflow.
//!
//! The engine owns the collaborators and exposes:
//! - single template runs
//! - workflow runs
//! - batch task lifecycle and the batch event stream

use std::sync::Arc;

use tokio::{runtime::Runtime, sync::broadcast};
use tracing::{info, warn};

use crate::{
    Result,
    batch::{BatchRunner, BatchStatus},
    common::Vars,
    events::BatchEvent,
    executor::ExecutorResult,
    model::BatchTaskModel,
    runtime::ExecutionContext,
    store::{ConfigStore, HistorySink, RunKind, RunRecord},
    utils,
    workflow::WorkflowEngine,
};

/// The scrape-orchestration engine.
///
/// # Example
///
/// ```rust,ignore
/// let store = MemStore::new();
/// store.deploy_template(TemplateModel::from_json(json_str)?)?;
///
/// let engine = EngineBuilder::new().store(Arc::new(store)).build()?;
/// let result = engine.run_template("search", Vars::from(json!({"q": "rust"}))).await?;
///
/// let id = engine.create_batch(BatchTaskModel::from_json(task_json)?)?;
/// engine.start_batch(&id)?;
/// let status = engine.wait_batch(&id).await?;
/// ```
pub struct Engine {
    /// Template, workflow, header group and proxy definitions.
    store: Arc<dyn ConfigStore>,
    /// Workflow engine, wrapping the template executor.
    workflows: WorkflowEngine,
    /// Registry of batch tasks.
    batches: BatchRunner,
    /// Sink for finished template and workflow runs.
    history: Arc<dyn HistorySink>,
    /// Runtime owned by the engine, None when batch tasks run on a caller's runtime.
    runtime: Option<Arc<Runtime>>,
}

impl Engine {
    pub(crate) fn new(
        store: Arc<dyn ConfigStore>,
        workflows: WorkflowEngine,
        batches: BatchRunner,
        history: Arc<dyn HistorySink>,
        runtime: Option<Arc<Runtime>>,
    ) -> Self {
        Self {
            store,
            workflows,
            batches,
            history,
            runtime,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// The runtime created by [`EngineBuilder`](crate::EngineBuilder) or handed to it, if any.
    pub fn runtime(&self) -> Option<&Arc<Runtime>> {
        self.runtime.as_ref()
    }

    /// Run one template with `params` bound to `$.params`.
    ///
    /// Only an unknown `reference` is an error, every other failure is reported in the result.
    pub async fn run_template(
        &self,
        reference: &str,
        params: Vars,
    ) -> Result<ExecutorResult> {
        let template = self.store.get_template(reference)?;
        info!("engine::run_template({})", reference);

        let mut record = RunRecord::new(RunKind::Template, reference, params.clone());
        let result = self.workflows.executor().execute(&template, &params).await;
        record.context = ExecutionContext::new(params).snapshot();
        self.record(record, &result);
        Ok(result)
    }

    /// Run a workflow with `params` bound to `$.params`.
    ///
    /// The result is the final step's result with the audit of every step attempted.
    pub async fn run_workflow(
        &self,
        reference: &str,
        params: Vars,
    ) -> Result<ExecutorResult> {
        let workflow = self.store.get_workflow(reference)?;
        info!("engine::run_workflow({})", reference);

        let mut record = RunRecord::new(RunKind::Workflow, reference, params.clone());
        let run = self.workflows.run(&workflow, params).await;
        record.context = run.context.snapshot();
        self.record(record, &run.result);
        Ok(run.result)
    }

    fn record(
        &self,
        mut record: RunRecord,
        result: &ExecutorResult,
    ) {
        record.success = result.success;
        record.error = result.error.clone();
        record.data = result.data.clone();
        record.end_time = utils::time::time_millis();
        if let Err(err) = self.history.record(record) {
            warn!("engine::record() history record failed: {}", err);
        }
    }

    /// Register a batch task, returning its id.
    pub fn create_batch(
        &self,
        task: BatchTaskModel,
    ) -> Result<String> {
        self.batches.create(task)
    }

    pub fn start_batch(
        &self,
        id: &str,
    ) -> Result<()> {
        self.batches.start(id)
    }

    pub fn stop_batch(
        &self,
        id: &str,
    ) -> Result<()> {
        self.batches.stop(id)
    }

    pub fn pause_batch(
        &self,
        id: &str,
    ) -> Result<()> {
        self.batches.pause(id)
    }

    pub fn resume_batch(
        &self,
        id: &str,
    ) -> Result<()> {
        self.batches.resume(id)
    }

    pub fn batch_status(
        &self,
        id: &str,
    ) -> Result<BatchStatus> {
        self.batches.status(id)
    }

    /// Resolves with the final status once the task's current run has ended.
    pub async fn wait_batch(
        &self,
        id: &str,
    ) -> Result<BatchStatus> {
        self.batches.wait(id).await
    }

    pub fn subscribe_batch_events(&self) -> broadcast::Receiver<BatchEvent> {
        self.batches.subscribe()
    }

    /// Stop every running batch task. In-flight items still finish.
    pub fn shutdown(&self) -> Result<()> {
        let stopped = self.batches.stop_all()?;
        info!("engine::shutdown() signalled {} batch task(s)", stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        Config, EngineBuilder, ScrapeError,
        batch::BatchTaskStatus,
        model::{TemplateModel, WorkflowModel},
        store::{MemHistory, MemStore},
        testing::FakeHttpClient,
    };

    fn engine(
        store: MemStore,
        http: FakeHttpClient,
        root: &std::path::Path,
    ) -> (Engine, MemHistory) {
        let history = MemHistory::new();
        let mut config = Config::default();
        config.batch.output_root = root.to_path_buf();
        let engine = EngineBuilder::new()
            .config(config)
            .store(Arc::new(store))
            .http_client(Arc::new(http))
            .history(Arc::new(history.clone()))
            .build()
            .unwrap();
        (engine, history)
    }

    fn store() -> MemStore {
        let store = MemStore::new();
        store.deploy_template(TemplateModel::from_json(r#"{"name": "get", "url": "https://x/get", "json_path": "data.v"}"#).unwrap()).unwrap();
        store
            .deploy_template(TemplateModel::from_json(r#"{"name": "login", "url": "https://x/login", "method": "POST", "body_template": {"user": ""}}"#).unwrap())
            .unwrap();
        store
            .deploy_workflow(
                WorkflowModel::from_json(
                    r#"{"name": "flow", "steps": [
                        {"template_ref": "login", "input": {"user": "$.params.user"}, "extract": {"token": "$.token"}},
                        {"template_ref": "get", "input": {"t": "$.steps.step1.extracted.token"}}
                    ]}"#,
                )
                .unwrap(),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_run_template_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttpClient::new();
        http.respond("https://x/get", 200, r#"{"data": {"v": 42}}"#);
        let (engine, history) = engine(store(), http, dir.path());

        let result = engine.run_template("get", Vars::from(json!({"q": 1}))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data, json!(42));

        let records = history.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RunKind::Template);
        assert_eq!(records[0].reference, "get");
        assert!(records[0].success);
        assert_eq!(records[0].context["params"], json!({"q": 1}));
        assert!(records[0].end_time >= records[0].start_time);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, history) = engine(store(), FakeHttpClient::new(), dir.path());

        let err = engine.run_template("nope", Vars::new()).await.unwrap_err();
        assert_eq!(err, ScrapeError::not_found("template", "nope"));
        let err = engine.run_workflow("nope", Vars::new()).await.unwrap_err();
        assert_eq!(err, ScrapeError::not_found("workflow", "nope"));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_is_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, history) = engine(store(), FakeHttpClient::new(), dir.path());

        let result = engine.run_template("get", Vars::new()).await.unwrap();
        assert!(!result.success);
        assert!(matches!(result.error, Some(ScrapeError::NetworkError(_))));
        assert!(!history.records()[0].success);
    }

    #[tokio::test]
    async fn test_run_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttpClient::new();
        http.respond("https://x/login", 200, r#"{"token": "abc"}"#);
        http.respond("https://x/get", 200, r#"{"data": {"v": "ok"}}"#);
        let (engine, history) = engine(store(), http.clone(), dir.path());

        let result = engine.run_workflow("flow", Vars::from(json!({"user": "u1"}))).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data, json!("ok"));
        assert_eq!(result.steps.len(), 2);
        assert_eq!(http.requests()[1].params["t"], json!("abc"));

        let record = &history.records()[0];
        assert_eq!(record.kind, RunKind::Workflow);
        assert_eq!(record.context["steps"]["step1"]["extracted"]["token"], json!("abc"));
    }

    #[tokio::test]
    async fn test_batch_through_engine() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttpClient::new();
        http.respond("https://x/get", 200, r#"{"data": {"v": 1}}"#);
        let (engine, history) = engine(store(), http, dir.path());
        let mut events = engine.subscribe_batch_events();

        let task = BatchTaskModel::from_json(
            &json!({"name": "b", "target": {"kind": "template", "ref": "get"}, "concurrency": 2, "csv_text": "q\n1\n2\n3"}).to_string(),
        )
        .unwrap();
        let id = engine.create_batch(task).unwrap();
        assert_eq!(engine.batch_status(&id).unwrap().status, BatchTaskStatus::Pending);
        assert!(matches!(engine.pause_batch(&id), Err(ScrapeError::Rejected(_))));

        engine.start_batch(&id).unwrap();
        let status = engine.wait_batch(&id).await.unwrap();
        assert_eq!(status.status, BatchTaskStatus::Completed);
        assert_eq!(status.counts.success, 3);
        assert_eq!(history.len(), 3);
        assert!(matches!(events.recv().await.unwrap(), BatchEvent::Started { total: 3, .. }));

        assert!(matches!(engine.batch_status("unknown"), Err(ScrapeError::NotFound { .. })));
        engine.shutdown().unwrap();
    }

    #[test]
    fn test_builder_creates_runtime_outside_async() {
        let engine = EngineBuilder::new().async_worker_thread_number(2).build().unwrap();
        assert!(engine.runtime().is_some());
    }

    #[tokio::test]
    async fn test_builder_uses_ambient_runtime() {
        let engine = EngineBuilder::new().build().unwrap();
        assert!(engine.runtime().is_none());

        let mut config = Config::default();
        config.batch.max_concurrency = 0;
        assert!(matches!(EngineBuilder::new().config(config).build(), Err(ScrapeError::ConfigurationError(_))));
    }
}
