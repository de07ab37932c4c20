use std::{sync::Arc, time::Duration};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Engine, Result, ScrapeError,
    batch::{BatchDeps, BatchRunner, FsOutputSink, OutputSink},
    common::BroadcastQueue,
    executor::{HttpClient, ReqwestClient, Sandbox, ScriptSandbox, TemplateExecutor},
    store::{ConfigStore, HistorySink, MemHistory, MemStore},
    workflow::WorkflowEngine,
};

/// Assembles an [`Engine`]. Every collaborator not supplied falls back to its default.
#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    store: Option<Arc<dyn ConfigStore>>,
    http: Option<Arc<dyn HttpClient>>,
    sandbox: Option<Arc<dyn Sandbox>>,
    history: Option<Arc<dyn HistorySink>>,
    output: Option<Arc<dyn OutputSink>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    /// Run batch tasks on `runtime` instead of the ambient one.
    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn store(
        mut self,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn http_client(
        mut self,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        self.http = Some(http);
        self
    }

    pub fn sandbox(
        mut self,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn history(
        mut self,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        self.history = Some(history);
        self
    }

    pub fn output(
        mut self,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        self.output = Some(output);
        self
    }

    /// Builds the engine.
    ///
    /// Batch tasks are spawned on the runtime given to [`EngineBuilder::runtime`], else on the
    /// runtime `build` is called from, else on a runtime created here and owned by the engine.
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        if config.batch.max_concurrency == 0 {
            return Err(ScrapeError::ConfigurationError("batch.max_concurrency must be at least 1".to_string()));
        }

        let (runtime, handle) = match self.rt {
            Some(rt) => {
                let handle = rt.handle().clone();
                (Some(rt), handle)
            }
            None => match Handle::try_current() {
                Ok(handle) => (None, handle),
                Err(_) => {
                    let rt = Builder::new_multi_thread().worker_threads(config.async_worker_thread_number.max(1).into()).enable_all().build()?;
                    let handle = rt.handle().clone();
                    (Some(Arc::new(rt)), handle)
                }
            },
        };

        let store = self.store.unwrap_or_else(|| Arc::new(MemStore::new()));
        let http = self.http.unwrap_or_else(|| Arc::new(ReqwestClient::new(&config.http.user_agent)));
        let sandbox = self.sandbox.unwrap_or_else(|| Arc::new(ScriptSandbox::new(config.sandbox.memory_limit_bytes)));
        let history = self.history.unwrap_or_else(|| Arc::new(MemHistory::new()));
        let output = self.output.unwrap_or_else(|| Arc::new(FsOutputSink));

        let executor = TemplateExecutor::new(
            store.clone(),
            http,
            sandbox,
            Duration::from_millis(config.http.timeout_ms),
            Duration::from_millis(config.sandbox.timeout_ms),
        );
        let workflows = WorkflowEngine::new(executor);
        let batches = BatchRunner::new(
            BatchDeps {
                workflows: workflows.clone(),
                output,
                history: history.clone(),
                events: BroadcastQueue::new(config.batch.event_capacity.max(1)),
                output_root: config.batch.output_root.clone(),
                max_concurrency: config.batch.max_concurrency,
            },
            handle,
        );

        Ok(Engine::new(store, workflows, batches, history, runtime))
    }
}
