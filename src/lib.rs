//! # Scrapeflow
//!
//! Scrapeflow is a scrape-orchestration engine. It runs declarative HTTP request
//! templates, chains them into multi-step workflows and drives them over CSV
//! parameter rows in concurrent batch tasks.
//!
//! ## Core Features
//!
//! - **Reference Resolution**: `$.params.x`, `$.steps.<name>.extracted.y` and `$random(min,max)`
//!   expressions inside urls, headers, params and bodies
//! - **Template Execution**: header groups, proxies, JSON path or sandboxed Python/JavaScript extraction
//! - **Workflows**: ordered steps with per-step retry and jittered sleeps
//! - **Batch Runs**: bounded worker pools with pause, resume and stop, one artifact per item
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scrapeflow::{EngineBuilder, MemStore, TemplateModel, Vars};
//!
//! let store = MemStore::new();
//! store.deploy_template(TemplateModel::from_json(json_str)?)?;
//!
//! let engine = EngineBuilder::new().store(Arc::new(store)).build()?;
//! let result = engine.run_template("search", Vars::new()).await?;
//! ```

mod batch;
mod builder;
mod common;
mod config;
mod engine;
mod error;
mod events;
mod executor;
mod model;
pub mod resolver;
mod runtime;
mod store;
mod utils;
mod workflow;

#[cfg(test)]
mod testing;

use std::sync::{Arc, RwLock};

pub use batch::{BatchCounts, BatchItem, BatchRunner, BatchStatus, BatchTaskStatus, FsOutputSink, ItemStatus, OutputSink};
pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{BatchConfig, Config, HttpConfig, SandboxConfig};
pub use engine::Engine;
pub use error::ScrapeError;
pub use events::BatchEvent;
pub use executor::{ExecutorResult, HttpClient, HttpRequest, HttpResponse, JavascriptExecutor, PythonExecutor, ReqwestClient, RequestBody, Sandbox, ScriptSandbox, TemplateExecutor};
pub use model::*;
pub use runtime::ExecutionContext;
pub use store::{ConfigStore, HistorySink, MemHistory, MemStore, RunKind, RunRecord};
pub use workflow::{RunState, StepOutcome, WorkflowEngine, WorkflowRun};

/// Result type alias for Scrapeflow operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
