//! Lookup of deployed definitions and recording of finished runs.
//!
//! The engine only reaches its collaborators through these traits:
//! - [`ConfigStore`]: read-only access to templates, workflows, header groups and proxies
//! - [`HistorySink`]: append-only record of every template, workflow and batch item run
//!
//! `MemStore` and `MemHistory` are the in-memory implementations.

mod history;
mod mem;

use std::sync::Arc;

use crate::{
    Result,
    model::{HeaderGroupModel, ProxyModel, TemplateModel, WorkflowModel},
};

pub use history::{MemHistory, RunKind, RunRecord};
pub use mem::MemStore;

/// Read access to deployed definitions.
///
/// Every getter resolves `reference` as an id first and as a name second and
/// returns [`ScrapeError::NotFound`](crate::ScrapeError::NotFound) when neither matches.
pub trait ConfigStore: Send + Sync {
    fn get_template(
        &self,
        reference: &str,
    ) -> Result<Arc<TemplateModel>>;

    fn get_workflow(
        &self,
        reference: &str,
    ) -> Result<Arc<WorkflowModel>>;

    fn get_header_group(
        &self,
        reference: &str,
    ) -> Result<Arc<HeaderGroupModel>>;

    fn get_proxy(
        &self,
        reference: &str,
    ) -> Result<Arc<ProxyModel>>;
}

/// Sink for run records.
pub trait HistorySink: Send + Sync {
    fn record(
        &self,
        record: RunRecord,
    ) -> Result<()>;
}
