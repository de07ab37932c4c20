use std::sync::Arc;

use tracing::trace;

use crate::{
    Result, ScrapeError,
    common::MemCache,
    model::{HeaderGroupModel, ProxyModel, TemplateModel, WorkflowModel},
    store::ConfigStore,
};

/// One kind of definition, indexed by id with a name → id side index.
#[derive(Clone)]
struct Collect<T> {
    kind: &'static str,
    by_id: MemCache<String, Arc<T>>,
    by_name: MemCache<String, String>,
}

impl<T> Collect<T>
where
    T: Send + Sync + 'static,
{
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            by_id: MemCache::unbounded(),
            by_name: MemCache::unbounded(),
        }
    }

    fn put(
        &self,
        id: &str,
        name: &str,
        item: T,
    ) {
        trace!("store::deploy({}, {})", self.kind, id);
        self.by_id.set(id.to_string(), Arc::new(item));
        if !name.is_empty() {
            self.by_name.set(name.to_string(), id.to_string());
        }
    }

    fn find(
        &self,
        reference: &str,
    ) -> Result<Arc<T>> {
        if let Some(item) = self.by_id.get(&reference.to_string()) {
            return Ok(item);
        }
        self.by_name
            .get(&reference.to_string())
            .and_then(|id| self.by_id.get(&id))
            .ok_or_else(|| ScrapeError::not_found(self.kind, reference))
    }
}

/// In-memory [`ConfigStore`] backed by moka caches.
///
/// Deployed definitions are immutable: redeploying an id replaces the shared
/// `Arc`, runs that already hold the previous one keep using it.
#[derive(Clone)]
pub struct MemStore {
    templates: Collect<TemplateModel>,
    workflows: Collect<WorkflowModel>,
    header_groups: Collect<HeaderGroupModel>,
    proxies: Collect<ProxyModel>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            templates: Collect::new("template"),
            workflows: Collect::new("workflow"),
            header_groups: Collect::new("header group"),
            proxies: Collect::new("proxy"),
        }
    }

    /// Deploy a template, returning its id.
    pub fn deploy_template(
        &self,
        template: TemplateModel,
    ) -> Result<String> {
        let template = template.normalize()?;
        let id = template.id.clone();
        self.templates.put(&id, &template.name.clone(), template);
        Ok(id)
    }

    pub fn deploy_workflow(
        &self,
        workflow: WorkflowModel,
    ) -> Result<String> {
        let workflow = workflow.normalize()?;
        if workflow.id.is_empty() {
            return Err(ScrapeError::ConfigurationError("missing id in workflow".into()));
        }
        let id = workflow.id.clone();
        self.workflows.put(&id, &workflow.name.clone(), workflow);
        Ok(id)
    }

    pub fn deploy_header_group(
        &self,
        group: HeaderGroupModel,
    ) -> Result<String> {
        let group = group.normalize();
        if group.id.is_empty() {
            return Err(ScrapeError::ConfigurationError("missing id in header group".into()));
        }
        let id = group.id.clone();
        self.header_groups.put(&id, &group.name.clone(), group);
        Ok(id)
    }

    pub fn deploy_proxy(
        &self,
        proxy: ProxyModel,
    ) -> Result<String> {
        let proxy = proxy.normalize()?;
        let id = proxy.id.clone();
        self.proxies.put(&id, &proxy.name.clone(), proxy);
        Ok(id)
    }
}

impl ConfigStore for MemStore {
    fn get_template(
        &self,
        reference: &str,
    ) -> Result<Arc<TemplateModel>> {
        self.templates.find(reference)
    }

    fn get_workflow(
        &self,
        reference: &str,
    ) -> Result<Arc<WorkflowModel>> {
        self.workflows.find(reference)
    }

    fn get_header_group(
        &self,
        reference: &str,
    ) -> Result<Arc<HeaderGroupModel>> {
        self.header_groups.find(reference)
    }

    fn get_proxy(
        &self,
        reference: &str,
    ) -> Result<Arc<ProxyModel>> {
        self.proxies.find(reference)
    }
}
