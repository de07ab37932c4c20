//! Single template execution: request construction, the HTTP call and extraction.

mod code;
mod extract;
mod http;
mod request;
mod sandbox;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    Result, ScrapeError,
    common::Vars,
    model::{ProxyModel, TemplateModel},
    store::ConfigStore,
    workflow::StepOutcome,
};

pub use code::{JavascriptExecutor, PythonExecutor};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, RequestBody};
pub use sandbox::{Sandbox, ScriptSandbox};

pub(crate) use extract::parse_body;

/// Outcome of one template or workflow run.
///
/// Failures after the request was built keep `request` and, when the remote
/// answered, `raw_response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub success: bool,
    pub data: Value,
    pub raw_response: Value,
    /// resolved request as sent
    pub request: Value,
    pub error: Option<ScrapeError>,
    /// per-step audit trail of a workflow run, empty for a template run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepOutcome>,
}

impl ExecutorResult {
    pub fn failure(error: ScrapeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    fn failed_request(
        request: Value,
        raw_response: Value,
        error: ScrapeError,
    ) -> Self {
        Self {
            success: false,
            data: Value::Null,
            raw_response,
            request,
            error: Some(error),
            steps: Vec::new(),
        }
    }
}

/// Executes templates against the injected collaborators.
#[derive(Clone)]
pub struct TemplateExecutor {
    store: Arc<dyn ConfigStore>,
    http: Arc<dyn HttpClient>,
    sandbox: Arc<dyn Sandbox>,
    http_timeout: Duration,
    sandbox_timeout: Duration,
}

impl TemplateExecutor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        http: Arc<dyn HttpClient>,
        sandbox: Arc<dyn Sandbox>,
        http_timeout: Duration,
        sandbox_timeout: Duration,
    ) -> Self {
        Self {
            store,
            http,
            sandbox,
            http_timeout,
            sandbox_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Run `template` once with `inputs` bound to `$.params`.
    ///
    /// Never returns an error: every failure is reported inside the result.
    pub async fn execute(
        &self,
        template: &TemplateModel,
        inputs: &Vars,
    ) -> ExecutorResult {
        debug!("executor::execute({})", template.name);

        let (headers, proxy) = match self.route(template) {
            Ok(route) => route,
            Err(err) => return ExecutorResult::failure(err),
        };

        let request = match request::build(template, headers, inputs) {
            Ok(request) => request,
            Err(err) => return ExecutorResult::failure(err),
        };
        let snapshot = serde_json::to_value(&request).unwrap_or(Value::Null);

        let timeout = template.timeout_ms.map(Duration::from_millis).unwrap_or(self.http_timeout);
        let response = match self.http.send(&request, timeout, proxy.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                debug!("executor::execute({}) transport error: {}", template.name, err);
                return ExecutorResult::failed_request(snapshot, Value::Null, err);
            }
        };

        let body = parse_body(&response.body);
        if !response.is_success() {
            return ExecutorResult::failed_request(
                snapshot,
                body,
                ScrapeError::HttpStatus {
                    status: response.status,
                },
            );
        }

        match extract::apply(&template.extract_rule(), &body, self.sandbox.as_ref(), self.sandbox_timeout).await {
            Ok(data) => ExecutorResult {
                success: true,
                data,
                raw_response: body,
                request: snapshot,
                error: None,
                steps: Vec::new(),
            },
            Err(err) => {
                debug!("executor::execute({}) extraction failed: {}", template.name, err);
                ExecutorResult::failed_request(snapshot, body, err)
            }
        }
    }

    /// Headers to send and the proxy to route through.
    fn route(
        &self,
        template: &TemplateModel,
    ) -> Result<(BTreeMap<String, String>, Option<Arc<ProxyModel>>)> {
        let Some(group_ref) = template.header_group_ref.as_deref().filter(|r| !r.is_empty()) else {
            return Ok((request::merge_headers(None, &template.headers), None));
        };

        let group = self.store.get_header_group(group_ref)?;
        let proxy = match group.proxy_ref.as_deref().filter(|r| !r.is_empty()) {
            None => None,
            Some(proxy_ref) => {
                let proxy = self.store.get_proxy(proxy_ref)?;
                if !proxy.enabled {
                    return Err(ScrapeError::ConfigurationError(format!("proxy '{}' is disabled", proxy.name)));
                }
                Some(proxy)
            }
        };
        Ok((request::merge_headers(Some(&group.headers), &template.headers), proxy))
    }
}
