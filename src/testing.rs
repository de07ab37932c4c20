//! Test doubles shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    Result, ScrapeError,
    executor::{HttpClient, HttpRequest, HttpResponse, ScriptSandbox, TemplateExecutor},
    model::ProxyModel,
    store::MemStore,
};

type Scripted = Result<HttpResponse>;

#[derive(Default)]
struct Script {
    once: HashMap<String, VecDeque<Scripted>>,
    always: HashMap<String, Scripted>,
    requests: Vec<HttpRequest>,
    proxies: Vec<Option<String>>,
    timeouts: Vec<Duration>,
}

/// [`HttpClient`] answering from a per-url script and recording every call.
///
/// One-shot answers are served first, in the order they were added, then the
/// url's standing answer. A url with no script fails with a network error.
#[derive(Clone, Default)]
pub(crate) struct FakeHttpClient {
    script: Arc<Mutex<Script>>,
    delay: Arc<Mutex<Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

fn ok(
    status: u16,
    body: &str,
) -> Scripted {
    Ok(HttpResponse {
        status,
        headers: HashMap::new(),
        body: body.to_string(),
    })
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        &self,
        url: &str,
        status: u16,
        body: &str,
    ) {
        self.script.lock().unwrap().always.insert(url.to_string(), ok(status, body));
    }

    pub fn respond_once(
        &self,
        url: &str,
        status: u16,
        body: &str,
    ) {
        self.script.lock().unwrap().once.entry(url.to_string()).or_default().push_back(ok(status, body));
    }

    pub fn fail(
        &self,
        url: &str,
        error: ScrapeError,
    ) {
        self.script.lock().unwrap().always.insert(url.to_string(), Err(error));
    }

    pub fn fail_once(
        &self,
        url: &str,
        error: ScrapeError,
    ) {
        self.script.lock().unwrap().once.entry(url.to_string()).or_default().push_back(Err(error));
    }

    /// Hold every call for `delay` before answering.
    pub fn set_delay(
        &self,
        delay: Duration,
    ) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn proxies(&self) -> Vec<Option<String>> {
        self.script.lock().unwrap().proxies.clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.script.lock().unwrap().timeouts.clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        proxy: Option<&ProxyModel>,
    ) -> Result<HttpResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let answer = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            script.proxies.push(proxy.map(|p| p.url()));
            script.timeouts.push(timeout);
            match script.once.get_mut(&request.url).and_then(|q| q.pop_front()) {
                Some(answer) => answer,
                None => script
                    .always
                    .get(&request.url)
                    .cloned()
                    .unwrap_or_else(|| Err(ScrapeError::NetworkError(format!("no scripted answer for {}", request.url)))),
            }
        };

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

pub(crate) fn executor_with(
    store: MemStore,
    http: FakeHttpClient,
) -> TemplateExecutor {
    TemplateExecutor::new(Arc::new(store), Arc::new(http), Arc::new(ScriptSandbox::default()), Duration::from_secs(30), Duration::from_secs(10))
}
