//! HTTP transport seam.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    Result, ScrapeError,
    common::MemCache,
    model::{HttpMethod, ProxyModel},
};

const DIRECT_ROUTE: &str = "direct";

/// Body of an outgoing request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Map<String, Value>),
    /// sent verbatim
    Text(String),
}

/// A fully resolved request. Its serialized form is the `request` snapshot of a result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// query string parameters
    pub params: Map<String, Value>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Query parameters as strings, non-string values in their JSON text form.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params.iter().map(|(k, v)| (k.clone(), form_value(v))).collect()
    }
}

/// The remote's answer, whatever its status.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Sends one request. Transport failures and timeouts are [`ScrapeError::NetworkError`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        proxy: Option<&ProxyModel>,
    ) -> Result<HttpResponse>;
}

/// [`HttpClient`] on top of reqwest, one shared client per proxy endpoint.
#[derive(Clone)]
pub struct ReqwestClient {
    clients: MemCache<String, reqwest::Client>,
    user_agent: String,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Self {
        Self {
            clients: MemCache::new(256),
            user_agent: user_agent.to_string(),
        }
    }

    fn client_for(
        &self,
        proxy: Option<&ProxyModel>,
    ) -> Result<reqwest::Client> {
        let route = proxy.map(|p| p.url()).unwrap_or_else(|| DIRECT_ROUTE.to_string());
        self.clients.get_or_try_insert_with(route.clone(), || {
            debug!("http::client({})", route);
            let mut builder = reqwest::Client::builder().user_agent(self.user_agent.as_str());
            builder = match proxy {
                Some(_) => builder.proxy(reqwest::Proxy::all(&route).map_err(|e| ScrapeError::ConfigurationError(format!("proxy '{}': {}", route, e)))?),
                None => builder.no_proxy(),
            };
            builder.build().map_err(|e| ScrapeError::ConfigurationError(e.to_string()))
        })
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<reqwest::RequestBuilder> {
        let method = reqwest::Method::from_bytes(request.method.as_ref().as_bytes())
            .map_err(|_| ScrapeError::ConfigurationError(format!("invalid method '{:?}'", request.method)))?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));
        for (key, value) in &request.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| ScrapeError::ConfigurationError(err.to_string()))?,
                value.parse().map_err(|err: InvalidHeaderValue| ScrapeError::ConfigurationError(err.to_string()))?,
            );
        }

        let mut builder = client.request(method, &request.url).headers(headers).query(&request.query_pairs()).timeout(timeout);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => {
                if !request.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
                }
                builder.body(serde_json::to_vec(json)?)
            }
            RequestBody::Form(form) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter().map(|(k, v)| (k, form_value(v)))).finish();
                builder.body(encoded)
            }
            RequestBody::Text(text) => builder.body(text.clone()),
        };
        Ok(builder)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        proxy: Option<&ProxyModel>,
    ) -> Result<HttpResponse> {
        let client = self.client_for(proxy)?;
        let builder = self.build_request(&client, request, timeout)?;

        let call = async {
            let res = builder.send().await.map_err(|err| ScrapeError::NetworkError(err.to_string()))?;
            let status = res.status().as_u16();
            let headers: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
            let body = res.text().await.map_err(|err| ScrapeError::NetworkError(err.to_string()))?;
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        };

        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ScrapeError::NetworkError(format!("request to {} timed out after {} ms", request.url, timeout.as_millis())))?
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string, header, method, path, query_param},
    };

    use super::*;

    fn request(
        method: HttpMethod,
        url: String,
    ) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: BTreeMap::new(),
            params: Map::new(),
            body: RequestBody::Empty,
        }
    }

    #[tokio::test]
    async fn test_get_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("code", "600000"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": {"v": 42}}"#))
            .mount(&server)
            .await;

        let mut req = request(HttpMethod::GET, format!("{}/quote", server.uri()));
        req.params.insert("code".to_string(), json!("600000"));
        req.params.insert("page".to_string(), json!(2));

        let res = ReqwestClient::new("scrapeflow-test").send(&req, Duration::from_secs(5), None).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.body, r#"{"data": {"v": 42}}"#);
    }

    #[tokio::test]
    async fn test_post_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("page=1&question=pe%3C10"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut req = request(HttpMethod::POST, format!("{}/search", server.uri()));
        req.headers.insert("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string());
        let mut form = Map::new();
        form.insert("question".to_string(), json!("pe<10"));
        form.insert("page".to_string(), json!(1));
        req.body = RequestBody::Form(form);

        let res = ReqwestClient::new("scrapeflow-test").send(&req, Duration::from_secs(5), None).await.unwrap();
        assert_eq!(res.body, "ok");
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(503).set_body_string("busy")).mount(&server).await;

        let req = request(HttpMethod::GET, server.uri());
        let res = ReqwestClient::new("scrapeflow-test").send(&req, Duration::from_secs(5), None).await.unwrap();
        assert_eq!(res.status, 503);
        assert!(!res.is_success());
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let req = request(HttpMethod::GET, server.uri());
        let err = ReqwestClient::new("scrapeflow-test").send(&req, Duration::from_millis(100), None).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NetworkError(_)));
    }

    #[test]
    fn test_form_value() {
        assert_eq!(form_value(&json!("a")), "a");
        assert_eq!(form_value(&json!(3)), "3");
        assert_eq!(form_value(&json!(true)), "true");
        assert_eq!(form_value(&Value::Null), "");
    }
}
