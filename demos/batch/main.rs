//! Runs a two step workflow over three CSV rows against a local mock server.
//!
//! `RUST_LOG=scrapeflow=debug cargo run --example batch`

use std::sync::Arc;

use scrapeflow::{BatchEvent, BatchTaskModel, Config, EngineBuilder, MemStore, TemplateModel, WorkflowModel};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/login")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"}))).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"rows": [{"name": "pe"}, {"name": "pb"}]}})))
        .mount(&server)
        .await;

    let store = MemStore::new();
    store.deploy_template(TemplateModel::from_json(
        &json!({
            "name": "login",
            "url": format!("{}/login", server.uri()),
            "method": "POST",
            "headers": {"Content-Type": "application/json"},
            "body_template": {"user": ""}
        })
        .to_string(),
    )?)?;
    store.deploy_template(TemplateModel::from_json(
        &json!({
            "name": "search",
            "url": format!("{}/search", server.uri()),
            "default_params": {"page": "$random(1,5)"},
            "extract_type": "jsonpath",
            "json_path": "data.rows"
        })
        .to_string(),
    )?)?;
    store.deploy_workflow(WorkflowModel::from_json(
        r#"{
            "name": "login-then-search",
            "steps": [
                {"name": "login", "template_ref": "login", "input": {"user": "$.params.user"}, "extract": {"token": "$.token"}},
                {"name": "search", "template_ref": "search", "input": {"q": "$.params.q", "token": "$.steps.login.extracted.token"}, "sleep": {"min": 0.1, "max": 0.3}}
            ]
        }"#,
    )?)?;

    let output_root = std::env::temp_dir().join("scrapeflow-demo");
    let mut config = Config::default();
    config.batch.output_root = output_root.clone();
    let engine = EngineBuilder::new().config(config).store(Arc::new(store)).build()?;

    let mut events = engine.subscribe_batch_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let done = matches!(event, BatchEvent::Finished { .. });
            println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
            if done {
                break;
            }
        }
    });

    let task = BatchTaskModel::from_json(
        &json!({
            "name": "demo",
            "target": {"kind": "workflow", "ref": "login-then-search"},
            "concurrency": 2,
            "sleep_ms": 100,
            "csv_text": "user,q,output_name\nu1,pe<10,first\nu2,pb>1,\nu3,roe,third"
        })
        .to_string(),
    )?;
    let id = engine.create_batch(task)?;
    engine.start_batch(&id)?;
    let status = engine.wait_batch(&id).await?;

    println!("batch {} finished as {}: {:?}", status.name, status.status.as_ref(), status.counts);
    for item in &status.items {
        println!("  #{} {} -> {:?}", item.seq_no, item.status.as_ref(), item.output_file);
    }
    println!("artifacts under {}", output_root.display());
    Ok(())
}
