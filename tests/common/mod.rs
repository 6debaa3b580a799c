//! Shared helpers for integration tests
//!
//! Builds configuration pointing both store planes at a `wiremock` server and
//! mounts the store endpoints most tests need.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

use sales_pipeline::config::{Config, RuntimeEnvironment, ServiceRole};
use sales_pipeline::provisioning::ProvisioningController;
use sales_pipeline::store::model::sales_dataset;
use sales_pipeline::store::StoreClient;

pub const COUNT_SQL: &str = "SELECT COUNT(*) FROM sales";
pub const SAMPLE_SQL: &str = "SELECT * FROM sales LIMIT 1";

/// Ingest configuration whose controller and broker are `server`, with
/// settle waits disabled and a short poll timeout.
pub fn config_for(server: &MockServer) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("PINOT_CONTROLLER_URL", server.uri()),
        ("PINOT_BROKER_URL", server.uri()),
        ("PIPELINE_POLL_TIMEOUT_MS", "20".to_string()),
        ("PIPELINE_HTTP_TIMEOUT_SECS", "2".to_string()),
    ]);

    let mut config = Config::resolve(ServiceRole::Ingest, RuntimeEnvironment::Container, |key| {
        vars.get(key).cloned()
    })
    .expect("valid config");
    config.store.table_settle = Duration::ZERO;
    config.store.repair_settle = Duration::ZERO;
    config
}

pub fn store_client(config: &Config) -> StoreClient {
    StoreClient::new(&config.store).expect("client")
}

pub fn controller_for(config: &Config) -> ProvisioningController {
    let (schema, table) = sales_dataset(&config.store, &config.kafka).expect("dataset");
    ProvisioningController::new(store_client(config), schema, table, &config.store)
}

pub fn count_response(count: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "resultTable": {
            "dataSchema": {"columnNames": ["count(*)"]},
            "rows": [[count]]
        },
        "exceptions": []
    }))
}

pub fn exception_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "exceptions": [{"errorCode": 190, "message": "TableDoesNotExistError"}]
    }))
}

// ---------------------------------------------------------------------------
// Endpoint mounts
// ---------------------------------------------------------------------------

pub async fn mount_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(server)
        .await;
}

pub async fn mount_schema_list(server: &MockServer, schemas: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/schemas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(schemas)))
        .mount(server)
        .await;
}

pub async fn mount_table_list(server: &MockServer, tables: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tables": tables })))
        .mount(server)
        .await;
}

pub async fn mount_count(
    server: &MockServer,
    response: ResponseTemplate,
    expected: impl Into<Times>,
) {
    Mock::given(method("POST"))
        .and(path("/query/sql"))
        .and(body_json(json!({ "sql": COUNT_SQL })))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

pub fn sale_json(id: &str, total: f64) -> Vec<u8> {
    let value: Value = json!({
        "id_venda": id,
        "timestamp": 1_718_000_000_000_i64,
        "data_hora": "2024-06-10T09:13:20",
        "categoria": "Livros",
        "produto": "Romance",
        "preco": total,
        "quantidade": 1,
        "valor_total": total,
        "forma_pagamento": "PIX",
        "loja": "Curitiba-2",
        "cidade": "Curitiba",
        "estado": "PR"
    });
    serde_json::to_vec(&value).expect("json")
}
