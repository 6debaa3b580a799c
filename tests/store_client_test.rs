//! Store client and health probe integration tests against `wiremock`.

mod common;

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sales_pipeline::health::{HealthProbe, ProbeStatus};
use sales_pipeline::store::client::{CountOutcome, StoreError};

use common::*;

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_liveness_uses_first_successful_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = store_client(&config_for(&server));
    assert_eq!(client.check_liveness().await.unwrap(), "/");
}

#[tokio::test]
async fn test_liveness_fails_when_no_endpoint_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = store_client(&config_for(&server));
    let result = client.check_liveness().await;
    assert!(matches!(result, Err(StoreError::Unreachable { .. })));
}

// ---------------------------------------------------------------------------
// Control plane
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_calls_parse_store_shapes() {
    let server = MockServer::start().await;
    mount_schema_list(&server, &["sales", "orders"]).await;
    mount_table_list(&server, &["sales_REALTIME"]).await;

    let client = store_client(&config_for(&server));
    assert_eq!(
        client.list_schemas().await.unwrap(),
        vec!["sales".to_string(), "orders".to_string()]
    );
    assert_eq!(
        client.list_tables().await.unwrap(),
        vec!["sales_REALTIME".to_string()]
    );
}

#[tokio::test]
async fn test_delete_missing_table_is_ok_and_errors_surface() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tables/sales"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tables/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("segment locked"))
        .mount(&server)
        .await;

    let client = store_client(&config_for(&server));
    assert!(client.delete_table("sales").await.is_ok());
    match client.delete_table("orders").await {
        Err(StoreError::Api { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "segment locked");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Query plane
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_count_rows_sends_sql_body() {
    let server = MockServer::start().await;
    mount_count(&server, count_response(7), 1).await;

    let client = store_client(&config_for(&server));
    assert_eq!(client.count_rows("sales").await.unwrap(), CountOutcome::Rows(7));
}

#[tokio::test]
async fn test_sample_row_maps_columns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/sql"))
        .and(body_json(json!({ "sql": SAMPLE_SQL })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultTable": {
                "dataSchema": {"columnNames": ["id_venda", "valor_total"]},
                "rows": [["v1", 150.0]]
            },
            "exceptions": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = store_client(&config_for(&server));
    let row = client.sample_row("sales").await.unwrap().unwrap();
    assert_eq!(row["id_venda"], "v1");
}

// ---------------------------------------------------------------------------
// Health probe
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_probe_fetches_sample_when_rows_exist() {
    let server = MockServer::start().await;
    mount_count(&server, count_response(5), 1).await;
    Mock::given(method("POST"))
        .and(path("/query/sql"))
        .and(body_json(json!({ "sql": SAMPLE_SQL })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut probe = HealthProbe::new(store_client(&config), "sales", Duration::from_secs(30));

    // A failing sample query does not change the verdict.
    assert_eq!(probe.check().await, ProbeStatus::Healthy { count: 5 });
    assert!(!probe.is_due(Instant::now()));
}

#[tokio::test]
async fn test_probe_skips_sample_for_empty_table() {
    let server = MockServer::start().await;
    mount_count(&server, count_response(0), 1).await;
    Mock::given(method("POST"))
        .and(path("/query/sql"))
        .and(body_json(json!({ "sql": SAMPLE_SQL })))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut probe = HealthProbe::new(store_client(&config), "sales", Duration::from_secs(30));
    assert_eq!(probe.check().await, ProbeStatus::Healthy { count: 0 });
}

#[tokio::test]
async fn test_probe_reports_exceptions_as_unhealthy() {
    let server = MockServer::start().await;
    mount_count(&server, exception_response(), 1).await;

    let config = config_for(&server);
    let mut probe = HealthProbe::new(store_client(&config), "sales", Duration::from_secs(30));
    assert!(!probe.check().await.is_healthy());
}
