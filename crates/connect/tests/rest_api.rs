//! REST adapter tests against a mocked cloud endpoint.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockbook_connect::{ConnectConfig, HttpRemoteStore};
use stockbook_core::errors::RemoteStoreError;
use stockbook_core::store::{Filter, RemoteStore};

fn store_for(server: &MockServer) -> HttpRemoteStore {
    HttpRemoteStore::new(ConnectConfig::new(server.uri()).with_api_key("test-key")).unwrap()
}

#[tokio::test]
async fn select_fetches_rows_with_filter_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .and(query_param("id", "eq.42"))
        .and(query_param("limit", "1"))
        .and(header("apikey", "test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 42, "name": "Widget"}])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let rows = store
        .select("products", &Filter::id(42), Some(1))
        .await
        .unwrap();
    assert_eq!(rows, vec![json!({"id": 42, "name": "Widget"})]);
}

#[tokio::test]
async fn probe_style_select_hits_the_table_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let rows = store.select("products", &Filter::All, Some(1)).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn insert_posts_rows_and_returns_representation() {
    let server = MockServer::start().await;
    let row = json!({"name": "Widget", "supplier_id": 3});
    Mock::given(method("POST"))
        .and(path("/rest/v1/products"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!([row.clone()])))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{"id": 1, "name": "Widget"}])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let stored = store.insert("products", vec![row]).await.unwrap();
    assert_eq!(stored[0]["id"], json!(1));
}

#[tokio::test]
async fn update_patches_by_id() {
    let server = MockServer::start().await;
    let patch = json!({"name": "Gadget"});
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/products"))
        .and(query_param("id", "eq.1"))
        .and(body_json(patch.clone()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Gadget"}])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let rows = store.update("products", &Filter::id(1), patch).await.unwrap();
    assert_eq!(rows[0]["name"], json!("Gadget"));
}

#[tokio::test]
async fn delete_targets_the_filtered_row() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/products"))
        .and(query_param("id", "eq.9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.delete("products", &Filter::id(9)).await.unwrap();
}

#[tokio::test]
async fn api_errors_are_structured_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store
        .select("products", &Filter::All, None)
        .await
        .unwrap_err();
    match err {
        RemoteStoreError::Api { status, message } => {
            assert_eq!(status, 503);
            assert!(message.contains("maintenance"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn unfiltered_delete_is_refused_before_sending() {
    let server = MockServer::start().await;
    let store = store_for(&server);
    let err = store.delete("products", &Filter::All).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::InvalidRequest(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
