use axum::body::Bytes;
use scale_armor::app::{parse_params, RequestHead, Response, Status};
use scale_armor::model::{MemoryModelService, ModelAppProvider, ModelController, ModelOperation, ModelService};
use scale_armor::router::Method;
use scale_armor::server::Server;
use scale_armor::service::RuleValidator;
use serde_json::{json, Value};
use std::sync::Arc;

async fn server_with(operations: Vec<ModelOperation>) -> Server {
    let service = MemoryModelService::<Value>::new("people");
    service
        .create_all(vec![
            json!({"_id": 0, "name": "Test 0", "age": 8}),
            json!({"_id": 1, "name": "Beta", "age": 17}),
            json!({"_id": 2, "name": "Gamma", "age": 11}),
            json!({"_id": 3, "name": "All tests", "age": 33}),
        ])
        .await
        .unwrap();
    let rules = RuleValidator::from_value(json!({
        "name": {"required": true, "minLength": 2},
        "age": {"minimum": 0}
    }))
    .unwrap();
    let controller = ModelController::with_rules(Arc::new(service), Arc::new(rules));
    let provider = ModelAppProvider::with_operations(Arc::new(controller), operations).with_page_size(3);
    let mut server = Server::new();
    server.app_from_provider(&provider, "people");
    server
}

async fn call(server: &Server, method: Method, path: &str, query: &str, body: Option<Value>) -> Response {
    let mut head = RequestHead::new(method, path).with_params(parse_params(query));
    let bytes = match body {
        Some(body) => {
            head = head.with_content_type("application/json");
            Bytes::from(body.to_string())
        }
        None => Bytes::new(),
    };
    server.handle(head, bytes).await
}

#[tokio::test]
async fn count_with_query_string_where() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Get, "/people/count", "where.$on.age.$gt=10", None).await;
    assert_eq!(response.status, Status::OK);
    assert_eq!(response.body_json(), Some(json!(3)));

    let response = call(
        &server,
        Method::Get,
        "/people/count",
        "where=%7B%22%24id%22%3A1%7D",
        None,
    )
    .await;
    assert_eq!(response.body_json(), Some(json!(1)));
}

#[tokio::test]
async fn count_post_reads_the_body() {
    let server = server_with(vec![]).await;
    let body = json!({"where": {"$or": [{"$id": 0}, {"$id": 3}]}});
    let response = call(&server, Method::Post, "/people/count", "", Some(body)).await;
    assert_eq!(response.body_json(), Some(json!(2)));
}

#[tokio::test]
async fn find_uses_configured_page_size_and_paging_params() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Get, "/people/find", "", None).await;
    let page = response.body_json().unwrap();
    assert_eq!(page["pageSize"], json!(3));
    assert_eq!(page["lastPage"], json!(2));
    assert_eq!(page["data"].as_array().unwrap().len(), 3);

    let body = json!({"page": 1, "pageSize": 2, "sortBy": "age", "sortType": -1});
    let response = call(&server, Method::Post, "/people/find", "", Some(body)).await;
    let page = response.body_json().unwrap();
    assert_eq!(page["data"][0]["name"], json!("All tests"));
    assert_eq!(page["data"][1]["name"], json!("Beta"));
    assert_eq!(page["total"], json!(4));
}

#[tokio::test]
async fn get_returns_model_or_null() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Get, "/people/get", "where.$id=2", None).await;
    assert_eq!(response.body_json().unwrap()["name"], json!("Gamma"));
    let response = call(&server, Method::Post, "/people/get", "", Some(json!({"where": {"$id": 42}}))).await;
    assert_eq!(response.status, Status::OK);
    assert_eq!(response.body_json(), Some(Value::Null));
}

#[tokio::test]
async fn create_validates_before_storing() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Post, "/people/", "", Some(json!({"age": 5}))).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
    let body = response.body_json().unwrap();
    assert_eq!(body["status"], json!(400));
    assert!(body["message"].as_str().unwrap().contains("name is required"));

    let response = call(&server, Method::Post, "/people/", "", Some(json!({"name": "Delta", "age": 5}))).await;
    assert_eq!(response.status, Status::OK);
    assert!(response.body_json().unwrap()["_id"].is_string());
    let count = call(&server, Method::Get, "/people/count", "", None).await;
    assert_eq!(count.body_json(), Some(json!(5)));
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Post, "/people/", "", Some(json!({"_id": 1, "name": "Beta"}))).await;
    assert_eq!(response.status, Status::CONFLICT);
}

#[tokio::test]
async fn put_patch_and_delete() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Put, "/people/", "", Some(json!({"_id": 1, "name": "Beta 2"}))).await;
    assert_eq!(response.body_json(), Some(json!({"_id": 1, "name": "Beta 2"})));

    let response = call(&server, Method::Patch, "/people/", "", Some(json!({"_id": 2, "age": 12}))).await;
    assert_eq!(response.body_json(), Some(json!({"_id": 2, "name": "Gamma", "age": 12})));

    let response = call(&server, Method::Patch, "/people/", "", Some(json!({"age": -1, "_id": 2}))).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
    let response = call(&server, Method::Patch, "/people/", "", Some(json!({"age": 1}))).await;
    assert_eq!(response.status, Status::BAD_REQUEST);

    let response = call(&server, Method::Delete, "/people/", "where.$id=3", None).await;
    assert_eq!(response.body_json(), Some(json!(true)));
    let response = call(&server, Method::Delete, "/people/", "where.$id=3", None).await;
    assert_eq!(response.body_json(), Some(json!(false)));
    let response = call(&server, Method::Delete, "/people/", "", None).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_input_is_a_client_error() {
    let server = server_with(vec![]).await;
    let response = call(&server, Method::Get, "/people/find", "where=%7Bnope", None).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
    let response = call(&server, Method::Post, "/people/find", "", Some(json!([1, 2]))).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
    let response = call(&server, Method::Post, "/people/", "", None).await;
    assert_eq!(response.status, Status::BAD_REQUEST);
}

#[tokio::test]
async fn only_allowed_operations_are_exposed() {
    let server = server_with(vec![ModelOperation::Count, ModelOperation::Get]).await;
    assert_eq!(call(&server, Method::Get, "/people/count", "", None).await.status, Status::OK);
    assert_eq!(call(&server, Method::Get, "/people/find", "", None).await.status, Status::NOT_FOUND);
    let response = call(&server, Method::Post, "/people/", "", Some(json!({"name": "No"}))).await;
    assert_eq!(response.status, Status::NOT_FOUND);
}
