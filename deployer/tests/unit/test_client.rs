//! Management API client outcome classification

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use qiot_deployer::errors::DeployError;
use qiot_deployer::http::client::{ClientOptions, ManagementClient};
use qiot_deployer::models::thing::{ThingConnectionInfo, DEFAULT_RESOURCE_TYPE_ID};

use crate::common::{ApiState, MockApi, TOKEN};

fn client(endpoint: &str, timeout: Duration) -> ManagementClient {
    ManagementClient::new(ClientOptions {
        endpoint: endpoint.to_string(),
        api_version: "v1".to_string(),
        request_timeout: timeout,
        certificate_timeout: timeout,
        accept_invalid_certs: true,
    })
    .unwrap()
}

fn token() -> SecretString {
    SecretString::from(TOKEN)
}

#[tokio::test]
async fn test_reported_error_keeps_upstream_code() {
    let api = MockApi::start_with(ApiState {
        report_thing_error: true,
        ..Default::default()
    })
    .await;
    let client = client(&api.endpoint, Duration::from_secs(5));

    let err = client.get_thing_detail(&token(), "T1").await.unwrap_err();
    assert_eq!(
        err,
        DeployError::ApiReported {
            code: 4004,
            message: "thing not found".to_string()
        }
    );
    assert_eq!(err.code(), 4004);
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_http_status_error() {
    let api = MockApi::start().await;
    let client = client(&api.endpoint, Duration::from_secs(5));

    // not routed by the mock
    let err = client
        .get_thing_type_detail(&token(), "missing/deeper")
        .await
        .unwrap_err();
    match err {
        DeployError::ApiStatus { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_api_is_a_timeout() {
    let api = MockApi::start_with(ApiState {
        thing_delay: Some(Duration::from_secs(2)),
        ..Default::default()
    })
    .await;
    let client = client(&api.endpoint, Duration::from_millis(200));

    let err = client.get_thing_detail(&token(), "T1").await.unwrap_err();
    assert!(matches!(err, DeployError::ConnectionTimeout(_)), "{:?}", err);
    assert_eq!(err.code(), 7001);
    assert_eq!(err.status(), 408);
}

#[tokio::test]
async fn test_unreachable_api_is_a_connection_error() {
    // bind then drop to get a closed port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}/qiotapp", addr), Duration::from_secs(5));
    let err = client.get_thing_detail(&token(), "T1").await.unwrap_err();
    assert!(matches!(err, DeployError::ConnectionError(_)), "{:?}", err);
    assert_eq!(err.status(), 503);
}

#[tokio::test]
async fn test_certificate_listing_and_detail() {
    let mut state = ApiState::default();
    state.certificates.insert(
        "T1".to_string(),
        vec![
            crate::common::certificate("a", true, false, "2024-01-01T00:00:00Z"),
            crate::common::certificate("b", true, false, "2024-01-01T00:00:00Z"),
            crate::common::certificate("c", true, false, "2024-02-01T00:00:00Z"),
        ],
    );
    let api = MockApi::start_with(state).await;
    let client = client(&api.endpoint, Duration::from_secs(5));

    let sorted = client
        .get_sorted_active_certificates(&token(), "T1")
        .await
        .unwrap();
    let ids: Vec<&str> = sorted.iter().map(|c| c.id.as_str()).collect();
    // equal timestamps keep their listed order
    assert_eq!(ids, vec!["c", "a", "b"]);

    let detail = client.get_certificate(&token(), "c").await.unwrap();
    assert_eq!(detail.client_cert.as_deref(), Some("/certs/c-cert.pem"));
    let pem = client
        .download_pem(&token(), detail.ca_cert.as_deref().unwrap(), "caCert")
        .await
        .unwrap();
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
}

#[tokio::test]
async fn test_connection_info_update() {
    let api = MockApi::start().await;
    let client = client(&api.endpoint, Duration::from_secs(5));

    let info = ThingConnectionInfo {
        hostname: "10.0.0.8".to_string(),
        username: "pi".to_string(),
        password: "c2VjcmV0".to_string(),
    };
    assert_ok!(client.update_connection_info(&token(), "T1", &info).await);
    assert_eq!(
        api.requests(),
        vec![("PATCH".to_string(), "things/T1".to_string())]
    );
}

type Recorded = Arc<Mutex<Vec<Value>>>;

async fn login(State(seen): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body);
    Json(json!({ "result": { "access_token": "issued" } }))
}

async fn create_app(State(seen): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body);
    Json(json!({ "result": { "id": "app-1" } }))
}

async fn remove_app(State(seen): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body);
    Json(json!({ "error": [{ "message": "application in use", "code": "4090" }] }))
}

#[tokio::test]
async fn test_user_and_app_operations() {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/qiotapp/v1/users/login/", post(login))
        .route("/qiotapp/v1/iotapp/", post(create_app))
        .route("/qiotapp/v1/iotapp/multidelete/", delete(remove_app))
        .with_state(Arc::clone(&seen));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = client(&format!("http://{}/qiotapp", addr), Duration::from_secs(5));

    let logged_in = client
        .login("admin", &SecretString::from("admin"))
        .await
        .unwrap();
    assert_eq!(logged_in["result"]["access_token"], "issued");

    let created = client.create_app(&token(), "greenhouse").await.unwrap();
    assert_eq!(created["result"]["id"], "app-1");

    let removed = client.remove_app(&token(), "app-1").await;
    assert_err!(&removed);
    assert!(matches!(removed, Err(DeployError::ApiReported { code: 4090, .. })));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0]["username"], "admin");
    assert_eq!(seen[1]["appname"], "greenhouse");
    assert_eq!(seen[2], json!(["app-1"]));
}

/// One request as seen by the recording server
#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    token: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
    fail: bool,
}

async fn record_any(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.seen.lock().unwrap().push(Seen {
        method,
        path: uri.path().to_string(),
        token: headers
            .get("Access-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    if recorder.fail {
        Json(json!({ "error": [{ "message": "thing limit reached", "code": 4013 }] }))
    } else {
        Json(json!({ "result": { "id": "thing-9" } }))
    }
}

async fn recording_api(fail: bool) -> (ManagementClient, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(record_any).with_state(Recorder {
        seen: Arc::clone(&seen),
        fail,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = client(&format!("http://{}/qiotapp", addr), Duration::from_secs(5));
    (client, seen)
}

fn only_request(seen: &Arc<Mutex<Vec<Seen>>>) -> Seen {
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    seen[0].clone()
}

#[tokio::test]
async fn test_create_thing_with_supported_type() {
    let (client, seen) = recording_api(false).await;

    let created = client
        .create_thing(&token(), "app-1", "greenhouse-pi", "Raspberry Pi")
        .await
        .unwrap();
    assert_eq!(created["result"]["id"], "thing-9");

    let request = only_request(&seen);
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/qiotapp/v1/things/");
    assert_eq!(request.token.as_deref(), Some(TOKEN));
    assert_eq!(request.body["thingname"], "greenhouse-pi");
    assert_eq!(request.body["iotappid"], "app-1");
    assert_eq!(request.body["type"], "QIoTSupported");
    assert_eq!(
        request.body["thingtypeattributes"]["thingtypeid"],
        "583ff407d2bb340006354cd8"
    );
}

#[tokio::test]
async fn test_create_thing_unknown_type_is_arduino() {
    let (client, seen) = recording_api(false).await;

    assert_ok!(client.create_thing(&token(), "app-1", "yun", "Toaster").await);
    let request = only_request(&seen);
    assert_eq!(
        request.body["thingtypeattributes"]["thingtypeid"],
        "58182b5cfe5c6234200d1125"
    );
}

#[tokio::test]
async fn test_create_thing_without_type() {
    let (client, seen) = recording_api(false).await;

    assert_ok!(client.create_thing_without_type(&token(), "app-1", "custom-board").await);

    let request = only_request(&seen);
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/qiotapp/v1/things/");
    assert_eq!(request.token.as_deref(), Some(TOKEN));
    assert_eq!(request.body["thingname"], "custom-board");
    assert_eq!(request.body["type"], "Custom");
    assert_eq!(request.body["thingtypeattributes"]["thingtypeid"], "");
}

#[tokio::test]
async fn test_create_thing_resource() {
    let (client, seen) = recording_api(false).await;

    assert_ok!(client.create_thing_resource(&token(), "thing-9", "temperature").await);

    let request = only_request(&seen);
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/qiotapp/v1/things/resources/thing-9/");
    assert_eq!(request.token.as_deref(), Some(TOKEN));
    assert_eq!(request.body["resourcename"], "temperature");
    assert_eq!(request.body["resourceid"], "temperature");
    assert_eq!(request.body["resourcetype"], DEFAULT_RESOURCE_TYPE_ID);
    assert_eq!(request.body["datatype"], "Float");
}

#[tokio::test]
async fn test_remove_thing() {
    let (client, seen) = recording_api(false).await;

    assert_ok!(client.remove_thing(&token(), "thing-9").await);

    let request = only_request(&seen);
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/qiotapp/v1/things/multidelete/");
    assert_eq!(request.token.as_deref(), Some(TOKEN));
    assert_eq!(request.body, json!(["thing-9"]));
}

#[tokio::test]
async fn test_thing_operations_report_api_errors() {
    let (client, seen) = recording_api(true).await;
    let limit = DeployError::ApiReported {
        code: 4013,
        message: "thing limit reached".to_string(),
    };

    let err = client
        .create_thing(&token(), "app-1", "pi", "Raspberry Pi")
        .await
        .unwrap_err();
    assert_eq!(err, limit);
    assert_eq!(err.code(), 4013);
    assert_eq!(err.status(), 500);

    let err = client
        .create_thing_without_type(&token(), "app-1", "board")
        .await
        .unwrap_err();
    assert_eq!(err, limit);

    let err = client
        .create_thing_resource(&token(), "thing-9", "humidity")
        .await
        .unwrap_err();
    assert_eq!(err, limit);

    let err = client.remove_thing(&token(), "thing-9").await.unwrap_err();
    assert_eq!(err, limit);

    assert_eq!(seen.lock().unwrap().len(), 4);
}

async fn oversized_pem() -> String {
    "A".repeat(100 * 1024)
}

async fn streamed_pem() -> Body {
    // no content length, the cap must stop the read
    let chunks = (0..40).map(|_| Ok::<_, std::io::Error>(vec![b'A'; 4096]));
    Body::from_stream(futures::stream::iter(chunks))
}

#[tokio::test]
async fn test_pem_download_is_capped() {
    let app = Router::new()
        .route("/qiotapp/certs/big.pem", get(oversized_pem))
        .route("/qiotapp/certs/streamed.pem", get(streamed_pem));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = client(&format!("http://{}/qiotapp", addr), Duration::from_secs(5));

    for location in ["/certs/big.pem", "/certs/streamed.pem"] {
        let err = client
            .download_pem(&token(), location, "caCert")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Download(_)), "{:?}", err);
        assert_eq!(err.code(), 7004);
    }
}
