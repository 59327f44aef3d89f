//! Deployment scenarios against the mock management API and a fake device

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde_json::json;

use qiot_deployer::crypto::{aes_decrypt, aes_encrypt};
use qiot_deployer::errors::DeployError;
use qiot_deployer::models::deployment::{DeploymentRequest, DeviceCredentials};

use crate::common::{
    app_state, certificate, request_base, with_fields, zip_archive, ApiState, FakeDevice, MockApi,
    TestStorage, TOKEN,
};

fn sample_code_request(thing_id: &str, protocol: &str, variant: &str) -> DeploymentRequest {
    serde_json::from_value(with_fields(
        request_base(thing_id, protocol),
        json!({
            "kind": "sampleCode",
            "folderPath": "/home/pi/qiot",
            "sampleCodeType": variant,
        }),
    ))
    .unwrap()
}

fn function_request(fields: serde_json::Value) -> DeploymentRequest {
    serde_json::from_value(with_fields(
        request_base("T1", "mqtts"),
        with_fields(
            json!({
                "kind": "userFunction",
                "functionId": "blink-led",
                "functionName": "blink",
                "folderPath": "/home/pi/functions",
            }),
            fields,
        ),
    ))
    .unwrap()
}

#[tokio::test]
async fn test_mqtts_sample_code_issues_new_certificate() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T1", "mqtts", "nodejs-raspberry");
    let result = state.orchestrator.deploy(&request).await.unwrap();

    let created = api.created();
    assert_eq!(created, vec!["new-T1-1".to_string()]);

    let certificates = result.certificates.expect("certificates in result");
    assert_eq!(certificates.id, created[0]);
    assert_eq!(certificates.location, "/home/pi/qiot/ssl");
    assert_eq!(certificates.client_cert, "/home/pi/qiot/ssl/new-T1-1-cert.pem");
    assert_eq!(certificates.ca_cert, "/home/pi/qiot/ssl/ca_root.pem");
    assert_eq!(certificates.private_cert, "/home/pi/qiot/ssl/new-T1-1-private.pem");
    assert_eq!(result.codepath.as_deref(), Some("/home/pi/qiot"));

    let transfers = device.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].destination, "/home/pi/qiot");
    for file in [
        "main.js",
        "lib/util.js",
        "res/resourceinfo.json",
        "ssl/new-T1-1-cert.pem",
        "ssl/ca_root.pem",
        "ssl/new-T1-1-private.pem",
    ] {
        assert!(
            transfers[0].files.contains(&file.to_string()),
            "{} missing from {:?}",
            file,
            transfers[0].files
        );
    }
    // only the variant's examples travel
    assert!(!transfers[0].files.iter().any(|f| f.contains("README")));

    // mqtts connection parameters come from the certificate
    assert_eq!(api.count("things/certificates/new-T1-1/"), 2);
    assert_eq!(api.state.lock().unwrap().unauthorized, 0);
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_http_sample_code_skips_certificates() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T2", "http", "python-arduino");
    let result = state.orchestrator.deploy(&request).await.unwrap();

    assert_eq!(result.codepath.as_deref(), Some("/home/pi/qiot"));
    assert!(result.certificates.is_none());
    let value = serde_json::to_value(&result).unwrap();
    assert!(value.get("certificates").is_none());

    assert!(api.created().is_empty());
    assert_eq!(api.count("certificates"), 0);
    assert_eq!(api.count("things/T2/httpconnect/"), 1);

    let files = &device.transfers()[0].files;
    assert!(files.contains(&"res/resourceinfo.json".to_string()));
    assert!(!files.iter().any(|f| f.starts_with("ssl/") && f.ends_with(".pem")));
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_https_sample_code_ships_root_ca() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T2", "https", "nodejs-edison");
    state.orchestrator.deploy(&request).await.unwrap();

    let files = &device.transfers()[0].files;
    assert!(files.contains(&"ssl/mycert.pem".to_string()));
    assert!(api.created().is_empty());
}

#[tokio::test]
async fn test_inferred_sample_code_uses_thing_type() {
    let mut api_state = ApiState::default();
    api_state
        .thing_types
        .insert("T5".to_string(), "LinkIt Smart 7688 Duo".to_string());
    let api = MockApi::start_with(api_state).await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request: DeploymentRequest = serde_json::from_value(with_fields(
        request_base("T5", "http"),
        json!({ "kind": "inferredSampleCode", "folderPath": "/home/root/qiot" }),
    ))
    .unwrap();
    let variant = state
        .orchestrator
        .infer_sample_code_type(&request.access_token, "T5")
        .await
        .unwrap();
    assert_eq!(variant.name(), "python-linkit");

    state.orchestrator.deploy(&request).await.unwrap();
    assert_eq!(api.count("thingstype/type-T5/"), 2);
    assert_eq!(device.transfers()[0].destination, "/home/root/qiot");
}

#[tokio::test]
async fn test_untyped_thing_falls_back_to_default_variant() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, device);

    let token = secrecy::SecretString::from(TOKEN);
    let variant = state
        .orchestrator
        .infer_sample_code_type(&token, "T9")
        .await
        .unwrap();
    assert_eq!(variant.name(), "python-arduino");
    assert_eq!(api.count("thingstype"), 0);
}

#[tokio::test]
async fn test_capacity_failure_stops_before_copy() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::with_space(0));
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T2", "http", "nodejs-raspberry");
    let err = state.orchestrator.deploy(&request).await.unwrap_err();

    assert_eq!(
        err,
        DeployError::RemoteCapacity("check memory space failed - need 1 KB".to_string())
    );
    assert_eq!(err.code(), 7009);
    assert!(device.position("df -Pk").is_some());
    assert!(device.position("mkdir -p").is_none());
    assert!(device.transfers().is_empty());
    assert!(storage.leftovers().is_empty());
    // failed runs are still counted
    assert_eq!(state.orchestrator.runs_started(), 1);
}

#[tokio::test]
async fn test_unreachable_device_fails_first() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::unreachable(
        "client-authentication: All configured authentication methods failed",
    ));
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T1", "mqtts", "nodejs-raspberry");
    let err = state.orchestrator.deploy(&request).await.unwrap_err();

    assert!(matches!(err, DeployError::DeviceConnect(_)));
    assert_eq!(err.code(), 7008);
    assert_eq!(err.status(), 400);
    assert!(api.requests().is_empty());
    assert!(device.commands().is_empty());
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_api_failure_still_removes_workspace() {
    let api = MockApi::start_with(ApiState {
        fail_connect: true,
        ..Default::default()
    })
    .await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T2", "http", "nodejs-raspberry");
    let err = state.orchestrator.deploy(&request).await.unwrap_err();

    match err {
        DeployError::ApiStatus { status, .. } => assert_eq!(status, 500),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(device.transfers().is_empty());
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_encrypted_password_is_accepted() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let mut body = with_fields(
        request_base("T2", "http"),
        json!({
            "kind": "sampleCode",
            "folderPath": "/home/pi/qiot",
            "sampleCodeType": "python-arduino",
        }),
    );
    body["password"] = json!(aes_encrypt("raspberry", "T2"));
    let request: DeploymentRequest = serde_json::from_value(body).unwrap();

    let credentials: &DeviceCredentials = &request.credentials;
    let target = qiot_deployer::deploy::orchestrator::DeploymentOrchestrator::remote_target(
        "T2",
        credentials,
        "/home/pi/qiot",
    );
    assert_eq!(target.password(), "raspberry");
    state.orchestrator.deploy(&request).await.unwrap();
}

#[tokio::test]
async fn test_certificate_reuse_picks_newest_active() {
    let mut api_state = ApiState::default();
    api_state.certificates.insert(
        "T3".to_string(),
        vec![
            certificate("old", true, false, "2024-01-02T10:00:00Z"),
            certificate("newest-revoked", true, true, "2024-06-01T10:00:00Z"),
            certificate("inactive", false, false, "2024-05-01T10:00:00Z"),
            certificate("newer", true, false, "2024-03-02T10:00:00Z"),
        ],
    );
    let api = MockApi::start_with(api_state).await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T3", "mqtts", "nodejs-raspberry");
    let result = state.orchestrator.deploy(&request).await.unwrap();

    assert_eq!(result.certificates.unwrap().id, "newer");
    assert!(api.created().is_empty());
}

#[tokio::test]
async fn test_only_revoked_certificates_issue_new_one() {
    let mut api_state = ApiState::default();
    api_state.certificates.insert(
        "T4".to_string(),
        vec![certificate("revoked", true, true, "2024-06-01T10:00:00Z")],
    );
    let api = MockApi::start_with(api_state).await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, device);

    let request = sample_code_request("T4", "mqtts", "python-arduino");
    let result = state.orchestrator.deploy(&request).await.unwrap();
    assert_eq!(result.certificates.unwrap().id, "new-T4-1");
}

#[tokio::test]
async fn test_resources_with_generated_certificate() {
    let mut api_state = ApiState::default();
    api_state.certificates.insert(
        "T6".to_string(),
        vec![certificate("existing", true, false, "2024-01-02T10:00:00Z")],
    );
    let api = MockApi::start_with(api_state).await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request: DeploymentRequest = serde_json::from_value(with_fields(
        request_base("T6", "mqtts"),
        json!({
            "kind": "resources",
            "resourceinfoFolderPath": "/home/pi/res",
            "certFolderPath": "/home/pi/certs/",
            "autoGenerateCert": true,
        }),
    ))
    .unwrap();
    let result = state.orchestrator.deploy(&request).await.unwrap();

    // autoGenerate ignores the reusable certificate
    assert_eq!(api.created(), vec!["new-T6-1".to_string()]);
    let certificates = result.certificates.unwrap();
    assert_eq!(certificates.id, "new-T6-1");
    assert_eq!(certificates.location, "/home/pi/certs/");
    assert_eq!(certificates.client_cert, "/home/pi/certs/new-T6-1-cert.pem");
    assert_eq!(result.resourceinfo.as_deref(), Some("/home/pi/res/resourceinfo.json"));
    assert!(result.codepath.is_none());

    let transfers = device.transfers();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].destination, "/home/pi/certs/");
    assert_eq!(transfers[0].files.len(), 3);
    assert_eq!(transfers[1].destination, "/home/pi/res");
    assert_eq!(transfers[1].files, vec!["resourceinfo.json".to_string()]);

    // both capacity checks run before the first directory is created
    let commands = device.commands();
    let last_df = commands.iter().rposition(|c| c.contains("df -Pk")).unwrap();
    let first_mkdir = device.position("mkdir -p").unwrap();
    assert!(last_df < first_mkdir);
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_resources_on_one_mount_are_checked_together() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    // room for either payload, not both
    let device = Arc::new(FakeDevice::with_space(1));
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request: DeploymentRequest = serde_json::from_value(with_fields(
        request_base("T6", "mqtts"),
        json!({
            "kind": "resources",
            "resourceinfoFolderPath": "/home/pi/res",
            "certFolderPath": "/home/pi/certs",
            "autoGenerateCert": true,
        }),
    ))
    .unwrap();
    let err = state.orchestrator.deploy(&request).await.unwrap_err();

    assert_eq!(
        err,
        DeployError::RemoteCapacity("check memory space failed - need 2 KB".to_string())
    );
    assert!(device.position("mkdir -p").is_none());
    assert!(device.transfers().is_empty());
    assert!(storage.leftovers().is_empty());
}

#[tokio::test]
async fn test_mqtts_resources_require_cert_folder() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request: DeploymentRequest = serde_json::from_value(with_fields(
        request_base("T6", "mqtts"),
        json!({ "kind": "resources", "resourceinfoFolderPath": "/home/pi/res" }),
    ))
    .unwrap();
    let err = state.orchestrator.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::InvalidRequest(_)));
    assert_eq!(device.calls(), 0);
}

#[tokio::test]
async fn test_user_function_upload_is_cached() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let archive = zip_archive(&[("index.js", "console.log(1);\n"), ("lib/led.js", "exports.on = 1;\n")]);
    let request = function_request(json!({ "code": BASE64_STANDARD.encode(&archive) }));
    let result = state.orchestrator.deploy(&request).await.unwrap();

    let function_dir = storage.functions.path().join("T1").join("blink-led");
    assert_eq!(result.codepath.as_deref(), Some("/home/pi/functions/blink"));
    assert_eq!(
        result.cached_code_path.as_deref(),
        Some(function_dir.join("code").to_str().unwrap())
    );
    assert_eq!(
        result.download_url.as_deref(),
        Some("/v1/deploy/media/T1/blink-led/code.zip")
    );

    assert_eq!(std::fs::read(function_dir.join("code.zip")).unwrap(), archive);
    assert!(function_dir.join("code").join("lib").join("led.js").exists());
    let mut entries: Vec<String> = std::fs::read_dir(&function_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["code".to_string(), "code.zip".to_string()]);

    let transfers = device.transfers();
    assert_eq!(transfers[0].destination, "/home/pi/functions/blink");
    assert_eq!(
        transfers[0].files,
        vec!["index.js".to_string(), "lib/led.js".to_string()]
    );
    // no management API traffic for functions
    assert!(api.requests().is_empty());
}

#[tokio::test]
async fn test_user_function_redeploy_from_cache() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let cached = storage
        .functions
        .path()
        .join("T1")
        .join("blink-led")
        .join("code");
    std::fs::create_dir_all(&cached).unwrap();
    std::fs::write(cached.join("index.js"), "console.log(2);\n").unwrap();

    let request = function_request(json!({}));
    let result = state.orchestrator.deploy(&request).await.unwrap();

    assert_eq!(result.cached_code_path.as_deref(), cached.to_str());
    assert_eq!(device.transfers()[0].files, vec!["index.js".to_string()]);
}

#[tokio::test]
async fn test_bad_cached_path_touches_nothing() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = function_request(json!({ "cachedCodePath": "/share/iot/functions/T1/blink-led/codes" }));
    let err = state.orchestrator.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::FunctionNotFound(_)));
    assert_eq!(err.status(), 404);

    let missing = function_request(json!({ "cachedCodePath": "/nonexistent/T1/blink-led/code" }));
    let err = state.orchestrator.deploy(&missing).await.unwrap_err();
    assert!(matches!(err, DeployError::FunctionNotFound(_)));

    assert_eq!(device.calls(), 0);
    assert!(api.requests().is_empty());
}

#[tokio::test]
async fn test_invalid_function_id_rejected() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = function_request(json!({ "functionId": "../../etc" }));
    let err = state.orchestrator.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::InvalidRequest(_)));
    assert_eq!(device.calls(), 0);
}

#[tokio::test]
async fn test_failed_copy_keeps_cache_untouched() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice {
        copy_error: Some("scp: /home/pi/functions/blink: Permission denied".to_string()),
        ..Default::default()
    });
    let state = app_state(&api, &storage, Arc::clone(&device));

    let archive = zip_archive(&[("index.js", "console.log(1);\n")]);
    let request = function_request(json!({ "code": BASE64_STANDARD.encode(&archive) }));
    let err = state.orchestrator.deploy(&request).await.unwrap_err();

    assert_eq!(
        err,
        DeployError::DeviceDeployCode("scp: /home/pi/functions/blink: Permission denied".to_string())
    );
    // the workspace is gone and nothing reached the cache
    let function_dir = storage.functions.path().join("T1").join("blink-led");
    let leftovers: Vec<_> = match std::fs::read_dir(&function_dir) {
        Ok(entries) => entries.map(|e| e.unwrap().file_name()).collect(),
        Err(_) => Vec::new(),
    };
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn test_thing_connection_probe() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::unreachable("client-socket: connect ECONNREFUSED 10.0.0.8:22"));
    let state = app_state(&api, &storage, Arc::clone(&device));

    let request = sample_code_request("T1", "http", "python-arduino");
    let err = state
        .orchestrator
        .test_thing_connection("T1", &request.credentials)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DeployError::DeviceConnect("client-socket: connect ECONNREFUSED 10.0.0.8:22".to_string())
    );
    assert_eq!(*device.probes.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_save_connection_info_encrypts_password() {
    let api = MockApi::start().await;
    let storage = TestStorage::new();
    let device = Arc::new(FakeDevice::default());
    let state = app_state(&api, &storage, device);

    let request = sample_code_request("T7", "http", "python-arduino");
    state
        .orchestrator
        .save_connection_info(&request.access_token, "T7", &request.credentials)
        .await
        .unwrap();

    let patches = api.state.lock().unwrap().patches.clone();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0]["connection_status"], json!(true));
    let info = &patches[0]["thingconnectioninfo"];
    assert_eq!(info["hostname"], "10.0.0.8");
    assert_eq!(info["username"], "pi");
    let stored = info["password"].as_str().unwrap();
    assert_ne!(stored, "raspberry");
    assert_eq!(aes_decrypt(stored, "T7").unwrap(), "raspberry");
}
