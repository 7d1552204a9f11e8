use std::io::Read;
use std::time::Duration;

use layz_spa::{DeviceId, Error, MessageLogMode, Session};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(server: &MockServer) -> Session {
    Session::builder().base_url(server.uri()).build().unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-123"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn authenticate_stores_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("X-Gizwits-Application-Id", layz_spa::DEFAULT_APP_ID))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "username": "user@example.com",
            "password": "hunter2",
            "lang": "en"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-123", "uid": "u1", "expire_at": 1900000000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert!(!session.is_authenticated());
    assert!(session.authenticate("user@example.com", "hunter2").await);
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn rejected_login_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error_code": 9020})))
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert!(!session.authenticate("user@example.com", "wrong").await);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn unreachable_server_returns_false() {
    let session = Session::builder()
        .base_url("http://127.0.0.1:9")
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    assert!(!session.authenticate("user@example.com", "hunter2").await);
}

#[tokio::test]
async fn controller_requires_authentication() {
    let server = MockServer::start().await;
    let session = session_for(&server);
    let err = session.controller("did-1").err().expect("should fail without token");
    assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn backoff_retries_until_login_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_login(&server).await;

    let session = session_for(&server);
    assert!(
        session
            .authenticate_with_backoff("user", "pw", 3, Duration::from_millis(5))
            .await
    );
}

#[tokio::test]
async fn backoff_gives_up_after_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert!(
        !session
            .authenticate_with_backoff("user", "pw", 2, Duration::from_millis(5))
            .await
    );
}

#[tokio::test]
async fn list_bound_devices_reads_bindings() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .and(query_param("limit", "20"))
        .and(query_param("skip", "0"))
        .and(header("X-Gizwits-User-token", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                {"did": "did-1", "product_name": "Airjet", "is_online": true},
                {"did": "did-2", "dev_alias": "Garden"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    assert!(session.authenticate("user", "pw").await);
    let ids = session.list_bound_devices().await;

    assert_eq!(ids, vec![DeviceId::new("did-1"), DeviceId::new("did-2")]);
    assert_eq!(session.device_ids(), ids.as_slice());
}

#[tokio::test]
async fn list_bound_devices_follows_pages() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let full_page: Vec<Value> = (0..20).map(|i| json!({"did": format!("did-{i}")})).collect();
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .and(query_param("skip", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": full_page})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .and(query_param("skip", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{"did": "did-20"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    assert!(session.authenticate("user", "pw").await);
    let ids = session.list_bound_devices().await;
    assert_eq!(ids.len(), 21);
    assert_eq!(ids[20], DeviceId::new("did-20"));
}

#[tokio::test]
async fn failed_listing_keeps_previous_devices() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{"did": "did-1"}]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    assert!(session.authenticate("user", "pw").await);
    assert_eq!(session.list_bound_devices().await.len(), 1);
    assert!(session.list_bound_devices().await.is_empty());
    assert_eq!(session.device_ids(), &[DeviceId::new("did-1")]);
}

#[tokio::test]
async fn listing_without_token_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bindings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = session_for(&server);
    assert!(session.list_bound_devices().await.is_empty());
}

#[tokio::test]
async fn reauthentication_reaches_existing_controllers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "old"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devdata/did-1/latest"))
        .and(header("X-Gizwits-User-token", "new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"attr": {"power": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert!(session.authenticate("user", "pw").await);
    let spa = session.controller("did-1").unwrap().build();
    assert!(session.authenticate("user", "pw").await);

    assert!(spa.refresh(true).await.power);
}

#[tokio::test]
async fn message_log_records_traffic_without_secret() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/devdata/did-1/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"attr": {"power": 1}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/control/did-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let tmp = NamedTempFile::new().unwrap();
    let log_path = tmp.path().to_str().unwrap().to_string();
    let session = Session::builder()
        .base_url(server.uri())
        .message_log(MessageLogMode::Full, &log_path)
        .build()
        .unwrap();
    assert!(session.authenticate("user", "hunter2").await);
    let spa = session.controller("did-1").unwrap().build();
    spa.set_wave_state(true).await;

    let mut contents = String::new();
    std::fs::File::open(&log_path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert!(!contents.contains("hunter2"));

    let lines: Vec<Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let dirs: Vec<&str> = lines.iter().map(|l| l["dir"].as_str().unwrap()).collect();
    assert_eq!(dirs, ["req", "cmd", "read"]);
    assert_eq!(lines[1]["action"], "set_wave_state");
    assert_eq!(lines[2]["device"], "did-1");
}
