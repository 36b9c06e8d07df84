//! HTTP backend client against a mock server.

use std::sync::Arc;
use std::time::Duration;

use tether_core::{Error, EventBus, RecordId, Reminder, ReminderWire, Session, SyncState};
use tether_crypto::Keypair;
use tether_store::{KeyStore, MemoryStore, SessionStore};
use tether_sync::{HttpRemoteStore, RemoteStore, SyncEngine, SyncRecord};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> HttpRemoteStore<ReminderWire> {
    HttpRemoteStore::new(server.uri(), "reminders", Duration::from_secs(2)).unwrap()
}

fn sealed(task: &str, id: Option<&str>) -> ReminderWire {
    let keypair = Keypair::generate().unwrap();
    let mut wire = Reminder::new(task, "Corner shop", 51.5, -0.12, 100)
        .seal(&keypair)
        .unwrap();
    wire.id = id.map(String::from);
    wire
}

#[tokio::test]
async fn test_list_sends_bearer_token() {
    let server = MockServer::start().await;
    let records = vec![sealed("a", Some("r-1")), sealed("b", Some("r-2"))];

    Mock::given(method("GET"))
        .and(path("/reminders"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&records))
        .expect(1)
        .mount(&server)
        .await;

    let listed = client(&server).list(TOKEN).await.unwrap();
    assert_eq!(listed, records);
}

#[tokio::test]
async fn test_create_returns_assigned_id() {
    let server = MockServer::start().await;
    let wire = sealed("new", None);
    let mut created = wire.clone();
    created.id = Some("r-42".to_string());

    Mock::given(method("POST"))
        .and(path("/reminders"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({ "task": wire.task.clone() })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&created))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).create(TOKEN, &wire).await.unwrap();
    assert_eq!(response.id.as_deref(), Some("r-42"));
}

#[tokio::test]
async fn test_update_and_delete_use_record_path() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/reminders/r-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/reminders/r-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let remote = client(&server);
    remote
        .update(TOKEN, "r-7", &sealed("edit", Some("r-7")))
        .await
        .unwrap();
    remote.delete(TOKEN, "r-7").await.unwrap();
}

#[tokio::test]
async fn test_delete_of_missing_record_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(client(&server).delete(TOKEN, "gone").await.is_ok());
}

#[tokio::test]
async fn test_update_of_missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/reminders/r-gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .update(TOKEN, "r-gone", &sealed("edit", Some("r-gone")))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_record_id_is_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/reminders/a%2Fb%3Fc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete(TOKEN, "a/b?c").await.unwrap();
}

#[tokio::test]
async fn test_401_maps_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server).list("expired").await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_server_error_maps_to_remote_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    match client(&server).list(TOKEN).await {
        Err(Error::RemoteSync(msg)) => assert!(msg.contains("500")),
        other => panic!("expected RemoteSync, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_maps_to_remote_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client(&server).list(TOKEN).await;
    assert!(matches!(result, Err(Error::RemoteSync(_))));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(Vec::<ReminderWire>::new())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let remote: HttpRemoteStore<ReminderWire> =
        HttpRemoteStore::new(server.uri(), "reminders", Duration::from_millis(200)).unwrap();
    match remote.list(TOKEN).await {
        Err(Error::RemoteSync(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_engine_create_succeeds_locally_when_backend_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let secure = Arc::new(MemoryStore::new());
    let keys = KeyStore::new(secure.clone());
    let sessions = SessionStore::new(secure);
    sessions
        .save(&Session {
            user_id: "u".to_string(),
            token: TOKEN.to_string(),
        })
        .await
        .unwrap();

    let engine: SyncEngine<Reminder> = SyncEngine::new(
        Arc::new(MemoryStore::new()),
        keys,
        sessions,
        Arc::new(client(&server)),
        EventBus::default(),
    );

    let created = engine
        .create(Reminder::new("Call mum", "Home", 0.0, 0.0, 75))
        .await
        .unwrap();
    assert!(matches!(created.id, RecordId::Local(_)));
    assert_eq!(created.sync_state, SyncState::LocalOnly);
    assert_eq!(engine.records().await.len(), 1);
}
