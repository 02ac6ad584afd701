use super::*;
use crate::auth::{AccessToken, TokenProvider};
use crate::config::{AuthStore, SmartHomeSettings};
use crate::state::StateStore;
use async_trait::async_trait;
use mockito::{Matcher, Server};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out "token-1", "token-2", ... one per refresh
#[derive(Default)]
struct CountingTokens {
    issued: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn refresh(&self) -> Result<AccessToken, TokenError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("token-{}", n), 3600))
    }

    async fn accept_grant(&self, _code: &str) -> Result<AccessToken, TokenError> {
        self.refresh().await
    }
}

fn setup(
    endpoint: String,
    tokens: Option<Arc<dyn TokenProvider>>,
) -> (Arc<StateStore>, Arc<SmartHomeConfig>) {
    let store = Arc::new(StateStore::new());
    let settings = SmartHomeSettings {
        endpoint: Some(endpoint),
        ..Default::default()
    };
    let auth = AuthStore::in_memory();
    auth.set_authorized(true);

    let config = Arc::new(SmartHomeConfig::new(settings, store.clone(), tokens, auth));
    (store, config)
}

fn counting_tokens() -> Option<Arc<dyn TokenProvider>> {
    Some(Arc::new(CountingTokens::default()))
}

const INVALID_TOKEN_BODY: &str =
    r#"{"payload":{"code":"INVALID_ACCESS_TOKEN_EXCEPTION","description":"expired"}}"#;

#[test]
fn test_doorbell_pressed() {
    let on = Entity::new("binary_sensor.door", "on", json!({}));
    let off = Entity::new("binary_sensor.door", "off", json!({}));
    assert!(doorbell_pressed(Some(&off), &on));
    assert!(doorbell_pressed(None, &on));
    assert!(!doorbell_pressed(Some(&on), &on));
    assert!(!doorbell_pressed(Some(&on), &off));

    let fired = Entity::new("event.door", "2026-01-01T10:00:00.000+00:00", json!({}));
    let fired_again = Entity::new("event.door", "2026-01-01T10:05:00.000+00:00", json!({}));
    let unavailable = Entity::new("event.door", "unavailable", json!({}));
    assert!(doorbell_pressed(Some(&fired), &fired_again));
    assert!(!doorbell_pressed(Some(&fired), &fired));
    assert!(!doorbell_pressed(Some(&fired), &unavailable));
}

#[tokio::test]
async fn test_change_report_sent_once_for_identical_state() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_header("authorization", "Bearer token-1")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa", "name": "ChangeReport"},
                "endpoint": {"endpointId": "switch#test"},
                "payload": {"change": {"cause": {"type": "APP_INTERACTION"}}},
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);
    store.set_state("switch.test", "off", json!({}));

    let first = store.set_state("switch.test", "on", json!({}));
    reporter.handle_state_change(&first).await;
    let repeat = store.set_state("switch.test", "on", json!({}));
    reporter.handle_state_change(&repeat).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_changed_properties_are_reported_again() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(202)
        .expect(2)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);
    store.set_state("switch.test", "off", json!({}));

    let on = store.set_state("switch.test", "on", json!({}));
    reporter.handle_state_change(&on).await;
    let off = store.set_state("switch.test", "off", json!({}));
    reporter.handle_state_change(&off).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_token_retried_once() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("POST", "/events")
        .match_header("authorization", "Bearer token-1")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(INVALID_TOKEN_BODY)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("POST", "/events")
        .match_header("authorization", "Bearer token-2")
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(Arc::clone(&config));
    store.set_state("switch.test", "off", json!({}));

    let change = store.set_state("switch.test", "on", json!({}));
    reporter.handle_state_change(&change).await;

    rejected.assert_async().await;
    accepted.assert_async().await;
    assert!(config.authorized());
}

#[tokio::test]
async fn test_invalid_token_twice_gives_up() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(INVALID_TOKEN_BODY)
        .expect(2)
        .create_async()
        .await;

    let (_store, config) = setup(format!("{}/events", server.url()), counting_tokens());

    let result = send_change_report(&config, "switch#test", vec![]).await;
    assert!(matches!(result, Err(ReportError::Rejected { status: 403, .. })));

    mock.assert_async().await;
    assert!(!config.authorized());
}

#[tokio::test]
async fn test_other_rejections_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"payload":{"code":"INVALID_REQUEST_EXCEPTION","description":"bad"}}"#)
        .expect(1)
        .create_async()
        .await;

    let (_store, config) = setup(format!("{}/events", server.url()), counting_tokens());

    let err = send_change_report(&config, "switch#test", vec![])
        .await
        .unwrap_err();
    match err {
        ReportError::Rejected { code, .. } => assert_eq!(code, "INVALID_REQUEST_EXCEPTION"),
        other => panic!("unexpected error {:?}", other),
    }

    mock.assert_async().await;
    assert!(config.authorized());
}

#[tokio::test]
async fn test_missing_token_revokes_authorization() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .with_status(202)
        .expect(0)
        .create_async()
        .await;

    let (_store, config) = setup(format!("{}/events", server.url()), None);

    let err = send_change_report(&config, "switch#test", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Token(TokenError::NoTokenAvailable)));

    mock.assert_async().await;
    assert!(!config.authorized());
}

#[tokio::test]
async fn test_doorbell_press_event() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa.DoorbellEventSource", "name": "DoorbellPress"},
                "endpoint": {"endpointId": "event#front_door"},
                "payload": {"cause": {"type": "PHYSICAL_INTERACTION"}},
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);

    let attributes = json!({"device_class": "doorbell"});
    store.set_state("event.front_door", "2026-01-01T10:00:00.000+00:00", attributes.clone());
    let press = store.set_state("event.front_door", "2026-01-01T10:01:00.000+00:00", attributes);
    reporter.handle_state_change(&press).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unexposed_and_unsupported_entities_are_ignored() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .expect(0)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);

    let hidden = store.set_state("group.all_locks", "on", json!({}));
    reporter.handle_state_change(&hidden).await;
    let unsupported = store.set_state("weather.home", "sunny", json!({}));
    reporter.handle_state_change(&unsupported).await;

    store.set_state("switch.test", "on", json!({}));
    store.stop();
    let stopping = store.set_state("switch.test", "off", json!({}));
    reporter.handle_state_change(&stopping).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_report_skips_unsupported_domains() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa.Discovery", "name": "DeleteReport"},
                "payload": {
                    "endpoints": [{"endpointId": "light#kitchen"}],
                    "scope": {"type": "BearerToken", "token": "token-1"},
                },
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (_store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let ids = vec!["weather.home".to_string(), "light.kitchen".to_string()];
    async_send_delete_message(&config, &ids).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_add_or_update_report_serializes_discovery() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa.Discovery", "name": "AddOrUpdateReport"},
                "payload": {"endpoints": [{"endpointId": "switch#test"}]},
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    store.set_state("switch.test", "on", json!({}));

    let ids = vec![
        "weather.home".to_string(),
        "switch.missing".to_string(),
        "switch.test".to_string(),
    ];
    async_send_add_or_update_message(&config, &ids).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_error_is_not_retried() {
    // Gateway that hangs up on every connection without answering
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });

    let (_store, config) = setup(format!("http://{}/events", addr), counting_tokens());

    let err = send_change_report(&config, "switch#test", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Http(_)));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(config.authorized());
}

#[tokio::test]
async fn test_new_entity_is_announced_before_its_state() {
    let mut server = Server::new_async().await;
    let announced = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa.Discovery", "name": "AddOrUpdateReport"},
                "payload": {"endpoints": [{"endpointId": "switch#new"}]},
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let reported = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {"header": {"namespace": "Alexa", "name": "ChangeReport"}}
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);

    let added = store.set_state("switch.new", "on", json!({}));
    assert!(added.old_state.is_none());
    reporter.handle_state_change(&added).await;
    let changed = store.set_state("switch.new", "off", json!({}));
    reporter.handle_state_change(&changed).await;

    announced.assert_async().await;
    reported.assert_async().await;
}

#[tokio::test]
async fn test_removed_entity_is_deleted() {
    let mut server = Server::new_async().await;
    let deleted = server
        .mock("POST", "/events")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa.Discovery", "name": "DeleteReport"},
                "payload": {"endpoints": [{"endpointId": "light#kitchen"}]},
            }
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, config) = setup(format!("{}/events", server.url()), counting_tokens());
    let reporter = StateReporter::new(config);
    let removal = |entity_id: &str| StateChange {
        entity_id: entity_id.to_string(),
        old_state: store.remove(entity_id),
        new_state: None,
        timestamp: chrono::Utc::now(),
    };

    store.set_state("light.kitchen", "on", json!({}));
    store.set_state("weather.home", "sunny", json!({}));
    reporter.handle_state_change(&removal("light.kitchen")).await;
    // Unsupported domains have nothing to delete
    reporter.handle_state_change(&removal("weather.home")).await;

    deleted.assert_async().await;
}
