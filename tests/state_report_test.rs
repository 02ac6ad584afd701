// End-to-end proactive reporting: account linking through AcceptGrant,
// then backend state changes pushed to the event gateway.

use alexa_bridge::alexa::SmartHome;
use alexa_bridge::auth::{LwaTokenProvider, TokenProvider};
use alexa_bridge::config::{AuthSettings, AuthStore, SmartHomeConfig, SmartHomeSettings};
use alexa_bridge::state::StateStore;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn lwa_mock(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/auth/o2/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "authorization_code".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"Atza|granted","refresh_token":"Atzr|granted","expires_in":3600}"#)
        .create_async()
        .await
}

fn create_bridge(server: &ServerGuard) -> (Arc<StateStore>, SmartHome) {
    let store = Arc::new(StateStore::new());
    store.set_state("switch.porch", "off", json!({}));

    let auth = AuthSettings {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        token_url: format!("{}/auth/o2/token", server.url()),
        refresh_token: None,
    };
    let settings = SmartHomeSettings {
        endpoint: Some(format!("{}/v3/events", server.url())),
        ..Default::default()
    };

    let tokens: Arc<dyn TokenProvider> = Arc::new(LwaTokenProvider::new(&auth));

    let config = Arc::new(SmartHomeConfig::new(
        settings,
        store.clone(),
        Some(tokens),
        AuthStore::in_memory(),
    ));
    (store, SmartHome::new(config))
}

fn accept_grant() -> serde_json::Value {
    json!({
        "directive": {
            "header": {
                "namespace": "Alexa.Authorization",
                "name": "AcceptGrant",
                "messageId": "msg-grant",
                "payloadVersion": "3",
            },
            "payload": {
                "grant": {"type": "OAuth2.AuthorizationCode", "code": "grant-code"},
                "grantee": {"type": "BearerToken", "token": "access"},
            },
        }
    })
}

/// Poll until the mock has seen its expected requests
async fn wait_for(mock: &Mock) {
    for _ in 0..100 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_accept_grant_enables_change_reports() {
    let mut server = Server::new_async().await;
    let lwa = lwa_mock(&mut server).await;
    let gateway = server
        .mock("POST", "/v3/events")
        .match_header("authorization", "Bearer Atza|granted")
        .match_body(Matcher::PartialJson(json!({
            "event": {
                "header": {"namespace": "Alexa", "name": "ChangeReport"},
                "endpoint": {"endpointId": "switch#porch"},
            },
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let (store, smart_home) = create_bridge(&server);
    assert!(!smart_home.config().is_reporting_states());

    let response = smart_home.handle_message(&accept_grant()).await.unwrap();
    assert_eq!(response["event"]["header"]["name"], "AcceptGrant.Response");
    assert_eq!(response["event"]["header"]["namespace"], "Alexa.Authorization");
    lwa.assert_async().await;

    assert!(smart_home.config().authorized());
    assert!(smart_home.config().is_reporting_states());

    store.set_state("switch.porch", "on", json!({}));
    wait_for(&gateway).await;

    smart_home.config().disable_proactive_mode().await;
}

#[tokio::test]
async fn test_no_reports_before_linking() {
    let mut server = Server::new_async().await;
    let gateway = server
        .mock("POST", "/v3/events")
        .with_status(202)
        .expect(0)
        .create_async()
        .await;

    let (store, smart_home) = create_bridge(&server);
    store.set_state("switch.porch", "on", json!({}));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!smart_home.config().is_reporting_states());
    gateway.assert_async().await;
}
