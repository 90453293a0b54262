use super::*;
use crate::config::OAuthConfig;
use crate::credentials::MemoryStore;
use crate::oauth::test_support::{mock_config, token_manager};
use mockito::{Matcher, Mock, Server, ServerGuard};

struct Harness {
    flow: AuthorizationFlow,
    tokens: Arc<TokenManager>,
    states: StateManager,
}

fn harness(config: &OAuthConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let tokens = Arc::new(token_manager(config, store.clone()));
    let states = StateManager::load(store, 600).unwrap();
    Harness {
        flow: AuthorizationFlow::new(tokens.clone(), states.clone()),
        tokens,
        states,
    }
}

async fn mock_exchange(server: &mut ServerGuard, status: usize, body: &str, hits: usize) -> Mock {
    server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "abc".into()),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
    CallbackParams {
        code: code.map(str::to_string),
        state: state.map(str::to_string),
        ..CallbackParams::default()
    }
}

#[tokio::test]
async fn test_authorize_then_callback() {
    let mut server = Server::new_async().await;
    let mock = mock_exchange(
        &mut server,
        200,
        r#"{"access_token": "AT1", "refresh_token": "RT1", "expires_in": 3600}"#,
        1,
    )
    .await;
    let h = harness(&mock_config(&server.url()));

    assert_eq!(h.flow.status().await, FlowStatus::Idle);

    let request = h.flow.begin_authorization().await.unwrap();
    assert!(request.auth_url.contains(&format!("state={}", request.state)));
    assert!(request.auth_url.starts_with(&format!("{}/auth?", server.url())));
    assert_eq!(h.flow.status().await, FlowStatus::AwaitingCallback);

    let grant = h
        .flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap();
    assert_eq!(grant.access_token, "AT1");
    assert_eq!(h.flow.status().await, FlowStatus::Complete);

    let info = h.tokens.token_info().await;
    assert!(!info.is_expired);
    assert!(info.has_refresh_token);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_state_makes_no_exchange() {
    let mut server = Server::new_async().await;
    let mock = mock_exchange(&mut server, 200, r#"{"access_token": "AT1"}"#, 0).await;
    let h = harness(&mock_config(&server.url()));

    let err = h
        .flow
        .handle_callback(callback(Some("abc"), Some("unknown")))
        .await
        .unwrap_err();

    assert!(matches!(err, OAuthError::Callback(CallbackError::InvalidState)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_state_is_invalid() {
    let server = Server::new_async().await;
    let h = harness(&mock_config(&server.url()));

    let err = h.flow.handle_callback(callback(Some("abc"), None)).await.unwrap_err();
    assert!(matches!(err, OAuthError::Callback(CallbackError::InvalidState)));
}

#[tokio::test]
async fn test_state_not_reusable_after_success() {
    let mut server = Server::new_async().await;
    let _mock = mock_exchange(
        &mut server,
        200,
        r#"{"access_token": "AT1", "refresh_token": "RT1", "expires_in": 3600}"#,
        1,
    )
    .await;
    let h = harness(&mock_config(&server.url()));

    let request = h.flow.begin_authorization().await.unwrap();
    h.flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap();

    let err = h
        .flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::Callback(CallbackError::InvalidState)));
}

#[tokio::test]
async fn test_state_not_reusable_after_exchange_failure() {
    let mut server = Server::new_async().await;
    let mock = mock_exchange(
        &mut server,
        400,
        r#"{"error": "invalid_grant", "error_description": "Malformed auth code."}"#,
        1,
    )
    .await;
    let h = harness(&mock_config(&server.url()));

    let request = h.flow.begin_authorization().await.unwrap();

    match h
        .flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
    {
        Err(OAuthError::Callback(CallbackError::ExchangeFailed(e))) => {
            assert_eq!(e.code, "invalid_grant")
        }
        other => panic!("expected exchange failure, got {:?}", other),
    }
    assert_eq!(h.flow.status().await, FlowStatus::Failed);
    assert!(!h.tokens.token_info().await.has_access_token);

    let err = h
        .flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::Callback(CallbackError::InvalidState)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_client_is_distinguished() {
    let mut server = Server::new_async().await;
    let _mock = mock_exchange(
        &mut server,
        401,
        r#"{"error": "invalid_client", "error_description": "Unauthorized"}"#,
        1,
    )
    .await;
    let h = harness(&mock_config(&server.url()));

    let request = h.flow.begin_authorization().await.unwrap();
    let err = h
        .flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OAuthError::Callback(CallbackError::InvalidClient(_))
    ));
}

#[tokio::test]
async fn test_provider_denial() {
    let server = Server::new_async().await;
    let h = harness(&mock_config(&server.url()));
    let request = h.flow.begin_authorization().await.unwrap();

    let params = CallbackParams {
        state: Some(request.state.clone()),
        error: Some("access_denied".to_string()),
        error_description: Some("User cancelled".to_string()),
        ..CallbackParams::default()
    };

    match h.flow.handle_callback(params).await {
        Err(OAuthError::Callback(CallbackError::ProviderDenied(reason))) => {
            assert!(reason.contains("access_denied"))
        }
        other => panic!("expected provider denial, got {:?}", other),
    }
    assert_eq!(h.flow.status().await, FlowStatus::Failed);
}

#[tokio::test]
async fn test_missing_code_still_consumes_state() {
    let mut server = Server::new_async().await;
    let mock = mock_exchange(&mut server, 200, r#"{"access_token": "AT1"}"#, 0).await;
    let h = harness(&mock_config(&server.url()));

    let request = h.flow.begin_authorization().await.unwrap();
    let err = h
        .flow
        .handle_callback(callback(None, Some(&request.state)))
        .await
        .unwrap_err();

    assert!(matches!(err, OAuthError::Callback(CallbackError::MissingCode)));
    assert_eq!(h.states.count().await, 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_begin_requires_client_id() {
    let server = Server::new_async().await;
    let mut config = mock_config(&server.url());
    config.client_id = None;
    let h = harness(&config);

    assert!(matches!(
        h.flow.begin_authorization().await,
        Err(OAuthError::Config(_))
    ));
    assert_eq!(h.states.count().await, 0);
    assert_eq!(h.flow.status().await, FlowStatus::Idle);
}

#[tokio::test]
async fn test_exchange_without_refresh_token_keeps_existing() {
    let mut server = Server::new_async().await;
    let _mock = mock_exchange(
        &mut server,
        200,
        r#"{"access_token": "AT2", "expires_in": 3600}"#,
        1,
    )
    .await;
    let h = harness(&mock_config(&server.url()));
    h.tokens
        .store_tokens("AT1".to_string(), Some("RT1".to_string()), 3600, None)
        .await
        .unwrap();

    let request = h.flow.begin_authorization().await.unwrap();
    h.flow
        .handle_callback(callback(Some("abc"), Some(&request.state)))
        .await
        .unwrap();

    assert!(h.tokens.token_info().await.has_refresh_token);
}

#[test]
fn test_callback_params_deserialization() {
    // Success case
    let query = "code=auth_code_123&state=csrf_state_456";
    let params: CallbackParams = serde_urlencoded::from_str(query).unwrap();
    assert_eq!(params.code, Some("auth_code_123".to_string()));
    assert_eq!(params.state, Some("csrf_state_456".to_string()));
    assert_eq!(params.error, None);

    // Error case
    let query = "error=access_denied&error_description=User+cancelled";
    let params: CallbackParams = serde_urlencoded::from_str(query).unwrap();
    assert_eq!(params.error, Some("access_denied".to_string()));
    assert_eq!(params.error_description, Some("User cancelled".to_string()));
    assert_eq!(params.code, None);
}
