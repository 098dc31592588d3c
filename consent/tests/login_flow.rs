//! Integration tests for the authentication half of the authorization flow.

mod common;

use chrono::Duration;
use common::*;
use composable_rust_consent::constants::cookies;
use composable_rust_consent::csrf::CsrfGuard;
use composable_rust_consent::flow::HandledLoginRequest;
use composable_rust_consent::providers::{Clock, FlowStore};
use composable_rust_consent::{
    AcceptLoginRequest, Flow, FlowError, Outcome, Purpose, RequestDeniedError,
};
use cookie::CookieJar;
use serde_json::json;

fn login_csrf_cookie() -> String {
    CsrfGuard::cookie_name(cookies::LOGIN_CSRF, &default_client())
}

/// Start a flow and return the login challenge.
async fn start(h: &Harness, jar: &mut CookieJar, query: &str) -> String {
    browse(jar);
    let request = authorize(&default_client(), query);
    let login_ui = expect_redirect(
        h.strategy
            .handle_authorization_request(jar, &request)
            .await
            .unwrap(),
    );
    assert!(login_ui.starts_with("https://ui.example.com/login?login_challenge="));
    param(&login_ui, "login_challenge")
}

/// Log alice in and remember her in the browser.
async fn remembered_login(h: &Harness, jar: &mut CookieJar) -> String {
    let result = authorize_fully(
        h,
        jar,
        &authorize(&default_client(), ""),
        accept_as("alice", true),
        grant(&["openid"], false),
    )
    .await;
    result.login_session_id
}

#[tokio::test]
async fn test_first_visit_forces_authentication() {
    let h = harness();
    let mut jar = CookieJar::new();

    let challenge = start(&h, &mut jar, "ui_locales=de%20en&login_hint=alice%40example.com").await;

    let login = h.strategy.get_login_request(&challenge).await.unwrap();
    assert!(!login.skip);
    assert!(login.subject.is_empty());
    assert_eq!(login.client.client_id, CLIENT_ID);
    assert_eq!(login.oidc_context.ui_locales, vec!["de", "en"]);
    assert_eq!(login.oidc_context.login_hint, "alice@example.com");
    assert!(jar.get(&login_csrf_cookie()).is_some());
    assert_eq!(h.strategy.metrics().snapshot().login_forwarded, 1);
}

#[tokio::test]
async fn test_prompt_none_without_session_is_login_required() {
    let h = harness();
    let mut jar = CookieJar::new();

    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &authorize(&default_client(), "prompt=none"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::LoginRequired { .. }));
    assert_eq!(err.error_code(), "login_required");
}

#[tokio::test]
async fn test_remembered_session_skips_login() {
    let h = harness();
    let mut jar = CookieJar::new();
    let session_id = remembered_login(&h, &mut jar).await;

    let challenge = start(&h, &mut jar, "").await;
    let login = h.strategy.get_login_request(&challenge).await.unwrap();

    assert!(login.skip);
    assert_eq!(login.subject, "alice");
    assert_eq!(login.session_id, session_id);
    assert_eq!(h.strategy.metrics().snapshot().login_skipped, 1);
}

#[tokio::test]
async fn test_prompt_login_ignores_session() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;

    let challenge = start(&h, &mut jar, "prompt=login").await;
    let login = h.strategy.get_login_request(&challenge).await.unwrap();

    assert!(!login.skip);
}

#[tokio::test]
async fn test_prompt_none_with_session_proceeds() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;

    let challenge = start(&h, &mut jar, "prompt=none").await;
    assert!(h.strategy.get_login_request(&challenge).await.unwrap().skip);
}

#[tokio::test]
async fn test_max_age_exceeded() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;
    h.clock.advance(Duration::minutes(10));

    let challenge = start(&h, &mut jar, "max_age=60").await;
    assert!(!h.strategy.get_login_request(&challenge).await.unwrap().skip);

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(
            &mut jar,
            &authorize(&default_client(), "max_age=60&prompt=none"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::LoginRequired { .. }));

    let challenge = start(&h, &mut jar, "max_age=3600").await;
    assert!(h.strategy.get_login_request(&challenge).await.unwrap().skip);
}

#[tokio::test]
async fn test_unbounded_max_age_keeps_session() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;
    h.clock.advance(Duration::days(365));

    let challenge = start(&h, &mut jar, "max_age=9223372036854775807").await;
    assert!(h.strategy.get_login_request(&challenge).await.unwrap().skip);
}

#[tokio::test]
async fn test_malformed_max_age_is_invalid_request() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &authorize(&default_client(), "max_age=soon"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_id_token_hint_subject_must_match_session() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;

    let alice = id_token(&h, json!({"iss": ISSUER, "sub": "alice", "exp": 1}));
    let challenge = start(&h, &mut jar, &format!("id_token_hint={alice}")).await;
    let login = h.strategy.get_login_request(&challenge).await.unwrap();
    assert!(login.skip);
    assert_eq!(
        login.oidc_context.id_token_hint_claims.unwrap()["sub"],
        json!("alice")
    );

    browse(&mut jar);
    let bob = id_token(&h, json!({"iss": ISSUER, "sub": "bob"}));
    let err = h
        .strategy
        .handle_authorization_request(
            &mut jar,
            &authorize(&default_client(), &format!("id_token_hint={bob}")),
        )
        .await
        .unwrap_err();
    assert_eq!(err, FlowError::HintSubjectMismatch);
    assert_eq!(err.error_code(), "login_required");
}

#[tokio::test]
async fn test_unverifiable_id_token_hint_is_rejected() {
    let h = harness();
    let mut jar = CookieJar::new();

    let err = h
        .strategy
        .handle_authorization_request(
            &mut jar,
            &authorize(&default_client(), "id_token_hint=not.a.jwt"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_login_verifier_is_single_use() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(&h, &mut jar, &request, accept_as("alice", true)).await;

    browse(&mut jar);
    let first = h
        .strategy
        .handle_authorization_request(&mut jar, &with_verifier)
        .await
        .unwrap();
    assert!(first.redirect_url().unwrap().starts_with("https://ui.example.com/consent"));

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &with_verifier)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FlowError::access_denied("The login verifier has already been used.")
    );
    assert_eq!(h.strategy.metrics().snapshot().login_rejected, 1);
}

#[tokio::test]
async fn test_concurrent_redemption_has_one_winner() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(&h, &mut jar, &request, accept_as("alice", false)).await;
    browse(&mut jar);
    let mut first_jar = next_request(&jar);
    let mut second_jar = next_request(&jar);

    let (first, second) = tokio::join!(
        h.strategy.handle_authorization_request(&mut first_jar, &with_verifier),
        h.strategy.handle_authorization_request(&mut second_jar, &with_verifier),
    );

    assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);
}

#[tokio::test]
async fn test_garbage_verifier_is_access_denied() {
    let h = harness();
    let mut jar = CookieJar::new();

    let err = h
        .strategy
        .handle_authorization_request(
            &mut jar,
            &authorize(&default_client(), "login_verifier=bm90LWEtdG9rZW4"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "access_denied");
}

#[tokio::test]
async fn test_device_verifier_is_rejected() {
    let h = harness();
    let mut jar = CookieJar::new();

    let err = h
        .strategy
        .handle_authorization_request(
            &mut jar,
            &authorize(&default_client(), "device_verifier=abc&login_verifier=def"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidRequest { .. }));
    assert!(err.to_string().contains("device_verifier"));
    assert_eq!(jar.iter().count(), 0);
}

#[tokio::test]
async fn test_verifier_from_another_client_is_rejected() {
    let mut other = default_client();
    other.client_id = "other".to_string();
    let h = harness_with(config(), vec![default_client(), other.clone()]);
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(&h, &mut jar, &request, accept_as("alice", true)).await;

    browse(&mut jar);
    let stolen = resume(
        &authorize(&other, ""),
        &format!(
            "https://auth.example.com/oauth2/auth?login_verifier={}",
            with_verifier.params.login_verifier
        ),
    );
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &stolen)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "access_denied");
}

#[tokio::test]
async fn test_missing_csrf_cookie_is_forbidden() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(&h, &mut jar, &request, accept_as("alice", true)).await;

    let mut other_browser = CookieJar::new();
    let err = h
        .strategy
        .handle_authorization_request(&mut other_browser, &with_verifier)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Forbidden { .. }));
    assert_eq!(err.status_code(), 403);
    assert_eq!(h.strategy.metrics().snapshot().csrf_rejected, 1);
}

#[tokio::test]
async fn test_expired_login_request() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(&h, &mut jar, &request, accept_as("alice", true)).await;
    h.clock.advance(Duration::minutes(31));

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &with_verifier)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::RequestUnauthorized { .. }));
}

#[tokio::test]
async fn test_rejected_login_is_reported() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let challenge = start(&h, &mut jar, "").await;

    let redirect = h
        .strategy
        .reject_login_request(
            &challenge,
            RequestDeniedError::new("", "The user cancelled.").with_hint("cancelled"),
        )
        .await
        .unwrap();

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &resume(&request, &redirect.redirect_to))
        .await
        .unwrap_err();
    let FlowError::Denied(denied) = err else {
        panic!("expected denial, got {err:?}");
    };
    assert_eq!(denied.error, "access_denied");
    assert_eq!(denied.description, "The user cancelled.");
    assert_eq!(denied.status_code, 400);
}

#[tokio::test]
async fn test_accept_rejects_empty_subject() {
    let h = harness();
    let mut jar = CookieJar::new();
    let challenge = start(&h, &mut jar, "").await;

    let err = h
        .strategy
        .accept_login_request(&challenge, accept_as("", true))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_accept_rejects_out_of_range_remember_for() {
    let h = harness();
    let mut jar = CookieJar::new();
    let challenge = start(&h, &mut jar, "").await;

    for remember_for in [i64::MAX, -1] {
        let err = h
            .strategy
            .accept_login_request(
                &challenge,
                AcceptLoginRequest {
                    remember_for,
                    ..accept_as("alice", true)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidRequest { .. }));
    }

    let login = h.strategy.get_login_request(&challenge).await.unwrap();
    assert!(login.subject.is_empty());
}

#[tokio::test]
async fn test_unknown_challenge_is_not_found() {
    let h = harness();
    assert_eq!(
        h.strategy.get_login_request("bogus").await.unwrap_err(),
        FlowError::NotFound
    );
}

#[tokio::test]
async fn test_redeemed_challenge_is_already_used() {
    let h = harness();
    let mut jar = CookieJar::new();
    let challenge = start(&h, &mut jar, "").await;
    let accepted = h
        .strategy
        .accept_login_request(&challenge, accept_as("alice", true))
        .await
        .unwrap();

    browse(&mut jar);
    let request = resume(&authorize(&default_client(), ""), &accepted.redirect_to);
    h.strategy
        .handle_authorization_request(&mut jar, &request)
        .await
        .unwrap();

    assert_eq!(
        h.strategy.get_login_request(&challenge).await.unwrap_err(),
        FlowError::AlreadyUsed
    );
}

#[tokio::test]
async fn test_unremembered_login_sets_no_cookie() {
    let h = harness();
    let mut jar = CookieJar::new();
    authorize_fully(
        &h,
        &mut jar,
        &authorize(&default_client(), ""),
        accept_as("alice", false),
        grant(&["openid"], false),
    )
    .await;

    assert!(jar.get(cookies::AUTHENTICATION_SESSION).is_none());
    let challenge = start(&h, &mut jar, "").await;
    assert!(!h.strategy.get_login_request(&challenge).await.unwrap().skip);
}

#[tokio::test]
async fn test_skipped_login_must_keep_subject() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;
    let challenge = start(&h, &mut jar, "").await;

    let err = h
        .strategy
        .accept_login_request(&challenge, accept_as("mallory", true))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_skipped_login_is_always_remembered() {
    let h = harness();
    let mut jar = CookieJar::new();
    let session_id = remembered_login(&h, &mut jar).await;

    let result = authorize_fully(
        &h,
        &mut jar,
        &authorize(&default_client(), ""),
        accept_as("alice", false),
        grant(&["openid"], false),
    )
    .await;

    assert_eq!(result.login_session_id, session_id);
    assert_eq!(jar.get(cookies::AUTHENTICATION_SESSION).unwrap().value(), session_id);
}

/// Handle the stored flow behind `challenge` directly, bypassing the request
/// API's checks, and return the request resumed with its verifier.
async fn forge_handled_login(
    h: &Harness,
    challenge: &str,
    handled: HandledLoginRequest,
) -> composable_rust_consent::AuthorizeRequest {
    let token = Flow::from_token(&h.cipher, challenge, Purpose::LoginChallenge).unwrap();
    let mut flow = h.store.get_login_request(&token.id).await.unwrap();
    flow.handle_login_request(handled).unwrap();
    h.store.handle_login_request(&flow).await.unwrap();

    let verifier = flow.to_token(&h.cipher, Purpose::LoginVerifier).unwrap();
    resume(
        &authorize(&default_client(), ""),
        &format!("https://auth.example.com/oauth2/auth?login_verifier={verifier}"),
    )
}

#[tokio::test]
async fn test_forgetting_a_skipped_login_is_a_server_error() {
    let h = harness();
    let mut jar = CookieJar::new();
    remembered_login(&h, &mut jar).await;
    let challenge = start(&h, &mut jar, "").await;

    let request = forge_handled_login(
        &h,
        &challenge,
        HandledLoginRequest {
            subject: "alice".to_string(),
            remember: false,
            authenticated_at: Some(h.clock.now()),
            ..HandledLoginRequest::default()
        },
    )
    .await;

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::ServerError { .. }));
}

#[tokio::test]
async fn test_skipped_login_with_other_subject_revokes_session() {
    let h = harness();
    let mut jar = CookieJar::new();
    let session_id = remembered_login(&h, &mut jar).await;
    let challenge = start(&h, &mut jar, "").await;

    let request = forge_handled_login(
        &h,
        &challenge,
        HandledLoginRequest {
            subject: "mallory".to_string(),
            remember: true,
            authenticated_at: Some(h.clock.now()),
            ..HandledLoginRequest::default()
        },
    )
    .await;

    browse(&mut jar);
    let err = h
        .strategy
        .handle_authorization_request(&mut jar, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::ServerError { .. }));
    assert!(h.store.login_session(&session_id).is_none());
    assert!(jar.get(cookies::AUTHENTICATION_SESSION).is_none());
}

#[tokio::test]
async fn test_login_session_is_recorded() {
    let h = harness();
    let mut jar = CookieJar::new();
    let request = authorize(&default_client(), "");
    let with_verifier = login(
        &h,
        &mut jar,
        &request,
        composable_rust_consent::AcceptLoginRequest {
            identity_provider_session_id: "idp-session".to_string(),
            remember_for: 3600,
            ..accept_as("alice", true)
        },
    )
    .await;

    browse(&mut jar);
    let outcome = h
        .strategy
        .handle_authorization_request(&mut jar, &with_verifier)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Redirect(_)));

    let cookie = jar.get(cookies::AUTHENTICATION_SESSION).unwrap();
    assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(3600)));
    let session = h.store.login_session(cookie.value()).unwrap();
    assert_eq!(session.subject, "alice");
    assert!(session.remember);
    assert_eq!(session.identity_provider_session_id, "idp-session");
    assert_eq!(h.strategy.metrics().snapshot().login_verified, 1);
}
