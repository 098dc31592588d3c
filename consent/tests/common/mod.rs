//! Shared setup for the flow integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use composable_rust_consent::mocks::{
    MockClientRepository, MockClock, MockFlowStore, MockIdentityProvider,
};
use composable_rust_consent::providers::{Claims, IdTokenStrategy, JwtStrategy};
use composable_rust_consent::utils::query_param;
use composable_rust_consent::{
    AcceptConsentRequest, AcceptLoginRequest, AuthorizeParams, AuthorizeRequest, Client,
    ConsentResult, DefaultStrategy, FlowCipher, FlowConfig, FlowEnvironment, Outcome,
};
use cookie::CookieJar;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const ISSUER: &str = "https://auth.example.com/";
pub const CLIENT_ID: &str = "app";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";
pub const POST_LOGOUT_URI: &str = "https://rp.example.com/bye";
pub const CIPHER_KEY: [u8; 32] = [7u8; 32];

pub type Strategy = DefaultStrategy<
    MockFlowStore,
    MockClientRepository,
    JwtStrategy,
    MockClock,
    MockIdentityProvider,
>;

/// Strategy plus handles on its mocks.
pub struct Harness {
    pub strategy: Strategy,
    pub store: MockFlowStore,
    pub clients: MockClientRepository,
    pub clock: MockClock,
    pub identity: MockIdentityProvider,
    pub jwt: JwtStrategy,
    pub cipher: FlowCipher,
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

pub fn default_client() -> Client {
    Client::new(CLIENT_ID)
        .with_redirect_uri(REDIRECT_URI)
        .with_post_logout_redirect_uri(POST_LOGOUT_URI)
}

pub fn config() -> FlowConfig {
    FlowConfig::new(
        url(ISSUER),
        url("https://ui.example.com/login"),
        url("https://ui.example.com/consent"),
        url("https://ui.example.com/logout"),
    )
    .with_post_logout_redirect_url(url("https://ui.example.com/logged-out"))
    .with_pairwise_salt("pepper")
    .with_backchannel_timeout(std::time::Duration::from_secs(1))
}

pub fn harness() -> Harness {
    harness_with(config(), vec![default_client()])
}

/// Route engine logs to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub fn harness_with(config: FlowConfig, clients: Vec<Client>) -> Harness {
    init_tracing();
    let store = MockFlowStore::new();
    let repository = MockClientRepository::new();
    for client in clients {
        repository.insert(client);
    }
    let clock = MockClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let jwt = JwtStrategy::hs256(b"integration-test-secret");
    let cipher = FlowCipher::new(&CIPHER_KEY, &[]).unwrap();
    let identity = MockIdentityProvider::new();

    let env = FlowEnvironment::new(
        store.clone(),
        repository.clone(),
        jwt.clone(),
        clock.clone(),
        identity.clone(),
    );
    let strategy = DefaultStrategy::new(config, cipher.clone(), env).unwrap();

    Harness {
        strategy,
        store,
        clients: repository,
        clock,
        identity,
        jwt,
        cipher,
    }
}

/// The cookies a browser sends on its next request.
pub fn next_request(jar: &CookieJar) -> CookieJar {
    let mut next = CookieJar::new();
    for cookie in jar.iter() {
        next.add_original(cookie.clone().into_owned());
    }
    next
}

/// Move the browser on to its next request.
pub fn browse(jar: &mut CookieJar) {
    *jar = next_request(jar);
}

pub fn param(redirect: &str, name: &str) -> String {
    query_param(redirect, name).unwrap_or_else(|| panic!("{name} missing from {redirect}"))
}

pub fn authorize(client: &Client, query: &str) -> AuthorizeRequest {
    AuthorizeRequest::new(
        client.clone(),
        url(REDIRECT_URI),
        format!("{ISSUER}oauth2/auth?client_id={}&{query}", client.client_id),
    )
    .with_scope(["openid"])
    .with_params(AuthorizeParams::from_query(query).unwrap())
}

/// The same authorization request, resumed with the parameters of a UI redirect.
pub fn resume(request: &AuthorizeRequest, redirect_to: &str) -> AuthorizeRequest {
    let query = url(redirect_to).query().unwrap_or_default().to_string();
    request
        .clone()
        .with_params(AuthorizeParams::from_query(&query).unwrap())
}

pub fn expect_redirect<T: std::fmt::Debug>(outcome: Outcome<T>) -> String {
    match outcome {
        Outcome::Redirect(url) => url,
        Outcome::Continue(value) => panic!("expected redirect, got {value:?}"),
    }
}

pub fn accept_as(subject: &str, remember: bool) -> AcceptLoginRequest {
    AcceptLoginRequest {
        subject: subject.to_string(),
        remember,
        ..AcceptLoginRequest::default()
    }
}

pub fn grant(scope: &[&str], remember: bool) -> AcceptConsentRequest {
    AcceptConsentRequest {
        grant_scope: scope.iter().map(ToString::to_string).collect(),
        remember,
        ..AcceptConsentRequest::default()
    }
}

/// Start a flow and accept the login; returns the request resumed with the
/// login verifier.
pub async fn login(
    h: &Harness,
    jar: &mut CookieJar,
    request: &AuthorizeRequest,
    accept: AcceptLoginRequest,
) -> AuthorizeRequest {
    browse(jar);
    let login_ui = expect_redirect(
        h.strategy
            .handle_authorization_request(jar, request)
            .await
            .unwrap(),
    );
    let challenge = param(&login_ui, "login_challenge");
    let accepted = h
        .strategy
        .accept_login_request(&challenge, accept)
        .await
        .unwrap();
    resume(request, &accepted.redirect_to)
}

/// Redeem a login verifier and accept the consent; returns the request
/// resumed with the consent verifier.
pub async fn consent(
    h: &Harness,
    jar: &mut CookieJar,
    request: &AuthorizeRequest,
    accept: AcceptConsentRequest,
) -> AuthorizeRequest {
    browse(jar);
    let consent_ui = expect_redirect(
        h.strategy
            .handle_authorization_request(jar, request)
            .await
            .unwrap(),
    );
    let challenge = param(&consent_ui, "consent_challenge");
    let accepted = h
        .strategy
        .accept_consent_request(&challenge, accept)
        .await
        .unwrap();
    resume(request, &accepted.redirect_to)
}

/// Run a complete login and consent.
pub async fn authorize_fully(
    h: &Harness,
    jar: &mut CookieJar,
    request: &AuthorizeRequest,
    login_as: AcceptLoginRequest,
    granted: AcceptConsentRequest,
) -> ConsentResult {
    let with_login = login(h, jar, request, login_as).await;
    let with_consent = consent(h, jar, &with_login, granted).await;
    browse(jar);
    match h
        .strategy
        .handle_authorization_request(jar, &with_consent)
        .await
        .unwrap()
    {
        Outcome::Continue(result) => result,
        Outcome::Redirect(url) => panic!("expected consent result, got redirect to {url}"),
    }
}

/// Sign an ID token hint with the harness key.
pub fn id_token(h: &Harness, claims: Value) -> String {
    let Value::Object(claims) = claims else {
        panic!("claims must be an object");
    };
    let claims: Claims = claims;
    h.jwt.sign(&claims).unwrap()
}
