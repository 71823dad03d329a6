//! Shared fixtures for the crate's tests: a mock identity provider,
//! unsigned test tokens and cookie replay.

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;
use axum_extra::extract::cookie::Key;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use idm_identity::{Claims, Credential, IdmConfig, TokenSet};
use serde_json::{Value, json};
use std::collections::HashMap;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::oidc::ProviderMetadata;

pub const CLIENT_ID: &str = "client-123";
pub const SIGNIN: &str = "b2c_1_signin";
pub const RESET: &str = "b2c_1_reset";
pub const SERVICE_ID: &str = "service-1";
pub const COOKIE_PASSWORD: &str = "an-example-cookie-password-of-48-characters!!!!!";

pub fn config(identity_app_url: &str) -> IdmConfig {
    let mut config = IdmConfig::new(
        identity_app_url,
        CLIENT_ID,
        "client-secret",
        "https://app.example.com",
        COOKIE_PASSWORD,
    );
    config.tenant_id = "tenant".to_string();
    config.service_id = SERVICE_ID.to_string();
    config.default_policy = Some(SIGNIN.to_string());
    config.reset_password_policy = RESET.to_string();
    config.is_secure = false;
    config
}

pub fn key() -> Key {
    Key::derive_from(COOKIE_PASSWORD.as_bytes())
}

pub fn metadata(base: &str, policy: &str) -> ProviderMetadata {
    serde_json::from_value(discovery_document(base, policy)).expect("metadata")
}

fn discovery_document(base: &str, policy: &str) -> Value {
    json!({
        "issuer": format!("{base}/issuer/"),
        "authorization_endpoint": format!("{base}/authorize?p={policy}"),
        "token_endpoint": format!("{base}/token?p={policy}"),
        "end_session_endpoint": format!("{base}/logout?p={policy}"),
        "jwks_uri": format!("{base}/keys?p={policy}"),
    })
}

pub fn unsigned_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

pub fn id_token(sub: &str, policy: &str, nonce: Option<&str>) -> String {
    let mut claims = json!({
        "sub": sub,
        "aud": CLIENT_ID,
        "exp": Utc::now().timestamp() + 3600,
        "tfp": policy,
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = json!(nonce);
    }
    unsigned_jwt(&claims)
}

pub fn credential(sub: &str, expires_in: i64) -> Credential {
    Credential::new(
        TokenSet {
            id_token: "header.payload.signature".to_string(),
            access_token: "access-token".to_string(),
            refresh_token: Some("rt-1".to_string()),
            token_type: "bearer".to_string(),
            expires_at: None,
        },
        Claims {
            sub: Some(sub.to_string()),
            aud: Some(idm_identity::Audience::One(CLIENT_ID.to_string())),
            exp: Some(Utc::now().timestamp() + expires_in),
            tfp: Some(SIGNIN.to_string()),
            ..Claims::default()
        },
    )
}

pub async fn mount_discovery(server: &MockServer, policy: &str) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .and(query_param("p", policy))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(discovery_document(&server.uri(), policy)),
        )
        .mount(server)
        .await;
}

pub async fn mount_discovery_expecting(server: &MockServer, policy: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .and(query_param("p", policy))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(discovery_document(&server.uri(), policy)),
        )
        .expect(calls)
        .mount(server)
        .await;
}

/// Token endpoint for `policy` answering requests whose form body
/// contains `body_fragment`.
pub async fn mount_token(
    server: &MockServer,
    policy: &str,
    body_fragment: &str,
    response: ResponseTemplate,
) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(query_param("p", policy))
        .and(body_string_contains(body_fragment))
        .respond_with(response)
        .mount(server)
        .await;
}

pub fn token_response(id_token: &str, refresh_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "access-token",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": refresh_token,
        "id_token": id_token,
    }))
}

pub fn token_error(error: &str, description: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": error,
        "error_description": description,
    }))
}

pub async fn mount_token_success(
    server: &MockServer,
    policy: &str,
    id_token: &str,
    refresh_token: &str,
) {
    mount_token(
        server,
        policy,
        "grant_type=authorization_code",
        token_response(id_token, refresh_token),
    )
    .await;
}

pub async fn mount_token_error(server: &MockServer, policy: &str, error: &str, description: &str) {
    mount_token(
        server,
        policy,
        "grant_type=authorization_code",
        token_error(error, description),
    )
    .await;
}

/// Turns a response's `Set-Cookie` headers into a request `Cookie` header.
pub fn request_cookies(response: &Response) -> HeaderMap {
    let pairs: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::to_string)
        .collect();

    let mut headers = HeaderMap::new();
    if !pairs.is_empty() {
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&pairs.join("; ")).expect("cookie header"),
        );
    }
    headers
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

fn absolute(location: &str) -> Url {
    let base = Url::parse("https://app.example.com").expect("base");
    base.join(location).expect("url")
}

/// Query parameters of an absolute or path-only URL.
pub fn query_of(location: &str) -> HashMap<String, String> {
    absolute(location).query_pairs().into_owned().collect()
}

pub fn path_of(location: &str) -> String {
    absolute(location).path().to_string()
}
