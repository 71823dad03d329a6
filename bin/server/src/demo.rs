//! Demo pages exercising the gate, claims, roles and refresh.

use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use axum::{Router, middleware};
use idm_axum::{
    Idm, OptionalCredentials, OutboundRequest, RefreshError, RequireCredentials,
    require_credentials,
};
use idm_identity::Credential;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};

/// Demo routes with the broker's own routes merged in.
pub fn router(idm: Idm) -> Router {
    let private = Router::new()
        .route("/account-private", get(account_private))
        .route_layer(middleware::from_fn_with_state(
            idm.clone(),
            require_credentials,
        ));

    Router::new()
        .route("/", get(home))
        .route("/account", get(account))
        .route("/refresh", get(refresh))
        .route("/error", get(disallowed))
        .merge(private)
        .merge(idm.router())
        .with_state(idm)
}

async fn home(
    State(idm): State<Idm>,
    OptionalCredentials(credential): OptionalCredentials,
) -> Response {
    match credential.and_then(|credential| credential.subject()) {
        Some(subject) => format!("Signed in as {subject}.").into_response(),
        None => match idm
            .flow()
            .authentication_url("/account", &OutboundRequest::default())
        {
            Ok(url) => format!("Not signed in. Log in at {url}").into_response(),
            Err(report) => {
                error!(error = %report, "failed to build login link");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

fn describe(credential: &Credential) -> Value {
    let roles = match credential.claims.role_set() {
        Ok(roles) => json!(roles),
        Err(report) => {
            warn!(error = %report, "stored roles are malformed");
            Value::Null
        }
    };
    json!({
        "subject": credential.subject().map(|s| s.to_string()),
        "expired": credential.is_expired(),
        "claims": credential.claims,
        "roles": roles,
    })
}

async fn account(RequireCredentials(credential): RequireCredentials) -> Json<Value> {
    Json(describe(&credential))
}

async fn account_private(Extension(credential): Extension<Credential>) -> Json<Value> {
    Json(describe(&credential))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshQuery {
    contact_id: Option<String>,
}

async fn refresh(
    State(idm): State<Idm>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    match idm
        .refresher()
        .refresh_token(&headers, query.contact_id.as_deref())
        .await
    {
        Ok((jar, outcome)) => (jar, Json(describe(outcome.credential()))).into_response(),
        Err(report) => match report.current_context() {
            RefreshError::NotAuthenticated
            | RefreshError::MissingRefreshToken
            | RefreshError::Rejected => {
                warn!(error = %report, "refresh failed; sending user to log in again");
                let request = OutboundRequest {
                    force_login: true,
                    ..OutboundRequest::default()
                };
                match idm.flow().authentication_url("/account", &request) {
                    Ok(url) => Redirect::to(url.as_str()).into_response(),
                    Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                }
            }
            _ => {
                error!(error = %report, "refresh failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

#[derive(Debug, Default, Deserialize)]
struct DisallowedQuery {
    #[serde(rename = "notLoggedInErr")]
    not_logged_in: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn disallowed(Query(query): Query<DisallowedQuery>) -> (StatusCode, String) {
    if query.not_logged_in.is_some() {
        return (StatusCode::UNAUTHORIZED, "You need to log in first.".to_string());
    }
    let mut message = format!(
        "Login failed: {}",
        query.error.as_deref().unwrap_or("unknown error")
    );
    if let Some(description) = query.error_description {
        message.push_str(&format!(" ({description})"));
    }
    (StatusCode::FORBIDDEN, message)
}
