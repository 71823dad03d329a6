//! HTTP routes: outbound, callback, logout and the redirect script.

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rootcause::Report;
use serde::Deserialize;
use tracing::{error, warn};

use crate::Idm;
use crate::error::FlowError;
use crate::flow::{CallbackParams, NO_SAVED_STATE, OutboundRequest};
use crate::page::redirect_script;

/// Query parameters for the logout route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutQuery {
    pub back_to_path: Option<String>,
}

/// Starts a login and redirects to the identity provider.
pub async fn outbound(
    State(idm): State<Idm>,
    headers: HeaderMap,
    request: Result<Query<OutboundRequest>, QueryRejection>,
) -> Response {
    let request = match request {
        Ok(Query(request)) => request,
        Err(rejection) => {
            let report = Report::new(FlowError::InvalidRequest {
                reason: rejection.body_text(),
            });
            return failure(&idm, &report, &headers).await;
        }
    };
    match idm.flow().outbound_redirect_url(request).await {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(report) => failure(&idm, &report, &headers).await,
    }
}

/// Provider callback delivered in the query string.
pub async fn callback_get(
    State(idm): State<Idm>,
    headers: HeaderMap,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => callback(&idm, &headers, params).await,
        Err(rejection) => unreadable_callback(&idm, &rejection.body_text()),
    }
}

/// Provider callback delivered as a form post (`response_mode=form_post`).
pub async fn callback_post(
    State(idm): State<Idm>,
    headers: HeaderMap,
    params: Result<Form<CallbackParams>, FormRejection>,
) -> Response {
    match params {
        Ok(Form(params)) => callback(&idm, &headers, params).await,
        Err(rejection) => unreadable_callback(&idm, &rejection.body_text()),
    }
}

/// A callback whose parameters do not parse has no usable state.
fn unreadable_callback(idm: &Idm, reason: &str) -> Response {
    warn!(reason, "unreadable callback parameters");
    idm.flow()
        .disallowed(NO_SAVED_STATE, Some("callback parameters could not be read"))
}

async fn callback(idm: &Idm, headers: &HeaderMap, params: CallbackParams) -> Response {
    match idm.flow().handle_callback(headers, params).await {
        Ok(response) => response,
        Err(report) => failure(idm, &report, headers).await,
    }
}

/// Clears the session and redirects to `backToPath`.
pub async fn logout(
    State(idm): State<Idm>,
    headers: HeaderMap,
    query: Result<Query<LogoutQuery>, QueryRejection>,
) -> Response {
    let back_to_path = match query {
        Ok(Query(query)) => query.back_to_path,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "ignoring unreadable logout query");
            None
        }
    };
    match idm
        .flow()
        .logout(&headers, back_to_path.as_deref())
        .await
    {
        Ok(response) => response,
        Err(report) => failure(&idm, &report, &headers).await,
    }
}

/// Renders a route failure through the `on_error` hook, else a bare 500.
async fn failure(idm: &Idm, report: &Report<FlowError>, headers: &HeaderMap) -> Response {
    error!(error = %report, "authentication route failed");
    if let Some(hook) = &idm.hooks().on_error
        && let Some(response) = hook.on_error(report, headers).await
    {
        return response;
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

impl Idm {
    /// Router serving the broker's routes at their configured paths.
    ///
    /// Merge it into the host application's router.
    #[must_use]
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let config = self.config();
        let mut router = Router::new()
            .route(&config.outbound_path, get(outbound))
            .route(&config.redirect_uri, get(callback_get).post(callback_post))
            .route(
                &config.post_authentication_redirect_js_path,
                get(redirect_script),
            );
        if config.logout_enabled() {
            router = router.route(&config.logout_path, get(logout));
        }
        router.with_state(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{Hooks, OnError, PreLogout};
    use crate::testing::{self, SIGNIN};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use idm_core::StateToken;
    use idm_store::Lookup;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::MockServer;

    fn get_request(uri: &str, headers: Option<&HeaderMap>) -> Request<Body> {
        let mut request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        if let Some(headers) = headers {
            *request.headers_mut() = headers.clone();
        }
        request
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn outbound_then_expired_code_ends_on_disallowed_page() {
        let server = MockServer::start().await;
        testing::mount_discovery(&server, SIGNIN).await;
        testing::mount_token_error(
            &server,
            SIGNIN,
            "invalid_grant",
            "AADB2C90080: The provided grant has expired.",
        )
        .await;
        let idm = Idm::builder(testing::config(&server.uri()))
            .build()
            .expect("idm");
        let app: Router = idm.router();

        let url = idm
            .flow()
            .authentication_url(
                "/account",
                &OutboundRequest {
                    state: Some("S1".to_string()),
                    ..OutboundRequest::default()
                },
            )
            .expect("authentication url");
        let path_and_query = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        let response = app
            .clone()
            .oneshot(get_request(&path_and_query, None))
            .await
            .expect("outbound");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let provider = testing::location(&response);
        assert!(provider.starts_with(&server.uri()));
        assert_eq!(testing::query_of(&provider)["state"], "S1");

        let token: StateToken = "S1".parse().expect("token");
        let Lookup::Found(attempt) = idm.states().load(&token).await.expect("load") else {
            panic!("attempt stored under the hashed state");
        };
        assert_eq!(attempt.policy_name, SIGNIN);

        let response = app
            .oneshot(form_post("/login/return", "state=S1&code=expired-code"))
            .await
            .expect("callback");
        assert!(response.status().is_redirection());
        let location = testing::location(&response);
        assert_eq!(testing::path_of(&location), "/error");
        assert_eq!(testing::query_of(&location)["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn callback_with_unknown_state_redirects() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .build()
            .expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/login/return?state=nope&code=abc", None))
            .await
            .expect("callback");
        let location = testing::location(&response);
        assert_eq!(testing::path_of(&location), "/error");
        assert_eq!(
            testing::query_of(&location)["error"],
            crate::flow::NO_SAVED_STATE
        );
    }

    #[tokio::test]
    async fn malformed_callback_redirects_to_disallowed_page() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .build()
            .expect("idm");

        let response = idm
            .router::<()>()
            .oneshot(get_request("/login/return?state=a&state=b", None))
            .await
            .expect("callback");
        assert!(response.status().is_redirection());
        let location = testing::location(&response);
        assert_eq!(testing::path_of(&location), "/error");
        assert_eq!(testing::query_of(&location)["error"], NO_SAVED_STATE);

        let response = idm
            .router::<()>()
            .oneshot(form_post("/login/return", "state=a&state=b&code=c"))
            .await
            .expect("callback");
        assert!(response.status().is_redirection());
        assert_eq!(testing::path_of(&testing::location(&response)), "/error");
    }

    struct Rendered;

    #[async_trait]
    impl OnError for Rendered {
        async fn on_error(
            &self,
            error: &Report<FlowError>,
            _headers: &HeaderMap,
        ) -> Option<Response> {
            match error.current_context() {
                FlowError::InvalidRequest { .. } => {
                    Some((StatusCode::BAD_REQUEST, "Bad login link").into_response())
                }
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn malformed_outbound_goes_through_on_error() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .hooks(Hooks {
                on_error: Some(Arc::new(Rendered)),
                ..Hooks::default()
            })
            .build()
            .expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/login/out?state=a&state=b", None))
            .await
            .expect("outbound");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"Bad login link");
    }

    #[tokio::test]
    async fn discovery_failure_is_a_generic_error() {
        let server = MockServer::start().await;
        let idm = Idm::builder(testing::config(&server.uri()))
            .build()
            .expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/login/out?backToPath=/account", None))
            .await
            .expect("outbound");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct Unavailable;

    #[async_trait]
    impl OnError for Unavailable {
        async fn on_error(
            &self,
            error: &Report<FlowError>,
            _headers: &HeaderMap,
        ) -> Option<Response> {
            match error.current_context() {
                FlowError::ClientUnavailable { .. } => {
                    Some((StatusCode::SERVICE_UNAVAILABLE, "Login is unavailable").into_response())
                }
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn on_error_hook_renders_failures() {
        let server = MockServer::start().await;
        let idm = Idm::builder(testing::config(&server.uri()))
            .hooks(Hooks {
                on_error: Some(Arc::new(Unavailable)),
                ..Hooks::default()
            })
            .build()
            .expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/login/out", None))
            .await
            .expect("outbound");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn logout_route_clears_session() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .build()
            .expect("idm");
        let jar = idm
            .session()
            .store(
                idm.session().jar(&HeaderMap::new()),
                &testing::credential("user-1", 3600),
            )
            .await
            .expect("store");
        let headers = testing::request_cookies(&jar.into_response());

        let response = idm
            .router::<()>()
            .oneshot(get_request("/logout?backToPath=/bye", Some(&headers)))
            .await
            .expect("logout");
        assert_eq!(testing::location(&response), "/bye");
        let cleared = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("removal cookie");
        assert!(cleared.starts_with("idm="));
        assert!(!idm
            .session()
            .get_credentials(&headers)
            .await
            .expect("lookup")
            .is_found());
    }

    struct CustomLogout;

    #[async_trait]
    impl PreLogout for CustomLogout {
        async fn before_logout(&self, _headers: &HeaderMap) -> Option<Response> {
            Some("See you soon".into_response())
        }
    }

    #[tokio::test]
    async fn pre_logout_hook_short_circuits() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .hooks(Hooks {
                pre_logout: Some(Arc::new(CustomLogout)),
                ..Hooks::default()
            })
            .build()
            .expect("idm");
        let jar = idm
            .session()
            .store(
                idm.session().jar(&HeaderMap::new()),
                &testing::credential("user-1", 3600),
            )
            .await
            .expect("store");
        let headers = testing::request_cookies(&jar.into_response());

        let response = idm
            .router::<()>()
            .oneshot(get_request("/logout", Some(&headers)))
            .await
            .expect("logout");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(idm
            .session()
            .get_credentials(&headers)
            .await
            .expect("lookup")
            .is_found());
    }

    #[tokio::test]
    async fn logout_route_can_be_disabled() {
        let mut config = testing::config("https://idp.example.com");
        config.logout_path = String::new();
        let idm = Idm::builder(config).build().expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/logout", None))
            .await
            .expect("logout");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_redirect_script() {
        let idm = Idm::builder(testing::config("https://idp.example.com"))
            .build()
            .expect("idm");
        let response = idm
            .router::<()>()
            .oneshot(get_request("/idm/postAuthenticationRedirect.js", None))
            .await
            .expect("script");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.contains("javascript"));
    }
}
