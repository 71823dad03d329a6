//! Authorization gate: extractors and middleware that admit only requests
//! carrying a stored credential.

use axum::extract::{FromRef, FromRequestParts, OriginalUri, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use idm_identity::Credential;
use idm_store::Lookup;
use tracing::{debug, error};

use crate::Idm;

/// Extractor for requiring an authenticated user.
///
/// Unauthenticated requests are redirected to the disallowed page, or
/// into a login for the requested path when `login_on_disallow` is set.
/// With `reject_expired_sessions`, an expired credential is treated as
/// no credential.
pub struct RequireCredentials(pub Credential);

impl<S> FromRequestParts<S> for RequireCredentials
where
    Idm: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(credential) = parts.extensions.get::<Credential>() {
            return Ok(Self(credential.clone()));
        }

        let idm = Idm::from_ref(state);
        let requested = requested_path(parts.extensions.get::<OriginalUri>(), &parts.uri);
        match admit(&idm, &parts.headers).await? {
            Some(credential) => Ok(Self(credential)),
            None => Err(denied(&idm, &requested)),
        }
    }
}

/// Extractor for optionally getting the authenticated user.
///
/// Only a failing credential store rejects the request.
pub struct OptionalCredentials(pub Option<Credential>);

impl<S> FromRequestParts<S> for OptionalCredentials
where
    Idm: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(credential) = parts.extensions.get::<Credential>() {
            return Ok(Self(Some(credential.clone())));
        }
        let idm = Idm::from_ref(state);
        Ok(Self(admit(&idm, &parts.headers).await?))
    }
}

/// Middleware guarding every route of a router.
///
/// Use with [`axum::middleware::from_fn_with_state`]. The admitted
/// credential is placed in the request extensions, where
/// [`RequireCredentials`] and `Extension<Credential>` pick it up.
pub async fn require_credentials(
    State(idm): State<Idm>,
    mut request: Request,
    next: Next,
) -> Response {
    let requested = requested_path(request.extensions().get::<OriginalUri>(), request.uri());
    match admit(&idm, request.headers()).await {
        Ok(Some(credential)) => {
            request.extensions_mut().insert(credential);
            next.run(request).await
        }
        Ok(None) => denied(&idm, &requested).into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Rejection for the gate extractors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    /// Not logged in; send the browser here.
    Redirect(String),
    /// The credential store could not be read.
    Unavailable,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(to) => Redirect::to(&to).into_response(),
            Self::Unavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// The credential this request may proceed with, if any.
async fn admit(idm: &Idm, headers: &HeaderMap) -> Result<Option<Credential>, GateRejection> {
    match idm.session().get_credentials(headers).await {
        Ok(Lookup::Found(credential)) => {
            if idm.config().reject_expired_sessions && credential.is_expired() {
                debug!("rejecting expired session");
                return Ok(None);
            }
            Ok(Some(credential))
        }
        Ok(Lookup::NotFound) => Ok(None),
        Err(report) => {
            error!(error = %report, "credential lookup failed");
            Err(GateRejection::Unavailable)
        }
    }
}

fn denied(idm: &Idm, requested: &str) -> GateRejection {
    match idm.flow().denied_redirect(requested) {
        Ok(to) => GateRejection::Redirect(to),
        Err(report) => {
            error!(error = %report, "failed to build login redirect");
            GateRejection::Unavailable
        }
    }
}

fn requested_path(original: Option<&OriginalUri>, uri: &Uri) -> String {
    let uri = original.map_or(uri, |original| &original.0);
    uri.path_and_query()
        .map_or_else(|| "/".to_string(), |path| path.as_str().to_string())
}
