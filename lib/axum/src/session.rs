//! Read side of the session: which credential belongs to a request.
//!
//! The session cookie is signed and carries only `{"sub": <subject>}`.
//! Token material lives in the [`CredentialStore`].

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use idm_core::SubjectId;
use idm_identity::{Claims, Credential, IdmConfig};
use idm_store::{Lookup, StoreError};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use time::Duration as TimeDuration;
use tracing::{debug, info};

use crate::error::FlowError;
use crate::stores::CredentialStore;

#[derive(Debug, Serialize, Deserialize)]
struct SessionCookie {
    sub: SubjectId,
}

/// Resolves the current user's credential from the signed session cookie.
#[derive(Clone)]
pub struct SessionAccessor {
    credentials: CredentialStore,
    key: Key,
    cookie_name: String,
    is_secure: bool,
    max_age: TimeDuration,
}

impl SessionAccessor {
    #[must_use]
    pub fn new(config: &IdmConfig, key: Key, credentials: CredentialStore) -> Self {
        Self {
            credentials,
            key,
            cookie_name: config.cookie_name.clone(),
            is_secure: config.is_secure,
            max_age: TimeDuration::seconds(
                i64::try_from(config.cache_ttl_secs).unwrap_or(i64::MAX),
            ),
        }
    }

    /// Signed cookie jar for the request carrying `headers`.
    #[must_use]
    pub fn jar(&self, headers: &HeaderMap) -> SignedCookieJar {
        SignedCookieJar::from_headers(headers, self.key.clone())
    }

    /// Subject named by a correctly signed session cookie.
    #[must_use]
    pub fn subject(&self, jar: &SignedCookieJar) -> Option<SubjectId> {
        let cookie = jar.get(&self.cookie_name)?;
        match serde_json::from_str::<SessionCookie>(cookie.value()) {
            Ok(session) => Some(session.sub),
            Err(e) => {
                debug!(error = %e, "ignoring unreadable session cookie");
                None
            }
        }
    }

    /// The stored credential for this request's session.
    ///
    /// `NotFound` covers both "no session cookie" and "cookie but nothing
    /// stored". A found credential may be expired; check
    /// [`Credential::is_expired`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the credential store fails.
    pub async fn get_credentials(
        &self,
        headers: &HeaderMap,
    ) -> Result<Lookup<Credential>, Report<StoreError>> {
        match self.subject(&self.jar(headers)) {
            Some(subject) => self.credentials.get(&subject).await,
            None => Ok(Lookup::NotFound),
        }
    }

    /// Claims of the stored credential, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if the credential store fails.
    pub async fn get_claims(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<Claims>, Report<StoreError>> {
        Ok(self
            .get_credentials(headers)
            .await?
            .found()
            .map(|credential| credential.claims))
    }

    /// Persists `credential` and points the session cookie at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential has no subject or the store
    /// write fails.
    pub async fn store(
        &self,
        jar: SignedCookieJar,
        credential: &Credential,
    ) -> Result<SignedCookieJar, Report<FlowError>> {
        let subject = credential.subject().ok_or(FlowError::MissingSubject)?;
        self.credentials
            .put(&subject, credential)
            .await
            .map_err(|report| report.context(FlowError::Store))?;

        let cookie = SessionCookie {
            sub: subject.clone(),
        };
        let value = serde_json::to_string(&cookie).map_err(|e| FlowError::Configuration {
            reason: format!("failed to encode session cookie: {e}"),
        })?;
        info!(subject = %subject, "stored credential");
        Ok(jar.add(
            Cookie::build((self.cookie_name.clone(), value))
                .path("/")
                .http_only(true)
                .secure(self.is_secure)
                .same_site(SameSite::Lax)
                .max_age(self.max_age),
        ))
    }

    /// Drops the stored credential for this session and removes the cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn clear(
        &self,
        jar: SignedCookieJar,
    ) -> Result<SignedCookieJar, Report<StoreError>> {
        if let Some(subject) = self.subject(&jar) {
            self.credentials.remove(&subject).await?;
            info!(subject = %subject, "cleared credential");
        }
        Ok(jar.remove(Cookie::build((self.cookie_name.clone(), "")).path("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::http::header;
    use axum::response::IntoResponse;
    use idm_store::{MemoryStore, Store};
    use std::sync::Arc;

    fn accessor() -> SessionAccessor {
        let config = testing::config("https://idp.example.com");
        let backend: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new(backend, "idm", config.cache_ttl());
        SessionAccessor::new(&config, testing::key(), credentials)
    }

    #[tokio::test]
    async fn no_cookie_means_not_found() {
        let accessor = accessor();
        let lookup = accessor
            .get_credentials(&HeaderMap::new())
            .await
            .expect("lookup");
        assert_eq!(lookup, Lookup::NotFound);
        let claims = accessor
            .get_claims(&HeaderMap::new())
            .await
            .expect("claims");
        assert!(claims.is_none());
    }

    #[tokio::test]
    async fn stored_credential_is_found_through_cookie() {
        let accessor = accessor();
        let credential = testing::credential("user-1", 3600);

        let jar = accessor
            .store(accessor.jar(&HeaderMap::new()), &credential)
            .await
            .expect("store");
        let headers = testing::request_cookies(&jar.into_response());

        let found = accessor.get_credentials(&headers).await.expect("lookup");
        assert_eq!(found, Lookup::Found(credential));
    }

    #[tokio::test]
    async fn found_but_expired_is_still_returned() {
        let accessor = accessor();
        let credential = testing::credential("user-1", -10);
        let jar = accessor
            .store(accessor.jar(&HeaderMap::new()), &credential)
            .await
            .expect("store");
        let headers = testing::request_cookies(&jar.into_response());

        let found = accessor
            .get_credentials(&headers)
            .await
            .expect("lookup")
            .found()
            .expect("found");
        assert!(found.is_expired());
    }

    #[tokio::test]
    async fn forged_cookie_is_ignored() {
        let accessor = accessor();
        let credential = testing::credential("user-1", 3600);
        accessor
            .store(accessor.jar(&HeaderMap::new()), &credential)
            .await
            .expect("store");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            r#"idm={"sub":"user-1"}"#.parse().expect("header"),
        );
        let lookup = accessor.get_credentials(&headers).await.expect("lookup");
        assert_eq!(lookup, Lookup::NotFound);
    }

    #[tokio::test]
    async fn clear_removes_credential() {
        let accessor = accessor();
        let credential = testing::credential("user-1", 3600);
        let jar = accessor
            .store(accessor.jar(&HeaderMap::new()), &credential)
            .await
            .expect("store");
        let headers = testing::request_cookies(&jar.into_response());

        accessor.clear(accessor.jar(&headers)).await.expect("clear");
        assert_eq!(
            accessor.get_credentials(&headers).await.expect("lookup"),
            Lookup::NotFound
        );
    }

    #[tokio::test]
    async fn credential_without_subject_is_rejected() {
        let accessor = accessor();
        let mut credential = testing::credential("user-1", 3600);
        credential.claims.sub = None;
        let Err(err) = accessor
            .store(accessor.jar(&HeaderMap::new()), &credential)
            .await
        else {
            panic!("stored a credential without a subject");
        };
        assert_eq!(err.current_context(), &FlowError::MissingSubject);
    }
}
