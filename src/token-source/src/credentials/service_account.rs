// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [Service Account] token source.
//!
//! A service account key file contains an RSA private key. The token source
//! signs a short-lived [JWT] with this key and exchanges it for an access
//! token at the `token_uri` listed in the key file, using the [JWT-bearer
//! grant].
//!
//! Service account keys are secrets. Prefer the [metadata service] when the
//! workload runs on Google Cloud.
//!
//! Example usage:
//!
//! ```no_run
//! # use google_cloud_token_source::credentials::service_account::Builder;
//! # tokio_test::block_on(async {
//! let source = Builder::new("/path/to/key.json").build()?;
//! let handle = source.fetch_token(|result| match result {
//!     Ok(token) => println!("token expires in {}s", token.expires_in),
//!     Err(e) => println!("cannot fetch token: {e}"),
//! });
//! handle.await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
//! [JWT-bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523
//! [metadata service]: crate::credentials::mds
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-overview

mod jws;
mod key_file;
mod signing_key;

pub use key_file::ServiceAccountKey;

use crate::build_errors::Error as BuilderError;
use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCOPE, GOOGLE_APPLICATION_CREDENTIALS_VAR,
    JWT_BEARER_GRANT_TYPE,
};
use crate::errors::{self, CredentialsError};
use crate::token::{Token, TokenProvider};
use crate::token_cache::{Fetched, TokenCache, TokenResponse};
use crate::{BuildResult, Result};
use async_trait::async_trait;
use jws::JwsClaims;
use signing_key::RsaSigner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The token endpoint response.
///
/// [fetch_token][ServiceAccountTokenSource::fetch_token] delivers these
/// values exactly as the token endpoint returned them.
#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServiceAccountToken {
    /// The access token.
    pub access_token: String,
    /// The lifetime of the token, in seconds.
    pub expires_in: u64,
    /// The type of token, typically `"Bearer"`.
    pub token_type: String,
}

impl std::fmt::Debug for ServiceAccountToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountToken")
            .field("access_token", &"[censored]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl TokenResponse for ServiceAccountToken {
    fn to_token(&self, received_at: Instant) -> Token {
        Token {
            token: self.access_token.clone(),
            token_type: Some(self.token_type.clone()),
            // An expiration past the range of `Instant` is treated as none.
            expires_at: received_at.checked_add(Duration::from_secs(self.expires_in)),
        }
    }
}

#[derive(Debug)]
enum KeySource {
    File(PathBuf),
    Key(Box<ServiceAccountKey>),
}

/// Creates [ServiceAccountTokenSource] instances.
#[derive(Debug)]
pub struct Builder {
    key_source: KeySource,
    scope: Option<String>,
    timeout: Option<Duration>,
}

impl Builder {
    /// Uses the service account key file at `path`.
    ///
    /// The file is read by [build][Builder::build].
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_source(KeySource::File(path.into()))
    }

    /// Uses the key file named by the `GOOGLE_APPLICATION_CREDENTIALS`
    /// environment variable.
    pub fn from_env() -> BuildResult<Self> {
        let path = std::env::var_os(GOOGLE_APPLICATION_CREDENTIALS_VAR).ok_or_else(|| {
            BuilderError::loading(format!(
                "the {GOOGLE_APPLICATION_CREDENTIALS_VAR} environment variable is not set"
            ))
        })?;
        Ok(Self::new(path))
    }

    /// Uses a service account key obtained by other means, for example,
    /// from a secret manager.
    ///
    /// [build][Builder::build] fails if any field of `key` is blank, or if
    /// `key_type` is not `"service_account"`.
    pub fn from_key(key: ServiceAccountKey) -> Self {
        Self::with_source(KeySource::Key(Box::new(key)))
    }

    fn with_source(key_source: KeySource) -> Self {
        Self {
            key_source,
            scope: None,
            timeout: None,
        }
    }

    /// Sets the [scopes] requested in the assertion.
    ///
    /// Defaults to `https://www.googleapis.com/auth/cloud-platform`.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes = scopes.into_iter().map(|s| s.into()).collect::<Vec<_>>();
        self.scope = Some(scopes.join(" "));
        self
    }

    /// Sets the timeout for each request to the token endpoint.
    ///
    /// Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns a [ServiceAccountTokenSource] with the configured settings.
    ///
    /// Fails if the key file cannot be read or parsed, if the key has blank
    /// fields, or if its private key cannot be used for RS256 signatures. The token source has no token
    /// until the first fetch completes.
    pub fn build(self) -> BuildResult<ServiceAccountTokenSource> {
        let key = match self.key_source {
            KeySource::File(path) => ServiceAccountKey::from_file(path)?,
            KeySource::Key(key) => {
                key.validate()?;
                *key
            }
        };
        let signer = RsaSigner::from_pem(&key.private_key)?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()
            .map_err(BuilderError::client)?;
        let inner = Inner {
            key,
            signer,
            scope: self.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            client,
            cache: TokenCache::new(),
        };
        Ok(ServiceAccountTokenSource {
            inner: Arc::new(inner),
        })
    }
}

/// A [TokenProvider] that exchanges signed assertions for access tokens.
///
/// Cloning the token source is cheap, clones share the current token.
#[derive(Clone, Debug)]
pub struct ServiceAccountTokenSource {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    key: ServiceAccountKey,
    signer: RsaSigner,
    scope: String,
    client: reqwest::Client,
    cache: TokenCache<ServiceAccountToken>,
}

impl ServiceAccountTokenSource {
    /// The service account key used by this token source.
    pub fn key(&self) -> &ServiceAccountKey {
        &self.inner.key
    }

    /// Starts fetching a new token and returns immediately.
    ///
    /// `callback` runs exactly once, on a Tokio worker, with the token
    /// endpoint response or the error that prevented obtaining it. On success
    /// the response also becomes the current token. On failure the current
    /// token, if any, is unchanged.
    ///
    /// The returned handle completes after `callback` returns. Dropping it
    /// does not cancel the fetch.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn fetch_token<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<ServiceAccountToken>) + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner.fetch().await.map(|fetched| fetched.response);
            callback(result);
        })
    }
}

impl Inner {
    async fn fetch(&self) -> Result<Fetched<ServiceAccountToken>> {
        tracing::debug!(
            token_uri = self.key.token_uri,
            client_email = self.key.client_email,
            "fetching access token for service account"
        );
        let fetched = self.cache.refresh(|| self.exchange()).await?;
        tracing::debug!(
            token_type = fetched.response.token_type,
            expires_in = fetched.response.expires_in,
            "fetched access token for service account"
        );
        Ok(fetched)
    }

    async fn exchange(&self) -> Result<ServiceAccountToken> {
        let claims = JwsClaims::new(&self.key, &self.scope, OffsetDateTime::now_utc());
        let assertion = jws::assertion(&claims, &self.signer)?;

        let error_message = "failed to exchange the service account assertion";
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;

        if !response.status().is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }

        let token = response
            .json::<ServiceAccountToken>()
            .await
            .map_err(|e| {
                if e.is_decode() {
                    errors::from_decode_error(e, error_message)
                } else {
                    errors::from_http_error(e, error_message)
                }
            })?;

        if token.access_token.is_empty() {
            return Err(CredentialsError::from_msg(
                false,
                format!("{error_message}, the response has an empty `access_token`"),
            ));
        }
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenSource {
    fn current_token(&self) -> Option<Token> {
        self.inner.cache.current_token()
    }

    async fn refresh(&self) -> Result<Token> {
        self.inner.fetch().await.map(|fetched| fetched.token)
    }
}
