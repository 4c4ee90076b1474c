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

//! [Metadata Service] token source.
//!
//! Google Cloud environments such as [Google Compute Engine (GCE)][gce-link],
//! [Google Kubernetes Engine (GKE)][gke-link], or [Cloud Run] provide a metadata
//! service. This is a local service to the VM (or pod) which provides
//! metadata information about the VM. The service also provides access
//! tokens associated with the [default service account] for the corresponding
//! VM.
//!
//! The types in this module retrieve these access tokens, without having to
//! download secrets or other credentials.
//!
//! Example usage:
//!
//! ```no_run
//! # use google_cloud_token_source::credentials::mds::Builder;
//! # use google_cloud_token_source::token::TokenProvider;
//! # use std::time::Duration;
//! # tokio_test::block_on(async {
//! let source = Builder::default()
//!     .timeout(Duration::from_secs(5))
//!     .initialize()
//!     .await?;
//! let token = source.current_token();
//! # Ok::<(), google_cloud_token_source::errors::CredentialsError>(())
//! # });
//! ```
//!
//! [Cloud Run]: https://cloud.google.com/run
//! [default service account]: https://cloud.google.com/iam/docs/service-account-types#default
//! [gce-link]: https://cloud.google.com/products/compute
//! [gke-link]: https://cloud.google.com/kubernetes-engine
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::errors::CredentialsError;
use crate::mds::{Client, MDSTokenResponse};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use crate::{BuildResult, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Creates [MetadataTokenSource] instances.
///
/// The endpoint is resolved in this order:
/// * The `GCE_METADATA_HOST` environment variable, if set.
/// * The value set with [endpoint][Builder::endpoint].
/// * `http://metadata`.
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    scopes: Option<Vec<String>>,
    timeout: Option<Duration>,
}

impl Builder {
    /// Sets the endpoint for this token source.
    ///
    /// If not set, the token source uses `http://metadata`.
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the [scopes] for the access tokens.
    ///
    /// If no scopes are specified, the metadata service issues tokens with
    /// all the scopes configured for the [default service account] on the
    /// instance.
    ///
    /// [default service account]: https://cloud.google.com/iam/docs/service-account-types#default
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Sets the timeout for each request to the metadata service.
    ///
    /// Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns a [MetadataTokenSource] with the configured settings.
    ///
    /// The token source has no token until it is refreshed.
    pub fn build(self) -> BuildResult<MetadataTokenSource> {
        let client = Client::new(
            self.endpoint,
            self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        )?;
        Ok(MetadataTokenSource {
            client,
            scopes: self.scopes,
            cache: TokenCache::new(),
        })
    }

    /// Returns a [MetadataTokenSource] after refreshing its token once.
    ///
    /// Fails if the token source cannot be created, or if the first refresh
    /// fails.
    ///
    /// A failure to create the HTTP client is reported as a non-transient
    /// error where [is_network][CredentialsError::is_network] returns `true`,
    /// with the [build error][crate::build_errors::Error] as its source. Use
    /// [build][Builder::build] to tell the two failures apart.
    pub async fn initialize(self) -> Result<MetadataTokenSource> {
        let source = self.build().map_err(initialize_error)?;
        source.refresh().await?;
        Ok(source)
    }
}

fn initialize_error(e: crate::build_errors::Error) -> CredentialsError {
    CredentialsError::from_source(false, e)
}

/// A [TokenProvider] backed by the [Metadata Service].
///
/// Each call to [refresh][TokenProvider::refresh] fetches a new token and
/// awaits the response, bounded by the configured timeout. Concurrent
/// refreshes share a single request.
///
/// [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview
#[derive(Debug)]
pub struct MetadataTokenSource {
    client: Client,
    scopes: Option<Vec<String>>,
    cache: TokenCache<MDSTokenResponse>,
}

impl MetadataTokenSource {
    /// Returns a builder with the default settings.
    pub fn builder() -> Builder {
        Builder::default()
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenSource {
    fn current_token(&self) -> Option<Token> {
        self.cache.current_token()
    }

    async fn refresh(&self) -> Result<Token> {
        tracing::debug!(
            endpoint = self.client.endpoint(),
            "fetching access token from the metadata service"
        );
        let fetched = self
            .cache
            .refresh(|| self.client.access_token(self.scopes.as_deref()))
            .await?;
        tracing::debug!(
            token_type = fetched.response.token_type,
            expires_in = fetched.response.expires_in,
            "fetched access token from the metadata service"
        );
        Ok(fetched.token)
    }
}
