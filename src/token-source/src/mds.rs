// Copyright 2026 Google LLC
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

use crate::build_errors::Error as BuilderError;
use crate::constants::GCE_METADATA_HOST_ENV_VAR;
use crate::errors::{self, CredentialsError};
use crate::token::Token;
use crate::token_cache::TokenResponse;
use crate::{BuildResult, Result};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use std::time::Duration;
use tokio::time::Instant;

pub(crate) const MDS_DEFAULT_URI: &str = "/computeMetadata/v1/instance/service-accounts/default";
const METADATA_ROOT: &str = "http://metadata";
const METADATA_FLAVOR: &str = "metadata-flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// A client for the GCP Compute Engine Metadata Service (MDS).
#[derive(Clone, Debug)]
pub(crate) struct Client {
    endpoint: String,
    inner: ReqwestClient,
}

/// The token response from the metadata service.
///
/// Only `access_token` is required. Older metadata service emulators omit
/// the other fields.
#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub(crate) struct MDSTokenResponse {
    pub(crate) access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) token_type: Option<String>,
}

impl std::fmt::Debug for MDSTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MDSTokenResponse")
            .field("access_token", &"[censored]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl TokenResponse for MDSTokenResponse {
    fn to_token(&self, received_at: Instant) -> Token {
        Token {
            token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            // An expiration past the range of `Instant` is treated as none.
            expires_at: self
                .expires_in
                .and_then(|d| received_at.checked_add(Duration::from_secs(d))),
        }
    }
}

impl Client {
    /// Creates a new client for the Metadata Service.
    ///
    /// Every request made by the client fails once `timeout` elapses.
    pub(crate) fn new(endpoint_override: Option<String>, timeout: Duration) -> BuildResult<Self> {
        let endpoint = Self::resolve_endpoint(endpoint_override);
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let inner = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(BuilderError::client)?;

        Ok(Self { endpoint, inner })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn resolve_endpoint(endpoint_override: Option<String>) -> String {
        if let Ok(host) = std::env::var(GCE_METADATA_HOST_ENV_VAR) {
            // Check GCE_METADATA_HOST environment variable first
            format!("http://{host}")
        } else if let Some(e) = endpoint_override {
            // Else, check if an endpoint was provided to the mds::Builder
            e
        } else {
            // Else, use the default metadata root
            METADATA_ROOT.to_string()
        }
    }

    /// Creates a GET request to the MDS service with the correct headers.
    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        self.inner
            .get(url)
            .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
    }

    /// Fetches an access token for the default service account.
    pub(crate) async fn access_token(
        &self,
        scopes: Option<&[String]>,
    ) -> Result<MDSTokenResponse> {
        let path = format!("{MDS_DEFAULT_URI}/token");
        let request = self.get(&path);

        // Use the `scopes` option if set, otherwise let the MDS use the default
        // scopes.
        let scopes = scopes.map(|v| v.join(","));
        let request = scopes
            .into_iter()
            .fold(request, |r, s| r.query(&[("scopes", s)]));

        let error_message = "failed to fetch access token from the metadata service";

        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;

        if !response.status().is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }

        let response = response.json::<MDSTokenResponse>().await.map_err(|e| {
            // Decoding errors are not transient. Typically they indicate a badly
            // configured MDS endpoint, or DNS redirecting the request to a random
            // server, e.g., ISPs that redirect unknown services to HTTP.
            if e.is_decode() {
                errors::from_decode_error(e, error_message)
            } else {
                errors::from_http_error(e, error_message)
            }
        })?;

        if response.access_token.is_empty() {
            return Err(CredentialsError::from_msg(
                false,
                format!("{error_message}, the response has an empty `access_token`"),
            ));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_REQUEST_TIMEOUT;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serial_test::{parallel, serial};

    fn test_client(server: &Server) -> Client {
        Client::new(Some(format!("http://{}", server.addr())), DEFAULT_REQUEST_TIMEOUT).unwrap()
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_success() {
        let server = Server::run();
        let client = test_client(&server);
        let response = MDSTokenResponse {
            access_token: "test-token".to_string(),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
        };

        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path(format!("{}/token", MDS_DEFAULT_URI)),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains((
                    "scopes",
                    "scope1,scope2".to_string()
                )))),
            ])
            .respond_with(json_encoded(response.clone())),
        );

        let scopes = ["scope1".to_string(), "scope2".to_string()];
        let got = client.access_token(Some(&scopes)).await.unwrap();
        assert_eq!(got, response);
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_only_access_token() {
        let server = Server::run();
        let client = test_client(&server);
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", format!("{}/token", MDS_DEFAULT_URI)),
                request::query(url_decoded(not(contains(key("scopes"))))),
            ])
            .respond_with(status_code(200).body(r#"{"access_token":"meta-tok-1"}"#)),
        );

        let got = client.access_token(None).await.unwrap();
        assert_eq!(got.access_token, "meta-tok-1");
        assert_eq!(got.expires_in, None);
        assert_eq!(got.token_type, None);
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_http_error() {
        let server = Server::run();
        let client = test_client(&server);
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{}/token", MDS_DEFAULT_URI),
            ))
            .respond_with(status_code(404).body("Not Found")),
        );

        let err = client.access_token(None).await.unwrap_err();
        assert!(err.is_network(), "{err:?}");
        assert!(!err.is_transient(), "{err:?}");
        assert_eq!(err.status(), Some(http::StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("failed to fetch access token"), "{err}");
        assert!(err.to_string().contains("Not Found"), "{err}");
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_retryable_http_error() {
        let server = Server::run();
        let client = test_client(&server);
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{}/token", MDS_DEFAULT_URI),
            ))
            .respond_with(status_code(503).body("try again")),
        );

        let err = client.access_token(None).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert_eq!(err.status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test_case::test_case(""; "empty body")]
    #[test_case::test_case("not json"; "not json")]
    #[test_case::test_case("{}"; "missing access token")]
    #[test_case::test_case(r#"{"access_token":42}"#; "wrong type")]
    #[test_case::test_case(r#"{"access_token":""}"#; "empty access token")]
    #[tokio::test]
    #[parallel]
    async fn access_token_bad_body(body: &'static str) {
        let server = Server::run();
        let client = test_client(&server);
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{}/token", MDS_DEFAULT_URI),
            ))
            .respond_with(status_code(200).body(body)),
        );

        let err = client.access_token(None).await.unwrap_err();
        assert!(err.is_network(), "{err:?}");
        assert!(!err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_timeout() {
        let server = Server::run();
        let client = Client::new(
            Some(format!("http://{}", server.addr())),
            Duration::from_millis(100),
        )
        .unwrap();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{}/token", MDS_DEFAULT_URI),
            ))
            .respond_with(delay_and_then(
                Duration::from_secs(2),
                status_code(200).body(r#"{"access_token":"too-late"}"#),
            )),
        );

        let start = std::time::Instant::now();
        let err = client.access_token(None).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
        assert!(err.is_network(), "{err:?}");
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_unreachable() {
        // Reserve a port, then release it so nothing is listening.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = Client::new(Some(format!("http://{addr}")), DEFAULT_REQUEST_TIMEOUT).unwrap();

        let err = client.access_token(None).await.unwrap_err();
        assert!(err.is_network(), "{err:?}");
        assert!(err.is_transient(), "{err:?}");
        assert!(err.status().is_none(), "{err:?}");
    }

    #[test]
    #[parallel]
    fn resolve_endpoint_default() {
        let client = Client::new(None, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.endpoint(), "http://metadata");
    }

    #[test]
    #[parallel]
    fn resolve_endpoint_override() {
        let client =
            Client::new(Some("http://custom.endpoint/".to_string()), DEFAULT_REQUEST_TIMEOUT)
                .unwrap();
        assert_eq!(client.endpoint(), "http://custom.endpoint");
    }

    #[test]
    #[serial]
    fn resolve_endpoint_env_var() {
        let _s = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, "env.var.host");
        let client = Client::new(None, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.endpoint(), "http://env.var.host");
    }

    #[test]
    #[serial]
    fn resolve_endpoint_priority() {
        let _s = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, "env.priority.host");
        // Env var should take precedence over constructor argument
        let client =
            Client::new(Some("http://custom.endpoint".to_string()), DEFAULT_REQUEST_TIMEOUT)
                .unwrap();
        assert_eq!(client.endpoint(), "http://env.priority.host");
    }

    #[tokio::test(start_paused = true)]
    async fn to_token() {
        let response = MDSTokenResponse {
            access_token: "test-token".to_string(),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
        };
        let now = Instant::now();
        let token = response.to_token(now);
        assert_eq!(token.token, "test-token");
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        assert_eq!(token.expires_at, Some(now + Duration::from_secs(3600)));

        let fmt = format!("{response:?}");
        assert!(!fmt.contains("test-token"), "{fmt}");
    }

    #[tokio::test(start_paused = true)]
    async fn to_token_huge_expires_in() {
        let response = MDSTokenResponse {
            access_token: "test-token".to_string(),
            expires_in: Some(u64::MAX),
            token_type: Some("Bearer".to_string()),
        };
        let token = response.to_token(Instant::now());
        assert_eq!(token.token, "test-token");
        assert_eq!(token.expires_at, None);
    }
}
