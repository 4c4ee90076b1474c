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

//! Errors created while fetching access tokens.

use http::StatusCode;
use std::error::Error;
use std::sync::Arc;

/// Represents an error fetching an access token.
///
/// A failed fetch never replaces a previously obtained token. The token source
/// keeps serving the last valid token, if any, and reports the failure through
/// this type.
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// Whether the operation that resulted in this error might succeed upon
    /// retry.
    ///
    /// Applications should use [Exponential backoff] in their retry loops.
    ///
    /// [Exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
    is_transient: bool,

    kind: Kind,

    /// The HTTP status code, when the endpoint returned a response.
    status: Option<StatusCode>,

    message: Option<String>,

    source: Option<Arc<dyn Error + Send + Sync>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Signing,
    Network,
}

impl CredentialsError {
    /// Creates a network error from a message.
    ///
    /// Applications rarely need this function, it is mostly useful to mock
    /// [TokenProvider][crate::token::TokenProvider] failures in tests.
    pub fn from_msg<T: Into<String>>(is_transient: bool, message: T) -> Self {
        Self {
            is_transient,
            kind: Kind::Network,
            status: None,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Creates a network error wrapping `source`.
    pub fn from_source<T: Error + Send + Sync + 'static>(is_transient: bool, source: T) -> Self {
        Self {
            is_transient,
            kind: Kind::Network,
            status: None,
            message: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    /// The assertion could not be built or signed.
    pub fn is_signing(&self) -> bool {
        self.kind == Kind::Signing
    }

    /// The request failed, the endpoint returned an error status, or the
    /// response body could not be decoded into a token.
    pub fn is_network(&self) -> bool {
        self.kind == Kind::Network
    }

    /// The HTTP status returned by the endpoint, if it returned one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub(crate) fn signing<T: Error + Send + Sync + 'static>(source: T) -> Self {
        Self {
            kind: Kind::Signing,
            ..Self::from_source(false, source)
        }
    }

    pub(crate) fn signing_from_msg<T: Into<String>>(message: T) -> Self {
        Self {
            kind: Kind::Signing,
            ..Self::from_msg(false, message)
        }
    }

    fn with_message<T: Into<String>>(mut self, message: T) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|arc| arc.as_ref() as &(dyn Error + 'static))
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl std::fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        match (&self.message, &self.source) {
            (Some(m), Some(s)) => write!(f, "{m}, {msg}, source: {s}"),
            (Some(m), None) => write!(f, "{m}, {msg}"),
            (None, Some(s)) => write!(f, "cannot fetch access token, {msg}, source: {s}"),
            (None, None) => write!(f, "cannot fetch access token, {msg}"),
        }
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

/// Maps a failure to send the request (or receive its response) into an error.
pub(crate) fn from_http_error(err: reqwest::Error, message: &str) -> CredentialsError {
    // Connection and timeout errors may go away if the request is retried.
    // Errors building the request will not.
    let is_transient = !err.is_builder();
    CredentialsError::from_source(is_transient, err).with_message(message)
}

/// Maps a non-2xx response into an error, including the body when available.
pub(crate) async fn from_http_response(
    response: reqwest::Response,
    message: &str,
) -> CredentialsError {
    let status = response.status();
    let is_transient = is_retryable(status);
    let error = match response.text().await {
        Ok(body) => CredentialsError::from_msg(
            is_transient,
            format!("{message}, HTTP status: {status}, body: <{body}>"),
        ),
        Err(e) => CredentialsError::from_source(is_transient, e).with_message(format!(
            "{message}, HTTP status: {status}, cannot read body"
        )),
    };
    error.with_status(status)
}

/// Maps a response body that does not contain a usable token into an error.
///
/// These errors are not transient. Typically they indicate a misconfigured
/// endpoint, or DNS redirecting the request to an unrelated server.
pub(crate) fn from_decode_error<T>(err: T, message: &str) -> CredentialsError
where
    T: Error + Send + Sync + 'static,
{
    CredentialsError::from_source(false, err).with_message(message)
}
