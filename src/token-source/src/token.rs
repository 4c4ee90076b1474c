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

use crate::Result;
use crate::constants::EXPIRATION_MARGIN;
use crate::errors::CredentialsError;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use tokio::time::Instant;

/// Represents an auth token.
///
/// Tokens are immutable. Each successful refresh creates a new `Token` which
/// replaces the previous one in its token source.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token, if the issuer reported one.
    ///
    /// The most common type is `"Bearer"`.
    pub token_type: Option<String>,

    /// The instant at which the token expires.
    ///
    /// If `None`, the issuer did not report an expiration.
    pub expires_at: Option<Instant>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Returns `true` if the token expires within the next few seconds, or has
    /// already expired.
    ///
    /// Tokens without an expiration never expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|e| e <= Instant::now() + EXPIRATION_MARGIN)
    }

    /// Returns the `Authorization` header for this token.
    ///
    /// The value is marked as sensitive. Tokens without a type use `Bearer`.
    pub fn authorization_header(&self) -> Result<(HeaderName, HeaderValue)> {
        let token_type = self.token_type.as_deref().unwrap_or("Bearer");
        let mut value = HeaderValue::from_str(&format!("{token_type} {}", self.token))
            .map_err(|e| CredentialsError::from_source(false, e))?;
        value.set_sensitive(true);
        Ok((AUTHORIZATION, value))
    }
}

/// The capability shared by all token sources.
///
/// Implementations hold the most recent token obtained from their source.
/// [refresh][TokenProvider::refresh] always contacts the source, while
/// [token][TokenProvider::token] reuses the current token until it is about
/// to expire.
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    /// Returns the most recent token, without any I/O.
    ///
    /// Returns `None` until the first successful refresh. A failed refresh
    /// does not change the value returned here.
    fn current_token(&self) -> Option<Token>;

    /// Fetches a new token from the source and makes it the current token.
    async fn refresh(&self) -> Result<Token>;

    /// Returns the current token if it is still valid, otherwise refreshes it.
    async fn token(&self) -> Result<Token> {
        match self.current_token() {
            Some(token) if !token.is_expired() => Ok(token),
            _ => self.refresh().await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    // Used by tests in other modules.
    mockall::mock! {
        #[derive(Debug)]
        pub TokenProvider { }

        #[async_trait::async_trait]
        impl TokenProvider for TokenProvider {
            fn current_token(&self) -> Option<Token>;
            async fn refresh(&self) -> Result<Token>;
        }
    }

    fn test_token(value: &str, expires_at: Option<Instant>) -> Token {
        Token {
            token: value.to_string(),
            token_type: Some("Bearer".to_string()),
            expires_at,
        }
    }

    #[test]
    fn debug() {
        let expires_at = Instant::now() + Duration::from_secs(3600);
        let token = test_token("token-test-only", Some(expires_at));
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("token: \"[censored]\""), "{got}");
        assert!(got.contains("token_type: Some(\"Bearer\")"), "{got}");
        assert!(
            got.contains(&format!("expires_at: Some({expires_at:?}")),
            "{got}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn is_expired() {
        let now = Instant::now();
        assert!(!test_token("t", None).is_expired());
        assert!(!test_token("t", Some(now + Duration::from_secs(3600))).is_expired());
        assert!(test_token("t", Some(now + EXPIRATION_MARGIN)).is_expired());
        assert!(test_token("t", Some(now)).is_expired());

        let token = test_token("t", Some(now + Duration::from_secs(60)));
        assert!(!token.is_expired());
        tokio::time::advance(Duration::from_secs(55)).await;
        assert!(token.is_expired());
    }

    #[test]
    fn authorization_header() {
        let (name, value) = test_token("test-token", None)
            .authorization_header()
            .unwrap();
        assert_eq!(name, AUTHORIZATION);
        assert_eq!(value.to_str().unwrap(), "Bearer test-token");
        assert!(value.is_sensitive());

        let token = Token {
            token: "test-token".to_string(),
            token_type: None,
            expires_at: None,
        };
        let (_, value) = token.authorization_header().unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer test-token");

        let token = Token {
            token: "test-token".to_string(),
            token_type: Some("MAC".to_string()),
            expires_at: None,
        };
        let (_, value) = token.authorization_header().unwrap();
        assert_eq!(value.to_str().unwrap(), "MAC test-token");
    }

    #[test]
    fn authorization_header_invalid() {
        let token = test_token("bad\ntoken", None);
        let err = token.authorization_header().unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn token_reuses_valid_token() {
        let current = test_token("current", None);
        let mut mock = MockTokenProvider::new();
        mock.expect_current_token()
            .times(1)
            .return_const(Some(current.clone()));
        mock.expect_refresh().never();

        let got = mock.token().await.unwrap();
        assert_eq!(got, current);
    }

    #[tokio::test]
    async fn token_refreshes_when_empty() {
        let fresh = test_token("fresh", None);
        let fresh_clone = fresh.clone();
        let mut mock = MockTokenProvider::new();
        mock.expect_current_token().times(1).return_const(None);
        mock.expect_refresh()
            .times(1)
            .return_once(|| Ok(fresh_clone));

        let got = mock.token().await.unwrap();
        assert_eq!(got, fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn token_refreshes_when_expired() {
        let expired = test_token("expired", Some(Instant::now()));
        let fresh = test_token("fresh", Some(Instant::now() + Duration::from_secs(3600)));
        let fresh_clone = fresh.clone();
        let mut mock = MockTokenProvider::new();
        mock.expect_current_token()
            .times(1)
            .return_const(Some(expired));
        mock.expect_refresh()
            .times(1)
            .return_once(|| Ok(fresh_clone));

        let got = mock.token().await.unwrap();
        assert_eq!(got, fresh);
    }

    #[tokio::test]
    async fn token_refresh_error() {
        let mut mock = MockTokenProvider::new();
        mock.expect_current_token().times(1).return_const(None);
        mock.expect_refresh()
            .times(1)
            .return_once(|| Err(CredentialsError::from_msg(true, "fail")));

        let err = mock.token().await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
