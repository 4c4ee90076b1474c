// Copyright 2025 Google LLC
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
use crate::token::Token;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

/// A response from a token endpoint, before it becomes a [Token].
pub(crate) trait TokenResponse: Clone + Send + Sync + 'static {
    /// Converts the response, received at `received_at`, into a token.
    fn to_token(&self, received_at: Instant) -> Token;
}

/// The result of a successful fetch: the wire response and its token.
#[derive(Clone, Debug)]
pub(crate) struct Fetched<R> {
    pub(crate) response: R,
    pub(crate) token: Token,
}

/// Holds the current token of a token source and serializes its refreshes.
///
/// Callers that ask for a refresh while another refresh is in flight wait for
/// it, and receive its outcome, instead of starting a new network round trip.
#[derive(Debug)]
pub(crate) struct TokenCache<R> {
    // The latest valid token. Only successful fetches update it.
    current: watch::Sender<Option<Token>>,

    // The outcome of the last completed fetch. Holding the lock means a fetch
    // is in flight.
    last: Mutex<Option<Result<Fetched<R>>>>,

    // Incremented, with `last` locked, every time a fetch completes.
    generation: AtomicU64,
}

impl<R: TokenResponse> TokenCache<R> {
    pub(crate) fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            last: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Clones the current token.
    pub(crate) fn current_token(&self) -> Option<Token> {
        self.current.borrow().clone()
    }

    /// Runs `fetch`, unless a fetch completed while this call was waiting for
    /// the in-flight one. In that case it returns the outcome of that fetch.
    pub(crate) async fn refresh<F, Fut>(&self, fetch: F) -> Result<Fetched<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let observed = self.generation.load(Ordering::Acquire);
        let mut last = self.last.lock().await;
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last.as_ref() {
                return outcome.clone();
            }
        }

        let outcome = fetch().await.map(|response| {
            let token = response.to_token(Instant::now());
            Fetched { response, token }
        });
        match &outcome {
            Ok(fetched) => {
                self.current.send_replace(Some(fetched.token.clone()));
            }
            Err(e) if self.current.borrow().is_some() => {
                tracing::warn!("token refresh failed, keeping the previous token: {e}");
            }
            Err(_) => {}
        }
        *last = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::Release);
        outcome
    }
}
