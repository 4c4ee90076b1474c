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

//! Google Cloud OAuth2 token sources.
//!
//! This crate obtains short-lived OAuth2 bearer [access tokens] from two
//! sources:
//!
//! * The [Metadata Service] available to workloads running on Google Cloud.
//!   See [credentials::mds].
//! * A [service account key] file, exchanged for an access token using the
//!   [JWT-bearer grant]. See [credentials::service_account].
//!
//! Both sources implement [token::TokenProvider], so call sites that only
//! need a token to populate an `Authorization:` header can use either one.
//!
//! ```no_run
//! # use google_cloud_token_source::credentials::service_account::Builder;
//! # use google_cloud_token_source::token::TokenProvider;
//! # tokio_test::block_on(async {
//! let source = Builder::new("/path/to/key.json").build()?;
//! let token = source.refresh().await?;
//! let (name, value) = token.authorization_header()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! [access tokens]: https://cloud.google.com/docs/authentication#token
//! [JWT-bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating

pub mod build_errors;
pub mod errors;

/// Token sources backed by the metadata service or a service account key.
pub mod credentials;

/// Types and functions to work with auth [Tokens].
///
/// [Tokens]: https://cloud.google.com/docs/authentication#token
pub mod token;

pub(crate) mod constants;
pub(crate) mod mds;
pub(crate) mod token_cache;

/// A `Result` alias where the `Err` case is
/// `google_cloud_token_source::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// A `Result` alias for operations that create token sources.
pub type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
