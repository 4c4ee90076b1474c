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

use super::key_file::ServiceAccountKey;
use super::signing_key::RsaSigner;
use crate::Result;
use crate::errors::CredentialsError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

/// The lifetime requested for each assertion.
pub(crate) const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

/// The header that describes how the assertion was signed.
#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct JwsHeader {
    pub alg: &'static str,
    pub typ: &'static str,
}

pub(crate) const RS256_HEADER: JwsHeader = JwsHeader {
    alg: "RS256",
    typ: "JWT",
};

/// The claims of a JWT-bearer assertion.
#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct JwsClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
}

impl JwsClaims {
    /// The claims to exchange `key` for an access token with `scope`, issued
    /// at `now`.
    pub(crate) fn new(key: &ServiceAccountKey, scope: &str, now: OffsetDateTime) -> Self {
        Self {
            iss: key.client_email.clone(),
            scope: scope.to_string(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(CredentialsError::signing)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Returns the compact serialization of the signed assertion:
/// `base64url(header).base64url(claims).base64url(signature)`.
pub(crate) fn assertion(claims: &JwsClaims, signer: &RsaSigner) -> Result<String> {
    if claims.exp <= claims.iat {
        return Err(CredentialsError::signing_from_msg(format!(
            "expiration time {:?} must be later than issued time {:?}",
            claims.exp, claims.iat
        )));
    }
    let signing_input = format!("{}.{}", encode(&RS256_HEADER)?, encode(claims)?);
    let signature = signer.sign(signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(signature)
    ))
}
