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

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use std::path::Path;

const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// A representation of a [Service Account Key].
///
/// [from_file][ServiceAccountKey::from_file] and
/// [from_slice][ServiceAccountKey::from_slice] reject key files with missing
/// or blank fields. Keys built by other means are checked the same way when
/// they are passed to [Builder::from_key][super::Builder::from_key].
///
/// [Service Account Key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(Clone, PartialEq)]
pub struct ServiceAccountKey {
    /// Always `"service_account"`.
    pub key_type: String,
    /// The project id the service account belongs to.
    pub project_id: String,
    /// ID of the service account's private key.
    pub private_key_id: String,
    /// The PEM-encoded RSA private key associated with the service account.
    pub private_key: String,
    /// The client email address of the service account.
    /// (e.g., "my-sa@my-project.iam.gserviceaccount.com").
    pub client_email: String,
    /// The numeric id of the service account.
    pub client_id: String,
    /// The OAuth2 authorization endpoint.
    pub auth_uri: String,
    /// The OAuth2 token endpoint. Access tokens are requested from this URI.
    pub token_uri: String,
    /// The URL of the public x509 certificates for the auth provider.
    pub auth_provider_x509_cert_url: String,
    /// The URL of the public x509 certificate for this service account.
    pub client_x509_cert_url: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("client_email", &self.client_email)
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field(
                "auth_provider_x509_cert_url",
                &self.auth_provider_x509_cert_url,
            )
            .field("client_x509_cert_url", &self.client_x509_cert_url)
            .finish()
    }
}

// The wire format. Any field may be missing, unknown fields are ignored.
#[derive(serde::Deserialize)]
struct RawKeyFile {
    #[serde(rename = "type")]
    key_type: Option<String>,
    project_id: Option<String>,
    private_key_id: Option<String>,
    private_key: Option<String>,
    client_email: Option<String>,
    client_id: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    auth_provider_x509_cert_url: Option<String>,
    client_x509_cert_url: Option<String>,
}

impl ServiceAccountKey {
    /// Reads and validates the service account key file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> BuildResult<Self> {
        let contents = std::fs::read(path.as_ref()).map_err(BuilderError::loading)?;
        Self::from_slice(&contents)
    }

    /// Parses and validates the contents of a service account key file.
    pub fn from_slice(contents: &[u8]) -> BuildResult<Self> {
        let raw =
            serde_json::from_slice::<RawKeyFile>(contents).map_err(BuilderError::parsing)?;
        let key = Self {
            key_type: raw.key_type.unwrap_or_default(),
            project_id: raw.project_id.unwrap_or_default(),
            private_key_id: raw.private_key_id.unwrap_or_default(),
            private_key: raw.private_key.unwrap_or_default(),
            client_email: raw.client_email.unwrap_or_default(),
            client_id: raw.client_id.unwrap_or_default(),
            auth_uri: raw.auth_uri.unwrap_or_default(),
            token_uri: raw.token_uri.unwrap_or_default(),
            auth_provider_x509_cert_url: raw.auth_provider_x509_cert_url.unwrap_or_default(),
            client_x509_cert_url: raw.client_x509_cert_url.unwrap_or_default(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Fails if any field is blank, or if the key is not a service account key.
    pub(crate) fn validate(&self) -> BuildResult<()> {
        let fields = [
            ("type", &self.key_type),
            ("project_id", &self.project_id),
            ("private_key_id", &self.private_key_id),
            ("private_key", &self.private_key),
            ("client_email", &self.client_email),
            ("client_id", &self.client_id),
            ("auth_uri", &self.auth_uri),
            ("token_uri", &self.token_uri),
            (
                "auth_provider_x509_cert_url",
                &self.auth_provider_x509_cert_url,
            ),
            ("client_x509_cert_url", &self.client_x509_cert_url),
        ];
        if let Some((name, _)) = fields.into_iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(BuilderError::missing_field(name));
        }
        if self.key_type != SERVICE_ACCOUNT_TYPE {
            return Err(BuilderError::unknown_type(format!(
                "expected `{SERVICE_ACCOUNT_TYPE}`, found `{}`",
                self.key_type
            )));
        }
        Ok(())
    }
}
