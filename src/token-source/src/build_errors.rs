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

//! Errors created while constructing token sources.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for token source builders.
///
/// A token source never exists in a partially initialized state. If the
/// credentials file cannot be loaded, parsed, or its private key cannot be
/// used for signing, the builder returns one of these errors instead.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A problem finding or reading the credentials file.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// A problem parsing the credentials file.
    ///
    /// This includes malformed JSON, fields with the wrong JSON type, and
    /// required fields that are missing or blank.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_) | ErrorKind::MissingField(_))
    }

    /// A required field was missing or blank.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// The credentials file is not a service account key.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownType(_))
    }

    /// The private key is not a usable RSA key.
    pub fn is_key(&self) -> bool {
        matches!(self.0, ErrorKind::Key(_))
    }

    /// The HTTP client could not be created with the configured options.
    pub fn is_client(&self) -> bool {
        matches!(self.0, ErrorKind::Client(_))
    }

    pub(crate) fn loading<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Loading(source.into()))
    }

    pub(crate) fn parsing<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Parsing(source.into()))
    }

    pub(crate) fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }

    pub(crate) fn unknown_type<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::UnknownType(source.into()))
    }

    pub(crate) fn key<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Key(source.into()))
    }

    pub(crate) fn client<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Client(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("could not find or read the credentials file: {0}")]
    Loading(#[source] BoxError),
    #[error("cannot parse the credentials file: {0}")]
    Parsing(#[source] BoxError),
    #[error("missing or blank required field: {0}")]
    MissingField(&'static str),
    #[error("unknown or invalid credentials type: {0}")]
    UnknownType(#[source] BoxError),
    #[error("cannot use the private key for RS256 signing: {0}")]
    Key(#[source] BoxError),
    #[error("cannot create the HTTP client: {0}")]
    Client(#[source] BoxError),
}
