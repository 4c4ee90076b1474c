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

//! Prints an access token obtained from a service account key file or from
//! the metadata service.

use anyhow::Context;
use clap::Parser;
use google_cloud_token_source::credentials::{mds, service_account};
use google_cloud_token_source::token::{Token, TokenProvider};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DESCRIPTION: &str = concat!(
    "Prints an OAuth2 access token to stdout.",
    " The token comes from a service account key file, if one is configured,",
    " or from the metadata service otherwise.",
    " Set RUST_LOG=debug to trace the requests."
);

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
struct Args {
    /// The service account key file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    key_file: Option<PathBuf>,

    /// Use the metadata service, even if a key file is configured.
    #[arg(long, default_value_t = false)]
    metadata: bool,

    /// Override the metadata service endpoint, e.g. `http://localhost:8080`.
    #[arg(long)]
    endpoint: Option<String>,

    /// The scopes requested for the token, separated by commas.
    #[arg(long, value_delimiter = ',')]
    scopes: Vec<String>,

    /// The timeout for each request, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    enable_tracing()?;
    tracing::debug!("Configuration: {args:?}");

    let timeout = Duration::from_secs(args.timeout);
    let token = match &args.key_file {
        Some(path) if !args.metadata => service_account_token(&args, path, timeout).await?,
        _ => metadata_token(&args, timeout).await?,
    };

    let (_, value) = token.authorization_header()?;
    match token.expires_at {
        Some(at) => eprintln!(
            "token expires in {}s",
            at.saturating_duration_since(tokio::time::Instant::now())
                .as_secs()
        ),
        None => eprintln!("token has no expiration"),
    }
    println!("{}", value.to_str()?);
    Ok(())
}

async fn service_account_token(
    args: &Args,
    path: &Path,
    timeout: Duration,
) -> anyhow::Result<Token> {
    let builder = service_account::Builder::new(path).timeout(timeout);
    let builder = if args.scopes.is_empty() {
        builder
    } else {
        builder.scopes(args.scopes.clone())
    };
    let source = builder
        .build()
        .with_context(|| format!("cannot load service account key file {}", path.display()))?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    source.fetch_token(move |result| {
        let _ = tx.send(result);
    });
    let response = rx.await?.context("cannot fetch token for service account")?;
    tracing::debug!("token endpoint response: {response:?}");

    source
        .current_token()
        .context("the token source has no token after a successful fetch")
}

async fn metadata_token(args: &Args, timeout: Duration) -> anyhow::Result<Token> {
    let builder = mds::Builder::default().timeout(timeout);
    let builder = args
        .endpoint
        .iter()
        .fold(builder, |b, e| b.endpoint(e.clone()));
    let builder = if args.scopes.is_empty() {
        builder
    } else {
        builder.scopes(args.scopes.clone())
    };
    let source = builder
        .initialize()
        .await
        .context("cannot fetch token from the metadata service")?;

    source
        .current_token()
        .context("the token source has no token after initialization")
}

fn enable_tracing() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
