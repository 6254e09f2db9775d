// HTTP clients for release downloads and GitHub API checks.
// Proxy settings come from the usual HTTP(S)_PROXY / NO_PROXY variables,
// which reqwest reads on its own.

use crate::constants::variables;

use anyhow::{Context, Result};
use fleet_sdk::{FleetPackage, StringUtil};
use reqwest::Client;
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// A client with the runner-fleet user agent.
    ///
    /// `RUNNER_FLEET_TLS_NO_VERIFY=true` disables certificate checks.
    pub fn create_client() -> Result<Client> {
        Self::build(tls_no_verify(), None)
    }

    /// Like [`create_client`](Self::create_client) with an overall request timeout.
    pub fn create_client_with_timeout(timeout: Duration) -> Result<Client> {
        Self::build(tls_no_verify(), Some(timeout))
    }

    fn build(no_verify: bool, timeout: Option<Duration>) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(FleetPackage::user_agent())
            .connect_timeout(Self::CONNECT_TIMEOUT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if no_verify {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build().context("Failed to build HTTP client")
    }
}

fn tls_no_verify() -> bool {
    std::env::var(variables::TLS_NO_VERIFY)
        .ok()
        .and_then(|v| StringUtil::convert_to_bool(&v))
        .unwrap_or(false)
}
