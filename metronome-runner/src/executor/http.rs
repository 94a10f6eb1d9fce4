//! HTTP executor
//!
//! Performs the job's HTTP request: URL scheme defaulting, headers,
//! basic/bearer auth and the accepted-status check. A response status
//! outside the accepted set is a failure like any transport error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metronome_core::domain::job::{AuthKind, Job};

use super::Executor;

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, job: &Job) -> Result<()> {
        let payload = job
            .http_job
            .as_ref()
            .context("HTTP job payload missing")?;

        let method = reqwest::Method::from_bytes(payload.method.as_bytes())
            .with_context(|| format!("invalid HTTP method {:?}", payload.method))?;

        let mut request = self.client.request(method, absolute_url(&payload.url));

        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }

        match payload.auth.kind {
            AuthKind::None => {}
            AuthKind::Basic => {
                request = request.basic_auth(
                    payload.auth.username.as_deref().unwrap_or_default(),
                    payload.auth.password.as_deref(),
                );
            }
            AuthKind::Bearer => {
                request =
                    request.bearer_auth(payload.auth.bearer_token.as_deref().unwrap_or_default());
            }
        }

        if let Some(body) = &payload.body {
            if !body.is_empty() {
                request = request.body(body.clone());
            }
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        if !status_accepted(status, &payload.valid_response_codes) {
            bail!("received unexpected response status {status}");
        }

        Ok(())
    }
}

/// Prepends `https://` when the URL carries no scheme.
fn absolute_url(url: &str) -> String {
    if url.starts_with(HTTP_PREFIX) || url.starts_with(HTTPS_PREFIX) {
        return url.to_string();
    }

    format!("{HTTPS_PREFIX}{url}")
}

/// An empty accepted set means success is strictly 200.
fn status_accepted(code: u16, accepted: &[u16]) -> bool {
    if accepted.is_empty() {
        return code == 200;
    }

    accepted.contains(&code)
}
