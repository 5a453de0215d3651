//! Shared HTTP plumbing for the backends.

use std::time::Duration;

use leetcrew_common::{Result, SolverError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Build a client whose requests are abandoned after `timeout_ms`.
pub(crate) fn build_http_client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| SolverError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// POST `body` as JSON and decode the JSON reply.
///
/// Non-2xx statuses become `SolverError::Llm` naming only the status; the
/// provider's response body goes to the log.
pub(crate) async fn post_json<B, R>(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request.json(body).send().await.map_err(|e| {
        if e.is_timeout() {
            SolverError::Timeout(format!("{provider} request timed out"))
        } else {
            SolverError::Llm(format!("{provider} request failed: {e}"))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        warn!(
            provider,
            status = status.as_u16(),
            body = %body_text,
            "Model API returned an error status"
        );
        return Err(SolverError::Llm(format!("{provider} API error {status}")));
    }

    response
        .json()
        .await
        .map_err(|e| SolverError::Llm(format!("Failed to parse {provider} response: {e}")))
}
