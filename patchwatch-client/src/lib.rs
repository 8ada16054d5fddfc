// ---------------------------------------------------------------------------
// Advisory stream client
// ---------------------------------------------------------------------------
//
// Wraps the server's paginated /vulns protocol back into a single local
// advisory stream. This is the only view of the server the agent has.

use std::time::Duration;

use patchwatch_limit::RateLimiter;
use patchwatch_types::{Advisory, AdvisorySource, FetchError, Job, JobWriter, Platform};
use serde::Deserialize;
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Polls an advisory server, resuming with the request id it hands back,
/// until the server reports the stream finished.
#[derive(Clone)]
pub struct AdvisoryClient {
    base_url: String,
    limiter: RateLimiter,
    client: reqwest::Client,
}

/// The server's response envelope.
#[derive(Debug, Deserialize)]
struct VulnsEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "requestID", default)]
    request_id: String,
    #[serde(default)]
    finished: bool,
    #[serde(default)]
    vulns: Vec<Advisory>,
}

impl AdvisoryClient {
    pub fn new(base_url: &str, limiter: RateLimiter) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("patchwatch-client/0.1")
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
            client,
        })
    }

    /// Poll until finished, writing advisories through. Any failure —
    /// transport, decode, or a body-level server error — surfaces one error
    /// and ends the stream; there are no retries.
    async fn run(self, platform: Platform, writer: JobWriter) {
        let mut request_id: Option<String> = None;

        loop {
            let url = match &request_id {
                None => format!(
                    "{}/vulns?platform={}",
                    self.base_url,
                    platform.external_name()
                ),
                Some(id) => format!(
                    "{}/vulns?platform={}&requestID={}",
                    self.base_url,
                    platform.external_name(),
                    id
                ),
            };

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "advisory poll failed");
                    writer.error(FetchError::Transport(err.to_string())).await;
                    break;
                }
            };

            let envelope = match response.json::<VulnsEnvelope>().await {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "advisory response was not the expected shape");
                    writer.error(FetchError::Decode(err.to_string())).await;
                    break;
                }
            };

            if let Some(message) = envelope.error {
                warn!(error = %message, "advisory server reported an error");
                writer.error(FetchError::Upstream(message)).await;
                break;
            }

            for advisory in envelope.vulns {
                if !writer.advisory(advisory).await {
                    // Consumer dropped the job; stop polling on its behalf.
                    return;
                }
            }

            if envelope.finished {
                debug!(platform = %platform, "advisory stream finished");
                break;
            }

            request_id = Some(envelope.request_id);
            self.limiter.wait().await;
        }

        writer.finish();
    }
}

impl AdvisorySource for AdvisoryClient {
    fn vulnerabilities(&self, platform: Platform) -> Job {
        let (writer, job) = Job::channel();
        let client = self.clone();
        tokio::spawn(async move { client.run(platform, writer).await });
        job
    }
}
