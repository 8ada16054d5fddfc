use std::time::Duration;

use patchwatch_limit::RateLimiter;
use patchwatch_types::{
    Advisory, AdvisorySource, FetchError, Job, JobSink, JobWriter, Package, Platform, Severity,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Page size requested from the summary listing endpoint.
const SUMMARY_PAGE_LIMIT: u32 = 999;

/// How many vulnerability names may sit between the summary producer and the
/// detail fan-out before pagination backpressures.
const NAME_QUEUE_CAPACITY: usize = 64;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of a Clair v1 API.
#[derive(Debug, Clone)]
pub struct ClairApiV1 {
    pub base_url: String,
}

/// An [`AdvisorySource`] backed by the Clair v1 HTTP API.
///
/// Every upstream request — each summary page and each detail lookup — is
/// gated on one rate-limiter acquisition. Detail lookups fan out
/// concurrently; the limiter in front of the spawn is what bounds them.
#[derive(Clone)]
pub struct ClairStream {
    base_url: String,
    limiter: RateLimiter,
    client: reqwest::Client,
}

impl ClairStream {
    pub fn new(config: ClairApiV1, limiter: RateLimiter) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("patchwatch-source/0.1")
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
            client,
        })
    }

    /// Coordinator for one fetch: runs the summary producer, fans detail
    /// lookups out into a JoinSet, and fires the terminal only after the
    /// producer has ended and every lookup has drained.
    async fn run(self, platform: Platform, writer: JobWriter) {
        let (name_tx, mut name_rx) = mpsc::channel::<String>(NAME_QUEUE_CAPACITY);
        let sink = writer.sink();

        let summarizer = tokio::spawn({
            let stream = self.clone();
            let sink = sink.clone();
            async move { stream.collect_summaries(platform, name_tx, sink).await }
        });

        let mut lookups: JoinSet<()> = JoinSet::new();
        while let Some(name) = name_rx.recv().await {
            self.limiter.wait().await;
            let stream = self.clone();
            let sink = sink.clone();
            lookups.spawn(async move { stream.describe(platform, name, sink).await });
        }

        while lookups.join_next().await.is_some() {}
        let _ = summarizer.await;

        writer.finish();
        debug!(platform = %platform, "advisory stream complete");
    }

    /// Walk every summary page in order, pushing vulnerability names into the
    /// queue. A failed page surfaces one error and ends enumeration.
    async fn collect_summaries(
        &self,
        platform: Platform,
        names: mpsc::Sender<String>,
        sink: JobSink,
    ) {
        let mut page: Option<String> = None;
        let mut first = true;

        loop {
            if !first {
                self.limiter.wait().await;
            }
            first = false;

            let url = match &page {
                None => format!(
                    "{}/v1/namespaces/{}/vulnerabilities?limit={}",
                    self.base_url,
                    platform.upstream_name(),
                    SUMMARY_PAGE_LIMIT
                ),
                Some(token) => format!(
                    "{}/v1/namespaces/{}/vulnerabilities?page={}&limit={}",
                    self.base_url,
                    platform.upstream_name(),
                    token,
                    SUMMARY_PAGE_LIMIT
                ),
            };

            match self.get_json::<SummaryPage>(&url).await {
                Ok(listing) => {
                    for summary in listing.vulnerabilities {
                        if names.send(summary.name).await.is_err() {
                            // Consumer gone; the fetch was cancelled.
                            return;
                        }
                    }
                    match listing.next_page {
                        Some(token) => page = Some(token),
                        None => return,
                    }
                }
                Err(err) => {
                    warn!(platform = %platform, error = %err, "summary enumeration failed");
                    sink.error(err).await;
                    return;
                }
            }
        }
    }

    /// Look up one vulnerability and emit its normalized advisory.
    ///
    /// Summary names may carry trailing annotations after the identifier;
    /// only the leading whitespace-delimited token names the vulnerability
    /// upstream.
    async fn describe(&self, platform: Platform, raw_name: String, sink: JobSink) {
        let name = raw_name.split_whitespace().next().unwrap_or_default();
        let url = format!(
            "{}/v1/namespaces/{}/vulnerabilities/{}?fixedIn",
            self.base_url,
            platform.upstream_name(),
            name
        );

        match self.get_json::<DetailResponse>(&url).await {
            Ok(response) => match normalize(response.vulnerability, platform) {
                Some(advisory) => {
                    sink.advisory(advisory).await;
                }
                None => debug!(name, "dropping advisory with no fix versions"),
            },
            Err(err) => {
                warn!(name, error = %err, "detail lookup failed");
                sink.error(err).await;
            }
        }
    }

    /// One GET, decoded as either the success shape or the upstream error
    /// envelope.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        match response
            .json::<Envelope<T>>()
            .await
            .map_err(|err| FetchError::Decode(err.to_string()))?
        {
            Envelope::Err(envelope) => Err(FetchError::Upstream(envelope.error.message)),
            Envelope::Ok(value) => Ok(value),
        }
    }
}

impl AdvisorySource for ClairStream {
    fn vulnerabilities(&self, platform: Platform) -> Job {
        let (writer, job) = Job::channel();
        let stream = self.clone();
        tokio::spawn(async move { stream.run(platform, writer).await });
        job
    }
}

fn normalize(detail: Detail, platform: Platform) -> Option<Advisory> {
    if detail.fixed_in.is_empty() {
        return None;
    }

    let fixed_in_packages: Vec<Package> = detail
        .fixed_in
        .into_iter()
        .map(|fix| Package {
            name: fix.name,
            version: fix.version,
        })
        .collect();

    Some(Advisory {
        name: detail.name,
        affected_package_name: fixed_in_packages[0].name.clone(),
        affected_platform_name: platform.upstream_name(),
        details_href: detail.link,
        severity_rating: severity_from_clair(&detail.severity),
        fixed_in_packages,
    })
}

fn severity_from_clair(rating: &str) -> Severity {
    match rating {
        "Negligible" => Severity::Negligible,
        "Low" => Severity::Low,
        "Medium" => Severity::Medium,
        "High" => Severity::High,
        "Critical" => Severity::Critical,
        "Defcon1" => Severity::Urgent,
        _ => Severity::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Clair responds with either the operation's success shape or a top-level
/// error envelope; the error side is tried first because the success shapes
/// tolerate missing fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Err(ErrorEnvelope),
    Ok(T),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error")]
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SummaryPage {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<Summary>,
    #[serde(rename = "NextPage")]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(rename = "Vulnerability")]
    vulnerability: Detail,
}

#[derive(Debug, Deserialize)]
struct Detail {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Link", default)]
    link: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "FixedIn", default)]
    fixed_in: Vec<FixedIn>,
}

#[derive(Debug, Deserialize)]
struct FixedIn {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Version")]
    version: String,
}
