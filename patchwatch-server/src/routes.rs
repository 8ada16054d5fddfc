// ---------------------------------------------------------------------------
// GET /vulns — the resumable advisory pull endpoint
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use patchwatch_types::{Advisory, Platform};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::jobs::Retrieved;
use crate::state::AppState;

const ERR_MISSING_PLATFORM: &str = "missing query parameter 'platform'";
const ERR_NO_SUCH_PLATFORM: &str = "no such platform";

#[derive(Debug, Deserialize)]
pub struct VulnsQuery {
    platform: Option<String>,
    #[serde(rename = "requestID")]
    request_id: Option<String>,
}

/// The response envelope. Every reply carries the request id so clients can
/// resume, whatever else happened.
#[derive(Debug, Serialize)]
pub struct VulnsResponse {
    error: Option<String>,
    #[serde(rename = "requestID")]
    request_id: String,
    finished: bool,
    vulns: Vec<Advisory>,
}

pub async fn vulns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VulnsQuery>,
) -> (StatusCode, Json<VulnsResponse>) {
    let Some(platform_name) = query.platform.filter(|name| !name.is_empty()) else {
        return reject(ERR_MISSING_PLATFORM);
    };
    let Some(platform) = Platform::from_external_name(&platform_name) else {
        return reject(ERR_NO_SUCH_PLATFORM);
    };

    let (request_id, retrieved) = match query.request_id {
        Some(id) => match state.jobs.lock().await.retrieve(&id).await {
            Ok(retrieved) => (id, retrieved),
            // Polling a finished (or never-registered) id is routine for a
            // resuming client, not a protocol violation: 200 with a
            // body-level error.
            Err(err) => {
                return (
                    StatusCode::OK,
                    Json(VulnsResponse {
                        error: Some(err.to_string()),
                        request_id: id,
                        finished: false,
                        vulns: Vec::new(),
                    }),
                );
            }
        },
        None => {
            let job = state.source.vulnerabilities(platform);
            let mut jobs = state.jobs.lock().await;
            match jobs.register(job) {
                Ok(id) => {
                    info!(platform = %platform, %id, "started advisory job");
                    let retrieved = jobs.retrieve(&id).await.unwrap_or_default();
                    (id, retrieved)
                }
                Err(err) => return reject(&err.to_string()),
            }
        }
    };

    respond(request_id, retrieved)
}

fn respond(request_id: String, retrieved: Retrieved) -> (StatusCode, Json<VulnsResponse>) {
    if !retrieved.errors.is_empty() {
        for err in &retrieved.errors {
            error!(error = %err, id = %request_id, "advisory job error");
        }
        let joined = retrieved
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return (
            StatusCode::BAD_REQUEST,
            Json(VulnsResponse {
                error: Some(joined),
                request_id,
                finished: retrieved.complete,
                vulns: Vec::new(),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(VulnsResponse {
            error: None,
            request_id,
            finished: retrieved.complete,
            vulns: retrieved.advisories,
        }),
    )
}

fn reject(message: &str) -> (StatusCode, Json<VulnsResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(VulnsResponse {
            error: Some(message.to_string()),
            request_id: String::new(),
            finished: false,
            vulns: Vec::new(),
        }),
    )
}
