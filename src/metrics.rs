//! Run metrics.
//!
//! A Prometheus recorder collects counters during the run; a batch job has no
//! scrape window, so the rendered snapshot is pushed to a Pushgateway at the
//! end when one is configured.

use crate::app::ports::{HttpClientPort, PostRequest};
use crate::error::{IngestError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

pub const JOB_NAME: &str = "concert_finder";

/// Installs the global recorder. Returns `None` if one is already installed.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder install failed: {}", e);
            None
        }
    }
}

pub fn listing_persisted() {
    ::metrics::counter!("concert_finder_listings_persisted_total").increment(1);
}

/// `stage` is the step that stopped the listing (`enrich`, `persist`).
pub fn listing_skipped(stage: &'static str) {
    ::metrics::counter!("concert_finder_listings_skipped_total", "stage" => stage).increment(1);
}

/// Sub-step failure after the core row was written.
pub fn step_failed(step: &'static str) {
    ::metrics::counter!("concert_finder_step_failures_total", "step" => step).increment(1);
}

pub fn poster_saved(kind: &'static str) {
    ::metrics::counter!("concert_finder_posters_saved_total", "kind" => kind).increment(1);
}

pub fn extraction_call(path: &'static str) {
    ::metrics::counter!("concert_finder_extraction_calls_total", "path" => path).increment(1);
}

pub fn pieces_found(count: usize) {
    ::metrics::counter!("concert_finder_pieces_found_total").increment(count as u64);
}

pub fn run_duration(seconds: f64) {
    ::metrics::histogram!("concert_finder_run_duration_seconds").record(seconds);
}

/// Pushes the current snapshot to `{gateway}/metrics/job/concert_finder`.
pub async fn push_to_gateway(
    http: &dyn HttpClientPort,
    gateway: &str,
    handle: &PrometheusHandle,
) -> Result<()> {
    let url = format!("{}/metrics/job/{}", gateway.trim_end_matches('/'), JOB_NAME);
    let request = PostRequest {
        url: url.clone(),
        bearer_token: None,
        content_type: "text/plain; version=0.0.4".to_string(),
        body: handle.render().into_bytes(),
    };
    let response = http.post(request).await?;
    if !response.is_success() {
        return Err(IngestError::Status {
            url,
            status: response.status,
        });
    }
    info!("Pushed metrics to Pushgateway at {}", gateway);
    Ok(())
}
