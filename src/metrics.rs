//! Prometheus metrics for the downloader.
//!
//! Exposes:
//! - `ig_downloader_command_duration_seconds` (histogram)
//! - `ig_downloader_command_total` (counter with status)
//! - `ig_downloader_command_inflight` (gauge)
//! - `ig_downloader_media_downloaded_total` (counter per content category)
//! - `ig_downloader_rate_limit_hits_total` (counter)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    register_int_counter, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "ig_downloader_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ig_downloader_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "ig_downloader_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static MEDIA_DOWNLOADED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ig_downloader_media_downloaded_total",
        "Media items downloaded by content category",
        &["category"]
    )
    .expect("failed to register media counter")
});

static RATE_LIMIT_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ig_downloader_rate_limit_hits_total",
        "Requests answered with a rate limit or block"
    )
    .expect("failed to register rate limit counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&MEDIA_DOWNLOADED);
    Lazy::force(&RATE_LIMIT_HITS);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

/// Count one downloaded item of `category` (`posts`, `stories`, ...).
pub fn record_media_downloaded(category: &'static str) {
    init_collectors();
    MEDIA_DOWNLOADED.with_label_values(&[category]).inc();
}

pub fn record_rate_limit_hit() {
    init_collectors();
    RATE_LIMIT_HITS.inc();
}

fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Text exposition of every downloader and process metric, scraped while a
/// download or batch runs.
async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(response(StatusCode::INTERNAL_SERVER_ERROR, "encode error"));
    }

    let mut ok = response(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        ok.headers_mut().insert(hyper::header::CONTENT_TYPE, content_type);
    }
    Ok(ok)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(response(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Serve `/metrics` on `addr` for the lifetime of the command. Bind errors
/// are logged and the download goes on without the endpoint.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn scrape() -> String {
        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/plain")));
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        String::from_utf8(body.to_vec()).expect("utf-8 metrics body")
    }

    #[test]
    fn command_lifecycle_updates_gauge_counter_and_histogram() {
        let cmd = "test_download_lifecycle";

        record_command_start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);

        record_command_result(cmd, Duration::from_millis(120), true);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 1);
        assert_eq!(
            COMMAND_DURATION.with_label_values(&[cmd]).get_sample_count(),
            1
        );
    }

    #[test]
    fn failed_commands_are_labelled_error() {
        let cmd = "test_batch_failure";
        record_command_start(cmd);
        record_command_result(cmd, Duration::from_secs(2), false);

        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "error"]).get(), 1);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 0);
    }

    #[test]
    fn media_counter_is_per_category() {
        let before = MEDIA_DOWNLOADED.with_label_values(&["highlights"]).get();
        record_media_downloaded("highlights");
        record_media_downloaded("highlights");
        assert_eq!(
            MEDIA_DOWNLOADED.with_label_values(&["highlights"]).get(),
            before + 2
        );
    }

    #[test]
    fn rate_limit_hits_accumulate() {
        let before = RATE_LIMIT_HITS.get();
        record_rate_limit_hit();
        assert!(RATE_LIMIT_HITS.get() > before);
    }

    #[tokio::test]
    async fn scrape_exposes_all_families() {
        record_command_start("test_scrape");
        record_command_result("test_scrape", Duration::from_millis(10), true);
        record_media_downloaded("posts");
        record_rate_limit_hit();

        let text = scrape().await;
        assert!(text.contains("ig_downloader_command_total"));
        assert!(text.contains("ig_downloader_command_duration_seconds"));
        assert!(text.contains("ig_downloader_command_inflight"));
        assert!(text.contains("ig_downloader_media_downloaded_total"));
        assert!(text.contains("ig_downloader_rate_limit_hits_total"));
        assert!(text.contains("test_scrape"));
    }

    #[tokio::test]
    async fn endpoint_serves_metrics_and_404s_elsewhere() {
        let free = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
        let addr = free.local_addr().expect("free addr");
        drop(free);

        spawn_metrics_server(addr);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let ok = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .expect("scrape");
        assert_eq!(ok.status().as_u16(), 200);
        assert!(ok.text().await.unwrap().contains("ig_downloader_"));

        let missing = client
            .get(format!("http://{}/other", addr))
            .send()
            .await
            .expect("other path");
        assert_eq!(missing.status().as_u16(), 404);
    }
}
