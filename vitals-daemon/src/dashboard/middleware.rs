//! HTTP self-instrumentation.
//!
//! Meters every dashboard request back into the collector: request count,
//! latency histogram, body sizes and status class counters under the `http`
//! measure. Pushes use the gather channel's non-blocking path so a busy
//! dispatcher can never slow down request handling.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tokio::sync::mpsc;
use vitals_core::timeseries::unix_ms;
use vitals_core::{Gather, MetricType, Unit};

/// State handed to the metering middleware.
#[derive(Clone)]
pub struct ServerMeter {
    sender: mpsc::Sender<Gather>,
}

impl ServerMeter {
    pub fn new(sender: mpsc::Sender<Gather>) -> Self {
        Self { sender }
    }
}

/// Axum middleware measuring one request. The handler runs on its own task
/// so a panic is caught here and answered with a 500 instead of tearing down
/// the connection.
pub async fn track(State(meter): State<ServerMeter>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let bytes_recv = content_length(request.headers());

    let response = match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Request handler panicked");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    let g = meter_gather(
        response.status().as_u16(),
        started.elapsed().as_nanos() as f64,
        bytes_recv,
        content_length(response.headers()),
    );
    // Dropped silently when the buffer is full; metering never blocks.
    let _ = meter.sender.try_send(g);

    response
}

/// Build the per-request measurement fields.
fn meter_gather(status: u16, latency_ns: f64, bytes_recv: f64, bytes_sent: f64) -> Gather {
    let mut g = Gather::new("http", unix_ms(std::time::SystemTime::now()));
    let counter = MetricType::Counter(Unit::Short);
    let bytes = MetricType::Counter(Unit::Bytes);
    g.add("http:requests", 1.0, counter.clone());
    g.add("http:latency", latency_ns, MetricType::histogram(Unit::Duration));
    g.add("http:bytes_recv", bytes_recv, bytes.clone());
    g.add("http:bytes_sent", bytes_sent, bytes);
    g.add(format!("http:status_{}xx", status / 100), 1.0, counter);
    g
}

fn content_length(headers: &axum::http::HeaderMap) -> f64 {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_length_parsing() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(content_length(&headers), 0.0);
        headers.insert(axum::http::header::CONTENT_LENGTH, "128".parse().unwrap());
        assert_eq!(content_length(&headers), 128.0);
    }

    #[test]
    fn test_meter_gather_fields() {
        let g = meter_gather(404, 2_500_000.0, 10.0, 20.0);
        let names: Vec<&str> = g.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "http:requests",
                "http:latency",
                "http:bytes_recv",
                "http:bytes_sent",
                "http:status_4xx"
            ]
        );
        let latency = &g.fields[1];
        assert_eq!(latency.value, 2_500_000.0);
        assert_eq!(latency.metric_type.kind(), "histogram");
    }
}
